//! pump.fun launch sniper
//!
//! Detects new pump.fun mints, vets their creators, buys admitted assets and
//! sells them as soon as the creator exits. The binary in `main.rs` wires the
//! components together; the library exposes them for integration tests.

pub mod buy_engine;
pub mod chain;
pub mod compat;
pub mod config;
pub mod creator_monitor;
pub mod curve;
pub mod endpoints;
pub mod metrics;
pub mod registry;
pub mod routing;
pub mod sell_engine;
pub mod sniffer;
pub mod store;
pub mod structured_logging;
pub mod tx_builder;
pub mod types;
pub mod vetting;
pub mod wallet;

// Component modules with non-standard paths (directories with spaces)
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
