//! Transaction builder
//!
//! The builder is split into focused modules:
//! - **errors**: error taxonomy for building, signing and bundling
//! - **instructions**: typed instruction plans and ordering validation
//! - **pump**: pump.fun buy/sell and token account instructions
//! - **builder**: blockhash cache and v0 compile + sign
//! - **bundle**: Jito bundle submission
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use sniper::tx_builder::{plan_sell_instructions, TransactionBuilderError, TxBuilder};
//! # use solana_sdk::instruction::Instruction;
//!
//! # async fn example(builder: TxBuilder, sell_ix: Instruction, tip: Instruction) -> Result<(), TransactionBuilderError> {
//! // priority fee path
//! let plan = plan_sell_instructions(70_000, 200_000, sell_ix.clone())?;
//! let tx = builder.build(plan).await?;
//!
//! // relay path: the fee instruction is replaced by the tip transfer
//! let plan = plan_sell_instructions(70_000, 200_000, sell_ix)?.into_privileged(tip);
//! let tx = builder.build(plan).await?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub use errors::TransactionBuilderError;

mod builder;
mod bundle;
mod instructions;
pub mod pump;

pub use builder::TxBuilder;
pub use bundle::{Bundler, JitoBundler};
pub use instructions::{plan_buy_instructions, plan_sell_instructions, InstructionPlan};
#[cfg(debug_assertions)]
pub use instructions::sanity_check_ix_order;
