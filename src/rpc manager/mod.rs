//! Transaction dispatch
//!
//! Signs instruction plans and delivers them over one of two routes: the
//! standard RPC broadcast, or a privileged bundle through the relay when the
//! current leader participates. Every dispatch waits for confirmation.

use async_trait::async_trait;
use solana_sdk::signature::Signature;

use crate::tx_builder::InstructionPlan;

pub mod broadcaster;
pub mod rpc_errors;

pub use broadcaster::Broadcaster;
pub use rpc_errors::{DispatchError, RetryPolicy};

/// Delivery path for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Bundle through the relay, paid by an incentive transfer
    Privileged,
    /// Plain RPC broadcast, paid by the priority fee
    Standard,
}

impl Route {
    /// The route a plan was built for.
    pub fn of(plan: &InstructionPlan) -> Self {
        if plan.is_privileged() {
            Self::Privileged
        } else {
            Self::Standard
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Privileged => "privileged",
            Self::Standard => "standard",
        }
    }
}

/// Signs, delivers and confirms one transaction.
#[async_trait]
pub trait TxDispatcher: Send + Sync {
    /// Resolves once the transaction is confirmed. The route follows
    /// [`Route::of`] the plan.
    async fn dispatch(&self, plan: InstructionPlan) -> Result<Signature, DispatchError>;
}
