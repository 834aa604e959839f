//! Chain data provider abstraction
//!
//! Every component talks to the network through [`ChainProvider`], which keeps
//! the pipeline testable without a validator. [`solana::SolanaChainProvider`]
//! is the production implementation over the nonblocking RPC and pubsub clients.

pub mod memory;
pub mod reconnect;
pub mod solana;

use async_trait::async_trait;
use futures::future::join_all;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use self::memory::InMemoryChain;
pub use self::solana::SolanaChainProvider;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Transaction failed on chain: {0}")]
    TransactionFailed(String),

    #[error("Transaction already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ChainError {
    /// Classify a raw client error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("already been processed") || lower.contains("alreadyprocessed") {
            Self::AlreadyProcessed(message)
        } else if lower.contains("429") || lower.contains("too many requests") {
            Self::RateLimited(message)
        } else {
            Self::Rpc(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Rpc(_) | Self::RateLimited(_) | Self::Timeout(_) | Self::TransactionNotFound(_)
        )
    }
}

/// Instruction with its account indices resolved to addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<Pubkey>,
    pub data: Vec<u8>,
}

/// Confirmed transaction flattened into resolved instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub signature: Signature,
    pub instructions: Vec<ParsedInstruction>,
    /// Inner (CPI) instructions of every top-level instruction, in order
    pub inner_instructions: Vec<ParsedInstruction>,
    /// Executed but returned an error
    pub failed: bool,
}

/// One notification from a program log subscription.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub signature: Signature,
    pub logs: Vec<String>,
    pub failed: bool,
}

/// One notification from an account subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountChange {
    pub slot: u64,
    pub lamports: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochSnapshot {
    pub epoch: u64,
    pub slot_index: u64,
    pub absolute_slot: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteAccountInfo {
    pub node_pubkey: String,
    pub vote_pubkey: String,
}

/// Live subscription stream.
///
/// Dropping it cancels the forwarding task, which unsubscribes upstream.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Result<T, ChainError>>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    /// Wrap a forwarding task. `cancel` fires when the subscription is dropped.
    pub fn new(
        rx: mpsc::UnboundedReceiver<Result<T, ChainError>>,
        cancel: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            cancel: Some(cancel),
            task: Some(task),
        }
    }

    /// A subscription fed directly by a channel, with no upstream to release.
    pub fn from_channel(rx: mpsc::UnboundedReceiver<Result<T, ChainError>>) -> Self {
        Self {
            rx,
            cancel: None,
            task: None,
        }
    }

    /// Next event; `None` once the upstream stream has ended.
    pub async fn next(&mut self) -> Option<Result<T, ChainError>> {
        self.rx.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        // The task unsubscribes on cancel; it is detached, not aborted.
        self.task.take();
    }
}

#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Raw account data, `None` when the account does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ChainError>;

    async fn get_transaction(&self, signature: &Signature)
        -> Result<DecodedTransaction, ChainError>;

    /// Most recent signatures touching `address`, newest first.
    async fn get_recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<Signature>, ChainError>;

    /// Most recent transactions touching `address`, newest first.
    ///
    /// Transactions that cannot be fetched or decoded are skipped; only a
    /// failed signature lookup is an error.
    async fn get_recent_transactions(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<DecodedTransaction>, ChainError> {
        let signatures = self.get_recent_signatures(address, limit).await?;
        let fetched = join_all(signatures.iter().map(|sig| self.get_transaction(sig))).await;
        Ok(fetched
            .into_iter()
            .filter_map(|result| match result {
                Ok(tx) => Some(tx),
                Err(e) => {
                    tracing::debug!(address = %address, error = %e, "Skipping transaction");
                    None
                }
            })
            .collect())
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, ChainError>;

    /// Wait until `signature` is confirmed, fails on chain, or `timeout` passes.
    async fn confirm_signature(
        &self,
        signature: &Signature,
        timeout: Duration,
    ) -> Result<(), ChainError>;

    async fn subscribe_logs(&self, program: &Pubkey) -> Result<Subscription<LogEvent>, ChainError>;

    async fn subscribe_account(
        &self,
        address: &Pubkey,
    ) -> Result<Subscription<AccountChange>, ChainError>;

    async fn get_latest_blockhash(&self) -> Result<Hash, ChainError>;

    async fn get_epoch_info(&self) -> Result<EpochSnapshot, ChainError>;

    /// Leader identity -> slot indices relative to the start of the current epoch.
    async fn get_leader_schedule(&self) -> Result<HashMap<String, Vec<usize>>, ChainError>;

    async fn get_vote_accounts(&self) -> Result<Vec<VoteAccountInfo>, ChainError>;
}
