//! Core transaction builder
//!
//! Compiles instruction plans into signed v0 transactions against a cached
//! recent blockhash. The cache is kept warm by a background refresh loop so
//! the acquisition path never waits on a blockhash fetch.

use parking_lot::RwLock;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::errors::TransactionBuilderError;
use super::instructions::InstructionPlan;
use crate::chain::ChainProvider;
use crate::wallet::WalletManager;

/// Cached blockhashes older than this are refetched before use.
const MAX_BLOCKHASH_AGE: Duration = Duration::from_secs(30);

#[derive(Clone, Copy)]
struct CachedBlockhash {
    hash: Hash,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct TxBuilder {
    chain: Arc<dyn ChainProvider>,
    wallet: Arc<WalletManager>,
    blockhash: Arc<RwLock<Option<CachedBlockhash>>>,
}

impl TxBuilder {
    pub fn new(chain: Arc<dyn ChainProvider>, wallet: Arc<WalletManager>) -> Self {
        Self {
            chain,
            wallet,
            blockhash: Arc::new(RwLock::new(None)),
        }
    }

    pub fn wallet(&self) -> &WalletManager {
        &self.wallet
    }

    pub async fn refresh_blockhash(&self) -> Result<Hash, TransactionBuilderError> {
        let hash = self
            .chain
            .get_latest_blockhash()
            .await
            .map_err(|e| TransactionBuilderError::blockhash_unavailable(e.to_string()))?;
        *self.blockhash.write() = Some(CachedBlockhash {
            hash,
            fetched_at: Instant::now(),
        });
        Ok(hash)
    }

    /// Keep the blockhash cache warm until the handle is aborted.
    pub fn spawn_blockhash_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let builder = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = builder.refresh_blockhash().await {
                    warn!(error = %e, "Blockhash refresh failed");
                }
            }
        })
    }

    /// Cached blockhash, fetched on demand when missing or too old.
    pub async fn recent_blockhash(&self) -> Result<Hash, TransactionBuilderError> {
        let cached = *self.blockhash.read();
        match cached {
            Some(cached) if cached.fetched_at.elapsed() < MAX_BLOCKHASH_AGE => Ok(cached.hash),
            _ => {
                debug!("Blockhash cache cold, fetching");
                self.refresh_blockhash().await
            }
        }
    }

    /// Compile and sign `plan` with the wallet as fee payer.
    pub async fn build(
        &self,
        plan: InstructionPlan,
    ) -> Result<VersionedTransaction, TransactionBuilderError> {
        let privileged = plan.is_privileged();
        let instructions = plan.into_instructions();
        #[cfg(debug_assertions)]
        super::instructions::sanity_check_ix_order(&instructions, privileged)?;
        #[cfg(not(debug_assertions))]
        let _ = privileged;

        let blockhash = self.recent_blockhash().await?;
        self.sign(&instructions, blockhash)
    }

    pub fn sign(
        &self,
        instructions: &[Instruction],
        blockhash: Hash,
    ) -> Result<VersionedTransaction, TransactionBuilderError> {
        let payer = self.wallet.pubkey();
        let message = v0::Message::try_compile(&payer, instructions, &[], blockhash)
            .map_err(|e| TransactionBuilderError::Signing(e.to_string()))?;
        VersionedTransaction::try_new(VersionedMessage::V0(message), &[self.wallet.keypair()])
            .map_err(|e| TransactionBuilderError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use crate::tx_builder::instructions::plan_sell_instructions;
    use solana_sdk::{
        instruction::AccountMeta, pubkey::Pubkey, signature::Keypair, signer::Signer,
        system_instruction,
    };

    fn builder() -> (TxBuilder, Arc<WalletManager>) {
        let wallet = Arc::new(WalletManager::from_keypair(Keypair::new()));
        (
            TxBuilder::new(Arc::new(InMemoryChain::new()), wallet.clone()),
            wallet,
        )
    }

    fn program_ix(signer: Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[9],
            vec![AccountMeta::new(signer, true)],
        )
    }

    #[tokio::test]
    async fn test_build_signs_with_wallet() {
        let (builder, wallet) = builder();
        let plan = plan_sell_instructions(70_000, 1_000, program_ix(wallet.pubkey())).unwrap();
        let tx = builder.build(plan).await.unwrap();

        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(tx.message.static_account_keys()[0], wallet.pubkey());
        assert!(tx.verify_with_results().iter().all(|ok| *ok));
        assert_eq!(tx.message.instructions().len(), 3);
    }

    #[tokio::test]
    async fn test_blockhash_is_cached() {
        let (builder, _) = builder();
        let first = builder.recent_blockhash().await.unwrap();
        let second = builder.recent_blockhash().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_privileged_plan_is_checked() {
        let (builder, wallet) = builder();
        let tip = system_instruction::transfer(&wallet.pubkey(), &Pubkey::new_unique(), 10);
        let plan = plan_sell_instructions(70_000, 1_000, program_ix(wallet.pubkey()))
            .unwrap()
            .into_privileged(tip);
        let tx = builder.build(plan).await.unwrap();
        assert_eq!(tx.message.instructions().len(), 3);
    }
}
