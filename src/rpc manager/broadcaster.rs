//! Production [`TxDispatcher`]: sign, send over the plan's route, confirm.

use async_trait::async_trait;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{DispatchError, Route, TxDispatcher};
use crate::chain::ChainProvider;
use crate::metrics::{metrics, Timer};
use crate::tx_builder::{Bundler, InstructionPlan, TxBuilder};

pub struct Broadcaster {
    chain: Arc<dyn ChainProvider>,
    builder: TxBuilder,
    bundler: Arc<dyn Bundler>,
    confirm_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        builder: TxBuilder,
        bundler: Arc<dyn Bundler>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            builder,
            bundler,
            confirm_timeout,
        }
    }
}

#[async_trait]
impl TxDispatcher for Broadcaster {
    async fn dispatch(&self, plan: InstructionPlan) -> Result<Signature, DispatchError> {
        let route = Route::of(&plan);
        let tx = self.builder.build(plan).await?;
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| DispatchError::Bundle("signed transaction has no signature".into()))?;

        let timer = Timer::start();
        metrics().dispatches.with_label_values(&[route.label()]).inc();
        debug!(signature = %signature, route = route.label(), "Sending transaction");

        match route {
            Route::Privileged => {
                let bundle_id = self
                    .bundler
                    .send_bundle(std::slice::from_ref(&tx))
                    .await
                    .map_err(|e| DispatchError::from_bundle(signature, e))?;
                debug!(signature = %signature, bundle_id = %bundle_id, "Bundle accepted");
            }
            Route::Standard => {
                self.chain
                    .send_transaction(&tx)
                    .await
                    .map_err(|e| DispatchError::from_send(signature, e))?;
            }
        }

        self.chain
            .confirm_signature(&signature, self.confirm_timeout)
            .await
            .map_err(|e| DispatchError::from_confirmation(signature, e))?;

        timer.observe_duration(&metrics().dispatch_latency);
        info!(
            signature = %signature,
            route = route.label(),
            latency_ms = (timer.elapsed_secs() * 1000.0) as u64,
            "Transaction confirmed"
        );
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use crate::tx_builder::{plan_sell_instructions, TransactionBuilderError};
    use crate::wallet::WalletManager;
    use parking_lot::Mutex;
    use solana_sdk::{
        instruction::{AccountMeta, Instruction},
        pubkey::Pubkey,
        signature::Keypair,
        system_instruction,
        transaction::VersionedTransaction,
    };

    #[derive(Default)]
    struct RecordingBundler {
        bundles: Mutex<Vec<Vec<VersionedTransaction>>>,
        reject_with: Option<String>,
    }

    #[async_trait]
    impl Bundler for RecordingBundler {
        async fn send_bundle(
            &self,
            transactions: &[VersionedTransaction],
        ) -> Result<String, TransactionBuilderError> {
            if let Some(message) = &self.reject_with {
                return Err(TransactionBuilderError::Bundler(message.clone()));
            }
            self.bundles.lock().push(transactions.to_vec());
            Ok("bundle".into())
        }
    }

    struct Fixture {
        chain: Arc<InMemoryChain>,
        bundler: Arc<RecordingBundler>,
        broadcaster: Broadcaster,
        wallet: Arc<WalletManager>,
    }

    fn fixture(bundler: RecordingBundler) -> Fixture {
        let chain = Arc::new(InMemoryChain::new());
        let wallet = Arc::new(WalletManager::from_keypair(Keypair::new()));
        let bundler = Arc::new(bundler);
        let broadcaster = Broadcaster::new(
            chain.clone(),
            TxBuilder::new(chain.clone(), wallet.clone()),
            bundler.clone(),
            Duration::from_millis(50),
        );
        Fixture {
            chain,
            bundler,
            broadcaster,
            wallet,
        }
    }

    fn plan(wallet: &WalletManager) -> InstructionPlan {
        let ix = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1],
            vec![AccountMeta::new(wallet.pubkey(), true)],
        );
        plan_sell_instructions(70_000, 1_000, ix).unwrap()
    }

    #[tokio::test]
    async fn test_standard_route_broadcasts() {
        let f = fixture(RecordingBundler::default());
        let sig = f.broadcaster.dispatch(plan(&f.wallet)).await.unwrap();

        let sent = f.chain.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].signatures[0], sig);
        assert!(f.bundler.bundles.lock().is_empty());
    }

    #[tokio::test]
    async fn test_privileged_route_bundles() {
        let f = fixture(RecordingBundler::default());
        let tip = system_instruction::transfer(&f.wallet.pubkey(), &Pubkey::new_unique(), 5);
        let sig = f
            .broadcaster
            .dispatch(plan(&f.wallet).into_privileged(tip))
            .await
            .unwrap();

        assert!(f.chain.sent_transactions().is_empty());
        let bundles = f.bundler.bundles.lock();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0][0].signatures[0], sig);
    }

    #[tokio::test]
    async fn test_duplicate_bundle_maps_to_already_processed() {
        let f = fixture(RecordingBundler {
            reject_with: Some("transaction has already been processed".into()),
            ..Default::default()
        });
        let tip = system_instruction::transfer(&f.wallet.pubkey(), &Pubkey::new_unique(), 5);
        let err = f
            .broadcaster
            .dispatch(plan(&f.wallet).into_privileged(tip))
            .await
            .unwrap_err();
        assert!(err.duplicate_signature().is_some());
    }
}
