//! Acquisition orchestrator
//!
//! Receives admitted assets from the listener, registers them, and for each
//! one starts the creator-exit monitor and an acquisition attempt
//! concurrently.
//!
//! ## Acquisition steps
//!
//! 1. Derive the wallet's token account for the mint (and whether to create it)
//! 2. Read the bonding curve and refuse late entries
//! 3. Quote at the configured slippage, paying the configured buy amount
//! 4. Plan compute budget + optional account creation + pump buy
//! 5. Route through the relay when the current leader runs it
//! 6. Dispatch, treating an already-processed duplicate as success
//! 7. Record the position in the registry
//!
//! `exited_acquisition` is set on every return path.
//!
//! ## Usage Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use sniper::buy_engine::BuyEngine;
//! # async fn example(engine: Arc<BuyEngine>, candidates: sniper::types::CandidateReceiver) {
//! // runs until the listener drops its sender
//! engine.run(candidates).await;
//! # }
//! ```

use scopeguard::defer;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::{ChainError, ChainProvider};
use crate::config::TradingConfig;
use crate::creator_monitor::CreatorExitMonitor;
use crate::curve::{BondingCurveSnapshot, CurveError};
use crate::metrics::{metrics, Timer};
use crate::registry::{Acquisition, PendingRegistry};
use crate::routing::RoutingManager;
use crate::rpc_manager::{DispatchError, Route, TxDispatcher};
use crate::structured_logging::StatusReporter;
use crate::tx_builder::pump::{
    buy_instruction, create_token_account_instruction, owned_token_account, CurveAccounts,
};
use crate::tx_builder::{plan_buy_instructions, TransactionBuilderError};
use crate::types::{AssetRecord, CandidateReceiver};

#[derive(Debug, Error)]
pub enum BuyError {
    /// Other buyers already moved the curve; not a failure
    #[error("Late to asset: curve holds {reserves_sol:.3} SOL")]
    LateEntry { reserves_sol: f64 },

    #[error("Asset {0} is not in the registry")]
    UnknownAsset(Pubkey),

    #[error("Bonding curve account {0} not found")]
    CurveMissing(Pubkey),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Curve error: {0}")]
    Curve(#[from] CurveError),

    #[error("Build error: {0}")]
    Build(#[from] TransactionBuilderError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl BuyError {
    /// Stale-state outcomes are expected and not counted as failures.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::LateEntry { .. })
    }
}

pub struct BuyEngine {
    chain: Arc<dyn ChainProvider>,
    registry: Arc<PendingRegistry>,
    dispatcher: Arc<dyn TxDispatcher>,
    routing: Arc<RoutingManager>,
    monitor: CreatorExitMonitor,
    status: StatusReporter,
    wallet: Pubkey,
    config: TradingConfig,
}

impl BuyEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        registry: Arc<PendingRegistry>,
        dispatcher: Arc<dyn TxDispatcher>,
        routing: Arc<RoutingManager>,
        monitor: CreatorExitMonitor,
        status: StatusReporter,
        wallet: Pubkey,
        config: TradingConfig,
    ) -> Self {
        Self {
            chain,
            registry,
            dispatcher,
            routing,
            monitor,
            status,
            wallet,
            config,
        }
    }

    /// Consume admitted assets until the channel closes.
    pub async fn run(self: Arc<Self>, mut candidates: CandidateReceiver) {
        info!("Buy engine started");
        while let Some(record) = candidates.recv().await {
            self.admit(record);
        }
        info!("Candidate channel closed, buy engine stopping");
    }

    /// Register `record` and start its exit monitor and acquisition.
    ///
    /// Returns `false` if the mint is already tracked.
    pub fn admit(self: &Arc<Self>, record: AssetRecord) -> bool {
        let mint = record.mint;
        if !self.registry.add(record) {
            warn!(mint = %mint, "Asset already tracked, ignoring");
            return false;
        }
        metrics().pending_assets.set(self.registry.len() as i64);

        let monitor = self.monitor.clone();
        tokio::spawn(async move {
            let outcome = monitor.watch(mint).await;
            debug!(mint = %mint, ?outcome, "Creator monitor finished");
        });

        let engine = self.clone();
        tokio::spawn(async move {
            match engine.acquire(&mint).await {
                Ok(signature) => engine
                    .status
                    .info(&mint, format!("Purchased ({})", signature)),
                Err(e) if e.is_stale() => engine.status.info(&mint, e.to_string()),
                Err(e) => engine
                    .status
                    .error(&mint, format!("Error buying asset: {}", e)),
            }
        });
        true
    }

    /// One acquisition attempt for a registered asset.
    pub async fn acquire(&self, mint: &Pubkey) -> Result<Signature, BuyError> {
        let registry = self.registry.clone();
        let mint = *mint;
        defer! {
            registry.mark_exited_acquisition(&mint);
        }

        let record = self
            .registry
            .get(&mint)
            .ok_or(BuyError::UnknownAsset(mint))?;
        self.status.info(
            &mint,
            format!("Attempting to buy ({:?} since detection)", record.discovered_at.elapsed()),
        );

        let token_account = owned_token_account(&self.wallet, &mint);
        let create_account = self.should_create_account(&mint, &token_account).await;

        let curve_data = self
            .chain
            .get_account_data(&record.bonding_curve)
            .await?
            .ok_or(BuyError::CurveMissing(record.bonding_curve))?;
        let curve = BondingCurveSnapshot::decode(&curve_data)?;
        debug!(
            mint = %mint,
            virtual_sol = curve.virtual_sol_reserves,
            virtual_tokens = curve.virtual_token_reserves,
            "Fetched bonding curve"
        );

        if record.late_to_buy(&curve) {
            metrics().buys_late.inc();
            return Err(BuyError::LateEntry {
                reserves_sol: curve.sol_reserves(),
            });
        }

        let price_lamports = self.config.buy_amount_lamports();
        let quantity = curve.buy_quote(price_lamports, self.config.slippage)?;

        let buy_ix = buy_instruction(
            &CurveAccounts::from(&record),
            &self.wallet,
            &token_account,
            quantity,
            price_lamports,
        );
        let setup = create_account.then(|| create_token_account_instruction(&self.wallet, &mint));
        let plan = plan_buy_instructions(
            self.config.compute_unit_limit,
            self.config.priority_fee_micro_lamports,
            setup,
            buy_ix,
        )?;
        let plan = self.routing.route_plan(plan, &self.wallet);
        let route = Route::of(&plan);

        metrics().buys_attempted.inc();
        let timer = Timer::start();
        info!(mint = %mint, quantity, price_lamports, route = route.label(), "Sending buy");

        let signature = match self.dispatcher.dispatch(plan).await {
            Ok(signature) => signature,
            Err(DispatchError::AlreadyProcessed(signature)) => {
                debug!(mint = %mint, signature = %signature, "Buy already processed");
                signature
            }
            Err(e) => {
                metrics().buys_failed.inc();
                return Err(e.into());
            }
        };

        self.registry.record_acquisition(
            &mint,
            Acquisition {
                quantity,
                price_lamports,
                token_account,
                signature,
            },
        );
        metrics().buys_confirmed.inc();
        info!(
            mint = %mint,
            signature = %signature,
            quantity,
            elapsed_ms = (timer.elapsed_secs() * 1000.0) as u64,
            "Buy confirmed"
        );
        Ok(signature)
    }

    async fn should_create_account(&self, mint: &Pubkey, token_account: &Pubkey) -> bool {
        if self.config.skip_ata_lookup {
            return true;
        }
        match self.chain.get_account_data(token_account).await {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                debug!(mint = %mint, account = %token_account, error = %e, "Token account lookup failed, creating");
                true
            }
        }
    }
}
