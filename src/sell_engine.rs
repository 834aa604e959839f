//! Disposal race orchestrator
//!
//! A sweep loop scans the registry every `scan_interval_ms`. Each held asset
//! whose creator exited is claimed and sold by a race: a new sell attempt is
//! dispatched every `tick_ms`, alternating between the relay (when the leader
//! runs it) and the standard route, until one confirms or `deadline_ms`
//! passes. Duplicate sells landing only cost fees, so attempts overlap freely.

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{DisposalConfig, TradingConfig};
use crate::metrics::metrics;
use crate::registry::PendingRegistry;
use crate::routing::RoutingManager;
use crate::rpc_manager::{DispatchError, Route, TxDispatcher};
use crate::structured_logging::StatusReporter;
use crate::tx_builder::plan_sell_instructions;
use crate::tx_builder::pump::{sell_instruction, CurveAccounts};
use crate::types::AssetRecord;

pub struct SellEngine {
    registry: Arc<PendingRegistry>,
    dispatcher: Arc<dyn TxDispatcher>,
    routing: Arc<RoutingManager>,
    status: StatusReporter,
    wallet: Pubkey,
    trading: TradingConfig,
    config: DisposalConfig,
}

impl SellEngine {
    pub fn new(
        registry: Arc<PendingRegistry>,
        dispatcher: Arc<dyn TxDispatcher>,
        routing: Arc<RoutingManager>,
        status: StatusReporter,
        wallet: Pubkey,
        trading: TradingConfig,
        config: DisposalConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            routing,
            status,
            wallet,
            trading,
            config,
        }
    }

    /// Sweep forever.
    pub async fn run(self: Arc<Self>) {
        info!(interval_ms = self.config.scan_interval_ms, "Sell engine started");
        let mut ticker = interval(Duration::from_millis(self.config.scan_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep_once();
        }
    }

    /// One registry sweep. Returns the races it started.
    pub fn sweep_once(self: &Arc<Self>) -> Vec<JoinHandle<Option<Signature>>> {
        let outcome = self.registry.sweep(self.config.max_rounds);

        for mint in &outcome.removed {
            debug!(mint = %mint, "Evicted finished asset");
        }
        for record in &outcome.abandoned {
            metrics().sells_abandoned.inc();
            self.status.error(
                &record.mint,
                format!(
                    "Giving up after {} disposal rounds, {} tokens still held",
                    record.disposal.failed_rounds, record.quantity_held
                ),
            );
        }
        metrics().pending_assets.set(self.registry.len() as i64);

        outcome
            .candidates
            .into_iter()
            .map(|record| {
                metrics().sells_triggered.inc();
                self.status
                    .info(&record.mint, "Selling (decision=creator sold)");
                let engine = self.clone();
                tokio::spawn(async move { engine.dispose(record).await })
            })
            .collect()
    }

    /// Run one race for a claimed asset and close it in the registry.
    pub async fn dispose(self: Arc<Self>, record: AssetRecord) -> Option<Signature> {
        let mint = record.mint;
        let confirmed = self.race(&record).await;
        self.registry.finish_disposal(&mint, confirmed);

        match confirmed {
            Some(signature) => {
                metrics().sells_confirmed.inc();
                self.status.info(&mint, format!("Sold ({})", signature));
            }
            None => {
                metrics().sells_expired.inc();
                self.status.warn(
                    &mint,
                    format!(
                        "No sell confirmed within {} ms, will retry",
                        self.config.deadline_ms
                    ),
                );
            }
        }
        confirmed
    }

    async fn race(&self, record: &AssetRecord) -> Option<Signature> {
        let mint = record.mint;
        let Some(token_account) = record.owned_token_account else {
            error!(mint = %mint, "Held asset has no token account");
            return None;
        };

        let sell_ix = sell_instruction(
            &CurveAccounts::from(record),
            &self.wallet,
            &token_account,
            record.quantity_held,
            self.config.min_sol_output_lamports,
        );
        let plan = match plan_sell_instructions(
            self.trading.compute_unit_limit,
            self.trading.priority_fee_micro_lamports,
            sell_ix,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                error!(mint = %mint, error = %e, "Cannot plan sell");
                return None;
            }
        };

        let deadline = sleep(Duration::from_millis(self.config.deadline_ms));
        tokio::pin!(deadline);
        let mut ticker = interval(Duration::from_millis(self.config.tick_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = JoinSet::new();
        let mut tick: u32 = 0;

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    attempts.abort_all();
                    return None;
                }
                _ = ticker.tick() => {
                    // even ticks may use the relay, odd ticks never do
                    let attempt_plan = if tick % 2 == 0 {
                        self.routing.route_plan(plan.clone(), &self.wallet)
                    } else {
                        plan.clone()
                    };
                    let route = Route::of(&attempt_plan);
                    debug!(mint = %mint, tick, route = route.label(), "Dispatching sell attempt");
                    tick += 1;

                    let dispatcher = self.dispatcher.clone();
                    attempts.spawn(async move { dispatcher.dispatch(attempt_plan).await });
                }
                Some(joined) = attempts.join_next() => {
                    match joined {
                        Ok(Ok(signature)) | Ok(Err(DispatchError::AlreadyProcessed(signature))) => {
                            attempts.abort_all();
                            info!(mint = %mint, signature = %signature, attempts = tick, "Sell confirmed");
                            return Some(signature);
                        }
                        Ok(Err(e)) => warn!(mint = %mint, error = %e, retryable = e.is_retryable(), "Sell attempt failed"),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => error!(mint = %mint, error = %e, "Sell attempt panicked"),
                    }
                }
            }
        }
    }
}
