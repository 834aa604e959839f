//! Creator-exit monitor
//!
//! Watches the creator's token account of one admitted asset. Every change
//! notification triggers a short scan of the account's most recent
//! transactions for a pump sell or a token transfer out of the account.
//!
//! The monitor fails open: if the subscription cannot be established, errors,
//! or ends, the creator is treated as having exited so any position is sold.

use scopeguard::defer;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::chain::ChainProvider;
use crate::config::MonitorConfig;
use crate::metrics::metrics;
use crate::registry::{MonitorDirective, PendingRegistry};
use crate::rpc_manager::RetryPolicy;
use crate::sniffer::decoder::shows_exit;
use crate::structured_logging::StatusReporter;

/// How a watch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A sell or transfer out of the creator's account was seen
    ExitDetected,
    /// The subscription failed or ended; exit was assumed
    StreamFailed,
    /// Nothing left to protect (never bought, sold out, already flagged, or evicted)
    Stopped,
}

#[derive(Clone)]
pub struct CreatorExitMonitor {
    chain: Arc<dyn ChainProvider>,
    registry: Arc<PendingRegistry>,
    status: StatusReporter,
    config: MonitorConfig,
}

impl CreatorExitMonitor {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        registry: Arc<PendingRegistry>,
        status: StatusReporter,
        config: MonitorConfig,
    ) -> Self {
        Self {
            chain,
            registry,
            status,
            config,
        }
    }

    /// Watch `mint` until the creator exits or there is nothing left to watch.
    ///
    /// `exited_exit_monitor` is set on every return path.
    pub async fn watch(&self, mint: Pubkey) -> WatchOutcome {
        let registry = self.registry.clone();
        defer! {
            registry.mark_exited_exit_monitor(&mint);
        }

        let Some(token_account) = self.registry.get(&mint).map(|r| r.creator_token_account)
        else {
            return WatchOutcome::Stopped;
        };

        let mut subscription = match self.chain.subscribe_account(&token_account).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.assume_exit(&mint, format!("Failed to subscribe to creator account: {}", e));
                return WatchOutcome::StreamFailed;
            }
        };

        loop {
            match subscription.next().await {
                Some(Ok(change)) => {
                    debug!(mint = %mint, slot = change.slot, lamports = change.lamports, "Creator account changed");
                    if self.registry.monitor_directive(&mint) == MonitorDirective::Stop {
                        debug!(mint = %mint, "No position to protect, stopping creator monitor");
                        return WatchOutcome::Stopped;
                    }

                    if self.scan_for_exit(&token_account).await {
                        self.registry.flag_creator_exited(&mint);
                        metrics().creator_exits.inc();
                        self.status
                            .info(&mint, "Detected creator sale / transfer, marking as sold");
                        return WatchOutcome::ExitDetected;
                    }
                    debug!(mint = %mint, account = %token_account, "Activity was not a sell or transfer");
                }
                Some(Err(e)) => {
                    self.assume_exit(&mint, format!("Creator account stream error: {}", e));
                    return WatchOutcome::StreamFailed;
                }
                None => {
                    self.assume_exit(&mint, "Creator account stream ended");
                    return WatchOutcome::StreamFailed;
                }
            }
        }
    }

    /// Look for an exit in the account's latest transactions, retrying while
    /// the node catches up.
    async fn scan_for_exit(&self, token_account: &Pubkey) -> bool {
        let policy = RetryPolicy::fixed(self.config.max_attempts, self.config.retry_delay_ms);
        let lookup_timeout = Duration::from_millis(self.config.lookup_timeout_ms);
        let mut attempt = 0;

        loop {
            match timeout(
                lookup_timeout,
                self.chain
                    .get_recent_transactions(token_account, self.config.lookback),
            )
            .await
            {
                Ok(Ok(transactions)) => {
                    if transactions.iter().any(|tx| shows_exit(tx, token_account)) {
                        return true;
                    }
                }
                Ok(Err(e)) => {
                    debug!(account = %token_account, attempt, error = %e, "Creator history lookup failed");
                }
                Err(_) => {
                    debug!(account = %token_account, attempt, "Creator history lookup timed out");
                }
            }

            match policy.calculate_delay(attempt) {
                Some(delay) => sleep(delay).await,
                None => return false,
            }
            attempt += 1;
        }
    }

    fn assume_exit(&self, mint: &Pubkey, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(mint = %mint, reason = %reason, "Assuming creator exited");
        if self.registry.flag_creator_exited(mint) {
            metrics().creator_exits.inc();
        }
        self.status.warn(mint, reason);
    }
}
