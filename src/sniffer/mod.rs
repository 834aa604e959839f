//! Mint event listener
//!
//! Subscribes to the pump program's logs and evaluates every transaction
//! whose logs mark a new mint. Evaluation runs on its own task:
//!
//! 1. fetch and decode the launch transaction
//! 2. vet the creator
//! 3. drop the candidate if evaluation took longer than the freshness window
//! 4. hand admitted assets to the buy engine
//!
//! A failed or ended log subscription is re-established with exponential
//! backoff.

pub mod decoder;
pub mod errors;

pub use errors::{DecodeError, ExponentialBackoff, SnifferError};

use parking_lot::Mutex;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::chain::{ChainProvider, LogEvent};
use crate::config::SnifferConfig;
use crate::metrics::metrics;
use crate::store::CreatorStore;
use crate::structured_logging::StatusReporter;
use crate::types::{AssetRecord, CandidateSender, PUMP_PROGRAM_ID};
use crate::vetting::{CreatorVetter, RejectReason, VettingDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Subscribed,
}

/// Result of evaluating one detected mint
#[derive(Debug, Clone)]
pub enum CandidateOutcome {
    Admitted(Pubkey),
    Rejected { mint: Pubkey, reason: RejectReason },
    /// Evaluation outlived the freshness window
    Stale { mint: Pubkey, elapsed: Duration },
    Failed(SnifferError),
}

pub struct MintListener {
    chain: Arc<dyn ChainProvider>,
    vetter: Arc<CreatorVetter>,
    store: Arc<dyn CreatorStore>,
    candidates: CandidateSender,
    status: StatusReporter,
    config: SnifferConfig,
    state: Mutex<ListenerState>,
}

impl MintListener {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        vetter: Arc<CreatorVetter>,
        store: Arc<dyn CreatorStore>,
        candidates: CandidateSender,
        status: StatusReporter,
        config: SnifferConfig,
    ) -> Self {
        Self {
            chain,
            vetter,
            store,
            candidates,
            status,
            config,
            state: Mutex::new(ListenerState::Idle),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    fn set_state(&self, state: ListenerState) {
        *self.state.lock() = state;
    }

    /// Listen until the buy engine goes away.
    pub async fn run(self: Arc<Self>) -> Result<(), SnifferError> {
        let mut backoff =
            ExponentialBackoff::new(self.config.initial_backoff_ms, self.config.max_backoff_ms);

        loop {
            if self.candidates.is_closed() {
                self.set_state(ListenerState::Idle);
                return Err(SnifferError::ChannelClosed);
            }

            let mut subscription = match self.chain.subscribe_logs(&PUMP_PROGRAM_ID).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let delay = backoff.next_backoff();
                    warn!(
                        error = %SnifferError::Subscription(e.to_string()),
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Failed to subscribe to pump program logs"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            backoff.reset();
            self.set_state(ListenerState::Subscribed);
            info!(program = %PUMP_PROGRAM_ID, "Listening for new mints");

            while let Some(event) = subscription.next().await {
                match event {
                    Ok(event) => self.on_log(event),
                    Err(e) => warn!(error = %e, "Error receiving log"),
                }
                if self.candidates.is_closed() {
                    break;
                }
            }

            self.set_state(ListenerState::Idle);
            drop(subscription);
            if self.candidates.is_closed() {
                return Err(SnifferError::ChannelClosed);
            }
            let delay = backoff.next_backoff();
            warn!(
                error = %SnifferError::StreamDisconnected,
                delay_ms = delay.as_millis() as u64,
                "Resubscribing"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn on_log(self: &Arc<Self>, event: LogEvent) {
        if event.failed {
            return;
        }
        let marker = self.config.mint_log_marker.as_str();
        if !event.logs.iter().any(|line| line.contains(marker)) {
            return;
        }

        let detected_at = Instant::now();
        debug!(signature = %event.signature, "Detected mint");
        let listener = self.clone();
        tokio::spawn(async move {
            let outcome = listener.evaluate(&event.signature, detected_at).await;
            debug!(signature = %event.signature, ?outcome, "Candidate evaluated");
        });
    }

    /// Decode, vet and (when admitted and still fresh) forward one launch.
    pub async fn evaluate(&self, signature: &Signature, detected_at: Instant) -> CandidateOutcome {
        let tx = match self.chain.get_transaction(signature).await {
            Ok(tx) => tx,
            Err(e) => {
                warn!(signature = %signature, error = %e, "Failed to fetch mint transaction");
                return CandidateOutcome::Failed(e.into());
            }
        };

        let (launch, purchase) = match decoder::decode_launch(&tx) {
            Ok(decoded) => decoded,
            Err(e) => {
                metrics().decode_errors.inc();
                debug!(signature = %signature, error = %e, "Not a usable launch");
                return CandidateOutcome::Failed(e.into());
            }
        };
        metrics().candidates_detected.inc();

        let mint = launch.mint;
        let creator = launch.creator;
        let decision = self.vetter.vet(&creator, &purchase).await;

        if let Err(e) = self.store.record_creator(&creator).await {
            warn!(creator = %creator, error = %e, "Failed to record creator");
        }

        if let VettingDecision::Reject(reason) = decision {
            metrics().candidates_rejected.inc();
            debug!(mint = %mint, creator = %creator, reason = %reason, "Candidate rejected");
            return CandidateOutcome::Rejected { mint, reason };
        }

        let elapsed = detected_at.elapsed();
        metrics().decision_latency.observe(elapsed.as_secs_f64());
        if elapsed > Duration::from_millis(self.config.freshness_ms) {
            metrics().candidates_stale.inc();
            self.status.info(
                &mint,
                format!("Skipping (detail fetch took {:?})", elapsed),
            );
            return CandidateOutcome::Stale { mint, elapsed };
        }

        let label = launch
            .metadata
            .as_ref()
            .map(|m| format!("{} ({})", m.name, m.symbol))
            .unwrap_or_else(|| mint.to_string());
        let record = AssetRecord::new(launch, purchase, detected_at);
        if self.candidates.send(record).await.is_err() {
            return CandidateOutcome::Failed(SnifferError::ChannelClosed);
        }

        metrics().candidates_admitted.inc();
        self.status.info(
            &mint,
            format!(
                "Admitted {}, creator bought {:.3} SOL",
                label,
                purchase.sol()
            ),
        );
        CandidateOutcome::Admitted(mint)
    }
}
