//! Per-asset status reporting
//!
//! Every lifecycle transition and failure is published as a [`StatusEvent`]
//! keyed by mint and mirrored to `tracing` at the matching level.
//! [`StatusJournal`] keeps the most recent events and [`StatusBoard`] joins
//! them with the registry for the `/status` endpoint.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::registry::PendingRegistry;
use crate::types::LifecycleState;

const STATUS_CHANNEL_CAPACITY: usize = 1024;
pub const DEFAULT_JOURNAL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub mint: String,
    pub level: StatusLevel,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Status channel for asset lifecycle events
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn report(&self, mint: &Pubkey, level: StatusLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            StatusLevel::Debug => tracing::debug!(mint = %mint, "{}", message),
            StatusLevel::Info => tracing::info!(mint = %mint, "{}", message),
            StatusLevel::Warn => tracing::warn!(mint = %mint, "{}", message),
            StatusLevel::Error => tracing::error!(mint = %mint, "{}", message),
        }
        // No receivers is fine; the tracing event above is the durable record.
        let _ = self.tx.send(StatusEvent {
            mint: mint.to_string(),
            level,
            message,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn info(&self, mint: &Pubkey, message: impl Into<String>) {
        self.report(mint, StatusLevel::Info, message);
    }

    pub fn warn(&self, mint: &Pubkey, message: impl Into<String>) {
        self.report(mint, StatusLevel::Warn, message);
    }

    pub fn error(&self, mint: &Pubkey, message: impl Into<String>) {
        self.report(mint, StatusLevel::Error, message);
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded history of the latest status events, oldest first.
#[derive(Debug)]
pub struct StatusJournal {
    events: Mutex<VecDeque<StatusEvent>>,
    capacity: usize,
}

impl StatusJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, event: StatusEvent) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn recent(&self) -> Vec<StatusEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Record everything `reporter` publishes until its last sender is dropped.
    pub fn follow(self: Arc<Self>, reporter: &StatusReporter) -> JoinHandle<()> {
        let mut rx = reporter.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.record(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Status journal fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// One registered asset as shown by `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetStatus {
    pub mint: String,
    pub creator: String,
    pub state: LifecycleState,
    pub quantity_held: u64,
    pub creator_exited: bool,
    pub failed_disposal_rounds: u32,
    pub discovered_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub assets: Vec<AssetStatus>,
    pub events: Vec<StatusEvent>,
}

/// Read side of the registry and the journal.
pub struct StatusBoard {
    registry: Arc<PendingRegistry>,
    journal: Arc<StatusJournal>,
}

impl StatusBoard {
    pub fn new(registry: Arc<PendingRegistry>, journal: Arc<StatusJournal>) -> Self {
        Self { registry, journal }
    }

    pub fn view(&self) -> StatusView {
        let mut assets: Vec<AssetStatus> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|record| AssetStatus {
                mint: record.mint.to_string(),
                creator: record.creator.to_string(),
                state: record.lifecycle(),
                quantity_held: record.quantity_held,
                creator_exited: record.flags.creator_exited(),
                failed_disposal_rounds: record.disposal.failed_rounds,
                discovered_at: record.discovered_wall,
            })
            .collect();
        assets.sort_by_key(|asset| asset.discovered_at);

        StatusView {
            assets,
            events: self.journal.recent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Acquisition;
    use crate::test_utils::sample_record;
    use solana_sdk::signature::Signature;

    #[tokio::test]
    async fn test_events_are_keyed_by_mint() {
        let reporter = StatusReporter::new();
        let mut rx = reporter.subscribe();
        let mint = Pubkey::new_unique();

        reporter.warn(&mint, "late entry");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.mint, mint.to_string());
        assert_eq!(event.level, StatusLevel::Warn);
        assert_eq!(event.message, "late entry");
    }

    #[test]
    fn test_report_without_subscribers() {
        let reporter = StatusReporter::default();
        reporter.error(&Pubkey::new_unique(), "nobody listening");
    }

    #[test]
    fn test_journal_keeps_latest_events() {
        let journal = StatusJournal::new(2);
        for message in ["first", "second", "third"] {
            journal.record(StatusEvent {
                mint: Pubkey::new_unique().to_string(),
                level: StatusLevel::Info,
                message: message.into(),
                timestamp: chrono::Utc::now(),
            });
        }
        let messages: Vec<_> = journal.recent().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[tokio::test]
    async fn test_journal_follows_reporter() {
        let reporter = StatusReporter::new();
        let journal = Arc::new(StatusJournal::new(DEFAULT_JOURNAL_CAPACITY));
        let task = journal.clone().follow(&reporter);

        let mint = Pubkey::new_unique();
        reporter.info(&mint, "admitted");
        reporter.error(&mint, "acquisition failed");
        drop(reporter);
        task.await.unwrap();

        let events = journal.recent();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].level, StatusLevel::Error);
        assert_eq!(events[1].mint, mint.to_string());
    }

    #[test]
    fn test_board_reports_lifecycle_state() {
        let registry = Arc::new(PendingRegistry::new());
        let pending = sample_record(1_010_101_011);
        let held = sample_record(1_010_101_011);
        let held_mint = held.mint;
        registry.add(pending.clone());
        registry.add(held);
        registry.record_acquisition(
            &held_mint,
            Acquisition {
                quantity: 1_000_000,
                price_lamports: 10_000_000,
                token_account: Pubkey::new_unique(),
                signature: Signature::new_unique(),
            },
        );
        registry.flag_creator_exited(&held_mint);

        let board = StatusBoard::new(registry, Arc::new(StatusJournal::new(4)));
        let view = board.view();
        assert_eq!(view.assets.len(), 2);

        let state_of = |mint: &Pubkey| {
            view.assets
                .iter()
                .find(|asset| asset.mint == mint.to_string())
                .unwrap()
                .clone()
        };
        assert_eq!(state_of(&pending.mint).state, LifecycleState::Pending);
        let held = state_of(&held_mint);
        assert_eq!(held.state, LifecycleState::Acquired);
        assert!(held.creator_exited);
        assert_eq!(held.quantity_held, 1_000_000);
        assert!(view.events.is_empty());
    }
}
