//! Pending asset registry - the single source of truth for in-flight assets
//!
//! Every component reads and writes asset lifecycle state through
//! [`PendingRegistry`]. All access goes through one mutex, held only for the
//! duration of a single operation and never across an `.await`.
//!
//! ## Key Features
//!
//! - **Atomic read-modify-write**: each operation sees and leaves a consistent record
//! - **Set-once flags**: helpers only ever raise lifecycle flags
//! - **Disposal sweep**: selects exit candidates and evicts finished records in one pass
//!
//! ## Usage Example
//!
//! ```no_run
//! use sniper::registry::{Acquisition, PendingRegistry};
//! # fn demo(record: sniper::types::AssetRecord, acquisition: Acquisition) {
//! let registry = PendingRegistry::new();
//! let mint = record.mint;
//! registry.add(record);
//!
//! // acquisition fields and the exit flag are written by different tasks
//! registry.record_acquisition(&mint, acquisition);
//! registry.flag_creator_exited(&mint);
//!
//! let sweep = registry.sweep(5);
//! assert_eq!(sweep.candidates.len(), 1);
//! # }
//! ```

use parking_lot::Mutex;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::collections::HashMap;

use crate::types::AssetRecord;

/// Result of a confirmed acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    pub quantity: u64,
    pub price_lamports: u64,
    pub token_account: Pubkey,
    pub signature: Signature,
}

/// What the creator-exit monitor should do after a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorDirective {
    Continue,
    Stop,
}

/// Result of one disposal sweep
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Records claimed for a disposal race (`race_active` already set)
    pub candidates: Vec<AssetRecord>,
    /// Finished records evicted from the registry
    pub removed: Vec<Pubkey>,
    /// Records evicted after exhausting their disposal rounds
    pub abandoned: Vec<AssetRecord>,
}

#[derive(Default)]
pub struct PendingRegistry {
    assets: Mutex<HashMap<String, AssetRecord>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly admitted asset. Returns `false` if the mint is already tracked.
    pub fn add(&self, record: AssetRecord) -> bool {
        let mut assets = self.assets.lock();
        let key = record.key();
        if assets.contains_key(&key) {
            return false;
        }
        assets.insert(key, record);
        true
    }

    pub fn get(&self, mint: &Pubkey) -> Option<AssetRecord> {
        self.assets.lock().get(&mint.to_string()).cloned()
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.assets.lock().contains_key(&mint.to_string())
    }

    /// Apply `f` to the record under the lock. `None` if the mint is unknown.
    pub fn update<R>(&self, mint: &Pubkey, f: impl FnOnce(&mut AssetRecord) -> R) -> Option<R> {
        self.assets.lock().get_mut(&mint.to_string()).map(f)
    }

    pub fn len(&self) -> usize {
        self.assets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.lock().is_empty()
    }

    /// Point-in-time copy of every record.
    pub fn snapshot(&self) -> Vec<AssetRecord> {
        self.assets.lock().values().cloned().collect()
    }

    pub fn record_acquisition(&self, mint: &Pubkey, acquisition: Acquisition) -> bool {
        self.update(mint, |record| {
            record.quantity_held = acquisition.quantity;
            record.acquisition_price_lamports = acquisition.price_lamports;
            record.owned_token_account = Some(acquisition.token_account);
            record.acquisition_signature = Some(acquisition.signature);
            record.flags.mark_acquired();
        })
        .is_some()
    }

    pub fn mark_exited_acquisition(&self, mint: &Pubkey) {
        self.update(mint, |record| record.flags.mark_exited_acquisition());
    }

    /// Returns `false` if the mint is unknown.
    pub fn flag_creator_exited(&self, mint: &Pubkey) -> bool {
        self.update(mint, |record| record.flags.mark_creator_exited())
            .is_some()
    }

    pub fn mark_exited_exit_monitor(&self, mint: &Pubkey) {
        self.update(mint, |record| record.flags.mark_exited_exit_monitor());
    }

    /// Whether the creator-exit monitor still has a reason to watch `mint`.
    pub fn monitor_directive(&self, mint: &Pubkey) -> MonitorDirective {
        let assets = self.assets.lock();
        let Some(record) = assets.get(&mint.to_string()) else {
            return MonitorDirective::Stop;
        };
        let flags = record.flags;
        let never_bought = flags.exited_acquisition() && !flags.acquired();
        let sold_out = flags.acquired() && !record.held();
        if never_bought || sold_out || flags.creator_exited() {
            MonitorDirective::Stop
        } else {
            MonitorDirective::Continue
        }
    }

    /// One disposal scan.
    ///
    /// Evicts records that will never need disposal, evicts records that used
    /// up `max_rounds` disposal races, and claims every held asset whose
    /// creator exited and that has no race running.
    pub fn sweep(&self, max_rounds: u32) -> SweepOutcome {
        let mut assets = self.assets.lock();
        let mut outcome = SweepOutcome::default();

        assets.retain(|_, record| {
            if record.disposal.race_active {
                return true;
            }
            if record.flags.exited_acquisition() && !record.held() {
                outcome.removed.push(record.mint);
                return false;
            }
            if record.disposal.failed_rounds >= max_rounds {
                outcome.abandoned.push(record.clone());
                return false;
            }
            true
        });

        for record in assets.values_mut() {
            if record.held() && record.flags.creator_exited() && !record.disposal.race_active {
                record.flags.mark_disposing();
                record.disposal.race_active = true;
                outcome.candidates.push(record.clone());
            }
        }

        outcome
    }

    /// Close a disposal race. A confirmed signature marks the asset disposed;
    /// otherwise the round counts as failed and the next sweep retries.
    pub fn finish_disposal(&self, mint: &Pubkey, confirmed: Option<Signature>) {
        self.update(mint, |record| {
            record.flags.mark_exited_disposal();
            record.disposal.race_active = false;
            match confirmed {
                Some(_) => record.flags.mark_disposed(),
                None => record.disposal.failed_rounds += 1,
            }
        });
    }
}
