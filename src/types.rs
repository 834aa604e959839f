//! Common types used throughout the application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey, pubkey::Pubkey, signature::Signature};
use std::time::Instant;
use tokio::sync::mpsc;

use crate::curve::BondingCurveSnapshot;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// pump.fun bonding curve program
pub const PUMP_PROGRAM_ID: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const PUMP_GLOBAL: Pubkey = pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf");
pub const PUMP_FEE_RECIPIENT: Pubkey = pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM");

/// Balances at or below this many base units are dust.
pub const DUST_THRESHOLD: u64 = 100;

/// Curve reserve level (SOL) a fresh launch starts from.
pub const LATE_ENTRY_BASELINE_SOL: f64 = 30.0;
/// Reserves beyond baseline + creator spend tolerated before entry counts as late.
pub const LATE_ENTRY_MARGIN_SOL: f64 = 0.1;
/// Fraction of the creator's disclosed max cost assumed to have been spent.
pub const CREATOR_SPEND_FACTOR: f64 = 0.99;

/// Receiver for admitted assets from the listener
pub type CandidateReceiver = mpsc::Receiver<AssetRecord>;

/// Sender for admitted assets to the buy engine
pub type CandidateSender = mpsc::Sender<AssetRecord>;

/// Token metadata carried by the pump `create` instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

/// Accounts touched by a pump `create` instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEvent {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub event_authority: Pubkey,
    pub creator: Pubkey,
    pub metadata: Option<TokenMetadata>,
}

/// The creator's own purchase bundled with the launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatorPurchase {
    /// Disclosed `max_sol_cost` of the creator's buy, in lamports
    pub max_sol_cost: u64,
    /// Token account receiving the creator's tokens
    pub token_account: Pubkey,
}

impl CreatorPurchase {
    /// Estimated SOL actually spent by the creator.
    pub fn sol(&self) -> f64 {
        CREATOR_SPEND_FACTOR * self.max_sol_cost as f64 / LAMPORTS_PER_SOL as f64
    }
}

/// Set-once lifecycle flags of a managed asset.
///
/// Every setter only ever moves a flag from `false` to `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleFlags {
    acquired: bool,
    exited_acquisition: bool,
    creator_exited: bool,
    exited_exit_monitor: bool,
    is_disposing: bool,
    exited_disposal: bool,
    disposed: bool,
}

impl LifecycleFlags {
    pub fn acquired(&self) -> bool {
        self.acquired
    }
    pub fn exited_acquisition(&self) -> bool {
        self.exited_acquisition
    }
    pub fn creator_exited(&self) -> bool {
        self.creator_exited
    }
    pub fn exited_exit_monitor(&self) -> bool {
        self.exited_exit_monitor
    }
    pub fn is_disposing(&self) -> bool {
        self.is_disposing
    }
    pub fn exited_disposal(&self) -> bool {
        self.exited_disposal
    }
    pub fn disposed(&self) -> bool {
        self.disposed
    }

    pub fn mark_acquired(&mut self) {
        self.acquired = true;
    }
    pub fn mark_exited_acquisition(&mut self) {
        self.exited_acquisition = true;
    }
    pub fn mark_creator_exited(&mut self) {
        self.creator_exited = true;
    }
    pub fn mark_exited_exit_monitor(&mut self) {
        self.exited_exit_monitor = true;
    }
    pub fn mark_disposing(&mut self) {
        self.is_disposing = true;
    }
    pub fn mark_exited_disposal(&mut self) {
        self.exited_disposal = true;
    }
    pub fn mark_disposed(&mut self) {
        self.disposed = true;
    }
}

/// Status view derived from [`LifecycleFlags`], used for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Admitted, acquisition still running
    Pending,
    /// Acquisition finished without a position
    AcquisitionFailed,
    /// Position open
    Acquired,
    /// A disposal race is running
    Disposing,
    /// Position closed by a confirmed sell
    Disposed,
}

/// Bookkeeping for disposal races, which may repeat until one confirms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposalProgress {
    /// A race is running right now
    pub race_active: bool,
    /// Races that ended without a confirmed sell
    pub failed_rounds: u32,
}

/// One asset under management, keyed by mint in the registry.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub event_authority: Pubkey,
    pub creator: Pubkey,
    pub creator_token_account: Pubkey,
    pub creator_purchased: bool,
    pub creator_max_sol_cost: u64,
    pub metadata: Option<TokenMetadata>,

    pub flags: LifecycleFlags,
    pub disposal: DisposalProgress,

    pub quantity_held: u64,
    pub acquisition_price_lamports: u64,
    pub acquisition_signature: Option<Signature>,
    pub owned_token_account: Option<Pubkey>,

    pub discovered_at: Instant,
    pub discovered_wall: DateTime<Utc>,
}

impl AssetRecord {
    pub fn new(launch: LaunchEvent, purchase: CreatorPurchase, discovered_at: Instant) -> Self {
        Self {
            mint: launch.mint,
            bonding_curve: launch.bonding_curve,
            associated_bonding_curve: launch.associated_bonding_curve,
            event_authority: launch.event_authority,
            creator: launch.creator,
            creator_token_account: purchase.token_account,
            creator_purchased: true,
            creator_max_sol_cost: purchase.max_sol_cost,
            metadata: launch.metadata,
            flags: LifecycleFlags::default(),
            disposal: DisposalProgress::default(),
            quantity_held: 0,
            acquisition_price_lamports: 0,
            acquisition_signature: None,
            owned_token_account: None,
            discovered_at,
            discovered_wall: Utc::now(),
        }
    }

    /// Registry key
    pub fn key(&self) -> String {
        self.mint.to_string()
    }

    pub fn creator_purchase(&self) -> CreatorPurchase {
        CreatorPurchase {
            max_sol_cost: self.creator_max_sol_cost,
            token_account: self.creator_token_account,
        }
    }

    /// Estimated SOL the creator spent at launch.
    pub fn creator_purchase_sol(&self) -> f64 {
        self.creator_purchase().sol()
    }

    /// Holding a non-dust balance that has not been sold.
    pub fn held(&self) -> bool {
        self.flags.acquired() && !self.flags.disposed() && self.quantity_held > DUST_THRESHOLD
    }

    /// Other buyers already pushed reserves past baseline plus the creator's spend.
    pub fn late_to_buy(&self, snapshot: &BondingCurveSnapshot) -> bool {
        snapshot.sol_reserves() - self.creator_purchase_sol() - LATE_ENTRY_BASELINE_SOL
            > LATE_ENTRY_MARGIN_SOL
    }

    pub fn lifecycle(&self) -> LifecycleState {
        if self.flags.disposed() {
            LifecycleState::Disposed
        } else if self.disposal.race_active {
            LifecycleState::Disposing
        } else if self.flags.acquired() {
            LifecycleState::Acquired
        } else if self.flags.exited_acquisition() {
            LifecycleState::AcquisitionFailed
        } else {
            LifecycleState::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_record;

    fn curve_with_sol(sol: f64) -> BondingCurveSnapshot {
        BondingCurveSnapshot {
            real_token_reserves: 0,
            virtual_token_reserves: 1_000_000,
            virtual_sol_reserves: (sol * LAMPORTS_PER_SOL as f64).round() as u64,
        }
    }

    #[test]
    fn test_creator_purchase_discount() {
        let record = sample_record(2_000_000_000);
        assert!((record.creator_purchase_sol() - 1.98).abs() < 1e-9);
    }

    #[test]
    fn test_late_entry_guard() {
        // max_sol_cost chosen so the estimated spend is exactly 1.0 SOL
        let record = sample_record(1_010_101_011);
        assert!((record.creator_purchase_sol() - 1.0).abs() < 1e-6);

        assert!(!record.late_to_buy(&curve_with_sol(31.0)));
        assert!(!record.late_to_buy(&curve_with_sol(31.09)));
        assert!(record.late_to_buy(&curve_with_sol(31.2)));
        assert!(record.late_to_buy(&curve_with_sol(45.0)));
    }

    #[test]
    fn test_held_requires_non_dust_balance() {
        let mut record = sample_record(1_000_000_000);
        record.quantity_held = 5_000;
        assert!(!record.held());

        record.flags.mark_acquired();
        assert!(record.held());

        record.quantity_held = DUST_THRESHOLD;
        assert!(!record.held());

        record.quantity_held = 5_000;
        record.flags.mark_disposed();
        assert!(!record.held());
    }

    #[test]
    fn test_lifecycle_view() {
        let mut record = sample_record(1_000_000_000);
        assert_eq!(record.lifecycle(), LifecycleState::Pending);

        record.flags.mark_exited_acquisition();
        assert_eq!(record.lifecycle(), LifecycleState::AcquisitionFailed);

        record.flags.mark_acquired();
        assert_eq!(record.lifecycle(), LifecycleState::Acquired);

        record.disposal.race_active = true;
        assert_eq!(record.lifecycle(), LifecycleState::Disposing);

        record.flags.mark_disposed();
        assert_eq!(record.lifecycle(), LifecycleState::Disposed);
    }

    #[test]
    fn test_creator_exit_before_acquisition_is_representable() {
        let mut record = sample_record(1_000_000_000);
        record.flags.mark_creator_exited();
        assert!(record.flags.creator_exited());
        assert!(!record.flags.acquired());
        assert_eq!(record.lifecycle(), LifecycleState::Pending);
    }
}
