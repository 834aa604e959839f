//! Fixtures shared by unit tests, integration tests and benches.

use solana_sdk::pubkey::Pubkey;
use std::time::Instant;

use crate::types::{AssetRecord, CreatorPurchase, LaunchEvent};

pub fn sample_launch() -> LaunchEvent {
    LaunchEvent {
        mint: Pubkey::new_unique(),
        bonding_curve: Pubkey::new_unique(),
        associated_bonding_curve: Pubkey::new_unique(),
        event_authority: Pubkey::new_unique(),
        creator: Pubkey::new_unique(),
        metadata: None,
    }
}

pub fn sample_record(creator_max_sol_cost: u64) -> AssetRecord {
    let purchase = CreatorPurchase {
        max_sol_cost: creator_max_sol_cost,
        token_account: Pubkey::new_unique(),
    };
    AssetRecord::new(sample_launch(), purchase, Instant::now())
}

/// Bonding curve account bytes with the three reserve words.
pub fn encode_curve(real_tokens: u64, virtual_tokens: u64, virtual_sol: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(49);
    data.extend_from_slice(&real_tokens.to_le_bytes());
    data.extend_from_slice(&virtual_tokens.to_le_bytes());
    data.extend_from_slice(&virtual_sol.to_le_bytes());
    // real SOL reserves, token total supply, complete flag
    data.extend_from_slice(&0u64.to_le_bytes());
    data.extend_from_slice(&1_000_000_000_000_000u64.to_le_bytes());
    data.push(0);
    data
}
