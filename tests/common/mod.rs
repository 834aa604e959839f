//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{pubkey::Pubkey, signature::Signature, system_program};
use spl_token::instruction::TokenInstruction;
use std::time::Duration;

use sniper::chain::{DecodedTransaction, ParsedInstruction};
use sniper::rpc_manager::{DispatchError, Route, TxDispatcher};
use sniper::sniffer::decoder::{BUY_DISCRIMINATOR, CREATE_DISCRIMINATOR, SELL_DISCRIMINATOR};
use sniper::tx_builder::InstructionPlan;
use sniper::types::{LaunchEvent, PUMP_PROGRAM_ID};

/// Records every plan and confirms after `latency`, failing the first
/// `failures` dispatches.
pub struct MockDispatcher {
    plans: Mutex<Vec<InstructionPlan>>,
    failures: usize,
    latency: Duration,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::with_failures(0, Duration::ZERO)
    }

    pub fn with_failures(failures: usize, latency: Duration) -> Self {
        Self {
            plans: Mutex::new(Vec::new()),
            failures,
            latency,
        }
    }

    pub fn plans(&self) -> Vec<InstructionPlan> {
        self.plans.lock().clone()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.plans.lock().iter().map(Route::of).collect()
    }

    /// Discriminators of each dispatched plan's main instruction.
    pub fn kinds(&self) -> Vec<[u8; 8]> {
        self.plans
            .lock()
            .iter()
            .map(|plan| {
                let mut disc = [0u8; 8];
                disc.copy_from_slice(&plan.main.data[..8]);
                disc
            })
            .collect()
    }
}

#[async_trait]
impl TxDispatcher for MockDispatcher {
    async fn dispatch(&self, plan: InstructionPlan) -> Result<Signature, DispatchError> {
        let n = {
            let mut plans = self.plans.lock();
            plans.push(plan);
            plans.len()
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if n <= self.failures {
            return Err(DispatchError::Bundle("dropped".into()));
        }
        Ok(Signature::new_unique())
    }
}

pub fn launch() -> LaunchEvent {
    LaunchEvent {
        mint: Pubkey::new_unique(),
        bonding_curve: Pubkey::new_unique(),
        associated_bonding_curve: Pubkey::new_unique(),
        event_authority: Pubkey::new_unique(),
        creator: Pubkey::new_unique(),
        metadata: None,
    }
}

fn borsh_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

pub fn create_ix(launch: &LaunchEvent, name: &str, symbol: &str) -> ParsedInstruction {
    let mut data = CREATE_DISCRIMINATOR.to_vec();
    borsh_string(&mut data, name);
    borsh_string(&mut data, symbol);
    borsh_string(&mut data, "https://example.com/meta.json");

    let mut accounts: Vec<Pubkey> = (0..14).map(|_| Pubkey::new_unique()).collect();
    accounts[0] = launch.mint;
    accounts[2] = launch.bonding_curve;
    accounts[3] = launch.associated_bonding_curve;
    accounts[7] = launch.creator;
    accounts[12] = launch.event_authority;
    ParsedInstruction {
        program_id: PUMP_PROGRAM_ID,
        accounts,
        data,
    }
}

fn trade_ix(
    discriminator: [u8; 8],
    mint: Pubkey,
    user: Pubkey,
    token_account: Pubkey,
    amount: u64,
    sol_limit: u64,
) -> ParsedInstruction {
    let mut data = discriminator.to_vec();
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&sol_limit.to_le_bytes());

    let mut accounts: Vec<Pubkey> = (0..12).map(|_| Pubkey::new_unique()).collect();
    accounts[2] = mint;
    accounts[5] = token_account;
    accounts[6] = user;
    ParsedInstruction {
        program_id: PUMP_PROGRAM_ID,
        accounts,
        data,
    }
}

pub fn buy_ix(launch: &LaunchEvent, token_account: Pubkey, sol_limit: u64) -> ParsedInstruction {
    trade_ix(
        BUY_DISCRIMINATOR,
        launch.mint,
        launch.creator,
        token_account,
        30_000_000_000_000,
        sol_limit,
    )
}

pub fn sell_ix(launch: &LaunchEvent, token_account: Pubkey) -> ParsedInstruction {
    trade_ix(SELL_DISCRIMINATOR, launch.mint, launch.creator, token_account, 1_000, 1)
}

pub fn system_transfer_ix(from: Pubkey, to: Pubkey, lamports: u64) -> ParsedInstruction {
    let mut data = 2u32.to_le_bytes().to_vec();
    data.extend_from_slice(&lamports.to_le_bytes());
    ParsedInstruction {
        program_id: system_program::id(),
        accounts: vec![from, to],
        data,
    }
}

pub fn token_transfer_ix(source: Pubkey, destination: Pubkey, amount: u64) -> ParsedInstruction {
    ParsedInstruction {
        program_id: spl_token::id(),
        accounts: vec![source, destination, Pubkey::new_unique()],
        data: TokenInstruction::Transfer { amount }.pack(),
    }
}

pub fn transaction(
    instructions: Vec<ParsedInstruction>,
    inner_instructions: Vec<ParsedInstruction>,
) -> DecodedTransaction {
    DecodedTransaction {
        signature: Signature::new_unique(),
        instructions,
        inner_instructions,
        failed: false,
    }
}

/// Bonding curve account bytes: token and SOL reserves, then padding fields.
pub fn curve_account(real_tokens: u64, virtual_tokens: u64, virtual_sol: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(49);
    data.extend_from_slice(&real_tokens.to_le_bytes());
    data.extend_from_slice(&virtual_tokens.to_le_bytes());
    data.extend_from_slice(&virtual_sol.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());
    data.extend_from_slice(&1_000_000_000_000_000u64.to_le_bytes());
    data.push(0);
    data
}

/// Curve state right after the creator's own buy.
pub fn fresh_curve() -> Vec<u8> {
    curve_account(793_100_000_000_000, 1_073_000_000_000_000, 31_000_000_000)
}

/// Poll `condition` every 5ms for up to `attempts` tries.
pub async fn wait_until(attempts: usize, mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..attempts {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
