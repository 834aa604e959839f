//! pump.fun buy/sell instruction builders

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};

use crate::sniffer::decoder::{BUY_DISCRIMINATOR, SELL_DISCRIMINATOR};
use crate::types::{AssetRecord, PUMP_FEE_RECIPIENT, PUMP_GLOBAL, PUMP_PROGRAM_ID};

/// Curve accounts a trade instruction needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveAccounts {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub event_authority: Pubkey,
}

impl From<&AssetRecord> for CurveAccounts {
    fn from(record: &AssetRecord) -> Self {
        Self {
            mint: record.mint,
            bonding_curve: record.bonding_curve,
            associated_bonding_curve: record.associated_bonding_curve,
            event_authority: record.event_authority,
        }
    }
}

/// The wallet's associated token account for `mint`.
pub fn owned_token_account(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_associated_token_address(wallet, mint)
}

/// Create the wallet's associated token account, paid by the wallet.
pub fn create_token_account_instruction(wallet: &Pubkey, mint: &Pubkey) -> Instruction {
    create_associated_token_account(wallet, wallet, mint, &spl_token::id())
}

fn trade_data(discriminator: [u8; 8], amount: u64, sol_limit: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&discriminator);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&sol_limit.to_le_bytes());
    data
}

/// pump `buy`: receive `amount` tokens spending at most `max_sol_cost` lamports.
pub fn buy_instruction(
    curve: &CurveAccounts,
    user: &Pubkey,
    user_token_account: &Pubkey,
    amount: u64,
    max_sol_cost: u64,
) -> Instruction {
    Instruction {
        program_id: PUMP_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new_readonly(PUMP_GLOBAL, false),
            AccountMeta::new(PUMP_FEE_RECIPIENT, false),
            AccountMeta::new_readonly(curve.mint, false),
            AccountMeta::new(curve.bonding_curve, false),
            AccountMeta::new(curve.associated_bonding_curve, false),
            AccountMeta::new(*user_token_account, false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(curve.event_authority, false),
            AccountMeta::new_readonly(PUMP_PROGRAM_ID, false),
        ],
        data: trade_data(BUY_DISCRIMINATOR, amount, max_sol_cost),
    }
}

/// pump `sell`: sell `amount` tokens for at least `min_sol_output` lamports.
pub fn sell_instruction(
    curve: &CurveAccounts,
    user: &Pubkey,
    user_token_account: &Pubkey,
    amount: u64,
    min_sol_output: u64,
) -> Instruction {
    Instruction {
        program_id: PUMP_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new_readonly(PUMP_GLOBAL, false),
            AccountMeta::new(PUMP_FEE_RECIPIENT, false),
            AccountMeta::new_readonly(curve.mint, false),
            AccountMeta::new(curve.bonding_curve, false),
            AccountMeta::new(curve.associated_bonding_curve, false),
            AccountMeta::new(*user_token_account, false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(curve.event_authority, false),
            AccountMeta::new_readonly(PUMP_PROGRAM_ID, false),
        ],
        data: trade_data(SELL_DISCRIMINATOR, amount, min_sol_output),
    }
}
