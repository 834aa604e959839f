//! Instruction decoding for the pump, system and SPL token programs
//!
//! Classification goes through a closed [`InstructionKind`] enum. Pump
//! instructions are matched against a const table of 8-byte Anchor
//! discriminators; anything not in the table is `Unrecognized`.

use solana_sdk::{pubkey::Pubkey, system_program};
use spl_token::instruction::TokenInstruction;

use super::errors::DecodeError;
use crate::chain::{DecodedTransaction, ParsedInstruction};
use crate::types::{CreatorPurchase, LaunchEvent, TokenMetadata, PUMP_PROGRAM_ID};

pub const DISCRIMINATOR_LEN: usize = 8;

pub const CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];
pub const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
pub const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
pub const WITHDRAW_DISCRIMINATOR: [u8; 8] = [183, 18, 70, 156, 148, 109, 161, 34];
pub const INITIALIZE_DISCRIMINATOR: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];
pub const SET_PARAMS_DISCRIMINATOR: [u8; 8] = [165, 31, 134, 53, 189, 180, 130, 255];

/// System program `Transfer` tag (u32 LE)
const SYSTEM_TRANSFER_TAG: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    PumpCreate,
    PumpBuy,
    PumpSell,
    PumpWithdraw,
    PumpInitialize,
    PumpSetParams,
    SystemTransfer,
    TokenTransfer,
    TokenTransferChecked,
    Unrecognized,
}

const PUMP_TABLE: [([u8; 8], InstructionKind); 6] = [
    (CREATE_DISCRIMINATOR, InstructionKind::PumpCreate),
    (BUY_DISCRIMINATOR, InstructionKind::PumpBuy),
    (SELL_DISCRIMINATOR, InstructionKind::PumpSell),
    (WITHDRAW_DISCRIMINATOR, InstructionKind::PumpWithdraw),
    (INITIALIZE_DISCRIMINATOR, InstructionKind::PumpInitialize),
    (SET_PARAMS_DISCRIMINATOR, InstructionKind::PumpSetParams),
];

// pump `create` account layout
mod create_accounts {
    pub const MINT: usize = 0;
    pub const BONDING_CURVE: usize = 2;
    pub const ASSOCIATED_BONDING_CURVE: usize = 3;
    pub const USER: usize = 7;
    pub const EVENT_AUTHORITY: usize = 12;
}

// pump `buy` / `sell` share these positions
mod trade_accounts {
    pub const MINT: usize = 2;
    pub const ASSOCIATED_USER: usize = 5;
    pub const USER: usize = 6;
}

pub fn classify(ix: &ParsedInstruction) -> InstructionKind {
    if ix.program_id == PUMP_PROGRAM_ID {
        let Some(prefix) = ix.data.get(..DISCRIMINATOR_LEN) else {
            return InstructionKind::Unrecognized;
        };
        return PUMP_TABLE
            .iter()
            .find(|(disc, _)| disc.as_slice() == prefix)
            .map(|(_, kind)| *kind)
            .unwrap_or(InstructionKind::Unrecognized);
    }

    if ix.program_id == system_program::id() {
        return match read_u32(&ix.data, 0) {
            Some(SYSTEM_TRANSFER_TAG) if ix.data.len() >= 12 => InstructionKind::SystemTransfer,
            _ => InstructionKind::Unrecognized,
        };
    }

    if ix.program_id == spl_token::id() {
        return match TokenInstruction::unpack(&ix.data) {
            Ok(TokenInstruction::Transfer { .. }) => InstructionKind::TokenTransfer,
            Ok(TokenInstruction::TransferChecked { .. }) => InstructionKind::TokenTransferChecked,
            _ => InstructionKind::Unrecognized,
        };
    }

    InstructionKind::Unrecognized
}

/// Arguments and accounts of a pump `buy` or `sell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpTrade {
    pub mint: Pubkey,
    pub user: Pubkey,
    pub associated_user: Pubkey,
    pub amount: u64,
    /// `max_sol_cost` for buys, `min_sol_output` for sells
    pub sol_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemTransfer {
    pub from: Pubkey,
    pub to: Pubkey,
    pub lamports: u64,
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

fn account(
    ix: &ParsedInstruction,
    instruction: &'static str,
    index: usize,
) -> Result<Pubkey, DecodeError> {
    ix.accounts
        .get(index)
        .copied()
        .ok_or(DecodeError::MissingAccount { instruction, index })
}

/// Borsh string: u32 LE length followed by UTF-8 bytes. Returns the string and next offset.
fn read_string(data: &[u8], offset: usize) -> Result<(String, usize), DecodeError> {
    let truncated = |needed: usize| DecodeError::Truncated {
        instruction: "create",
        needed,
        got: data.len(),
    };
    let len = read_u32(data, offset).ok_or_else(|| truncated(offset + 4))? as usize;
    let start = offset + 4;
    let bytes = data
        .get(start..start + len)
        .ok_or_else(|| truncated(start + len))?;
    let value = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidString)?;
    Ok((value.to_string(), start + len))
}

fn decode_metadata(data: &[u8]) -> Result<TokenMetadata, DecodeError> {
    let (name, next) = read_string(data, DISCRIMINATOR_LEN)?;
    let (symbol, next) = read_string(data, next)?;
    let (uri, _) = read_string(data, next)?;
    Ok(TokenMetadata { name, symbol, uri })
}

/// Decode a pump `create`. Metadata is best effort; accounts are mandatory.
pub fn decode_create(ix: &ParsedInstruction) -> Result<LaunchEvent, DecodeError> {
    Ok(LaunchEvent {
        mint: account(ix, "create", create_accounts::MINT)?,
        bonding_curve: account(ix, "create", create_accounts::BONDING_CURVE)?,
        associated_bonding_curve: account(ix, "create", create_accounts::ASSOCIATED_BONDING_CURVE)?,
        event_authority: account(ix, "create", create_accounts::EVENT_AUTHORITY)?,
        creator: account(ix, "create", create_accounts::USER)?,
        metadata: decode_metadata(&ix.data).ok(),
    })
}

/// Decode a pump `buy` or `sell`: `amount: u64`, then the SOL limit `u64`.
pub fn decode_trade(ix: &ParsedInstruction) -> Result<PumpTrade, DecodeError> {
    let name = match classify(ix) {
        InstructionKind::PumpSell => "sell",
        _ => "buy",
    };
    let needed = DISCRIMINATOR_LEN + 16;
    let truncated = DecodeError::Truncated {
        instruction: name,
        needed,
        got: ix.data.len(),
    };
    let amount = read_u64(&ix.data, DISCRIMINATOR_LEN).ok_or_else(|| truncated.clone())?;
    let sol_limit = read_u64(&ix.data, DISCRIMINATOR_LEN + 8).ok_or(truncated)?;

    Ok(PumpTrade {
        mint: account(ix, name, trade_accounts::MINT)?,
        user: account(ix, name, trade_accounts::USER)?,
        associated_user: account(ix, name, trade_accounts::ASSOCIATED_USER)?,
        amount,
        sol_limit,
    })
}

pub fn decode_system_transfer(ix: &ParsedInstruction) -> Option<SystemTransfer> {
    if classify(ix) != InstructionKind::SystemTransfer {
        return None;
    }
    Some(SystemTransfer {
        from: *ix.accounts.first()?,
        to: *ix.accounts.get(1)?,
        lamports: read_u64(&ix.data, 4)?,
    })
}

/// Source token account of an SPL `Transfer` / `TransferChecked`.
pub fn token_transfer_source(ix: &ParsedInstruction) -> Option<Pubkey> {
    match classify(ix) {
        InstructionKind::TokenTransfer | InstructionKind::TokenTransferChecked => {
            ix.accounts.first().copied()
        }
        _ => None,
    }
}

/// Launch accounts plus the creator's own buy from a pump launch transaction.
pub fn decode_launch(tx: &DecodedTransaction) -> Result<(LaunchEvent, CreatorPurchase), DecodeError> {
    let create = tx
        .instructions
        .iter()
        .find(|ix| classify(ix) == InstructionKind::PumpCreate)
        .ok_or(DecodeError::MissingCreate)?;
    let launch = decode_create(create)?;

    let purchase = tx
        .instructions
        .iter()
        .filter(|ix| classify(ix) == InstructionKind::PumpBuy)
        .filter_map(|ix| decode_trade(ix).ok())
        .find(|trade| trade.user == launch.creator && trade.mint == launch.mint)
        .map(|trade| CreatorPurchase {
            max_sol_cost: trade.sol_limit,
            token_account: trade.associated_user,
        })
        .ok_or(DecodeError::NoCreatorBuy {
            creator: launch.creator,
        })?;

    Ok((launch, purchase))
}

/// Does `tx`, taken from the history of `token_account`, show its holder exiting?
///
/// Any successful top-level pump `sell` counts, whoever is named as the
/// seller. So does an SPL transfer whose source is `token_account` at any
/// instruction depth.
pub fn shows_exit(tx: &DecodedTransaction, token_account: &Pubkey) -> bool {
    if tx.failed {
        return false;
    }
    if tx
        .instructions
        .iter()
        .any(|ix| classify(ix) == InstructionKind::PumpSell)
    {
        return true;
    }
    tx.instructions
        .iter()
        .chain(tx.inner_instructions.iter())
        .filter_map(token_transfer_source)
        .any(|source| source == *token_account)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    fn borsh_string(out: &mut Vec<u8>, value: &str) {
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value.as_bytes());
    }

    pub fn create_ix(launch: &LaunchEvent) -> ParsedInstruction {
        let mut data = CREATE_DISCRIMINATOR.to_vec();
        borsh_string(&mut data, "Test Coin");
        borsh_string(&mut data, "TEST");
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

    pub fn trade_ix(
        discriminator: [u8; 8],
        mint: Pubkey,
        user: Pubkey,
        associated_user: Pubkey,
        amount: u64,
        sol_limit: u64,
    ) -> ParsedInstruction {
        let mut data = discriminator.to_vec();
        data.extend_from_slice(&amount.to_le_bytes());
        data.extend_from_slice(&sol_limit.to_le_bytes());

        let mut accounts: Vec<Pubkey> = (0..12).map(|_| Pubkey::new_unique()).collect();
        accounts[2] = mint;
        accounts[5] = associated_user;
        accounts[6] = user;

        ParsedInstruction {
            program_id: PUMP_PROGRAM_ID,
            accounts,
            data,
        }
    }

    pub fn system_transfer_ix(from: Pubkey, to: Pubkey, lamports: u64) -> ParsedInstruction {
        let mut data = SYSTEM_TRANSFER_TAG.to_le_bytes().to_vec();
        data.extend_from_slice(&lamports.to_le_bytes());
        ParsedInstruction {
            program_id: system_program::id(),
            accounts: vec![from, to],
            data,
        }
    }

    pub fn token_transfer_ix(source: Pubkey, destination: Pubkey, amount: u64) -> ParsedInstruction {
        let data = TokenInstruction::Transfer { amount }.pack();
        ParsedInstruction {
            program_id: spl_token::id(),
            accounts: vec![source, destination, Pubkey::new_unique()],
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::test_utils::sample_launch;
    use solana_sdk::signature::Signature;

    fn tx(instructions: Vec<ParsedInstruction>, inner: Vec<ParsedInstruction>) -> DecodedTransaction {
        DecodedTransaction {
            signature: Signature::default(),
            instructions,
            inner_instructions: inner,
            failed: false,
        }
    }

    #[test]
    fn test_classify_pump_table() {
        let launch = sample_launch();
        assert_eq!(classify(&create_ix(&launch)), InstructionKind::PumpCreate);

        let p = Pubkey::new_unique();
        for (disc, kind) in PUMP_TABLE {
            let ix = trade_ix(disc, p, p, p, 1, 1);
            assert_eq!(classify(&ix), kind);
        }
    }

    #[test]
    fn test_classify_unrecognized() {
        let ix = ParsedInstruction {
            program_id: PUMP_PROGRAM_ID,
            accounts: vec![],
            data: vec![1, 2, 3, 4, 5, 6, 7, 8, 9],
        };
        assert_eq!(classify(&ix), InstructionKind::Unrecognized);

        let short = ParsedInstruction {
            program_id: PUMP_PROGRAM_ID,
            accounts: vec![],
            data: vec![24, 30],
        };
        assert_eq!(classify(&short), InstructionKind::Unrecognized);

        let other = ParsedInstruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![],
            data: CREATE_DISCRIMINATOR.to_vec(),
        };
        assert_eq!(classify(&other), InstructionKind::Unrecognized);
    }

    #[test]
    fn test_decode_create_with_metadata() {
        let launch = sample_launch();
        let decoded = decode_create(&create_ix(&launch)).unwrap();
        assert_eq!(decoded.mint, launch.mint);
        assert_eq!(decoded.creator, launch.creator);
        assert_eq!(decoded.event_authority, launch.event_authority);
        let metadata = decoded.metadata.unwrap();
        assert_eq!(metadata.symbol, "TEST");
        assert_eq!(metadata.uri, "https://example.com/meta.json");
    }

    #[test]
    fn test_decode_create_missing_accounts() {
        let launch = sample_launch();
        let mut ix = create_ix(&launch);
        ix.accounts.truncate(8);
        assert_eq!(
            decode_create(&ix),
            Err(DecodeError::MissingAccount {
                instruction: "create",
                index: 12
            })
        );
    }

    #[test]
    fn test_decode_trade_truncated() {
        let p = Pubkey::new_unique();
        let mut ix = trade_ix(BUY_DISCRIMINATOR, p, p, p, 10, 20);
        ix.data.truncate(20);
        assert!(matches!(
            decode_trade(&ix),
            Err(DecodeError::Truncated { instruction: "buy", .. })
        ));
    }

    #[test]
    fn test_decode_launch_finds_creator_buy() {
        let launch = sample_launch();
        let creator_ata = Pubkey::new_unique();
        let stranger = Pubkey::new_unique();
        let tx = tx(
            vec![
                create_ix(&launch),
                trade_ix(BUY_DISCRIMINATOR, launch.mint, stranger, Pubkey::new_unique(), 5, 9),
                trade_ix(BUY_DISCRIMINATOR, launch.mint, launch.creator, creator_ata, 1_000, 1_500_000_000),
            ],
            vec![],
        );

        let (decoded, purchase) = decode_launch(&tx).unwrap();
        assert_eq!(decoded.mint, launch.mint);
        assert_eq!(purchase.max_sol_cost, 1_500_000_000);
        assert_eq!(purchase.token_account, creator_ata);
    }

    #[test]
    fn test_decode_launch_without_creator_buy() {
        let launch = sample_launch();
        let create_only = tx(vec![create_ix(&launch)], vec![]);
        assert_eq!(
            decode_launch(&create_only),
            Err(DecodeError::NoCreatorBuy {
                creator: launch.creator
            })
        );
        assert_eq!(
            decode_launch(&tx(vec![], vec![])),
            Err(DecodeError::MissingCreate)
        );
    }

    #[test]
    fn test_system_transfer_decode() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let decoded = decode_system_transfer(&system_transfer_ix(from, to, 77)).unwrap();
        assert_eq!(decoded, SystemTransfer { from, to, lamports: 77 });

        let mut not_transfer = system_transfer_ix(from, to, 77);
        not_transfer.data[0] = 0;
        assert!(decode_system_transfer(&not_transfer).is_none());
    }

    #[test]
    fn test_shows_exit_on_inner_transfer() {
        let creator_ata = Pubkey::new_unique();
        let inner = token_transfer_ix(creator_ata, Pubkey::new_unique(), 10);
        assert!(shows_exit(&tx(vec![], vec![inner.clone()]), &creator_ata));

        let unrelated = token_transfer_ix(Pubkey::new_unique(), creator_ata, 10);
        assert!(!shows_exit(&tx(vec![], vec![unrelated]), &creator_ata));

        let mut failed = tx(vec![], vec![inner]);
        failed.failed = true;
        assert!(!shows_exit(&failed, &creator_ata));
    }

    #[test]
    fn test_shows_exit_on_sell() {
        let creator_ata = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let sell = trade_ix(SELL_DISCRIMINATOR, mint, Pubkey::new_unique(), creator_ata, 1_000, 1);
        assert!(shows_exit(&tx(vec![sell], vec![]), &creator_ata));

        let buy = trade_ix(BUY_DISCRIMINATOR, mint, Pubkey::new_unique(), creator_ata, 1_000, 1);
        assert!(!shows_exit(&tx(vec![buy], vec![]), &creator_ata));
    }

    #[test]
    fn test_shows_exit_on_sell_from_other_account() {
        // A sell in the creator account's history counts even when the
        // instruction names a different token account.
        let creator_ata = Pubkey::new_unique();
        let sell = trade_ix(
            SELL_DISCRIMINATOR,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            1_000,
            1,
        );
        assert!(shows_exit(&tx(vec![sell.clone()], vec![]), &creator_ata));

        let mut failed = tx(vec![sell], vec![]);
        failed.failed = true;
        assert!(!shows_exit(&failed, &creator_ata));
    }
}
