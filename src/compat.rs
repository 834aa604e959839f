//! Compatibility layer for versioned Solana messages
//!
//! Legacy and V0 messages expose their account keys differently, and V0
//! messages may reference addresses loaded from lookup tables. The helpers
//! here turn either format into [`ParsedInstruction`]s whose account indices
//! are already resolved to addresses.
//!
//! Key order for V0 follows the runtime: static keys, then loaded writable
//! addresses, then loaded readonly addresses.

use solana_sdk::{
    instruction::CompiledInstruction,
    message::VersionedMessage,
    pubkey::Pubkey,
};

use crate::chain::ParsedInstruction;

/// Static account keys embedded in the message.
///
/// For V0 messages this excludes lookup-table addresses.
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// Top-level compiled instructions of either message format.
#[inline]
#[must_use]
pub fn get_instructions(message: &VersionedMessage) -> &[CompiledInstruction] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.instructions,
        VersionedMessage::V0(v0_msg) => &v0_msg.instructions,
    }
}

/// Full key list: static keys followed by loaded writable and readonly addresses.
pub fn full_account_keys(
    message: &VersionedMessage,
    loaded_writable: &[Pubkey],
    loaded_readonly: &[Pubkey],
) -> Vec<Pubkey> {
    let static_keys = get_static_account_keys(message);
    let mut keys =
        Vec::with_capacity(static_keys.len() + loaded_writable.len() + loaded_readonly.len());
    keys.extend_from_slice(static_keys);
    keys.extend_from_slice(loaded_writable);
    keys.extend_from_slice(loaded_readonly);
    keys
}

/// Resolve an instruction's index references against `keys`.
///
/// Returns `None` if any index is out of range.
pub fn resolve_instruction(
    program_id_index: u8,
    account_indices: &[u8],
    data: Vec<u8>,
    keys: &[Pubkey],
) -> Option<ParsedInstruction> {
    let program_id = *keys.get(program_id_index as usize)?;
    let accounts = account_indices
        .iter()
        .map(|&index| keys.get(index as usize).copied())
        .collect::<Option<Vec<_>>>()?;
    Some(ParsedInstruction {
        program_id,
        accounts,
        data,
    })
}

/// Resolve every top-level instruction of `message`, skipping malformed ones.
pub fn resolve_message_instructions(
    message: &VersionedMessage,
    keys: &[Pubkey],
) -> Vec<ParsedInstruction> {
    get_instructions(message)
        .iter()
        .filter_map(|ix| resolve_instruction(ix.program_id_index, &ix.accounts, ix.data.clone(), keys))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        message::{v0::Message as MessageV0, Message, VersionedMessage},
        signature::Keypair,
        signer::Signer,
        system_program,
    };
    #[allow(deprecated)]
    use solana_sdk::system_instruction;

    #[test]
    fn test_legacy_instruction_resolution() {
        let payer = Keypair::new();
        let recipient = Pubkey::new_unique();

        let instruction = system_instruction::transfer(&payer.pubkey(), &recipient, 1000);
        let message = VersionedMessage::Legacy(Message::new(&[instruction], Some(&payer.pubkey())));

        let keys = full_account_keys(&message, &[], &[]);
        let resolved = resolve_message_instructions(&message, &keys);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].program_id, system_program::id());
        assert_eq!(resolved[0].accounts, vec![payer.pubkey(), recipient]);
    }

    #[test]
    fn test_v0_instruction_resolution() {
        let payer = Keypair::new();
        let recipient = Pubkey::new_unique();

        let instruction = system_instruction::transfer(&payer.pubkey(), &recipient, 1000);
        let message_v0 =
            MessageV0::try_compile(&payer.pubkey(), &[instruction], &[], Hash::default()).unwrap();
        let message = VersionedMessage::V0(message_v0);

        assert_eq!(get_static_account_keys(&message)[0], payer.pubkey());
        let keys = full_account_keys(&message, &[], &[]);
        let resolved = resolve_message_instructions(&message, &keys);
        assert_eq!(resolved[0].accounts[1], recipient);
    }

    #[test]
    fn test_loaded_addresses_follow_static_keys() {
        let payer = Keypair::new();
        let message = VersionedMessage::Legacy(Message::new(&[], Some(&payer.pubkey())));
        let writable = Pubkey::new_unique();
        let readonly = Pubkey::new_unique();

        let keys = full_account_keys(&message, &[writable], &[readonly]);
        assert_eq!(keys, vec![payer.pubkey(), writable, readonly]);

        // index 1 and 2 now point into the loaded section
        let ix = resolve_instruction(2, &[0, 1], vec![9], &keys).unwrap();
        assert_eq!(ix.program_id, readonly);
        assert_eq!(ix.accounts, vec![payer.pubkey(), writable]);
    }

    #[test]
    fn test_out_of_range_index_is_skipped() {
        let keys = vec![Pubkey::new_unique()];
        assert!(resolve_instruction(0, &[0, 5], vec![], &keys).is_none());
        assert!(resolve_instruction(3, &[], vec![], &keys).is_none());
    }
}
