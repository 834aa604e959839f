//! Instruction planning and ordering validation
//!
//! Every transaction this bot sends has the same shape:
//! 1. compute budget (priority fee, CU limit)
//! 2. optional setup (token account creation)
//! 3. the pump instruction
//! 4. optional incentive payment
//!
//! On the privileged path the priority fee instruction is dropped and the
//! incentive payment is appended instead.

use crate::tx_builder::errors::TransactionBuilderError;
use solana_sdk::{
    compute_budget::{self, ComputeBudgetInstruction},
    instruction::Instruction,
    system_program,
};

/// `ComputeBudgetInstruction::SetComputeUnitPrice` tag
const SET_COMPUTE_UNIT_PRICE_TAG: u8 = 3;

/// Plan of instructions for one transaction, kept in typed slots until
/// flattened by [`InstructionPlan::into_instructions`].
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionPlan {
    pub compute_price: Option<Instruction>,
    pub compute_limit: Option<Instruction>,
    pub setup: Vec<Instruction>,
    pub main: Instruction,
    pub tip: Option<Instruction>,
}

impl InstructionPlan {
    pub fn new(main: Instruction) -> Self {
        Self {
            compute_price: None,
            compute_limit: None,
            setup: Vec::new(),
            main,
            tip: None,
        }
    }

    /// Add compute budget instructions; zero values are skipped.
    pub fn with_compute_budget(mut self, cu_limit: u32, prio_fee: u64) -> Self {
        self.compute_limit =
            (cu_limit > 0).then(|| ComputeBudgetInstruction::set_compute_unit_limit(cu_limit));
        self.compute_price =
            (prio_fee > 0).then(|| ComputeBudgetInstruction::set_compute_unit_price(prio_fee));
        self
    }

    pub fn with_setup(mut self, ix: Instruction) -> Self {
        self.setup.push(ix);
        self
    }

    /// Pay the relay instead of the network: drop the priority fee, append `tip`.
    pub fn into_privileged(mut self, tip: Instruction) -> Self {
        self.compute_price = None;
        self.tip = Some(tip);
        self
    }

    pub fn is_privileged(&self) -> bool {
        self.tip.is_some()
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        let mut instructions = Vec::with_capacity(4 + self.setup.len());
        instructions.extend(self.compute_price);
        instructions.extend(self.compute_limit);
        instructions.extend(self.setup);
        instructions.push(self.main);
        instructions.extend(self.tip);
        instructions
    }
}

fn require_accounts(ix: &Instruction) -> Result<(), TransactionBuilderError> {
    if ix.accounts.is_empty() {
        return Err(TransactionBuilderError::instruction_failed(
            ix.program_id.to_string(),
            "instruction has no accounts",
        ));
    }
    Ok(())
}

/// Plan an acquisition: compute budget, optional token account creation, buy.
pub fn plan_buy_instructions(
    cu_limit: u32,
    prio_fee: u64,
    create_ata: Option<Instruction>,
    buy_ix: Instruction,
) -> Result<InstructionPlan, TransactionBuilderError> {
    require_accounts(&buy_ix)?;
    let mut plan = InstructionPlan::new(buy_ix).with_compute_budget(cu_limit, prio_fee);
    if let Some(ix) = create_ata {
        plan = plan.with_setup(ix);
    }
    Ok(plan)
}

/// Plan a disposal: compute budget, sell.
pub fn plan_sell_instructions(
    cu_limit: u32,
    prio_fee: u64,
    sell_ix: Instruction,
) -> Result<InstructionPlan, TransactionBuilderError> {
    require_accounts(&sell_ix)?;
    Ok(InstructionPlan::new(sell_ix).with_compute_budget(cu_limit, prio_fee))
}

fn is_compute_budget(ix: &Instruction) -> bool {
    ix.program_id == compute_budget::id()
}

fn is_compute_price(ix: &Instruction) -> bool {
    is_compute_budget(ix) && ix.data.first() == Some(&SET_COMPUTE_UNIT_PRICE_TAG)
}

/// Validate a flattened instruction list (debug/test only).
///
/// Compute budget instructions must lead. A privileged list carries no
/// priority fee and ends with a system transfer.
#[cfg(debug_assertions)]
pub fn sanity_check_ix_order(
    instructions: &[Instruction],
    privileged: bool,
) -> Result<(), TransactionBuilderError> {
    if instructions.is_empty() {
        return Err(TransactionBuilderError::invalid_order(
            "Instruction list is empty",
        ));
    }

    let leading = instructions
        .iter()
        .take_while(|ix| is_compute_budget(ix))
        .count();
    if instructions[leading..].iter().any(is_compute_budget) {
        return Err(TransactionBuilderError::invalid_order(
            "compute budget instruction after program instructions",
        ));
    }

    if privileged {
        if instructions.iter().any(is_compute_price) {
            return Err(TransactionBuilderError::invalid_order(
                "priority fee present on privileged path",
            ));
        }
        let ends_with_transfer = instructions
            .last()
            .map(|ix| ix.program_id == system_program::id())
            .unwrap_or(false);
        if !ends_with_transfer {
            return Err(TransactionBuilderError::invalid_order(
                "privileged path must end with the incentive transfer",
            ));
        }
    }
    Ok(())
}
