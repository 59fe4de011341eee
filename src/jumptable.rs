//! Jump-table recovery: turning an indirect branch's address computation
//! back into a concrete set of case targets. Regeneralized from
//! `decompiler_prototype/jumptable.rs`, which pattern-matched a single
//! `Load(PtrAdd(const_base, IntMult(index, size)))` shape directly off
//! `PcodeOp`/`Varnode`; this version moves that pattern match onto the
//! op/varnode bank types and splits the single function into a staged
//! early-fail / recover / verify pipeline, returning `AnalysisFailure`
//! instead of `None` on a failed guess.

use crate::address::Address;
use crate::error::AnalysisFailure;
use crate::opbank::OpBank;
use crate::pcode::{OpCode, OpId, VarnodeId};
use crate::varnode_bank::VarnodeBank;

#[derive(Debug, Clone)]
pub struct JumpTable {
    pub table_address: Address,
    pub entry_size: u32,
    pub num_entries: usize,
    pub destinations: Vec<Address>,
    pub switch_index_size: u32,
    pub normalized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTableStage {
    Unrecovered,
    PatternMatched,
    SizeRecovered,
    DestinationsLoaded,
    Normalized,
}

/// `earlyJumpTableFail`: rules out an indirect branch before spending any
/// effort on pattern matching — a `BRANCHIND` whose single input is
/// itself a function parameter or an unmodified load from a fixed return
/// slot isn't a switch at all. Returns the specific failure reason so
/// callers can decide whether the branch is actually a thunk, a
/// `CALLOTHER` dispatch, or a genuine recovery failure.
pub fn early_jump_table_fail(branch_op: OpId, ops: &OpBank, bank: &VarnodeBank) -> Option<AnalysisFailure> {
    let op = ops.get(branch_op)?;
    if op.opcode != OpCode::BranchInd {
        return Some(AnalysisFailure::JumpTableFailNormal);
    }
    let target = *op.inputs.first()?;
    let vn = bank.get(target)?;

    if vn.is_input() {
        return Some(AnalysisFailure::JumpTableFailNormal);
    }
    if let Some(def) = vn.def {
        if let Some(def_op) = ops.get(def) {
            if def_op.opcode == OpCode::CallOther {
                return Some(AnalysisFailure::JumpTableFailCallOther);
            }
        }
    }
    None
}

/// Bounds the `testForReturnAddress` chain walk below against a
/// pathological or cyclic def chain; real return-address reductions are
/// at most a couple of hops (a load, maybe an alignment mask).
const MAX_RETURN_ADDRESS_REDUCTION: usize = 8;

/// `testForReturnAddress`: a `BRANCHIND` whose target reduces, through a
/// chain of `COPY`/`INDIRECT`/`INT_AND` (the last of these an alignment
/// mask some architectures apply to a loaded return address), straight
/// back to the calling convention's return-address input varnode, is an
/// ordinary `RETURN` in disguise, not a switch.
pub fn test_for_return_address(branch_op: OpId, ops: &OpBank, bank: &VarnodeBank, return_address_space: u32) -> bool {
    let op = match ops.get(branch_op) {
        Some(op) => op,
        None => return false,
    };
    let target = match op.inputs.first() {
        Some(&t) => t,
        None => return false,
    };
    reduces_to_return_address(target, ops, bank, return_address_space, MAX_RETURN_ADDRESS_REDUCTION)
}

fn reduces_to_return_address(
    vn_id: VarnodeId,
    ops: &OpBank,
    bank: &VarnodeBank,
    return_address_space: u32,
    depth: usize,
) -> bool {
    let Some(vn) = bank.get(vn_id) else { return false };
    if vn.space_index == return_address_space && vn.flags.contains(crate::varnode::VarnodeFlags::RETURN_ADDRESS) {
        return true;
    }
    if depth == 0 {
        return false;
    }
    let Some(def_id) = vn.def else { return false };
    let Some(def_op) = ops.get(def_id) else { return false };
    match def_op.opcode {
        OpCode::Copy | OpCode::Indirect | OpCode::IntAnd => def_op
            .inputs
            .first()
            .is_some_and(|&input| reduces_to_return_address(input, ops, bank, return_address_space, depth - 1)),
        _ => false,
    }
}

/// One step of `stageJumpTable`: advances a partially-recovered table by
/// one stage, given the op bank to re-inspect the address computation.
/// Each call either advances `table.stage` or returns the failure that
/// stopped it, mirroring the four-step recovery (pattern match, then
/// size recovery, then destination loading, then normalization) rather
/// than doing everything in one pass.
pub struct JumpTableRecovery {
    pub stage: JumpTableStage,
    pub table: Option<JumpTable>,
}

impl JumpTableRecovery {
    pub fn new() -> Self {
        Self { stage: JumpTableStage::Unrecovered, table: None }
    }

    /// Matches `target = LOAD(table_base + index * entry_size)` off the
    /// branch's input chain.
    pub fn stage_jump_table(&mut self, branch_op: OpId, ops: &OpBank, bank: &VarnodeBank) -> Result<(), AnalysisFailure> {
        let op = ops.get(branch_op).ok_or(AnalysisFailure::JumpTableFailNormal)?;
        let target = *op.inputs.first().ok_or(AnalysisFailure::JumpTableFailNormal)?;
        let target_vn = bank.get(target).ok_or(AnalysisFailure::JumpTableFailNormal)?;
        let load_op_id = target_vn.def.ok_or(AnalysisFailure::JumpTableFailNormal)?;
        let load_op = ops.get(load_op_id).ok_or(AnalysisFailure::JumpTableFailNormal)?;
        if load_op.opcode != OpCode::Load || load_op.inputs.len() < 2 {
            return Err(AnalysisFailure::JumpTableFailNormal);
        }

        let addr_vn_id = load_op.inputs[1];
        let addr_vn = bank.get(addr_vn_id).ok_or(AnalysisFailure::JumpTableFailNormal)?;
        let addr_def = addr_vn.def.ok_or(AnalysisFailure::JumpTableFailNormal)?;
        let addr_op = ops.get(addr_def).ok_or(AnalysisFailure::JumpTableFailNormal)?;
        if addr_op.opcode != OpCode::PtrAdd || addr_op.inputs.len() < 2 {
            return Err(AnalysisFailure::JumpTableFailNormal);
        }

        let base_vn = bank.get(addr_op.inputs[0]).ok_or(AnalysisFailure::JumpTableFailNormal)?;
        if !base_vn.is_constant() {
            return Err(AnalysisFailure::JumpTableFailNormal);
        }
        let table_address = Address::new(base_vn.space_index, base_vn.offset);

        let mut entry_size = load_op.output.and_then(|o| bank.get(o)).map(|v| v.size).unwrap_or(8);
        if let Some(mult_vn) = bank.get(addr_op.inputs[1]) {
            if let Some(mult_def) = mult_vn.def {
                if let Some(mult_op) = ops.get(mult_def) {
                    if mult_op.opcode == OpCode::IntMult && mult_op.inputs.len() >= 2 {
                        if let Some(size_vn) = bank.get(mult_op.inputs[1]) {
                            if size_vn.is_constant() {
                                entry_size = size_vn.offset as u32;
                            }
                        }
                    }
                }
            }
        }

        self.table = Some(JumpTable {
            table_address,
            entry_size,
            num_entries: 0,
            destinations: Vec::new(),
            switch_index_size: entry_size,
            normalized: false,
        });
        self.stage = JumpTableStage::PatternMatched;
        tracing::debug!(?table_address, entry_size, "jump table pattern matched");
        Ok(())
    }

    /// Advances `PatternMatched -> SizeRecovered` once an upper bound on
    /// the index is known (e.g. from a preceding bounds-check compare);
    /// the core doesn't itself infer bounds checks, so callers supply the
    /// count directly (the out-of-scope image-reading layer does this by
    /// probing memory, per `LoadImage`).
    pub fn recover_size(&mut self, num_entries: usize) -> Result<(), AnalysisFailure> {
        let table = self.table.as_mut().ok_or(AnalysisFailure::JumpTableFailNormal)?;
        if self.stage != JumpTableStage::PatternMatched {
            return Err(AnalysisFailure::JumpTableFailNormal);
        }
        table.num_entries = num_entries;
        self.stage = JumpTableStage::SizeRecovered;
        Ok(())
    }

    /// Installs destinations fetched by the caller's `LoadImage`
    /// implementation — reading raw bytes is out of scope for this core.
    pub fn load_destinations(&mut self, destinations: Vec<Address>) -> Result<(), AnalysisFailure> {
        let table = self.table.as_mut().ok_or(AnalysisFailure::JumpTableFailNormal)?;
        if self.stage != JumpTableStage::SizeRecovered {
            return Err(AnalysisFailure::JumpTableFailNormal);
        }
        table.destinations = destinations;
        self.stage = JumpTableStage::DestinationsLoaded;
        Ok(())
    }

    /// Final normalization: every destination must be a concrete address
    /// in the same space as the branch's containing function; anything
    /// that fails this is dropped and, if that empties the table, the
    /// whole recovery reports `JumpTableFailNormal`.
    pub fn normalize(&mut self, code_space_index: u32) -> Result<(), AnalysisFailure> {
        let table = self.table.as_mut().ok_or(AnalysisFailure::JumpTableFailNormal)?;
        if self.stage != JumpTableStage::DestinationsLoaded {
            return Err(AnalysisFailure::JumpTableFailNormal);
        }
        table.destinations.retain(|d| d.space_index() == Some(code_space_index));
        if table.destinations.is_empty() {
            return Err(AnalysisFailure::JumpTableFailNormal);
        }
        table.normalized = true;
        self.stage = JumpTableStage::Normalized;
        Ok(())
    }
}

impl Default for JumpTableRecovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the full staged pipeline in one call for callers that already have
/// the bound/destinations in hand (e.g. a driver that just finished probing
/// the image via `LoadImage`) and want a single heterogeneous-error result
/// rather than threading `JumpTableRecovery` through four call sites.
pub fn recover(
    branch_op: OpId,
    ops: &OpBank,
    bank: &VarnodeBank,
    num_entries: usize,
    destinations: Vec<Address>,
    code_space_index: u32,
) -> anyhow::Result<JumpTable> {
    if let Some(fail) = early_jump_table_fail(branch_op, ops, bank) {
        return Err(fail.into());
    }
    let mut recovery = JumpTableRecovery::new();
    recovery.stage_jump_table(branch_op, ops, bank)?;
    recovery.recover_size(num_entries)?;
    recovery.load_destinations(destinations)?;
    recovery.normalize(code_space_index)?;
    Ok(recovery.table.expect("normalize succeeded"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BasicBlock, BlockGraph};
    use crate::pcode::SeqNum;
    use crate::varnode::VarnodeFlags;

    fn seq(n: u64) -> SeqNum {
        SeqNum::new(Address::new(0, 0x1000), n)
    }

    #[test]
    fn early_fail_rejects_parameter_targets() {
        let mut ops = OpBank::new();
        let mut bank = VarnodeBank::new();
        let mut graph = BlockGraph::new();
        let block = graph.add_block(BasicBlock::new());

        let target = bank.create(1, 0x10, 8);
        bank.set_input(target).unwrap();
        let branch = ops.new_op(OpCode::BranchInd, seq(0), vec![target]);
        ops.op_insert_end(branch, block, &mut graph).unwrap();

        assert_eq!(early_jump_table_fail(branch, &ops, &bank), Some(AnalysisFailure::JumpTableFailNormal));
    }

    #[test]
    fn return_address_target_is_detected() {
        let mut ops = OpBank::new();
        let mut bank = VarnodeBank::new();
        let mut graph = BlockGraph::new();
        let block = graph.add_block(BasicBlock::new());

        let target = bank.create(2, 0x0, 8);
        bank.get_mut(target).unwrap().flags.insert(VarnodeFlags::RETURN_ADDRESS);
        bank.set_input(target).unwrap();
        let branch = ops.new_op(OpCode::BranchInd, seq(0), vec![target]);
        ops.op_insert_end(branch, block, &mut graph).unwrap();

        assert!(test_for_return_address(branch, &ops, &bank, 2));
    }

    #[test]
    fn scenario_6_return_address_reduces_through_mask_and_copy() {
        let mut ops = OpBank::new();
        let mut bank = VarnodeBank::new();
        let mut graph = BlockGraph::new();
        let block = graph.add_block(BasicBlock::new());

        let retaddr = bank.create(2, 0x0, 8);
        bank.get_mut(retaddr).unwrap().flags.insert(VarnodeFlags::RETURN_ADDRESS);
        bank.set_input(retaddr).unwrap();

        let mask = bank.create(0, !0x3u64, 8);
        bank.get_mut(mask).unwrap().flags.insert(VarnodeFlags::CONSTANT);

        let and_op = ops.new_op(OpCode::IntAnd, seq(1), vec![]);
        ops.op_insert_end(and_op, block, &mut graph).unwrap();
        ops.op_set_input(and_op, 0, retaddr, &mut bank).unwrap();
        ops.op_set_input(and_op, 1, mask, &mut bank).unwrap();
        let masked = bank.create(1, 0x10, 8);
        ops.op_set_output(and_op, masked, &mut bank).unwrap();

        let copy = ops.new_op(OpCode::Copy, seq(2), vec![]);
        ops.op_insert_end(copy, block, &mut graph).unwrap();
        ops.op_set_input(copy, 0, masked, &mut bank).unwrap();
        let target = bank.create(1, 0x20, 8);
        ops.op_set_output(copy, target, &mut bank).unwrap();

        let branch = ops.new_op(OpCode::BranchInd, seq(3), vec![]);
        ops.op_insert_end(branch, block, &mut graph).unwrap();
        ops.op_set_input(branch, 0, target, &mut bank).unwrap();

        assert!(test_for_return_address(branch, &ops, &bank, 2));
    }

    #[test]
    fn scenario_6_unrelated_chain_is_not_a_return_address() {
        let mut ops = OpBank::new();
        let mut bank = VarnodeBank::new();
        let mut graph = BlockGraph::new();
        let block = graph.add_block(BasicBlock::new());

        let local = bank.create(1, 0x80, 8);
        let copy = ops.new_op(OpCode::Copy, seq(1), vec![]);
        ops.op_insert_end(copy, block, &mut graph).unwrap();
        ops.op_set_input(copy, 0, local, &mut bank).unwrap();
        let target = bank.create(1, 0x90, 8);
        ops.op_set_output(copy, target, &mut bank).unwrap();

        let branch = ops.new_op(OpCode::BranchInd, seq(2), vec![]);
        ops.op_insert_end(branch, block, &mut graph).unwrap();
        ops.op_set_input(branch, 0, target, &mut bank).unwrap();

        assert!(!test_for_return_address(branch, &ops, &bank, 2));
    }

    #[test]
    fn scenario_6_full_stage_pipeline_recovers_table() {
        let mut ops = OpBank::new();
        let mut bank = VarnodeBank::new();
        let mut graph = BlockGraph::new();
        let block = graph.add_block(BasicBlock::new());

        let base = bank.create(0, 0x8000, 8);
        bank.get_mut(base).unwrap().flags.insert(VarnodeFlags::CONSTANT);

        let index = bank.create(1, 0x20, 4);
        let size_const = bank.create(0, 8, 4);
        bank.get_mut(size_const).unwrap().flags.insert(VarnodeFlags::CONSTANT);

        let mult = ops.new_op(OpCode::IntMult, seq(1), vec![]);
        ops.op_insert_end(mult, block, &mut graph).unwrap();
        ops.op_set_input(mult, 0, index, &mut bank).unwrap();
        ops.op_set_input(mult, 1, size_const, &mut bank).unwrap();
        let offset = bank.create(1, 0x30, 8);
        ops.op_set_output(mult, offset, &mut bank).unwrap();

        let ptradd = ops.new_op(OpCode::PtrAdd, seq(2), vec![]);
        ops.op_insert_end(ptradd, block, &mut graph).unwrap();
        ops.op_set_input(ptradd, 0, base, &mut bank).unwrap();
        ops.op_set_input(ptradd, 1, offset, &mut bank).unwrap();
        let addr = bank.create(1, 0x40, 8);
        ops.op_set_output(ptradd, addr, &mut bank).unwrap();

        let load = ops.new_op(OpCode::Load, seq(3), vec![]);
        ops.op_insert_end(load, block, &mut graph).unwrap();
        let load_space = bank.create(0, 0, 4);
        ops.op_set_input(load, 0, load_space, &mut bank).unwrap();
        ops.op_set_input(load, 1, addr, &mut bank).unwrap();
        let target = bank.create(1, 0x50, 8);
        ops.op_set_output(load, target, &mut bank).unwrap();

        let branch = ops.new_op(OpCode::BranchInd, seq(4), vec![]);
        ops.op_insert_end(branch, block, &mut graph).unwrap();
        ops.op_set_input(branch, 0, target, &mut bank).unwrap();

        assert_eq!(early_jump_table_fail(branch, &ops, &bank), None);

        let mut recovery = JumpTableRecovery::new();
        recovery.stage_jump_table(branch, &ops, &bank).unwrap();
        assert_eq!(recovery.table.as_ref().unwrap().table_address, Address::new(0, 0x8000));
        assert_eq!(recovery.table.as_ref().unwrap().entry_size, 8);

        recovery.recover_size(3).unwrap();
        recovery
            .load_destinations(vec![Address::new(0, 0x2000), Address::new(0, 0x2010), Address::new(0, 0x2020)])
            .unwrap();
        recovery.normalize(0).unwrap();

        assert_eq!(recovery.stage, JumpTableStage::Normalized);
        assert_eq!(recovery.table.unwrap().destinations.len(), 3);
    }

    #[test]
    fn recover_runs_the_full_pipeline_in_one_call() {
        let mut ops = OpBank::new();
        let mut bank = VarnodeBank::new();
        let mut graph = BlockGraph::new();
        let block = graph.add_block(BasicBlock::new());

        let base = bank.create(0, 0x9000, 8);
        bank.get_mut(base).unwrap().flags.insert(VarnodeFlags::CONSTANT);
        let index = bank.create(1, 0x20, 4);
        let ptradd = ops.new_op(OpCode::PtrAdd, seq(1), vec![]);
        ops.op_insert_end(ptradd, block, &mut graph).unwrap();
        ops.op_set_input(ptradd, 0, base, &mut bank).unwrap();
        ops.op_set_input(ptradd, 1, index, &mut bank).unwrap();
        let addr = bank.create(1, 0x30, 8);
        ops.op_set_output(ptradd, addr, &mut bank).unwrap();

        let load = ops.new_op(OpCode::Load, seq(2), vec![]);
        ops.op_insert_end(load, block, &mut graph).unwrap();
        let load_space = bank.create(0, 0, 4);
        ops.op_set_input(load, 0, load_space, &mut bank).unwrap();
        ops.op_set_input(load, 1, addr, &mut bank).unwrap();
        let target = bank.create(1, 0x40, 8);
        ops.op_set_output(load, target, &mut bank).unwrap();

        let branch = ops.new_op(OpCode::BranchInd, seq(3), vec![]);
        ops.op_insert_end(branch, block, &mut graph).unwrap();
        ops.op_set_input(branch, 0, target, &mut bank).unwrap();

        let table = recover(branch, &ops, &bank, 2, vec![Address::new(0, 0x1000), Address::new(0, 0x1010)], 0).unwrap();
        assert_eq!(table.table_address, Address::new(0, 0x9000));
        assert_eq!(table.destinations.len(), 2);
    }
}
