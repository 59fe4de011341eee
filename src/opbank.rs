//! The op bank: an arena of `PcodeOp`s plus the alive/dead lists, the
//! per-opcode index, and the seqnum index. Grounded in
//! `varnode_bank.rs`'s arena-plus-sorted-index shape and
//! `decompiler_prototype/pcode.rs::PcodeEmitter`, which only ever
//! appended ops and never supported deletion, reordering, or opcode
//! rewriting; the primitive edit API here (`op_insert_*`, `op_destroy*`,
//! `op_unlink`) is new, generalized to support arbitrary mid-pass edits.

use crate::block::{BasicBlock, BlockGraph, BlockId};
use crate::error::LowLevelError;
use crate::pcode::{OpCode, OpFlags, OpId, PcodeOp, SeqNum, VarnodeId};
use crate::varnode_bank::VarnodeBank;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct OpBank {
    arena: Vec<Option<PcodeOp>>,
    /// Ops not yet marked dead, in seqnum order.
    alive: BTreeSet<(SeqNum, OpId)>,
    dead: Vec<OpId>,
    by_opcode: BTreeMap<OpCode, BTreeSet<OpId>>,
}

impl OpBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: OpId) -> Option<&PcodeOp> {
        self.arena.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: OpId) -> Option<&mut PcodeOp> {
        self.arena.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    /// `newOp(numInputs, seq) -> PcodeOp`: allocates an unlinked, unplaced
    /// op. Callers must `op_set_input`/`op_set_output` and `op_insert_*`
    /// before it participates in analysis.
    pub fn new_op(&mut self, opcode: OpCode, seq: SeqNum, inputs: Vec<VarnodeId>) -> OpId {
        let id = OpId(self.arena.len() as u32);
        let op = PcodeOp::new(seq, opcode, inputs, None);
        self.alive.insert((seq, id));
        self.by_opcode.entry(opcode).or_default().insert(id);
        self.arena.push(Some(op));
        id
    }

    /// Rewrites the opcode in place, updating the per-opcode index. Input
    /// count is not revalidated here; callers that care consult
    /// `OpCode::info()` themselves before calling.
    pub fn op_set_opcode(&mut self, id: OpId, opcode: OpCode) -> Result<(), LowLevelError> {
        let old = {
            let op = self.get(id).ok_or_else(|| LowLevelError::OpBankInvariantViolation("unknown op".into()))?;
            op.opcode
        };
        if let Some(set) = self.by_opcode.get_mut(&old) {
            set.remove(&id);
        }
        self.by_opcode.entry(opcode).or_default().insert(id);
        self.get_mut(id).unwrap().opcode = opcode;
        Ok(())
    }

    /// Sets input slot `slot`, updating the new varnode's descendant list
    /// and, if a varnode previously occupied that slot, removing this op
    /// from its descendant list.
    pub fn op_set_input(&mut self, id: OpId, slot: usize, vn: VarnodeId, bank: &mut VarnodeBank) -> Result<(), LowLevelError> {
        let op = self.get_mut(id).ok_or_else(|| LowLevelError::OpBankInvariantViolation("unknown op".into()))?;
        if slot >= op.inputs.len() {
            op.inputs.resize(slot + 1, VarnodeId(u32::MAX));
        }
        let old = op.inputs[slot];
        op.inputs[slot] = vn;
        if old.0 != u32::MAX {
            if let Some(old_vn) = bank.get_mut(old) {
                old_vn.descendants.retain(|&d| d != id);
            }
        }
        if let Some(new_vn) = bank.get_mut(vn) {
            if !new_vn.descendants.contains(&id) {
                new_vn.descendants.push(id);
            }
        }
        Ok(())
    }

    /// Sets the output varnode, linking it back via `VarnodeBank::set_def`.
    pub fn op_set_output(&mut self, id: OpId, vn: VarnodeId, bank: &mut VarnodeBank) -> Result<(), LowLevelError> {
        let seq = self.get(id).ok_or_else(|| LowLevelError::OpBankInvariantViolation("unknown op".into()))?.seq;
        bank.set_def(vn, id, seq)?;
        self.get_mut(id).unwrap().output = Some(vn);
        Ok(())
    }

    fn push_into_block(&mut self, id: OpId, block_id: BlockId, block: &mut BasicBlock, at: InsertAt) {
        match at {
            InsertAt::Begin => block.ops.insert(0, id),
            InsertAt::End => block.ops.push(id),
            InsertAt::Before(target) => {
                let pos = block.ops.iter().position(|&o| o == target).unwrap_or(block.ops.len());
                block.ops.insert(pos, id);
            }
            InsertAt::After(target) => {
                let pos = block.ops.iter().position(|&o| o == target).map(|p| p + 1).unwrap_or(block.ops.len());
                block.ops.insert(pos, id);
            }
        }
        if let Some(op) = self.get_mut(id) {
            op.parent = Some(block_id);
        }
    }

    pub fn op_insert_begin(&mut self, id: OpId, block_id: BlockId, graph: &mut BlockGraph) -> Result<(), LowLevelError> {
        let block = graph.block_mut(block_id).ok_or_else(|| LowLevelError::OpBankInvariantViolation("unknown block".into()))?;
        self.push_into_block(id, block_id, block, InsertAt::Begin);
        Ok(())
    }

    pub fn op_insert_end(&mut self, id: OpId, block_id: BlockId, graph: &mut BlockGraph) -> Result<(), LowLevelError> {
        let block = graph.block_mut(block_id).ok_or_else(|| LowLevelError::OpBankInvariantViolation("unknown block".into()))?;
        self.push_into_block(id, block_id, block, InsertAt::End);
        Ok(())
    }

    pub fn op_insert_before(&mut self, id: OpId, target: OpId, graph: &mut BlockGraph) -> Result<(), LowLevelError> {
        let block_id = self.get(target).and_then(|op| op.parent).ok_or_else(|| LowLevelError::OpBankInvariantViolation("target op is unplaced".into()))?;
        let block = graph.block_mut(block_id).ok_or_else(|| LowLevelError::OpBankInvariantViolation("unknown block".into()))?;
        self.push_into_block(id, block_id, block, InsertAt::Before(target));
        Ok(())
    }

    pub fn op_insert_after(&mut self, id: OpId, target: OpId, graph: &mut BlockGraph) -> Result<(), LowLevelError> {
        let block_id = self.get(target).and_then(|op| op.parent).ok_or_else(|| LowLevelError::OpBankInvariantViolation("target op is unplaced".into()))?;
        let block = graph.block_mut(block_id).ok_or_else(|| LowLevelError::OpBankInvariantViolation("unknown block".into()))?;
        self.push_into_block(id, block_id, block, InsertAt::After(target));
        Ok(())
    }

    /// Removes `id` from its block's op list without touching its
    /// input/output links, leaving it orphaned but still alive.
    pub fn op_unlink(&mut self, id: OpId, graph: &mut BlockGraph) {
        let parent = self.get(id).and_then(|op| op.parent);
        if let Some(block_id) = parent {
            if let Some(block) = graph.block_mut(block_id) {
                block.ops.retain(|&o| o != id);
            }
        }
        if let Some(op) = self.get_mut(id) {
            op.parent = None;
        }
    }

    /// Marks `id` dead: unlinks it, clears its input/output links in
    /// `bank`, and moves it from `alive` to `dead`. Precondition: its
    /// output, if any, has no descendants.
    pub fn op_destroy(&mut self, id: OpId, graph: &mut BlockGraph, bank: &mut VarnodeBank) -> Result<(), LowLevelError> {
        {
            let op = self.get(id).ok_or_else(|| LowLevelError::OpBankInvariantViolation("unknown op".into()))?;
            if let Some(out) = op.output {
                if let Some(vn) = bank.get(out) {
                    if !vn.descendants.is_empty() {
                        return Err(LowLevelError::OpBankInvariantViolation("destroy would orphan a read".into()));
                    }
                }
            }
        }
        self.op_unlink(id, graph);
        let (inputs, output, seq, opcode) = {
            let op = self.get(id).unwrap();
            (op.inputs.clone(), op.output, op.seq, op.opcode)
        };
        for input in inputs {
            if let Some(vn) = bank.get_mut(input) {
                vn.descendants.retain(|&d| d != id);
            }
        }
        if let Some(out) = output {
            bank.make_free(out, Some(seq));
        }
        self.alive.remove(&(seq, id));
        if let Some(set) = self.by_opcode.get_mut(&opcode) {
            set.remove(&id);
        }
        self.get_mut(id).unwrap().flags.insert(OpFlags::DEAD);
        self.dead.push(id);
        Ok(())
    }

    /// Destroys `id` and, transitively, any op whose sole remaining reader
    /// was `id` and which is itself now dead-eligible. Stops at ops with
    /// external descendants or with flags marking them live-required
    /// (`HOLDOUT`, `AUTO_LIVE`-style protections belong to the varnode,
    /// checked via `is_destroyable`).
    pub fn op_destroy_recursive(&mut self, id: OpId, graph: &mut BlockGraph, bank: &mut VarnodeBank) -> Result<(), LowLevelError> {
        let mut worklist = vec![id];
        while let Some(current) = worklist.pop() {
            let op = match self.get(current) {
                Some(op) if !op.is_dead() => op,
                _ => continue,
            };
            let inputs = op.inputs.clone();
            if self.op_destroy(current, graph, bank).is_err() {
                continue;
            }
            for input in inputs {
                if let Some(vn) = bank.get(input) {
                    if let Some(def) = vn.def {
                        if vn.descendants.is_empty() && !vn.is_input() {
                            worklist.push(def);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn iter_alive(&self) -> impl Iterator<Item = OpId> + '_ {
        self.alive.iter().map(|&(_, id)| id)
    }

    pub fn iter_dead(&self) -> impl Iterator<Item = OpId> + '_ {
        self.dead.iter().copied()
    }

    pub fn iter_by_opcode(&self, opcode: OpCode) -> impl Iterator<Item = OpId> + '_ {
        self.by_opcode.get(&opcode).into_iter().flat_map(|set| set.iter().copied())
    }
}

enum InsertAt {
    Begin,
    End,
    Before(OpId),
    After(OpId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn seq(n: u64) -> SeqNum {
        SeqNum::new(Address::new(0, 0x1000), n)
    }

    #[test]
    fn new_op_is_alive_and_indexed() {
        let mut ops = OpBank::new();
        let id = ops.new_op(OpCode::Copy, seq(0), vec![]);
        assert!(ops.iter_alive().any(|o| o == id));
        assert!(ops.iter_by_opcode(OpCode::Copy).any(|o| o == id));
    }

    #[test]
    fn insert_begin_and_end_order_correctly() {
        let mut ops = OpBank::new();
        let mut graph = BlockGraph::new();
        let block = graph.add_block(BasicBlock::new());
        let a = ops.new_op(OpCode::Copy, seq(0), vec![]);
        let b = ops.new_op(OpCode::Copy, seq(1), vec![]);
        ops.op_insert_end(a, block, &mut graph).unwrap();
        ops.op_insert_begin(b, block, &mut graph).unwrap();
        assert_eq!(graph.block(block).unwrap().ops, vec![b, a]);
    }

    #[test]
    fn destroy_requires_no_descendants() {
        let mut ops = OpBank::new();
        let mut graph = BlockGraph::new();
        let mut bank = VarnodeBank::new();
        let block = graph.add_block(BasicBlock::new());
        let def = ops.new_op(OpCode::Copy, seq(0), vec![]);
        let out = bank.create(1, 0x10, 4);
        ops.op_insert_end(def, block, &mut graph).unwrap();
        ops.op_set_output(def, out, &mut bank).unwrap();

        let read = ops.new_op(OpCode::IntAdd, seq(1), vec![]);
        ops.op_insert_end(read, block, &mut graph).unwrap();
        ops.op_set_input(read, 0, out, &mut bank).unwrap();

        assert!(ops.op_destroy(def, &mut graph, &mut bank).is_err());
        ops.op_destroy(read, &mut graph, &mut bank).unwrap();
        ops.op_destroy(def, &mut graph, &mut bank).unwrap();
        assert!(ops.get(def).unwrap().is_dead());
    }

    #[test]
    fn destroy_recursive_chases_now_dead_inputs() {
        let mut ops = OpBank::new();
        let mut graph = BlockGraph::new();
        let mut bank = VarnodeBank::new();
        let block = graph.add_block(BasicBlock::new());

        let def1 = ops.new_op(OpCode::Copy, seq(0), vec![]);
        let v1 = bank.create(1, 0x10, 4);
        ops.op_insert_end(def1, block, &mut graph).unwrap();
        ops.op_set_output(def1, v1, &mut bank).unwrap();

        let def2 = ops.new_op(OpCode::IntNegate, seq(1), vec![]);
        let v2 = bank.create(1, 0x20, 4);
        ops.op_insert_end(def2, block, &mut graph).unwrap();
        ops.op_set_input(def2, 0, v1, &mut bank).unwrap();
        ops.op_set_output(def2, v2, &mut bank).unwrap();

        ops.op_destroy_recursive(def2, &mut graph, &mut bank).unwrap();
        assert!(ops.get(def2).unwrap().is_dead());
        assert!(ops.get(def1).unwrap().is_dead());
    }
}
