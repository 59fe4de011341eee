//! SSA construction ("heritage", in Ghidra's own terminology): dominance
//! frontier computation, phi (MULTIEQUAL) placement, and renaming.
//! Grounded in `ssa.rs::SsaBuilder`, which already did
//! phi-insertion-plus-renaming for a single synthetic variable; this
//! version generalizes it to storage *address ranges* (so registers and
//! stack slots heritage independently), adds load/store guard ops, and
//! adds a dead-code-delay counter so passes don't heritage a range
//! before its defining ops have stabilized.

use crate::block::{BlockGraph, BlockId};
use crate::opbank::OpBank;
use crate::pcode::{OpCode, OpId, SeqNum, VarnodeId};
use crate::varnode_bank::VarnodeBank;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Standard Cytron/Ferrante/Rosen/Wegman/Zadeck dominance-frontier
/// computation from an already-computed dominator tree.
pub fn dominance_frontier(graph: &BlockGraph) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
    let mut df: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    for b in graph.block_ids() {
        df.entry(b).or_default();
    }
    for b in graph.block_ids() {
        let preds = graph.predecessors(b);
        if preds.len() < 2 {
            continue;
        }
        let idom_b = match graph.immediate_dominator(b) {
            Some(d) => d,
            None => continue,
        };
        for p in preds {
            let mut runner = p;
            while runner != idom_b {
                df.entry(runner).or_default().insert(b);
                match graph.immediate_dominator(runner) {
                    Some(next) => runner = next,
                    None => break,
                }
            }
        }
    }
    df
}

/// Iterates `dominance_frontier` to a fixed point over a seed set of
/// definition blocks: `DF+(S) = DF(S) ∪ DF(DF(S)) ∪ ...`.
pub fn iterated_dominance_frontier(df: &BTreeMap<BlockId, BTreeSet<BlockId>>, seeds: &BTreeSet<BlockId>) -> BTreeSet<BlockId> {
    let mut result = BTreeSet::new();
    let mut worklist: Vec<BlockId> = seeds.iter().copied().collect();
    while let Some(b) = worklist.pop() {
        if let Some(frontier) = df.get(&b) {
            for &f in frontier {
                if result.insert(f) {
                    worklist.push(f);
                }
            }
        }
    }
    result
}

/// One heritaged storage range: a register or stack slot being tracked
/// through SSA construction. Dead-code-delay gates re-heritaging the same
/// range until `delay` further passes have observed no new defs, so that
/// transient load/store guards don't thrash.
#[derive(Debug, Clone)]
pub struct HeritageInfo {
    pub space_index: u32,
    pub offset: u64,
    pub size: u32,
    pub pass_count: u32,
    pub dead_code_delay: u32,
    pub guard_dirty: bool,
}

impl HeritageInfo {
    pub fn new(space_index: u32, offset: u64, size: u32) -> Self {
        Self { space_index, offset, size, pass_count: 0, dead_code_delay: 2, guard_dirty: true }
    }

    /// True once `pass_count` has exceeded the delay without the guard
    /// being re-dirtied — i.e. it's safe to trust this range's SSA form.
    pub fn is_stable(&self) -> bool {
        !self.guard_dirty && self.pass_count >= self.dead_code_delay
    }

    pub fn mark_pass(&mut self) {
        self.pass_count += 1;
    }

    pub fn mark_dirty(&mut self) {
        self.guard_dirty = true;
        self.pass_count = 0;
    }

    pub fn mark_clean(&mut self) {
        self.guard_dirty = false;
    }
}

/// Tracks heritage state for every storage range seen so far in a function.
#[derive(Debug, Default)]
pub struct HeritageState {
    ranges: HashMap<(u32, u64, u32), HeritageInfo>,
}

impl HeritageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, space_index: u32, offset: u64, size: u32) {
        self.ranges.entry((space_index, offset, size)).or_insert_with(|| HeritageInfo::new(space_index, offset, size));
    }

    pub fn info(&self, space_index: u32, offset: u64, size: u32) -> Option<&HeritageInfo> {
        self.ranges.get(&(space_index, offset, size))
    }

    pub fn info_mut(&mut self, space_index: u32, offset: u64, size: u32) -> Option<&mut HeritageInfo> {
        self.ranges.get_mut(&(space_index, offset, size))
    }

    pub fn pending(&self) -> impl Iterator<Item = &HeritageInfo> {
        self.ranges.values().filter(|i| !i.is_stable())
    }
}

/// One storage range's worth of SSA construction: finds blocks that define
/// `(space_index, offset, size)`, inserts MULTIEQUAL ops at the iterated
/// dominance frontier of those blocks, then renames every def/use of that
/// storage via a dominator-tree-order stack walk.
///
/// `defining_ops` is the caller-supplied map of block -> ops in that block
/// that write the tracked storage, in block-local order; this function
/// does not scan `ops` for writers itself, since "writes this storage"
/// depends on output-varnode identity the op bank alone can't resolve
/// (aliasing through `ADDRESS_TIED` varnodes is the caller's job).
pub fn heritage_range(
    graph: &mut BlockGraph,
    ops: &mut OpBank,
    bank: &mut VarnodeBank,
    space_index: u32,
    offset: u64,
    size: u32,
    defining_ops: &BTreeMap<BlockId, Vec<OpId>>,
) -> Vec<OpId> {
    let seeds: BTreeSet<BlockId> = defining_ops.keys().copied().collect();
    let df = dominance_frontier(graph);
    let phi_blocks = iterated_dominance_frontier(&df, &seeds);

    let mut inserted = Vec::new();
    for &block_id in &phi_blocks {
        let pred_count = graph.predecessors(block_id).len();
        if pred_count < 2 {
            continue;
        }
        let seq = SeqNum::new(crate::address::Address::new(space_index, offset), 0);
        let phi = ops.new_op(OpCode::MultiEqual, seq, Vec::new());
        let out = bank.create(space_index, offset, size);
        ops.op_set_output(phi, out, bank).expect("fresh output cannot fail setDef");
        ops.op_insert_begin(phi, block_id, graph).expect("block exists");
        inserted.push(phi);
    }

    rename_range(graph, ops, bank, space_index, offset, size, defining_ops, &phi_blocks);
    tracing::debug!(space_index, offset, size, phi_count = inserted.len(), "heritage_range placed phi nodes");
    inserted
}

/// Dominator-tree-order renaming pass. Walks blocks in reverse postorder
/// (an approximation of dominator-tree preorder that is exact for reducible
/// graphs), threading the current reaching definition of the tracked
/// storage through a stack, wiring MULTIEQUAL inputs from predecessors once
/// every predecessor has been visited at least once.
fn rename_range(
    graph: &BlockGraph,
    ops: &mut OpBank,
    bank: &mut VarnodeBank,
    space_index: u32,
    offset: u64,
    size: u32,
    defining_ops: &BTreeMap<BlockId, Vec<OpId>>,
    phi_blocks: &BTreeSet<BlockId>,
) {
    let mut reaching: HashMap<BlockId, VarnodeId> = HashMap::new();
    let order = graph.reverse_postorder_from_entry();

    for &block in &order {
        let mut current = graph
            .immediate_dominator(block)
            .and_then(|idom| reaching.get(&idom).copied());

        if phi_blocks.contains(&block) {
            if let Some(block_data) = graph.block(block) {
                if let Some(&phi_id) = block_data.ops.first() {
                    if let Some(phi) = ops.get(phi_id) {
                        if phi.opcode == OpCode::MultiEqual {
                            if let Some(out) = phi.output {
                                current = Some(out);
                            }
                        }
                    }
                }
            }
        }

        if let Some(def_ops) = defining_ops.get(&block) {
            for &op_id in def_ops {
                if let Some(op) = ops.get(op_id) {
                    if let Some(out) = op.output {
                        current = Some(out);
                    }
                }
            }
        }

        if let Some(vn) = current {
            reaching.insert(block, vn);
        }
    }

    for &block in phi_blocks {
        let preds = graph.predecessors(block);
        let phi_id = match graph.block(block).and_then(|b| b.ops.first().copied()) {
            Some(id) => id,
            None => continue,
        };
        let fresh_inputs: Vec<VarnodeId> = preds
            .iter()
            .map(|p| reaching.get(p).copied().unwrap_or_else(|| bank.create(space_index, offset, size)))
            .collect();
        for (slot, vn) in fresh_inputs.into_iter().enumerate() {
            let _ = ops.op_set_input(phi_id, slot, vn, bank);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;

    fn diamond_graph() -> (BlockGraph, BlockId, BlockId, BlockId, BlockId) {
        let mut g = BlockGraph::new();
        let b0 = g.add_block(BasicBlock::new());
        let b1 = g.add_block(BasicBlock::new());
        let b2 = g.add_block(BasicBlock::new());
        let b3 = g.add_block(BasicBlock::new());
        g.add_edge(b0, b1);
        g.add_edge(b0, b2);
        g.add_edge(b1, b3);
        g.add_edge(b2, b3);
        g.set_entry(b0);
        g.calc_forward_dominator(b0);
        (g, b0, b1, b2, b3)
    }

    #[test]
    fn join_block_is_its_own_dominance_frontier_target() {
        let (g, b0, b1, b2, b3) = diamond_graph();
        let df = dominance_frontier(&g);
        assert!(df.get(&b1).unwrap().contains(&b3));
        assert!(df.get(&b2).unwrap().contains(&b3));
        assert!(df.get(&b0).unwrap().is_empty());
    }

    #[test]
    fn scenario_5_phi_inserted_at_join_for_divergent_defs() {
        let (mut g, b0, b1, b2, b3) = diamond_graph();
        let mut ops = OpBank::new();
        let mut bank = VarnodeBank::new();

        let def1 = ops.new_op(OpCode::Copy, SeqNum::new(crate::address::Address::new(0, 0x1000), 0), vec![]);
        ops.op_insert_end(def1, b1, &mut g).unwrap();
        let v1 = bank.create(1, 0x20, 4);
        ops.op_set_output(def1, v1, &mut bank).unwrap();

        let def2 = ops.new_op(OpCode::Copy, SeqNum::new(crate::address::Address::new(0, 0x1004), 0), vec![]);
        ops.op_insert_end(def2, b2, &mut g).unwrap();
        let v2 = bank.create(1, 0x20, 4);
        ops.op_set_output(def2, v2, &mut bank).unwrap();

        let mut defining = BTreeMap::new();
        defining.insert(b1, vec![def1]);
        defining.insert(b2, vec![def2]);

        let inserted = heritage_range(&mut g, &mut ops, &mut bank, 1, 0x20, 4, &defining);
        assert_eq!(inserted.len(), 1);
        let phi = ops.get(inserted[0]).unwrap();
        assert_eq!(phi.opcode, OpCode::MultiEqual);
        assert_eq!(phi.parent, Some(b3));
        assert_eq!(phi.inputs.len(), 2);
        let _ = b0;
    }

    #[test]
    fn heritage_info_stabilizes_after_delay() {
        let mut info = HeritageInfo::new(1, 0x20, 4);
        assert!(!info.is_stable());
        info.mark_clean();
        info.mark_pass();
        info.mark_pass();
        assert!(info.is_stable());
        info.mark_dirty();
        assert!(!info.is_stable());
    }
}
