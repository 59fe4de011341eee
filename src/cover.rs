//! Live-range covers for `HighVariable`s. A `Cover` is a per-block map of
//! `(defining-op-order, final-read-order)` ranges; unions and
//! intersection queries drive the merge algebra in `highvariable.rs`.
//! Grounded in `dataflow.rs::DefUseChain`, which tracked defs/uses per
//! varnode but never aggregated them into per-block live ranges — this
//! is that aggregation, generalized to an explicit block-order-range
//! representation.

use crate::block::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One contiguous live span within a single block: `[def_order, last_read_order]`.
/// `def_order == last_read_order` means "defined and never read in this
/// block" (still live for phi purposes at the block exit if it flows out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverRange {
    pub def_order: u32,
    pub last_read_order: u32,
}

impl CoverRange {
    pub fn intersects(&self, other: &CoverRange) -> bool {
        self.def_order <= other.last_read_order && other.def_order <= self.last_read_order
    }
}

/// Per-block live-range set for one `HighVariable`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cover {
    per_block: BTreeMap<BlockId, Vec<CoverRange>>,
}

impl Cover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_range(&mut self, block: BlockId, range: CoverRange) {
        self.per_block.entry(block).or_default().push(range);
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockId> {
        self.per_block.keys()
    }

    pub fn ranges_in(&self, block: BlockId) -> &[CoverRange] {
        self.per_block.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// True if any range of `self` overlaps any range of `other` in a
    /// shared block — the intersection test behind the invariant that
    /// two simultaneously-live `HighVariable`s cannot share storage.
    pub fn intersects(&self, other: &Cover) -> bool {
        for (block, ranges) in &self.per_block {
            if let Some(other_ranges) = other.per_block.get(block) {
                for r in ranges {
                    for o in other_ranges {
                        if r.intersects(o) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// True if `self` contains `point` in `block` — used by
    /// `containVarnodeDef`-style containment checks in `highvariable.rs`.
    pub fn contains_point(&self, block: BlockId, order: u32) -> bool {
        self.ranges_in(block).iter().any(|r| order >= r.def_order && order <= r.last_read_order)
    }

    /// Merges `other` into `self` in place (set union over per-block
    /// ranges; ranges are not coalesced, mirroring the source's behavior
    /// of accumulating disjoint observation points rather than
    /// canonicalizing them).
    pub fn union_in_place(&mut self, other: &Cover) {
        for (&block, ranges) in &other.per_block {
            self.per_block.entry(block).or_default().extend(ranges.iter().copied());
        }
    }
}

/// How two covers overlap, for the classification rules
/// `highvariable.rs::HighVariableBank::merge` applies before rejecting
/// a merge outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapType {
    Disjoint,
    Partial,
    Equal,
}

/// Whether a boundary between two covers is safe to merge across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundType {
    None,
    Partial,
    DefinitionBoundary,
    AddrForceBoundary,
}

/// Classifies the relationship between two covers: disjoint, equal, or
/// partially overlapping.
pub fn characterize_overlap(a: &Cover, b: &Cover) -> OverlapType {
    let intersects = a.intersects(b);
    if !intersects {
        return OverlapType::Disjoint;
    }
    let a_blocks: std::collections::BTreeSet<_> = a.blocks().collect();
    let b_blocks: std::collections::BTreeSet<_> = b.blocks().collect();
    if a_blocks == b_blocks {
        OverlapType::Equal
    } else {
        OverlapType::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_ranges_do_not_intersect() {
        let mut a = Cover::new();
        a.add_range(BlockId(0), CoverRange { def_order: 0, last_read_order: 2 });
        let mut b = Cover::new();
        b.add_range(BlockId(0), CoverRange { def_order: 3, last_read_order: 5 });
        assert!(!a.intersects(&b));
        assert_eq!(characterize_overlap(&a, &b), OverlapType::Disjoint);
    }

    #[test]
    fn overlapping_ranges_intersect() {
        let mut a = Cover::new();
        a.add_range(BlockId(0), CoverRange { def_order: 0, last_read_order: 4 });
        let mut b = Cover::new();
        b.add_range(BlockId(0), CoverRange { def_order: 3, last_read_order: 5 });
        assert!(a.intersects(&b));
    }

    #[test]
    fn different_blocks_never_intersect() {
        let mut a = Cover::new();
        a.add_range(BlockId(0), CoverRange { def_order: 0, last_read_order: 4 });
        let mut b = Cover::new();
        b.add_range(BlockId(1), CoverRange { def_order: 0, last_read_order: 4 });
        assert!(!a.intersects(&b));
    }
}
