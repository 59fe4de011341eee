//! Address spaces, addresses, and disjoint range sets.
//!
//! Ghidra's `AddrSpace`/`Address`/`Range`/`RangeList` use pointer-identity
//! sentinels for "minimal"/"maximal" addresses; those are replaced here
//! with an explicit tagged enum so there is no pointer magic to reason
//! about.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Which universe of storage an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceKind {
    Ram,
    Register,
    Stack,
    Constant,
    Unique,
    Fspec,
    Iop,
    Join,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SpaceFlags: u8 {
        const HERITAGED        = 0b0000_0001;
        const DOES_DEADCODE     = 0b0000_0010;
        const BIG_ENDIAN        = 0b0000_0100;
        const TRUNCATED         = 0b0000_1000;
        const REVERSE_JUSTIFIED = 0b0001_0000;
    }
}

/// A named, indexed address space. Spaces have process-wide identity:
/// equality is by `index`, which also doubles as the sort key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddrSpace {
    pub name: String,
    pub index: u32,
    pub kind: SpaceKind,
    pub addr_size: u8,
    pub word_size: u8,
    pub delay: u8,
    pub flags: SpaceFlags,
    pub spacebase_registers: Vec<String>,
}

impl AddrSpace {
    pub fn new(name: impl Into<String>, index: u32, kind: SpaceKind, addr_size: u8) -> Self {
        Self {
            name: name.into(),
            index,
            kind,
            addr_size,
            word_size: 1,
            delay: 0,
            flags: SpaceFlags::empty(),
            spacebase_registers: Vec::new(),
        }
    }

    /// Mask that wraps an offset modulo this space's address size.
    pub fn wrap_mask(&self) -> u64 {
        if self.addr_size >= 8 {
            u64::MAX
        } else {
            (1u64 << (self.addr_size as u32 * 8)) - 1
        }
    }

    pub fn wrap_offset(&self, offset: u64) -> u64 {
        offset & self.wrap_mask()
    }
}

impl PartialEq for AddrSpace {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl Eq for AddrSpace {}

impl PartialOrd for AddrSpace {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for AddrSpace {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

/// A byte address, tagged with the space it lives in. Two sentinels exist
/// and sort strictly below/above all real addresses — see `Address::MIN`
/// and `Address::MAX_SENTINEL`, which replace the source's null-space and
/// max-offset magic values with an explicit variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// Sorts below every real address.
    Minimal,
    /// Sorts above every real address.
    Maximal,
    Concrete { space_index: u32, offset: u64 },
}

impl Address {
    pub fn new(space_index: u32, offset: u64) -> Self {
        Address::Concrete { space_index, offset }
    }

    pub fn space_index(&self) -> Option<u32> {
        match self {
            Address::Concrete { space_index, .. } => Some(*space_index),
            _ => None,
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            Address::Concrete { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Address::Concrete { .. })
    }

    /// Address arithmetic wraps modulo the given space's address size.
    pub fn add(&self, delta: u64, space: &AddrSpace) -> Self {
        match self {
            Address::Concrete { space_index, offset } => {
                let wrapped = space.wrap_offset(offset.wrapping_add(delta));
                Address::Concrete { space_index: *space_index, offset: wrapped }
            }
            other => *other,
        }
    }
}

/// Orders `Minimal < Concrete(...) < Maximal`; concretes sort by
/// `(space_index, offset)`.
impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(a: &Address) -> (u8, u32, u64) {
            match a {
                Address::Minimal => (0, 0, 0),
                Address::Concrete { space_index, offset } => (1, *space_index, *offset),
                Address::Maximal => (2, u32::MAX, u64::MAX),
            }
        }
        rank(self).cmp(&rank(other))
    }
}

/// An inclusive byte range `[first, last]` within one address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub space_index: u32,
    pub first: u64,
    pub last: u64,
}

impl Range {
    pub fn new(space_index: u32, first: u64, last: u64) -> Self {
        debug_assert!(first <= last);
        Self { space_index, first, last }
    }

    pub fn contains(&self, space_index: u32, offset: u64) -> bool {
        self.space_index == space_index && offset >= self.first && offset <= self.last
    }

    fn overlaps_or_touches(&self, other: &Range) -> bool {
        if self.space_index != other.space_index {
            return false;
        }
        // Adjacent ranges (last+1 == first) are merged too.
        !(self.last.saturating_add(1) < other.first || other.last.saturating_add(1) < self.first)
    }
}

/// Sort key: space index ascending, then first offset ascending.
impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Range {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.space_index, self.first).cmp(&(other.space_index, other.first))
    }
}

/// A sorted, disjoint set of byte ranges. Maintained disjoint on every
/// mutation: `insert` merges overlapping/adjacent runs, `remove` splits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeList {
    ranges: Vec<Range>,
}

impl RangeList {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Locates the first range whose `last >= first` — i.e. the first
    /// candidate that could overlap or be adjacent to `[first, last]`.
    fn lower_bound(&self, space_index: u32, first: u64) -> usize {
        self.ranges.partition_point(|r| {
            r.space_index < space_index || (r.space_index == space_index && r.last.saturating_add(1) < first)
        })
    }

    /// Inserts `[first, last]` into `space`, merging any overlapping or
    /// adjacent runs into a single range.
    pub fn insert_range(&mut self, space_index: u32, first: u64, last: u64) {
        debug_assert!(first <= last);
        let start = self.lower_bound(space_index, first);

        let mut end = start;
        let mut new_first = first;
        let mut new_last = last;
        while end < self.ranges.len() {
            let r = self.ranges[end];
            if r.space_index == space_index && r.first <= new_last.saturating_add(1) {
                new_first = new_first.min(r.first);
                new_last = new_last.max(r.last);
                end += 1;
            } else {
                break;
            }
        }

        self.ranges.splice(start..end, [Range::new(space_index, new_first, new_last)]);
    }

    /// Removes `[first, last]` from `space`, splitting any spanning range
    /// into the surviving prefix/suffix.
    pub fn remove_range(&mut self, space_index: u32, first: u64, last: u64) {
        debug_assert!(first <= last);
        let mut i = 0;
        let mut replacement = Vec::new();

        while i < self.ranges.len() {
            let r = self.ranges[i];
            if r.space_index != space_index || r.last < first || r.first > last {
                i += 1;
                continue;
            }
            if r.first < first {
                replacement.push(Range::new(space_index, r.first, first - 1));
            }
            if r.last > last {
                replacement.push(Range::new(space_index, last + 1, r.last));
            }
            let drained_start = i;
            self.ranges.remove(i);
            for (offset, rep) in replacement.drain(..).enumerate() {
                self.ranges.insert(drained_start + offset, rep);
                i += 1;
            }
            // i now points past any inserted replacements; re-scan from there
            // without skipping ahead since the loop condition re-checks r.last < first.
        }
    }

    /// Binary-search upper-bound, step back one, verify same space and
    /// `last >= offset`.
    pub fn get_range(&self, space_index: u32, offset: u64) -> Option<&Range> {
        let idx = self.ranges.partition_point(|r| {
            r.space_index < space_index || (r.space_index == space_index && r.first <= offset)
        });
        if idx == 0 {
            return None;
        }
        let candidate = &self.ranges[idx - 1];
        if candidate.space_index == space_index && candidate.last >= offset {
            Some(candidate)
        } else {
            None
        }
    }

    /// The longest contiguous covered prefix starting at `(space, offset)`,
    /// or `None` if `offset` isn't covered at all.
    pub fn longest_fit(&self, space_index: u32, offset: u64) -> Option<Range> {
        self.get_range(space_index, offset).copied()
    }

    /// Invariant check used by tests: for all i<j, ranges are ordered and
    /// non-overlapping/non-adjacent.
    pub fn check_invariants(&self) -> bool {
        self.ranges.windows(2).all(|w| {
            w[0].space_index < w[1].space_index
                || (w[0].space_index == w[1].space_index && w[0].last.saturating_add(1) < w[1].first)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAM: u32 = 1;

    #[test]
    fn scenario_1_rangelist_merging() {
        let mut rl = RangeList::new();
        rl.insert_range(RAM, 0x1000, 0x1003);
        rl.insert_range(RAM, 0x1002, 0x1007);
        assert_eq!(rl.len(), 1);
        assert_eq!(rl.iter().next(), Some(&Range::new(RAM, 0x1000, 0x1007)));

        rl.insert_range(RAM, 0x1009, 0x100F);
        assert_eq!(rl.len(), 2);

        rl.insert_range(RAM, 0x1008, 0x1008);
        assert_eq!(rl.len(), 1);
        assert_eq!(rl.iter().next(), Some(&Range::new(RAM, 0x1000, 0x100F)));
        assert!(rl.check_invariants());
    }

    #[test]
    fn scenario_2_remove_with_split() {
        let mut rl = RangeList::new();
        rl.insert_range(RAM, 0, 0xFF);
        rl.remove_range(RAM, 0x40, 0x4F);

        let ranges: Vec<_> = rl.iter().copied().collect();
        assert_eq!(ranges, vec![Range::new(RAM, 0, 0x3F), Range::new(RAM, 0x50, 0xFF)]);
        assert!(rl.check_invariants());
    }

    #[test]
    fn scenario_3_address_wraps() {
        let space = AddrSpace::new("ram", RAM, SpaceKind::Ram, 4);
        let addr = Address::new(RAM, 0xFFFF_FFFC);
        let wrapped = addr.add(8, &space);
        assert_eq!(wrapped, Address::new(RAM, 0x0000_0004));
    }

    #[test]
    fn address_sentinels_sort_outside_concrete() {
        let lo = Address::Minimal;
        let mid = Address::new(RAM, 0x1000);
        let hi = Address::Maximal;
        assert!(lo < mid);
        assert!(mid < hi);
    }

    #[test]
    fn no_overlap_across_spaces() {
        let mut rl = RangeList::new();
        rl.insert_range(0, 0x1000, 0x1010);
        rl.insert_range(1, 0x1000, 0x1010);
        assert_eq!(rl.len(), 2);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut rl = RangeList::new();
        rl.insert_range(RAM, 0x10, 0x20);
        rl.insert_range(RAM, 0x10, 0x20);
        assert_eq!(rl.len(), 1);
    }

    #[test]
    fn deterministic_iteration_order() {
        let mut rl = RangeList::new();
        rl.insert_range(RAM, 0x500, 0x600);
        rl.insert_range(RAM, 0x100, 0x200);
        rl.insert_range(0, 0x50, 0x60);
        let collected: Vec<_> = rl.iter().copied().collect();
        assert_eq!(
            collected,
            vec![Range::new(0, 0x50, 0x60), Range::new(RAM, 0x100, 0x200), Range::new(RAM, 0x500, 0x600)]
        );
    }
}
