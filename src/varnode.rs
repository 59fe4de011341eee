//! Varnodes: one SSA value each. Regeneralized from
//! `decompiler_prototype/pcode.rs::Varnode`, which only carried `(space,
//! offset, size)`; this version adds the full attribute set a decompiler
//! core needs (flags, masks, cover, def/descendant links, symbol/high-var
//! links) and moves storage identity onto `AddrSpace`/`Address` instead of
//! a closed `AddressSpace` enum, so spacebase registers and join spaces fit.

use crate::address::Address;
use crate::cover::Cover;
use crate::pcode::{OpId, VarnodeId};
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct VarnodeFlags: u32 {
        const INPUT              = 1 << 0;
        const CONSTANT            = 1 << 1;
        const ANNOTATION          = 1 << 2;
        const ADDRESS_TIED        = 1 << 3;
        const ADDRESS_FORCED      = 1 << 4;
        const PERSISTENT          = 1 << 5;
        const MAPPED              = 1 << 6;
        const TYPE_LOCKED         = 1 << 7;
        const NAME_LOCKED         = 1 << 8;
        const SPACEBASE           = 1 << 9;
        const READ_ONLY           = 1 << 10;
        const VOLATILE            = 1 << 11;
        const UNAFFECTED          = 1 << 12;
        const RETURN_ADDRESS      = 1 << 13;
        const INDIRECT_CREATION   = 1 << 14;
        const IMPLICIT            = 1 << 15;
        const EXPLICIT            = 1 << 16;
        const WRITTEN             = 1 << 17;
        const AUTO_LIVE           = 1 << 18;
        const PRECISION_HI        = 1 << 19;
        const PRECISION_LO        = 1 << 20;
    }
}

/// Opaque identifier for a `HighVariable` (defined in `highvariable.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HighVariableId(pub u32);

/// Opaque identifier for a backing symbol table entry (owned by the
/// out-of-scope type/symbol subsystem; the core only stores the handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolEntryId(pub u32);

/// One SSA value: a storage location, tagged with everything the passes
/// need to reason about its lifecycle and masks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Varnode {
    pub space_index: u32,
    pub offset: u64,
    pub size: u32,

    /// The op that produces this varnode, if any. Absent means either
    /// *input* or *free* (mutually exclusive with `flags.contains(INPUT)`).
    pub def: Option<OpId>,

    /// Ops that read this varnode. Maintained in sync with each reading
    /// op's `inputs` by the op-bank primitives.
    pub descendants: Vec<OpId>,

    pub flags: VarnodeFlags,

    pub consume_mask: u64,
    pub nonzero_mask: u64,

    pub cover: Option<Cover>,
    pub symbol: Option<SymbolEntryId>,
    pub high: Option<HighVariableId>,
}

impl Varnode {
    pub fn new(space_index: u32, offset: u64, size: u32) -> Self {
        Self {
            space_index,
            offset,
            size,
            def: None,
            descendants: Vec::new(),
            flags: VarnodeFlags::empty(),
            consume_mask: Self::full_mask(size),
            nonzero_mask: Self::full_mask(size),
            cover: None,
            symbol: None,
            high: None,
        }
    }

    pub fn full_mask(size: u32) -> u64 {
        if size >= 8 {
            u64::MAX
        } else {
            (1u64 << (size * 8)) - 1
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.space_index, self.offset)
    }

    pub fn is_input(&self) -> bool {
        self.flags.contains(VarnodeFlags::INPUT)
    }

    pub fn is_constant(&self) -> bool {
        self.flags.contains(VarnodeFlags::CONSTANT)
    }

    pub fn is_written(&self) -> bool {
        self.def.is_some()
    }

    /// "Free".2: has neither a def nor is it an input.
    pub fn is_free(&self) -> bool {
        self.def.is_none() && !self.is_input()
    }

    /// Destruction precondition: no descendants and no def/input role.
    pub fn is_destroyable(&self) -> bool {
        self.is_free() && self.descendants.is_empty()
    }

    pub fn overlaps(&self, other: &Varnode) -> bool {
        self.space_index == other.space_index
            && self.offset < other.offset + other.size as u64
            && other.offset < self.offset + self.size as u64
    }
}

impl std::fmt::Display for Varnode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "space{}:0x{:x}:{}", self.space_index, self.offset, self.size)
    }
}

/// A sortable (loc-index / def-index) key pair so `VarnodeId` doesn't leak
/// into the bank's ordering logic. See `varnode_bank.rs`.
pub type VarnodeHandle = VarnodeId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_varnode_has_no_def_or_input() {
        let vn = Varnode::new(0, 0x10, 4);
        assert!(vn.is_free());
        assert!(vn.is_destroyable());
    }

    #[test]
    fn overlap_detection_is_space_scoped() {
        let a = Varnode::new(1, 0, 4);
        let b = Varnode::new(1, 2, 4);
        let c = Varnode::new(2, 2, 4);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn full_mask_caps_at_eight_bytes() {
        assert_eq!(Varnode::full_mask(1), 0xFF);
        assert_eq!(Varnode::full_mask(8), u64::MAX);
    }
}
