//! The varnode bank: an arena of `Varnode`s plus two sorted indexes over
//! the live ones. Varnodes live in a `Vec` and are addressed by
//! `VarnodeId`; destruction is deferred (slots are tombstoned, not
//! removed) so no handle is ever invalidated mid-pass.

use crate::address::Address;
use crate::error::LowLevelError;
use crate::pcode::{OpId, SeqNum, VarnodeId};
use crate::varnode::{Varnode, VarnodeFlags};
use std::collections::BTreeSet;

/// Loc-index sort key: `(space, offset, size, definition-address, uniq)`.
/// Ties among otherwise-identical storage (e.g. input vs written) are
/// broken by insertion order (`VarnodeId`), since this index doesn't
/// narrow on a specific flag subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct LocKey {
    space_index: u32,
    offset: u64,
    size: u32,
    def_address: Option<Address>,
    id: VarnodeId,
}

/// Def-index sort key: `(definition-address, uniq, size, storage)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DefKey {
    def_address: Address,
    id: VarnodeId,
    size: u32,
    space_index: u32,
    offset: u64,
}

#[derive(Debug, Default)]
pub struct VarnodeBank {
    arena: Vec<Option<Varnode>>,
    loc_index: BTreeSet<LocKey>,
    /// Only varnodes with a known definition address participate; inputs
    /// and free varnodes have no definition site.
    def_index: BTreeSet<DefKey>,
    create_index: u64,
}

impl VarnodeBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter passes use to mark phase boundaries — "has this
    /// varnode been created since pass N started".
    pub fn create_index(&self) -> u64 {
        self.create_index
    }

    pub fn get(&self, id: VarnodeId) -> Option<&Varnode> {
        self.arena.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: VarnodeId) -> Option<&mut Varnode> {
        self.arena.get_mut(id.0 as usize).and_then(|slot| slot.as_mut())
    }

    fn loc_key_for(&self, id: VarnodeId) -> Option<LocKey> {
        let vn = self.get(id)?;
        Some(LocKey {
            space_index: vn.space_index,
            offset: vn.offset,
            size: vn.size,
            def_address: None,
            id,
        })
    }

    fn def_key_for(&self, id: VarnodeId, def_address: Address) -> DefKey {
        let vn = self.get(id).expect("def_key_for called on missing varnode");
        DefKey { def_address, id, size: vn.size, space_index: vn.space_index, offset: vn.offset }
    }

    /// `create(size, addr, ...) -> Varnode`: allocates a free varnode and
    /// inserts it into the loc index. Not yet written or input, so it
    /// doesn't enter the def index until `set_def`.
    pub fn create(&mut self, space_index: u32, offset: u64, size: u32) -> VarnodeId {
        let vn = Varnode::new(space_index, offset, size);
        let id = VarnodeId(self.arena.len() as u32);
        self.arena.push(Some(vn));
        self.create_index += 1;
        self.loc_index.insert(self.loc_key_for(id).unwrap());
        id
    }

    /// Precondition: `vn` is free and does not overlap any existing input
    /// in the same space.
    pub fn set_input(&mut self, id: VarnodeId) -> Result<(), LowLevelError> {
        let target_addr;
        let target_space;
        let target_size;
        {
            let vn = self.get(id).ok_or_else(|| LowLevelError::BankInvariantViolation("unknown varnode".into()))?;
            if !vn.is_free() {
                return Err(LowLevelError::BankInvariantViolation("setInput on a non-free varnode".into()));
            }
            target_addr = vn.offset;
            target_space = vn.space_index;
            target_size = vn.size;
        }

        for (other_id, other) in self.iter_live() {
            if other_id == id || !other.is_input() {
                continue;
            }
            if other.space_index == target_space {
                let overlap = target_addr < other.offset + other.size as u64 && other.offset < target_addr + target_size as u64;
                if overlap && !(other.offset == target_addr && other.size == target_size) {
                    return Err(LowLevelError::OverlappingInput { addr: Address::new(target_space, target_addr) });
                }
            }
        }

        let vn = self.get_mut(id).unwrap();
        vn.flags.insert(VarnodeFlags::INPUT);
        Ok(())
    }

    /// Links `vn` as the output of `op` defined at `def_seq`. Must
    /// currently be free.
    pub fn set_def(&mut self, id: VarnodeId, op: OpId, def_seq: SeqNum) -> Result<(), LowLevelError> {
        {
            let vn = self.get(id).ok_or_else(|| LowLevelError::BankInvariantViolation("unknown varnode".into()))?;
            if !vn.is_free() {
                return Err(LowLevelError::BankInvariantViolation("setDef on a non-free varnode".into()));
            }
        }
        let vn = self.get_mut(id).unwrap();
        vn.def = Some(op);
        vn.flags.insert(VarnodeFlags::WRITTEN);
        let key = self.def_key_for(id, def_seq.address);
        self.def_index.insert(key);
        Ok(())
    }

    /// Detaches def or input status, returning the varnode to free.
    pub fn make_free(&mut self, id: VarnodeId, def_seq: Option<SeqNum>) {
        if let Some(seq) = def_seq {
            self.def_index.remove(&self.def_key_for(id, seq.address));
        }
        if let Some(vn) = self.get_mut(id) {
            vn.def = None;
            vn.flags.remove(VarnodeFlags::INPUT | VarnodeFlags::WRITTEN);
        }
    }

    /// Allowed only if the varnode has no descendants and no def/input
    /// role.
    pub fn destroy(&mut self, id: VarnodeId) -> Result<(), LowLevelError> {
        let vn = self.get(id).ok_or_else(|| LowLevelError::BankInvariantViolation("unknown varnode".into()))?;
        if !vn.is_destroyable() {
            return Err(LowLevelError::BankInvariantViolation("destroy on a live varnode".into()));
        }
        self.loc_index.remove(&self.loc_key_for(id).unwrap());
        self.arena[id.0 as usize] = None;
        Ok(())
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (VarnodeId, &Varnode)> {
        self.arena.iter().enumerate().filter_map(|(i, slot)| slot.as_ref().map(|vn| (VarnodeId(i as u32), vn)))
    }

    /// Enumerate varnodes by storage, starting at `(space, offset)`
    /// inclusive, in loc-index order.
    pub fn iter_loc_from(&self, space_index: u32, offset: u64) -> impl Iterator<Item = VarnodeId> + '_ {
        self.loc_index
            .range(
                LocKey { space_index, offset, size: 0, def_address: None, id: VarnodeId(0) }..,
            )
            .map(|k| k.id)
    }

    /// Enumerate varnodes by definition site, in def-index order.
    pub fn iter_def_order(&self) -> impl Iterator<Item = VarnodeId> + '_ {
        self.def_index.iter().map(|k| k.id)
    }

    /// Both indexes must contain exactly the same *set* of ids that are
    /// currently alive with a definition; checked by the dual-index
    /// consistency test below.
    pub fn check_dual_index_consistency(&self) -> bool {
        let loc_ids: BTreeSet<_> = self.loc_index.iter().map(|k| k.id).collect();
        let live_ids: BTreeSet<_> = self.iter_live().map(|(id, _)| id).collect();
        loc_ids == live_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn create_populates_loc_index() {
        let mut bank = VarnodeBank::new();
        let id = bank.create(1, 0x100, 4);
        assert!(bank.get(id).unwrap().is_free());
        assert!(bank.check_dual_index_consistency());
    }

    #[test]
    fn set_input_then_destroy_fails_then_succeeds() {
        let mut bank = VarnodeBank::new();
        let id = bank.create(1, 0x100, 4);
        bank.set_input(id).unwrap();
        assert!(bank.destroy(id).is_err());
        bank.make_free(id, None);
        bank.destroy(id).unwrap();
    }

    #[test]
    fn overlapping_input_is_rejected() {
        let mut bank = VarnodeBank::new();
        let a = bank.create(1, 0x100, 4);
        bank.set_input(a).unwrap();
        let b = bank.create(1, 0x102, 4);
        assert!(bank.set_input(b).is_err());
    }

    #[test]
    fn identical_storage_input_is_reused_in_place() {
        let mut bank = VarnodeBank::new();
        let a = bank.create(1, 0x100, 4);
        bank.set_input(a).unwrap();
        let b = bank.create(1, 0x100, 4);
        bank.set_input(b).unwrap();
    }

    #[test]
    fn set_def_requires_free_varnode() {
        let mut bank = VarnodeBank::new();
        let id = bank.create(1, 0x100, 4);
        let seq = SeqNum::new(Address::new(0, 0x1000), 0);
        bank.set_def(id, OpId(0), seq).unwrap();
        assert!(bank.set_def(id, OpId(1), seq).is_err());
    }
}
