//! `Funcdata`: the per-function facade tying together the op bank,
//! varnode bank, block graph, heritage state, and call specs for one
//! function under analysis. Regeneralized from
//! `decompiler_prototype/decompiler.rs::DecompiledFunction`, which
//! bundled similar pieces but with no lifecycle tracking at all — every
//! field was always valid or always empty; this version adds a
//! `FuncdataFlags` lifecycle so callers can tell "not yet processed"
//! from "processed, now stale" from "mid-pass".

use crate::address::Address;
use crate::block::BlockGraph;
use crate::callspec::FuncCallSpecs;
use crate::heritage::HeritageState;
use crate::opbank::OpBank;
use crate::proto::FuncProto;
use crate::varnode_bank::VarnodeBank;
use std::sync::Arc;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FuncdataFlags: u32 {
        const PROCESSING_STARTED = 1 << 0;
        const PROCESSING_COMPLETE = 1 << 1;
        const BLOCKS_GENERATED   = 1 << 2;
        const HIGH_LEVEL_BUILT   = 1 << 3;
        const NO_RETURN          = 1 << 4;
        const JUMPTABLE_RECOVERED = 1 << 5;
        const UNIMPLEMENTED_PRESENT = 1 << 6;
        const RESTART_PENDING   = 1 << 7;
    }
}

/// Safe-to-carry-across-clone subset: everything describing what the
/// function *is* rather than how far analysis has gotten on it.
const CLONE_SAFE_FLAGS: FuncdataFlags = FuncdataFlags::NO_RETURN;

pub struct Funcdata {
    pub name: String,
    pub entry: Address,
    pub flags: FuncdataFlags,

    pub ops: OpBank,
    pub varnodes: VarnodeBank,
    pub blocks: BlockGraph,
    pub heritage: HeritageState,
    pub call_specs: Vec<FuncCallSpecs>,
    pub proto: Option<Arc<FuncProto>>,
}

impl Funcdata {
    pub fn new(name: impl Into<String>, entry: Address) -> Self {
        Self {
            name: name.into(),
            entry,
            flags: FuncdataFlags::empty(),
            ops: OpBank::new(),
            varnodes: VarnodeBank::new(),
            blocks: BlockGraph::new(),
            heritage: HeritageState::new(),
            call_specs: Vec::new(),
            proto: None,
        }
    }

    /// Resets all analysis state back to "freshly discovered", keeping
    /// only identity (`name`, `entry`) and the clone-safe flag subset —
    /// `clear`.
    pub fn clear(&mut self) {
        let preserved = self.flags & CLONE_SAFE_FLAGS;
        self.ops = OpBank::new();
        self.varnodes = VarnodeBank::new();
        self.blocks = BlockGraph::new();
        self.heritage = HeritageState::new();
        self.call_specs.clear();
        self.proto = None;
        self.flags = preserved;
    }

    /// `startProcessing`: sets the in-progress flag. Fails loudly (panics,
    /// since this indicates a caller bug rather than a recoverable
    /// analysis failure) if processing is already underway — re-entrant
    /// processing of one `Funcdata` is never valid.
    pub fn start_processing(&mut self) {
        assert!(
            !self.flags.contains(FuncdataFlags::PROCESSING_STARTED) || self.flags.contains(FuncdataFlags::PROCESSING_COMPLETE),
            "start_processing called while already in progress"
        );
        self.flags.remove(FuncdataFlags::PROCESSING_COMPLETE);
        self.flags.insert(FuncdataFlags::PROCESSING_STARTED);
        tracing::debug!(name = %self.name, entry = ?self.entry, "processing started");
    }

    pub fn stop_processing(&mut self) {
        self.flags.insert(FuncdataFlags::PROCESSING_COMPLETE);
        tracing::debug!(name = %self.name, "processing complete");
    }

    pub fn is_processed(&self) -> bool {
        self.flags.contains(FuncdataFlags::PROCESSING_COMPLETE)
    }

    /// A restart-pending function has been invalidated mid-pipeline (e.g.
    /// a jump table recovery changed the block graph) and must be
    /// reprocessed from block generation onward rather than treated as
    /// complete.
    pub fn request_restart(&mut self) {
        self.flags.insert(FuncdataFlags::RESTART_PENDING);
        self.flags.remove(FuncdataFlags::PROCESSING_COMPLETE);
    }

    pub fn needs_restart(&self) -> bool {
        self.flags.contains(FuncdataFlags::RESTART_PENDING)
    }

    /// Clones identity and the clone-safe flag subset into a fresh,
    /// unprocessed `Funcdata` — used when speculative analysis (e.g. an
    /// inlining trial) needs an independent copy without re-running
    /// discovery.
    pub fn clone_shell(&self) -> Funcdata {
        let mut fresh = Funcdata::new(self.name.clone(), self.entry);
        fresh.flags = self.flags & CLONE_SAFE_FLAGS;
        fresh
    }

    /// Cheap content hash over the shape of this function's analysis state
    /// (op/varnode/block counts and lifecycle flags). The heritage pass
    /// scheduler (out of scope here) uses equality of this across
    /// iterations as its convergence check, so it only needs to be stable
    /// and sensitive to the state actually mutated by a pass, not a full
    /// structural digest.
    pub fn content_hash(&self) -> u64 {
        let mut buf = Vec::with_capacity(32);
        buf.extend_from_slice(&(self.ops.iter_alive().count() as u64).to_le_bytes());
        buf.extend_from_slice(&(self.varnodes.iter_live().count() as u64).to_le_bytes());
        buf.extend_from_slice(&(self.blocks.block_count() as u64).to_le_bytes());
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());
        xxhash_rust::xxh3::xxh3_64(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_preserves_only_clone_safe_flags() {
        let mut fd = Funcdata::new("foo", Address::new(0, 0x1000));
        fd.flags.insert(FuncdataFlags::NO_RETURN | FuncdataFlags::PROCESSING_COMPLETE);
        fd.ops.new_op(crate::pcode::OpCode::Copy, crate::pcode::SeqNum::new(Address::new(0, 0x1000), 0), vec![]);
        fd.clear();
        assert!(fd.flags.contains(FuncdataFlags::NO_RETURN));
        assert!(!fd.flags.contains(FuncdataFlags::PROCESSING_COMPLETE));
        assert_eq!(fd.ops.iter_alive().count(), 0);
    }

    #[test]
    #[should_panic]
    fn start_processing_twice_panics() {
        let mut fd = Funcdata::new("foo", Address::new(0, 0x1000));
        fd.start_processing();
        fd.start_processing();
    }

    #[test]
    fn restart_request_clears_complete_flag() {
        let mut fd = Funcdata::new("foo", Address::new(0, 0x1000));
        fd.start_processing();
        fd.stop_processing();
        assert!(fd.is_processed());
        fd.request_restart();
        assert!(!fd.is_processed());
        assert!(fd.needs_restart());
    }

    #[test]
    fn content_hash_changes_when_an_op_is_added() {
        let mut fd = Funcdata::new("foo", Address::new(0, 0x1000));
        let before = fd.content_hash();
        fd.ops.new_op(crate::pcode::OpCode::Copy, crate::pcode::SeqNum::new(Address::new(0, 0x1000), 0), vec![]);
        let after = fd.content_hash();
        assert_ne!(before, after);
    }

    #[test]
    fn clone_shell_keeps_identity_and_safe_flags_only() {
        let mut fd = Funcdata::new("foo", Address::new(0, 0x2000));
        fd.flags.insert(FuncdataFlags::NO_RETURN | FuncdataFlags::HIGH_LEVEL_BUILT);
        let shell = fd.clone_shell();
        assert_eq!(shell.name, "foo");
        assert_eq!(shell.entry, Address::new(0, 0x2000));
        assert!(shell.flags.contains(FuncdataFlags::NO_RETURN));
        assert!(!shell.flags.contains(FuncdataFlags::HIGH_LEVEL_BUILT));
    }
}
