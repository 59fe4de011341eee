//! Parameter-passing models: where a prototype's inputs and return value
//! live in registers/stack, and the trial-scoring machinery that recovers
//! an actual call's arguments from raw `CALL` inputs. Grounded in
//! `decompiler_prototype/symbol_recovery.rs`, which picked a fixed
//! per-architecture register list and never revisited it; this version
//! generalizes that into the `ParamList` trait so the assignment policy
//! (standard, register-only, or merged) is pluggable, and adds the
//! trial/active-trial scoring state below.

use crate::address::Address;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which broad register file a `ParamEntry` is drawn from, for models
/// that assign integer and floating-point arguments out of separate
/// files (e.g. a "general" and a "float" group advancing independently).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeClass {
    General,
    Float,
    Ptr,
    HiddenRet,
}

/// One declared slot in a parameter-passing model: a storage location a
/// prototype's `group`-th input (or the return value) may land in.
///
/// `alignment == 0` marks an *exclusion* entry: a single fixed register
/// or stack slot that can hold exactly one parameter and is then spent.
/// `alignment != 0` marks an *array* entry: a run of `alignment`-sized
/// slots (e.g. consecutive stack words) that a parameter can be assigned
/// into at any `slotnum`, consuming `ceil(size / alignment)` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamEntry {
    pub space_index: u32,
    pub offset: u64,
    pub size: u32,
    /// Smallest request this entry will accept; requests narrower than
    /// this still land here (the architecture doesn't have anything
    /// smaller), but anything narrower than `minsize` is rejected.
    pub minsize: u32,
    pub alignment: u32,
    pub type_class: TypeClass,
    pub group: u32,
    /// Entries that together form one logical parameter via `PIECE`
    /// (e.g. a struct split across two registers).
    pub join_group: Option<u32>,
}

impl ParamEntry {
    /// A fixed, single-slot entry: one register or one stack word that
    /// backs at most one parameter.
    pub fn exclusion(space_index: u32, offset: u64, size: u32, group: u32) -> Self {
        Self { space_index, offset, size, minsize: size, alignment: 0, type_class: TypeClass::General, group, join_group: None }
    }

    /// A repeating-slot entry (e.g. the stack overflow area): `size` is
    /// the byte span of the whole run, `alignment` is one slot's width.
    pub fn array(space_index: u32, offset: u64, size: u32, minsize: u32, alignment: u32, group: u32) -> Self {
        Self { space_index, offset, size, minsize, alignment, type_class: TypeClass::General, group, join_group: None }
    }

    pub fn address(&self) -> Address {
        Address::new(self.space_index, self.offset)
    }

    pub fn contains(&self, addr: &Address, size: u32) -> bool {
        match addr.offset().zip(self.address().offset()) {
            Some((o, base)) => addr.space_index() == Some(self.space_index) && o >= base && o + size as u64 <= base + self.size as u64,
            None => false,
        }
    }

    /// Resolves the concrete address for a request of `size` starting at
    /// `slotnum`, and the slot number the *next* request into this entry
    /// should start at.
    ///
    /// An exclusion entry (`alignment == 0`) only ever occupies slot 0:
    /// any other `slotnum` is invalid, since the entry has nowhere else
    /// to put a second parameter. An array entry places the request
    /// `slotnum * alignment` bytes past its base and advances by
    /// `ceil(size / alignment)` slots, so a wide argument consumes
    /// multiple slots of a narrower array.
    pub fn get_address(&self, slotnum: u32, size: u32) -> Option<(Address, u32)> {
        if size < self.minsize {
            return None;
        }
        if self.alignment == 0 {
            if slotnum != 0 {
                return None;
            }
            return Some((self.address(), slotnum + 1));
        }
        let addr = Address::new(self.space_index, self.offset + slotnum as u64 * self.alignment as u64);
        let numslots = (size + self.alignment - 1) / self.alignment;
        Some((addr, slotnum + numslots))
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrialFlags: u32 {
        const ACTIVE      = 1 << 0;
        const USED        = 1 << 1;
        const JUSTIFIED   = 1 << 2;
        const KILLED_BY_COPY = 1 << 3;
        const FIXED_POSITION = 1 << 4;
        const CONDEXE_CANDIDATE = 1 << 5;
        /// No declared `ParamEntry` matches this trial's storage at all;
        /// it can never become a real parameter regardless of data flow.
        const NO_USE = 1 << 6;
    }
}

/// A candidate argument: one `CALL`/`CALLIND` input being evaluated for
/// whether it's a genuine parameter or incidental (e.g. a stack-cleanup
/// artifact or an unrelated live register).
#[derive(Debug, Clone)]
pub struct ParamTrial {
    pub address: Address,
    pub size: u32,
    pub slot: usize,
    pub flags: TrialFlags,
    /// Which `ParamEntry` group this trial's storage matched, set by
    /// `build_trial_map`. `None` until `fillinMap` has run, or if no
    /// entry matched.
    pub entry_group: Option<u32>,
}

impl ParamTrial {
    pub fn new(address: Address, size: u32, slot: usize) -> Self {
        Self { address, size, slot, flags: TrialFlags::empty(), entry_group: None }
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(TrialFlags::ACTIVE)
    }
}

/// The working set of trials for one call site, plus the
/// `stackPlaceholderSlot` bookkeeping: a negative value means "no
/// placeholder currently reserved", preserved as-is rather than remapped
/// to `Option`, so external tooling that reads this field keeps seeing
/// the same sentinel convention (see DESIGN.md).
#[derive(Debug, Clone, Default)]
pub struct ParamActive {
    pub trials: Vec<ParamTrial>,
    pub stack_placeholder_slot: i32,
}

impl ParamActive {
    pub fn new() -> Self {
        Self { trials: Vec::new(), stack_placeholder_slot: -1 }
    }

    pub fn push(&mut self, trial: ParamTrial) -> usize {
        self.trials.push(trial);
        self.trials.len() - 1
    }

    pub fn reserve_stack_placeholder(&mut self, slot: usize) {
        self.stack_placeholder_slot = slot as i32;
    }

    pub fn has_stack_placeholder(&self) -> bool {
        self.stack_placeholder_slot >= 0
    }

    pub fn sort_by_slot(&mut self) {
        self.trials.sort_by_key(|t| t.slot);
    }
}

/// One resolved input/output assignment: a parameter index mapped to the
/// storage location it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamAssignment {
    pub index: usize,
    pub address: Address,
    pub size: u32,
}

/// A requested parameter: just a size for assignment purposes (the type
/// system that would refine this further is out of scope here).
#[derive(Debug, Clone, Copy)]
pub struct ParamRequest {
    pub size: u32,
}

/// Common interface every parameter-passing policy implements: given an
/// ordered list of requested parameters, produce concrete storage
/// assignments, and separately, given an observed storage location, say
/// which declared `ParamEntry` it corresponds to (`fillinMap`'s
/// matching half).
pub trait ParamList {
    fn assign_map(&self, requests: &[ParamRequest]) -> Vec<ParamAssignment>;
    fn entry_for(&self, addr: &Address, size: u32) -> Option<&ParamEntry>;
    fn entries(&self) -> &[ParamEntry];

    /// `fillinMap`: classifies every trial in `active` against this
    /// model's declared entries, promoting genuine parameters to
    /// `USED`/`JUSTIFIED` and forcing out exclusion-group collisions,
    /// order-chain gaps, and storage that matches no entry at all.
    fn fillin_map(&self, active: &mut ParamActive) {
        fillin_map(active, self);
    }
}

/// Fixed sequence of general-purpose registers, then stack overflow —
/// the common case (e.g. System V AMD64, or any architecture whose ABI
/// assigns the first N parameters to registers in a fixed order).
pub struct ParamListStandard {
    pub registers: Vec<ParamEntry>,
    pub stack_space_index: u32,
    pub stack_start: u64,
    pub stack_align: u64,
}

impl ParamList for ParamListStandard {
    fn assign_map(&self, requests: &[ParamRequest]) -> Vec<ParamAssignment> {
        let mut out = Vec::new();
        let mut stack_offset = self.stack_start;
        for (i, req) in requests.iter().enumerate() {
            if let Some(entry) = self.registers.get(i) {
                out.push(ParamAssignment { index: i, address: entry.address(), size: req.size });
            } else {
                out.push(ParamAssignment { index: i, address: Address::new(self.stack_space_index, stack_offset), size: req.size });
                stack_offset += req.size.max(self.stack_align as u32) as u64;
            }
        }
        out
    }

    fn entry_for(&self, addr: &Address, size: u32) -> Option<&ParamEntry> {
        self.registers.iter().find(|e| e.contains(addr, size))
    }

    fn entries(&self) -> &[ParamEntry] {
        &self.registers
    }
}

/// Register-only model: no stack overflow slot, used for calling
/// conventions (or `CALLOTHER` pseudo-conventions) that simply drop
/// parameters beyond the register count rather than spilling them.
pub struct ParamListRegister {
    pub registers: Vec<ParamEntry>,
}

impl ParamList for ParamListRegister {
    fn assign_map(&self, requests: &[ParamRequest]) -> Vec<ParamAssignment> {
        requests
            .iter()
            .enumerate()
            .filter_map(|(i, req)| self.registers.get(i).map(|e| ParamAssignment { index: i, address: e.address(), size: req.size }))
            .collect()
    }

    fn entry_for(&self, addr: &Address, size: u32) -> Option<&ParamEntry> {
        self.registers.iter().find(|e| e.contains(addr, size))
    }

    fn entries(&self) -> &[ParamEntry] {
        &self.registers
    }
}

/// Return-value counterpart of `ParamListStandard`: a single register (or
/// register pair via `join_group` for wide returns).
pub struct ParamListStandardOut {
    pub entries: Vec<ParamEntry>,
}

impl ParamList for ParamListStandardOut {
    fn assign_map(&self, requests: &[ParamRequest]) -> Vec<ParamAssignment> {
        requests
            .iter()
            .enumerate()
            .filter_map(|(i, req)| self.entries.first().map(|e| ParamAssignment { index: i, address: e.address(), size: req.size }))
            .collect()
    }

    fn entry_for(&self, addr: &Address, size: u32) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| e.contains(addr, size))
    }

    fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }
}

pub struct ParamListRegisterOut {
    pub entries: Vec<ParamEntry>,
}

impl ParamList for ParamListRegisterOut {
    fn assign_map(&self, requests: &[ParamRequest]) -> Vec<ParamAssignment> {
        requests
            .iter()
            .enumerate()
            .filter_map(|(i, req)| self.entries.get(i).map(|e| ParamAssignment { index: i, address: e.address(), size: req.size }))
            .collect()
    }

    fn entry_for(&self, addr: &Address, size: u32) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| e.contains(addr, size))
    }

    fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }
}

/// Union of several `ParamList` policies, keyed by a discriminating
/// group id (e.g. integer vs vector register files that each assign
/// independently). `fold_in` decides how to combine group assignments:
/// a newly folded-in entry that collides
/// with a storage location already claimed by this group *replaces* the
/// existing one (the later assignment is assumed more specific); anything
/// that doesn't collide is appended, preserving discovery order (see
/// DESIGN.md).
pub struct ParamListMerged {
    pub groups: IndexMap<u32, Vec<ParamEntry>>,
}

impl ParamListMerged {
    pub fn new() -> Self {
        Self { groups: IndexMap::new() }
    }

    pub fn fold_in(&mut self, group: u32, entry: ParamEntry) {
        let bucket = self.groups.entry(group).or_default();
        if let Some(slot) = bucket.iter_mut().find(|e| e.address() == entry.address() && e.size == entry.size) {
            *slot = entry;
        } else {
            bucket.push(entry);
        }
    }

    pub fn all_entries(&self) -> Vec<&ParamEntry> {
        self.groups.values().flatten().collect()
    }
}

impl ParamList for ParamListMerged {
    fn assign_map(&self, requests: &[ParamRequest]) -> Vec<ParamAssignment> {
        let flat = self.all_entries();
        requests
            .iter()
            .enumerate()
            .filter_map(|(i, req)| flat.get(i).map(|e| ParamAssignment { index: i, address: e.address(), size: req.size }))
            .collect()
    }

    fn entry_for(&self, addr: &Address, size: u32) -> Option<&ParamEntry> {
        self.groups.values().flatten().find(|e| e.contains(addr, size))
    }

    fn entries(&self) -> &[ParamEntry] {
        // `ParamListMerged` has no single contiguous backing slice across
        // groups; callers that need the full flattened set use `all_entries`.
        self.groups.values().next().map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// `fillinMap`: the full classification pipeline run over one call site's
/// active trials. Matches each trial to a declared entry, resolves
/// exclusion-group collisions, forces out anything that can never be
/// real, breaks the chain at the first non-active slot (arguments are
/// passed contiguously; a gap means nothing further was read), then
/// promotes whatever survives.
pub fn fillin_map<M: ParamList + ?Sized>(active: &mut ParamActive, model: &M) {
    if active.trials.is_empty() {
        return;
    }
    build_trial_map(active, model);
    force_exclusion_group(active, model);
    force_no_use(active);
    force_inactive_chain(active);
    promote_to_used(active);
}

/// Matches each trial's storage against the model's declared entries,
/// recording which entry group it landed in. A trial with no matching
/// entry is marked `NO_USE` immediately — it can never become a real
/// parameter no matter what the live data flow says about it.
fn build_trial_map<M: ParamList + ?Sized>(active: &mut ParamActive, model: &M) {
    for trial in active.trials.iter_mut() {
        match model.entry_for(&trial.address, trial.size) {
            Some(entry) => trial.entry_group = Some(entry.group),
            None => {
                trial.entry_group = None;
                trial.flags.insert(TrialFlags::NO_USE);
            }
        }
    }
}

/// An exclusion-group entry (`alignment == 0`) backs at most one trial:
/// whichever claims the lowest slot. Every later trial mapped to the
/// same group is forced out (`KILLED_BY_COPY`), since the storage can't
/// simultaneously hold two distinct arguments.
fn force_exclusion_group<M: ParamList + ?Sized>(active: &mut ParamActive, model: &M) {
    let exclusion_groups: std::collections::HashSet<u32> =
        model.entries().iter().filter(|e| e.alignment == 0).map(|e| e.group).collect();
    if exclusion_groups.is_empty() {
        return;
    }

    let mut lowest_slot: std::collections::HashMap<u32, usize> = std::collections::HashMap::new();
    for trial in active.trials.iter() {
        if let Some(group) = trial.entry_group {
            if exclusion_groups.contains(&group) {
                lowest_slot.entry(group).and_modify(|s| *s = (*s).min(trial.slot)).or_insert(trial.slot);
            }
        }
    }
    for trial in active.trials.iter_mut() {
        if let Some(group) = trial.entry_group {
            if exclusion_groups.contains(&group) && lowest_slot.get(&group) != Some(&trial.slot) {
                trial.flags.insert(TrialFlags::KILLED_BY_COPY);
            }
        }
    }
}

/// Trials already marked unusable (`NO_USE`, or excluded by
/// `force_exclusion_group`) lose `ACTIVE`/`USED` so later stages only
/// need to check one condition.
fn force_no_use(active: &mut ParamActive) {
    for trial in active.trials.iter_mut() {
        if trial.flags.intersects(TrialFlags::NO_USE | TrialFlags::KILLED_BY_COPY) {
            trial.flags.remove(TrialFlags::ACTIVE | TrialFlags::USED);
        }
    }
}

/// Parameters are passed contiguously: once a slot in the sequence is
/// inactive, every later slot is forced inactive too, even if the data
/// flow independently made a later trial look used (a gap can only mean
/// the callee never looked that far).
fn force_inactive_chain(active: &mut ParamActive) {
    active.sort_by_slot();
    let mut chain_broken = false;
    for trial in active.trials.iter_mut() {
        if chain_broken {
            trial.flags.remove(TrialFlags::ACTIVE | TrialFlags::USED);
            continue;
        }
        if !trial.flags.contains(TrialFlags::ACTIVE) {
            chain_broken = true;
        }
    }
}

/// Trials still `ACTIVE` after every exclusion/chain check are the real
/// parameters: mark them `USED` and `JUSTIFIED` so `commitNewInputs`
/// keeps them.
fn promote_to_used(active: &mut ParamActive) {
    for trial in active.trials.iter_mut() {
        if trial.flags.contains(TrialFlags::ACTIVE) && !trial.flags.intersects(TrialFlags::NO_USE | TrialFlags::KILLED_BY_COPY) {
            trial.flags.insert(TrialFlags::USED | TrialFlags::JUSTIFIED);
        }
    }
}

const MISSING_SLOT_PENALTY: [i32; 4] = [16, 10, 7, 5];
const MISSING_SLOT_PENALTY_LATER: i32 = 3;
const DUPLICATE_SLOT_PENALTY: i32 = 20;
const MISMATCH_PENALTY: i32 = 20;

/// Scores a set of trials against how a genuine, gap-free, non-duplicated
/// argument sequence should look. Lower is better; zero means every slot
/// from 0 is filled exactly once by storage that matches a declared
/// entry. A missing slot costs `16/10/7/5` for slots 0-3 and `3` for
/// every slot after (most calling conventions front-load arguments, so a
/// gap early on is more damning); a slot claimed by more than one trial
/// costs `20` per duplicate; and a trial whose storage matches no
/// declared entry costs a flat `20` mismatch penalty.
pub fn score_trial_set<M: ParamList + ?Sized>(trials: &[ParamTrial], model: &M) -> i32 {
    if trials.is_empty() {
        return 0;
    }
    let max_slot = trials.iter().map(|t| t.slot).max().unwrap_or(0);
    let mut occupancy = vec![0u32; max_slot + 1];
    for t in trials {
        occupancy[t.slot] += 1;
    }

    let mut score = 0;
    for (slot, &count) in occupancy.iter().enumerate() {
        if count == 0 {
            score += if slot < MISSING_SLOT_PENALTY.len() { MISSING_SLOT_PENALTY[slot] } else { MISSING_SLOT_PENALTY_LATER };
        } else if count > 1 {
            score += DUPLICATE_SLOT_PENALTY * (count as i32 - 1);
        }
    }

    for t in trials {
        if model.entry_for(&t.address, t.size).is_none() {
            score += MISMATCH_PENALTY;
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(space: u32, offset: u64, size: u32, group: u32) -> ParamEntry {
        ParamEntry::exclusion(space, offset, size, group)
    }

    #[test]
    fn standard_assignment_overflows_to_stack() {
        let model = ParamListStandard {
            registers: vec![reg(1, 0, 8, 0), reg(1, 8, 8, 1)],
            stack_space_index: 2,
            stack_start: 0x20,
            stack_align: 8,
        };
        let requests = vec![ParamRequest { size: 8 }, ParamRequest { size: 8 }, ParamRequest { size: 8 }];
        let assigned = model.assign_map(&requests);
        assert_eq!(assigned.len(), 3);
        assert_eq!(assigned[0].address, Address::new(1, 0));
        assert_eq!(assigned[1].address, Address::new(1, 8));
        assert_eq!(assigned[2].address, Address::new(2, 0x20));
    }

    #[test]
    fn register_only_model_drops_overflow_parameters() {
        let model = ParamListRegister { registers: vec![reg(1, 0, 8, 0)] };
        let requests = vec![ParamRequest { size: 8 }, ParamRequest { size: 8 }];
        assert_eq!(model.assign_map(&requests).len(), 1);
    }

    #[test]
    fn fold_in_replaces_colliding_entry_and_appends_otherwise() {
        let mut merged = ParamListMerged::new();
        merged.fold_in(0, reg(1, 0, 4, 0));
        merged.fold_in(0, reg(1, 8, 4, 0));
        assert_eq!(merged.all_entries().len(), 2);

        merged.fold_in(0, reg(1, 0, 4, 0));
        assert_eq!(merged.all_entries().len(), 2, "same storage must replace, not append");
    }

    #[test]
    fn stack_placeholder_slot_defaults_to_negative() {
        let active = ParamActive::new();
        assert!(!active.has_stack_placeholder());
        assert_eq!(active.stack_placeholder_slot, -1);
    }

    /// `alignment == 0` entry backs exactly one slot; `alignment != 0`
    /// entry backs a run of slots, each request advancing the slot
    /// counter by however many it consumed.
    #[test]
    fn scenario_4_exclusion_and_array_slot_assignment() {
        let exclusion = ParamEntry::exclusion(1, 0x100, 4, 0);
        let (addr, next) = exclusion.get_address(0, 4).expect("slot 0 is valid");
        assert_eq!(addr, Address::new(1, 0x100));
        assert_eq!(next, 1);
        assert!(exclusion.get_address(1, 4).is_none(), "exclusion entries have no second slot");

        let array = ParamEntry::array(2, 0x200, 0x100, 4, 4, 1);
        let (addr0, slot_after_first) = array.get_address(0, 4).expect("slot 0 is valid");
        assert_eq!(addr0, Address::new(2, 0x200));
        assert_eq!(slot_after_first, 1);

        let (addr1, slot_after_second) = array.get_address(slot_after_first, 8).expect("slot 1 is valid");
        assert_eq!(addr1, Address::new(2, 0x204));
        assert_eq!(slot_after_second, 3);
    }

    #[test]
    fn fillin_map_kills_exclusion_collisions_and_honors_chain_gaps() {
        let model = ParamListStandard {
            registers: vec![reg(1, 0, 8, 0), reg(1, 8, 8, 1), reg(1, 16, 8, 2)],
            stack_space_index: 2,
            stack_start: 0x20,
            stack_align: 8,
        };

        let mut active = ParamActive::new();
        let mut t0 = ParamTrial::new(Address::new(1, 0), 8, 0);
        t0.flags.insert(TrialFlags::ACTIVE);
        active.push(t0);

        // A second trial colliding with the same register (e.g. re-read
        // after a COPY) should be forced out by the exclusion check.
        let mut t0_dup = ParamTrial::new(Address::new(1, 0), 8, 1);
        t0_dup.flags.insert(TrialFlags::ACTIVE);
        active.push(t0_dup);

        // Slot 2 is inactive in the data flow, so slot 2's entry never
        // being "read" breaks the chain for anything after it.
        let t2 = ParamTrial::new(Address::new(1, 16), 8, 2);
        active.push(t2);

        model.fillin_map(&mut active);

        assert!(active.trials[0].flags.contains(TrialFlags::USED));
        assert!(!active.trials[1].flags.contains(TrialFlags::USED), "exclusion collision must not survive");
        assert!(!active.trials[2].flags.contains(TrialFlags::USED), "inactive slot breaks the chain");
    }

    #[test]
    fn fillin_map_marks_unmatched_storage_no_use() {
        let model = ParamListRegister { registers: vec![reg(1, 0, 8, 0)] };
        let mut active = ParamActive::new();
        let mut stray = ParamTrial::new(Address::new(9, 0x1000), 8, 0);
        stray.flags.insert(TrialFlags::ACTIVE);
        active.push(stray);

        model.fillin_map(&mut active);
        assert!(active.trials[0].flags.contains(TrialFlags::NO_USE));
        assert!(!active.trials[0].flags.contains(TrialFlags::USED));
    }

    #[test]
    fn score_trial_set_penalizes_gaps_duplicates_and_mismatches() {
        let model = ParamListStandard {
            registers: vec![reg(1, 0, 8, 0), reg(1, 8, 8, 1)],
            stack_space_index: 2,
            stack_start: 0x20,
            stack_align: 8,
        };

        let perfect = vec![ParamTrial::new(Address::new(1, 0), 8, 0), ParamTrial::new(Address::new(1, 8), 8, 1)];
        assert_eq!(score_trial_set(&perfect, &model), 0);

        let missing_slot_0 = vec![ParamTrial::new(Address::new(1, 8), 8, 1)];
        assert_eq!(score_trial_set(&missing_slot_0, &model), MISSING_SLOT_PENALTY[0]);

        let duplicated = vec![ParamTrial::new(Address::new(1, 0), 8, 0), ParamTrial::new(Address::new(1, 0), 8, 0)];
        assert_eq!(score_trial_set(&duplicated, &model), DUPLICATE_SLOT_PENALTY);

        let mismatched = vec![ParamTrial::new(Address::new(9, 0), 8, 0)];
        assert_eq!(score_trial_set(&mismatched, &model), MISMATCH_PENALTY);
    }
}
