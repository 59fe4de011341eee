//! Function prototypes: a named parameter-passing model plus a concrete
//! function's recovered signature, and the store that owns prototypes
//! for every known function. Grounded in
//! `decompiler_prototype/type_inference.rs::FunctionSignature`, which
//! held a flat `Vec<Type>` with no storage model attached; this version
//! separates the reusable calling-convention (`ProtoModel`) from the
//! per-function binding of parameters to storage (`FuncProto`).

use crate::address::Address;
use crate::param::{ParamAssignment, ParamList, ParamRequest};
use std::sync::Arc;

/// A named calling convention: one input model and one output model. Most
/// functions in a binary share a handful of `ProtoModel`s (e.g. one per
/// ABI), so these are held behind `Arc` and referenced, not cloned, by
/// each `FuncProto`.
pub struct ProtoModel {
    pub name: String,
    pub input: Box<dyn ParamList + Send + Sync>,
    pub output: Box<dyn ParamList + Send + Sync>,
    pub extra_pop: i64,
    pub stack_growth_negative: bool,
}

impl ProtoModel {
    pub fn assign_inputs(&self, requests: &[ParamRequest]) -> Vec<ParamAssignment> {
        self.input.assign_map(requests)
    }

    pub fn assign_outputs(&self, requests: &[ParamRequest]) -> Vec<ParamAssignment> {
        self.output.assign_map(requests)
    }
}

/// Marks which symbol-table category backs a prototype's storage: a
/// named, persistent symbol; an unnamed but still-symbol-backed entry; or
/// — the case this core resolves explicitly per its Open Questions — a
/// synthetic union-facet symbol produced when two overlapping storage
/// interpretations of the same bytes both need a name. `2` is reserved
/// for that facet category the way the rest of the symbol-category space
/// is a small closed set (see DESIGN.md).
pub const SYMBOL_CATEGORY_UNION_FACET: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoSource {
    Symbol,
    Internal,
}

/// One recovered function signature: a reference to the calling
/// convention it follows, plus the concrete storage each parameter (and
/// the return value) resolved to for this particular function.
pub struct FuncProto {
    pub model: Arc<ProtoModel>,
    pub source: ProtoSource,
    pub params: Vec<ParamAssignment>,
    pub return_value: Option<ParamAssignment>,
    pub is_dotdotdot: bool,
    pub no_return: bool,
    pub extra_pop_override: Option<i64>,
}

impl FuncProto {
    pub fn new(model: Arc<ProtoModel>, source: ProtoSource) -> Self {
        Self { model, source, params: Vec::new(), return_value: None, is_dotdotdot: false, no_return: false, extra_pop_override: None }
    }

    /// Resolves every declared parameter's storage via the backing model,
    /// overwriting any prior assignment.
    pub fn resolve(&mut self, requests: &[ParamRequest], return_request: Option<ParamRequest>) {
        self.params = self.model.assign_inputs(requests);
        self.return_value = return_request.map(|r| self.model.assign_outputs(&[r]).remove(0));
    }

    pub fn extra_pop(&self) -> i64 {
        self.extra_pop_override.unwrap_or(self.model.extra_pop)
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn param_storage(&self, index: usize) -> Option<Address> {
        self.params.get(index).map(|p| p.address)
    }
}

/// Owns the `FuncProto` for every function the analysis knows about,
/// keyed by entry address. Functions discovered from a symbol table start
/// as `ProtoSource::Symbol`; ones synthesized purely from call-site
/// recovery (no symbol) start as `ProtoSource::Internal` and may later be
/// promoted once a symbol is matched.
#[derive(Default)]
pub struct ProtoStore {
    by_entry: std::collections::BTreeMap<Address, FuncProto>,
}

impl ProtoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: Address, proto: FuncProto) {
        self.by_entry.insert(entry, proto);
    }

    pub fn get(&self, entry: &Address) -> Option<&FuncProto> {
        self.by_entry.get(entry)
    }

    pub fn get_mut(&mut self, entry: &Address) -> Option<&mut FuncProto> {
        self.by_entry.get_mut(entry)
    }

    /// Promotes an internally-synthesized prototype to symbol-backed once
    /// a matching symbol is found, preserving any already-recovered
    /// parameter storage rather than discarding it.
    pub fn promote_to_symbol(&mut self, entry: &Address) {
        if let Some(proto) = self.by_entry.get_mut(entry) {
            proto.source = ProtoSource::Symbol;
        }
    }
}
