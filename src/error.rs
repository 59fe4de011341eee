//! Error taxonomy for the analysis core.
//!
//! Two closed kinds, matching the `anyhow`/structured-error split in
//! `jumptable.rs` and `function_analyzer.rs`, generalized into explicit
//! `thiserror` enums so the pass scheduler (out of scope) can pattern
//! match on fatal-vs-recoverable instead of stringly-typed errors.

use crate::address::Address;
use thiserror::Error;

/// Structural invariant violations. Unconditionally fatal to the current
/// function: the caller discards the function's analysis.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LowLevelError {
    #[error("malformed prototype: {0}")]
    MalformedPrototype(String),

    #[error("input varnode at {addr:?} overlaps an existing input in the same space")]
    OverlappingInput { addr: Address },

    #[error("attempted to split a parameter while the stack placeholder is unresolved")]
    UnresolvedStackPlaceholder,

    #[error("stack placeholder still unresolved at commit time")]
    PlaceholderNotCommitted,

    #[error("join pentry decoded inside a group, which is illegal")]
    JoinPentryInGroup,

    #[error("pentry overlaps an earlier entry illegally")]
    IllegalPentryOverlap,

    #[error("pentry size is incompatible with the model's stack growth direction")]
    WrongStackGrowthDirection,

    #[error("varnode bank precondition violated: {0}")]
    BankInvariantViolation(String),

    #[error("op bank precondition violated: {0}")]
    OpBankInvariantViolation(String),
}

/// Per-site analysis failures that leave the function intact. At most one
/// warning is emitted per failure and analysis continues with degraded
/// information.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisFailure {
    #[error("jump table recovery failed: normal indirect branch")]
    JumpTableFailNormal,

    #[error("jump table recovery failed: branch is actually a return")]
    JumpTableFailReturn,

    #[error("jump table recovery failed: branch is a tail-call thunk")]
    JumpTableFailThunk,

    #[error("jump table recovery failed: blocked by an opaque CALLOTHER")]
    JumpTableFailCallOther,

    #[error("dynamic symbol mapping found no matching varnode")]
    DynamicSymbolUnmatched,

    #[error("parameter storage could not be assigned for the return value")]
    ParamUnassigned,
}

/// Where a warning should be attached: the function's entry point gets a
/// `warningheader` comment, individual instructions get a per-instruction
/// warning. Both categories are tracked separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningTarget {
    FunctionHeader(Address),
    Instruction(Address),
}

/// A single attached diagnostic. `Funcdata` accumulates these instead of
/// raising exceptions across its boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub target: WarningTarget,
    pub message: String,
}

impl Warning {
    pub fn header(addr: Address, message: impl Into<String>) -> Self {
        Self { target: WarningTarget::FunctionHeader(addr), message: message.into() }
    }

    pub fn instruction(addr: Address, message: impl Into<String>) -> Self {
        Self { target: WarningTarget::Instruction(addr), message: message.into() }
    }
}
