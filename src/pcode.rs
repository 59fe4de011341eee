//! P-code: the micro-operation language every transformation mutates.
//! Renamed and regeneralized from `decompiler_prototype/pcode.rs`, which
//! already carried the right `OpCode`/`Varnode`/`PcodeOp` shapes for a
//! simplified subset; this version closes the opcode enum over the full
//! list and adds a per-opcode metadata table instead of dispatching on
//! opcode in every pass.

use crate::address::Address;
use serde::{Deserialize, Serialize};

/// The closed set of p-code opcodes. No dynamic extension — CALLOTHER is
/// the one opcode that carries architecture-specific meaning via its first
/// input, everything else is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    Copy,
    Load,
    Store,

    Branch,
    CBranch,
    BranchInd,
    Call,
    CallInd,
    CallOther,
    Return,

    IntEqual,
    IntNotEqual,
    IntSLess,
    IntSLessEqual,
    IntLess,
    IntLessEqual,

    IntZExt,
    IntSExt,

    IntAdd,
    IntSub,
    IntCarry,
    IntSCarry,
    IntSBorrow,
    Int2Comp,
    IntNegate,
    IntXor,
    IntAnd,
    IntOr,
    IntLeft,
    IntRight,
    IntSRight,
    IntMult,
    IntDiv,
    IntSDiv,
    IntRem,
    IntSRem,

    BoolNegate,
    BoolXor,
    BoolAnd,
    BoolOr,

    FloatEqual,
    FloatNotEqual,
    FloatLess,
    FloatLessEqual,
    FloatNan,

    FloatAdd,
    FloatDiv,
    FloatMult,
    FloatSub,
    FloatNeg,
    FloatAbs,
    FloatSqrt,

    FloatInt2Float,
    FloatFloat2Float,
    FloatTrunc,
    FloatCeil,
    FloatFloor,
    FloatRound,

    MultiEqual,
    Indirect,

    Piece,
    SubPiece,
    Cast,
    PtrAdd,
    PtrSub,
    SegmentOp,
    CPoolRef,
    New,
    Insert,
    Extract,
    PopCount,
    LzCount,
}

/// How an opcode participates in control flow. Used by block construction
/// to decide where to split and by structuring to decide which ops must
/// be last in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowClass {
    Fallthrough,
    Branch,
    CondBranch,
    IndirectBranch,
    Call,
    IndirectCall,
    Terminal,
}

/// The broad evaluation category of an opcode, used to pick a nonzero-mask
/// rule and by later passes (out of scope here) that key behavior off of
/// "is this arithmetic/comparison/data-movement/SSA-scaffolding".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalCategory {
    DataMovement,
    Control,
    IntArith,
    IntCompare,
    BoolLogic,
    FloatArith,
    FloatCompare,
    Conversion,
    SsaScaffold,
    PointerArith,
    Other,
}

/// Per-opcode metadata: arity, flow class, whether it produces an output,
/// and evaluation category. Indexed by `OpCode::info()` rather than
/// scattered across `match` blocks in every pass.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub min_inputs: usize,
    pub max_inputs: Option<usize>,
    pub has_output: bool,
    pub flow: FlowClass,
    pub category: EvalCategory,
}

impl OpCode {
    pub fn info(self) -> OpcodeInfo {
        use EvalCategory::*;
        use FlowClass::*;
        use OpCode::*;
        match self {
            Copy => OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: DataMovement },
            Load => OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: DataMovement },
            Store => OpcodeInfo { min_inputs: 3, max_inputs: Some(3), has_output: false, flow: Fallthrough, category: DataMovement },

            Branch => OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: false, flow: Branch, category: Control },
            CBranch => OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: false, flow: CondBranch, category: Control },
            BranchInd => OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: false, flow: IndirectBranch, category: Control },
            Call => OpcodeInfo { min_inputs: 1, max_inputs: None, has_output: false, flow: Call, category: Control },
            CallInd => OpcodeInfo { min_inputs: 1, max_inputs: None, has_output: false, flow: IndirectCall, category: Control },
            CallOther => OpcodeInfo { min_inputs: 1, max_inputs: None, has_output: true, flow: Fallthrough, category: Other },
            Return => OpcodeInfo { min_inputs: 1, max_inputs: None, has_output: false, flow: Terminal, category: Control },

            IntEqual | IntNotEqual | IntSLess | IntSLessEqual | IntLess | IntLessEqual => {
                OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: IntCompare }
            }

            IntZExt | IntSExt => {
                OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: Conversion }
            }

            IntAdd | IntSub | IntCarry | IntSCarry | IntSBorrow | IntXor | IntAnd | IntOr | IntLeft | IntRight
            | IntSRight | IntMult | IntDiv | IntSDiv | IntRem | IntSRem => {
                OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: IntArith }
            }
            Int2Comp | IntNegate => {
                OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: IntArith }
            }

            BoolXor | BoolAnd | BoolOr => {
                OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: BoolLogic }
            }
            BoolNegate => OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: BoolLogic },

            FloatEqual | FloatNotEqual | FloatLess | FloatLessEqual => {
                OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: FloatCompare }
            }
            FloatNan => OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: FloatCompare },

            FloatAdd | FloatDiv | FloatMult | FloatSub => {
                OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: FloatArith }
            }
            FloatNeg | FloatAbs | FloatSqrt => {
                OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: FloatArith }
            }

            FloatInt2Float | FloatFloat2Float | FloatTrunc | FloatCeil | FloatFloor | FloatRound => {
                OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: Conversion }
            }

            MultiEqual => OpcodeInfo { min_inputs: 1, max_inputs: None, has_output: true, flow: Fallthrough, category: SsaScaffold },
            Indirect => OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: SsaScaffold },

            Piece => OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: DataMovement },
            SubPiece => OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: DataMovement },
            Cast => OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: Conversion },
            PtrAdd => OpcodeInfo { min_inputs: 3, max_inputs: Some(3), has_output: true, flow: Fallthrough, category: PointerArith },
            PtrSub => OpcodeInfo { min_inputs: 2, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: PointerArith },
            SegmentOp => OpcodeInfo { min_inputs: 3, max_inputs: Some(3), has_output: true, flow: Fallthrough, category: PointerArith },
            CPoolRef => OpcodeInfo { min_inputs: 1, max_inputs: None, has_output: true, flow: Fallthrough, category: Other },
            New => OpcodeInfo { min_inputs: 1, max_inputs: Some(2), has_output: true, flow: Fallthrough, category: Other },
            Insert => OpcodeInfo { min_inputs: 4, max_inputs: Some(4), has_output: true, flow: Fallthrough, category: DataMovement },
            Extract => OpcodeInfo { min_inputs: 3, max_inputs: Some(3), has_output: true, flow: Fallthrough, category: DataMovement },
            PopCount => OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: IntArith },
            LzCount => OpcodeInfo { min_inputs: 1, max_inputs: Some(1), has_output: true, flow: Fallthrough, category: IntArith },
        }
    }

    pub fn is_branch(self) -> bool {
        matches!(self.info().flow, FlowClass::Branch | FlowClass::CondBranch | FlowClass::IndirectBranch | FlowClass::Terminal)
    }

    pub fn ends_block(self) -> bool {
        matches!(
            self.info().flow,
            FlowClass::Branch | FlowClass::CondBranch | FlowClass::IndirectBranch | FlowClass::Terminal
        )
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpCode::Copy => "COPY",
            OpCode::Load => "LOAD",
            OpCode::Store => "STORE",
            OpCode::Branch => "BRANCH",
            OpCode::CBranch => "CBRANCH",
            OpCode::BranchInd => "BRANCHIND",
            OpCode::Call => "CALL",
            OpCode::CallInd => "CALLIND",
            OpCode::CallOther => "CALLOTHER",
            OpCode::Return => "RETURN",
            OpCode::IntEqual => "INT_EQUAL",
            OpCode::IntNotEqual => "INT_NOTEQUAL",
            OpCode::IntSLess => "INT_SLESS",
            OpCode::IntSLessEqual => "INT_SLESSEQUAL",
            OpCode::IntLess => "INT_LESS",
            OpCode::IntLessEqual => "INT_LESSEQUAL",
            OpCode::IntZExt => "INT_ZEXT",
            OpCode::IntSExt => "INT_SEXT",
            OpCode::IntAdd => "INT_ADD",
            OpCode::IntSub => "INT_SUB",
            OpCode::IntCarry => "INT_CARRY",
            OpCode::IntSCarry => "INT_SCARRY",
            OpCode::IntSBorrow => "INT_SBORROW",
            OpCode::Int2Comp => "INT_2COMP",
            OpCode::IntNegate => "INT_NEGATE",
            OpCode::IntXor => "INT_XOR",
            OpCode::IntAnd => "INT_AND",
            OpCode::IntOr => "INT_OR",
            OpCode::IntLeft => "INT_LEFT",
            OpCode::IntRight => "INT_RIGHT",
            OpCode::IntSRight => "INT_SRIGHT",
            OpCode::IntMult => "INT_MULT",
            OpCode::IntDiv => "INT_DIV",
            OpCode::IntSDiv => "INT_SDIV",
            OpCode::IntRem => "INT_REM",
            OpCode::IntSRem => "INT_SREM",
            OpCode::BoolNegate => "BOOL_NEGATE",
            OpCode::BoolXor => "BOOL_XOR",
            OpCode::BoolAnd => "BOOL_AND",
            OpCode::BoolOr => "BOOL_OR",
            OpCode::FloatEqual => "FLOAT_EQUAL",
            OpCode::FloatNotEqual => "FLOAT_NOTEQUAL",
            OpCode::FloatLess => "FLOAT_LESS",
            OpCode::FloatLessEqual => "FLOAT_LESSEQUAL",
            OpCode::FloatNan => "FLOAT_NAN",
            OpCode::FloatAdd => "FLOAT_ADD",
            OpCode::FloatDiv => "FLOAT_DIV",
            OpCode::FloatMult => "FLOAT_MULT",
            OpCode::FloatSub => "FLOAT_SUB",
            OpCode::FloatNeg => "FLOAT_NEG",
            OpCode::FloatAbs => "FLOAT_ABS",
            OpCode::FloatSqrt => "FLOAT_SQRT",
            OpCode::FloatInt2Float => "FLOAT_INT2FLOAT",
            OpCode::FloatFloat2Float => "FLOAT_FLOAT2FLOAT",
            OpCode::FloatTrunc => "FLOAT_TRUNC",
            OpCode::FloatCeil => "FLOAT_CEIL",
            OpCode::FloatFloor => "FLOAT_FLOOR",
            OpCode::FloatRound => "FLOAT_ROUND",
            OpCode::MultiEqual => "MULTIEQUAL",
            OpCode::Indirect => "INDIRECT",
            OpCode::Piece => "PIECE",
            OpCode::SubPiece => "SUBPIECE",
            OpCode::Cast => "CAST",
            OpCode::PtrAdd => "PTRADD",
            OpCode::PtrSub => "PTRSUB",
            OpCode::SegmentOp => "SEGMENTOP",
            OpCode::CPoolRef => "CPOOLREF",
            OpCode::New => "NEW",
            OpCode::Insert => "INSERT",
            OpCode::Extract => "EXTRACT",
            OpCode::PopCount => "POPCOUNT",
            OpCode::LzCount => "LZCOUNT",
        };
        write!(f, "{}", s)
    }
}

/// `(instruction address, monotonic time uniquifier, basic-block order)`.
/// The time field distinguishes multiple ops synthesized at the same
/// instruction address (e.g. a CALL's hidden-return setup); `order` is
/// filled in once the op is placed into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeqNum {
    pub address: Address,
    pub time: u64,
    pub order: u32,
}

impl SeqNum {
    pub fn new(address: Address, time: u64) -> Self {
        Self { address, time, order: 0 }
    }
}

/// Opaque identifier for a `Varnode` held in the `VarnodeBank` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarnodeId(pub u32);

/// Opaque identifier for a `PcodeOp` held in the op bank arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId(pub u32);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct OpFlags: u32 {
        const BRANCH             = 1 << 0;
        const CALL               = 1 << 1;
        const MARKER             = 1 << 2;
        const STARTBASIC         = 1 << 3;
        const STARTMARK          = 1 << 4;
        const NO_COLLAPSE        = 1 << 5;
        const DEAD               = 1 << 6;
        const SPECIAL_PRINT      = 1 << 7;
        const INDIRECT_CREATION  = 1 << 8;
        const INDIRECT_STORE     = 1 << 9;
        const HALT_COPY          = 1 << 10;
        const CALCULATED_BOOL    = 1 << 11;
        const HOLDOUT            = 1 << 12;
        const RETURN_COPY        = 1 << 13;
        const SPECIAL_PROPAGATION = 1 << 14;
        const INCIDENTAL_COPY    = 1 << 15;
        const CPOOL_TRANSFORMED  = 1 << 16;
        const STOP_TYPE_PROPAGATION = 1 << 17;
        const STORE_UNMAPPED     = 1 << 18;
    }
}

/// A single p-code micro-operation: opcode, 0..N input varnodes, at most
/// one output varnode, the block it lives in once placed, a sequence
/// number, and a flag set. Inputs/outputs are stored as `VarnodeId`s
/// rather than owned `Varnode`s so the bidirectional op<->varnode links
/// stay index-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcodeOp {
    pub seq: SeqNum,
    pub opcode: OpCode,
    pub output: Option<VarnodeId>,
    pub inputs: Vec<VarnodeId>,
    pub parent: Option<crate::block::BlockId>,
    pub flags: OpFlags,
}

impl PcodeOp {
    pub fn new(seq: SeqNum, opcode: OpCode, inputs: Vec<VarnodeId>, output: Option<VarnodeId>) -> Self {
        Self { seq, opcode, output, inputs, parent: None, flags: OpFlags::empty() }
    }

    pub fn is_dead(&self) -> bool {
        self.flags.contains(OpFlags::DEAD)
    }

    /// A phi op (MULTIEQUAL) must appear first in its block.
    pub fn is_phi(&self) -> bool {
        self.opcode == OpCode::MultiEqual
    }

    /// An INDIRECT op annotates a cross-op effect at a specific storage and
    /// must immediately precede the op it annotates.
    pub fn is_indirect_marker(&self) -> bool {
        self.opcode == OpCode::Indirect
    }
}
