//! Core intermediate representation and analysis engine for a machine-code
//! decompiler: address spaces, p-code, the varnode/op banks, control-flow
//! structuring, SSA heritage, variable merging, parameter recovery, and
//! jump-table recovery. The raw-byte, disassembly, and type-system layers
//! this core calls out to live behind the traits in `collaborators`; no
//! concrete architecture or binary format is linked in here.

pub mod address;
pub mod block;
pub mod callspec;
pub mod collaborators;
pub mod cover;
pub mod error;
pub mod funcdata;
pub mod heritage;
pub mod highvariable;
pub mod jumptable;
pub mod nzmask;
pub mod opbank;
pub mod param;
pub mod pcode;
pub mod proto;
pub mod varnode;
pub mod varnode_bank;
pub mod wireformat;

pub use address::{AddrSpace, Address, Range, RangeList, SpaceKind};
pub use block::{BasicBlock, BlockGraph, BlockId};
pub use error::{AnalysisFailure, LowLevelError, Warning};
pub use funcdata::Funcdata;
pub use opbank::OpBank;
pub use pcode::{OpCode, OpId, PcodeOp, SeqNum, VarnodeId};
pub use varnode::Varnode;
pub use varnode_bank::VarnodeBank;
