//! Collaborator traits: the seams this core calls out to but does not
//! implement itself — architecture description, raw-byte access, type
//! information, and architecture-specific pcode injection. A concrete
//! decompiler wires real implementations in; this crate only needs the
//! interfaces to stay decoupled from any one binary format or
//! architecture, the way `ghidra_headless.rs` talks to an external
//! Ghidra process through a narrow RPC surface rather than linking its
//! internals directly.

use crate::address::{Address, AddrSpace};

/// Resolves address-space identity and properties. Every component that
/// needs to go from a space index back to its `AddrSpace` (word size,
/// endianness, spacebase registers) goes through this rather than holding
/// its own copy.
pub trait AddrSpaceManager {
    fn space(&self, index: u32) -> Option<&AddrSpace>;
    fn space_by_name(&self, name: &str) -> Option<&AddrSpace>;
    fn default_code_space(&self) -> u32;
    fn unique_space(&self) -> u32;
    fn stack_space(&self) -> Option<u32>;
}

/// Produces p-code for a single machine instruction at `addr`. A real
/// implementation wraps an actual disassembler/lifter; this core only
/// consumes the resulting `PcodeOp` sequence.
pub trait Translate {
    /// Returns the p-code ops for the instruction at `addr` and the
    /// address of the next instruction (fallthrough), or `None` if `addr`
    /// cannot be decoded.
    fn translate(&self, addr: Address) -> Option<(Vec<crate::pcode::PcodeOp>, Address)>;

    fn instruction_length(&self, addr: Address) -> Option<u32>;
}

/// Raw byte access into the binary being analyzed, keyed by address
/// rather than file offset — resolving that mapping is the
/// implementation's job.
pub trait LoadImage {
    fn load_bytes(&self, addr: Address, len: usize) -> Option<Vec<u8>>;
    fn is_executable(&self, addr: Address) -> bool;
}

/// Opaque handle into a type system (sizes, signedness, struct/union
/// layout) the core consults only to size varnodes and name fields; it
/// never constructs or mutates types itself.
pub trait TypeFactory {
    fn size_of(&self, type_id: u32) -> Option<u32>;
    fn is_pointer(&self, type_id: u32) -> bool;
    fn pointee(&self, type_id: u32) -> Option<u32>;
}

/// Supplies the synthetic p-code an architecture-specific `CALLOTHER`
/// (or other injected pseudo-op) should expand into — e.g. a
/// rep-movs string instruction or a software interrupt with known
/// side effects. Returning `None` leaves the op as an opaque black box.
pub trait PcodeInjectLibrary {
    fn inject(&self, callother_index: u32, inputs: &[crate::pcode::VarnodeId]) -> Option<Vec<crate::pcode::PcodeOp>>;
}
