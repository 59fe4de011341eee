//! Nonzero-mask and consume-mask propagation. Generalized from
//! `decompiler_prototype/symbol_recovery.rs::ConstantFolder`, which only
//! ever computed full-width masks; this version keys off
//! `OpCode::info()`'s `EvalCategory` to narrow masks per opcode the way
//! forward "nonzero bit" and backward "consumed bit" analyses require,
//! instead of one constant-folding special case per opcode.

use crate::pcode::{EvalCategory, OpCode, PcodeOp};
use crate::varnode::Varnode;

/// Forward analysis: the minimal mask that could have any of its bits set,
/// given `output`'s size and its inputs' current nonzero masks. Opcodes
/// that this module doesn't special-case fall back to the opcode's full
/// mask (the conservative "no information" answer).
pub fn compute_nonzero_mask(op: &PcodeOp, inputs: &[&Varnode]) -> u64 {
    if op.output.is_none() {
        return u64::MAX;
    }
    let out_size = match inputs.first() {
        Some(vn) => vn.size,
        None => return u64::MAX,
    };
    let full = Varnode::full_mask(out_size);

    match op.opcode.info().category {
        EvalCategory::IntCompare | EvalCategory::FloatCompare | EvalCategory::BoolLogic => 1,
        EvalCategory::IntArith => match op.opcode {
            OpCode::IntAnd => inputs.get(0).map(|a| a.nonzero_mask).unwrap_or(full) & inputs.get(1).map(|b| b.nonzero_mask).unwrap_or(full),
            OpCode::IntOr | OpCode::IntXor => {
                inputs.get(0).map(|a| a.nonzero_mask).unwrap_or(full) | inputs.get(1).map(|b| b.nonzero_mask).unwrap_or(full)
            }
            OpCode::IntLeft => {
                let base = inputs.get(0).map(|a| a.nonzero_mask).unwrap_or(full);
                if let Some(shift_vn) = inputs.get(1) {
                    if shift_vn.is_constant() {
                        let shift = shift_vn.offset.min(63);
                        return (base << shift) & full;
                    }
                }
                full
            }
            OpCode::IntRight => {
                let base = inputs.get(0).map(|a| a.nonzero_mask).unwrap_or(full);
                if let Some(shift_vn) = inputs.get(1) {
                    if shift_vn.is_constant() {
                        let shift = shift_vn.offset.min(63);
                        return base >> shift;
                    }
                }
                full
            }
            OpCode::PopCount | OpCode::LzCount => full,
            _ => full,
        },
        EvalCategory::DataMovement if op.opcode == OpCode::Copy => {
            inputs.first().map(|a| a.nonzero_mask & full).unwrap_or(full)
        }
        EvalCategory::Conversion if op.opcode == OpCode::IntZExt => {
            inputs.first().map(|a| a.nonzero_mask).unwrap_or(full)
        }
        _ => full,
    }
}

/// Backward analysis: which bits of `input_index`'s value does `op`
/// actually consume to produce a result that matters, given the output's
/// own consume mask. A `Copy`/`IntZExt` with a fully-unconsumed output
/// needs none of its input either; most ops consume everything they're
/// given since p-code has no partial-read opcodes besides truncation/piece.
pub fn compute_consume_mask(op: &PcodeOp, input_index: usize, output_consume: u64, input_size: u32) -> u64 {
    let full = Varnode::full_mask(input_size);
    match op.opcode {
        OpCode::Copy => output_consume & full,
        OpCode::SubPiece if input_index == 0 => {
            // SubPiece's second input is the truncation amount (a constant);
            // the first input's consumed bits are the output's bits shifted
            // up by that amount. Without resolving the constant here we
            // conservatively consume everything below the output's width.
            full
        }
        OpCode::Piece => full,
        _ => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcode::{SeqNum, VarnodeId};
    use crate::address::Address;

    fn op(opcode: OpCode) -> PcodeOp {
        PcodeOp::new(SeqNum::new(Address::new(0, 0x1000), 0), opcode, vec![], Some(VarnodeId(0)))
    }

    #[test]
    fn bool_like_ops_have_single_bit_nonzero_mask() {
        let o = op(OpCode::IntEqual);
        let a = Varnode::new(1, 0, 4);
        let b = Varnode::new(1, 4, 4);
        assert_eq!(compute_nonzero_mask(&o, &[&a, &b]), 1);
    }

    #[test]
    fn int_and_intersects_input_masks() {
        let o = op(OpCode::IntAnd);
        let mut a = Varnode::new(1, 0, 4);
        a.nonzero_mask = 0xFF;
        let mut b = Varnode::new(1, 4, 4);
        b.nonzero_mask = 0x0F;
        assert_eq!(compute_nonzero_mask(&o, &[&a, &b]), 0x0F);
    }

    #[test]
    fn copy_consume_mask_passes_through_output_demand() {
        let o = op(OpCode::Copy);
        assert_eq!(compute_consume_mask(&o, 0, 0xFF, 4), 0xFF);
    }
}
