//! Small end-to-end demonstration: builds a synthetic two-block function
//! in p-code by hand, runs block structuring and heritage over it, and
//! prints what came out. Exists to exercise the library's public surface
//! the way a real frontend would wire it up, not as a general-purpose CLI.

use clap::Parser;
use decompiler_core::address::Address;
use decompiler_core::block::{BasicBlock, BlockGraph};
use decompiler_core::heritage::heritage_range;
use decompiler_core::opbank::OpBank;
use decompiler_core::pcode::{OpCode, SeqNum};
use decompiler_core::varnode_bank::VarnodeBank;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "decompiler-core-demo", about = "Builds and structures a synthetic function")]
struct Args {
    /// Emit one COPY definition per branch arm instead of sharing a
    /// single definition, forcing a MULTIEQUAL at the join block.
    #[arg(long, default_value_t = true)]
    divergent_defs: bool,

    /// Verbosity: repeat for more detail (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut graph = BlockGraph::new();
    let entry = graph.add_block(BasicBlock::new());
    let left = graph.add_block(BasicBlock::new());
    let right = graph.add_block(BasicBlock::new());
    let join = graph.add_block(BasicBlock::new());
    graph.add_edge(entry, left);
    graph.add_edge(entry, right);
    graph.add_edge(left, join);
    graph.add_edge(right, join);
    graph.set_entry(entry);

    let mut ops = OpBank::new();
    let mut bank = VarnodeBank::new();
    let mut defining = BTreeMap::new();

    if args.divergent_defs {
        let def_left = ops.new_op(OpCode::Copy, SeqNum::new(Address::new(0, 0x1000), 0), vec![]);
        ops.op_insert_end(def_left, left, &mut graph).unwrap();
        let v_left = bank.create(1, 0x20, 4);
        ops.op_set_output(def_left, v_left, &mut bank).unwrap();

        let def_right = ops.new_op(OpCode::Copy, SeqNum::new(Address::new(0, 0x2000), 0), vec![]);
        ops.op_insert_end(def_right, right, &mut graph).unwrap();
        let v_right = bank.create(1, 0x20, 4);
        ops.op_set_output(def_right, v_right, &mut bank).unwrap();

        defining.insert(left, vec![def_left]);
        defining.insert(right, vec![def_right]);
    }

    graph.structure_reset();
    info!(blocks = graph.block_count(), loops = graph.loops().len(), "structured control-flow graph");

    let inserted = heritage_range(&mut graph, &mut ops, &mut bank, 1, 0x20, 4, &defining);
    info!(phi_count = inserted.len(), "heritage inserted phi nodes at the control-flow join");

    for phi in inserted {
        if let Some(op) = ops.get(phi) {
            println!("{:?} inputs={:?} parent={:?}", op.opcode, op.inputs, op.parent);
        }
    }
}
