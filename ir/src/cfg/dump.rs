//! CFG dump utilities.
//!
//! Pretty-prints a built graph and its handler tables in a compact
//! assembler-like text form for debugging and golden tests.

use super::Cfg;
use std::fmt::Write;

/// Dumps every live block with its instructions and outgoing edges.
pub fn dump_cfg(cfg: &Cfg) -> String {
    let mut out = String::new();
    for block in cfg.blocks() {
        let mut note = format!("{}", block.label);
        if block.id == cfg.entry() {
            note.push_str(", entry");
        } else if block.id == cfg.exit() {
            note.push_str(", exit");
        }
        writeln!(out, "{}: ; {}", block.id, note).unwrap();
        for instr in &block.instrs {
            writeln!(out, "    {}", instr).unwrap();
        }
        for edge in cfg.graph().outgoing_edges(block.id) {
            writeln!(out, "    -> {} [{}]", edge.target, edge.kind).unwrap();
        }
    }
    out
}

/// Renders the rescuer and ensurer tables.
pub fn dump_handler_tables(cfg: &Cfg) -> String {
    let mut out = String::new();
    writeln!(out, "; rescuer map").unwrap();
    for (block, handler) in cfg.rescuers() {
        writeln!(out, ";   {} -> {}", block, handler).unwrap();
    }
    writeln!(out, "; ensurer map").unwrap();
    for (block, handler) in cfg.ensurers() {
        writeln!(out, ";   {} -> {}", block, handler).unwrap();
    }
    out
}
