//! Structural cleanup run once after construction.
//!
//! Two passes, in order: exception edges leaving blocks that cannot raise
//! are dropped (with their rescuer/ensurer map entries), then blocks left
//! without any incoming edge are deleted until none remain.

use super::graph::Edge;
use super::{BlockId, Cfg, EdgeKind};
use log::debug;

/// Removes outgoing `Exception` edges from every block whose contents
/// contain no instruction capable of raising. When a removed edge pointed at
/// the block's recorded rescuer or ensurer, that map entry is cleared too.
pub(crate) fn remove_infeasible_exception_edges(cfg: &mut Cfg) {
    let candidates: Vec<BlockId> = cfg
        .blocks()
        .filter(|block| !block.can_raise())
        .map(|block| block.id)
        .collect();

    let mut removed = 0usize;
    for id in candidates {
        let edges: Vec<Edge<BlockId, EdgeKind>> = cfg
            .graph
            .outgoing_of_kind(id, EdgeKind::Exception)
            .copied()
            .collect();
        for edge in edges {
            cfg.graph.remove_edge(edge.source, edge.target, edge.kind);
            if cfg.rescuers.get(&edge.source) == Some(&edge.target) {
                cfg.rescuers.shift_remove(&edge.source);
            }
            if cfg.ensurers.get(&edge.source) == Some(&edge.target) {
                cfg.ensurers.shift_remove(&edge.source);
            }
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("removed {} infeasible exception edge(s)", removed);
    }
}

/// Deletes every block (except entry) with zero incoming edges, repeating
/// until no orphan remains. Blocks materialized only for bookkeeping must
/// not survive as unreachable graph nodes.
pub(crate) fn remove_orphaned_blocks(cfg: &mut Cfg) {
    loop {
        let orphan = cfg
            .blocks()
            .map(|block| block.id)
            .find(|&id| id != cfg.entry && cfg.graph.incoming_edges(id).is_empty());
        let Some(id) = orphan else {
            break;
        };

        cfg.graph.remove_vertex(id);
        if let Some(block) = cfg.blocks[id.index()].take() {
            cfg.block_of_label.remove(&block.label);
        }
        cfg.rescuers.shift_remove(&id);
        cfg.ensurers.shift_remove(&id);
        debug!("removed orphaned block {}", id);
    }
}
