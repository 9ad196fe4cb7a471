//! Generic directed graph with typed edges.
//!
//! Vertices are arena-style ids implementing [`VertexId`]; edges are stored
//! as inline adjacency lists in both directions so that incoming and outgoing
//! queries, filtered by edge kind, are cheap. Removing a vertex strips every
//! edge touching it from the mirrored lists.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Dense index-addressed vertex identity.
pub trait VertexId: Copy + Eq + fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

/// A directed, typed edge between two vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge<V, E> {
    pub source: V,
    pub target: V,
    pub kind: E,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VertexSlot<V, E> {
    outgoing: SmallVec<[Edge<V, E>; 4]>,
    incoming: SmallVec<[Edge<V, E>; 4]>,
}

impl<V, E> VertexSlot<V, E> {
    fn new() -> Self {
        Self {
            outgoing: SmallVec::new(),
            incoming: SmallVec::new(),
        }
    }
}

/// Directed graph over [`VertexId`] vertices with edges typed by `E`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectedGraph<V, E> {
    slots: Vec<Option<VertexSlot<V, E>>>,
}

impl<V: VertexId, E: Copy + PartialEq> DirectedGraph<V, E> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn slot(&self, v: V) -> Option<&VertexSlot<V, E>> {
        self.slots.get(v.index()).and_then(|slot| slot.as_ref())
    }

    fn slot_mut(&mut self, v: V) -> Option<&mut VertexSlot<V, E>> {
        self.slots.get_mut(v.index()).and_then(|slot| slot.as_mut())
    }

    fn ensure_slot(&mut self, v: V) -> &mut VertexSlot<V, E> {
        let index = v.index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].get_or_insert_with(VertexSlot::new)
    }

    pub fn add_vertex(&mut self, v: V) {
        self.ensure_slot(v);
    }

    pub fn contains(&self, v: V) -> bool {
        self.slot(v).is_some()
    }

    /// Removes `v` and every edge touching it. Returns false if absent.
    pub fn remove_vertex(&mut self, v: V) -> bool {
        let slot = match self.slots.get_mut(v.index()).and_then(Option::take) {
            Some(slot) => slot,
            None => return false,
        };
        for edge in &slot.outgoing {
            if edge.target != v {
                if let Some(target) = self.slot_mut(edge.target) {
                    target.incoming.retain(|e| e.source != v);
                }
            }
        }
        for edge in &slot.incoming {
            if edge.source != v {
                if let Some(source) = self.slot_mut(edge.source) {
                    source.outgoing.retain(|e| e.target != v);
                }
            }
        }
        true
    }

    /// Inserts a typed edge, creating missing vertices. Identical
    /// (source, target, kind) triples are stored once; distinct kinds
    /// between the same pair coexist.
    pub fn add_edge(&mut self, source: V, target: V, kind: E) {
        let edge = Edge {
            source,
            target,
            kind,
        };
        let out = self.ensure_slot(source);
        if out.outgoing.contains(&edge) {
            return;
        }
        out.outgoing.push(edge);
        self.ensure_slot(target).incoming.push(edge);
    }

    /// Removes the matching edge. Returns false if it was not present.
    pub fn remove_edge(&mut self, source: V, target: V, kind: E) -> bool {
        let edge = Edge {
            source,
            target,
            kind,
        };
        let mut removed = false;
        if let Some(slot) = self.slot_mut(source) {
            let before = slot.outgoing.len();
            slot.outgoing.retain(|e| *e != edge);
            removed = slot.outgoing.len() != before;
        }
        if let Some(slot) = self.slot_mut(target) {
            slot.incoming.retain(|e| *e != edge);
        }
        removed
    }

    pub fn has_edge(&self, source: V, target: V, kind: E) -> bool {
        self.outgoing_edges(source)
            .iter()
            .any(|e| e.target == target && e.kind == kind)
    }

    pub fn outgoing_edges(&self, v: V) -> &[Edge<V, E>] {
        self.slot(v).map(|slot| slot.outgoing.as_slice()).unwrap_or(&[])
    }

    pub fn incoming_edges(&self, v: V) -> &[Edge<V, E>] {
        self.slot(v).map(|slot| slot.incoming.as_slice()).unwrap_or(&[])
    }

    pub fn outgoing_of_kind(&self, v: V, kind: E) -> impl Iterator<Item = &Edge<V, E>> + '_ {
        self.outgoing_edges(v).iter().filter(move |e| e.kind == kind)
    }

    pub fn incoming_of_kind(&self, v: V, kind: E) -> impl Iterator<Item = &Edge<V, E>> + '_ {
        self.incoming_edges(v).iter().filter(move |e| e.kind == kind)
    }

    pub fn vertices(&self) -> impl Iterator<Item = V> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| V::from_index(index)))
    }

    pub fn vertex_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn edge_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot.outgoing.len())
            .sum()
    }
}

impl<V: VertexId, E: Copy + PartialEq> Default for DirectedGraph<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::block::BlockId;
    use crate::cfg::EdgeKind;

    fn bb(raw: u32) -> BlockId {
        BlockId::new(raw)
    }

    #[test]
    fn edges_are_mirrored() {
        let mut graph: DirectedGraph<BlockId, EdgeKind> = DirectedGraph::new();
        graph.add_edge(bb(0), bb(1), EdgeKind::FallThrough);

        assert!(graph.has_edge(bb(0), bb(1), EdgeKind::FallThrough));
        assert_eq!(graph.outgoing_edges(bb(0)).len(), 1);
        assert_eq!(graph.incoming_edges(bb(1)).len(), 1);
        assert_eq!(graph.incoming_edges(bb(1))[0].source, bb(0));
    }

    #[test]
    fn identical_edges_are_stored_once() {
        let mut graph: DirectedGraph<BlockId, EdgeKind> = DirectedGraph::new();
        graph.add_edge(bb(0), bb(1), EdgeKind::Regular);
        graph.add_edge(bb(0), bb(1), EdgeKind::Regular);
        graph.add_edge(bb(0), bb(1), EdgeKind::Exception);

        assert_eq!(graph.outgoing_edges(bb(0)).len(), 2);
        assert_eq!(graph.incoming_edges(bb(1)).len(), 2);
    }

    #[test]
    fn kind_filtering() {
        let mut graph: DirectedGraph<BlockId, EdgeKind> = DirectedGraph::new();
        graph.add_edge(bb(0), bb(1), EdgeKind::FallThrough);
        graph.add_edge(bb(0), bb(2), EdgeKind::Regular);
        graph.add_edge(bb(0), bb(3), EdgeKind::Exception);

        let regular: Vec<_> = graph.outgoing_of_kind(bb(0), EdgeKind::Regular).collect();
        assert_eq!(regular.len(), 1);
        assert_eq!(regular[0].target, bb(2));
        assert_eq!(graph.incoming_of_kind(bb(3), EdgeKind::Exception).count(), 1);
    }

    #[test]
    fn removing_a_vertex_strips_its_edges() {
        let mut graph: DirectedGraph<BlockId, EdgeKind> = DirectedGraph::new();
        graph.add_edge(bb(0), bb(1), EdgeKind::FallThrough);
        graph.add_edge(bb(1), bb(2), EdgeKind::Regular);
        graph.add_edge(bb(2), bb(1), EdgeKind::Regular);

        assert!(graph.remove_vertex(bb(1)));
        assert!(!graph.contains(bb(1)));
        assert!(graph.outgoing_edges(bb(0)).is_empty());
        assert!(graph.incoming_edges(bb(2)).is_empty());
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn remove_edge_reports_presence() {
        let mut graph: DirectedGraph<BlockId, EdgeKind> = DirectedGraph::new();
        graph.add_edge(bb(0), bb(1), EdgeKind::Exit);

        assert!(graph.remove_edge(bb(0), bb(1), EdgeKind::Exit));
        assert!(!graph.remove_edge(bb(0), bb(1), EdgeKind::Exit));
        assert!(graph.incoming_edges(bb(1)).is_empty());
    }

    #[test]
    fn vertices_iterates_live_slots() {
        let mut graph: DirectedGraph<BlockId, EdgeKind> = DirectedGraph::new();
        graph.add_vertex(bb(0));
        graph.add_vertex(bb(2));
        graph.remove_vertex(bb(0));

        let live: Vec<_> = graph.vertices().collect();
        assert_eq!(live, vec![bb(2)]);
    }
}
