//! Generic directed-graph substrate.
//!
//! All dependence graphs in the analyzer (PDG, SCC-internal graphs, SCCDAG)
//! are instances of `DepGraph<T>`:
//! - nodes hold a payload of type `T` and an internal/external bit;
//! - edges carry a dependence-kind attribute block and an optional list of
//!   sub-edges (indices into another graph's edge arena);
//! - nodes and edges live in arenas and are addressed by index, so payloads
//!   may participate in cycles without reference counting.
//!
//! External nodes are referenced by edges but are not owned by the graph in
//! the dependence sense: they stand for values that live in an enclosing
//! graph. Removal (during extraction) tombstones arena slots so that ids of
//! surviving nodes and edges remain stable.

use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;

use crate::utils::errors::{GraphError, GraphErrorKind};

/// A unique identifier for a node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A unique identifier for an edge within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Memory-dependence classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemDep {
    /// Read-after-write (true/flow dependence)
    Raw,
    /// Write-after-read (anti dependence)
    War,
    /// Write-after-write (output dependence)
    Waw,
}

impl MemDep {
    /// Get short name for the dependence kind.
    pub fn short_name(&self) -> &'static str {
        match self {
            MemDep::Raw => "RAW",
            MemDep::War => "WAR",
            MemDep::Waw => "WAW",
        }
    }
}

/// Kind flags carried by every edge.
///
/// A register data edge is a RAW dependence through a virtual register; a
/// memory edge additionally records must/may and its RAW/WAR/WAW class. The
/// `loop_carried` bit is filled by the SCC classification stage, not by the
/// graph builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepKind {
    /// Control dependence (source is a branch terminator)
    pub control: bool,
    /// Data dependence through memory rather than a register
    pub memory: bool,
    /// For memory dependences: must-alias rather than may-alias
    pub must: bool,
    /// RAW/WAR/WAW class of a data dependence
    pub dep_class: Option<MemDep>,
    /// Loop-carried (`Some(true)`) vs intra-iteration (`Some(false)`);
    /// `None` until the classification stage runs
    pub loop_carried: Option<bool>,
}

impl DepKind {
    /// A register def-use dependence.
    pub fn register_data() -> Self {
        Self { dep_class: Some(MemDep::Raw), ..Self::default() }
    }

    /// A memory dependence of the given class.
    pub fn memory(class: MemDep, must: bool) -> Self {
        Self { memory: true, must, dep_class: Some(class), ..Self::default() }
    }

    /// A control dependence.
    pub fn control() -> Self {
        Self { control: true, ..Self::default() }
    }

    pub fn is_control_dependence(&self) -> bool {
        self.control
    }

    pub fn is_data_dependence(&self) -> bool {
        !self.control
    }

    pub fn is_memory_dependence(&self) -> bool {
        self.memory
    }

    pub fn is_must_dependence(&self) -> bool {
        self.must
    }

    pub fn is_raw_dependence(&self) -> bool {
        self.dep_class == Some(MemDep::Raw) && !self.control
    }

    /// OR the summary flags of another kind into this one. Used when several
    /// parallel dependences collapse into one edge.
    pub fn merge(&mut self, other: &DepKind) {
        self.control |= other.control;
        self.memory |= other.memory;
        self.must |= other.must;
        if self.dep_class.is_none() {
            self.dep_class = other.dep_class;
        } else if other.dep_class == Some(MemDep::Raw) {
            self.dep_class = Some(MemDep::Raw);
        }
    }
}

#[derive(Debug, Clone)]
struct NodeData<T> {
    payload: T,
    internal: bool,
    outgoing: Vec<EdgeId>,
    incoming: Vec<EdgeId>,
    live: bool,
}

#[derive(Debug, Clone)]
struct EdgeData {
    from: NodeId,
    to: NodeId,
    kind: DepKind,
    sub_edges: Vec<EdgeId>,
    live: bool,
}

/// A typed directed multigraph with internal/external nodes.
#[derive(Debug, Clone, Default)]
pub struct DepGraph<T> {
    nodes: Vec<NodeData<T>>,
    edges: Vec<EdgeData>,
    /// Root anchoring topological iteration of an extracted sub-graph
    root: Option<NodeId>,
}

impl<T> DepGraph<T> {
    pub fn new() -> Self {
        Self { nodes: Vec::new(), edges: Vec::new(), root: None }
    }

    /// Add a node owning `payload`. External nodes stand for values owned by
    /// an enclosing graph.
    pub fn add_node(&mut self, payload: T, internal: bool) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            payload,
            internal,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            live: true,
        });
        id
    }

    /// Add a new edge, regardless of whether one already connects the pair.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: DepKind) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(EdgeData { from, to, kind, sub_edges: Vec::new(), live: true });
        self.nodes[from.0 as usize].outgoing.push(id);
        self.nodes[to.0 as usize].incoming.push(id);
        id
    }

    /// Add an edge, collapsing into an existing (from, to) edge by OR-merging
    /// kind flags. Callers that want parallel edges use `add_edge` instead.
    pub fn add_or_merge_edge(&mut self, from: NodeId, to: NodeId, kind: DepKind) -> EdgeId {
        if let Some(existing) = self.find_edge(from, to) {
            self.edges[existing.0 as usize].kind.merge(&kind);
            return existing;
        }
        self.add_edge(from, to, kind)
    }

    /// First live edge from `from` to `to`, if any.
    pub fn find_edge(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.nodes[from.0 as usize]
            .outgoing
            .iter()
            .copied()
            .find(|&e| self.edges[e.0 as usize].live && self.edges[e.0 as usize].to == to)
    }

    pub fn payload(&self, n: NodeId) -> &T {
        &self.nodes[n.0 as usize].payload
    }

    pub fn payload_mut(&mut self, n: NodeId) -> &mut T {
        &mut self.nodes[n.0 as usize].payload
    }

    pub fn is_internal(&self, n: NodeId) -> bool {
        self.nodes[n.0 as usize].internal
    }

    pub fn is_live(&self, n: NodeId) -> bool {
        self.nodes[n.0 as usize].live
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn edge_from(&self, e: EdgeId) -> NodeId {
        self.edges[e.0 as usize].from
    }

    pub fn edge_to(&self, e: EdgeId) -> NodeId {
        self.edges[e.0 as usize].to
    }

    pub fn edge_kind(&self, e: EdgeId) -> &DepKind {
        &self.edges[e.0 as usize].kind
    }

    pub fn edge_kind_mut(&mut self, e: EdgeId) -> &mut DepKind {
        &mut self.edges[e.0 as usize].kind
    }

    pub fn sub_edges(&self, e: EdgeId) -> &[EdgeId] {
        &self.edges[e.0 as usize].sub_edges
    }

    pub fn add_sub_edge(&mut self, e: EdgeId, sub: EdgeId) {
        self.edges[e.0 as usize].sub_edges.push(sub);
    }

    /// All live nodes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32)
            .map(NodeId)
            .filter(move |&n| self.nodes[n.0 as usize].live)
    }

    /// Live internal nodes, in insertion order.
    pub fn internal_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().filter(move |&n| self.nodes[n.0 as usize].internal)
    }

    /// Live external nodes, in insertion order.
    pub fn external_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().filter(move |&n| !self.nodes[n.0 as usize].internal)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes().count()
    }

    pub fn num_internal_nodes(&self) -> usize {
        self.internal_nodes().count()
    }

    /// All live edges, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len() as u32)
            .map(EdgeId)
            .filter(move |&e| self.edges[e.0 as usize].live)
    }

    pub fn num_edges(&self) -> usize {
        self.edges().count()
    }

    /// Live outgoing edges of a node, in insertion order.
    pub fn outgoing(&self, n: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.nodes[n.0 as usize]
            .outgoing
            .iter()
            .copied()
            .filter(move |&e| self.edges[e.0 as usize].live)
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Live incoming edges of a node, in insertion order.
    pub fn incoming(&self, n: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.nodes[n.0 as usize]
            .incoming
            .iter()
            .copied()
            .filter(move |&e| self.edges[e.0 as usize].live)
            .collect::<Vec<_>>()
            .into_iter()
    }

    pub fn num_outgoing(&self, n: NodeId) -> usize {
        self.outgoing(n).count()
    }

    pub fn num_incoming(&self, n: NodeId) -> usize {
        self.incoming(n).count()
    }

    /// Successor nodes, deduplicated, in first-edge order.
    pub fn successors(&self, n: NodeId) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for e in self.outgoing(n) {
            let to = self.edge_to(e);
            if seen.insert(to) {
                out.push(to);
            }
        }
        out
    }

    /// Predecessor nodes, deduplicated, in first-edge order.
    pub fn predecessors(&self, n: NodeId) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for e in self.incoming(n) {
            let from = self.edge_from(e);
            if seen.insert(from) {
                out.push(from);
            }
        }
        out
    }

    /// Internal nodes with no incoming edge from another internal node.
    pub fn top_level_nodes(&self) -> Vec<NodeId> {
        self.internal_nodes()
            .filter(|&n| {
                !self
                    .incoming(n)
                    .any(|e| self.is_internal(self.edge_from(e)) && self.edge_from(e) != n)
            })
            .collect()
    }

    /// Weakly-connected components of the subgraph induced by internal
    /// nodes, ignoring edge direction. Deterministic: components are emitted
    /// in order of their smallest member, members in insertion order.
    pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
        let mut assigned: BTreeSet<NodeId> = BTreeSet::new();
        let mut components = Vec::new();
        for start in self.internal_nodes() {
            if assigned.contains(&start) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = vec![start];
            assigned.insert(start);
            while let Some(n) = queue.pop() {
                component.push(n);
                let mut neighbors = Vec::new();
                for e in self.outgoing(n) {
                    neighbors.push(self.edge_to(e));
                }
                for e in self.incoming(n) {
                    neighbors.push(self.edge_from(e));
                }
                for next in neighbors {
                    if self.is_internal(next) && assigned.insert(next) {
                        queue.push(next);
                    }
                }
            }
            component.sort();
            components.push(component);
        }
        components
    }
}

impl<T: Clone> DepGraph<T> {
    /// Move (or copy) `nodes` plus all edges with both endpoints in the set
    /// into `target`. Edges with exactly one endpoint in the set are rewritten
    /// to use an external mirror node in `target`. `pivot` becomes the
    /// target's root. With `remove_from_self`, the selected nodes and every
    /// edge touching them are removed from this graph; otherwise the target
    /// holds parallel view nodes referencing clones of the same payloads.
    pub fn extract_nodes_into(
        &mut self,
        nodes: &[NodeId],
        pivot: NodeId,
        remove_from_self: bool,
        target: &mut DepGraph<T>,
    ) -> Result<(), GraphError> {
        let set: BTreeSet<NodeId> = nodes.iter().copied().collect();
        if !set.contains(&pivot) {
            return Err(GraphError::new(
                GraphErrorKind::PivotOutsideSet,
                format!("extraction pivot {} is not in the extracted node set", pivot),
            ));
        }
        for &n in nodes {
            if n.0 as usize >= self.nodes.len() || !self.nodes[n.0 as usize].live {
                return Err(GraphError::new(
                    GraphErrorKind::UnknownNode,
                    format!("cannot extract unknown node {}", n),
                ));
            }
        }

        // Map selected nodes into the target, preserving insertion order.
        let mut mapping: Vec<(NodeId, NodeId)> = Vec::new();
        for &n in nodes {
            let new = target.add_node(self.nodes[n.0 as usize].payload.clone(), true);
            mapping.push((n, new));
        }
        let map = |n: NodeId| mapping.iter().find(|(old, _)| *old == n).map(|(_, new)| *new);
        target.root = map(pivot);

        // Mirror nodes for boundary edges, deduplicated per call.
        let mut mirrors: Vec<(NodeId, NodeId)> = Vec::new();

        let edge_ids: Vec<EdgeId> = self.edges().collect();
        for e in edge_ids {
            let (from, to) = (self.edge_from(e), self.edge_to(e));
            let from_in = set.contains(&from);
            let to_in = set.contains(&to);
            if !from_in && !to_in {
                continue;
            }
            let resolve = |g: &mut Self, mirrors: &mut Vec<(NodeId, NodeId)>,
                           target: &mut DepGraph<T>, n: NodeId, inside: bool| {
                if inside {
                    map(n).unwrap()
                } else if let Some(&(_, m)) = mirrors.iter().find(|(old, _)| *old == n) {
                    m
                } else {
                    let m = target.add_node(g.nodes[n.0 as usize].payload.clone(), false);
                    mirrors.push((n, m));
                    m
                }
            };
            let new_from = resolve(self, &mut mirrors, target, from, from_in);
            let new_to = resolve(self, &mut mirrors, target, to, to_in);
            let new_edge = target.add_edge(new_from, new_to, self.edges[e.0 as usize].kind);
            target.edges[new_edge.0 as usize].sub_edges =
                self.edges[e.0 as usize].sub_edges.clone();
            if remove_from_self {
                self.edges[e.0 as usize].live = false;
            }
        }

        if remove_from_self {
            for &n in &set {
                self.nodes[n.0 as usize].live = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (DepGraph<u32>, Vec<NodeId>) {
        let mut g = DepGraph::new();
        let a = g.add_node(0, true);
        let b = g.add_node(1, true);
        let c = g.add_node(2, true);
        g.add_edge(a, b, DepKind::register_data());
        g.add_edge(b, c, DepKind::register_data());
        (g, vec![a, b, c])
    }

    #[test]
    fn test_top_level_nodes() {
        let (g, ns) = chain();
        assert_eq!(g.top_level_nodes(), vec![ns[0]]);
    }

    #[test]
    fn test_payload_access() {
        let (mut g, ns) = chain();
        assert_eq!(*g.payload(ns[1]), 1);
        *g.payload_mut(ns[1]) = 9;
        assert_eq!(*g.payload(ns[1]), 9);
    }

    #[test]
    fn test_external_nodes_do_not_affect_top_level() {
        let (mut g, ns) = chain();
        let ext = g.add_node(99, false);
        g.add_edge(ext, ns[0], DepKind::register_data());
        assert_eq!(g.top_level_nodes(), vec![ns[0]]);
    }

    #[test]
    fn test_connected_components() {
        let (mut g, _) = chain();
        let d = g.add_node(3, true);
        let e = g.add_node(4, true);
        g.add_edge(d, e, DepKind::control());
        let comps = g.connected_components();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].len(), 3);
        assert_eq!(comps[1], vec![d, e]);
    }

    #[test]
    fn test_merge_collapses_duplicates() {
        let mut g: DepGraph<u32> = DepGraph::new();
        let a = g.add_node(0, true);
        let b = g.add_node(1, true);
        let e1 = g.add_or_merge_edge(a, b, DepKind::register_data());
        let e2 = g.add_or_merge_edge(a, b, DepKind::memory(MemDep::War, true));
        assert_eq!(e1, e2);
        assert_eq!(g.num_edges(), 1);
        assert_eq!(g.num_outgoing(a), 1);
        assert_eq!(g.num_incoming(b), 1);
        let kind = g.edge_kind(e1);
        assert!(kind.is_memory_dependence());
        assert!(kind.is_raw_dependence());
    }

    #[test]
    fn test_extract_moves_and_rewires() {
        let (mut g, ns) = chain();
        let mut sub: DepGraph<u32> = DepGraph::new();
        g.extract_nodes_into(&[ns[1], ns[2]], ns[1], true, &mut sub).unwrap();

        // b and c moved, with the incoming boundary edge rewritten to a mirror.
        assert_eq!(sub.num_internal_nodes(), 2);
        assert_eq!(sub.external_nodes().count(), 1);
        assert_eq!(sub.num_edges(), 2);
        assert_eq!(sub.root().map(|r| *sub.payload(r)), Some(1));

        // Source keeps only a, with no dangling edges.
        assert_eq!(g.num_internal_nodes(), 1);
        assert_eq!(g.num_edges(), 0);
    }

    #[test]
    fn test_extract_view_keeps_source() {
        let (mut g, ns) = chain();
        let mut sub: DepGraph<u32> = DepGraph::new();
        g.extract_nodes_into(&[ns[0], ns[1]], ns[0], false, &mut sub).unwrap();
        assert_eq!(g.num_internal_nodes(), 3);
        assert_eq!(g.num_edges(), 2);
        assert_eq!(sub.num_internal_nodes(), 2);
    }

    #[test]
    fn test_extract_rejects_bad_pivot() {
        let (mut g, ns) = chain();
        let mut sub: DepGraph<u32> = DepGraph::new();
        let err = g
            .extract_nodes_into(&[ns[0]], ns[2], false, &mut sub)
            .unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::PivotOutsideSet);
    }
}
