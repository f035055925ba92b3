//! Strongly connected components of a PDG and their condensation DAG.
//!
//! `Scc` is an owning sub-graph over the values of one component, with
//! boundary values mirrored as external nodes. `SccDag` is a `DepGraph`
//! whose payloads are the `Scc` objects; its edges aggregate the underlying
//! PDG edges as sub-edges. The PDG must outlive the SCCDAG: sub-edge lists
//! hold PDG edge ids.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::analysis::pdg::Pdg;
use crate::graph::{DepGraph, EdgeId, NodeId};
use crate::ir::ValueId;
use crate::utils::errors::{GraphError, GraphErrorKind};

/// One strongly connected component of a PDG.
///
/// Internal nodes are the member values; external nodes mirror values on the
/// other end of boundary edges. Every edge carries the PDG edge it was copied
/// from as its single sub-edge.
#[derive(Debug, Clone)]
pub struct Scc {
    graph: DepGraph<ValueId>,
    members: BTreeSet<ValueId>,
}

impl Scc {
    /// Build the component sub-graph for `members` (PDG node ids, all live).
    /// Members are laid down in ascending PDG-node order so iteration is
    /// program order.
    pub fn from_pdg(pdg: &Pdg, members: &[NodeId]) -> Self {
        let mut ordered: Vec<NodeId> = members.to_vec();
        ordered.sort();

        let mut graph = DepGraph::new();
        let mut node_of: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut member_values = BTreeSet::new();
        for &n in &ordered {
            let v = pdg.value_of(n);
            node_of.insert(n, graph.add_node(v, true));
            member_values.insert(v);
        }

        let in_set: BTreeSet<NodeId> = ordered.iter().copied().collect();
        let mut mirrors: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        for e in pdg.graph().edges() {
            let (from, to) = (pdg.graph().edge_from(e), pdg.graph().edge_to(e));
            let from_in = in_set.contains(&from);
            let to_in = in_set.contains(&to);
            if !from_in && !to_in {
                continue;
            }
            let mut resolve = |n: NodeId, inside: bool, graph: &mut DepGraph<ValueId>| {
                if inside {
                    node_of[&n]
                } else {
                    *mirrors
                        .entry(n)
                        .or_insert_with(|| graph.add_node(pdg.value_of(n), false))
                }
            };
            let new_from = resolve(from, from_in, &mut graph);
            let new_to = resolve(to, to_in, &mut graph);
            let copy = graph.add_edge(new_from, new_to, *pdg.graph().edge_kind(e));
            graph.add_sub_edge(copy, e);
        }

        Self { graph, members: member_values }
    }

    /// Component sub-graph (internal members plus boundary mirrors).
    pub fn graph(&self) -> &DepGraph<ValueId> {
        &self.graph
    }

    /// Whether the value is a member of this component.
    pub fn is_internal(&self, v: ValueId) -> bool {
        self.members.contains(&v)
    }

    /// Member values, in program order.
    pub fn internal_values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.members.iter().copied()
    }

    pub fn number_of_instructions(&self) -> usize {
        self.members.len()
    }

    /// The component node of a member value.
    pub fn node_of(&self, v: ValueId) -> Option<NodeId> {
        self.graph
            .internal_nodes()
            .find(|&n| *self.graph.payload(n) == v)
    }

    /// PDG edge ids of the edges internal to this component.
    pub fn internal_edge_sources(&self) -> Vec<EdgeId> {
        self.graph
            .edges()
            .filter(|&e| {
                self.graph.is_internal(self.graph.edge_from(e))
                    && self.graph.is_internal(self.graph.edge_to(e))
            })
            .flat_map(|e| self.graph.sub_edges(e).to_vec())
            .collect()
    }

    /// Whether the component contains a dependence cycle among its members,
    /// optionally ignoring control edges. A single member only cycles through
    /// a self-edge.
    pub fn has_cycle(&self, ignore_control: bool) -> bool {
        let internal: Vec<NodeId> = self.graph.internal_nodes().collect();
        for &start in &internal {
            // DFS forward from `start`; a path back to it is a cycle.
            let mut stack: Vec<NodeId> = vec![start];
            let mut visited: BTreeSet<NodeId> = BTreeSet::new();
            while let Some(n) = stack.pop() {
                for e in self.graph.outgoing(n) {
                    if ignore_control && self.graph.edge_kind(e).is_control_dependence() {
                        continue;
                    }
                    let to = self.graph.edge_to(e);
                    if !self.graph.is_internal(to) {
                        continue;
                    }
                    if to == start {
                        return true;
                    }
                    if visited.insert(to) {
                        stack.push(to);
                    }
                }
            }
        }
        false
    }
}

/// The condensation DAG of a PDG.
pub struct SccDag {
    graph: DepGraph<Scc>,
    /// Member value -> SCCDAG node, internal SCCs only
    scc_of: BTreeMap<ValueId, NodeId>,
}

impl SccDag {
    /// Condense a PDG: weakly-connected components first, then Tarjan within
    /// each component (components emitted in reverse topological order), then
    /// one aggregated SCCDAG edge per cross-component PDG edge pair.
    pub fn from_pdg(pdg: &Pdg) -> Self {
        let mut graph: DepGraph<Scc> = DepGraph::new();
        let mut scc_of: BTreeMap<ValueId, NodeId> = BTreeMap::new();
        let mut node_to_scc: BTreeMap<NodeId, NodeId> = BTreeMap::new();

        for component in pdg.collect_connected_components() {
            for members in tarjan_sccs(pdg.graph(), &component) {
                let scc = Scc::from_pdg(pdg, &members);
                let node = graph.add_node(scc, true);
                for &m in &members {
                    scc_of.insert(pdg.value_of(m), node);
                    node_to_scc.insert(m, node);
                }
            }
        }
        debug!(
            "condensed {} PDG nodes into {} SCCs",
            pdg.graph().num_internal_nodes(),
            graph.num_internal_nodes()
        );

        // External singleton SCCs are created lazily, only when an edge
        // touches the external value.
        let mut external_scc: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let edge_ids: Vec<EdgeId> = pdg.graph().edges().collect();
        for e in edge_ids {
            let (u, v) = (pdg.graph().edge_from(e), pdg.graph().edge_to(e));
            let mut lookup = |n: NodeId, graph: &mut DepGraph<Scc>| -> (NodeId, bool) {
                if let Some(&s) = node_to_scc.get(&n) {
                    return (s, true);
                }
                let s = *external_scc
                    .entry(n)
                    .or_insert_with(|| graph.add_node(Scc::from_pdg(pdg, &[n]), false));
                (s, false)
            };
            let (sa, a_internal) = lookup(u, &mut graph);
            let (sb, b_internal) = lookup(v, &mut graph);
            if sa == sb || (!a_internal && !b_internal) {
                continue;
            }
            let edge = graph.add_or_merge_edge(sa, sb, *pdg.graph().edge_kind(e));
            graph.add_sub_edge(edge, e);
        }

        Self { graph, scc_of }
    }

    pub fn graph(&self) -> &DepGraph<Scc> {
        &self.graph
    }

    /// The SCC node containing an instruction value.
    pub fn scc_of_value(&self, v: ValueId) -> Option<NodeId> {
        self.scc_of.get(&v).copied().filter(|&n| self.graph.is_live(n))
    }

    pub fn scc(&self, n: NodeId) -> &Scc {
        self.graph.payload(n)
    }

    /// Internal SCC nodes, in construction (reverse topological) order.
    pub fn iterate_over_sccs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.internal_nodes()
    }

    pub fn num_sccs(&self) -> usize {
        self.graph.num_internal_nodes()
    }

    /// Whether the internal SCCDAG is a simple chain: walk backwards from an
    /// arbitrary SCC to the unique source, then forward counting, requiring
    /// single predecessors and successors throughout.
    pub fn is_pipeline(&self) -> bool {
        let internal: Vec<NodeId> = self.graph.internal_nodes().collect();
        let first = match internal.first() {
            Some(&n) => n,
            None => return false,
        };
        let internal_preds = |n: NodeId| -> Vec<NodeId> {
            self.graph
                .predecessors(n)
                .into_iter()
                .filter(|&p| self.graph.is_internal(p) && p != n)
                .collect()
        };
        let internal_succs = |n: NodeId| -> Vec<NodeId> {
            self.graph
                .successors(n)
                .into_iter()
                .filter(|&s| self.graph.is_internal(s) && s != n)
                .collect()
        };

        let mut source = first;
        loop {
            let preds = internal_preds(source);
            match preds.len() {
                0 => break,
                1 => source = preds[0],
                _ => return false,
            }
        }
        let mut count = 1;
        let mut cursor = source;
        loop {
            let succs = internal_succs(cursor);
            match succs.len() {
                0 => break,
                1 => {
                    if internal_preds(succs[0]).len() > 1 {
                        return false;
                    }
                    cursor = succs[0];
                    count += 1;
                }
                _ => return false,
            }
        }
        count == internal.len()
    }

    /// Detach one SCC into its own single-node SCCDAG, removing it from this
    /// graph. Neighboring SCCs appear as external mirrors in the result.
    pub fn extract_scc_into_graph(&mut self, n: NodeId) -> Result<SccDag, GraphError> {
        if !self.graph.is_live(n) || !self.graph.is_internal(n) {
            return Err(GraphError::new(
                GraphErrorKind::UnknownNode,
                format!("cannot extract SCC node {}", n),
            ));
        }
        let mut target: DepGraph<Scc> = DepGraph::new();
        let members: Vec<ValueId> = self.graph.payload(n).internal_values().collect();
        self.graph.extract_nodes_into(&[n], n, true, &mut target)?;
        for v in &members {
            self.scc_of.remove(v);
        }
        let root = target.root().ok_or_else(|| {
            GraphError::new(GraphErrorKind::UnknownNode, "extracted SCCDAG has no root")
        })?;
        let scc_of = members.into_iter().map(|v| (v, root)).collect();
        Ok(SccDag { graph: target, scc_of })
    }

    /// Inverse of `extract_scc_into_graph`: reattach the extracted SCC and
    /// its boundary edges. Mirror nodes in `extracted` are matched back to
    /// the surviving SCCs by member value.
    pub fn reinsert_scc_from(&mut self, extracted: &SccDag) -> Result<NodeId, GraphError> {
        let root = extracted.graph.root().ok_or_else(|| {
            GraphError::new(GraphErrorKind::UnknownNode, "extracted SCCDAG has no root")
        })?;
        let scc = extracted.graph.payload(root).clone();
        let node = self.graph.add_node(scc, true);
        for v in self.graph.payload(node).internal_values().collect::<Vec<_>>() {
            self.scc_of.insert(v, node);
        }

        // Resolve every mirror endpoint before mutating the edge arena.
        let mut pending: Vec<(NodeId, NodeId, EdgeId)> = Vec::new();
        for e in extracted.graph.edges() {
            let (from, to) = (extracted.graph.edge_from(e), extracted.graph.edge_to(e));
            let (new_from, new_to) = if from == root {
                (node, self.resolve_mirror(extracted, to)?)
            } else {
                (self.resolve_mirror(extracted, from)?, node)
            };
            pending.push((new_from, new_to, e));
        }
        for (new_from, new_to, e) in pending {
            let edge = self.graph.add_edge(new_from, new_to, *extracted.graph.edge_kind(e));
            for &sub in extracted.graph.sub_edges(e) {
                self.graph.add_sub_edge(edge, sub);
            }
        }
        Ok(node)
    }

    /// Find the SCC in this graph holding the mirror node's value.
    fn resolve_mirror(&self, extracted: &SccDag, mirror: NodeId) -> Result<NodeId, GraphError> {
        let member = extracted
            .graph
            .payload(mirror)
            .internal_values()
            .next()
            .ok_or_else(|| {
                GraphError::new(GraphErrorKind::UnknownNode, "empty mirror SCC")
            })?;
        self.scc_of_value(member)
            .or_else(|| {
                // External singleton SCCs are not in scc_of.
                self.graph.nodes().find(|&n| self.graph.payload(n).is_internal(member))
            })
            .ok_or_else(|| {
                GraphError::new(
                    GraphErrorKind::UnknownNode,
                    format!("no surviving SCC contains {}", member),
                )
            })
    }
}

/// Iterative Tarjan over the restriction of `g` to `nodes`. Components are
/// emitted in completion order, which is the reverse topological order of the
/// condensation; members come out sorted ascending.
fn tarjan_sccs(g: &DepGraph<ValueId>, nodes: &[NodeId]) -> Vec<Vec<NodeId>> {
    let set: BTreeSet<NodeId> = nodes.iter().copied().collect();
    let mut index: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut lowlink: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut on_stack: BTreeSet<NodeId> = BTreeSet::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<NodeId>> = Vec::new();

    let succs_in_set = |n: NodeId| -> Vec<NodeId> {
        g.successors(n).into_iter().filter(|s| set.contains(s)).collect()
    };

    for &start in nodes {
        if index.contains_key(&start) {
            continue;
        }
        let mut call: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();
        index.insert(start, next_index);
        lowlink.insert(start, next_index);
        next_index += 1;
        stack.push(start);
        on_stack.insert(start);
        call.push((start, succs_in_set(start), 0));

        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if frame.2 < frame.1.len() {
                let w = frame.1[frame.2];
                frame.2 += 1;
                if !index.contains_key(&w) {
                    index.insert(w, next_index);
                    lowlink.insert(w, next_index);
                    next_index += 1;
                    stack.push(w);
                    on_stack.insert(w);
                    call.push((w, succs_in_set(w), 0));
                } else if on_stack.contains(&w) {
                    let low = lowlink[&v].min(index[&w]);
                    lowlink.insert(v, low);
                }
            } else {
                if lowlink[&v] == index[&v] {
                    let mut component = Vec::new();
                    loop {
                        let w = stack.pop().unwrap_or(v);
                        on_stack.remove(&w);
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    component.sort();
                    components.push(component);
                }
                call.pop();
                if let Some(parent) = call.last() {
                    let low = lowlink[&parent.0].min(lowlink[&v]);
                    lowlink.insert(parent.0, low);
                }
            }
        }
    }
    components
}
