//! Program Dependence Graph.
//!
//! The PDG is the `DepGraph` specialization whose payloads are IR values:
//! internal nodes are the instructions of one function (each exactly once);
//! external nodes are operands defined outside it (arguments, globals,
//! constants). Edges record data dependences (register def-use or memory)
//! and control dependences.
//!
//! Full PDG construction is the job of an external analysis with an alias
//! oracle. `from_function` builds the two edge families that are derivable
//! without one — register def-use and direct-successor control dependences —
//! and callers inject memory edges through `add_memory_edge`.

use std::collections::BTreeMap;

use log::trace;

use crate::graph::{DepGraph, DepKind, EdgeId, MemDep, NodeId};
use crate::ir::{Function, ValueId};

/// Program dependence graph over the values of one function.
#[derive(Debug, Clone)]
pub struct Pdg {
    graph: DepGraph<ValueId>,
    node_of: BTreeMap<ValueId, NodeId>,
}

impl Pdg {
    pub fn new() -> Self {
        Self { graph: DepGraph::new(), node_of: BTreeMap::new() }
    }

    /// Build the PDG of a function: one internal node per instruction (in
    /// block layout order), external nodes for outside operands, register
    /// def-use edges, and control edges from each conditional branch to the
    /// instructions of its successor blocks.
    pub fn from_function(func: &Function) -> Self {
        let mut pdg = Self::new();

        for v in func.instruction_ids() {
            pdg.fetch_or_add_node(v, true);
        }

        for v in func.instruction_ids() {
            let inst = func.instr(v).expect("instruction id");
            for &op in &inst.operands {
                let internal = func.is_instruction(op);
                pdg.fetch_or_add_node(op, internal);
                pdg.add_register_edge(op, v);
            }
            if inst.branch_condition().is_some() {
                for &succ in inst.successors() {
                    for &sink in &func.block(succ).instrs {
                        pdg.add_control_edge(v, sink);
                    }
                }
            }
        }

        pdg
    }

    /// Node of `value`, creating it if absent.
    pub fn fetch_or_add_node(&mut self, value: ValueId, internal: bool) -> NodeId {
        if let Some(&n) = self.node_of.get(&value) {
            return n;
        }
        let n = self.graph.add_node(value, internal);
        self.node_of.insert(value, n);
        n
    }

    /// Node of `value`, if the value appears in this PDG.
    pub fn node_of(&self, value: ValueId) -> Option<NodeId> {
        self.node_of.get(&value).copied().filter(|&n| self.graph.is_live(n))
    }

    /// Register def-use dependence from the definition to the user.
    /// Duplicate (from, to) pairs collapse by merging kind flags.
    pub fn add_register_edge(&mut self, from: ValueId, to: ValueId) -> EdgeId {
        let (f, t) = (self.fetch_or_add_node(from, false), self.fetch_or_add_node(to, false));
        self.graph.add_or_merge_edge(f, t, DepKind::register_data())
    }

    /// Control dependence from a branch terminator to a dependent instruction.
    pub fn add_control_edge(&mut self, from: ValueId, to: ValueId) -> EdgeId {
        let (f, t) = (self.fetch_or_add_node(from, false), self.fetch_or_add_node(to, false));
        self.graph.add_or_merge_edge(f, t, DepKind::control())
    }

    /// Memory dependence injected by the caller's alias oracle.
    pub fn add_memory_edge(&mut self, from: ValueId, to: ValueId, class: MemDep, must: bool) -> EdgeId {
        trace!("memory edge {} -> {} ({})", from, to, class.short_name());
        let (f, t) = (self.fetch_or_add_node(from, false), self.fetch_or_add_node(to, false));
        self.graph.add_or_merge_edge(f, t, DepKind::memory(class, must))
    }

    /// The underlying graph.
    pub fn graph(&self) -> &DepGraph<ValueId> {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut DepGraph<ValueId> {
        &mut self.graph
    }

    /// Value carried by a node.
    pub fn value_of(&self, n: NodeId) -> ValueId {
        *self.graph.payload(n)
    }

    /// Weakly-connected components over internal nodes.
    pub fn collect_connected_components(&self) -> Vec<Vec<NodeId>> {
        self.graph.connected_components()
    }

    /// A new PDG whose internal nodes are exactly `values` (view copy; this
    /// PDG is left untouched). Edges with one endpoint outside the set are
    /// rewritten against external mirror nodes.
    pub fn create_subgraph(&self, values: &[ValueId]) -> Self {
        let nodes: Vec<NodeId> = values.iter().filter_map(|&v| self.node_of(v)).collect();
        let mut target = DepGraph::new();
        if let Some(&pivot) = nodes.first() {
            // Clone: extraction without removal only reads self.
            let mut source = self.graph.clone();
            source
                .extract_nodes_into(&nodes, pivot, false, &mut target)
                .expect("subgraph nodes are live");
        }
        let mut node_of = BTreeMap::new();
        for n in target.nodes() {
            node_of.entry(*target.payload(n)).or_insert(n);
        }
        Self { graph: target, node_of }
    }

    /// The per-function subgraph: exactly the instructions of `func` as
    /// internal nodes. Ownership of the returned PDG is the caller's.
    pub fn create_function_subgraph(&self, func: &Function) -> Self {
        self.create_subgraph(&func.instruction_ids())
    }
}
