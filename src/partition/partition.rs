//! Partitioning of an SCCDAG into merge-sets.
//!
//! A partition is an equivalence relation over the internal SCCDAG nodes.
//! Subsets can only merge when the resulting subset-level graph stays
//! acyclic; an illegal merge is rejected without mutating the partition.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::analysis::sccdag::SccDag;
use crate::graph::NodeId;
use crate::utils::errors::{PartitionError, PartitionErrorKind};

/// A unique identifier for a subset within one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubsetId(pub u32);

impl std::fmt::Display for SubsetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subset{}", self.0)
    }
}

/// A partition of the internal SCCs of one SCCDAG.
pub struct SccDagPartition {
    /// Subset arena; merged-away subsets are tombstoned
    subsets: Vec<Option<BTreeSet<NodeId>>>,
    subset_of: BTreeMap<NodeId, SubsetId>,
    /// Internal SCC-level successors, snapshotted at construction
    scc_succs: BTreeMap<NodeId, Vec<NodeId>>,
}

impl SccDagPartition {
    /// The initial partition: one subset per internal SCC.
    pub fn new(sccdag: &SccDag) -> Self {
        let mut subsets = Vec::new();
        let mut subset_of = BTreeMap::new();
        let mut scc_succs = BTreeMap::new();
        for node in sccdag.iterate_over_sccs() {
            let id = SubsetId(subsets.len() as u32);
            subsets.push(Some(BTreeSet::from([node])));
            subset_of.insert(node, id);
            let succs: Vec<NodeId> = sccdag
                .graph()
                .successors(node)
                .into_iter()
                .filter(|&s| sccdag.graph().is_internal(s) && s != node)
                .collect();
            scc_succs.insert(node, succs);
        }
        Self { subsets, subset_of, scc_succs }
    }

    /// Live subset ids, ascending.
    pub fn subset_ids(&self) -> Vec<SubsetId> {
        (0..self.subsets.len() as u32)
            .map(SubsetId)
            .filter(|&s| self.subsets[s.0 as usize].is_some())
            .collect()
    }

    pub fn num_subsets(&self) -> usize {
        self.subsets.iter().filter(|s| s.is_some()).count()
    }

    pub fn subset(&self, s: SubsetId) -> Result<&BTreeSet<NodeId>, PartitionError> {
        self.subsets
            .get(s.0 as usize)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| {
                PartitionError::new(
                    PartitionErrorKind::UnknownSubset,
                    format!("{} does not name a live subset", s),
                )
            })
    }

    /// Subset holding an SCC.
    pub fn subset_of(&self, node: NodeId) -> Option<SubsetId> {
        self.subset_of.get(&node).copied()
    }

    /// Distinct subsets directly fed by this subset.
    pub fn subset_successors(&self, s: SubsetId) -> Result<BTreeSet<SubsetId>, PartitionError> {
        let members = self.subset(s)?;
        let mut out = BTreeSet::new();
        for member in members {
            for succ in self.scc_succs.get(member).into_iter().flatten() {
                if let Some(t) = self.subset_of(*succ) {
                    if t != s {
                        out.insert(t);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Whether merging `a` and `b` keeps the subset graph acyclic.
    pub fn can_merge(&self, a: SubsetId, b: SubsetId) -> bool {
        if a == b
            || self.subsets.get(a.0 as usize).map(|s| s.is_none()).unwrap_or(true)
            || self.subsets.get(b.0 as usize).map(|s| s.is_none()).unwrap_or(true)
        {
            return false;
        }
        self.merged_graph_is_acyclic(a, b)
    }

    /// Merge two subsets into a fresh one. Rejected when the merge would
    /// introduce a cycle in the subset-level DAG.
    pub fn merge_subsets(&mut self, a: SubsetId, b: SubsetId) -> Result<SubsetId, PartitionError> {
        if a == b {
            return Err(PartitionError::new(
                PartitionErrorKind::IllegalMerge,
                format!("cannot merge {} with itself", a),
            ));
        }
        // Validate both before any mutation.
        self.subset(a)?;
        self.subset(b)?;
        if !self.merged_graph_is_acyclic(a, b) {
            return Err(PartitionError::new(
                PartitionErrorKind::IllegalMerge,
                format!("merging {} and {} would create a cycle", a, b),
            ));
        }

        let mut merged = self.subsets[a.0 as usize].take().unwrap_or_default();
        merged.extend(self.subsets[b.0 as usize].take().unwrap_or_default());
        let id = SubsetId(self.subsets.len() as u32);
        for node in &merged {
            self.subset_of.insert(*node, id);
        }
        trace!("merged {} and {} into {} ({} SCCs)", a, b, id, merged.len());
        self.subsets.push(Some(merged));
        Ok(id)
    }

    /// Longest subset-path from a root to `s`.
    pub fn depth(&self, s: SubsetId) -> Result<usize, PartitionError> {
        self.subset(s)?;
        let order = self.subsets_in_topological_order()?;
        let mut depth: BTreeMap<SubsetId, usize> = BTreeMap::new();
        for &t in &order {
            let d = depth.get(&t).copied().unwrap_or(0);
            for succ in self.subset_successors(t)? {
                let entry = depth.entry(succ).or_insert(0);
                *entry = (*entry).max(d + 1);
            }
        }
        Ok(depth.get(&s).copied().unwrap_or(0))
    }

    pub fn max_depth(&self) -> Result<usize, PartitionError> {
        let mut max = 0;
        for s in self.subset_ids() {
            max = max.max(self.depth(s)?);
        }
        Ok(max)
    }

    /// Kahn's algorithm over the subset graph. Ties break on ascending id.
    pub fn subsets_in_topological_order(&self) -> Result<Vec<SubsetId>, PartitionError> {
        let ids = self.subset_ids();
        let mut in_degree: BTreeMap<SubsetId, usize> = ids.iter().map(|&s| (s, 0)).collect();
        for &s in &ids {
            for succ in self.subset_successors(s)? {
                *in_degree.entry(succ).or_insert(0) += 1;
            }
        }
        let mut ready: BTreeSet<SubsetId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&s, _)| s)
            .collect();
        let mut order = Vec::with_capacity(ids.len());
        while let Some(&s) = ready.iter().next() {
            ready.remove(&s);
            order.push(s);
            for succ in self.subset_successors(s)? {
                if let Some(d) = in_degree.get_mut(&succ) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(succ);
                    }
                }
            }
        }
        if order.len() != ids.len() {
            return Err(PartitionError::new(
                PartitionErrorKind::IllegalMerge,
                "subset graph contains a cycle".to_string(),
            ));
        }
        Ok(order)
    }

    /// Cycle check on the subset graph where `a` and `b` are treated as one.
    fn merged_graph_is_acyclic(&self, a: SubsetId, b: SubsetId) -> bool {
        let canon = |s: SubsetId| if s == b { a } else { s };
        let mut edges: BTreeMap<SubsetId, BTreeSet<SubsetId>> = BTreeMap::new();
        for s in self.subset_ids() {
            let from = canon(s);
            let succs = match self.subset_successors(s) {
                Ok(succs) => succs,
                Err(_) => return false,
            };
            for succ in succs {
                let to = canon(succ);
                if from != to {
                    edges.entry(from).or_default().insert(to);
                }
            }
        }

        // Kahn over the merged view.
        let nodes: BTreeSet<SubsetId> =
            self.subset_ids().into_iter().map(canon).collect();
        let mut in_degree: BTreeMap<SubsetId, usize> = nodes.iter().map(|&s| (s, 0)).collect();
        for (_, succs) in &edges {
            for succ in succs {
                *in_degree.entry(*succ).or_insert(0) += 1;
            }
        }
        let mut ready: Vec<SubsetId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&s, _)| s)
            .collect();
        let mut seen = 0;
        while let Some(s) = ready.pop() {
            seen += 1;
            for succ in edges.get(&s).cloned().unwrap_or_default() {
                if let Some(d) = in_degree.get_mut(&succ) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(succ);
                    }
                }
            }
        }
        seen == nodes.len()
    }
}
