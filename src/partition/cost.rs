//! Cost model and merge-selection analyses for the DSWP heuristics.
//!
//! `InvocationLatency` estimates the per-iteration cost of an SCC; the two
//! `PartitionCostAnalysis` visitors rank adjacent subset pairs and request
//! the best legal merge.

use std::collections::BTreeMap;

use log::trace;

use crate::analysis::attrs::SccDagAttrs;
use crate::analysis::sccdag::SccDag;
use crate::graph::NodeId;
use crate::partition::partition::{SccDagPartition, SubsetId};

/// Memoized per-SCC cost model.
///
/// The estimate is the SCC's instruction count; clonable SCCs cost nothing,
/// since they are duplicated into their consumers rather than scheduled as a
/// pipeline stage.
pub struct InvocationLatency {
    cache: BTreeMap<NodeId, u64>,
}

impl InvocationLatency {
    pub fn new() -> Self {
        Self { cache: BTreeMap::new() }
    }

    pub fn latency_of(&mut self, sccdag: &SccDag, attrs: &SccDagAttrs, node: NodeId) -> u64 {
        if let Some(&latency) = self.cache.get(&node) {
            return latency;
        }
        let clonable = attrs.attrs_of(node).map(|a| a.is_clonable()).unwrap_or(false);
        let latency = if clonable {
            0
        } else {
            sccdag.scc(node).number_of_instructions() as u64
        };
        self.cache.insert(node, latency);
        latency
    }

    /// Per-iteration cost of a subset: the sum over its SCCs.
    pub fn latency_of_subset(
        &mut self,
        sccdag: &SccDag,
        attrs: &SccDagAttrs,
        partition: &SccDagPartition,
        subset: SubsetId,
    ) -> u64 {
        let members = match partition.subset(subset) {
            Ok(members) => members.clone(),
            Err(_) => return 0,
        };
        members
            .iter()
            .map(|&n| self.latency_of(sccdag, attrs, n))
            .sum()
    }
}

impl Default for InvocationLatency {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state of one analysis step.
pub struct PartitionCostAnalysis<'a> {
    pub sccdag: &'a SccDag,
    pub attrs: &'a SccDagAttrs,
    pub latency: &'a mut InvocationLatency,
    pub ideal_threads: usize,
}

/// A visitor that ranks adjacent subset pairs and requests one merge.
///
/// Candidates are scored (lower is better); ties break on the pair's
/// topological subset positions, so equal-cost merges walk the pipeline
/// front to back. Candidates are tried in order until the partition accepts
/// one; a candidate whose merge would create a cycle is skipped.
pub trait MergeSelection {
    fn name(&self) -> &'static str;

    /// Rank the merge of `a` and `b`. Lexicographically lower wins.
    fn score(
        &self,
        base: &mut PartitionCostAnalysis<'_>,
        partition: &SccDagPartition,
        a: SubsetId,
        b: SubsetId,
    ) -> (u64, u64);

    /// Perform the best legal merge, if the partition still has more subsets
    /// than the ideal thread count. Reports whether a merge happened.
    fn attempt_merge(
        &self,
        base: &mut PartitionCostAnalysis<'_>,
        partition: &mut SccDagPartition,
    ) -> bool {
        if partition.num_subsets() <= base.ideal_threads {
            return false;
        }

        let order = match partition.subsets_in_topological_order() {
            Ok(order) => order,
            Err(_) => return false,
        };
        let position =
            |s: SubsetId| order.iter().position(|&x| x == s).unwrap_or(usize::MAX);

        let mut candidates: Vec<((u64, u64), usize, usize, SubsetId, SubsetId)> = Vec::new();
        for a in partition.subset_ids() {
            let succs = match partition.subset_successors(a) {
                Ok(succs) => succs,
                Err(_) => continue,
            };
            for b in succs {
                candidates.push((self.score(base, partition, a, b), position(a), position(b), a, b));
            }
        }
        candidates.sort();

        for (score, _, _, a, b) in candidates {
            if partition.merge_subsets(a, b).is_ok() {
                trace!(
                    "{}: merged {} and {} (score {:?})",
                    self.name(),
                    a,
                    b,
                    score
                );
                return true;
            }
        }
        false
    }
}

/// Greedily merge the adjacent pair with the smallest combined cost.
pub struct SmallestSizePartitionAnalysis;

impl MergeSelection for SmallestSizePartitionAnalysis {
    fn name(&self) -> &'static str {
        "smallest-size"
    }

    fn score(
        &self,
        base: &mut PartitionCostAnalysis<'_>,
        partition: &SccDagPartition,
        a: SubsetId,
        b: SubsetId,
    ) -> (u64, u64) {
        let combined = base
            .latency
            .latency_of_subset(base.sccdag, base.attrs, partition, a)
            + base
                .latency
                .latency_of_subset(base.sccdag, base.attrs, partition, b);
        (combined, 0)
    }
}

/// Merge the adjacent pair that minimizes the spread between the largest and
/// smallest subset after the merge; ties break on the combined cost.
pub struct MinMaxSizePartitionAnalysis;

impl MergeSelection for MinMaxSizePartitionAnalysis {
    fn name(&self) -> &'static str {
        "min-max-size"
    }

    fn score(
        &self,
        base: &mut PartitionCostAnalysis<'_>,
        partition: &SccDagPartition,
        a: SubsetId,
        b: SubsetId,
    ) -> (u64, u64) {
        let cost_a = base
            .latency
            .latency_of_subset(base.sccdag, base.attrs, partition, a);
        let cost_b = base
            .latency
            .latency_of_subset(base.sccdag, base.attrs, partition, b);
        let combined = cost_a + cost_b;

        let mut max = combined;
        let mut min = u64::MAX;
        for s in partition.subset_ids() {
            if s == a || s == b {
                continue;
            }
            let cost = base
                .latency
                .latency_of_subset(base.sccdag, base.attrs, partition, s);
            max = max.max(cost);
            min = min.min(cost);
        }
        let min = min.min(combined);
        (max - min, combined)
    }
}
