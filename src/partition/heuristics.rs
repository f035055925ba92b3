//! DSWP partition adjustment.
//!
//! Starting from the singleton partition, the driver alternates the
//! smallest-size and min-max merge analyses until a full pass makes no merge
//! or the partition fits the thread budget.

use log::{debug, info};

use crate::analysis::attrs::SccDagAttrs;
use crate::analysis::sccdag::SccDag;
use crate::partition::cost::{
    InvocationLatency, MergeSelection, MinMaxSizePartitionAnalysis, PartitionCostAnalysis,
    SmallestSizePartitionAnalysis,
};
use crate::partition::partition::SccDagPartition;

pub struct Heuristics {
    ideal_threads: usize,
}

impl Heuristics {
    pub fn new(ideal_threads: usize) -> Self {
        Self { ideal_threads: ideal_threads.max(1) }
    }

    /// Merge subsets until the partition fits `ideal_threads` or no analysis
    /// finds a legal merge. Termination: every pass either merges (strictly
    /// shrinking the subset count) or ends the loop.
    pub fn adjust_parallelization_partition_for_dswp(
        &self,
        partition: &mut SccDagPartition,
        sccdag: &SccDag,
        attrs: &SccDagAttrs,
        latency: &mut InvocationLatency,
    ) {
        let smallest = SmallestSizePartitionAnalysis;
        let min_max = MinMaxSizePartitionAnalysis;
        let before = partition.num_subsets();

        loop {
            let mut base = PartitionCostAnalysis {
                sccdag,
                attrs,
                latency,
                ideal_threads: self.ideal_threads,
            };
            let merged_smallest = smallest.attempt_merge(&mut base, partition);
            let merged_min_max = min_max.attempt_merge(&mut base, partition);
            if !merged_smallest && !merged_min_max {
                break;
            }
        }
        if before != partition.num_subsets() {
            info!(
                "DSWP partition adjusted from {} to {} subsets (ideal threads {})",
                before,
                partition.num_subsets(),
                self.ideal_threads
            );
        } else {
            debug!("DSWP partition left at {} subsets", before);
        }
    }
}
