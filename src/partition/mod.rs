//! SCCDAG partitioning and DSWP merge heuristics.

pub mod cost;
pub mod heuristics;
pub mod partition;

pub use cost::{
    InvocationLatency, MergeSelection, MinMaxSizePartitionAnalysis, PartitionCostAnalysis,
    SmallestSizePartitionAnalysis,
};
pub use heuristics::Heuristics;
pub use partition::{SccDagPartition, SubsetId};
