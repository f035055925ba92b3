//! Generic directed-graph substrate for dependence graphs.

pub mod dg;

pub use dg::{DepGraph, DepKind, EdgeId, MemDep, NodeId};
