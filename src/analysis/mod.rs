//! The analysis pipeline: PDG, loop and dominance summaries, SCC
//! condensation, and SCC classification.

pub mod attrs;
pub mod ivbounds;
pub mod loops;
pub mod pdg;
pub mod sccdag;
pub mod scev;

pub use attrs::{DistributedCloneView, SccAttrs, SccDagAttrs, SccKind, SccType};
pub use ivbounds::FixedIvBounds;
pub use loops::{DominatorSummary, LoopId, LoopInfo, LoopsSummary};
pub use pdg::Pdg;
pub use sccdag::{Scc, SccDag};
pub use scev::{AccumulatorOpInfo, ReductionOp, ScalarEvolution, Scev};
