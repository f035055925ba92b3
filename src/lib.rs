//! # AutoPar - Loop Dependence Analysis for Auto-Parallelization
//!
//! The dependence-analysis core of an auto-parallelization middleware:
//! - a generic directed-graph substrate for dependence graphs
//! - program dependence graphs (PDG) over a minimal IR value model
//! - SCC condensation (SCCDAG) via Tarjan
//! - SCC classification: independent, reducible, sequential; induction
//!   variables, reductions, fixed IV bounds, clonability
//! - DSWP-style SCCDAG partitioning under an ideal-thread budget
//!
//! ## Architecture
//!
//! ```text
//! Function → PDG → SCCDAG → SCCDAGAttrs → SCCDAGPartition
//!               (loops / dominators / scalar evolution feed classification)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use autopar::prelude::*;
//!
//! let func: Function = serde_json::from_str(&source)?;
//! let report = autopar::analyze_function(&func, AnalysisConfig::default())?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! ```

#![warn(clippy::all)]

pub mod analysis;
pub mod graph;
pub mod ir;
pub mod partition;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::analysis::{
        DominatorSummary, FixedIvBounds, LoopsSummary, Pdg, ReductionOp, ScalarEvolution, Scc,
        SccAttrs, SccDag, SccDagAttrs, SccKind, SccType,
    };
    pub use crate::graph::{DepGraph, DepKind, EdgeId, MemDep, NodeId};
    pub use crate::ir::{
        BasicBlock, BlockId, Function, FunctionBuilder, Instruction, Opcode, Predicate,
        ScalarType, Value, ValueId,
    };
    pub use crate::partition::{Heuristics, InvocationLatency, SccDagPartition, SubsetId};
    pub use crate::utils::errors::*;
    pub use crate::{analyze_function, AnalysisConfig, FunctionReport, LoopReport, SccReport};
}

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::analysis::{
    DominatorSummary, LoopsSummary, Pdg, ScalarEvolution, SccDag, SccDagAttrs, SccKind,
};
use crate::ir::Function;
use crate::partition::{Heuristics, InvocationLatency, SccDagPartition};
use crate::utils::task_id::TaskIdAllocator;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Upper bound on the desired partition cardinality per loop
    pub ideal_threads: usize,
    /// Run the DSWP partition heuristics after classification
    pub partition: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { ideal_threads: 4, partition: true }
    }
}

/// Per-SCC entry of a loop report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SccReport {
    /// Member instructions, in program order
    pub members: Vec<String>,
    pub scc_type: String,
    pub kind: String,
    pub clonable: bool,
}

/// Analysis result for one loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopReport {
    /// Header block of the loop
    pub header: String,
    pub depth: usize,
    pub num_sccs: usize,
    pub is_pipeline: bool,
    pub governed_by_iv: bool,
    pub sccs: Vec<SccReport>,
    /// Final partition: task name and member instructions, in topological
    /// subset order
    pub tasks: Vec<(String, Vec<String>)>,
}

/// Analysis result for one function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionReport {
    pub function: String,
    pub loops: Vec<LoopReport>,
}

/// Run the whole pipeline over every loop of a function.
pub fn analyze_function(func: &Function, config: AnalysisConfig) -> Result<FunctionReport> {
    info!("analyzing function '{}'", func.name);
    let doms = DominatorSummary::compute(func);
    let loops = LoopsSummary::compute(func, &doms);
    debug!("found {} loops", loops.num_loops());

    let pdg = Pdg::from_function(func);
    let mut se = ScalarEvolution::new();
    let mut tasks = TaskIdAllocator::new();

    let mut reports = Vec::new();
    for l in loops.loop_ids() {
        let info = loops.loop_info(l);
        let body: Vec<crate::ir::ValueId> = func
            .instruction_ids()
            .into_iter()
            .filter(|&v| {
                // Instructions of the loop, sub-loops included.
                let mut cur = loops.loop_of_instr(func, v);
                while let Some(c) = cur {
                    if c == l {
                        return true;
                    }
                    cur = loops.loop_info(c).parent;
                }
                false
            })
            .collect();
        let mut loop_pdg = pdg.create_subgraph(&body);

        let sccdag = SccDag::from_pdg(&loop_pdg);
        let attrs = SccDagAttrs::populate(&sccdag, &mut loop_pdg, func, &loops, &doms, &mut se)
            .with_context(|| format!("classification failed for loop at {}", info.header))?;

        let mut partition = SccDagPartition::new(&sccdag);
        let mut latency = InvocationLatency::new();
        if config.partition {
            Heuristics::new(config.ideal_threads).adjust_parallelization_partition_for_dswp(
                &mut partition,
                &sccdag,
                &attrs,
                &mut latency,
            );
        }

        reports.push(build_loop_report(
            func, &loops, l, &sccdag, &attrs, &partition, &mut tasks,
        )?);
    }

    Ok(FunctionReport { function: func.name.clone(), loops: reports })
}

fn build_loop_report(
    func: &Function,
    loops: &LoopsSummary,
    l: crate::analysis::LoopId,
    sccdag: &SccDag,
    attrs: &SccDagAttrs,
    partition: &SccDagPartition,
    tasks: &mut TaskIdAllocator,
) -> Result<LoopReport> {
    let info = loops.loop_info(l);
    let mut sccs = Vec::new();
    for node in sccdag.iterate_over_sccs() {
        let record = attrs.attrs_of(node)?;
        let kind = match record.kind() {
            SccKind::Plain => "none".to_string(),
            SccKind::InductionVariable { bounds } => match bounds {
                Some(b) => format!(
                    "induction variable (step {:+}, end {} {:+})",
                    b.step,
                    func.describe(b.cmp_iv_to),
                    b.end_offset
                ),
                None => "induction variable".to_string(),
            },
            SccKind::Reduction { phi, reduction_op } => {
                format!("reduction ({} over {})", reduction_op, func.describe(*phi))
            }
        };
        sccs.push(SccReport {
            members: sccdag
                .scc(node)
                .internal_values()
                .map(|v| func.describe(v))
                .collect(),
            scc_type: format!("{}", record.scc_type()),
            kind,
            clonable: record.is_clonable(),
        });
    }

    let mut task_list = Vec::new();
    for subset in partition.subsets_in_topological_order()? {
        let members = partition.subset(subset)?;
        let mut names = Vec::new();
        for &node in members {
            names.extend(sccdag.scc(node).internal_values().map(|v| func.describe(v)));
        }
        task_list.push((format!("{}", tasks.next()), names));
    }

    Ok(LoopReport {
        header: format!("{}", info.header),
        depth: info.depth,
        num_sccs: sccdag.num_sccs(),
        is_pipeline: sccdag.is_pipeline(),
        governed_by_iv: attrs.is_loop_governed_by_iv(sccdag),
        sccs,
        tasks: task_list,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, FunctionBuilder, Predicate, ScalarType};

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_analyze_simple_counter() {
        let mut f = FunctionBuilder::new("count");
        let n = f.argument("n", ScalarType::Int);
        let zero = f.const_int(0);
        let one = f.const_int(1);
        let entry = f.block("entry");
        let header = BlockId(1);
        let exit = BlockId(2);
        f.br(header);
        f.block("header");
        let i = f.phi("i", vec![(zero, entry)], ScalarType::Int);
        let i_next = f.add("i.next", i, one, ScalarType::Int);
        let c = f.cmp("c", Predicate::Slt, i, n);
        f.cond_br(c, header, exit);
        f.set_phi_incoming(i, vec![(zero, entry), (i_next, header)]);
        f.block("exit");
        f.ret();
        let func = f.build();

        let report = analyze_function(&func, AnalysisConfig::default()).unwrap();
        assert_eq!(report.function, "count");
        assert_eq!(report.loops.len(), 1);
        let lr = &report.loops[0];
        assert!(lr.governed_by_iv);
        assert_eq!(lr.num_sccs, 1);
        assert!(lr.sccs[0].kind.starts_with("induction variable"));
    }
}
