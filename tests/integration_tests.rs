//! Integration tests for the dependence-analysis pipeline.

use std::collections::BTreeSet;

use autopar::analysis::{
    DominatorSummary, LoopsSummary, Pdg, ReductionOp, ScalarEvolution, SccDag, SccDagAttrs,
    SccKind, SccType,
};
use autopar::partition::{Heuristics, InvocationLatency, SccDagPartition};
use autopar::prelude::*;

/// Straight-line chain of three calls: a -> b -> c.
fn straight_line() -> Function {
    let mut f = FunctionBuilder::new("chain");
    f.block("entry");
    let a = f.instr("a", Opcode::Call, vec![], ScalarType::Int);
    let b = f.instr("b", Opcode::Call, vec![a], ScalarType::Int);
    f.instr("c", Opcode::Call, vec![b], ScalarType::Int);
    f.build()
}

/// while (i < n) i++;  with the comparison reading the PHI.
fn simple_counter() -> Function {
    let mut f = FunctionBuilder::new("counter");
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
    f.build()
}

/// for (i = 0; i < n; i++) s += x[i];
fn sum_reduction() -> Function {
    let mut f = FunctionBuilder::new("sum");
    let n = f.argument("n", ScalarType::Int);
    let x = f.argument("x", ScalarType::Int);
    let zero = f.const_int(0);
    let one = f.const_int(1);

    let entry = f.block("entry");
    let header = BlockId(1);
    let exit = BlockId(2);
    f.br(header);

    f.block("header");
    let i = f.phi("i", vec![(zero, entry)], ScalarType::Int);
    let s = f.phi("s", vec![(zero, entry)], ScalarType::Int);
    let addr = f.instr("addr", Opcode::GetElementPtr, vec![x, i], ScalarType::Int);
    let load = f.instr("x.i", Opcode::Load, vec![addr], ScalarType::Int);
    let s_next = f.add("s.next", s, load, ScalarType::Int);
    let i_next = f.add("i.next", i, one, ScalarType::Int);
    let c = f.cmp("c", Predicate::Slt, i_next, n);
    f.cond_br(c, header, exit);
    f.set_phi_incoming(i, vec![(zero, entry), (i_next, header)]);
    f.set_phi_incoming(s, vec![(zero, entry), (s_next, header)]);

    f.block("exit");
    f.ret();
    f.build()
}

/// Diamond of four calls: a -> b, a -> c, b -> d, c -> d.
fn diamond() -> Function {
    let mut f = FunctionBuilder::new("diamond");
    f.block("entry");
    let a = f.instr("a", Opcode::Call, vec![], ScalarType::Int);
    let b = f.instr("b", Opcode::Call, vec![a], ScalarType::Int);
    let c = f.instr("c", Opcode::Call, vec![a], ScalarType::Int);
    f.instr("d", Opcode::Call, vec![b, c], ScalarType::Int);
    f.build()
}

fn classify(func: &Function) -> (Pdg, SccDag, SccDagAttrs) {
    let doms = DominatorSummary::compute(func);
    let loops = LoopsSummary::compute(func, &doms);
    let mut se = ScalarEvolution::new();
    let mut pdg = Pdg::from_function(func);
    let sccdag = SccDag::from_pdg(&pdg);
    let attrs = SccDagAttrs::populate(&sccdag, &mut pdg, func, &loops, &doms, &mut se)
        .expect("classification failed");
    (pdg, sccdag, attrs)
}

// --- Scenario S1: trivial independent chain -------------------------------

#[test]
fn test_s1_trivial_independent_chain() {
    let func = straight_line();
    let (_pdg, sccdag, attrs) = classify(&func);

    assert_eq!(sccdag.num_sccs(), 3);
    for node in sccdag.iterate_over_sccs() {
        let record = attrs.attrs_of(node).expect("record");
        assert_eq!(record.scc_type(), SccType::Independent);
        assert_eq!(sccdag.scc(node).number_of_instructions(), 1);
    }
    assert!(sccdag.is_pipeline());
    assert!(!attrs.is_loop_governed_by_iv(&sccdag));
}

// --- Scenario S2: simple counter ------------------------------------------

#[test]
fn test_s2_simple_counter_iv_scc() {
    let func = simple_counter();
    let (_pdg, sccdag, attrs) = classify(&func);

    let i = func.block(BlockId(1)).instrs[0];
    let i_next = func.block(BlockId(1)).instrs[1];
    let c = func.block(BlockId(1)).instrs[2];
    let br = func.block(BlockId(1)).instrs[3];

    // One SCC holds the whole recurrence: phi, add, cmp, branch.
    let node = sccdag.scc_of_value(i).expect("IV SCC");
    for v in [i_next, c, br] {
        assert_eq!(sccdag.scc_of_value(v), Some(node));
    }

    let record = attrs.attrs_of(node).expect("record");
    assert_eq!(record.scc_type(), SccType::Sequential);
    assert!(record.is_induction_variable());

    let n = ValueId(0);
    let bounds = record.fixed_iv_bounds().expect("fixed IV bounds");
    assert_eq!(bounds.step, 1);
    assert_eq!(bounds.end_offset, 0);
    assert_eq!(bounds.cmp_iv_to, n);
    assert!(!bounds.is_cmp_on_accum);
    assert!(!bounds.exit_on_cmp);

    assert!(attrs.is_loop_governed_by_iv(&sccdag));
}

// --- Scenario S3: sum reduction -------------------------------------------

#[test]
fn test_s3_sum_reduction() {
    let func = sum_reduction();
    let (_pdg, sccdag, attrs) = classify(&func);

    let i = func.block(BlockId(1)).instrs[0];
    let s = func.block(BlockId(1)).instrs[1];
    let s_next = func.block(BlockId(1)).instrs[4];

    // The IV SCC is as in S2.
    let iv_node = sccdag.scc_of_value(i).expect("IV SCC");
    let iv = attrs.attrs_of(iv_node).expect("record");
    assert!(iv.is_induction_variable());

    // The reduction SCC {s, s.next} is reducible over integer add.
    let red_node = sccdag.scc_of_value(s).expect("reduction SCC");
    assert_eq!(sccdag.scc_of_value(s_next), Some(red_node));
    let red = attrs.attrs_of(red_node).expect("record");
    assert_eq!(red.scc_type(), SccType::Reducible);
    match red.kind() {
        SccKind::Reduction { phi, reduction_op } => {
            assert_eq!(*phi, s);
            assert_eq!(*reduction_op, ReductionOp::IntAdd);
        }
        other => panic!("expected a reduction record, got {:?}", other),
    }

    assert!(attrs.are_all_live_out_values_reducible(&sccdag, &[s]));
    assert!(attrs.is_loop_governed_by_iv(&sccdag));
}

// --- Scenario S4: pipeline DSWP partitioning ------------------------------

#[test]
fn test_s4_dswp_partitioning() {
    let func = straight_line();
    let (_pdg, sccdag, attrs) = classify(&func);

    // With room for every SCC the partition is untouched.
    let mut partition = SccDagPartition::new(&sccdag);
    let mut latency = InvocationLatency::new();
    Heuristics::new(3).adjust_parallelization_partition_for_dswp(
        &mut partition,
        &sccdag,
        &attrs,
        &mut latency,
    );
    assert_eq!(partition.num_subsets(), 3);

    // With a budget of two threads, the smallest adjacent pair merges; ties
    // break on topological subset order, so the front of the pipeline merges
    // first.
    let mut partition = SccDagPartition::new(&sccdag);
    Heuristics::new(2).adjust_parallelization_partition_for_dswp(
        &mut partition,
        &sccdag,
        &attrs,
        &mut latency,
    );
    assert_eq!(partition.num_subsets(), 2);

    let a = func.block(BlockId(0)).instrs[0];
    let b = func.block(BlockId(0)).instrs[1];
    let sa = partition.subset_of(sccdag.scc_of_value(a).unwrap()).unwrap();
    let sb = partition.subset_of(sccdag.scc_of_value(b).unwrap()).unwrap();
    assert_eq!(sa, sb);
}

// --- Scenario S5: illegal merge -------------------------------------------

#[test]
fn test_s5_cycle_creating_merge_rejected() {
    let func = diamond();
    let (_pdg, sccdag, _attrs) = classify(&func);
    let mut partition = SccDagPartition::new(&sccdag);

    let a = func.block(BlockId(0)).instrs[0];
    let d = func.block(BlockId(0)).instrs[3];
    let sa = partition.subset_of(sccdag.scc_of_value(a).unwrap()).unwrap();
    let sd = partition.subset_of(sccdag.scc_of_value(d).unwrap()).unwrap();

    let err = partition.merge_subsets(sa, sd).expect_err("merge must be rejected");
    assert_eq!(err.kind, PartitionErrorKind::IllegalMerge);
    assert_eq!(partition.num_subsets(), 4);
}

// --- Scenario S6: non-pipeline SCCDAG -------------------------------------

#[test]
fn test_s6_diamond_is_not_a_pipeline() {
    let func = diamond();
    let (_pdg, sccdag, _attrs) = classify(&func);
    assert_eq!(sccdag.num_sccs(), 4);
    assert!(!sccdag.is_pipeline());
}

// --- Universal invariants --------------------------------------------------

#[test]
fn test_sccs_partition_the_pdg() {
    let func = sum_reduction();
    let (pdg, sccdag, _attrs) = classify(&func);

    let mut seen: BTreeSet<ValueId> = BTreeSet::new();
    let mut total = 0;
    for node in sccdag.iterate_over_sccs() {
        for v in sccdag.scc(node).internal_values() {
            assert!(seen.insert(v), "value {} appears in two SCCs", v);
            total += 1;
        }
    }
    assert_eq!(total, pdg.graph().num_internal_nodes());
}

#[test]
fn test_sccdag_is_acyclic() {
    let func = sum_reduction();
    let (_pdg, sccdag, _attrs) = classify(&func);

    // Kahn over the internal SCCDAG.
    let g = sccdag.graph();
    let nodes: Vec<NodeId> = g.internal_nodes().collect();
    let mut in_degree: Vec<(NodeId, usize)> = nodes
        .iter()
        .map(|&n| {
            let d = g
                .predecessors(n)
                .into_iter()
                .filter(|&p| g.is_internal(p) && p != n)
                .count();
            (n, d)
        })
        .collect();
    let mut emitted = 0;
    loop {
        let next = in_degree.iter().position(|&(_, d)| d == 0);
        let (n, _) = match next {
            Some(ix) => in_degree.remove(ix),
            None => break,
        };
        emitted += 1;
        for s in g.successors(n) {
            if let Some(entry) = in_degree.iter_mut().find(|(m, _)| *m == s) {
                entry.1 -= 1;
            }
        }
    }
    assert_eq!(emitted, nodes.len(), "SCCDAG contains a cycle");
}

#[test]
fn test_edge_projection_onto_sccdag() {
    let func = sum_reduction();
    let (pdg, sccdag, _attrs) = classify(&func);

    for e in pdg.graph().edges() {
        let u = pdg.value_of(pdg.graph().edge_from(e));
        let v = pdg.value_of(pdg.graph().edge_to(e));
        let (su, sv) = match (sccdag.scc_of_value(u), sccdag.scc_of_value(v)) {
            (Some(a), Some(b)) => (a, b),
            _ => continue,
        };
        if su == sv {
            continue;
        }
        let matching: Vec<EdgeId> = sccdag
            .graph()
            .edges()
            .filter(|&de| {
                sccdag.graph().edge_from(de) == su && sccdag.graph().edge_to(de) == sv
            })
            .collect();
        assert_eq!(matching.len(), 1, "duplicate SCCDAG edge for {} -> {}", u, v);
        assert!(
            sccdag.graph().sub_edges(matching[0]).contains(&e),
            "sub-edge list of {} -> {} misses the PDG edge",
            u,
            v
        );
    }
}

#[test]
fn test_sccs_are_self_contained() {
    let func = sum_reduction();
    let (_pdg, sccdag, _attrs) = classify(&func);
    for node in sccdag.iterate_over_sccs() {
        let scc = sccdag.scc(node);
        if scc.number_of_instructions() > 1 {
            assert!(scc.has_cycle(false), "multi-node SCC without a cycle");
        }
    }
}

#[test]
fn test_independent_iff_no_internal_loop_carried_dependence() {
    let func = sum_reduction();
    let (_pdg, sccdag, attrs) = classify(&func);
    for node in sccdag.iterate_over_sccs() {
        let record = attrs.attrs_of(node).expect("every SCC gets a record");
        let carried = attrs.inter_iteration_deps_internal(node);
        assert_eq!(
            record.scc_type() == SccType::Independent,
            carried.is_empty(),
            "independence disagrees with the loop-carried set"
        );
    }
}

#[test]
fn test_partition_terminates_and_respects_budget() {
    let func = sum_reduction();
    let (_pdg, sccdag, attrs) = classify(&func);

    let mut partition = SccDagPartition::new(&sccdag);
    let mut latency = InvocationLatency::new();
    Heuristics::new(2).adjust_parallelization_partition_for_dswp(
        &mut partition,
        &sccdag,
        &attrs,
        &mut latency,
    );
    // The subset graph stays a DAG and can be ordered.
    let order = partition.subsets_in_topological_order().expect("acyclic partition");
    assert_eq!(order.len(), partition.num_subsets());
    assert!(partition.max_depth().expect("depth") < partition.num_subsets().max(1));
}

#[test]
fn test_determinism_across_runs() {
    let func = sum_reduction();
    let report_a = analyze_function(&func, AnalysisConfig::default()).expect("first run");
    let report_b = analyze_function(&func, AnalysisConfig::default()).expect("second run");
    let a = serde_json::to_string(&report_a).expect("serialize");
    let b = serde_json::to_string(&report_b).expect("serialize");
    assert_eq!(a, b);
}

#[test]
fn test_extract_and_reinsert_leaves_sccdag_unchanged() {
    let func = sum_reduction();
    let (_pdg, mut sccdag, _attrs) = classify(&func);

    let s = func.block(BlockId(1)).instrs[1];
    let target = sccdag.scc_of_value(s).expect("reduction SCC");
    let before_sccs = sccdag.num_sccs();
    let before_edges = sccdag.graph().num_edges();

    let extracted = sccdag.extract_scc_into_graph(target).expect("extract");
    assert_eq!(extracted.num_sccs(), 1);
    assert_eq!(sccdag.num_sccs(), before_sccs - 1);

    sccdag.reinsert_scc_from(&extracted).expect("reinsert");
    assert_eq!(sccdag.num_sccs(), before_sccs);
    assert_eq!(sccdag.graph().num_edges(), before_edges);
    assert!(sccdag.scc_of_value(s).is_some());
}

// --- Whole-pipeline entry point -------------------------------------------

#[test]
fn test_analyze_function_report() {
    let func = sum_reduction();
    let report = analyze_function(&func, AnalysisConfig::default()).expect("analysis");
    assert_eq!(report.function, "sum");
    assert_eq!(report.loops.len(), 1);

    let lr = &report.loops[0];
    assert!(lr.governed_by_iv);
    assert!(lr.num_sccs >= 3);
    assert!(lr.sccs.iter().any(|s| s.kind.starts_with("reduction")));
    assert!(lr.sccs.iter().any(|s| s.kind.starts_with("induction variable")));
    assert!(!lr.tasks.is_empty());
    assert!(lr.tasks.len() <= 4);
}
