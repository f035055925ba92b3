//! SCC classification.
//!
//! `SccDagAttrs::populate` runs the whole classification pass over one
//! SCCDAG:
//! 1. every PDG dependence between instructions of a common loop is split
//!    into loop-carried vs intra-iteration using the dominator summary;
//! 2. every SCC is typed INDEPENDENT, REDUCIBLE, or SEQUENTIAL, and tagged
//!    as an induction-variable or reduction SCC when the shape matches;
//! 3. clonability and the fixed-IV-bounds record are derived.
//!
//! Classification misses are silent (the SCC falls back to the next
//! category). Inconsistencies in the input graph are returned as errors.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::analysis::ivbounds::{derive_fixed_iv_bounds, describe_scc, FixedIvBounds};
use crate::analysis::loops::{DominatorSummary, LoopId, LoopsSummary};
use crate::analysis::pdg::Pdg;
use crate::analysis::sccdag::{Scc, SccDag};
use crate::analysis::scev::{AccumulatorOpInfo, ReductionOp, ScalarEvolution};
use crate::graph::{DepKind, EdgeId, NodeId};
use crate::ir::{Function, Opcode, ValueId};
use crate::utils::errors::{ClassificationError, ClassificationErrorKind};

/// Parallelization type of an SCC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SccType {
    /// No loop-carried dependence internal to the SCC
    Independent,
    /// The single loop-carried data cycle is a reduction
    Reducible,
    /// Must run iterations in order
    Sequential,
}

impl std::fmt::Display for SccType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SccType::Independent => "INDEPENDENT",
            SccType::Reducible => "REDUCIBLE",
            SccType::Sequential => "SEQUENTIAL",
        };
        f.write_str(name)
    }
}

/// Variant tag of an SCC, with variant-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SccKind {
    Plain,
    InductionVariable { bounds: Option<FixedIvBounds> },
    Reduction { phi: ValueId, reduction_op: ReductionOp },
}

/// Classification record of one SCC.
#[derive(Debug, Clone)]
pub struct SccAttrs {
    scc_type: SccType,
    kind: SccKind,
    is_clonable: bool,
    phis: BTreeSet<ValueId>,
    accumulators: BTreeSet<ValueId>,
    /// (condition, conditional branch) pairs of the SCC
    control_pairs: Vec<(ValueId, ValueId)>,
    strongly_connected_data_values: BTreeSet<ValueId>,
    weakly_connected_data_values: BTreeSet<ValueId>,
}

impl SccAttrs {
    pub fn scc_type(&self) -> SccType {
        self.scc_type
    }

    pub fn kind(&self) -> &SccKind {
        &self.kind
    }

    pub fn is_clonable(&self) -> bool {
        self.is_clonable
    }

    pub fn is_induction_variable(&self) -> bool {
        matches!(self.kind, SccKind::InductionVariable { .. })
    }

    pub fn is_reduction(&self) -> bool {
        matches!(self.kind, SccKind::Reduction { .. })
    }

    pub fn fixed_iv_bounds(&self) -> Option<&FixedIvBounds> {
        match &self.kind {
            SccKind::InductionVariable { bounds } => bounds.as_ref(),
            _ => None,
        }
    }

    pub fn phis(&self) -> &BTreeSet<ValueId> {
        &self.phis
    }

    pub fn accumulators(&self) -> &BTreeSet<ValueId> {
        &self.accumulators
    }

    pub fn control_pairs(&self) -> &[(ValueId, ValueId)] {
        &self.control_pairs
    }

    /// Whether `v` sits on a data cycle of the SCC.
    pub fn is_strongly_connected_data_value(&self, v: ValueId) -> bool {
        self.strongly_connected_data_values.contains(&v)
    }

    pub fn is_weakly_connected_data_value(&self, v: ValueId) -> bool {
        self.weakly_connected_data_values.contains(&v)
    }
}

/// Ancestor maps of the SCCDAG with clonable SCCs distributed into their
/// consumers.
#[derive(Debug, Default)]
pub struct DistributedCloneView {
    /// Every SCC reached from each child by walking incoming edges through
    /// clonable SCCs
    pub parents_via_clones: BTreeMap<NodeId, Vec<NodeId>>,
    /// The SCCDAG edges traversed during each child's walk
    pub edges_via_clones: BTreeMap<NodeId, Vec<EdgeId>>,
}

/// Classification results for a whole SCCDAG.
pub struct SccDagAttrs {
    attrs: BTreeMap<NodeId, SccAttrs>,
    /// Loop-carried PDG edges touching each SCC
    inter_iter_deps: BTreeMap<NodeId, BTreeSet<EdgeId>>,
    /// Intra-iteration PDG edges touching each SCC
    intra_iter_deps: BTreeMap<NodeId, BTreeSet<EdgeId>>,
    /// Loop-carried PDG edges with both endpoints inside the SCC
    inter_iter_deps_internal: BTreeMap<NodeId, BTreeSet<EdgeId>>,
    /// Kind snapshot of every loop-carried PDG edge
    loop_carried_kinds: BTreeMap<EdgeId, DepKind>,
}

impl SccDagAttrs {
    /// Run the classification pass. Marks the loop-carried bit on the PDG's
    /// edges as a side effect.
    pub fn populate(
        sccdag: &SccDag,
        pdg: &mut Pdg,
        func: &Function,
        loops: &LoopsSummary,
        doms: &DominatorSummary,
        se: &mut ScalarEvolution,
    ) -> Result<Self, ClassificationError> {
        let mut this = Self {
            attrs: BTreeMap::new(),
            inter_iter_deps: BTreeMap::new(),
            intra_iter_deps: BTreeMap::new(),
            inter_iter_deps_internal: BTreeMap::new(),
            loop_carried_kinds: BTreeMap::new(),
        };
        this.partition_dependences(sccdag, pdg, func, loops, doms);

        for node in sccdag.iterate_over_sccs() {
            let scc = sccdag.scc(node);
            let attrs = this.classify_scc(sccdag, pdg, func, loops, se, node, scc)?;
            trace!(
                "SCC {} classified {} ({:?})",
                describe_scc(func, scc),
                attrs.scc_type,
                attrs.kind
            );
            this.attrs.insert(node, attrs);
        }
        debug!(
            "classified {} SCCs: {} independent, {} reducible, {} sequential",
            this.attrs.len(),
            this.count_type(SccType::Independent),
            this.count_type(SccType::Reducible),
            this.count_type(SccType::Sequential),
        );
        Ok(this)
    }

    fn count_type(&self, ty: SccType) -> usize {
        self.attrs.values().filter(|a| a.scc_type == ty).count()
    }

    /// Split every dependence whose endpoints both sit inside some loop into
    /// loop-carried vs intra-iteration: the dependence is carried when the
    /// source is the sink or does not dominate it. The endpoints need not
    /// share a loop; a cross-loop edge from a non-dominating block is carried
    /// as well.
    fn partition_dependences(
        &mut self,
        sccdag: &SccDag,
        pdg: &mut Pdg,
        func: &Function,
        loops: &LoopsSummary,
        doms: &DominatorSummary,
    ) {
        let edge_ids: Vec<EdgeId> = pdg.graph().edges().collect();
        for e in edge_ids {
            let u = pdg.value_of(pdg.graph().edge_from(e));
            let v = pdg.value_of(pdg.graph().edge_to(e));
            if !func.is_instruction(u) || !func.is_instruction(v) {
                continue;
            }
            if loops.loop_of_instr(func, u).is_none() || loops.loop_of_instr(func, v).is_none() {
                continue;
            }
            let carried = u == v || !doms.dominates(func, u, v);
            pdg.graph_mut().edge_kind_mut(e).loop_carried = Some(carried);

            let su = sccdag.scc_of_value(u);
            let sv = sccdag.scc_of_value(v);
            let target = if carried {
                &mut self.inter_iter_deps
            } else {
                &mut self.intra_iter_deps
            };
            for s in [su, sv].into_iter().flatten() {
                target.entry(s).or_default().insert(e);
            }
            if carried {
                self.loop_carried_kinds.insert(e, *pdg.graph().edge_kind(e));
                if let (Some(a), Some(b)) = (su, sv) {
                    if a == b {
                        self.inter_iter_deps_internal.entry(a).or_default().insert(e);
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_scc(
        &self,
        sccdag: &SccDag,
        pdg: &Pdg,
        func: &Function,
        loops: &LoopsSummary,
        se: &mut ScalarEvolution,
        node: NodeId,
        scc: &Scc,
    ) -> Result<SccAttrs, ClassificationError> {
        let mut attrs = SccAttrs {
            scc_type: SccType::Sequential,
            kind: SccKind::Plain,
            is_clonable: false,
            phis: BTreeSet::new(),
            accumulators: BTreeSet::new(),
            control_pairs: Vec::new(),
            strongly_connected_data_values: BTreeSet::new(),
            weakly_connected_data_values: BTreeSet::new(),
        };
        self.collect_instruction_sets(func, scc, &mut attrs);
        collect_data_cycle_values(scc, &mut attrs);

        let internal_carried = self
            .inter_iter_deps_internal
            .get(&node)
            .cloned()
            .unwrap_or_default();

        if internal_carried.is_empty() {
            attrs.scc_type = SccType::Independent;
        } else if self.check_reducible(sccdag, pdg, func, loops, node, scc, &attrs, &internal_carried)
        {
            attrs.scc_type = SccType::Reducible;
            attrs.kind = self.build_reduction(func, loops, scc, &attrs)?;
        } else if let Some((cmp, branch)) =
            self.check_induction_variable(func, loops, se, scc, &attrs)
        {
            attrs.scc_type = SccType::Sequential;
            let loop_id = attrs
                .phis
                .iter()
                .next()
                .and_then(|&phi| loops.loop_of_instr(func, phi));
            let bounds = match loop_id {
                Some(l) => {
                    let phis: Vec<ValueId> = attrs.phis.iter().copied().collect();
                    let accums: Vec<ValueId> = attrs.accumulators.iter().copied().collect();
                    derive_fixed_iv_bounds(func, loops, scc, l, &phis, &accums, cmp, branch)?
                }
                None => None,
            };
            attrs.kind = SccKind::InductionVariable { bounds };
        }

        attrs.is_clonable = self.check_clonable(sccdag, func, node, scc, &attrs);
        Ok(attrs)
    }

    fn collect_instruction_sets(&self, func: &Function, scc: &Scc, attrs: &mut SccAttrs) {
        let op_info = AccumulatorOpInfo;
        for v in scc.internal_values() {
            let inst = match func.instr(v) {
                Some(inst) => inst,
                None => continue,
            };
            if inst.opcode.is_phi() {
                attrs.phis.insert(v);
            } else if op_info.is_side_effect_free(&inst.opcode) {
                attrs.accumulators.insert(v);
            }
            if let Some(cond) = inst.branch_condition() {
                attrs.control_pairs.push((cond, v));
            }
        }
    }

    /// Reducibility: all eight criteria must hold.
    #[allow(clippy::too_many_arguments)]
    fn check_reducible(
        &self,
        sccdag: &SccDag,
        pdg: &Pdg,
        func: &Function,
        loops: &LoopsSummary,
        node: NodeId,
        scc: &Scc,
        attrs: &SccAttrs,
        internal_carried: &BTreeSet<EdgeId>,
    ) -> bool {
        // 1. One loop holds every instruction of the SCC.
        let mut scc_loop: Option<LoopId> = None;
        for v in scc.internal_values() {
            match loops.loop_of_instr(func, v) {
                Some(l) if scc_loop.is_none() || scc_loop == Some(l) => scc_loop = Some(l),
                _ => return false,
            }
        }
        if scc_loop.is_none() {
            return false;
        }

        // 2. No memory dependence touches the SCC.
        let g = scc.graph();
        if g.edges().any(|e| g.edge_kind(e).is_memory_dependence()) {
            return false;
        }

        // 3. Dependent SCCs must be trivial: singletons with no outgoing
        // edges of their own.
        for succ in sccdag.graph().successors(node) {
            if !sccdag.graph().is_internal(succ) || succ == node {
                continue;
            }
            if sccdag.scc(succ).number_of_instructions() > 1
                || sccdag.graph().num_outgoing(succ) > 0
            {
                return false;
            }
        }

        // 4. Exactly one internal loop-carried dependence, a data dependence
        // through a register; a carried control or memory edge disqualifies
        // the SCC.
        let mut only: Option<EdgeId> = None;
        for &e in internal_carried {
            let kind = pdg.graph().edge_kind(e);
            if kind.is_control_dependence() || kind.is_memory_dependence() {
                return false;
            }
            if only.replace(e).is_some() {
                return false;
            }
        }
        let only = match only {
            Some(e) => e,
            None => return false,
        };
        let u = pdg.value_of(pdg.graph().edge_from(only));
        let v = pdg.value_of(pdg.graph().edge_to(only));
        if !func.is_instruction(u) || !func.is_instruction(v) {
            return false;
        }

        // 5. Control pairs are driven from outside the SCC.
        if attrs.control_pairs.iter().any(|&(cond, _)| scc.is_internal(cond)) {
            return false;
        }

        // 6. PHI incoming values from the PHI's own loop stay within the
        // recurrence.
        if !self.phi_incomings_stay_internal(func, loops, attrs) {
            return false;
        }

        // 7. At least one accumulator; each reads the recurrence through
        // exactly one operand.
        if attrs.accumulators.is_empty() {
            return false;
        }
        for &a in &attrs.accumulators {
            let inst = match func.instr(a) {
                Some(inst) if inst.operands.len() == 2 => inst,
                _ => return false,
            };
            let derived = inst
                .operands
                .iter()
                .filter(|&&op| is_derived_within_scc(scc, attrs, op))
                .count();
            let recurrent = inst
                .operands
                .iter()
                .filter(|&&op| is_derived_phi_or_accumulator(func, scc, attrs, op))
                .count();
            if derived != 1 || recurrent != 1 {
                return false;
            }
        }

        // 8. Homogeneous operator; subtraction only with an external RHS.
        let op_info = AccumulatorOpInfo;
        let mut any_mul = false;
        let mut any_add = false;
        for &a in &attrs.accumulators {
            let inst = match func.instr(a) {
                Some(inst) => inst,
                None => return false,
            };
            if op_info.is_mul_op(&inst.opcode) {
                any_mul = true;
            } else {
                any_add = true;
            }
            if op_info.is_sub_op(&inst.opcode) && scc.is_internal(inst.operands[1]) {
                return false;
            }
        }
        !(any_mul && any_add)
    }

    /// Build the reduction record for a reducible SCC. The PHI must sit in
    /// the header of the SCC's loop.
    fn build_reduction(
        &self,
        func: &Function,
        loops: &LoopsSummary,
        scc: &Scc,
        attrs: &SccAttrs,
    ) -> Result<SccKind, ClassificationError> {
        let loop_id = attrs
            .phis
            .iter()
            .chain(attrs.accumulators.iter())
            .find_map(|&v| loops.loop_of_instr(func, v));
        let header = loop_id.map(|l| loops.header(l));
        let phi = attrs
            .phis
            .iter()
            .copied()
            .find(|&phi| func.block_of(phi) == header)
            .ok_or_else(|| {
                ClassificationError::new(
                    ClassificationErrorKind::ReductionPhiNotInHeader,
                    "the PHI of a reducible SCC is not in the header of its loop",
                    describe_scc(func, scc),
                    header.map(|h| format!("{}", h)),
                )
            })?;

        let op_info = AccumulatorOpInfo;
        let first_accum = attrs.accumulators.iter().next().copied().ok_or_else(|| {
            ClassificationError::new(
                ClassificationErrorKind::ReductionPhiNotInHeader,
                "a reducible SCC has no accumulator",
                describe_scc(func, scc),
                header.map(|h| format!("{}", h)),
            )
        })?;
        let opcode = func.instr(first_accum).map(|i| i.opcode.clone());
        let ty = func.instr(phi).map(|i| i.ty);
        let reduction_op = match (opcode, ty) {
            (Some(op), Some(ty)) => op_info.accum_op_for_type(&op, ty),
            _ => {
                return Err(ClassificationError::new(
                    ClassificationErrorKind::ReductionPhiNotInHeader,
                    "a reducible SCC references a non-instruction member",
                    describe_scc(func, scc),
                    header.map(|h| format!("{}", h)),
                ))
            }
        };
        Ok(SccKind::Reduction { phi, reduction_op })
    }

    /// Induction-variable shape. Returns the (comparison, branch) pair when
    /// the SCC matches.
    fn check_induction_variable(
        &self,
        func: &Function,
        loops: &LoopsSummary,
        se: &mut ScalarEvolution,
        scc: &Scc,
        attrs: &SccAttrs,
    ) -> Option<(ValueId, ValueId)> {
        // 1. Exactly one loop-exit-controlling conditional branch.
        let mut exit_branches = scc.internal_values().filter(|&v| {
            let inst = match func.instr(v) {
                Some(inst) => inst,
                None => return false,
            };
            if inst.branch_condition().is_none() {
                return false;
            }
            match loops.loop_of_instr(func, v) {
                Some(l) => inst.successors().iter().any(|&s| !loops.contains_block(l, s)),
                None => false,
            }
        });
        let branch = exit_branches.next()?;
        if exit_branches.next().is_some() {
            return None;
        }

        // 2. Its condition is a comparison pinning one value of the
        // recurrence against one external value.
        let cmp = func.instr(branch)?.branch_condition()?;
        let cmp_inst = func.instr(cmp)?;
        if !cmp_inst.opcode.is_cmp() || cmp_inst.operands.len() != 2 {
            return None;
        }
        let derived: Vec<ValueId> = cmp_inst
            .operands
            .iter()
            .copied()
            .filter(|&op| is_derived_within_scc(scc, attrs, op))
            .collect();
        if derived.len() != 1 || !is_derived_phi_or_accumulator(func, scc, attrs, derived[0]) {
            return None;
        }

        // 3. A single PHI whose in-loop incoming values stay within the
        // recurrence.
        if attrs.phis.len() != 1 || !self.phi_incomings_stay_internal(func, loops, attrs) {
            return None;
        }

        // 4. Scalar evolution agrees every accumulator is an add-recurrence.
        for &a in &attrs.accumulators {
            if !se.scev_of(func, loops, a).is_add_rec() {
                return None;
            }
        }
        Some((cmp, branch))
    }

    /// Criterion shared by reduction and IV shapes: every PHI incoming value
    /// arriving from the PHI's own loop is another PHI or accumulator of the
    /// SCC.
    fn phi_incomings_stay_internal(
        &self,
        func: &Function,
        loops: &LoopsSummary,
        attrs: &SccAttrs,
    ) -> bool {
        for &phi in &attrs.phis {
            let inst = match func.instr(phi) {
                Some(inst) => inst,
                None => return false,
            };
            let phi_loop = loops.loop_of_block(inst.block);
            for (value, block) in inst.phi_incoming() {
                if loops.loop_of_block(block) != phi_loop {
                    continue;
                }
                if !attrs.phis.contains(&value) && !attrs.accumulators.contains(&value) {
                    return false;
                }
            }
        }
        true
    }

    fn check_clonable(
        &self,
        sccdag: &SccDag,
        func: &Function,
        node: NodeId,
        scc: &Scc,
        attrs: &SccAttrs,
    ) -> bool {
        let has_outgoing = sccdag.graph().num_outgoing(node) > 0;
        if attrs.is_induction_variable() && has_outgoing {
            return true;
        }
        if scc.number_of_instructions() == 1 && has_outgoing {
            if let Some(v) = scc.internal_values().next() {
                if let Some(inst) = func.instr(v) {
                    if matches!(
                        inst.opcode,
                        Opcode::Phi { .. } | Opcode::GetElementPtr | Opcode::Cast
                    ) {
                        return true;
                    }
                }
            }
        }
        scc.internal_values().all(|v| {
            func.instr(v)
                .map(|inst| inst.opcode.is_cmp() || inst.opcode.is_terminator())
                .unwrap_or(false)
        })
    }

    pub fn attrs_of(&self, node: NodeId) -> Result<&SccAttrs, ClassificationError> {
        self.attrs.get(&node).ok_or_else(|| {
            ClassificationError::new(
                ClassificationErrorKind::UnknownScc,
                format!("no attribute record for SCC node {}", node),
                String::new(),
                None,
            )
        })
    }

    pub fn iterate(&self) -> impl Iterator<Item = (NodeId, &SccAttrs)> + '_ {
        self.attrs.iter().map(|(&n, a)| (n, a))
    }

    /// Whether a PDG edge was classified loop-carried.
    pub fn is_a_loop_carried_dependence(&self, e: EdgeId) -> bool {
        self.loop_carried_kinds.contains_key(&e)
    }

    /// Loop-carried PDG edges with both endpoints in the SCC.
    pub fn inter_iteration_deps_internal(&self, node: NodeId) -> BTreeSet<EdgeId> {
        self.inter_iter_deps_internal.get(&node).cloned().unwrap_or_default()
    }

    /// Intra-iteration PDG edges touching the SCC.
    pub fn intra_iteration_deps(&self, node: NodeId) -> BTreeSet<EdgeId> {
        self.intra_iter_deps.get(&node).cloned().unwrap_or_default()
    }

    /// SCCs with a loop-carried dependence among their own members.
    pub fn get_sccs_with_loop_carried_dependencies(&self) -> Vec<NodeId> {
        self.inter_iter_deps_internal
            .iter()
            .filter(|(_, edges)| !edges.is_empty())
            .map(|(&n, _)| n)
            .collect()
    }

    /// SCCs with a loop-carried control dependence among their own members.
    pub fn get_sccs_with_loop_carried_control_dependencies(&self) -> Vec<NodeId> {
        self.filter_sccs_by_carried_kind(&self.inter_iter_deps_internal, |k| {
            k.is_control_dependence()
        })
    }

    /// SCCs touched by a loop-carried data dependence, boundary edges
    /// included.
    pub fn get_sccs_with_loop_carried_data_dependencies(&self) -> Vec<NodeId> {
        self.filter_sccs_by_carried_kind(&self.inter_iter_deps, |k| k.is_data_dependence())
    }

    fn filter_sccs_by_carried_kind(
        &self,
        deps: &BTreeMap<NodeId, BTreeSet<EdgeId>>,
        pred: impl Fn(&DepKind) -> bool,
    ) -> Vec<NodeId> {
        deps.iter()
            .filter(|(_, edges)| {
                edges
                    .iter()
                    .any(|e| self.loop_carried_kinds.get(e).map(&pred).unwrap_or(false))
            })
            .map(|(&n, _)| n)
            .collect()
    }

    /// Apply `f` to the loop-carried data dependences touching the SCC until
    /// it returns true; reports whether it ever did.
    pub fn iterate_over_loop_carried_data_dependences(
        &self,
        node: NodeId,
        mut f: impl FnMut(EdgeId) -> bool,
    ) -> bool {
        if let Some(edges) = self.inter_iter_deps.get(&node) {
            for &e in edges {
                let is_data = self
                    .loop_carried_kinds
                    .get(&e)
                    .map(|k| k.is_data_dependence())
                    .unwrap_or(false);
                if is_data && f(e) {
                    return true;
                }
            }
        }
        false
    }

    /// Whether every instruction of the SCC lives in a strict sub-loop of
    /// `l`.
    pub fn is_scc_contained_in_subloop(
        &self,
        func: &Function,
        loops: &LoopsSummary,
        l: LoopId,
        scc: &Scc,
    ) -> bool {
        scc.internal_values().all(|v| match loops.loop_of_instr(func, v) {
            Some(inner) => inner != l && is_loop_within(loops, inner, l),
            None => false,
        })
    }

    /// Ancestor view of the SCCDAG under the assumption that clonable SCCs
    /// are distributed into their consumers: every reached predecessor is a
    /// parent, and the walk continues through the clonable ones. The per-child
    /// visited set keeps the walk finite even through clonable cycles.
    pub fn collect_scc_graph_assuming_distributed_clones(
        &self,
        sccdag: &SccDag,
    ) -> DistributedCloneView {
        let mut view = DistributedCloneView::default();
        let expand = |n: NodeId, frontier: &mut Vec<NodeId>, edges: &mut Vec<EdgeId>| {
            for e in sccdag.graph().incoming(n) {
                let p = sccdag.graph().edge_from(e);
                if sccdag.graph().is_internal(p) && p != n {
                    edges.push(e);
                    frontier.push(p);
                }
            }
        };
        for child in sccdag.iterate_over_sccs() {
            let mut parents = Vec::new();
            let mut edges = Vec::new();
            let mut visited: BTreeSet<NodeId> = BTreeSet::new();
            let mut frontier: Vec<NodeId> = Vec::new();
            expand(child, &mut frontier, &mut edges);
            while let Some(p) = frontier.pop() {
                if !visited.insert(p) {
                    continue;
                }
                parents.push(p);
                let clonable = self.attrs.get(&p).map(|a| a.is_clonable).unwrap_or(false);
                if clonable {
                    expand(p, &mut frontier, &mut edges);
                }
            }
            parents.sort();
            parents.dedup();
            edges.sort();
            edges.dedup();
            view.parents_via_clones.insert(child, parents);
            view.edges_via_clones.insert(child, edges);
        }
        view
    }

    /// Starting from the SCCDAG's top-level SCCs and descending through
    /// INDEPENDENT ones, the remaining frontier must be a single
    /// induction-variable SCC.
    pub fn is_loop_governed_by_iv(&self, sccdag: &SccDag) -> bool {
        let mut governing: BTreeSet<NodeId> = BTreeSet::new();
        let mut visited: BTreeSet<NodeId> = BTreeSet::new();
        let mut frontier: Vec<NodeId> = sccdag
            .graph()
            .top_level_nodes()
            .into_iter()
            .filter(|&n| sccdag.graph().is_internal(n))
            .collect();
        while let Some(n) = frontier.pop() {
            if !visited.insert(n) {
                continue;
            }
            let independent = self
                .attrs
                .get(&n)
                .map(|a| a.scc_type == SccType::Independent)
                .unwrap_or(false);
            if independent {
                frontier.extend(
                    sccdag
                        .graph()
                        .successors(n)
                        .into_iter()
                        .filter(|&s| sccdag.graph().is_internal(s)),
                );
            } else {
                governing.insert(n);
            }
        }
        if governing.len() != 1 {
            return false;
        }
        governing
            .iter()
            .next()
            .and_then(|n| self.attrs.get(n))
            .map(|a| a.is_induction_variable())
            .unwrap_or(false)
    }

    /// Whether every live-out producer belongs to an INDEPENDENT or
    /// REDUCIBLE SCC.
    pub fn are_all_live_out_values_reducible(
        &self,
        sccdag: &SccDag,
        live_outs: &[ValueId],
    ) -> bool {
        for &v in live_outs {
            let node = match sccdag.scc_of_value(v) {
                Some(n) => n,
                None => continue,
            };
            match self.attrs.get(&node).map(|a| a.scc_type) {
                Some(SccType::Independent) | Some(SccType::Reducible) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Whether `inner` is `outer` or nested (transitively) inside it.
fn is_loop_within(loops: &LoopsSummary, inner: LoopId, outer: LoopId) -> bool {
    let mut cur = Some(inner);
    while let Some(l) = cur {
        if l == outer {
            return true;
        }
        cur = loops.loop_info(l).parent;
    }
    false
}

/// Fill the strongly/weakly connected data-value caches: a member is
/// strongly connected when a data-only cycle inside the SCC passes through
/// it, weakly connected when it merely touches an internal data edge.
fn collect_data_cycle_values(scc: &Scc, attrs: &mut SccAttrs) {
    let g = scc.graph();
    for start in g.internal_nodes() {
        let value = *g.payload(start);
        let mut on_cycle = false;
        let mut touches_data = false;
        let mut stack = vec![start];
        let mut visited: BTreeSet<NodeId> = BTreeSet::new();
        while let Some(n) = stack.pop() {
            for e in g.outgoing(n) {
                if g.edge_kind(e).is_control_dependence() {
                    continue;
                }
                let to = g.edge_to(e);
                if !g.is_internal(to) {
                    continue;
                }
                if n == start || to == start {
                    touches_data = true;
                }
                if to == start {
                    on_cycle = true;
                    break;
                }
                if visited.insert(to) {
                    stack.push(to);
                }
            }
            if on_cycle {
                break;
            }
        }
        for e in g.incoming(start) {
            if !g.edge_kind(e).is_control_dependence() && g.is_internal(g.edge_from(e)) {
                touches_data = true;
            }
        }
        if on_cycle {
            attrs.strongly_connected_data_values.insert(value);
        } else if touches_data {
            attrs.weakly_connected_data_values.insert(value);
        }
    }
}

/// Whether `v` is internal to the SCC and on one of its data cycles.
fn is_derived_within_scc(scc: &Scc, attrs: &SccAttrs, v: ValueId) -> bool {
    scc.is_internal(v) && attrs.strongly_connected_data_values.contains(&v)
}

/// After peeling one cast, `v` must be an internal PHI or accumulator of the
/// SCC sitting on a data cycle.
fn is_derived_phi_or_accumulator(
    func: &Function,
    scc: &Scc,
    attrs: &SccAttrs,
    v: ValueId,
) -> bool {
    let peeled = match func.instr(v) {
        Some(inst) if matches!(inst.opcode, Opcode::Cast) && !inst.operands.is_empty() => {
            inst.operands[0]
        }
        _ => v,
    };
    (attrs.phis.contains(&peeled) || attrs.accumulators.contains(&peeled))
        && is_derived_within_scc(scc, attrs, peeled)
}
