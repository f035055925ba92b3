//! Scalar-evolution oracle and accumulator opcode tables.
//!
//! The classifier only ever asks one question of scalar evolution: is this
//! accumulator an add-recurrence over its loop? `ScalarEvolution` answers it
//! with a small recurrence matcher over the mini-IR, memoized per value.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::analysis::loops::{LoopId, LoopsSummary};
use crate::ir::{Function, Opcode, ScalarType, ValueId};

/// Scalar-evolution classification of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scev {
    /// `{start, +, step}` over the given loop. The step is recorded when it
    /// is a compile-time integer constant.
    AddRec { loop_id: LoopId, step: Option<i64> },
    Unknown,
}

impl Scev {
    pub fn is_add_rec(&self) -> bool {
        matches!(self, Scev::AddRec { .. })
    }
}

/// Memoizing recurrence classifier.
pub struct ScalarEvolution {
    cache: BTreeMap<ValueId, Scev>,
}

impl ScalarEvolution {
    pub fn new() -> Self {
        Self { cache: BTreeMap::new() }
    }

    /// Classify `v`. An instruction is an add-recurrence when it is an
    /// integer `add`/`sub` inside a loop, one operand reaches a header PHI of
    /// that loop through the recurrence cycle, and the other operand is
    /// invariant in that loop.
    pub fn scev_of(&mut self, func: &Function, loops: &LoopsSummary, v: ValueId) -> Scev {
        if let Some(&cached) = self.cache.get(&v) {
            return cached;
        }
        let result = self.classify(func, loops, v);
        self.cache.insert(v, result);
        result
    }

    fn classify(&self, func: &Function, loops: &LoopsSummary, v: ValueId) -> Scev {
        let inst = match func.instr(v) {
            Some(inst) => inst,
            None => return Scev::Unknown,
        };
        let negate = match inst.opcode {
            Opcode::Add => false,
            Opcode::Sub => true,
            _ => return Scev::Unknown,
        };
        let loop_id = match loops.loop_of_instr(func, v) {
            Some(l) => l,
            None => return Scev::Unknown,
        };
        if inst.operands.len() != 2 {
            return Scev::Unknown;
        }

        for (recur_ix, step_ix) in [(0, 1), (1, 0)] {
            let recur = inst.operands[recur_ix];
            let step = inst.operands[step_ix];
            // Subtracting the recurrence from something is not a recurrence.
            if negate && recur_ix == 1 {
                continue;
            }
            if !self.reaches_header_phi(func, loops, loop_id, recur, &mut BTreeSet::new()) {
                continue;
            }
            if !loops.is_loop_invariant(func, loop_id, step) {
                continue;
            }
            let step = match func.value(step) {
                crate::ir::Value::ConstInt(c) => Some(if negate { -c } else { *c }),
                _ => None,
            };
            return Scev::AddRec { loop_id, step };
        }
        Scev::Unknown
    }

    /// Whether `v` reaches a PHI in the header of `l` through a chain of
    /// in-loop PHI/add/sub/cast instructions (the recurrence cycle).
    fn reaches_header_phi(
        &self,
        func: &Function,
        loops: &LoopsSummary,
        l: LoopId,
        v: ValueId,
        visited: &mut BTreeSet<ValueId>,
    ) -> bool {
        if !visited.insert(v) {
            return false;
        }
        let inst = match func.instr(v) {
            Some(inst) => inst,
            None => return false,
        };
        if !loops.contains_block(l, inst.block) {
            return false;
        }
        match inst.opcode {
            Opcode::Phi { .. } => inst.block == loops.header(l),
            Opcode::Add | Opcode::Sub | Opcode::Cast => inst
                .operands
                .iter()
                .any(|&op| self.reaches_header_phi(func, loops, l, op, visited)),
            _ => false,
        }
    }
}

impl Default for ScalarEvolution {
    fn default() -> Self {
        Self::new()
    }
}

/// The reduction operator of a reducible SCC, lifted from the accumulator's
/// opcode by the PHI's scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionOp {
    IntAdd,
    IntMul,
    FpAdd,
    FpMul,
}

impl std::fmt::Display for ReductionOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReductionOp::IntAdd => "add",
            ReductionOp::IntMul => "mul",
            ReductionOp::FpAdd => "fadd",
            ReductionOp::FpMul => "fmul",
        };
        f.write_str(name)
    }
}

/// Opcode tables consulted when recognising accumulators.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccumulatorOpInfo;

impl AccumulatorOpInfo {
    /// Side-effect-free binary opcodes eligible as accumulators.
    pub fn is_side_effect_free(&self, op: &Opcode) -> bool {
        matches!(op, Opcode::Add | Opcode::Sub | Opcode::Mul)
    }

    pub fn is_mul_op(&self, op: &Opcode) -> bool {
        matches!(op, Opcode::Mul)
    }

    pub fn is_sub_op(&self, op: &Opcode) -> bool {
        matches!(op, Opcode::Sub)
    }

    /// Lift an accumulator opcode to the reduction operator for the given
    /// scalar type. Subtraction accumulates additively.
    pub fn accum_op_for_type(&self, op: &Opcode, ty: ScalarType) -> ReductionOp {
        match (self.is_mul_op(op), ty) {
            (true, ScalarType::Fp) => ReductionOp::FpMul,
            (true, ScalarType::Int) => ReductionOp::IntMul,
            (false, ScalarType::Fp) => ReductionOp::FpAdd,
            (false, ScalarType::Int) => ReductionOp::IntAdd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::loops::DominatorSummary;
    use crate::ir::{FunctionBuilder, Predicate};

    /// while (i < n) { i = i + 1; }  with an unrelated product p = p * 2
    fn counter_function() -> Function {
        let mut f = FunctionBuilder::new("counter");
        let n = f.argument("n", ScalarType::Int);
        let zero = f.const_int(0);
        let one = f.const_int(1);
        let two = f.const_int(2);

        let entry = f.block("entry");
        let header = crate::ir::BlockId(1);
        let exit = crate::ir::BlockId(2);
        f.br(header);

        f.block("header");
        let i = f.phi("i", vec![(zero, entry)], ScalarType::Int);
        let p = f.phi("p", vec![(one, entry)], ScalarType::Int);
        let i_next = f.add("i.next", i, one, ScalarType::Int);
        let p_next = f.mul("p.next", p, two, ScalarType::Int);
        let c = f.cmp("c", Predicate::Slt, i_next, n);
        f.cond_br(c, header, exit);
        f.set_phi_incoming(i, vec![(zero, entry), (i_next, header)]);
        f.set_phi_incoming(p, vec![(one, entry), (p_next, header)]);

        f.block("exit");
        f.ret();
        f.build()
    }

    #[test]
    fn test_counter_increment_is_add_rec() {
        let func = counter_function();
        let doms = DominatorSummary::compute(&func);
        let loops = LoopsSummary::compute(&func, &doms);
        let mut se = ScalarEvolution::new();

        let header = &func.block(crate::ir::BlockId(1)).instrs;
        let (i_next, p_next) = (header[2], header[3]);
        match se.scev_of(&func, &loops, i_next) {
            Scev::AddRec { step, .. } => assert_eq!(step, Some(1)),
            other => panic!("expected add-recurrence, got {:?}", other),
        }
        // Multiplication is not an add-recurrence.
        assert_eq!(se.scev_of(&func, &loops, p_next), Scev::Unknown);
    }

    #[test]
    fn test_decrement_is_negative_add_rec() {
        let mut f = FunctionBuilder::new("countdown");
        let n = f.argument("n", ScalarType::Int);
        let zero = f.const_int(0);
        let one = f.const_int(1);

        let entry = f.block("entry");
        let header = crate::ir::BlockId(1);
        let exit = crate::ir::BlockId(2);
        f.br(header);

        f.block("header");
        let i = f.phi("i", vec![(n, entry)], ScalarType::Int);
        let i_next = f.sub("i.next", i, one, ScalarType::Int);
        let c = f.cmp("c", Predicate::Sgt, i_next, zero);
        f.cond_br(c, header, exit);
        f.set_phi_incoming(i, vec![(n, entry), (i_next, header)]);

        f.block("exit");
        f.ret();
        let func = f.build();

        let doms = DominatorSummary::compute(&func);
        let loops = LoopsSummary::compute(&func, &doms);
        let mut se = ScalarEvolution::new();
        let i_next = func.block(crate::ir::BlockId(1)).instrs[1];
        match se.scev_of(&func, &loops, i_next) {
            Scev::AddRec { step, .. } => assert_eq!(step, Some(-1)),
            other => panic!("expected add-recurrence, got {:?}", other),
        }
    }

    #[test]
    fn test_accum_op_lifting() {
        let info = AccumulatorOpInfo;
        assert_eq!(info.accum_op_for_type(&Opcode::Add, ScalarType::Int), ReductionOp::IntAdd);
        assert_eq!(info.accum_op_for_type(&Opcode::Sub, ScalarType::Int), ReductionOp::IntAdd);
        assert_eq!(info.accum_op_for_type(&Opcode::Mul, ScalarType::Fp), ReductionOp::FpMul);
        assert!(info.is_side_effect_free(&Opcode::Mul));
        assert!(!info.is_side_effect_free(&Opcode::Load));
    }
}
