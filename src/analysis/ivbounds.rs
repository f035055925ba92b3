//! Fixed induction-variable bounds detection.
//!
//! For an induction-variable SCC with a unit step, the comparison governing
//! the loop exit pins the trip count: the IV (or its accumulator) is compared
//! against a loop-invariant end value, and the predicate together with the
//! branch shape yields a signed end offset in {-1, 0, +1}. Structural misses
//! discard the record silently; a predicate/step combination outside the
//! recognized table is an inconsistency in the input and surfaces as an
//! error.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::analysis::loops::{LoopId, LoopsSummary};
use crate::analysis::sccdag::Scc;
use crate::ir::{Function, Opcode, Predicate, Value, ValueId};
use crate::utils::errors::{ClassificationError, ClassificationErrorKind};

/// Bounds of an induction variable with a compile-time unit step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedIvBounds {
    /// The IV's PHI
    pub phi: ValueId,
    /// The accumulator stepping the IV
    pub accumulator: ValueId,
    /// Step per iteration, +1 or -1
    pub step: i64,
    /// The governing comparison
    pub cmp: ValueId,
    /// The conditional branch consuming the comparison
    pub branch: ValueId,
    /// The value the IV is compared against
    pub cmp_iv_to: ValueId,
    /// Whether the comparison reads the accumulator rather than the PHI
    pub is_cmp_on_accum: bool,
    /// Whether the branch exits the loop when the comparison holds
    pub exit_on_cmp: bool,
    /// Signed adjustment of the end value, in {-1, 0, +1} before the
    /// accumulator correction
    pub end_offset: i64,
}

/// Try to derive fixed bounds for an IV SCC.
///
/// Requirements: a single PHI with exactly two incoming values, a single
/// accumulator whose step operand is a constant +1 or -1, and a comparison
/// that pins the PHI or the accumulator against a value not derived within
/// the SCC.
pub fn derive_fixed_iv_bounds(
    func: &Function,
    loops: &LoopsSummary,
    scc: &Scc,
    loop_id: LoopId,
    phis: &[ValueId],
    accumulators: &[ValueId],
    cmp: ValueId,
    branch: ValueId,
) -> Result<Option<FixedIvBounds>, ClassificationError> {
    let (phi, accum) = match (phis, accumulators) {
        (&[phi], &[accum]) => (phi, accum),
        _ => return Ok(None),
    };
    match func.instr(phi) {
        Some(inst) if inst.phi_incoming().len() == 2 => {}
        _ => return Ok(None),
    }

    // The accumulator's non-recurrent operand is the step; it must be a
    // constant unit.
    let accum_inst = match func.instr(accum) {
        Some(inst) if inst.operands.len() == 2 => inst,
        _ => return Ok(None),
    };
    let raw_step = {
        let mut step = None;
        for &op in &accum_inst.operands {
            if op == phi || scc.is_internal(op) {
                continue;
            }
            if let Value::ConstInt(c) = func.value(op) {
                step = Some(*c);
            }
        }
        match step {
            Some(c) => c,
            None => return Ok(None),
        }
    };
    let step = if matches!(accum_inst.opcode, Opcode::Sub) { -raw_step } else { raw_step };
    if step != 1 && step != -1 {
        return Ok(None);
    }

    let cmp_inst = match func.instr(cmp) {
        Some(inst) if inst.operands.len() == 2 => inst,
        _ => return Ok(None),
    };
    let predicate = match cmp_inst.opcode {
        Opcode::Cmp(p) => p,
        _ => return Ok(None),
    };
    let (lhs, rhs) = (cmp_inst.operands[0], cmp_inst.operands[1]);
    let iv_side = |v: ValueId| v == phi || v == accum;
    let (iv_value, end_value, iv_is_lhs) = if iv_side(lhs) && !iv_side(rhs) {
        (lhs, rhs, true)
    } else if iv_side(rhs) && !iv_side(lhs) {
        (rhs, lhs, false)
    } else {
        return Ok(None);
    };
    // The end value must come from outside the recurrence: a constant, or a
    // chain of instructions ending outside the SCC.
    if !end_value_is_fixed(func, scc, end_value, 0) {
        return Ok(None);
    }

    let branch_inst = match func.instr(branch) {
        Some(inst) if inst.successors().len() == 2 => inst,
        _ => return Ok(None),
    };
    // Exactly one successor must stay in the loop, or the branch shape says
    // nothing about the exit.
    let in_loop = |b| loops.contains_block(loop_id, b);
    let succs = branch_inst.successors();
    if in_loop(succs[0]) == in_loop(succs[1]) {
        return Ok(None);
    }
    let exit_on_cmp = !in_loop(succs[0]);

    // Normalize: unsigned to signed, then swap so the IV reads on the left.
    let mut predicate = predicate.signed();
    if !iv_is_lhs {
        predicate = predicate.swapped();
    }

    let end_offset = end_offset_for(step, exit_on_cmp, predicate).ok_or_else(|| {
        let header = loops.header(loop_id);
        ClassificationError::new(
            ClassificationErrorKind::UnrecognizedIvComparison,
            format!(
                "unrecognized induction-variable comparison: step {:+}, {} predicate {:?}",
                step,
                if exit_on_cmp { "exit-on-cmp" } else { "continue-on-cmp" },
                predicate,
            ),
            describe_scc(func, scc),
            Some(format!("{}", header)),
        )
    })?;

    let is_cmp_on_accum = iv_value == accum;
    let end_offset = end_offset - step * i64::from(is_cmp_on_accum);
    trace!(
        "fixed IV bounds: phi {}, step {:+}, end {} offset {:+}",
        func.describe(phi),
        step,
        func.describe(end_value),
        end_offset
    );
    Ok(Some(FixedIvBounds {
        phi,
        accumulator: accum,
        step,
        cmp,
        branch,
        cmp_iv_to: end_value,
        is_cmp_on_accum,
        exit_on_cmp,
        end_offset,
    }))
}

/// End-offset table: step and predicate after normalization to IV-on-LHS,
/// split on whether the branch exits when the comparison holds.
fn end_offset_for(step: i64, exit_on_cmp: bool, predicate: Predicate) -> Option<i64> {
    use Predicate::*;
    let offset = match (step, exit_on_cmp, predicate) {
        (1, false, Sle) => 1,
        (1, false, Ne) | (1, false, Slt) => 0,
        (-1, false, Sge) => -1,
        (-1, false, Ne) | (-1, false, Sgt) => 0,
        (1, true, Sgt) => 1,
        (1, true, Sge) | (1, true, Eq) => 0,
        (-1, true, Slt) => -1,
        (-1, true, Sle) | (-1, true, Eq) => 0,
        _ => return None,
    };
    Some(offset)
}

/// Whether the comparison's end value is fixed with respect to the SCC: a
/// constant, a value defined outside the SCC, or a short chain of
/// side-effect-free instructions bottoming out outside it.
fn end_value_is_fixed(func: &Function, scc: &Scc, v: ValueId, depth: usize) -> bool {
    if depth > 8 {
        return false;
    }
    match func.value(v) {
        Value::ConstInt(_) | Value::ConstFp(_) | Value::Argument { .. } | Value::Global { .. } => {
            true
        }
        Value::Instr(inst) => {
            if !scc.is_internal(v) {
                return true;
            }
            match inst.opcode {
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Cast | Opcode::GetElementPtr => {
                    inst.operands.iter().all(|&op| end_value_is_fixed(func, scc, op, depth + 1))
                }
                _ => false,
            }
        }
    }
}

/// Render an SCC's members for diagnostics.
pub(crate) fn describe_scc(func: &Function, scc: &Scc) -> String {
    let names: Vec<String> = scc.internal_values().map(|v| func.describe(v)).collect();
    format!("{{{}}}", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::loops::DominatorSummary;
    use crate::analysis::pdg::Pdg;
    use crate::ir::{BlockId, FunctionBuilder, ScalarType};

    /// A conditional branch whose successors both stay in the loop pins
    /// nothing about the exit, so no bounds are derived from it.
    #[test]
    fn test_branch_with_both_successors_in_loop_yields_no_bounds() {
        let mut f = FunctionBuilder::new("inner_branch");
        let n = f.argument("n", ScalarType::Int);
        let zero = f.const_int(0);
        let one = f.const_int(1);

        let entry = f.block("entry");
        let header = BlockId(1);
        let body = BlockId(2);
        let exit = BlockId(3);
        f.br(header);

        f.block("header");
        let i = f.phi("i", vec![(zero, entry)], ScalarType::Int);
        let i_next = f.add("i.next", i, one, ScalarType::Int);
        let c = f.cmp("c", Predicate::Slt, i_next, n);
        let br = f.cond_br(c, body, header);
        f.set_phi_incoming(i, vec![(zero, entry), (i_next, body)]);

        f.block("body");
        let c2 = f.cmp("c2", Predicate::Slt, i_next, n);
        f.cond_br(c2, header, exit);

        f.block("exit");
        f.ret();
        let func = f.build();

        let doms = DominatorSummary::compute(&func);
        let loops = LoopsSummary::compute(&func, &doms);
        let loop_id = loops.loop_of_block(header).expect("loop");

        let pdg = Pdg::from_function(&func);
        let members = vec![pdg.node_of(i).unwrap(), pdg.node_of(i_next).unwrap()];
        let scc = Scc::from_pdg(&pdg, &members);

        let bounds =
            derive_fixed_iv_bounds(&func, &loops, &scc, loop_id, &[i], &[i_next], c, br)
                .unwrap();
        assert!(bounds.is_none());
    }

    #[test]
    fn test_end_offset_table() {
        use Predicate::*;
        assert_eq!(end_offset_for(1, false, Sle), Some(1));
        assert_eq!(end_offset_for(1, false, Slt), Some(0));
        assert_eq!(end_offset_for(1, false, Ne), Some(0));
        assert_eq!(end_offset_for(-1, false, Sge), Some(-1));
        assert_eq!(end_offset_for(-1, false, Sgt), Some(0));
        assert_eq!(end_offset_for(1, true, Sgt), Some(1));
        assert_eq!(end_offset_for(1, true, Eq), Some(0));
        assert_eq!(end_offset_for(-1, true, Slt), Some(-1));
        assert_eq!(end_offset_for(-1, true, Sle), Some(0));
        // Combinations the table does not recognize.
        assert_eq!(end_offset_for(1, false, Sgt), None);
        assert_eq!(end_offset_for(-1, true, Sge), None);
        assert_eq!(end_offset_for(1, true, Slt), None);
    }
}
