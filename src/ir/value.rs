//! Minimal IR value model.
//!
//! The analyzer does not build or mutate IR; it only inspects the facets of
//! instructions that classification needs:
//! - PHI nodes and their incoming (value, block) pairs
//! - accumulator opcodes (add, sub, mul) and their operands
//! - comparisons and their predicates
//! - branch terminators and their successor blocks
//!
//! Values live in a per-function arena and are referred to by `ValueId`.

use serde::{Serialize, Deserialize};

/// A unique identifier for a value within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A unique identifier for a basic block within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Scalar type of a value, selecting integer or floating reduction ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Int,
    Fp,
}

/// Comparison predicate.
///
/// Unsigned forms normalize to their signed counterparts before the
/// fixed-IV-bounds table is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl Predicate {
    /// Map unsigned predicates to the signed predicate with the same shape.
    pub fn signed(self) -> Predicate {
        match self {
            Predicate::Ult => Predicate::Slt,
            Predicate::Ule => Predicate::Sle,
            Predicate::Ugt => Predicate::Sgt,
            Predicate::Uge => Predicate::Sge,
            p => p,
        }
    }

    /// The predicate obtained by swapping the comparison operands.
    pub fn swapped(self) -> Predicate {
        match self {
            Predicate::Slt => Predicate::Sgt,
            Predicate::Sle => Predicate::Sge,
            Predicate::Sgt => Predicate::Slt,
            Predicate::Sge => Predicate::Sle,
            Predicate::Ult => Predicate::Ugt,
            Predicate::Ule => Predicate::Uge,
            Predicate::Ugt => Predicate::Ult,
            Predicate::Uge => Predicate::Ule,
            p => p,
        }
    }
}

/// Instruction opcode.
///
/// For `Phi`, `operands` on the instruction are the incoming values and the
/// opcode carries the matching incoming blocks (paired by index). For `Br`,
/// `operands` holds the condition (if conditional) and the opcode carries the
/// successor blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Opcode {
    Phi { blocks: Vec<BlockId> },
    Add,
    Sub,
    Mul,
    Cmp(Predicate),
    Br { succs: Vec<BlockId> },
    GetElementPtr,
    Cast,
    Load,
    Store,
    Call,
    Ret,
}

impl Opcode {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Br { .. } | Opcode::Ret)
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Opcode::Phi { .. })
    }

    pub fn is_cmp(&self) -> bool {
        matches!(self, Opcode::Cmp(_))
    }

    /// Opcode mnemonic, for diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Phi { .. } => "phi",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Cmp(_) => "cmp",
            Opcode::Br { .. } => "br",
            Opcode::GetElementPtr => "getelementptr",
            Opcode::Cast => "cast",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
        }
    }
}

/// An instruction: opcode, operands, parent block, result type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Human-readable name (for diagnostics and reports)
    pub name: String,
    /// The opcode, with per-opcode payload
    pub opcode: Opcode,
    /// Operand values. For PHIs these are the incoming values.
    pub operands: Vec<ValueId>,
    /// Parent basic block
    pub block: BlockId,
    /// Result type
    pub ty: ScalarType,
}

impl Instruction {
    /// Incoming (value, block) pairs of a PHI, empty for other opcodes.
    pub fn phi_incoming(&self) -> Vec<(ValueId, BlockId)> {
        match &self.opcode {
            Opcode::Phi { blocks } => self
                .operands
                .iter()
                .copied()
                .zip(blocks.iter().copied())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Successor blocks of a terminator, empty for non-terminators.
    pub fn successors(&self) -> &[BlockId] {
        match &self.opcode {
            Opcode::Br { succs } => succs,
            _ => &[],
        }
    }

    /// Condition value of a conditional branch.
    pub fn branch_condition(&self) -> Option<ValueId> {
        match &self.opcode {
            Opcode::Br { succs } if succs.len() > 1 => self.operands.first().copied(),
            _ => None,
        }
    }
}

/// A value: an instruction or a reference external to the function body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Instr(Instruction),
    Argument { name: String, ty: ScalarType },
    Global { name: String },
    ConstInt(i64),
    ConstFp(f64),
}

impl Value {
    pub fn as_instr(&self) -> Option<&Instruction> {
        match self {
            Value::Instr(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn is_instr(&self) -> bool {
        matches!(self, Value::Instr(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Value::ConstInt(_) | Value::ConstFp(_))
    }

    /// Human-readable name, for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Value::Instr(inst) => format!("%{}", inst.name),
            Value::Argument { name, .. } => format!("%{}", name),
            Value::Global { name } => format!("@{}", name),
            Value::ConstInt(c) => c.to_string(),
            Value::ConstFp(c) => c.to_string(),
        }
    }
}

/// A basic block: an ordered list of instructions, the last one a terminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub name: String,
    pub instrs: Vec<ValueId>,
}

/// A function: a value arena plus its basic blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub values: Vec<Value>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl Function {
    pub fn value(&self, v: ValueId) -> &Value {
        &self.values[v.0 as usize]
    }

    pub fn instr(&self, v: ValueId) -> Option<&Instruction> {
        self.value(v).as_instr()
    }

    pub fn is_instruction(&self, v: ValueId) -> bool {
        self.value(v).is_instr()
    }

    pub fn block(&self, b: BlockId) -> &BasicBlock {
        &self.blocks[b.0 as usize]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// All block ids, in layout order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// Instruction ids of the function, in block layout order.
    pub fn instruction_ids(&self) -> Vec<ValueId> {
        self.blocks.iter().flat_map(|b| b.instrs.iter().copied()).collect()
    }

    /// Parent block of an instruction value.
    pub fn block_of(&self, v: ValueId) -> Option<BlockId> {
        self.instr(v).map(|i| i.block)
    }

    /// Position of an instruction within its block.
    pub fn position_in_block(&self, v: ValueId) -> Option<usize> {
        let block = self.block_of(v)?;
        self.block(block).instrs.iter().position(|&i| i == v)
    }

    /// Terminator instruction of a block, if the block is non-empty.
    pub fn terminator_of(&self, b: BlockId) -> Option<ValueId> {
        self.block(b).instrs.last().copied()
    }

    /// CFG successors of a block.
    pub fn successors_of(&self, b: BlockId) -> &[BlockId] {
        match self.terminator_of(b).and_then(|t| self.instr(t)) {
            Some(inst) => inst.successors(),
            None => &[],
        }
    }

    /// Human-readable name of a value, for diagnostics.
    pub fn describe(&self, v: ValueId) -> String {
        self.value(v).describe()
    }
}

/// Builder for constructing functions in tests and frontends.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    values: Vec<Value>,
    blocks: Vec<BasicBlock>,
    current: Option<BlockId>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            blocks: Vec::new(),
            current: None,
        }
    }

    pub fn argument(&mut self, name: impl Into<String>, ty: ScalarType) -> ValueId {
        self.push_value(Value::Argument { name: name.into(), ty })
    }

    pub fn global(&mut self, name: impl Into<String>) -> ValueId {
        self.push_value(Value::Global { name: name.into() })
    }

    pub fn const_int(&mut self, c: i64) -> ValueId {
        self.push_value(Value::ConstInt(c))
    }

    pub fn const_fp(&mut self, c: f64) -> ValueId {
        self.push_value(Value::ConstFp(c))
    }

    /// Open a new basic block; subsequent instructions land in it.
    pub fn block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock { name: name.into(), instrs: Vec::new() });
        self.current = Some(id);
        id
    }

    /// Append an instruction to the current block.
    pub fn instr(
        &mut self,
        name: impl Into<String>,
        opcode: Opcode,
        operands: Vec<ValueId>,
        ty: ScalarType,
    ) -> ValueId {
        let block = self.current.expect("no open block");
        let id = self.push_value(Value::Instr(Instruction {
            name: name.into(),
            opcode,
            operands,
            block,
            ty,
        }));
        self.blocks[block.0 as usize].instrs.push(id);
        id
    }

    pub fn phi(
        &mut self,
        name: impl Into<String>,
        incoming: Vec<(ValueId, BlockId)>,
        ty: ScalarType,
    ) -> ValueId {
        let (operands, blocks): (Vec<_>, Vec<_>) = incoming.into_iter().unzip();
        self.instr(name, Opcode::Phi { blocks }, operands, ty)
    }

    /// Rewire a PHI's incoming values after the fact, for forward references
    /// to values defined later in the loop body.
    pub fn set_phi_incoming(&mut self, phi: ValueId, incoming: Vec<(ValueId, BlockId)>) {
        let (operands, blocks): (Vec<_>, Vec<_>) = incoming.into_iter().unzip();
        if let Value::Instr(inst) = &mut self.values[phi.0 as usize] {
            inst.operands = operands;
            inst.opcode = Opcode::Phi { blocks };
        }
    }

    pub fn add(&mut self, name: impl Into<String>, a: ValueId, b: ValueId, ty: ScalarType) -> ValueId {
        self.instr(name, Opcode::Add, vec![a, b], ty)
    }

    pub fn sub(&mut self, name: impl Into<String>, a: ValueId, b: ValueId, ty: ScalarType) -> ValueId {
        self.instr(name, Opcode::Sub, vec![a, b], ty)
    }

    pub fn mul(&mut self, name: impl Into<String>, a: ValueId, b: ValueId, ty: ScalarType) -> ValueId {
        self.instr(name, Opcode::Mul, vec![a, b], ty)
    }

    pub fn cmp(&mut self, name: impl Into<String>, pred: Predicate, a: ValueId, b: ValueId) -> ValueId {
        self.instr(name, Opcode::Cmp(pred), vec![a, b], ScalarType::Int)
    }

    pub fn br(&mut self, target: BlockId) -> ValueId {
        self.instr("br", Opcode::Br { succs: vec![target] }, vec![], ScalarType::Int)
    }

    pub fn cond_br(&mut self, cond: ValueId, then_bb: BlockId, else_bb: BlockId) -> ValueId {
        self.instr(
            "br",
            Opcode::Br { succs: vec![then_bb, else_bb] },
            vec![cond],
            ScalarType::Int,
        )
    }

    pub fn ret(&mut self) -> ValueId {
        self.instr("ret", Opcode::Ret, vec![], ScalarType::Int)
    }

    pub fn build(self) -> Function {
        Function {
            name: self.name,
            values: self.values,
            blocks: self.blocks,
            entry: BlockId(0),
        }
    }

    fn push_value(&mut self, value: Value) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(value);
        id
    }
}
