//! IR value model consumed by the dependence analysis.

pub mod value;

pub use value::{
    BasicBlock, BlockId, Function, FunctionBuilder, Instruction, Opcode, Predicate, ScalarType,
    Value, ValueId,
};
