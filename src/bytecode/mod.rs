pub mod codec;
pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod stack_check;

pub use ir::{BytecodeFunction, BytecodeProgram, Chunk, DecodeError, Instruction, Operand};
pub use op::{Opcode, stack_effect};
