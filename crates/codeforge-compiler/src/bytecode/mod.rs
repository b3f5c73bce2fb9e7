//! Bytecode representation: opcodes, chunks, and the constant pool.

mod chunk;
mod constant;
mod opcode;

pub use chunk::Chunk;
pub use constant::{Constant, ConstantPool};
pub use opcode::OpCode;
