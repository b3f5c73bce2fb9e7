//! Compilation layer: symbol registry, operand checking, body
//! compilation, and module assembly.
//!
//! The builder surface crate drives this one. Declarations land in the
//! [`registry::SymbolRegistry`]; expressions are checked into
//! [`operand::Operand`] trees; statement calls stream through a
//! [`body::BodyCompiler`] into bytecode; and a [`module::ModuleBuilder`]
//! finalizes everything into a [`module::CompiledModule`] for a
//! [`module::ModuleSink`].

pub mod body;
pub mod bytecode;
pub mod module;
pub mod operand;
pub mod registry;
pub mod resolve;
pub mod scope;

pub use body::{BodyCompiler, BodyContext, CompiledBody, HOST_WRITE_LINE};
pub use bytecode::{Chunk, Constant, ConstantPool, OpCode};
pub use module::{CompiledModule, ModuleBuilder, ModuleSink};
pub use operand::{BinOp, Callee, DelegateTarget, Literal, Operand};
pub use registry::SymbolRegistry;
pub use resolve::ReceiverKind;
