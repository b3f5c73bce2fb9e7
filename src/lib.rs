//! Fluent builder DSL for compiled object-graph modules.
//!
//! A [`ModuleGen`] declares types, fields, methods, events, and delegates;
//! each opened body hands back a [`CodeGen`] whose statement calls compile
//! straight to bytecode. Finalizing the module pushes the frozen result
//! through a [`ModuleSink`] such as the interpreter in `codeforge-vm`.
//!
//! ```no_run
//! use codeforge::{DataType, ModuleGen};
//!
//! # fn main() -> Result<(), codeforge::BuildError> {
//! let mut m = ModuleGen::new("demo");
//! let app = m.declare_class("App")?;
//! let mut g = m.begin_static_method(app, "run", vec![], DataType::void())?;
//! g.write_line("hello from {0}", vec!["codeforge".into()])?;
//! g.ret_void()?;
//! g.finish()?;
//! # Ok(())
//! # }
//! ```

mod code_gen;
mod module_gen;

pub use code_gen::CodeGen;
pub use module_gen::{ModuleGen, NamespaceGuard};

pub use codeforge_compiler::{
    BinOp, Callee, CompiledBody, CompiledModule, DelegateTarget, ModuleSink, Operand,
    operand::null,
};
pub use codeforge_core::{
    BuildError, DataType, Decimal, DecimalParseError, FinalizeError, LoadError, MethodKind,
    Modifiers, ParamDef, RuntimeError, TypeHash, TypeKind, Visibility, builtins,
};
