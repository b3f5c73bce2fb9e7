//! Core data model for the codeforge module builder.
//!
//! This crate holds everything the builder surface and the compiler share:
//! hash-based identity ([`TypeHash`]), semantic types ([`DataType`] and the
//! catalog [`builtins`]), exact decimals ([`Decimal`]), visibility and
//! modifier flags, accumulating descriptors, and the error hierarchy.

mod data_type;
mod decimal;
mod descriptor;
mod error;
mod type_hash;
mod visibility;

pub use data_type::{DataType, builtins};
pub use decimal::{Decimal, DecimalParseError};
pub use descriptor::{
    DelegateSig, EventDef, FieldDef, IndexerDef, MethodDef, MethodKind, ParamDef, TypeDef,
    TypeKind,
};
pub use error::{BuildError, FinalizeError, LoadError, RuntimeError};
pub use type_hash::{TypeHash, hash_constants};
pub use visibility::{Modifiers, Visibility};
