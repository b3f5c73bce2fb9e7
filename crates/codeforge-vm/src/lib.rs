//! Reference execution target for compiled modules.
//!
//! This crate supplies the [`VmSink`] module sink and the [`Vm`] stack
//! interpreter behind it. It exists so module construction can be tested
//! end to end: build, finalize into a `Vm`, run, and assert on returned
//! values and host output.

mod value;
mod vm;

pub use value::{
    DelegateEntry, DelegateValue, ObjectData, Value, delegate_combine, delegate_remove,
    identity_eq, value_eq,
};
pub use vm::{Vm, VmSink};
