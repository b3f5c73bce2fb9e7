//! Unified error types for module construction, loading, and execution.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BuildError    - eager validation failures raised by builder calls
//! LoadError     - module sink rejections (opaque, unrecoverable)
//! RuntimeError  - execution failures inside a loaded module
//! FinalizeError - BuildError or LoadError surfaced by finalization
//! ```
//!
//! Every `BuildError` is detected at the offending builder call; only
//! `IncompleteBody` is deferred to finalization, because an abandoned body
//! is observable only once the whole graph is walked. Nothing is retried
//! or locally recovered: these are caller logic errors, and a caller that
//! continues building after one owns the partially built module's
//! consistency.

use thiserror::Error;

// ============================================================================
// Build Errors
// ============================================================================

/// Errors raised eagerly by builder calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// Member name/arity not found on the resolved receiver type chain.
    #[error("unresolved member '{name}' on {receiver}")]
    UnresolvedMember {
        /// The member name that failed to resolve.
        name: String,
        /// Description of the receiver type or kind.
        receiver: String,
    },

    /// More than one equally applicable overload.
    #[error("ambiguous call to '{name}': {count} equally applicable overloads")]
    AmbiguousMember {
        /// The member name.
        name: String,
        /// How many overloads tied.
        count: usize,
    },

    /// Assignment, operator, or argument type incompatibility.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// What was incompatible with what.
        message: String,
    },

    /// Assignment target is not addressable.
    #[error("assignment target is not addressable: {target}")]
    NotAssignable {
        /// Description of the rejected target operand.
        target: String,
    },

    /// Self/base reference or event operation used outside a valid context.
    #[error("invalid context: {message}")]
    InvalidContext {
        /// Why the construct is invalid here.
        message: String,
    },

    /// Control-construct close without a matching open.
    #[error("unbalanced scope: {message}")]
    UnbalancedScope {
        /// Which close was mismatched.
        message: String,
    },

    /// Finalization attempted while a member body is unfinished.
    #[error("incomplete body for '{member}'")]
    IncompleteBody {
        /// The member whose body was never completed.
        member: String,
    },

    /// Non-overloadable member name collision within a type.
    #[error("duplicate member '{name}' on type '{owner}'")]
    DuplicateMember {
        /// The colliding member name (or signature rendering).
        name: String,
        /// The owning type name.
        owner: String,
    },

    /// A local variable with this name already exists in the current scope.
    #[error("duplicate local '{name}' in the current scope")]
    DuplicateLocal {
        /// The colliding local name.
        name: String,
    },

    /// A type with this qualified name already exists in the module.
    #[error("duplicate type '{0}'")]
    DuplicateType(String),

    /// A referenced type is not registered.
    #[error("unknown type {0}")]
    UnknownType(String),
}

// ============================================================================
// Load Errors
// ============================================================================

/// Module sink rejection. Opaque to the builder and unrecoverable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The module references a body that was never emitted.
    #[error("missing body for function {0:#x}")]
    MissingBody(u64),

    /// Target-specific rejection.
    #[error("module rejected by sink: {0}")]
    Rejected(String),
}

// ============================================================================
// Finalize Errors
// ============================================================================

/// Error surfaced by module finalization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FinalizeError {
    /// Graph validation failed (e.g. an incomplete body).
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The module sink rejected the finished module.
    #[error(transparent)]
    Load(#[from] LoadError),
}

// ============================================================================
// Runtime Errors
// ============================================================================

/// Execution failures inside a loaded module.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// No function with this hash is loaded.
    #[error("unknown function {0:#x}")]
    UnknownFunction(u64),

    /// The value stack underflowed (malformed bytecode).
    #[error("stack underflow")]
    StackUnderflow,

    /// An instruction met an operand of the wrong runtime kind.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    /// A null reference was dereferenced or invoked.
    #[error("null reference: {0}")]
    NullReference(String),

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Malformed or truncated bytecode.
    #[error("malformed bytecode at offset {0}")]
    MalformedBytecode(usize),
}
