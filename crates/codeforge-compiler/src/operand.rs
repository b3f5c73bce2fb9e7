//! Typed expression operands.
//!
//! An [`Operand`] is a checked expression node: every constructor resolves
//! names and verifies types eagerly, so holding an `Operand` means the
//! expression is well-formed. Implicit widenings discovered during
//! checking are reified as [`Operand::Convert`] nodes, which lets emission
//! stay a mechanical tree walk with no registry lookups.

use codeforge_core::{BuildError, DataType, Decimal, TypeHash, TypeKind, builtins};

use crate::registry::SymbolRegistry;
use crate::resolve::{self, MemberRef, ReceiverKind};

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Decimal(Decimal),
    Str(String),
}

impl Literal {
    pub fn data_type(&self) -> DataType {
        let hash = match self {
            Literal::Null => builtins::NULL,
            Literal::Bool(_) => builtins::BOOL,
            Literal::Int32(_) => builtins::INT32,
            Literal::Int64(_) => builtins::INT64,
            Literal::Float64(_) => builtins::FLOAT64,
            Literal::Decimal(_) => builtins::DECIMAL,
            Literal::Str(_) => builtins::STRING,
        };
        DataType::new(hash)
    }
}

/// Binary operators after checking.
///
/// `Add`/`Sub` on delegate operands are rewritten to the delegate algebra
/// operators during construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    DelegateCombine,
    DelegateRemove,
}

impl BinOp {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// A checked expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Literal),
    /// A local variable or parameter slot.
    Local { slot: u32, data_type: DataType },
    /// A parameter reference (same frame slots as locals).
    Arg { slot: u32, data_type: DataType },
    /// The current instance.
    This { data_type: DataType },
    /// The current instance viewed as its base type.
    BaseRef { data_type: DataType },
    /// An instance or static field.
    Field {
        /// `None` for static fields.
        receiver: Option<Box<Operand>>,
        slot: u32,
        is_static: bool,
        data_type: DataType,
    },
    /// An event's backing delegate field, visible only inside the owner.
    EventBacking {
        receiver: Box<Operand>,
        slot: u32,
        data_type: DataType,
    },
    /// `receiver[index]` through a declared or catalog indexer.
    Index {
        receiver: Box<Operand>,
        index: Box<Operand>,
        getter: Option<TypeHash>,
        setter: Option<TypeHash>,
        data_type: DataType,
    },
    Binary {
        op: BinOp,
        lhs: Box<Operand>,
        rhs: Box<Operand>,
        data_type: DataType,
    },
    /// Arithmetic negation.
    Negate {
        value: Box<Operand>,
        data_type: DataType,
    },
    /// Boolean negation.
    Not { value: Box<Operand> },
    /// An implicit widening inserted during checking.
    Convert {
        value: Box<Operand>,
        data_type: DataType,
    },
    /// A method call; arguments are already coerced.
    Call {
        /// `None` for static calls.
        receiver: Option<Box<Operand>>,
        method: TypeHash,
        args: Vec<Operand>,
        data_type: DataType,
    },
    /// An object construction expression.
    New {
        ctor: TypeHash,
        args: Vec<Operand>,
        data_type: DataType,
    },
    /// A delegate construction expression.
    NewDelegate {
        /// Bound receiver, captured at construction; `None` for static
        /// targets.
        receiver: Option<Box<Operand>>,
        method: TypeHash,
        data_type: DataType,
    },
}

impl Operand {
    /// Static type of the expression.
    pub fn data_type(&self) -> DataType {
        match self {
            Operand::Literal(lit) => lit.data_type(),
            Operand::Local { data_type, .. }
            | Operand::Arg { data_type, .. }
            | Operand::This { data_type }
            | Operand::BaseRef { data_type }
            | Operand::Field { data_type, .. }
            | Operand::EventBacking { data_type, .. }
            | Operand::Index { data_type, .. }
            | Operand::Binary { data_type, .. }
            | Operand::Negate { data_type, .. }
            | Operand::Convert { data_type, .. }
            | Operand::Call { data_type, .. }
            | Operand::New { data_type, .. }
            | Operand::NewDelegate { data_type, .. } => *data_type,
            Operand::Not { .. } => DataType::new(builtins::BOOL),
        }
    }

    /// Whether the expression designates a storage location.
    ///
    /// Only locals, parameters, fields, event backings, and indexer
    /// elements are assignable; literals and computed values are not.
    pub fn is_addressable(&self) -> bool {
        matches!(
            self,
            Operand::Local { .. }
                | Operand::Arg { .. }
                | Operand::Field { .. }
                | Operand::EventBacking { .. }
                | Operand::Index { .. }
        )
    }

    /// Short rendering for error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Operand::Literal(_) => "a literal",
            Operand::Local { .. } => "a local",
            Operand::Arg { .. } => "a parameter",
            Operand::This { .. } => "'this'",
            Operand::BaseRef { .. } => "'base'",
            Operand::Field { .. } => "a field",
            Operand::EventBacking { .. } => "an event backing",
            Operand::Index { .. } => "an indexed element",
            Operand::Binary { .. } => "an operator result",
            Operand::Negate { .. } | Operand::Not { .. } => "an operator result",
            Operand::Convert { .. } => "a converted value",
            Operand::Call { .. } => "a call result",
            Operand::New { .. } => "a construction result",
            Operand::NewDelegate { .. } => "a delegate construction",
        }
    }

    /// Receiver kind for member resolution through this expression.
    fn receiver_kind(&self) -> ReceiverKind {
        match self {
            Operand::This { data_type } => ReceiverKind::SelfRef(data_type.hash),
            Operand::BaseRef { data_type } => ReceiverKind::Base(data_type.hash),
            other => ReceiverKind::Instance(other.data_type()),
        }
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Literal(Literal::Int32(value))
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Literal(Literal::Int64(value))
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Literal(Literal::Float64(value))
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Literal(Literal::Bool(value))
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Literal(Literal::Str(value.into()))
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::Literal(Literal::Str(value))
    }
}

impl From<Decimal> for Operand {
    fn from(value: Decimal) -> Self {
        Operand::Literal(Literal::Decimal(value))
    }
}

/// The `null` literal.
pub fn null() -> Operand {
    Operand::Literal(Literal::Null)
}

/// What a call dispatches through.
#[derive(Debug, Clone)]
pub enum Callee {
    Instance(Operand),
    Static(TypeHash),
}

impl Callee {
    fn receiver_kind(&self) -> ReceiverKind {
        match self {
            Callee::Instance(receiver) => receiver.receiver_kind(),
            Callee::Static(hash) => ReceiverKind::Static(*hash),
        }
    }
}

/// The target a delegate construction binds to.
#[derive(Debug, Clone)]
pub enum DelegateTarget {
    /// A static method of `owner`.
    Static { owner: TypeHash, method: String },
    /// An instance method; the receiver is captured now, not at dispatch.
    Instance { receiver: Operand, method: String },
}

// =============================================================================
// Checked Constructors
// =============================================================================

/// Coerce a value into a slot of the given type, inserting a conversion
/// node when the value widens.
pub fn coerce(
    registry: &SymbolRegistry,
    value: Operand,
    target: DataType,
) -> Result<Operand, BuildError> {
    let from = value.data_type();
    if from == target {
        return Ok(value);
    }
    if !registry.is_assignable(from, target) {
        return Err(BuildError::TypeMismatch {
            message: format!("cannot convert {from} to {target}"),
        });
    }
    if from.widens_to(target) {
        return Ok(Operand::Convert {
            value: Box::new(value),
            data_type: target,
        });
    }
    // Reference upcasts and null literals need no representation change.
    Ok(value)
}

/// Build a checked binary operation.
///
/// `Add` and `Sub` on delegate operands become the delegate combine and
/// remove operators; combining or removing a null literal folds away at
/// build time, matching the runtime algebra.
pub fn binary(
    registry: &SymbolRegistry,
    op: BinOp,
    lhs: Operand,
    rhs: Operand,
) -> Result<Operand, BuildError> {
    let lt = lhs.data_type();
    let rt = rhs.data_type();

    if matches!(op, BinOp::Add | BinOp::Sub)
        && (registry.is_delegate(lt.hash) || registry.is_delegate(rt.hash))
    {
        return delegate_binary(registry, op, lhs, rhs);
    }

    if op.is_comparison() {
        return comparison(registry, op, lhs, rhs);
    }

    let promoted = registry
        .promote(lt, rt)
        .ok_or_else(|| BuildError::TypeMismatch {
            message: format!("operator {op:?} is not defined for {lt} and {rt}"),
        })?;
    if op == BinOp::Mod && !promoted.is_integer() {
        return Err(BuildError::TypeMismatch {
            message: format!("operator Mod requires integer operands, got {lt} and {rt}"),
        });
    }

    Ok(Operand::Binary {
        op,
        lhs: Box::new(coerce(registry, lhs, promoted)?),
        rhs: Box::new(coerce(registry, rhs, promoted)?),
        data_type: promoted,
    })
}

fn delegate_binary(
    registry: &SymbolRegistry,
    op: BinOp,
    lhs: Operand,
    rhs: Operand,
) -> Result<Operand, BuildError> {
    let lt = lhs.data_type();
    let rt = rhs.data_type();

    // Null folds: combining with null yields the other operand; removing
    // null (or removing from null) changes nothing.
    if rt.is_null() {
        return Ok(lhs);
    }
    if lt.is_null() {
        return match op {
            BinOp::Add => Ok(rhs),
            _ => Ok(lhs),
        };
    }

    if lt != rt {
        return Err(BuildError::TypeMismatch {
            message: format!("delegate operands must share a type, got {lt} and {rt}"),
        });
    }

    let op = match op {
        BinOp::Add => BinOp::DelegateCombine,
        _ => BinOp::DelegateRemove,
    };
    Ok(Operand::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        data_type: lt,
    })
}

fn comparison(
    registry: &SymbolRegistry,
    op: BinOp,
    lhs: Operand,
    rhs: Operand,
) -> Result<Operand, BuildError> {
    let lt = lhs.data_type();
    let rt = rhs.data_type();
    let bool_type = DataType::new(builtins::BOOL);

    if let Some(promoted) = registry.promote(lt, rt) {
        return Ok(Operand::Binary {
            op,
            lhs: Box::new(coerce(registry, lhs, promoted)?),
            rhs: Box::new(coerce(registry, rhs, promoted)?),
            data_type: bool_type,
        });
    }

    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let comparable = (lt.is_bool() && rt.is_bool())
            || lt == rt
            || (lt.is_null() && registry.is_assignable(rt, DataType::new(builtins::OBJECT)))
            || (rt.is_null() && registry.is_assignable(lt, DataType::new(builtins::OBJECT)))
            || registry.is_assignable(lt, rt)
            || registry.is_assignable(rt, lt);
        if comparable && !lt.is_numeric() && !rt.is_numeric() {
            return Ok(Operand::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                data_type: bool_type,
            });
        }
    }

    Err(BuildError::TypeMismatch {
        message: format!("operator {op:?} is not defined for {lt} and {rt}"),
    })
}

/// Arithmetic negation.
pub fn negate(value: Operand) -> Result<Operand, BuildError> {
    let data_type = value.data_type();
    if !data_type.is_numeric() {
        return Err(BuildError::TypeMismatch {
            message: format!("cannot negate {data_type}"),
        });
    }
    Ok(Operand::Negate {
        value: Box::new(value),
        data_type,
    })
}

/// Boolean negation.
pub fn logical_not(value: Operand) -> Result<Operand, BuildError> {
    let data_type = value.data_type();
    if !data_type.is_bool() {
        return Err(BuildError::TypeMismatch {
            message: format!("operator Not requires bool, got {data_type}"),
        });
    }
    Ok(Operand::Not {
        value: Box::new(value),
    })
}

/// Access a field (or, inside the owner, an event backing) through an
/// instance expression.
///
/// `owner_ctx` is the type whose body is being compiled; event backings
/// resolve only when it matches the event's declaring type.
pub fn field_access(
    registry: &SymbolRegistry,
    owner_ctx: Option<TypeHash>,
    receiver: Operand,
    name: &str,
) -> Result<Operand, BuildError> {
    let kind = receiver.receiver_kind();
    match resolve::resolve_member(registry, &kind, name)? {
        MemberRef::Field { field, .. } => Ok(Operand::Field {
            receiver: Some(Box::new(receiver)),
            slot: field.slot,
            is_static: false,
            data_type: field.data_type,
        }),
        MemberRef::Event { owner, event } => {
            if owner_ctx != Some(owner.type_hash) {
                return Err(BuildError::InvalidContext {
                    message: format!(
                        "event '{}' is only accessible inside '{}'",
                        event.name, owner.name
                    ),
                });
            }
            let backing = owner
                .find_field_by_hash(event.backing_field)
                .ok_or_else(|| BuildError::UnknownType(event.backing_field.to_string()))?;
            Ok(Operand::EventBacking {
                receiver: Box::new(receiver),
                slot: backing.slot,
                data_type: backing.data_type,
            })
        }
    }
}

/// Access a static field by owner type and name.
pub fn static_field_access(
    registry: &SymbolRegistry,
    owner: TypeHash,
    name: &str,
) -> Result<Operand, BuildError> {
    let kind = ReceiverKind::Static(owner);
    match resolve::resolve_member(registry, &kind, name)? {
        MemberRef::Field { field, .. } => Ok(Operand::Field {
            receiver: None,
            slot: field.slot,
            is_static: true,
            data_type: field.data_type,
        }),
        MemberRef::Event { event, .. } => Err(BuildError::InvalidContext {
            message: format!("event '{}' cannot be accessed as a static field", event.name),
        }),
    }
}

/// Build an indexer access: `receiver[index]`.
pub fn index_access(
    registry: &SymbolRegistry,
    receiver: Operand,
    index: Operand,
) -> Result<Operand, BuildError> {
    let indexer = resolve::resolve_indexer(registry, receiver.data_type().hash)?;
    let index = coerce(registry, index, indexer.index_type)?;
    Ok(Operand::Index {
        receiver: Box::new(receiver),
        index: Box::new(index),
        getter: indexer.getter,
        setter: indexer.setter,
        data_type: indexer.element_type,
    })
}

/// Build a checked method call.
pub fn call(
    registry: &SymbolRegistry,
    callee: Callee,
    name: &str,
    args: Vec<Operand>,
) -> Result<Operand, BuildError> {
    let kind = callee.receiver_kind();
    let arg_types: Vec<DataType> = args.iter().map(Operand::data_type).collect();
    let method = resolve::resolve_method(registry, &kind, name, &arg_types)?;
    let method_hash = method.method_hash;
    let return_type = method.return_type;
    let param_types: Vec<DataType> = method.params.iter().map(|p| p.data_type).collect();

    let args = coerce_args(registry, args, &param_types)?;
    let receiver = match callee {
        Callee::Instance(receiver) => Some(Box::new(receiver)),
        Callee::Static(_) => None,
    };
    Ok(Operand::Call {
        receiver,
        method: method_hash,
        args,
        data_type: return_type,
    })
}

/// Build an object construction expression.
pub fn new_object(
    registry: &SymbolRegistry,
    type_hash: TypeHash,
    args: Vec<Operand>,
) -> Result<Operand, BuildError> {
    let arg_types: Vec<DataType> = args.iter().map(Operand::data_type).collect();
    let resolved = resolve::resolve_ctor(registry, type_hash, &arg_types)?;
    let args = coerce_args(registry, args, &resolved.param_types)?;
    Ok(Operand::New {
        ctor: resolved.method_hash,
        args,
        data_type: DataType::new(type_hash),
    })
}

/// Build a delegate construction expression.
///
/// The target method must match the delegate's invocation signature: it
/// must accept the signature's parameter types, and return exactly the
/// signature's return type.
pub fn new_delegate(
    registry: &SymbolRegistry,
    delegate_type: TypeHash,
    target: DelegateTarget,
) -> Result<Operand, BuildError> {
    let def = registry.expect(delegate_type)?;
    if def.kind != TypeKind::Delegate {
        return Err(BuildError::TypeMismatch {
            message: format!("'{}' is not a delegate type", def.name),
        });
    }
    let sig = def
        .delegate_sig
        .as_ref()
        .ok_or_else(|| BuildError::UnknownType(def.name.clone()))?;
    let sig_params: Vec<DataType> = sig.params.iter().map(|p| p.data_type).collect();
    let sig_return = sig.return_type;
    let delegate_name = def.name.clone();

    let (kind, method_name, receiver) = match target {
        DelegateTarget::Static { owner, method } => (ReceiverKind::Static(owner), method, None),
        DelegateTarget::Instance { receiver, method } => {
            (receiver.receiver_kind(), method, Some(Box::new(receiver)))
        }
    };

    let method = resolve::resolve_method(registry, &kind, &method_name, &sig_params)?;
    if method.return_type != sig_return {
        return Err(BuildError::TypeMismatch {
            message: format!(
                "method '{}' returns {}, but delegate '{}' returns {}",
                method.name, method.return_type, delegate_name, sig_return
            ),
        });
    }

    Ok(Operand::NewDelegate {
        receiver,
        method: method.method_hash,
        data_type: DataType::new(delegate_type),
    })
}

fn coerce_args(
    registry: &SymbolRegistry,
    args: Vec<Operand>,
    params: &[DataType],
) -> Result<Vec<Operand>, BuildError> {
    args.into_iter()
        .zip(params)
        .map(|(arg, &param)| coerce(registry, arg, param))
        .collect()
}
