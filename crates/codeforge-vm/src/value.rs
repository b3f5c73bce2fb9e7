//! Runtime values and the delegate algebra.
//!
//! Values are dynamically tagged; the compiler's static checking makes
//! most tag mismatches unreachable, and the interpreter reports the rest
//! as [`RuntimeError::InvalidOperand`](codeforge_core::RuntimeError).
//! Objects, lists, and delegates are reference values; delegates are
//! immutable, so combine and remove build new invocation lists.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use codeforge_core::{Decimal, TypeHash};

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The absence of a value (a void return).
    Unit,
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Decimal(Decimal),
    Str(Rc<String>),
    List(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectData>>),
    Delegate(Rc<DelegateValue>),
}

/// Heap state of a constructed object.
#[derive(Debug)]
pub struct ObjectData {
    pub type_hash: TypeHash,
    /// Field slots, base chain first.
    pub fields: Vec<Value>,
}

/// One entry of a delegate's invocation list.
#[derive(Debug, Clone)]
pub struct DelegateEntry {
    /// Bound receiver, captured when the delegate was constructed.
    pub receiver: Option<Value>,
    pub method: TypeHash,
}

impl DelegateEntry {
    /// Entry equality: same target method and the same bound receiver
    /// (reference identity for reference receivers).
    pub fn same_target(&self, other: &DelegateEntry) -> bool {
        if self.method != other.method {
            return false;
        }
        match (&self.receiver, &other.receiver) {
            (None, None) => true,
            (Some(a), Some(b)) => identity_eq(a, b),
            _ => false,
        }
    }
}

/// An immutable delegate: an ordered invocation list.
#[derive(Debug, Clone)]
pub struct DelegateValue {
    pub entries: Vec<DelegateEntry>,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn delegate(entries: Vec<DelegateEntry>) -> Value {
        Value::Delegate(Rc::new(DelegateValue { entries }))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Reference identity (value equality for primitives).
pub fn identity_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int32(x), Value::Int32(y)) => x == y,
        (Value::Int64(x), Value::Int64(y)) => x == y,
        (Value::Float64(x), Value::Float64(y)) => x == y,
        (Value::Decimal(x), Value::Decimal(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Delegate(x), Value::Delegate(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Equality as observed by the `Eq` instruction.
///
/// Primitives compare by value, strings by content, and the reference
/// kinds by identity; `null` equals only `null`.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    identity_eq(a, b)
}

// =============================================================================
// Delegate Algebra
// =============================================================================

/// Combine two delegate values: the result's invocation list is the left
/// list followed by the right. Null is the empty delegate.
pub fn delegate_combine(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Null, Value::Null) => Value::Null,
        (Value::Null, other) | (other, Value::Null) => other.clone(),
        (Value::Delegate(left), Value::Delegate(right)) => {
            let mut entries = left.entries.clone();
            entries.extend(right.entries.iter().cloned());
            Value::delegate(entries)
        }
        _ => a.clone(),
    }
}

/// Remove the last contiguous occurrence of `b`'s invocation list from
/// `a`'s, scanning from the end. An absent pattern is a no-op; an emptied
/// list becomes null.
pub fn delegate_remove(a: &Value, b: &Value) -> Value {
    let Value::Delegate(from) = a else {
        return a.clone();
    };
    let Value::Delegate(pattern) = b else {
        return a.clone();
    };
    if pattern.entries.is_empty() || pattern.entries.len() > from.entries.len() {
        return a.clone();
    }

    let window = pattern.entries.len();
    let last_start = from.entries.len() - window;
    for start in (0..=last_start).rev() {
        let matches = from.entries[start..start + window]
            .iter()
            .zip(&pattern.entries)
            .all(|(x, y)| x.same_target(y));
        if matches {
            let mut entries = from.entries.clone();
            entries.drain(start..start + window);
            if entries.is_empty() {
                return Value::Null;
            }
            return Value::delegate(entries);
        }
    }
    a.clone()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => Ok(()),
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::List(v) => write!(f, "<list of {}>", v.borrow().len()),
            Value::Object(v) => write!(f, "<{}>", v.borrow().type_hash),
            Value::Delegate(v) => write!(f, "<delegate of {}>", v.entries.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: u64) -> DelegateEntry {
        DelegateEntry {
            receiver: None,
            method: TypeHash(tag),
        }
    }

    fn entries_of(value: &Value) -> Vec<u64> {
        match value {
            Value::Delegate(d) => d.entries.iter().map(|e| e.method.0).collect(),
            Value::Null => vec![],
            other => panic!("not a delegate: {other:?}"),
        }
    }

    #[test]
    fn combine_appends_in_order() {
        let ab = Value::delegate(vec![entry(1), entry(2)]);
        let c = Value::delegate(vec![entry(3)]);
        assert_eq!(entries_of(&delegate_combine(&ab, &c)), vec![1, 2, 3]);
    }

    #[test]
    fn combine_with_null_yields_the_other_operand() {
        let d = Value::delegate(vec![entry(1)]);
        assert_eq!(entries_of(&delegate_combine(&Value::Null, &d)), vec![1]);
        assert_eq!(entries_of(&delegate_combine(&d, &Value::Null)), vec![1]);
        assert!(delegate_combine(&Value::Null, &Value::Null).is_null());
    }

    #[test]
    fn remove_deletes_the_last_contiguous_occurrence() {
        // [1, 2, 1, 2, 3] - [1, 2] = [1, 2, 3]: the later occurrence goes.
        let from = Value::delegate(vec![entry(1), entry(2), entry(1), entry(2), entry(3)]);
        let pat = Value::delegate(vec![entry(1), entry(2)]);
        assert_eq!(entries_of(&delegate_remove(&from, &pat)), vec![1, 2, 3]);
    }

    #[test]
    fn remove_of_an_absent_pattern_is_a_no_op() {
        let from = Value::delegate(vec![entry(1), entry(2)]);
        let pat = Value::delegate(vec![entry(9)]);
        assert_eq!(entries_of(&delegate_remove(&from, &pat)), vec![1, 2]);

        // Non-contiguous matches do not count.
        let from = Value::delegate(vec![entry(1), entry(5), entry(2)]);
        let pat = Value::delegate(vec![entry(1), entry(2)]);
        assert_eq!(entries_of(&delegate_remove(&from, &pat)), vec![1, 5, 2]);
    }

    #[test]
    fn removing_everything_yields_null() {
        let from = Value::delegate(vec![entry(1)]);
        let pat = Value::delegate(vec![entry(1)]);
        assert!(delegate_remove(&from, &pat).is_null());
    }

    #[test]
    fn remove_with_null_operands() {
        let d = Value::delegate(vec![entry(1)]);
        assert_eq!(entries_of(&delegate_remove(&d, &Value::Null)), vec![1]);
        assert!(delegate_remove(&Value::Null, &d).is_null());
    }

    #[test]
    fn bound_receivers_distinguish_entries() {
        let obj_a = Value::Object(Rc::new(RefCell::new(ObjectData {
            type_hash: TypeHash(7),
            fields: vec![],
        })));
        let obj_b = Value::Object(Rc::new(RefCell::new(ObjectData {
            type_hash: TypeHash(7),
            fields: vec![],
        })));
        let on_a = DelegateEntry {
            receiver: Some(obj_a),
            method: TypeHash(1),
        };
        let on_b = DelegateEntry {
            receiver: Some(obj_b),
            method: TypeHash(1),
        };
        assert!(!on_a.same_target(&on_b));

        // Removing a handler bound to B leaves A's handler alone.
        let from = Value::delegate(vec![on_a.clone()]);
        let pat = Value::delegate(vec![on_b]);
        let kept = delegate_remove(&from, &pat);
        assert_eq!(entries_of(&kept).len(), 1);
    }

    #[test]
    fn string_equality_is_by_content() {
        assert!(value_eq(&Value::string("ab"), &Value::string("ab")));
        assert!(!value_eq(&Value::string("ab"), &Value::string("ba")));
        assert!(!value_eq(&Value::Null, &Value::string("ab")));
    }
}
