//! Semantic types carried by operands, fields, parameters, and returns.
//!
//! A [`DataType`] is a thin wrapper over a [`TypeHash`]. The built-in
//! identities supplied by the target-type catalog live in [`builtins`];
//! everything else is a declared or external type registered by hash.

use std::fmt;

use crate::type_hash::TypeHash;

/// Well-known identities supplied by the target-type catalog.
///
/// These are fixed sentinel hashes, not name-derived: the catalog owns the
/// identity of its built-ins and the core only ever compares them. The
/// registry maps their names onto these hashes during bootstrap.
pub mod builtins {
    use super::TypeHash;

    /// The `void` pseudo-type (no value).
    pub const VOID: TypeHash = TypeHash(0xcf01_77d4_1b30_0001);
    /// The `bool` type.
    pub const BOOL: TypeHash = TypeHash(0xcf01_77d4_1b30_0002);
    /// 32-bit signed integer.
    pub const INT32: TypeHash = TypeHash(0xcf01_77d4_1b30_0003);
    /// 64-bit signed integer.
    pub const INT64: TypeHash = TypeHash(0xcf01_77d4_1b30_0004);
    /// 64-bit IEEE float.
    pub const FLOAT64: TypeHash = TypeHash(0xcf01_77d4_1b30_0005);
    /// Exact scaled decimal (128-bit mantissa).
    pub const DECIMAL: TypeHash = TypeHash(0xcf01_77d4_1b30_0006);
    /// Immutable string.
    pub const STRING: TypeHash = TypeHash(0xcf01_77d4_1b30_0007);
    /// Growable untyped list (element type `object`).
    pub const LIST: TypeHash = TypeHash(0xcf01_77d4_1b30_0008);
    /// Implicit root of every class/struct with no declared base.
    pub const OBJECT: TypeHash = TypeHash(0xcf01_77d4_1b30_0009);
    /// Type of the `null` literal; assignable to any reference type.
    pub const NULL: TypeHash = TypeHash(0xcf01_77d4_1b30_000a);
}

/// A semantic type reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    /// Identity of the referenced type.
    pub hash: TypeHash,
}

impl DataType {
    /// Create a data type from a type hash.
    #[inline]
    pub const fn new(hash: TypeHash) -> Self {
        Self { hash }
    }

    /// The `void` type.
    #[inline]
    pub const fn void() -> Self {
        Self::new(builtins::VOID)
    }

    /// Check for `void`.
    #[inline]
    pub fn is_void(self) -> bool {
        self.hash == builtins::VOID
    }

    /// Check for `bool`.
    #[inline]
    pub fn is_bool(self) -> bool {
        self.hash == builtins::BOOL
    }

    /// Check for the `null` literal type.
    #[inline]
    pub fn is_null(self) -> bool {
        self.hash == builtins::NULL
    }

    /// Check whether this is one of the numeric built-ins.
    pub fn is_numeric(self) -> bool {
        matches!(
            self.hash,
            builtins::INT32 | builtins::INT64 | builtins::FLOAT64 | builtins::DECIMAL
        )
    }

    /// Check whether this is an integer built-in.
    pub fn is_integer(self) -> bool {
        matches!(self.hash, builtins::INT32 | builtins::INT64)
    }

    /// Numeric widening rank, used to promote binary operands.
    ///
    /// `int32 < int64 < float64`. Decimal sits outside the rank ladder:
    /// integers widen into it, floats do not.
    pub(crate) fn numeric_rank(self) -> Option<u8> {
        match self.hash {
            builtins::INT32 => Some(0),
            builtins::INT64 => Some(1),
            builtins::FLOAT64 => Some(2),
            _ => None,
        }
    }

    /// Check whether a value of this type widens implicitly to `other`.
    ///
    /// Identity is not a widening; callers check that first. Covers the
    /// numeric ladder and integer-to-decimal only; reference compatibility
    /// is a registry question (it needs the base chain).
    pub fn widens_to(self, other: DataType) -> bool {
        if other.hash == builtins::DECIMAL {
            return self.is_integer();
        }
        match (self.numeric_rank(), other.numeric_rank()) {
            (Some(from), Some(to)) => from < to,
            _ => false,
        }
    }
}

impl From<TypeHash> for DataType {
    fn from(hash: TypeHash) -> Self {
        Self::new(hash)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hash {
            builtins::VOID => write!(f, "void"),
            builtins::BOOL => write!(f, "bool"),
            builtins::INT32 => write!(f, "int32"),
            builtins::INT64 => write!(f, "int64"),
            builtins::FLOAT64 => write!(f, "float64"),
            builtins::DECIMAL => write!(f, "decimal"),
            builtins::STRING => write!(f, "string"),
            builtins::LIST => write!(f, "list"),
            builtins::OBJECT => write!(f, "object"),
            builtins::NULL => write!(f, "null"),
            other => write!(f, "type#{other}"),
        }
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_widening_ladder() {
        let i32t = DataType::new(builtins::INT32);
        let i64t = DataType::new(builtins::INT64);
        let f64t = DataType::new(builtins::FLOAT64);
        let dec = DataType::new(builtins::DECIMAL);

        assert!(i32t.widens_to(i64t));
        assert!(i32t.widens_to(f64t));
        assert!(i64t.widens_to(f64t));
        assert!(i32t.widens_to(dec));
        assert!(i64t.widens_to(dec));

        // No narrowing, no float-to-decimal.
        assert!(!i64t.widens_to(i32t));
        assert!(!f64t.widens_to(i32t));
        assert!(!f64t.widens_to(dec));
        assert!(!dec.widens_to(f64t));
        assert!(!i32t.widens_to(i32t));
    }

    #[test]
    fn predicates() {
        assert!(DataType::void().is_void());
        assert!(DataType::new(builtins::BOOL).is_bool());
        assert!(DataType::new(builtins::DECIMAL).is_numeric());
        assert!(!DataType::new(builtins::STRING).is_numeric());
        assert!(DataType::new(builtins::INT64).is_integer());
        assert!(!DataType::new(builtins::FLOAT64).is_integer());
    }
}
