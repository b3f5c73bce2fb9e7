//! Deterministic hash-based identity for module elements.
//!
//! This module provides [`TypeHash`], a 64-bit hash that uniquely identifies
//! types, fields, methods, constructors, and events in a module under
//! construction. Hashes are computed deterministically from names and
//! signatures rather than allocated sequentially, which gives us:
//!
//! - Forward references (a hash can be computed before the entity exists)
//! - No declaration-order dependencies in identity
//! - Single-map lookups (no secondary name-to-id maps)
//!
//! # Hash Computation
//!
//! Uses XXHash64 with domain-specific mixing constants so that entities of
//! different kinds (a type named `x`, a field named `x`, a method named `x`)
//! never share a hash.

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Separator constant mixed between signature components.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for type hashes.
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for field hashes.
    pub const FIELD: u64 = 0x5ea77ffbcdf5f302;

    /// Domain marker for method hashes.
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for constructor hashes.
    pub const CONSTRUCTOR: u64 = 0x9a7f3d5e2b8c4601;

    /// Domain marker for event hashes.
    pub const EVENT: u64 = 0x3e9f5d2a8c7b1403;

    /// Parameter position mixing constants.
    /// Each position gets its own constant so parameter order matters.
    pub const PARAM_MARKERS: [u64; 16] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
        0x7c3e9f2a5b8d1403,
        0x5d8c7b4a3e9f2106,
        0x3f1e9d8c7b5a4203,
        0x1a2b3c4d5e6f7089,
        0x9f8e7d6c5b4a3210,
        0x2468ace013579bdf,
        0xfdb97531eca86420,
        0x123456789abcdef0,
    ];
}

/// A deterministic 64-bit hash identifying a module element.
///
/// Computed from the qualified name (for types), owner + name (for fields
/// and events), or owner + name + parameter types (for methods and
/// constructors). The same input always produces the same hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a qualified type name.
    ///
    /// ```
    /// use codeforge_core::TypeHash;
    ///
    /// let a = TypeHash::from_name("Bookstore.Book");
    /// let b = TypeHash::from_name("Bookstore.Book");
    /// assert_eq!(a, b);
    /// ```
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a field hash from the owning type and field name.
    #[inline]
    pub fn from_field(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::FIELD ^ owner.0 ^ xxh64(name.as_bytes(), 0))
    }

    /// Create an event hash from the owning type and event name.
    #[inline]
    pub fn from_event(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::EVENT ^ owner.0 ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a method hash from owner type, method name, and parameter
    /// type hashes.
    ///
    /// Parameter order matters: `(int32, string)` produces a different hash
    /// than `(string, int32)`, which is what makes overloads distinct.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str, param_hashes: &[TypeHash]) -> Self {
        let mut hash = hash_constants::METHOD ^ owner.0 ^ xxh64(name.as_bytes(), 0);
        for (i, param) in param_hashes.iter().enumerate() {
            hash = mix_param(hash, i, *param);
        }
        TypeHash(hash)
    }

    /// Create a constructor hash from owner type and parameter type hashes.
    ///
    /// Constructors have no name; they are identified by owner + params.
    #[inline]
    pub fn from_constructor(owner: TypeHash, param_hashes: &[TypeHash]) -> Self {
        let mut hash = hash_constants::CONSTRUCTOR ^ owner.0;
        for (i, param) in param_hashes.iter().enumerate() {
            hash = mix_param(hash, i, *param);
        }
        TypeHash(hash)
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Fold one parameter hash into a signature hash.
///
/// Uses wrapping_mul so parameter order matters (XOR alone is commutative).
#[inline]
fn mix_param(hash: u64, index: usize, param: TypeHash) -> u64 {
    let marker = hash_constants::PARAM_MARKERS
        .get(index)
        .copied()
        .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(index as u64));
    hash.wrapping_mul(hash_constants::SEP)
        .wrapping_add(marker ^ param.0)
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
