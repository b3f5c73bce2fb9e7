//! Deduplicating constant pool.
//!
//! Literals and member hashes referenced by bytecode live in a per-module
//! pool; instructions carry pool indices. Identical constants share one
//! slot, with float and decimal identity defined over their raw
//! representation so `0.0` and `-0.0` stay distinct.

use codeforge_core::{Decimal, TypeHash};
use rustc_hash::FxHashMap;

/// A pooled constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Decimal(Decimal),
    Str(String),
    /// A member identity used by call, new, and delegate instructions.
    Hash(TypeHash),
}

/// Hashable identity key for pool deduplication.
///
/// Floats dedupe by bit pattern, decimals by normalized mantissa/scale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Int32(i32),
    Int64(i64),
    Float64(u64),
    Decimal(i128, u32),
    Str(String),
    Hash(u64),
}

impl ConstantKey {
    fn of(constant: &Constant) -> Self {
        match constant {
            Constant::Int32(v) => ConstantKey::Int32(*v),
            Constant::Int64(v) => ConstantKey::Int64(*v),
            Constant::Float64(v) => ConstantKey::Float64(v.to_bits()),
            Constant::Decimal(v) => {
                let n = v.normalize();
                ConstantKey::Decimal(n.mantissa(), n.scale())
            }
            Constant::Str(v) => ConstantKey::Str(v.clone()),
            Constant::Hash(v) => ConstantKey::Hash(v.0),
        }
    }
}

/// The module-wide constant pool.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    index: FxHashMap<ConstantKey, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a constant, returning its pool index.
    ///
    /// Panics if the pool exceeds `u16::MAX` entries; a single module
    /// cannot address more.
    pub fn add(&mut self, constant: Constant) -> u16 {
        let key = ConstantKey::of(&constant);
        if let Some(&index) = self.index.get(&key) {
            return index;
        }
        assert!(
            self.constants.len() < u16::MAX as usize,
            "constant pool overflow"
        );
        let index = self.constants.len() as u16;
        self.constants.push(constant);
        self.index.insert(key, index);
        index
    }

    /// Intern a member hash.
    pub fn add_hash(&mut self, hash: TypeHash) -> u16 {
        self.add(Constant::Hash(hash))
    }

    /// Look up a constant by pool index.
    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// All pooled constants, in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_constants_share_a_slot() {
        let mut pool = ConstantPool::new();
        let a = pool.add(Constant::Str("hello".into()));
        let b = pool.add(Constant::Int32(7));
        let c = pool.add(Constant::Str("hello".into()));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn int_widths_do_not_collide() {
        let mut pool = ConstantPool::new();
        let narrow = pool.add(Constant::Int32(5));
        let wide = pool.add(Constant::Int64(5));
        assert_ne!(narrow, wide);
    }

    #[test]
    fn floats_dedupe_by_bit_pattern() {
        let mut pool = ConstantPool::new();
        let pos = pool.add(Constant::Float64(0.0));
        let neg = pool.add(Constant::Float64(-0.0));
        let again = pool.add(Constant::Float64(0.0));
        assert_ne!(pos, neg);
        assert_eq!(pos, again);
    }

    #[test]
    fn decimals_dedupe_by_normalized_value() {
        let mut pool = ConstantPool::new();
        // 1.50 and 1.5 are the same value at different scales.
        let a = pool.add(Constant::Decimal(Decimal::from_parts(150, 2)));
        let b = pool.add(Constant::Decimal(Decimal::from_parts(15, 1)));
        assert_eq!(a, b);
    }

    #[test]
    fn hashes_intern_like_other_constants() {
        let mut pool = ConstantPool::new();
        let h = TypeHash::from_name("Book");
        assert_eq!(pool.add_hash(h), pool.add_hash(h));
        assert!(matches!(pool.get(0), Some(Constant::Hash(x)) if *x == h));
    }
}
