//! # Typed Data Payloads
//!
//! The tagged value payload a node carries: literal scalars, literal
//! strings, and the atomic-ordering metadata of atomic memory operations.
//!
//! `TypedData` implements `Eq` and `Hash` so it can key deterministic caches
//! (value numbering, specialization requests); floats are compared and
//! hashed by their bit patterns.

use crate::foundation::node::AtomicOrdering;
use std::hash::{Hash, Hasher};

/// Tagged union of per-type node payloads.
#[derive(Debug, Clone, Default)]
pub enum TypedData {
    /// No payload (the common case for expression nodes)
    #[default]
    None,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Literal string payload (rodata string literals)
    String(String),
    /// Ordering metadata for atomic load/store/cas nodes
    Atomic {
        ordering: AtomicOrdering,
        exclusive: bool,
    },
}

impl TypedData {
    /// Widen any integer payload to i64. Returns `None` for non-integers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedData::I8(v) => Some(i64::from(*v)),
            TypedData::I16(v) => Some(i64::from(*v)),
            TypedData::I32(v) => Some(i64::from(*v)),
            TypedData::I64(v) => Some(*v),
            TypedData::U8(v) => Some(i64::from(*v)),
            TypedData::U16(v) => Some(i64::from(*v)),
            TypedData::U32(v) => Some(i64::from(*v)),
            TypedData::U64(v) => i64::try_from(*v).ok(),
            TypedData::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Widen any float payload to f64. Returns `None` for non-floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedData::F32(v) => Some(f64::from(*v)),
            TypedData::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedData::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedData::String(s) => Some(s),
            _ => None,
        }
    }

    /// Stable byte encoding used by structural hashes (value numbers,
    /// specialization keys). Distinct variants never collide because the
    /// discriminant byte leads.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16);
        match self {
            TypedData::None => bytes.push(0),
            TypedData::Bool(v) => {
                bytes.push(1);
                bytes.push(u8::from(*v));
            }
            TypedData::I8(v) => {
                bytes.push(2);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            TypedData::I16(v) => {
                bytes.push(3);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            TypedData::I32(v) => {
                bytes.push(4);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            TypedData::I64(v) => {
                bytes.push(5);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            TypedData::U8(v) => {
                bytes.push(6);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            TypedData::U16(v) => {
                bytes.push(7);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            TypedData::U32(v) => {
                bytes.push(8);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            TypedData::U64(v) => {
                bytes.push(9);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            TypedData::F32(v) => {
                bytes.push(10);
                bytes.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            TypedData::F64(v) => {
                bytes.push(11);
                bytes.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            TypedData::String(s) => {
                bytes.push(12);
                bytes.extend_from_slice(s.as_bytes());
            }
            TypedData::Atomic { ordering, exclusive } => {
                bytes.push(13);
                bytes.push(*ordering as u8);
                bytes.push(u8::from(*exclusive));
            }
        }
        bytes
    }
}

impl PartialEq for TypedData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypedData::None, TypedData::None) => true,
            (TypedData::Bool(a), TypedData::Bool(b)) => a == b,
            (TypedData::I8(a), TypedData::I8(b)) => a == b,
            (TypedData::I16(a), TypedData::I16(b)) => a == b,
            (TypedData::I32(a), TypedData::I32(b)) => a == b,
            (TypedData::I64(a), TypedData::I64(b)) => a == b,
            (TypedData::U8(a), TypedData::U8(b)) => a == b,
            (TypedData::U16(a), TypedData::U16(b)) => a == b,
            (TypedData::U32(a), TypedData::U32(b)) => a == b,
            (TypedData::U64(a), TypedData::U64(b)) => a == b,
            (TypedData::F32(a), TypedData::F32(b)) => a.to_bits() == b.to_bits(),
            (TypedData::F64(a), TypedData::F64(b)) => a.to_bits() == b.to_bits(),
            (TypedData::String(a), TypedData::String(b)) => a == b,
            (
                TypedData::Atomic { ordering: ao, exclusive: ae },
                TypedData::Atomic { ordering: bo, exclusive: be },
            ) => ao == bo && ae == be,
            _ => false,
        }
    }
}

impl Eq for TypedData {}

impl Hash for TypedData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.hash_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equality_by_bits() {
        assert_eq!(TypedData::F64(1.5), TypedData::F64(1.5));
        assert_ne!(TypedData::F64(0.0), TypedData::F64(-0.0));
    }

    #[test]
    fn test_integer_widening() {
        assert_eq!(TypedData::I8(-3).as_i64(), Some(-3));
        assert_eq!(TypedData::U64(u64::MAX).as_i64(), None);
        assert_eq!(TypedData::F32(2.0).as_i64(), None);
    }

    #[test]
    fn test_hash_bytes_distinguish_variants() {
        // same raw bits, different variant tag
        assert_ne!(
            TypedData::I32(1).hash_bytes(),
            TypedData::U32(1).hash_bytes()
        );
    }
}
