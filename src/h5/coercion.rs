//! Post-read value coercion: an optional integer/real translation applied
//! after materialization.
//!
//! Deliberately preserved surprising behavior: coercing a string source
//! recomputes `elements` from the position of the first NUL byte rather
//! than trusting the element count the materializer already computed, and
//! does so by scanning the *first* string's bytes only — it does not
//! account for multiple fixed-width string elements at all.

use crate::error::{H5CoroError, Result};
use crate::h5::dataset::TypeClass;
use crate::ValueType;

/// A coerced value buffer: either left in its native on-disk shape, or
/// widened to a uniform 64-bit lane.
#[derive(Debug, Clone)]
pub enum CoercedBuffer {
    Native(Vec<u8>),
    Integer(Vec<i64>),
    Real(Vec<f64>),
}

/// Read a single little-endian source element of the given width/signedness
/// out of `raw` at element index `i`, widened to `i64`.
fn read_int_elem(raw: &[u8], i: usize, width: usize, signed: bool) -> i64 {
    let off = i * width;
    let b = &raw[off..off + width];
    match (width, signed) {
        (1, true) => b[0] as i8 as i64,
        (1, false) => b[0] as i64,
        (2, true) => i16::from_le_bytes(b.try_into().unwrap()) as i64,
        (2, false) => u16::from_le_bytes(b.try_into().unwrap()) as i64,
        (4, true) => i32::from_le_bytes(b.try_into().unwrap()) as i64,
        (4, false) => u32::from_le_bytes(b.try_into().unwrap()) as i64,
        (8, true) => i64::from_le_bytes(b.try_into().unwrap()),
        (8, false) => u64::from_le_bytes(b.try_into().unwrap()) as i64,
        _ => unreachable!("typesize validated by caller"),
    }
}

fn read_float_elem(raw: &[u8], i: usize, width: usize) -> f64 {
    let off = i * width;
    let b = &raw[off..off + width];
    match width {
        4 => f32::from_le_bytes(b.try_into().unwrap()) as f64,
        8 => f64::from_le_bytes(b.try_into().unwrap()),
        _ => unreachable!("typesize validated by caller"),
    }
}

/// Coerce `raw` (a materialized, native-layout element buffer) into the
/// target type. `elements`/`typesize`/`signed_val` describe `raw`'s current
/// shape as produced by the materializer.
pub fn coerce(
    target: ValueType,
    raw: Vec<u8>,
    type_class: TypeClass,
    elements: usize,
    typesize: usize,
    signed_val: bool,
) -> Result<CoercedBuffer> {
    match target {
        ValueType::Native => Ok(CoercedBuffer::Native(raw)),
        ValueType::Integer => {
            if type_class == TypeClass::String {
                let length = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                let out: Vec<i64> = raw[..length].iter().map(|&b| b as i64).collect();
                return Ok(CoercedBuffer::Integer(out));
            }
            let out = match type_class {
                TypeClass::FloatingPoint => (0..elements)
                    .map(|i| read_float_elem(&raw, i, typesize) as i64)
                    .collect(),
                TypeClass::FixedPoint => (0..elements)
                    .map(|i| read_int_elem(&raw, i, typesize, signed_val))
                    .collect(),
                other => return Err(H5CoroError::UnsupportedCoercion(other, ValueType::Integer)),
            };
            Ok(CoercedBuffer::Integer(out))
        }
        ValueType::Real => {
            let out = match type_class {
                TypeClass::FloatingPoint => (0..elements)
                    .map(|i| read_float_elem(&raw, i, typesize))
                    .collect(),
                TypeClass::FixedPoint => (0..elements)
                    .map(|i| read_int_elem(&raw, i, typesize, signed_val) as f64)
                    .collect(),
                other => return Err(H5CoroError::UnsupportedCoercion(other, ValueType::Real)),
            };
            Ok(CoercedBuffer::Real(out))
        }
    }
}
