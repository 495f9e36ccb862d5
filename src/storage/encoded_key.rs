use crate::catalog::types::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Order-preserving byte encoding of a key tuple: comparing two encoded keys
/// byte-wise gives the same result as comparing the underlying `Row`s. The
/// reference store keys its ordered maps with this, so popping from the high
/// end of the map walks key tuples in descending tuple order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncodedKey {
    bytes: SmallVec<[u8; 64]>,
}

impl EncodedKey {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn from_values(values: &[Value]) -> Self {
        let mut out = SmallVec::<[u8; 64]>::new();
        for value in values {
            encode_value(value, &mut out);
        }
        Self { bytes: out }
    }

    pub fn from_single(value: &Value) -> Self {
        Self::from_values(std::slice::from_ref(value))
    }
}

// Tag bytes equal Value::kind_rank, so byte order agrees with value order
// across kinds as well (Null below everything).
fn encode_value(v: &Value, out: &mut SmallVec<[u8; 64]>) {
    match v {
        Value::Null => {
            out.push(0x00);
        }
        Value::Boolean(b) => {
            out.push(0x01);
            out.push(u8::from(*b));
        }
        Value::Integer(i) => {
            out.push(0x02);
            let shifted = (*i as u64) ^ 0x8000_0000_0000_0000;
            out.extend_from_slice(&shifted.to_be_bytes());
        }
        Value::Timestamp(ts) => {
            out.push(0x03);
            let shifted = (*ts as u64) ^ 0x8000_0000_0000_0000;
            out.extend_from_slice(&shifted.to_be_bytes());
        }
        Value::Float(f) => {
            out.push(0x04);
            // total order preserving float encoding: negative floats flip all
            // bits, non-negative ones flip the sign bit only.
            let bits = f.to_bits();
            let mapped = if (bits >> 63) == 1 {
                !bits
            } else {
                bits ^ 0x8000_0000_0000_0000
            };
            out.extend_from_slice(&mapped.to_be_bytes());
        }
        Value::Text(s) => {
            out.push(0x05);
            append_escaped(s.as_bytes(), out);
        }
        Value::Blob(b) => {
            out.push(0x06);
            append_escaped(b, out);
        }
    }
}

fn append_escaped(bytes: &[u8], out: &mut SmallVec<[u8; 64]>) {
    for byte in bytes {
        if *byte == 0 {
            // Escape interior nulls so the terminator remains unambiguous.
            out.extend_from_slice(&[0x00, 0xFF]);
        } else {
            out.push(*byte);
        }
    }
    out.push(0x00);
}
