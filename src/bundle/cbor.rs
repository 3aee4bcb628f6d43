//! Minimal deterministic CBOR encoder covering the subset used by web bundles.
//!
//! Only unsigned integers, byte strings, text strings, arrays and maps are needed. Map entries
//! are emitted in canonical order (shorter encoded key first, then bytewise) so the same logical
//! value always produces the same bytes.

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

/// CBOR data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
  /// Major type 0.
  Unsigned(u64),
  /// Major type 2.
  Bytes(Vec<u8>),
  /// Major type 3.
  Text(String),
  /// Major type 4.
  Array(Vec<Value>),
  /// Major type 5; order of the pairs is irrelevant to the encoding.
  Map(Vec<(Value, Value)>),
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Self::Text(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Self::Text(value)
  }
}

impl From<u64> for Value {
  fn from(value: u64) -> Self {
    Self::Unsigned(value)
  }
}

impl From<Vec<u8>> for Value {
  fn from(value: Vec<u8>) -> Self {
    Self::Bytes(value)
  }
}

impl From<&[u8]> for Value {
  fn from(value: &[u8]) -> Self {
    Self::Bytes(value.to_vec())
  }
}

/// Encode a value into a fresh buffer.
pub fn encode(value: &Value) -> Vec<u8> {
  let mut out = Vec::new();
  encode_into(value, &mut out);
  out
}

/// Append the encoding of `value` to `out`.
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
  match value {
    Value::Unsigned(n) => write_head(MAJOR_UNSIGNED, *n, out),
    Value::Bytes(bytes) => {
      write_head(MAJOR_BYTES, bytes.len() as u64, out);
      out.extend_from_slice(bytes);
    }
    Value::Text(text) => {
      write_head(MAJOR_TEXT, text.len() as u64, out);
      out.extend_from_slice(text.as_bytes());
    }
    Value::Array(items) => {
      write_head(MAJOR_ARRAY, items.len() as u64, out);
      for item in items {
        encode_into(item, out);
      }
    }
    Value::Map(entries) => {
      let mut encoded: Vec<(Vec<u8>, Vec<u8>)> = entries
        .iter()
        .map(|(key, value)| (encode(key), encode(value)))
        .collect();
      encoded.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

      write_head(MAJOR_MAP, encoded.len() as u64, out);
      for (key, value) in encoded {
        out.extend_from_slice(&key);
        out.extend_from_slice(&value);
      }
    }
  }
}

/// Append an array header for `len` already encoded items.
pub fn write_array_header(len: usize, out: &mut Vec<u8>) {
  write_head(MAJOR_ARRAY, len as u64, out);
}

/// Number of bytes needed for an array header announcing `len` items.
pub fn array_header_len(len: usize) -> usize {
  head_len(len as u64)
}

fn head_len(n: u64) -> usize {
  match n {
    0..=23 => 1,
    24..=0xff => 2,
    0x100..=0xffff => 3,
    0x1_0000..=0xffff_ffff => 5,
    _ => 9,
  }
}

fn write_head(major: u8, n: u64, out: &mut Vec<u8>) {
  let major = major << 5;
  match n {
    0..=23 => out.push(major | n as u8),
    24..=0xff => {
      out.push(major | 24);
      out.push(n as u8);
    }
    0x100..=0xffff => {
      out.push(major | 25);
      out.extend_from_slice(&(n as u16).to_be_bytes());
    }
    0x1_0000..=0xffff_ffff => {
      out.push(major | 26);
      out.extend_from_slice(&(n as u32).to_be_bytes());
    }
    _ => {
      out.push(major | 27);
      out.extend_from_slice(&n.to_be_bytes());
    }
  }
}
