//! Constants and the archive type of the Web Bundle wire format.

/// `🌐📦` encoded as UTF-8.
pub const BUNDLE_MAGIC: [u8; 8] = [0xf0, 0x9f, 0x8c, 0x90, 0xf0, 0x9f, 0x93, 0xa6];

/// The trailing length field is an 8-byte big-endian integer.
pub const LENGTH_FIELD_SIZE: usize = 8;

/// Serialized web bundle bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive(Vec<u8>);

impl Archive {
  /// Wrap already serialized bundle bytes.
  pub fn new(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }

  /// Raw bundle bytes.
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  /// Consume and return the inner bytes.
  pub fn into_bytes(self) -> Vec<u8> {
    self.0
  }

  /// Size of the bundle in bytes.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Check if the bundle is empty.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl AsRef<[u8]> for Archive {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}
