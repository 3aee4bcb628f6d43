use std::fmt;

use regex::Regex;

use crate::error::SigningError;
use crate::signing::PublicKey;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";
const ISOLATED_APP_SCHEME: &str = "isolated-app://";

fn web_bundle_id_pattern() -> &'static Regex {
  use std::sync::OnceLock;

  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"^[a-z2-7]{56}$").expect("invalid web bundle id regex"))
}

/// Identity of a signed web bundle, derived from the signer's public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WebBundleId(String);

impl WebBundleId {
  /// Derive the identifier for a public key: lowercase, unpadded base32 of the key followed by
  /// its type suffix.
  pub fn from_public_key(key: &PublicKey) -> Self {
    let mut bytes = key.as_bytes().to_vec();
    bytes.extend_from_slice(&key.type_suffix());
    Self(base32_lower(&bytes))
  }

  /// Accept a configured identifier after checking its shape.
  pub fn parse(value: &str) -> Result<Self, SigningError> {
    if web_bundle_id_pattern().is_match(value) {
      Ok(Self(value.to_string()))
    } else {
      Err(SigningError::InvalidWebBundleId(value.to_string()))
    }
  }

  /// Identifier string.
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Origin an Isolated Web App with this identifier is served from.
  pub fn isolated_app_origin(&self) -> String {
    format!("{ISOLATED_APP_SCHEME}{}/", self.0)
  }
}

impl fmt::Display for WebBundleId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// RFC 4648 base32 without padding, lowercased.
fn base32_lower(bytes: &[u8]) -> String {
  let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
  let mut buffer: u16 = 0;
  let mut bits = 0u8;

  for &byte in bytes {
    buffer = (buffer << 8) | u16::from(byte);
    bits += 8;
    while bits >= 5 {
      bits -= 5;
      let index = (buffer >> bits) & 0x1f;
      out.push(char::from(BASE32_ALPHABET[index as usize]));
    }
    buffer &= (1 << bits) - 1;
  }

  if bits > 0 {
    let index = (buffer << (5 - bits)) & 0x1f;
    out.push(char::from(BASE32_ALPHABET[index as usize]));
  }

  out
}
