use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use pkcs8::DecodePrivateKey;
use serde::Deserialize;

use crate::error::SigningError;

/// Public key of a signer, as stored in the signature attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKey {
  /// Raw 32-byte Ed25519 key.
  Ed25519([u8; 32]),
}

impl PublicKey {
  /// Attribute name under which the key is recorded.
  pub fn attribute_name(&self) -> &'static str {
    match self {
      Self::Ed25519(_) => "ed25519PublicKey",
    }
  }

  /// Raw key bytes.
  pub fn as_bytes(&self) -> &[u8] {
    match self {
      Self::Ed25519(bytes) => bytes,
    }
  }

  /// Suffix appended to the key before deriving a web bundle ID.
  pub fn type_suffix(&self) -> [u8; 3] {
    match self {
      Self::Ed25519(_) => [0x00, 0x01, 0x02],
    }
  }

  /// Base64 rendering used in diagnostics.
  pub fn to_base64(&self) -> String {
    BASE64.encode(self.as_bytes())
  }

  /// Check `signature` over `data` against this key.
  pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
    match self {
      Self::Ed25519(bytes) => {
        let Ok(key) = VerifyingKey::from_bytes(bytes) else {
          return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
          return false;
        };
        key.verify_strict(data, &signature).is_ok()
      }
    }
  }
}

/// Something able to sign integrity block data, in process or through an external signer.
#[async_trait]
pub trait SigningStrategy: Send + Sync + fmt::Debug {
  /// Public key matching the signatures this strategy produces.
  async fn public_key(&self) -> Result<PublicKey, SigningError>;

  /// Sign `data`, returning the raw signature bytes.
  async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError>;
}

/// Where an Ed25519 private key is loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeySource {
  /// PKCS#8 PEM file on disk.
  PemFile(PathBuf),
  /// Environment variable holding a PKCS#8 PEM document.
  PemEnv(String),
  /// Base64 encoded 32-byte private key seed.
  SeedBase64(String),
}

/// Signs with an in-process Ed25519 private key.
pub struct Ed25519KeyStrategy {
  key: SigningKey,
}

impl Ed25519KeyStrategy {
  /// Wrap an existing key.
  pub fn new(key: SigningKey) -> Self {
    Self { key }
  }

  /// Parse a PKCS#8 PEM document.
  pub fn from_pkcs8_pem(pem: &str) -> Result<Self, SigningError> {
    let key = SigningKey::from_pkcs8_pem(pem)
      .map_err(|err| SigningError::MalformedKey(format!("invalid PKCS#8 PEM: {err}")))?;
    Ok(Self::new(key))
  }

  /// Decode a base64 encoded 32-byte seed.
  pub fn from_seed_base64(encoded: &str) -> Result<Self, SigningError> {
    let bytes = BASE64
      .decode(encoded.trim())
      .map_err(|err| SigningError::MalformedKey(format!("invalid base64 seed: {err}")))?;
    let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
      SigningError::MalformedKey(format!("seed must be 32 bytes, got {}", bytes.len()))
    })?;
    Ok(Self::new(SigningKey::from_bytes(&seed)))
  }

  /// Resolve a key from its configured source.
  pub async fn load(source: &KeySource) -> Result<Self, SigningError> {
    match source {
      KeySource::PemFile(path) => {
        let pem = tokio::fs::read_to_string(path).await.map_err(|err| {
          SigningError::KeyUnavailable(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_pkcs8_pem(&pem)
      }
      KeySource::PemEnv(var) => {
        let pem = std::env::var(var).map_err(|err| {
          SigningError::KeyUnavailable(format!("environment variable {var}: {err}"))
        })?;
        Self::from_pkcs8_pem(&pem)
      }
      KeySource::SeedBase64(encoded) => Self::from_seed_base64(encoded),
    }
  }

  /// Public half of the key.
  pub fn verifying_key(&self) -> VerifyingKey {
    self.key.verifying_key()
  }
}

impl fmt::Debug for Ed25519KeyStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Ed25519KeyStrategy")
      .field("public_key", &BASE64.encode(self.key.verifying_key().as_bytes()))
      .finish_non_exhaustive()
  }
}

#[async_trait]
impl SigningStrategy for Ed25519KeyStrategy {
  async fn public_key(&self) -> Result<PublicKey, SigningError> {
    Ok(PublicKey::Ed25519(self.key.verifying_key().to_bytes()))
  }

  async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let signature: Signature = self.key.sign(data);
    Ok(signature.to_bytes().to_vec())
  }
}
