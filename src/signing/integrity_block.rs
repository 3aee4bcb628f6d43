use serde::Deserialize;
use sha2::{Digest, Sha512};

use crate::bundle::cbor::{self, Value};
use crate::error::SigningError;
use crate::signing::{PublicKey, SignerConfig, WebBundleId};

/// `🖋📦` encoded as UTF-8.
pub const INTEGRITY_BLOCK_MAGIC: [u8; 8] = [0xf0, 0x9f, 0x96, 0x8b, 0xf0, 0x9f, 0x93, 0xa6];

const WEB_BUNDLE_ID_ATTRIBUTE: &str = "webBundleId";

/// Integrity block layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityBlockVersion {
  /// `[magic, version, signatures]`.
  V1,
  /// `[magic, version, attributes, signatures]`, attributes carrying the web bundle ID.
  #[default]
  V2,
}

impl IntegrityBlockVersion {
  /// Four byte version marker written after the magic.
  pub fn marker(&self) -> [u8; 4] {
    match self {
      Self::V1 => *b"1b\0\0",
      Self::V2 => *b"2b\0\0",
    }
  }
}

/// One entry of the signature stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegritySignature {
  /// Key the signature was produced with.
  pub public_key: PublicKey,
  /// Raw signature bytes.
  pub signature: Vec<u8>,
}

impl IntegritySignature {
  fn attributes(public_key: &PublicKey) -> Value {
    Value::Map(vec![(
      Value::from(public_key.attribute_name()),
      Value::from(public_key.as_bytes()),
    )])
  }

  fn to_value(&self) -> Value {
    Value::Array(vec![
      Self::attributes(&self.public_key),
      Value::Bytes(self.signature.clone()),
    ])
  }
}

/// Signature wrapper prepended to a web bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityBlock {
  version: IntegrityBlockVersion,
  web_bundle_id: WebBundleId,
  signatures: Vec<IntegritySignature>,
}

impl IntegrityBlock {
  /// Empty block for the given identity.
  pub fn new(version: IntegrityBlockVersion, web_bundle_id: WebBundleId) -> Self {
    Self {
      version,
      web_bundle_id,
      signatures: Vec::new(),
    }
  }

  /// Signatures attached so far.
  pub fn signatures(&self) -> &[IntegritySignature] {
    &self.signatures
  }

  /// Identity recorded in the block attributes.
  pub fn web_bundle_id(&self) -> &WebBundleId {
    &self.web_bundle_id
  }

  /// CBOR encoding of the block.
  pub fn to_cbor(&self) -> Vec<u8> {
    let mut fields = vec![
      Value::from(&INTEGRITY_BLOCK_MAGIC[..]),
      Value::from(&self.version.marker()[..]),
    ];
    if self.version == IntegrityBlockVersion::V2 {
      fields.push(Value::Map(vec![(
        Value::from(WEB_BUNDLE_ID_ATTRIBUTE),
        Value::from(self.web_bundle_id.as_str()),
      )]));
    }
    fields.push(Value::Array(
      self.signatures.iter().map(IntegritySignature::to_value).collect(),
    ));
    cbor::encode(&Value::Array(fields))
  }
}

/// Output of a successful signing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedWebBundle {
  /// Integrity block with its signature stack.
  pub block: IntegrityBlock,
  /// Encoded integrity block.
  pub integrity_block: Vec<u8>,
  /// Integrity block followed by the original bundle.
  pub bytes: Vec<u8>,
}

/// Produces an integrity block over a finalized web bundle.
pub struct IntegrityBlockSigner<'a> {
  web_bundle: &'a [u8],
  config: &'a SignerConfig,
}

impl<'a> IntegrityBlockSigner<'a> {
  /// Prepare to sign `web_bundle` with every strategy in `config`.
  pub fn new(web_bundle: &'a [u8], config: &'a SignerConfig) -> Self {
    Self { web_bundle, config }
  }

  /// Sign with each strategy in order.
  ///
  /// Every signature is checked against its strategy's public key before the next strategy
  /// runs. Signatures are attached only once all strategies succeeded, so an error never leaves
  /// a partially signed block behind.
  pub async fn sign(&self) -> Result<SignedWebBundle, SigningError> {
    if self.config.strategies.is_empty() {
      return Err(SigningError::NoSigners);
    }

    let mut block = IntegrityBlock::new(self.config.version, self.config.web_bundle_id.clone());
    let unsigned_block = block.to_cbor();
    let web_bundle_hash = Sha512::digest(self.web_bundle);

    let mut signatures = Vec::with_capacity(self.config.strategies.len());
    for strategy in &self.config.strategies {
      let public_key = strategy.public_key().await?;
      let attributes = cbor::encode(&IntegritySignature::attributes(&public_key));
      let data = data_to_be_signed(&[
        web_bundle_hash.as_slice(),
        unsigned_block.as_slice(),
        attributes.as_slice(),
      ]);

      let signature = strategy.sign(&data).await?;
      if !public_key.verify(&data, &signature) {
        return Err(SigningError::SignatureMismatch {
          public_key: public_key.to_base64(),
        });
      }
      signatures.push(IntegritySignature {
        public_key,
        signature,
      });
    }

    block.signatures = signatures;
    let integrity_block = block.to_cbor();
    let mut bytes = Vec::with_capacity(integrity_block.len() + self.web_bundle.len());
    bytes.extend_from_slice(&integrity_block);
    bytes.extend_from_slice(self.web_bundle);

    Ok(SignedWebBundle {
      block,
      integrity_block,
      bytes,
    })
  }
}

/// Concatenate parts, each prefixed with its 8-byte big-endian length.
fn data_to_be_signed(parts: &[&[u8]]) -> Vec<u8> {
  let total = parts.iter().map(|part| part.len() + 8).sum();
  let mut data = Vec::with_capacity(total);
  for part in parts {
    data.extend_from_slice(&(part.len() as u64).to_be_bytes());
    data.extend_from_slice(part);
  }
  data
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use async_trait::async_trait;
  use ed25519_dalek::SigningKey;

  use crate::signing::{Ed25519KeyStrategy, SigningStrategy};

  fn strategy(seed: u8) -> Arc<dyn SigningStrategy> {
    Arc::new(Ed25519KeyStrategy::new(SigningKey::from_bytes(&[seed; 32])))
  }

  fn config(strategies: Vec<Arc<dyn SigningStrategy>>) -> SignerConfig {
    let key = SigningKey::from_bytes(&[1; 32]).verifying_key().to_bytes();
    SignerConfig {
      version: IntegrityBlockVersion::V2,
      web_bundle_id: WebBundleId::from_public_key(&PublicKey::Ed25519(key)),
      strategies,
    }
  }

  #[derive(Debug)]
  struct WrongKeyStrategy;

  #[async_trait]
  impl SigningStrategy for WrongKeyStrategy {
    async fn public_key(&self) -> Result<PublicKey, SigningError> {
      Ok(PublicKey::Ed25519(
        SigningKey::from_bytes(&[9; 32]).verifying_key().to_bytes(),
      ))
    }

    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError> {
      Ed25519KeyStrategy::new(SigningKey::from_bytes(&[8; 32]))
        .sign(data)
        .await
    }
  }

  #[derive(Debug)]
  struct OfflineStrategy;

  #[async_trait]
  impl SigningStrategy for OfflineStrategy {
    async fn public_key(&self) -> Result<PublicKey, SigningError> {
      Err(SigningError::KeyUnavailable("hardware key not connected".into()))
    }

    async fn sign(&self, _data: &[u8]) -> Result<Vec<u8>, SigningError> {
      unreachable!("public key lookup fails first")
    }
  }

  #[tokio::test]
  async fn signed_bundle_starts_with_integrity_block() {
    let config = config(vec![strategy(1)]);
    let signed = IntegrityBlockSigner::new(b"bundle", &config)
      .sign()
      .await
      .unwrap();

    assert!(signed.bytes.starts_with(&signed.integrity_block));
    assert!(signed.bytes.ends_with(b"bundle"));
    assert_eq!(&signed.integrity_block[2..10], &INTEGRITY_BLOCK_MAGIC);
  }

  #[tokio::test]
  async fn stored_signatures_verify_over_the_signed_data() {
    let config = config(vec![strategy(1), strategy(2)]);
    let bundle = b"web bundle bytes";
    let signed = IntegrityBlockSigner::new(bundle, &config)
      .sign()
      .await
      .unwrap();

    assert_eq!(signed.block.to_cbor(), signed.integrity_block);
    assert_eq!(signed.block.web_bundle_id(), &config.web_bundle_id);
    assert_eq!(signed.block.signatures().len(), 2);

    let unsigned = IntegrityBlock::new(config.version, config.web_bundle_id.clone()).to_cbor();
    let hash = Sha512::digest(bundle);
    let mut tampered = bundle.to_vec();
    tampered[0] ^= 0x01;
    let tampered_hash = Sha512::digest(&tampered);

    for (stored, strategy) in signed.block.signatures().iter().zip(&config.strategies) {
      assert_eq!(stored.public_key, strategy.public_key().await.unwrap());

      let attributes = cbor::encode(&IntegritySignature::attributes(&stored.public_key));
      let data = data_to_be_signed(&[hash.as_slice(), unsigned.as_slice(), attributes.as_slice()]);
      assert!(stored.public_key.verify(&data, &stored.signature));

      let data = data_to_be_signed(&[
        tampered_hash.as_slice(),
        unsigned.as_slice(),
        attributes.as_slice(),
      ]);
      assert!(!stored.public_key.verify(&data, &stored.signature));
    }

    let encoded_signature = &signed.block.signatures()[0].signature;
    assert!(
      signed
        .integrity_block
        .windows(encoded_signature.len())
        .any(|window| window == encoded_signature.as_slice())
    );

    let block_len = signed.integrity_block.len();
    assert_eq!(&signed.bytes[block_len..], bundle);
  }

  #[tokio::test]
  async fn signing_is_deterministic_for_ed25519() {
    let config = config(vec![strategy(1)]);
    let first = IntegrityBlockSigner::new(b"x", &config).sign().await.unwrap();
    let second = IntegrityBlockSigner::new(b"x", &config).sign().await.unwrap();
    assert_eq!(first, second);
  }

  #[tokio::test]
  async fn mismatched_keys_fail_without_output() {
    let config = config(vec![strategy(1), Arc::new(WrongKeyStrategy)]);
    let err = IntegrityBlockSigner::new(b"bundle", &config)
      .sign()
      .await
      .unwrap_err();
    assert!(matches!(err, SigningError::SignatureMismatch { .. }));
  }

  #[tokio::test]
  async fn unavailable_keys_abort_signing() {
    let config = config(vec![strategy(1), Arc::new(OfflineStrategy)]);
    let err = IntegrityBlockSigner::new(b"bundle", &config)
      .sign()
      .await
      .unwrap_err();
    assert!(matches!(err, SigningError::KeyUnavailable(_)));
  }

  #[tokio::test]
  async fn requires_at_least_one_strategy() {
    let config = config(Vec::new());
    let err = IntegrityBlockSigner::new(b"bundle", &config)
      .sign()
      .await
      .unwrap_err();
    assert!(matches!(err, SigningError::NoSigners));
  }

  #[test]
  fn v1_blocks_omit_attributes() {
    let id = WebBundleId::parse("4tkrnsmftl4ggvvdkfth3piainqragus2qbhf7rlz2a3wo3rh4wqaaic").unwrap();
    let v1 = IntegrityBlock::new(IntegrityBlockVersion::V1, id.clone()).to_cbor();
    let v2 = IntegrityBlock::new(IntegrityBlockVersion::V2, id).to_cbor();

    assert_eq!(v1[0], 0x83);
    assert_eq!(v2[0], 0x84);
    assert_eq!(&v1[11..15], b"1b\0\0");
    assert_eq!(&v2[11..15], b"2b\0\0");
  }

  #[test]
  fn length_prefixes_each_part() {
    let data = data_to_be_signed(&[b"ab".as_slice(), b"".as_slice()]);
    assert_eq!(data, vec![0, 0, 0, 0, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 0, 0, 0, 0, 0]);
  }
}
