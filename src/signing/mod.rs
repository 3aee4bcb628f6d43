//! Integrity block signing for web bundles.
//!
//! A signed bundle is the CBOR encoded integrity block followed by the unchanged bundle bytes.
//! Signatures are produced by [`SigningStrategy`] implementations so keys can live in files,
//! environment variables or behind an external signer.

mod integrity_block;
mod strategy;
mod web_bundle_id;

use std::sync::Arc;

pub use integrity_block::{
  INTEGRITY_BLOCK_MAGIC, IntegrityBlock, IntegrityBlockSigner, IntegrityBlockVersion,
  IntegritySignature, SignedWebBundle,
};
pub use strategy::{Ed25519KeyStrategy, KeySource, PublicKey, SigningStrategy};
pub use web_bundle_id::WebBundleId;

/// Resolved signing configuration for one generation pass.
#[derive(Debug, Clone)]
pub struct SignerConfig {
  /// Integrity block layout to produce.
  pub version: IntegrityBlockVersion,
  /// Identity written into the integrity block attributes.
  pub web_bundle_id: WebBundleId,
  /// Signers, each contributing one signature in order.
  pub strategies: Vec<Arc<dyn SigningStrategy>>,
}
