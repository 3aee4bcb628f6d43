//! Error types shared by the bundling pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while assembling a Web Bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
  /// The requested archive format is not one of the recognised variants.
  #[error("unsupported web bundle format version: {0}")]
  UnsupportedVersion(String),
  /// Another exchange already claimed the URL.
  #[error("multiple exchanges for URL: {0}")]
  DuplicateUrl(String),
  /// The exchange URL cannot be stored in the bundle.
  #[error("invalid exchange URL {url:?}: {reason}")]
  InvalidUrl {
    /// Offending URL.
    url: String,
    /// Why the URL was rejected.
    reason: String,
  },
  /// A header name or value is not representable in a bundle response.
  #[error("invalid header {name:?} for {url}: {reason}")]
  InvalidHeader {
    /// URL of the exchange carrying the header.
    url: String,
    /// Header name.
    name: String,
    /// Why the header was rejected.
    reason: String,
  },
  /// `finalize` was called before any resource was added.
  #[error("web bundle contains no resources")]
  EmptyBundle,
  /// The primary URL does not match any resource in the bundle.
  #[error("exchange for primary URL ({0}) does not exist")]
  DanglingPrimaryUrl(String),
  /// Format `b1` stores the primary URL in its top-level structure.
  #[error("primary URL is not set (required by format b1)")]
  PrimaryUrlRequired,
}

/// Failures raised while resolving keys or producing an integrity block.
#[derive(Debug, Error)]
pub enum SigningError {
  /// The configured key material could not be obtained.
  #[error("signing key unavailable: {0}")]
  KeyUnavailable(String),
  /// The key material was found but could not be decoded.
  #[error("malformed signing key: {0}")]
  MalformedKey(String),
  /// A produced signature does not verify against the strategy's public key.
  #[error("signature produced for key {public_key} does not verify")]
  SignatureMismatch {
    /// Base64 encoded public key of the failing strategy.
    public_key: String,
  },
  /// A signing strategy reported an error.
  #[error("signing strategy failed: {0}")]
  Strategy(#[source] anyhow::Error),
  /// No strategy was configured although signing was requested.
  #[error("integrity block signing requested without any signing key")]
  NoSigners,
  /// Several keys were configured without an explicit web bundle ID.
  #[error("webBundleId must be set when signing with more than one key")]
  WebBundleIdRequired,
  /// The configured web bundle ID is not a valid identifier.
  #[error("invalid web bundle ID: {0}")]
  InvalidWebBundleId(String),
}

/// Problems found while validating plugin options.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// Archive format version is unknown.
  #[error(transparent)]
  Bundle(#[from] BundleError),
  /// Non-empty base URLs are joined with relative paths and must end with a slash.
  #[error("non-empty baseURL must end with '/': {0}")]
  BaseUrlMissingSlash(String),
  /// Isolated Web Apps are served from their `isolated-app://` origin.
  #[error("baseURL must be {expected} for an Isolated Web App, got {actual}")]
  IwaBaseUrlMismatch {
    /// Origin derived from the web bundle ID.
    expected: String,
    /// Configured base URL.
    actual: String,
  },
  /// Isolated Web Apps require the `b2` archive format.
  #[error("Isolated Web Apps require web bundle format b2")]
  IwaRequiresB2,
  /// The output artifact name is empty.
  #[error("output file name must not be empty")]
  EmptyOutput,
  /// Signing configuration could not be resolved.
  #[error(transparent)]
  Signing(#[from] SigningError),
}

/// Failures delivering the final bytes to the host.
#[derive(Debug, Error)]
pub enum EmitError {
  /// The generation pass has no addressable output location.
  #[error("no output target available for this generation pass")]
  NoOutputTarget,
  /// Writing the artifact failed.
  #[error("failed to write {}: {source}", path.display())]
  Io {
    /// Destination path.
    path: PathBuf,
    /// Underlying I/O error.
    source: std::io::Error,
  },
}

/// Fatal failure for one generation pass.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// Options were invalid.
  #[error("invalid web bundle options: {0}")]
  Config(#[from] ConfigError),
  /// The static directory could not be traversed.
  #[error("failed to read static directory {}: {source}", path.display())]
  StaticSource {
    /// Static root.
    path: PathBuf,
    /// Underlying walk error.
    source: walkdir::Error,
  },
  /// The static source points at something other than a directory.
  #[error("static source is not a directory: {}", .0.display())]
  StaticSourceNotDirectory(PathBuf),
  /// The archive could not be assembled.
  #[error("failed to create web bundle: {0}")]
  Bundle(#[from] BundleError),
  /// Signing was requested and failed.
  #[error("failed to sign web bundle: {0}")]
  Signing(#[from] SigningError),
  /// The output artifact could not be delivered.
  #[error("failed to emit web bundle: {0}")]
  Emit(#[from] EmitError),
}
