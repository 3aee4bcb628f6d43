//! Plugin options and their validation into a fully resolved configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::error::{ConfigError, SigningError};
use crate::models::{FormatVersion, Headers, lowercase_headers};
use crate::signing::{
  Ed25519KeyStrategy, IntegrityBlockVersion, KeySource, SignerConfig, SigningStrategy,
  WebBundleId,
};

/// Configuration files looked up by [`PluginOptions::discover`], in order.
pub const DEFAULT_CONFIG_FILES: [&str; 3] = ["wbn.config.json", "wbn.config.yaml", "wbn.config.yml"];

/// Output file name used when none is configured.
pub const DEFAULT_OUTPUT: &str = "out.wbn";

/// Callback computing header overrides for a relative asset path.
#[derive(Clone)]
pub struct PerPathHeaders(Arc<dyn Fn(&str) -> Headers + Send + Sync>);

impl PerPathHeaders {
  /// Wrap a header callback.
  pub fn new(callback: impl Fn(&str) -> Headers + Send + Sync + 'static) -> Self {
    Self(Arc::new(callback))
  }
}

impl fmt::Debug for PerPathHeaders {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("PerPathHeaders(..)")
  }
}

/// Options for bundling a static directory alongside the build output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticOptions {
  /// Directory whose files are added recursively.
  pub dir: PathBuf,
  /// Base URL for the static files; defaults to the top-level `baseURL`.
  #[serde(default, rename = "baseURL")]
  pub base_url: Option<String>,
}

/// Request to wrap the bundle in a signed integrity block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntegrityBlockSignOptions {
  /// Explicit web bundle ID; derived from the key when a single key is configured.
  pub web_bundle_id: Option<String>,
  /// Whether the bundle is an Isolated Web App.
  pub is_iwa: bool,
  /// Integrity block layout.
  pub version: IntegrityBlockVersion,
  /// Keys to sign with, in order.
  pub keys: Vec<KeySource>,
  /// Programmatic signers appended after `keys`.
  #[serde(skip)]
  pub strategies: Vec<Arc<dyn SigningStrategy>>,
}

impl Default for IntegrityBlockSignOptions {
  fn default() -> Self {
    Self {
      web_bundle_id: None,
      is_iwa: true,
      version: IntegrityBlockVersion::default(),
      keys: Vec::new(),
      strategies: Vec::new(),
    }
  }
}

/// Where static files go relative to the build artifacts in the bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StaticPlacement {
  /// Static files first.
  #[default]
  BeforeArtifacts,
  /// Build artifacts first.
  AfterArtifacts,
}

/// Raw plugin options as written in a configuration file or built in code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginOptions {
  /// Archive format identifier, `b2` when omitted.
  pub format_version: Option<String>,
  /// Prefix joined with every artifact file name.
  #[serde(rename = "baseURL")]
  pub base_url: Option<String>,
  /// Entry point URL.
  #[serde(rename = "primaryURL")]
  pub primary_url: Option<String>,
  /// Static directory to bundle.
  #[serde(rename = "static")]
  pub static_source: Option<StaticOptions>,
  /// Signing request.
  pub integrity_block_sign: Option<IntegrityBlockSignOptions>,
  /// Name of the emitted bundle.
  pub output: Option<String>,
  /// Emit debug events.
  pub debug: bool,
  /// Headers merged into every file exchange.
  pub header_override: Option<Headers>,
  /// Ordering of static files relative to build artifacts.
  pub static_placement: StaticPlacement,
  /// Per-path header callback; takes precedence over `header_override`.
  #[serde(skip)]
  pub header_override_fn: Option<PerPathHeaders>,
}

impl PluginOptions {
  /// Look for one of [`DEFAULT_CONFIG_FILES`] in `dir`.
  ///
  /// Missing configuration falls back to defaults; a file that exists but fails to parse is an
  /// error.
  pub fn discover(dir: &Path) -> Result<Self> {
    for name in DEFAULT_CONFIG_FILES {
      let candidate = dir.join(name);
      if candidate.is_file() {
        return Self::from_path(&candidate);
      }
    }
    Ok(Self::default())
  }

  /// Read options from a JSON or YAML file.
  ///
  /// Relative paths inside the file (static directory, key files) are resolved against the
  /// directory containing it.
  pub fn from_path(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path)
      .with_context(|| format!("failed to read {}", path.display()))?;

    let mut options: Self = match path.extension().and_then(|ext| ext.to_str()) {
      Some("json") => serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?,
      Some("yaml" | "yml") => serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?,
      _ => bail!("unsupported configuration format: {}", path.display()),
    };

    if let Some(parent) = path.parent() {
      options.resolve_relative_paths(parent);
    }
    Ok(options)
  }

  /// Install a per-path header callback.
  pub fn with_header_override_fn(
    mut self,
    callback: impl Fn(&str) -> Headers + Send + Sync + 'static,
  ) -> Self {
    self.header_override_fn = Some(PerPathHeaders::new(callback));
    self
  }

  fn resolve_relative_paths(&mut self, root: &Path) {
    if let Some(static_source) = &mut self.static_source
      && static_source.dir.is_relative()
    {
      static_source.dir = root.join(&static_source.dir);
    }

    if let Some(sign) = &mut self.integrity_block_sign {
      for key in &mut sign.keys {
        if let KeySource::PemFile(path) = key
          && path.is_relative()
        {
          *path = root.join(&*path);
        }
      }
    }
  }

  /// Resolve defaults and cross-field rules once, loading signing keys.
  pub async fn validate(self) -> Result<ValidatedOptions, ConfigError> {
    let format_version: FormatVersion = match &self.format_version {
      Some(version) => version.parse()?,
      None => FormatVersion::default(),
    };

    let output = self.output.unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    if output.trim().is_empty() {
      return Err(ConfigError::EmptyOutput);
    }

    let (signing, iwa_origin) = match self.integrity_block_sign {
      Some(sign) => {
        let is_iwa = sign.is_iwa;
        let config = resolve_signer(sign).await?;
        let origin = is_iwa.then(|| config.web_bundle_id.isolated_app_origin());
        (Signing::Signed(config), origin)
      }
      None => (Signing::Unsigned, None),
    };

    if iwa_origin.is_some() && format_version != FormatVersion::B2 {
      return Err(ConfigError::IwaRequiresB2);
    }

    let base_url = match (self.base_url, &iwa_origin) {
      (Some(base_url), Some(origin)) if base_url != *origin => {
        return Err(ConfigError::IwaBaseUrlMismatch {
          expected: origin.clone(),
          actual: base_url,
        });
      }
      (Some(base_url), _) => base_url,
      (None, Some(origin)) => origin.clone(),
      (None, None) => String::new(),
    };
    check_base_url(&base_url)?;

    let static_source = match self.static_source {
      Some(options) => {
        let base_url = options.base_url.unwrap_or_else(|| base_url.clone());
        check_base_url(&base_url)?;
        Some(StaticSource {
          dir: options.dir,
          base_url,
        })
      }
      None => None,
    };

    let primary = match self.primary_url {
      Some(url) if !url.is_empty() => Primary::Url(url),
      _ => Primary::NoPrimary,
    };

    let header_override = match (self.header_override_fn, self.header_override) {
      (Some(callback), _) => HeaderOverride::PerPath(callback),
      (None, Some(headers)) => HeaderOverride::Static(lowercase_headers(headers)),
      (None, None) => HeaderOverride::None,
    };

    Ok(ValidatedOptions {
      format_version,
      base_url,
      primary,
      static_source,
      signing,
      output,
      header_override,
      iwa: iwa_origin.is_some(),
      static_placement: self.static_placement,
      debug: self.debug,
    })
  }
}

async fn resolve_signer(options: IntegrityBlockSignOptions) -> Result<SignerConfig, ConfigError> {
  let mut strategies: Vec<Arc<dyn SigningStrategy>> = Vec::new();
  for source in &options.keys {
    strategies.push(Arc::new(Ed25519KeyStrategy::load(source).await?));
  }
  strategies.extend(options.strategies);

  let web_bundle_id = match (&options.web_bundle_id, strategies.as_slice()) {
    (_, []) => return Err(SigningError::NoSigners.into()),
    (Some(id), _) => WebBundleId::parse(id)?,
    (None, [single]) => WebBundleId::from_public_key(&single.public_key().await?),
    (None, _) => return Err(SigningError::WebBundleIdRequired.into()),
  };

  Ok(SignerConfig {
    version: options.version,
    web_bundle_id,
    strategies,
  })
}

fn check_base_url(base_url: &str) -> Result<(), ConfigError> {
  if !base_url.is_empty() && !base_url.ends_with('/') {
    return Err(ConfigError::BaseUrlMissingSlash(base_url.to_string()));
  }
  Ok(())
}

/// Declared entry point of the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primary {
  /// The bundle has no declared primary resource.
  NoPrimary,
  /// URL of the primary resource.
  Url(String),
}

/// Whether the pass produces a signed bundle.
#[derive(Debug, Clone)]
pub enum Signing {
  /// Emit the bundle as is.
  Unsigned,
  /// Prepend an integrity block.
  Signed(SignerConfig),
}

/// Headers merged into every file exchange.
#[derive(Debug, Clone, Default)]
pub enum HeaderOverride {
  /// Only derived headers.
  #[default]
  None,
  /// Same headers for every asset.
  Static(Headers),
  /// Headers computed from the relative asset path.
  PerPath(PerPathHeaders),
}

impl HeaderOverride {
  /// Override headers for one asset, names lowercased.
  pub fn headers_for(&self, relative_path: &str) -> Headers {
    match self {
      Self::None => Headers::new(),
      Self::Static(headers) => headers.clone(),
      Self::PerPath(callback) => lowercase_headers((callback.0)(relative_path)),
    }
  }
}

/// Resolved static directory source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSource {
  /// Root of the static tree.
  pub dir: PathBuf,
  /// Base URL joined with each relative file path.
  pub base_url: String,
}

/// Options after defaults and validation, consumed by one generation pass.
#[derive(Debug, Clone)]
pub struct ValidatedOptions {
  /// Archive format.
  pub format_version: FormatVersion,
  /// Base URL for build artifacts.
  pub base_url: String,
  /// Entry point.
  pub primary: Primary,
  /// Optional static directory.
  pub static_source: Option<StaticSource>,
  /// Signing mode.
  pub signing: Signing,
  /// Output artifact file name.
  pub output: String,
  /// Header overrides.
  pub header_override: HeaderOverride,
  /// Whether Isolated Web App headers are enforced.
  pub iwa: bool,
  /// Static files before or after build artifacts.
  pub static_placement: StaticPlacement,
  /// Emit debug events.
  pub debug: bool,
}
