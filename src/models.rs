//! Data structures produced while preparing a web bundle.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BundleError;

/// Lowercase response header map attached to a bundled resource.
pub type Headers = BTreeMap<String, String>;

/// Archive format variants understood by the bundle builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatVersion {
  /// Legacy layout with a mandatory primary URL in the top-level array.
  #[serde(rename = "b1")]
  B1,
  /// Current layout; relative URLs allowed and the primary URL is optional.
  #[default]
  #[serde(rename = "b2")]
  B2,
}

impl FormatVersion {
  /// Short identifier used in configuration files.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::B1 => "b1",
      Self::B2 => "b2",
    }
  }

  /// Four byte version marker written after the magic.
  pub fn marker(&self) -> [u8; 4] {
    match self {
      Self::B1 => *b"b1\0\0",
      Self::B2 => *b"b2\0\0",
    }
  }
}

impl FromStr for FormatVersion {
  type Err = BundleError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value {
      "b1" => Ok(Self::B1),
      "b2" => Ok(Self::B2),
      other => Err(BundleError::UnsupportedVersion(other.to_string())),
    }
  }
}

impl fmt::Display for FormatVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single URL-addressed exchange ready to be appended to a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
  /// Resolved URL of the exchange.
  pub url: String,
  /// HTTP status stored with the response.
  pub status: u16,
  /// Response headers, names lowercased.
  pub headers: Headers,
  /// Response body.
  pub content: Vec<u8>,
}

impl Resource {
  /// Create a `200 OK` resource with the provided headers.
  pub fn new(url: impl Into<String>, content: impl Into<Vec<u8>>, headers: Headers) -> Self {
    Self {
      url: url.into(),
      status: 200,
      headers: lowercase_headers(headers),
      content: content.into(),
    }
  }

  /// Create an empty `301` exchange pointing at `location`.
  pub fn redirect(url: impl Into<String>, location: &str) -> Self {
    let mut headers = Headers::new();
    headers.insert("location".into(), location.to_string());
    Self {
      url: url.into(),
      status: 301,
      headers,
      content: Vec::new(),
    }
  }
}

/// Normalise header names to lowercase, later duplicates winning.
pub fn lowercase_headers(headers: impl IntoIterator<Item = (String, String)>) -> Headers {
  headers
    .into_iter()
    .map(|(name, value)| (name.to_ascii_lowercase(), value))
    .collect()
}

/// Content produced by the host build tool for one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
  /// Generated code chunk.
  Text(String),
  /// Binary or text asset.
  Binary(Vec<u8>),
  /// Intermediate entry with no final bytes yet.
  Pending,
}

impl ArtifactContent {
  /// Final bytes of the artifact, if any.
  pub fn bytes(&self) -> Option<&[u8]> {
    match self {
      Self::Text(text) => Some(text.as_bytes()),
      Self::Binary(bytes) => Some(bytes),
      Self::Pending => None,
    }
  }
}

/// Which input produced a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOrigin {
  /// File found under the static directory.
  Static,
  /// Entry of the host's artifact set.
  Artifact,
}

impl fmt::Display for ResourceOrigin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Static => f.write_str("static file"),
      Self::Artifact => f.write_str("build artifact"),
    }
  }
}

/// A resource that was dropped from the bundle, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceWarning {
  /// Input the resource came from.
  pub origin: ResourceOrigin,
  /// Relative path or artifact file name.
  pub path: String,
  /// Human readable failure.
  pub message: String,
}

impl fmt::Display for ResourceWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "error adding {} {}: {}", self.origin, self.path, self.message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_known_versions_only() {
    assert_eq!("b1".parse::<FormatVersion>(), Ok(FormatVersion::B1));
    assert_eq!("b2".parse::<FormatVersion>(), Ok(FormatVersion::B2));
    assert_eq!(
      "b3".parse::<FormatVersion>(),
      Err(BundleError::UnsupportedVersion("b3".into()))
    );
  }

  #[test]
  fn lowercases_header_names() {
    let mut headers = Headers::new();
    headers.insert("Content-Type".into(), "text/html".into());
    let resource = Resource::new("/index.html", "hi", headers);
    assert_eq!(resource.headers.get("content-type").map(String::as_str), Some("text/html"));
    assert_eq!(resource.status, 200);
  }

  #[test]
  fn pending_artifacts_have_no_bytes() {
    assert!(ArtifactContent::Pending.bytes().is_none());
    assert_eq!(ArtifactContent::Text("x".into()).bytes(), Some(&b"x"[..]));
  }
}
