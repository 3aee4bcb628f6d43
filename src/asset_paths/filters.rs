use regex::Regex;
use url::Url;

use crate::error::BundleError;
use crate::models::FormatVersion;

/// Placeholder origin used to parse relative exchange URLs.
const RELATIVE_URL_BASE: &str = "https://web-bundle.invalid/";

fn header_name_pattern() -> &'static Regex {
  use std::sync::OnceLock;

  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"^[!#$%&'*+.^_`|~0-9a-z-]+$").expect("invalid header name regex")
  })
}

/// Check that a URL can be stored as an exchange URL for the given archive format.
///
/// `b1` bundles only accept absolute `http(s)` URLs. `b2` bundles also accept relative URLs,
/// which are resolved against a placeholder origin purely for validation. Neither format
/// allows fragments or embedded credentials.
pub fn validate_exchange_url(version: FormatVersion, url: &str) -> Result<(), BundleError> {
  let invalid = |reason: &str| BundleError::InvalidUrl {
    url: url.to_string(),
    reason: reason.to_string(),
  };

  let parsed = match version {
    FormatVersion::B1 => {
      let parsed = Url::parse(url).map_err(|err| invalid(&err.to_string()))?;
      if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid("protocol must be http(s)"));
      }
      parsed
    }
    FormatVersion::B2 => {
      let base = Url::parse(RELATIVE_URL_BASE).map_err(|err| invalid(&err.to_string()))?;
      base.join(url).map_err(|err| invalid(&err.to_string()))?
    }
  };

  if parsed.fragment().is_some() {
    return Err(invalid("must not have a fragment"));
  }
  if !parsed.username().is_empty() || parsed.password().is_some() {
    return Err(invalid("must not have credentials"));
  }

  Ok(())
}

/// Check that a header can be written into a bundle response.
///
/// Names must be lowercase HTTP tokens, which also rules out pseudo headers such as `:status`
/// that the builder writes itself. Values must not contain line breaks.
pub fn validate_header(url: &str, name: &str, value: &str) -> Result<(), BundleError> {
  let invalid = |reason: &str| BundleError::InvalidHeader {
    url: url.to_string(),
    name: name.to_string(),
    reason: reason.to_string(),
  };

  if !header_name_pattern().is_match(name) {
    return Err(invalid("name must be a lowercase token"));
  }
  if value.contains(['\r', '\n', '\0']) {
    return Err(invalid("value must not contain line breaks"));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_relative_urls_for_b2() {
    assert!(validate_exchange_url(FormatVersion::B2, "/s/a.txt").is_ok());
    assert!(validate_exchange_url(FormatVersion::B2, "main.js").is_ok());
    assert!(validate_exchange_url(FormatVersion::B2, "isolated-app://abc/index.js").is_ok());
  }

  #[test]
  fn requires_absolute_http_urls_for_b1() {
    assert!(validate_exchange_url(FormatVersion::B1, "https://example.com/a").is_ok());
    assert!(validate_exchange_url(FormatVersion::B1, "/relative").is_err());
    assert!(validate_exchange_url(FormatVersion::B1, "ftp://example.com/a").is_err());
  }

  #[test]
  fn rejects_fragments_and_credentials() {
    assert!(validate_exchange_url(FormatVersion::B2, "/page#top").is_err());
    assert!(validate_exchange_url(FormatVersion::B2, "https://user:pw@example.com/").is_err());
    assert!(validate_exchange_url(FormatVersion::B1, "https://user@example.com/").is_err());
  }

  #[test]
  fn validates_header_names_and_values() {
    assert!(validate_header("/", "content-type", "text/html").is_ok());
    assert!(validate_header("/", ":status", "200").is_err());
    assert!(validate_header("/", "Content-Type", "text/html").is_err());
    assert!(validate_header("/", "x header", "v").is_err());
    assert!(validate_header("/", "x-header", "a\r\nb").is_err());
  }
}
