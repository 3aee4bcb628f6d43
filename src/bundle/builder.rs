//! Deterministic Web Bundle assembly.

use std::collections::BTreeSet;

use crate::asset_paths::{validate_exchange_url, validate_header};
use crate::bundle::cbor::{self, Value};
use crate::bundle::format::{Archive, BUNDLE_MAGIC, LENGTH_FIELD_SIZE};
use crate::error::BundleError;
use crate::models::{FormatVersion, Headers, Resource};

/// Encoded response stored for one exchange.
#[derive(Debug, Clone)]
struct Exchange {
  url: String,
  response: Vec<u8>,
}

/// Accumulates resources in insertion order and serialises them into a web bundle.
///
/// A builder belongs to exactly one generation pass. [`BundleBuilder::finalize`] borrows the
/// builder immutably, so calling it repeatedly yields identical archives.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
  version: FormatVersion,
  primary_url: Option<String>,
  exchanges: Vec<Exchange>,
  urls: BTreeSet<String>,
}

impl BundleBuilder {
  /// Start an empty bundle for a known format version.
  pub fn new(version: FormatVersion) -> Self {
    Self {
      version,
      primary_url: None,
      exchanges: Vec::new(),
      urls: BTreeSet::new(),
    }
  }

  /// Start an empty bundle from a textual format identifier such as `"b2"`.
  pub fn begin(version: &str) -> Result<Self, BundleError> {
    Ok(Self::new(version.parse()?))
  }

  /// Format version the bundle will be written with.
  pub fn version(&self) -> FormatVersion {
    self.version
  }

  /// Record the entry point of the bundle.
  pub fn set_primary_url(&mut self, url: &str) -> Result<&mut Self, BundleError> {
    validate_exchange_url(self.version, url)?;
    self.primary_url = Some(url.to_string());
    Ok(self)
  }

  /// Primary URL recorded so far.
  pub fn primary_url(&self) -> Option<&str> {
    self.primary_url.as_deref()
  }

  /// Append a resource, rejecting duplicate or malformed URLs and headers.
  pub fn add(&mut self, resource: Resource) -> Result<(), BundleError> {
    validate_exchange_url(self.version, &resource.url)?;
    if self.urls.contains(&resource.url) {
      return Err(BundleError::DuplicateUrl(resource.url));
    }
    for (name, value) in &resource.headers {
      validate_header(&resource.url, name, value)?;
    }

    let response = encode_response(resource.status, &resource.headers, resource.content);
    self.urls.insert(resource.url.clone());
    self.exchanges.push(Exchange {
      url: resource.url,
      response,
    });
    Ok(())
  }

  /// Convenience wrapper adding a `200 OK` exchange.
  pub fn add_file(
    &mut self,
    url: &str,
    content: impl Into<Vec<u8>>,
    headers: Headers,
  ) -> Result<(), BundleError> {
    self.add(Resource::new(url, content, headers))
  }

  /// Add an empty `301` exchange pointing at `location`.
  pub fn add_redirect(&mut self, url: &str, location: &str) -> Result<(), BundleError> {
    self.add(Resource::redirect(url, location))
  }

  /// Whether an exchange for `url` has been added.
  pub fn contains(&self, url: &str) -> bool {
    self.urls.contains(url)
  }

  /// Number of exchanges added so far.
  pub fn len(&self) -> usize {
    self.exchanges.len()
  }

  /// Returns true when nothing has been added.
  pub fn is_empty(&self) -> bool {
    self.exchanges.is_empty()
  }

  /// URLs in the order they will appear in the responses section.
  pub fn urls(&self) -> impl Iterator<Item = &str> {
    self.exchanges.iter().map(|exchange| exchange.url.as_str())
  }

  /// Serialise the collected exchanges into the archive bytes.
  pub fn finalize(&self) -> Result<Archive, BundleError> {
    if self.exchanges.is_empty() {
      return Err(BundleError::EmptyBundle);
    }
    if let Some(primary) = &self.primary_url
      && !self.urls.contains(primary)
    {
      return Err(BundleError::DanglingPrimaryUrl(primary.clone()));
    }
    if self.version == FormatVersion::B1 && self.primary_url.is_none() {
      return Err(BundleError::PrimaryUrlRequired);
    }

    let mut sections: Vec<(&str, Vec<u8>)> = Vec::new();
    if self.version == FormatVersion::B2
      && let Some(primary) = &self.primary_url
    {
      sections.push(("primary", cbor::encode(&Value::from(primary.as_str()))));
    }
    sections.push(("index", self.encode_index()));
    sections.push(("responses", self.encode_responses()));

    Ok(Archive::new(self.encode_top_level(&sections)))
  }

  fn encode_index(&self) -> Vec<u8> {
    let mut offset = cbor::array_header_len(self.exchanges.len()) as u64;
    let mut entries = Vec::with_capacity(self.exchanges.len());

    for exchange in &self.exchanges {
      let length = exchange.response.len() as u64;
      let location = match self.version {
        FormatVersion::B1 => vec![Value::from(""), Value::from(offset), Value::from(length)],
        FormatVersion::B2 => vec![Value::from(offset), Value::from(length)],
      };
      entries.push((Value::from(exchange.url.as_str()), Value::Array(location)));
      offset += length;
    }

    cbor::encode(&Value::Map(entries))
  }

  fn encode_responses(&self) -> Vec<u8> {
    let mut out = Vec::new();
    cbor::write_array_header(self.exchanges.len(), &mut out);
    for exchange in &self.exchanges {
      out.extend_from_slice(&exchange.response);
    }
    out
  }

  fn encode_top_level(&self, sections: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let section_lengths = Value::Array(
      sections
        .iter()
        .flat_map(|(name, bytes)| [Value::from(*name), Value::from(bytes.len() as u64)])
        .collect(),
    );

    let mut out = Vec::new();
    let field_count = match self.version {
      FormatVersion::B1 => 6,
      FormatVersion::B2 => 5,
    };
    cbor::write_array_header(field_count, &mut out);
    cbor::encode_into(&Value::from(&BUNDLE_MAGIC[..]), &mut out);
    cbor::encode_into(&Value::from(&self.version.marker()[..]), &mut out);
    if self.version == FormatVersion::B1 {
      let primary = self.primary_url.as_deref().unwrap_or_default();
      cbor::encode_into(&Value::from(primary), &mut out);
    }
    cbor::encode_into(&Value::Bytes(cbor::encode(&section_lengths)), &mut out);

    cbor::write_array_header(sections.len(), &mut out);
    for (_, bytes) in sections {
      out.extend_from_slice(bytes);
    }

    cbor::encode_into(&Value::Bytes(vec![0; LENGTH_FIELD_SIZE]), &mut out);
    let total = out.len() as u64;
    let length_start = out.len() - LENGTH_FIELD_SIZE;
    out[length_start..].copy_from_slice(&total.to_be_bytes());
    out
  }
}

fn encode_response(status: u16, headers: &Headers, payload: Vec<u8>) -> Vec<u8> {
  let mut header_map = vec![(
    Value::from(b":status".as_slice()),
    Value::Bytes(status.to_string().into_bytes()),
  )];
  header_map.extend(headers.iter().map(|(name, value)| {
    (
      Value::Bytes(name.as_bytes().to_vec()),
      Value::Bytes(value.as_bytes().to_vec()),
    )
  }));

  cbor::encode(&Value::Array(vec![
    Value::Bytes(cbor::encode(&Value::Map(header_map))),
    Value::Bytes(payload),
  ]))
}
