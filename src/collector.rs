//! Gathers static files and build artifacts into a [`BundleBuilder`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use same_file::is_same_file;
use walkdir::WalkDir;

use crate::asset_paths::{content_type_for, relative_url_path, resolve_asset_urls};
use crate::bundle::BundleBuilder;
use crate::config::{Primary, StaticPlacement, StaticSource, ValidatedOptions};
use crate::emit::ArtifactSet;
use crate::error::{BundleError, PipelineError};
use crate::models::{Headers, Resource, ResourceOrigin, ResourceWarning};
use crate::report::{PipelineEvent, Reporter};

const IWA_CONTENT_SECURITY_POLICY: &str = "base-uri 'none'; default-src 'self'; object-src 'none'; \
frame-src 'self' https: blob: data:; connect-src 'self' https: wss:; \
script-src 'self' 'wasm-unsafe-eval'; img-src 'self' https: blob: data:; \
media-src 'self' https: blob: data:; font-src 'self' blob: data:; \
style-src 'self' 'unsafe-inline'; require-trusted-types-for 'script';";

/// Headers every Isolated Web App response must carry. The first three must keep these exact
/// values; the content security policy may be replaced.
const IWA_HEADERS: [(&str, &str, bool); 4] = [
  ("cross-origin-opener-policy", "same-origin", true),
  ("cross-origin-embedder-policy", "require-corp", true),
  ("cross-origin-resource-policy", "same-origin", true),
  ("content-security-policy", IWA_CONTENT_SECURITY_POLICY, false),
];

/// Artifact file names consumed by a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet(BTreeSet<String>);

impl ClaimSet {
  /// Record a claimed file name.
  pub fn insert(&mut self, file_name: impl Into<String>) {
    self.0.insert(file_name.into());
  }

  /// Whether `file_name` was claimed.
  pub fn contains(&self, file_name: &str) -> bool {
    self.0.contains(file_name)
  }

  /// Claimed names, sorted.
  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  /// Number of claims.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Returns true when nothing was claimed.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Result of a collection run.
#[derive(Debug)]
pub struct CollectedAssets {
  /// Builder holding every accepted resource.
  pub builder: BundleBuilder,
  /// Resources that were dropped.
  pub warnings: Vec<ResourceWarning>,
  /// Artifacts the host should remove once the bundle is emitted.
  pub claims: ClaimSet,
}

/// Walks the configured inputs and feeds them to a fresh builder.
///
/// Per-resource failures are recorded as warnings and never abort the run. Only a static
/// source that cannot be opened as a directory is fatal.
pub struct AssetCollector<'a> {
  options: &'a ValidatedOptions,
  reporter: &'a dyn Reporter,
  builder: BundleBuilder,
  warnings: Vec<ResourceWarning>,
  claims: ClaimSet,
  skip_file: Option<PathBuf>,
}

impl<'a> AssetCollector<'a> {
  /// Start collecting for one pass.
  pub fn new(options: &'a ValidatedOptions, reporter: &'a dyn Reporter) -> Result<Self, BundleError> {
    let mut builder = BundleBuilder::new(options.format_version);
    if let Primary::Url(url) = &options.primary {
      builder.set_primary_url(url)?;
    }

    Ok(Self {
      options,
      reporter,
      builder,
      warnings: Vec::new(),
      claims: ClaimSet::default(),
      skip_file: None,
    })
  }

  /// Never bundle `path` from the static directory, typically the bundle being written.
  pub fn skip_file(mut self, path: impl Into<PathBuf>) -> Self {
    self.skip_file = Some(path.into());
    self
  }

  /// Collect static files and artifacts in the configured order.
  pub fn collect(mut self, artifacts: &ArtifactSet) -> Result<CollectedAssets, PipelineError> {
    let options = self.options;
    let static_source = options.static_source.as_ref();
    match options.static_placement {
      StaticPlacement::BeforeArtifacts => {
        if let Some(source) = static_source {
          self.collect_static(source)?;
        }
        self.collect_artifacts(artifacts);
      }
      StaticPlacement::AfterArtifacts => {
        self.collect_artifacts(artifacts);
        if let Some(source) = static_source {
          self.collect_static(source)?;
        }
      }
    }

    Ok(CollectedAssets {
      builder: self.builder,
      warnings: self.warnings,
      claims: self.claims,
    })
  }

  fn collect_static(&mut self, source: &StaticSource) -> Result<(), PipelineError> {
    let walker = WalkDir::new(&source.dir)
      .follow_links(true)
      .sort_by_file_name();

    for entry in walker {
      let entry = match entry {
        Ok(entry) => entry,
        Err(err) if err.depth() == 0 => {
          return Err(PipelineError::StaticSource {
            path: source.dir.clone(),
            source: err,
          });
        }
        Err(err) => {
          let path = err
            .path()
            .map(|path| display_relative(path, &source.dir))
            .unwrap_or_default();
          self.warn(ResourceOrigin::Static, path, err.to_string());
          continue;
        }
      };

      if entry.depth() == 0 && !entry.file_type().is_dir() {
        return Err(PipelineError::StaticSourceNotDirectory(source.dir.clone()));
      }
      if !entry.file_type().is_file() {
        continue;
      }
      if let Some(skip) = &self.skip_file
        && is_same_file(entry.path(), skip).unwrap_or(false)
      {
        continue;
      }

      let relative = match entry.path().strip_prefix(&source.dir) {
        Ok(relative) => relative_url_path(relative),
        Err(_) => continue,
      };
      match fs::read(entry.path()) {
        Ok(content) => self.add_asset(ResourceOrigin::Static, &source.base_url, &relative, content),
        Err(err) => self.warn(ResourceOrigin::Static, relative, err.to_string()),
      }
    }
    Ok(())
  }

  fn collect_artifacts(&mut self, artifacts: &ArtifactSet) {
    let base_url = self.options.base_url.clone();
    for entry in artifacts.iter() {
      let Some(content) = entry.content.bytes() else {
        self.reporter.report(&PipelineEvent::PendingArtifactSkipped {
          file_name: entry.file_name.clone(),
        });
        continue;
      };

      self.claims.insert(entry.file_name.as_str());
      self.add_asset(ResourceOrigin::Artifact, &base_url, &entry.file_name, content.to_vec());
    }
  }

  fn add_asset(&mut self, origin: ResourceOrigin, base_url: &str, path: &str, content: Vec<u8>) {
    match self.try_add_asset(origin, base_url, path, content) {
      Ok(Some(redirect)) => {
        if let Err(err) = self.builder.add_redirect(&redirect, "./") {
          self.warn(origin, path.to_string(), format!("index redirect {redirect} not added: {err}"));
        }
      }
      Ok(None) => {}
      Err(err) => self.warn(origin, path.to_string(), err.to_string()),
    }
  }

  /// Add the resource itself, returning the index redirect still to be added.
  fn try_add_asset(
    &mut self,
    origin: ResourceOrigin,
    base_url: &str,
    path: &str,
    content: Vec<u8>,
  ) -> Result<Option<String>, BundleError> {
    let urls = resolve_asset_urls(base_url, path);
    let headers = self.headers_for(&urls.url, path)?;
    self.builder.add(Resource::new(urls.url.as_str(), content, headers))?;
    self.reporter.report(&PipelineEvent::ResourceAdded {
      origin,
      path: path.to_string(),
      url: urls.url,
    });

    Ok(urls.index_redirect)
  }

  fn headers_for(&self, url: &str, path: &str) -> Result<Headers, BundleError> {
    let mut headers = Headers::new();
    headers.insert("content-type".into(), content_type_for(path).into());
    headers.extend(self.options.header_override.headers_for(path));

    if self.options.iwa {
      for (name, required, strict) in IWA_HEADERS {
        match headers.get(name) {
          Some(value) if strict && value != required => {
            return Err(BundleError::InvalidHeader {
              url: url.to_string(),
              name: name.to_string(),
              reason: format!("Isolated Web Apps require {required:?}, got {value:?}"),
            });
          }
          Some(_) => {}
          None => {
            headers.insert(name.to_string(), required.to_string());
            self.reporter.report(&PipelineEvent::IwaHeaderDefaulted {
              url: url.to_string(),
              name: name.to_string(),
            });
          }
        }
      }
    }
    Ok(headers)
  }

  fn warn(&mut self, origin: ResourceOrigin, path: String, message: String) {
    let warning = ResourceWarning {
      origin,
      path,
      message,
    };
    self.reporter.report(&PipelineEvent::ResourceDropped(warning.clone()));
    self.warnings.push(warning);
  }
}

fn display_relative(path: &Path, root: &Path) -> String {
  match path.strip_prefix(root) {
    Ok(relative) => relative_url_path(relative),
    Err(_) => path.display().to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  use crate::config::{HeaderOverride, Signing};
  use crate::models::{ArtifactContent, FormatVersion};
  use crate::report::testing::RecordingReporter;

  fn options() -> ValidatedOptions {
    ValidatedOptions {
      format_version: FormatVersion::B2,
      base_url: "/".into(),
      primary: Primary::NoPrimary,
      static_source: None,
      signing: Signing::Unsigned,
      output: "out.wbn".into(),
      header_override: HeaderOverride::None,
      iwa: false,
      static_placement: StaticPlacement::BeforeArtifacts,
      debug: true,
    }
  }

  fn artifacts(entries: &[(&str, ArtifactContent)]) -> ArtifactSet {
    entries
      .iter()
      .map(|(name, content)| (name.to_string(), content.clone()))
      .collect()
  }

  fn text(value: &str) -> ArtifactContent {
    ArtifactContent::Text(value.into())
  }

  #[test]
  fn merges_static_files_before_artifacts() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "hi").unwrap();

    let mut options = options();
    options.static_source = Some(StaticSource {
      dir: dir.path().to_path_buf(),
      base_url: "/s/".into(),
    });
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&artifacts(&[("main.js", text("console.log(1)"))]))
      .unwrap();

    assert_eq!(
      collected.builder.urls().collect::<Vec<_>>(),
      vec!["/s/a.txt", "/main.js"]
    );
    assert!(collected.warnings.is_empty());
    assert!(collected.claims.contains("main.js"));

    let first = collected.builder.finalize().unwrap();
    let second = collected.builder.finalize().unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn honours_static_placement_after_artifacts() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "hi").unwrap();

    let mut options = options();
    options.static_placement = StaticPlacement::AfterArtifacts;
    options.static_source = Some(StaticSource {
      dir: dir.path().to_path_buf(),
      base_url: "/s/".into(),
    });
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&artifacts(&[("main.js", text("1"))]))
      .unwrap();
    assert_eq!(
      collected.builder.urls().collect::<Vec<_>>(),
      vec!["/main.js", "/s/a.txt"]
    );
  }

  #[test]
  fn walks_static_tree_in_sorted_order() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("b")).unwrap();
    fs::write(dir.path().join("b/z.css"), "z").unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    fs::write(dir.path().join(".hidden"), "h").unwrap();
    fs::write(dir.path().join("c.js"), "c").unwrap();

    let mut options = options();
    options.static_source = Some(StaticSource {
      dir: dir.path().to_path_buf(),
      base_url: "/".into(),
    });
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&ArtifactSet::new())
      .unwrap();
    assert_eq!(
      collected.builder.urls().collect::<Vec<_>>(),
      vec!["/.hidden", "/a.txt", "/b/z.css", "/c.js"]
    );
  }

  #[test]
  fn invalid_resources_become_warnings() {
    let options = ValidatedOptions {
      base_url: String::new(),
      ..options()
    };
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&artifacts(&[
        ("bad#fragment.js", text("x")),
        ("good.js", text("y")),
      ]))
      .unwrap();

    assert_eq!(collected.builder.urls().collect::<Vec<_>>(), vec!["good.js"]);
    assert_eq!(collected.warnings.len(), 1);
    assert_eq!(collected.warnings[0].origin, ResourceOrigin::Artifact);
    assert_eq!(collected.warnings[0].path, "bad#fragment.js");
    assert!(collected.claims.contains("bad#fragment.js"));
    assert!(
      reporter
        .events()
        .iter()
        .any(|event| matches!(event, PipelineEvent::ResourceDropped(_)))
    );
  }

  #[test]
  fn duplicate_urls_keep_the_first_resource() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.js"), "static").unwrap();

    let mut options = options();
    options.static_source = Some(StaticSource {
      dir: dir.path().to_path_buf(),
      base_url: "/".into(),
    });
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&artifacts(&[("main.js", text("artifact"))]))
      .unwrap();

    assert_eq!(collected.builder.len(), 1);
    assert_eq!(collected.warnings.len(), 1);
    assert!(collected.warnings[0].message.contains("/main.js"));
  }

  #[test]
  fn pending_artifacts_are_skipped_and_not_claimed() {
    let options = options();
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&artifacts(&[
        ("chunk.js", ArtifactContent::Pending),
        ("main.js", text("1")),
      ]))
      .unwrap();

    assert_eq!(collected.builder.urls().collect::<Vec<_>>(), vec!["/main.js"]);
    assert!(!collected.claims.contains("chunk.js"));
    assert!(collected.warnings.is_empty());
    assert!(reporter.events().contains(&PipelineEvent::PendingArtifactSkipped {
      file_name: "chunk.js".into()
    }));
  }

  #[test]
  fn index_pages_get_directory_url_and_redirect() {
    let options = options();
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&artifacts(&[
        ("index.html", text("<p>root</p>")),
        ("docs/index.html", text("<p>docs</p>")),
      ]))
      .unwrap();

    assert_eq!(
      collected.builder.urls().collect::<Vec<_>>(),
      vec!["/", "/index.html", "/docs/", "/docs/index.html"]
    );
  }

  #[test]
  fn applies_content_type_and_overrides() {
    let mut overrides = Headers::new();
    overrides.insert("content-type".into(), "text/x-custom".into());
    overrides.insert("x-frame-options".into(), "DENY".into());

    let mut options = options();
    options.header_override = HeaderOverride::Static(overrides);
    let reporter = RecordingReporter::default();
    let collector = AssetCollector::new(&options, &reporter).unwrap();

    let headers = collector.headers_for("/app.js", "app.js").unwrap();
    assert_eq!(headers["content-type"], "text/x-custom");
    assert_eq!(headers["x-frame-options"], "DENY");

    let options = ValidatedOptions {
      header_override: HeaderOverride::None,
      ..options
    };
    let collector = AssetCollector::new(&options, &reporter).unwrap();
    let headers = collector.headers_for("/app.js", "app.js").unwrap();
    assert_eq!(headers["content-type"], "text/javascript");
  }

  #[test]
  fn iwa_headers_are_added_and_enforced() {
    let mut options = options();
    options.iwa = true;
    let reporter = RecordingReporter::default();
    let collector = AssetCollector::new(&options, &reporter).unwrap();

    let headers = collector.headers_for("/app.js", "app.js").unwrap();
    assert_eq!(headers["cross-origin-opener-policy"], "same-origin");
    assert_eq!(headers["cross-origin-embedder-policy"], "require-corp");
    assert_eq!(headers["cross-origin-resource-policy"], "same-origin");
    assert_eq!(headers["content-security-policy"], IWA_CONTENT_SECURITY_POLICY);

    let mut overrides = Headers::new();
    overrides.insert("Cross-Origin-Opener-Policy".into(), "unsafe-none".into());
    overrides.insert("Content-Security-Policy".into(), "default-src 'self'".into());
    options.header_override = HeaderOverride::Static(crate::models::lowercase_headers(overrides));
    let collector = AssetCollector::new(&options, &reporter).unwrap();
    let err = collector.headers_for("/app.js", "app.js").unwrap_err();
    assert!(matches!(err, BundleError::InvalidHeader { name, .. } if name == "cross-origin-opener-policy"));
  }

  #[test]
  fn skips_the_output_file_inside_static_dir() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("out.wbn"), "old bundle").unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();

    let mut options = options();
    options.static_source = Some(StaticSource {
      dir: dir.path().to_path_buf(),
      base_url: "/".into(),
    });
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .skip_file(dir.path().join("out.wbn"))
      .collect(&ArtifactSet::new())
      .unwrap();
    assert_eq!(collected.builder.urls().collect::<Vec<_>>(), vec!["/a.txt"]);
  }

  #[test]
  fn failed_index_redirect_keeps_the_page() {
    let options = options();
    let reporter = RecordingReporter::default();
    let mut collector = AssetCollector::new(&options, &reporter).unwrap();
    collector
      .builder
      .add_file("/index.html", "taken", Headers::new())
      .unwrap();

    let collected = collector
      .collect(&artifacts(&[("index.html", text("<p>root</p>"))]))
      .unwrap();

    assert_eq!(
      collected.builder.urls().collect::<Vec<_>>(),
      vec!["/index.html", "/"]
    );
    assert_eq!(collected.warnings.len(), 1);
    assert_eq!(collected.warnings[0].path, "index.html");
    assert!(collected.warnings[0].message.starts_with("index redirect /index.html"));
    assert!(reporter.events().iter().any(|event| matches!(
      event,
      PipelineEvent::ResourceAdded { url, .. } if url == "/"
    )));
  }

  #[cfg(unix)]
  #[test]
  fn broken_static_entries_become_warnings() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("broken.txt")).unwrap();
    fs::write(dir.path().join("c.txt"), "c").unwrap();

    let mut options = options();
    options.static_source = Some(StaticSource {
      dir: dir.path().to_path_buf(),
      base_url: "/".into(),
    });
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&ArtifactSet::new())
      .unwrap();

    assert_eq!(collected.builder.urls().collect::<Vec<_>>(), vec!["/a.txt", "/c.txt"]);
    assert_eq!(collected.warnings.len(), 1);
    assert_eq!(collected.warnings[0].origin, ResourceOrigin::Static);
    assert_eq!(collected.warnings[0].path, "broken.txt");
  }

  #[cfg(unix)]
  #[test]
  fn unreadable_static_files_become_warnings() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let locked = dir.path().join("locked.txt");
    fs::write(&locked, "secret").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    fs::write(dir.path().join("open.txt"), "open").unwrap();
    if fs::read(&locked).is_ok() {
      // Permission bits are not enforced for this user (e.g. root).
      return;
    }

    let mut options = options();
    options.static_source = Some(StaticSource {
      dir: dir.path().to_path_buf(),
      base_url: "/".into(),
    });
    let reporter = RecordingReporter::default();

    let collected = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&ArtifactSet::new())
      .unwrap();

    assert_eq!(collected.builder.urls().collect::<Vec<_>>(), vec!["/open.txt"]);
    assert_eq!(collected.warnings.len(), 1);
    assert_eq!(collected.warnings[0].origin, ResourceOrigin::Static);
    assert_eq!(collected.warnings[0].path, "locked.txt");
  }

  #[test]
  fn static_source_must_be_a_directory() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("f.txt");
    fs::write(&file, "not a dir").unwrap();

    let mut options = options();
    options.static_source = Some(StaticSource {
      dir: file,
      base_url: "/s/".into(),
    });
    let reporter = RecordingReporter::default();

    let result = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&artifacts(&[("main.js", text("1"))]));
    assert!(matches!(result, Err(PipelineError::StaticSourceNotDirectory(_))));
  }

  #[test]
  fn missing_static_dir_is_fatal() {
    let dir = tempdir().unwrap();
    let mut options = options();
    options.static_source = Some(StaticSource {
      dir: dir.path().join("missing"),
      base_url: "/".into(),
    });
    let reporter = RecordingReporter::default();

    let result = AssetCollector::new(&options, &reporter)
      .unwrap()
      .collect(&ArtifactSet::new());
    assert!(matches!(result, Err(PipelineError::StaticSource { .. })));
  }
}
