//! Host-facing artifact set and output delivery.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::collector::ClaimSet;
use crate::error::EmitError;
use crate::models::ArtifactContent;

/// Receives the final bytes of a generation pass.
pub trait Emitter {
  /// Register `bytes` under `file_name`.
  fn emit(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), EmitError>;
}

/// One output file of the host build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
  /// File name relative to the output location, `/` separated.
  pub file_name: String,
  /// Content of the file.
  pub content: ArtifactContent,
}

/// Ordered artifact mapping owned by the host.
///
/// Iteration follows insertion order; inserting an existing file name replaces its content in
/// place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
  entries: Vec<ArtifactEntry>,
}

impl ArtifactSet {
  /// Empty set.
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or replace an entry.
  pub fn insert(&mut self, file_name: impl Into<String>, content: ArtifactContent) {
    let file_name = file_name.into();
    match self.entries.iter_mut().find(|entry| entry.file_name == file_name) {
      Some(entry) => entry.content = content,
      None => self.entries.push(ArtifactEntry { file_name, content }),
    }
  }

  /// Look up an entry by file name.
  pub fn get(&self, file_name: &str) -> Option<&ArtifactContent> {
    self
      .entries
      .iter()
      .find(|entry| entry.file_name == file_name)
      .map(|entry| &entry.content)
  }

  /// Drop every entry consumed by the bundle.
  pub fn remove_claimed(&mut self, claims: &ClaimSet) {
    self.entries.retain(|entry| !claims.contains(&entry.file_name));
  }

  /// Entries in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = &ArtifactEntry> {
    self.entries.iter()
  }

  /// File names in insertion order.
  pub fn file_names(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|entry| entry.file_name.as_str())
  }

  /// Number of entries.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns true when the set holds no entries.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl Emitter for ArtifactSet {
  fn emit(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), EmitError> {
    self.insert(file_name, ArtifactContent::Binary(bytes));
    Ok(())
  }
}

impl FromIterator<(String, ArtifactContent)> for ArtifactSet {
  fn from_iter<I: IntoIterator<Item = (String, ArtifactContent)>>(iter: I) -> Self {
    let mut set = Self::new();
    for (file_name, content) in iter {
      set.insert(file_name, content);
    }
    set
  }
}

/// Where the host writes the artifacts of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
  /// Output directory.
  Dir(PathBuf),
  /// Single output file; artifacts land next to it.
  File(PathBuf),
}

impl OutputTarget {
  /// Directory the artifacts of the pass are written to.
  pub fn dir(&self) -> &Path {
    match self {
      Self::Dir(dir) => dir,
      Self::File(file) => file.parent().unwrap_or(Path::new("")),
    }
  }

  /// Path an artifact called `file_name` ends up at.
  pub fn artifact_path(&self, file_name: &str) -> PathBuf {
    self.dir().join(file_name)
  }
}

impl fmt::Display for OutputTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Dir(path) | Self::File(path) => write!(f, "{}", path.display()),
    }
  }
}

/// Artifacts and destination of one host build pass.
#[derive(Debug, Clone, Default)]
pub struct GenerationPass {
  /// Output location, if the host has one for this pass.
  pub output_target: Option<OutputTarget>,
  /// Artifacts produced so far.
  pub artifacts: ArtifactSet,
}

impl GenerationPass {
  /// Pass writing into `target`.
  pub fn new(output_target: OutputTarget, artifacts: ArtifactSet) -> Self {
    Self {
      output_target: Some(output_target),
      artifacts,
    }
  }
}

impl Emitter for GenerationPass {
  fn emit(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), EmitError> {
    if self.output_target.is_none() {
      return Err(EmitError::NoOutputTarget);
    }
    self.artifacts.emit(file_name, bytes)
  }
}

/// Writes artifacts straight to a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryEmitter {
  dir: PathBuf,
}

impl DirectoryEmitter {
  /// Emitter rooted at `dir`.
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  /// Write every artifact with final content, skipping pending entries.
  pub fn write_all(&mut self, artifacts: &ArtifactSet) -> Result<usize, EmitError> {
    let mut written = 0;
    for entry in artifacts.iter() {
      if let Some(bytes) = entry.content.bytes() {
        self.emit(&entry.file_name, bytes.to_vec())?;
        written += 1;
      }
    }
    Ok(written)
  }
}

impl Emitter for DirectoryEmitter {
  fn emit(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), EmitError> {
    let path = self.dir.join(file_name);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(|source| EmitError::Io {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    fs::write(&path, bytes).map_err(|source| EmitError::Io { path, source })
  }
}
