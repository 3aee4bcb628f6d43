//! Structured events raised while a generation pass runs.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::models::{ResourceOrigin, ResourceWarning};

/// Why a generation pass produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// The pass has no addressable output location.
  NoOutputTarget,
  /// The host handed over an empty artifact set.
  EmptyArtifactSet,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NoOutputTarget => f.write_str("no output target"),
      Self::EmptyArtifactSet => f.write_str("artifact set is empty"),
    }
  }
}

/// Severity attached to a [`PipelineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventLevel {
  /// Only shown with `debug` enabled.
  Debug,
  /// Always shown.
  Info,
  /// A resource was dropped.
  Warn,
  /// The pass failed.
  Error,
}

/// Something that happened during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
  /// The pass was skipped.
  PassSkipped {
    /// Cause of the skip.
    reason: SkipReason,
  },
  /// The pass started collecting resources.
  PassStarted {
    /// Display form of the output target.
    output_target: String,
    /// Number of artifacts offered by the host.
    artifacts: usize,
  },
  /// An artifact without final content was left alone.
  PendingArtifactSkipped {
    /// Artifact file name.
    file_name: String,
  },
  /// A resource was added to the bundle.
  ResourceAdded {
    /// Input the resource came from.
    origin: ResourceOrigin,
    /// Relative path of the input.
    path: String,
    /// Exchange URL.
    url: String,
  },
  /// A resource was dropped; the pass continues.
  ResourceDropped(ResourceWarning),
  /// An Isolated Web App header was filled in.
  IwaHeaderDefaulted {
    /// Exchange URL.
    url: String,
    /// Header name.
    name: String,
  },
  /// The archive bytes were produced.
  BundleFinalized {
    /// Number of exchanges.
    resources: usize,
    /// Archive size in bytes.
    bytes: usize,
  },
  /// An integrity block was prepended.
  BundleSigned {
    /// Origin the signed app is served from.
    origin: String,
    /// Number of signatures in the block.
    signatures: usize,
  },
  /// The output artifact was handed to the host.
  BundleEmitted {
    /// Output file name.
    output: String,
    /// Size in bytes.
    bytes: usize,
  },
  /// The pass failed and emitted nothing.
  PassFailed {
    /// Rendered error.
    message: String,
  },
}

impl PipelineEvent {
  /// Severity of the event.
  pub fn level(&self) -> EventLevel {
    match self {
      Self::BundleSigned { .. } => EventLevel::Info,
      Self::ResourceDropped(_) => EventLevel::Warn,
      Self::PassFailed { .. } => EventLevel::Error,
      _ => EventLevel::Debug,
    }
  }
}

/// Receives pipeline events.
pub trait Reporter: Send + Sync {
  /// Handle one event.
  fn report(&self, event: &PipelineEvent);
}

/// Forwards events to `tracing`, dropping debug events unless enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter {
  debug: bool,
}

impl TracingReporter {
  /// Create a reporter; `debug` enables debug-level events.
  pub fn new(debug: bool) -> Self {
    Self { debug }
  }
}

impl Reporter for TracingReporter {
  fn report(&self, event: &PipelineEvent) {
    if event.level() == EventLevel::Debug && !self.debug {
      return;
    }

    match event {
      PipelineEvent::PassSkipped { reason } => debug!(%reason, "skipping web bundle generation"),
      PipelineEvent::PassStarted {
        output_target,
        artifacts,
      } => debug!(%output_target, artifacts, "processing output"),
      PipelineEvent::PendingArtifactSkipped { file_name } => {
        debug!(file_name, "skipping artifact without final content")
      }
      PipelineEvent::ResourceAdded { origin, path, url } => {
        debug!(%origin, path, url, "added resource")
      }
      PipelineEvent::ResourceDropped(warning) => warn!(
        origin = %warning.origin,
        path = %warning.path,
        "{}",
        warning.message
      ),
      PipelineEvent::IwaHeaderDefaulted { url, name } => {
        debug!(url, name, "added isolated web app header")
      }
      PipelineEvent::BundleFinalized { resources, bytes } => {
        debug!(resources, bytes, "finalized web bundle")
      }
      PipelineEvent::BundleSigned { origin, signatures } => {
        info!(signatures, "signed web bundle, app origin: {origin}")
      }
      PipelineEvent::BundleEmitted { output, bytes } => debug!(output, bytes, "emitted web bundle"),
      PipelineEvent::PassFailed { message } => error!("{message}"),
    }
  }
}
