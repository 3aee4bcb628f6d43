//! One generation pass: collect, build, optionally sign, then emit.

use std::path::PathBuf;
use std::sync::Arc;

use crate::bundle::Archive;
use crate::collector::{AssetCollector, ClaimSet};
use crate::config::{PluginOptions, Signing, ValidatedOptions};
use crate::emit::{ArtifactSet, Emitter, GenerationPass};
use crate::error::PipelineError;
use crate::models::ResourceWarning;
use crate::report::{PipelineEvent, Reporter, SkipReason, TracingReporter};
use crate::signing::{IntegrityBlockSigner, WebBundleId};

/// Bytes produced for one pass, before they are handed to the host.
#[derive(Debug, Clone)]
pub struct BundleOutput {
  /// Final output, integrity block included when signed.
  pub bytes: Vec<u8>,
  /// Number of exchanges in the bundle.
  pub resources: usize,
  /// Resources dropped along the way.
  pub warnings: Vec<ResourceWarning>,
  /// Artifacts consumed by the bundle.
  pub claims: ClaimSet,
  /// Identity of the signed bundle.
  pub web_bundle_id: Option<WebBundleId>,
}

/// Summary of an emitted bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedBundle {
  /// Output artifact name.
  pub output: String,
  /// Size of the emitted bytes.
  pub size: usize,
  /// Number of exchanges.
  pub resources: usize,
  /// Resources dropped along the way.
  pub warnings: Vec<ResourceWarning>,
  /// Identity of the signed bundle.
  pub web_bundle_id: Option<WebBundleId>,
}

/// What a pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
  /// Nothing was produced.
  Skipped(SkipReason),
  /// A bundle artifact was registered with the host.
  Emitted(EmittedBundle),
}

/// Build-tool plugin producing a web bundle at the end of each generation pass.
pub struct WebBundlePlugin {
  options: PluginOptions,
  reporter: Arc<dyn Reporter>,
}

impl WebBundlePlugin {
  /// Plugin reporting through `tracing`.
  pub fn new(options: PluginOptions) -> Self {
    let reporter = Arc::new(TracingReporter::new(options.debug));
    Self { options, reporter }
  }

  /// Replace the event sink.
  pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
    self.reporter = reporter;
    self
  }

  /// Run one pass over `pass`.
  ///
  /// On success the bundle is registered under the configured output name and every consumed
  /// artifact is removed. On failure the artifact set is left untouched.
  pub async fn generate_bundle(
    &self,
    pass: &mut GenerationPass,
  ) -> Result<PassOutcome, PipelineError> {
    let reason = match &pass.output_target {
      None => Some(SkipReason::NoOutputTarget),
      Some(_) if pass.artifacts.is_empty() => Some(SkipReason::EmptyArtifactSet),
      Some(_) => None,
    };
    if let Some(reason) = reason {
      self.reporter.report(&PipelineEvent::PassSkipped { reason });
      return Ok(PassOutcome::Skipped(reason));
    }

    let result = self.run(pass).await;
    if let Err(err) = &result {
      self.reporter.report(&PipelineEvent::PassFailed {
        message: err.to_string(),
      });
    }
    result
  }

  async fn run(&self, pass: &mut GenerationPass) -> Result<PassOutcome, PipelineError> {
    let options = self.options.clone().validate().await?;
    if let Some(target) = &pass.output_target {
      self.reporter.report(&PipelineEvent::PassStarted {
        output_target: target.to_string(),
        artifacts: pass.artifacts.len(),
      });
    }

    let skip_file = pass
      .output_target
      .as_ref()
      .map(|target| target.artifact_path(&options.output));
    let output = build_bundle(&options, &pass.artifacts, skip_file, self.reporter.as_ref()).await?;

    let size = output.bytes.len();
    pass.artifacts.remove_claimed(&output.claims);
    pass.emit(&options.output, output.bytes)?;
    self.reporter.report(&PipelineEvent::BundleEmitted {
      output: options.output.clone(),
      bytes: size,
    });

    Ok(PassOutcome::Emitted(EmittedBundle {
      output: options.output,
      size,
      resources: output.resources,
      warnings: output.warnings,
      web_bundle_id: output.web_bundle_id,
    }))
  }
}

/// Collect, finalize and sign without touching the host's artifact set.
pub async fn build_bundle(
  options: &ValidatedOptions,
  artifacts: &ArtifactSet,
  skip_file: Option<PathBuf>,
  reporter: &dyn Reporter,
) -> Result<BundleOutput, PipelineError> {
  let mut collector = AssetCollector::new(options, reporter)?;
  if let Some(path) = skip_file {
    collector = collector.skip_file(path);
  }
  let collected = collector.collect(artifacts)?;

  let archive: Archive = collected.builder.finalize()?;
  let resources = collected.builder.len();
  reporter.report(&PipelineEvent::BundleFinalized {
    resources,
    bytes: archive.len(),
  });

  let (bytes, web_bundle_id) = match &options.signing {
    Signing::Unsigned => (archive.into_bytes(), None),
    Signing::Signed(config) => {
      let signed = IntegrityBlockSigner::new(archive.as_bytes(), config)
        .sign()
        .await?;
      reporter.report(&PipelineEvent::BundleSigned {
        origin: config.web_bundle_id.isolated_app_origin(),
        signatures: config.strategies.len(),
      });
      (signed.bytes, Some(config.web_bundle_id.clone()))
    }
  };

  Ok(BundleOutput {
    bytes,
    resources,
    warnings: collected.warnings,
    claims: collected.claims,
    web_bundle_id,
  })
}
