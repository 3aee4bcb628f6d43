#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod bundle;
pub mod collector;
pub mod config;
pub mod emit;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod signing;

pub use bundle::{Archive, BundleBuilder};
pub use collector::{AssetCollector, ClaimSet, CollectedAssets};
pub use config::{PluginOptions, ValidatedOptions};
pub use emit::{ArtifactSet, DirectoryEmitter, Emitter, GenerationPass, OutputTarget};
pub use error::{BundleError, ConfigError, EmitError, PipelineError, SigningError};
pub use models::{ArtifactContent, FormatVersion, Headers, Resource, ResourceWarning};
pub use pipeline::{PassOutcome, WebBundlePlugin, build_bundle};
pub use report::{PipelineEvent, Reporter, TracingReporter};
pub use signing::{Ed25519KeyStrategy, SigningStrategy, WebBundleId};
