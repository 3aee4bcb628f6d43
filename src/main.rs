use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use pkcs8::{EncodePrivateKey, LineEnding};
use same_file::is_same_file;
use tracing::info;
use walkdir::WalkDir;

use wbn_bundler::asset_paths::relative_url_path;
use wbn_bundler::config::DEFAULT_OUTPUT;
use wbn_bundler::signing::{KeySource, PublicKey};
use wbn_bundler::{
  ArtifactContent, ArtifactSet, DirectoryEmitter, Ed25519KeyStrategy, GenerationPass, OutputTarget,
  PassOutcome, PluginOptions, WebBundleId, WebBundlePlugin,
};

#[derive(Parser)]
#[command(name = "wbn-bundle")]
#[command(about = "Pack a build output directory into a Web Bundle", long_about = None)]
#[command(version)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Bundle a dist directory
  Build {
    /// Directory holding the build output
    #[arg(long, default_value = "dist")]
    dist: PathBuf,

    /// Configuration file; defaults to wbn.config.{json,yaml} in the working directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where the bundle is written; defaults to the dist directory
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Log every added resource
    #[arg(long)]
    debug: bool,
  },

  /// Generate an Ed25519 signing key
  Keygen {
    /// Path of the PKCS#8 PEM file to write
    #[arg(long, default_value = "private_key.pem")]
    out: PathBuf,

    /// Overwrite an existing key
    #[arg(long, short)]
    force: bool,
  },

  /// Print the Web Bundle ID for a key
  Id {
    /// PKCS#8 PEM private key
    #[arg(long)]
    key: PathBuf,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Build {
      dist,
      config,
      out_dir,
      debug,
    } => build(&dist, config.as_deref(), out_dir, debug).await,
    Commands::Keygen { out, force } => {
      init_tracing(false);
      keygen(&out, force)
    }
    Commands::Id { key } => {
      init_tracing(false);
      print_id(&key).await
    }
  }
}

fn default_level(debug: bool) -> &'static str {
  if debug { "debug" } else { "info" }
}

fn init_tracing(debug: bool) {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level(debug))),
    )
    .init();
}

/// Load options from `config` or the working directory; `--debug` can only turn debug on.
fn load_options(config: Option<&Path>, cwd: &Path, debug: bool) -> Result<PluginOptions> {
  let mut options = match config {
    Some(path) => PluginOptions::from_path(path)?,
    None => PluginOptions::discover(cwd)?,
  };
  options.debug |= debug;
  Ok(options)
}

async fn build(dist: &Path, config: Option<&Path>, out_dir: Option<PathBuf>, debug: bool) -> Result<()> {
  let options = load_options(config, &std::env::current_dir()?, debug)?;
  init_tracing(options.debug);

  let out_dir = out_dir.unwrap_or_else(|| dist.to_path_buf());
  let output = options.output.clone().unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
  let artifacts = read_dist(dist, &out_dir.join(&output))?;

  let mut pass = GenerationPass::new(OutputTarget::Dir(out_dir.clone()), artifacts);
  let plugin = WebBundlePlugin::new(options);
  match plugin.generate_bundle(&mut pass).await? {
    PassOutcome::Skipped(reason) => info!(%reason, "no web bundle written"),
    PassOutcome::Emitted(emitted) => {
      // Claimed dist files are gone from the set; what remains is the bundle plus pending entries.
      DirectoryEmitter::new(&out_dir).write_all(&pass.artifacts)?;
      info!(
        output = %out_dir.join(&emitted.output).display(),
        resources = emitted.resources,
        bytes = emitted.size,
        skipped = emitted.warnings.len(),
        "wrote web bundle"
      );
    }
  }
  Ok(())
}

/// Load every file under `dist` as a binary artifact, leaving out a previous bundle.
fn read_dist(dist: &Path, previous_output: &Path) -> Result<ArtifactSet> {
  let mut artifacts = ArtifactSet::new();
  for entry in WalkDir::new(dist).sort_by_file_name() {
    let entry = entry.with_context(|| format!("failed to read {}", dist.display()))?;
    if !entry.file_type().is_file() || is_same_file(entry.path(), previous_output).unwrap_or(false) {
      continue;
    }

    let relative = entry.path().strip_prefix(dist).unwrap_or(entry.path());
    let content = fs::read(entry.path())
      .with_context(|| format!("failed to read {}", entry.path().display()))?;
    artifacts.insert(relative_url_path(relative), ArtifactContent::Binary(content));
  }
  Ok(artifacts)
}

fn keygen(out: &Path, force: bool) -> Result<()> {
  if out.exists() && !force {
    bail!("key already exists: {} (use --force to overwrite)", out.display());
  }
  if let Some(parent) = out.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)
      .with_context(|| format!("failed to create directory: {}", parent.display()))?;
  }

  let signing_key = SigningKey::generate(&mut rand::thread_rng());
  let pem = signing_key
    .to_pkcs8_pem(LineEnding::LF)
    .context("failed to encode private key as PKCS#8 PEM")?;
  fs::write(out, pem.as_bytes())
    .with_context(|| format!("failed to write private key: {}", out.display()))?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(out, fs::Permissions::from_mode(0o600))
      .with_context(|| format!("failed to set permissions on: {}", out.display()))?;
  }

  let id = WebBundleId::from_public_key(&PublicKey::Ed25519(
    signing_key.verifying_key().to_bytes(),
  ));
  println!("Wrote {}", out.display());
  println!("Web Bundle ID: {id}");
  println!("Origin: {}", id.isolated_app_origin());
  Ok(())
}

async fn print_id(key: &Path) -> Result<()> {
  let strategy = Ed25519KeyStrategy::load(&KeySource::PemFile(key.to_path_buf())).await?;
  let id = WebBundleId::from_public_key(&PublicKey::Ed25519(strategy.verifying_key().to_bytes()));
  println!("{id}");
  println!("{}", id.isolated_app_origin());
  Ok(())
}
