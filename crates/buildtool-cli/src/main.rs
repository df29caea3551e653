//! buildtool - release build orchestration CLI
//!
//! The `buildtool` command builds the release artifacts of every repository
//! in a source manifest, reusing artifacts that are already published.
//!
//! ## Commands
//!
//! - `build-bom-containers`: container images via the remote build service
//! - `build-debians`: Debian packages via the remote build service
//!
//! Options come from an optional TOML file (`--config`), overridden by flags
//! and their environment variables.

use anyhow::{Context, Result};
use buildtool_core::{
    BuildKind, BuildOptions, Credentials, ExistenceErrorPolicy, ManifestSourceCodeManager,
    PassSummary, Repository, RepositoryBuildOrchestrator,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(name = "buildtool")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release build orchestration for multi-repository distributions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON summary
    #[arg(long, global = true)]
    json: bool,

    /// TOML file with build options
    #[arg(short, long, global = true, env = "BUILDTOOL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build container images for every repository in the manifest
    BuildBomContainers(BuildArgs),

    /// Build Debian packages for every repository in the manifest
    BuildDebians(BuildArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnCheckError {
    /// Stop the pass
    Abort,
    /// Build as though the artifact were absent
    Build,
}

impl From<OnCheckError> for ExistenceErrorPolicy {
    fn from(value: OnCheckError) -> Self {
        match value {
            OnCheckError::Abort => ExistenceErrorPolicy::Abort,
            OnCheckError::Build => ExistenceErrorPolicy::TreatAsAbsent,
        }
    }
}

/// Flags shared by both build commands. Each one overrides the config file.
#[derive(Args, Debug, Default)]
struct BuildArgs {
    /// Source manifest (JSON) listing repositories and versions
    #[arg(long, env = "BUILDTOOL_MANIFEST")]
    manifest: Option<PathBuf>,

    /// GCP project running the remote builds
    #[arg(long, env = "GCB_PROJECT")]
    gcb_project: Option<String>,

    /// Service account for builds and registry queries
    #[arg(long, env = "GCB_SERVICE_ACCOUNT")]
    gcb_service_account: Option<String>,

    /// Registry the images are pushed to
    #[arg(long, env = "DOCKER_REGISTRY")]
    docker_registry: Option<String>,

    /// Branch being released
    #[arg(long, env = "GIT_BRANCH")]
    git_branch: Option<String>,

    /// Package store organization
    #[arg(long, env = "BINTRAY_ORG")]
    bintray_org: Option<String>,

    /// Package store repository holding the Debian packages
    #[arg(long, env = "BINTRAY_DEBIAN_REPOSITORY")]
    bintray_debian_repository: Option<String>,

    /// Package store API base URL
    #[arg(long, env = "BINTRAY_HOST")]
    bintray_host: Option<String>,

    /// Skip repositories whose artifacts are already published
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    skip_existing: Option<bool>,

    /// Maximum simultaneous remote builds (0 = unlimited)
    #[arg(long)]
    max_concurrent_builds: Option<usize>,

    /// Fail at startup when package store credentials are missing
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    require_credentials: Option<bool>,

    /// What to do when an existence check errors
    #[arg(long, value_enum)]
    on_check_error: Option<OnCheckError>,

    /// Directory for per-repository build logs
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Directory holding containers.yml and debs.yml
    #[arg(long)]
    cloudbuild_dir: Option<PathBuf>,

    /// Only build these repositories (comma-separated)
    #[arg(long, value_delimiter = ',')]
    repositories: Vec<String>,

    /// Always build these repositories, even when published (comma-separated)
    #[arg(long, value_delimiter = ',')]
    always_build: Vec<String>,
}

impl BuildArgs {
    /// Overlay the flags that were given onto `options`.
    fn apply(self, options: &mut BuildOptions) {
        options.manifest = self.manifest.or(options.manifest.take());
        options.gcb_project = self.gcb_project.or(options.gcb_project.take());
        options.gcb_service_account = self
            .gcb_service_account
            .or(options.gcb_service_account.take());
        options.docker_registry = self.docker_registry.or(options.docker_registry.take());
        options.git_branch = self.git_branch.or(options.git_branch.take());
        options.bintray_org = self.bintray_org.or(options.bintray_org.take());
        options.bintray_debian_repository = self
            .bintray_debian_repository
            .or(options.bintray_debian_repository.take());

        if let Some(v) = self.bintray_host {
            options.bintray_host = v;
        }
        if let Some(v) = self.skip_existing {
            options.skip_existing = v;
        }
        if let Some(v) = self.max_concurrent_builds {
            options.max_concurrent_builds = v;
        }
        if let Some(v) = self.require_credentials {
            options.require_credentials = v;
        }
        if let Some(v) = self.on_check_error {
            options.existence_error_policy = v.into();
        }
        if let Some(v) = self.logs_dir {
            options.logs_dir = v;
        }
        if let Some(v) = self.cloudbuild_dir {
            options.cloudbuild_dir = v;
        }
        if !self.repositories.is_empty() {
            options.repositories = self.repositories;
        }
        if !self.always_build.is_empty() {
            options.always_build = self.always_build;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    buildtool_core::init_tracing(cli.json, level);

    let (kind, args) = match cli.command {
        Commands::BuildBomContainers(args) => (BuildKind::Container, args),
        Commands::BuildDebians(args) => (BuildKind::Debian, args),
    };
    let options = load_options(cli.config.as_deref(), args)?;
    let summary = cmd_build(kind, &options).await?;
    print_summary(&summary, cli.json)?;

    if !summary.overall_success() {
        anyhow::bail!(
            "{} failed for: {}",
            kind.command_name(),
            summary.failed().join(", ")
        );
    }
    Ok(())
}

/// Read the config file, if any, and apply command-line overrides.
fn load_options(config: Option<&Path>, args: BuildArgs) -> Result<BuildOptions> {
    let mut options = match config {
        Some(path) => BuildOptions::from_toml_file(path)
            .with_context(|| format!("Failed to load config file: {:?}", path))?,
        None => BuildOptions::default(),
    };
    args.apply(&mut options);
    Ok(options)
}

/// Run one build pass over the manifest.
async fn cmd_build(kind: BuildKind, options: &BuildOptions) -> Result<PassSummary> {
    let manifest = options
        .manifest
        .as_deref()
        .context("No source manifest given")?;
    let scm = Arc::new(
        ManifestSourceCodeManager::load(manifest)
            .with_context(|| format!("Failed to load manifest: {:?}", manifest))?,
    );

    let repositories: Vec<_> = scm
        .repositories()
        .into_iter()
        .filter(|r| options.selects(&r.name))
        .collect();
    if repositories.is_empty() {
        anyhow::bail!("No repositories selected from {:?}", manifest);
    }

    let orchestrator =
        RepositoryBuildOrchestrator::from_options(kind, options, scm, Credentials::from_env)
            .context("Invalid build configuration")?;

    info!(
        command = kind.command_name(),
        repositories = repositories.len(),
        "starting build pass"
    );
    run_and_flush(&orchestrator, kind, repositories).await
}

/// Run the pass, then emit the metrics it recorded even if it aborted.
async fn run_and_flush(
    orchestrator: &RepositoryBuildOrchestrator,
    kind: BuildKind,
    repositories: Vec<Repository>,
) -> Result<PassSummary> {
    let result = orchestrator.run(repositories).await;
    let series = orchestrator.metrics().flush();
    debug!(series, "metrics flushed");
    result.with_context(|| format!("{} aborted", kind.command_name()))
}

fn print_summary(summary: &PassSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} ({})", summary.command, summary.pass_id);
    for report in &summary.reports {
        println!(
            "  {:<24} {:<20} {}",
            report.repository,
            report.version,
            report.outcome.label()
        );
    }
    println!(
        "built {}, reused {}, failed {}",
        summary.succeeded().len(),
        summary.skipped().len(),
        summary.failed().len()
    );
    Ok(())
}
