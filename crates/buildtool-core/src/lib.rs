//! buildtool core library
//!
//! Decides, per repository, whether a release artifact must be built or can be
//! reused, and drives the remote build service for the ones that must.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use buildtool_core::{
//!     BuildKind, BuildOptions, Credentials, ManifestSourceCodeManager,
//!     RepositoryBuildOrchestrator,
//! };
//!
//! let scm = Arc::new(ManifestSourceCodeManager::load(&manifest_path)?);
//! let orchestrator = RepositoryBuildOrchestrator::from_options(
//!     BuildKind::Debian, &options, scm.clone(), Credentials::from_env,
//! )?;
//! let summary = orchestrator.run(scm.repositories()).await?;
//! ```

pub mod config;
pub mod error;
pub mod existence;
pub mod fakes;
pub mod invoker;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod orchestrator;
pub mod profile;
pub mod scm;
pub mod substitutions;
pub mod telemetry;

pub use config::{BuildOptions, Credentials, ExistenceErrorPolicy};
pub use error::{BuildToolError, Result};
pub use existence::{
    ArtifactExistenceChecker, ExistenceQuery, PackageVersionChecker, RegistryTagChecker,
};
pub use invoker::{
    build_log_path, CloudBuildInvoker, InvocationOutcome, InvocationRequest, RemoteBuildInvoker,
};
pub use metrics::{BuildMetrics, Labels, TimerStats};
pub use model::{
    BuildOutcome, BuildVersion, PassSummary, RepoBuildState, Repository, RepositoryReport,
};
pub use orchestrator::{OrchestratorSettings, RepositoryBuildOrchestrator};
pub use profile::{debian_package_name, BuildKind, BuildProfile};
pub use scm::{ManifestSourceCodeManager, SourceCodeManager, SourceManifest};
pub use substitutions::{sanitize_branch_tag, SubstitutionSet};
pub use telemetry::init_tracing;
