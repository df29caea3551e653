//! Structured lifecycle events for build passes.
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! Pass `--json` to the CLI for JSON output.

use tracing::info;

/// Span tagging every event of one pass with its id and command.
///
/// ```ignore
/// orchestrator.run_pass(repos).instrument(pass_span("pass-1a2b3c", "build_debians")).await
/// ```
pub fn pass_span(pass_id: &str, command: &str) -> tracing::Span {
    tracing::info_span!("buildtool.pass", pass_id = %pass_id, command = %command)
}

pub fn emit_pass_started(pass_id: &str, command: &str, repositories: usize) {
    info!(
        event = "build.pass_started",
        pass_id = %pass_id,
        command = %command,
        repositories = repositories,
    );
}

/// Emit event: an existing artifact was reused.
pub fn emit_repo_skipped(repository: &str, artifact: &str, version: &str) {
    info!(
        event = "build.repo_skipped",
        repository = %repository,
        artifact = %artifact,
        version = %version,
        "Already have {repository} -- skipping build",
    );
}

pub fn emit_repo_build_started(repository: &str, version: &str, log_path: &std::path::Path) {
    info!(
        event = "build.repo_started",
        repository = %repository,
        version = %version,
        log = %log_path.display(),
    );
}

pub fn emit_repo_finished(repository: &str, outcome: &str, duration_ms: u64) {
    info!(
        event = "build.repo_finished",
        repository = %repository,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

pub fn emit_pass_finished(
    pass_id: &str,
    succeeded: usize,
    skipped: usize,
    failed: usize,
    duration_ms: u64,
) {
    info!(
        event = "build.pass_finished",
        pass_id = %pass_id,
        succeeded = succeeded,
        skipped = skipped,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: an existence check errored but policy says build anyway.
pub fn emit_existence_check_ignored(repository: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "build.check_ignored", repository = %repository, error = %error);
}
