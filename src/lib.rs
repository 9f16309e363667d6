//! Local CA leaf certificate issuance and host trust anchoring

#[macro_use]
pub mod status;

pub mod command;
pub mod config;
pub mod error;
pub mod issue;
pub mod report;
pub mod trust;

// Re-export common types
pub use command::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use error::{ConfigError, IssueError, TrustError};
pub use issue::{ArtifactSet, ExportPassword, IssuanceRequest, IssueReport, StepStatus, issue};
pub use report::ReportContext;
pub use trust::{OsFamily, TrustAnchor, TrustOutcome};

/// Attempt to remove a file or directory, logging warnings on failure.
///
/// Best-effort cleanup: succeeds silently when cleanup works, warns when it
/// does not, never returns an error.
///
/// # Arguments
///
/// * `path` - Path to file or directory to remove
/// * `description` - Human-readable description of what's being cleaned up
pub async fn cleanup_path<P: AsRef<std::path::Path>>(path: P, description: &str) {
    let path = path.as_ref();

    // Use symlink_metadata so a dangling link is still removed
    let Ok(metadata) = tokio::fs::symlink_metadata(path).await else {
        return;
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "removed {description}"),
        // NotFound is OK - already removed between the check and the removal
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to clean up {description}");
            warn!("Failed to cleanup {description}");
            detail!("Path: {}", path.display());
            detail!("Error: {e}");
            match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    detail!(
                        "Suggestion: Check file permissions or try: sudo rm -rf {}",
                        path.display()
                    );
                }
                _ => {
                    detail!("Suggestion: Remove it manually before re-running");
                }
            }
        }
    }
}
