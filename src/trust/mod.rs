//! Host trust-store registration for an issued certificate.
//!
//! The OS family is decided once per [`TrustAnchor::trust`] call and then
//! dispatched to a single backend. Both backends only describe external
//! commands, so they are compiled on every platform and exercised with a fake
//! [`CommandRunner`] in tests.

mod linux;
mod macos;

pub use linux::{LinuxDistro, ca_display_name};
pub use macos::{SYSTEM_KEYCHAIN, TRUST_SETTINGS_RIGHT};

use crate::command::{CommandOutput, CommandRunner, Invocation, path_arg};
use crate::error::{TrustError, TrustResult};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Operating system family, decided once from the platform identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
    Unsupported(String),
}

impl OsFamily {
    /// Map a platform identifier (`std::env::consts::OS` style, `darwin`
    /// accepted as an alias for macOS).
    pub fn from_platform(platform: &str) -> Self {
        match platform {
            "linux" => Self::Linux,
            "macos" | "darwin" => Self::MacOs,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn detect() -> Self {
        Self::from_platform(std::env::consts::OS)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => f.write_str("Linux"),
            Self::MacOs => f.write_str("macOS"),
            Self::Unsupported(platform) => write!(f, "{platform} (unsupported)"),
        }
    }
}

/// Result of a trust attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustOutcome {
    /// Certificate registered at `location`. `refresh_hint` is the command the
    /// user still has to run for the OS to pick it up, if any.
    Installed {
        location: PathBuf,
        refresh_hint: Option<&'static str>,
    },
    /// The OS already trusts the certificate; nothing was changed.
    AlreadyTrusted,
    /// No trust backend exists for this platform.
    Unsupported { platform: String },
}

/// Installs certificates into the host trust store.
#[derive(Debug, Clone)]
pub struct TrustAnchor<R> {
    runner: R,
    fs_root: PathBuf,
}

impl<R: CommandRunner> TrustAnchor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            fs_root: PathBuf::from("/"),
        }
    }

    /// Resolve distribution markers and anchor directories under `root`
    /// instead of `/`.
    #[must_use]
    pub fn with_fs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.fs_root = root.into();
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Trust `cert` on the running OS.
    pub async fn trust(&self, cert: &Path) -> TrustResult<TrustOutcome> {
        self.trust_on(&OsFamily::detect(), cert).await
    }

    /// Trust `cert` using the backend for `family`.
    pub async fn trust_on(&self, family: &OsFamily, cert: &Path) -> TrustResult<TrustOutcome> {
        tracing::info!(os = %family, cert = %cert.display(), "trusting certificate");
        match family {
            OsFamily::Linux => linux::install(&self.runner, &self.fs_root, cert).await,
            OsFamily::MacOs => macos::install(&self.runner, cert).await,
            OsFamily::Unsupported(platform) => Ok(TrustOutcome::Unsupported {
                platform: platform.clone(),
            }),
        }
    }
}

/// Run `invocation`, mapping launch failures to [`TrustError`].
async fn execute<R: CommandRunner>(runner: &R, invocation: &Invocation) -> TrustResult<CommandOutput> {
    runner.run(invocation).await.map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            return TrustError::MissingDependency(format!(
                "command '{}' not found in PATH",
                invocation.program
            ));
        }
        TrustError::CommandSpawn {
            command: invocation.command_line(),
            source,
        }
    })
}

/// Error for a command that ran and exited non-zero.
fn operation_error(operation: &'static str, invocation: &Invocation, output: &CommandOutput) -> TrustError {
    let output = output.combined();
    if permission_denied_hint(&output) {
        return TrustError::PermissionDenied { operation, output };
    }
    TrustError::CommandFailed {
        operation,
        command: invocation.command_line(),
        output,
    }
}

fn permission_denied_hint(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("permission denied")
        || lower.contains("not permitted")
        || lower.contains("not authorized")
        || lower.contains("user interaction is not allowed")
        || lower.contains("a password is required")
        || lower.contains("not in the sudoers")
}

fn cert_arg(cert: &Path) -> TrustResult<String> {
    path_arg(cert).ok_or_else(|| TrustError::NonUtf8Path(cert.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::FakeRunner;
    use tempfile::TempDir;

    const CERT: &str = "/home/dev/.config/crtforge/root/intermediate/shop/shop.crt";

    #[test]
    fn platform_identifiers_map_to_families() {
        assert_eq!(OsFamily::from_platform("linux"), OsFamily::Linux);
        assert_eq!(OsFamily::from_platform("darwin"), OsFamily::MacOs);
        assert_eq!(OsFamily::from_platform("macos"), OsFamily::MacOs);
        assert_eq!(
            OsFamily::from_platform("windows"),
            OsFamily::Unsupported("windows".to_string())
        );
        assert_eq!(
            OsFamily::from_platform("freebsd"),
            OsFamily::Unsupported("freebsd".to_string())
        );
    }

    #[tokio::test]
    async fn linux_selects_linux_branch_only() {
        let root = TempDir::new().expect("tempdir");
        let anchor = TrustAnchor::new(FakeRunner::succeeding()).with_fs_root(root.path());

        let outcome = anchor
            .trust_on(&OsFamily::from_platform("linux"), Path::new(CERT))
            .await
            .expect("trust");

        let calls = anchor.runner().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "sudo");
        assert_eq!(calls[0].args[0], "cp");
        assert!(matches!(outcome, TrustOutcome::Installed { .. }));
    }

    #[tokio::test]
    async fn darwin_selects_macos_branch_only() {
        let anchor = TrustAnchor::new(FakeRunner::succeeding());

        let outcome = anchor
            .trust_on(&OsFamily::from_platform("darwin"), Path::new(CERT))
            .await
            .expect("trust");

        let calls = anchor.runner().command_lines();
        assert_eq!(calls, [format!("security verify-cert -c {CERT}")]);
        assert_eq!(outcome, TrustOutcome::AlreadyTrusted);
    }

    #[tokio::test]
    async fn unsupported_platform_is_reported_without_commands() {
        let anchor = TrustAnchor::new(FakeRunner::succeeding());

        let outcome = anchor
            .trust_on(&OsFamily::from_platform("plan9"), Path::new(CERT))
            .await
            .expect("unsupported is not an error");

        assert_eq!(
            outcome,
            TrustOutcome::Unsupported {
                platform: "plan9".to_string()
            }
        );
        assert!(anchor.runner().calls().is_empty());
    }

    #[test]
    fn permission_wording_is_detected() {
        assert!(permission_denied_hint("cp: cannot create regular file: Permission denied"));
        assert!(permission_denied_hint("sudo: a password is required"));
        assert!(!permission_denied_hint("cp: cannot stat 'x.crt': No such file or directory"));
    }
}
