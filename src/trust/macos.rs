//! macOS trust anchors via the `security` tool and the System keychain.

use super::{TrustOutcome, cert_arg, execute, operation_error};
use crate::command::{CommandRunner, Invocation};
use crate::error::{TrustError, TrustResult};
use std::path::{Path, PathBuf};

/// Keychain that receives trusted roots.
pub const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

/// Authorization right that gates changes to admin trust settings.
pub const TRUST_SETTINGS_RIGHT: &str = "com.apple.trust-settings.admin";

pub(super) async fn install<R: CommandRunner>(runner: &R, cert: &Path) -> TrustResult<TrustOutcome> {
    let cert = cert_arg(cert)?;

    let verify = Invocation::new("security", ["verify-cert", "-c", cert.as_str()]);
    if execute(runner, &verify).await?.success {
        tracing::debug!(%cert, "certificate already verifies against the keychain");
        return Ok(TrustOutcome::AlreadyTrusted);
    }

    // Widen the authorization so add-trusted-cert does not prompt per change.
    let allow = Invocation::new(
        "sudo",
        ["security", "authorizationdb", "write", TRUST_SETTINGS_RIGHT, "allow"],
    );
    let output = execute(runner, &allow).await?;
    if !output.success {
        return Err(TrustError::PermissionDenied {
            operation: "granting trust-settings authorization",
            output: output.combined(),
        });
    }

    // The grant must be revoked exactly once from here on, whatever happens.
    let added = add_trusted_cert(runner, &cert).await;
    let revoked = revoke_authorization(runner).await;

    match (added, revoked) {
        (Ok(()), Ok(())) => Ok(TrustOutcome::Installed {
            location: PathBuf::from(SYSTEM_KEYCHAIN),
            refresh_hint: None,
        }),
        (Err(add_failure), Ok(())) => Err(add_failure),
        (added, Err(output)) => Err(TrustError::RevokeFailed {
            output,
            add_failure: added.err().map(Box::new),
        }),
    }
}

async fn add_trusted_cert<R: CommandRunner>(runner: &R, cert: &str) -> TrustResult<()> {
    let add = Invocation::new(
        "sudo",
        [
            "security",
            "add-trusted-cert",
            "-d",
            "-r",
            "trustRoot",
            "-k",
            SYSTEM_KEYCHAIN,
            cert,
        ],
    );
    let output = execute(runner, &add).await?;
    if !output.success {
        return Err(operation_error(
            "adding the certificate to the System keychain",
            &add,
            &output,
        ));
    }
    Ok(())
}

/// Captured output of the failed revoke on error.
async fn revoke_authorization<R: CommandRunner>(runner: &R) -> Result<(), String> {
    let remove = Invocation::new(
        "sudo",
        ["security", "authorizationdb", "remove", TRUST_SETTINGS_RIGHT],
    );
    match runner.run(&remove).await {
        Ok(output) if output.success => Ok(()),
        Ok(output) => Err(output.combined()),
        Err(e) => Err(format!("failed to execute `{remove}`: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::{FakeRunner, failed, ok};

    const CERT: &str = "/Users/dev/.config/crtforge/root/inter/shop/shop.crt";

    fn revoke_count(runner: &FakeRunner) -> usize {
        runner
            .command_lines()
            .iter()
            .filter(|line| line.contains("authorizationdb remove"))
            .count()
    }

    #[tokio::test]
    async fn already_trusted_runs_no_mutating_commands() {
        let runner = FakeRunner::new(|_| Ok(ok()));

        let outcome = install(&runner, Path::new(CERT)).await.expect("trust");

        assert_eq!(outcome, TrustOutcome::AlreadyTrusted);
        assert_eq!(
            runner.command_lines(),
            [format!("security verify-cert -c {CERT}")]
        );
    }

    #[tokio::test]
    async fn untrusted_cert_is_added_between_grant_and_revoke() {
        let runner = FakeRunner::new(|invocation| {
            if invocation.args[0] == "verify-cert" {
                return Ok(failed("CSSMERR_TP_NOT_TRUSTED"));
            }
            Ok(ok())
        });

        let outcome = install(&runner, Path::new(CERT)).await.expect("trust");

        assert_eq!(
            outcome,
            TrustOutcome::Installed {
                location: PathBuf::from(SYSTEM_KEYCHAIN),
                refresh_hint: None,
            }
        );
        assert_eq!(
            runner.command_lines(),
            [
                format!("security verify-cert -c {CERT}"),
                format!("sudo security authorizationdb write {TRUST_SETTINGS_RIGHT} allow"),
                format!(
                    "sudo security add-trusted-cert -d -r trustRoot -k {SYSTEM_KEYCHAIN} {CERT}"
                ),
                format!("sudo security authorizationdb remove {TRUST_SETTINGS_RIGHT}"),
            ]
        );
    }

    #[tokio::test]
    async fn failed_add_still_revokes_exactly_once() {
        let runner = FakeRunner::new(|invocation| {
            if invocation.args[0] == "verify-cert" {
                return Ok(failed("not trusted"));
            }
            if invocation.args.get(1).map(String::as_str) == Some("add-trusted-cert") {
                return Ok(failed("SecTrustSettingsSetTrustSettings: The authorization was denied"));
            }
            Ok(ok())
        });

        let err = install(&runner, Path::new(CERT)).await.expect_err("add fails");

        assert!(matches!(err, TrustError::CommandFailed { .. }));
        assert!(err.to_string().contains("authorization was denied"));
        assert_eq!(revoke_count(&runner), 1);
        assert!(
            runner
                .command_lines()
                .last()
                .expect("calls")
                .contains("authorizationdb remove")
        );
    }

    #[tokio::test]
    async fn revoke_failure_is_reported_with_the_add_failure() {
        let runner = FakeRunner::new(|invocation| match invocation.args.get(1).map(String::as_str) {
            _ if invocation.args[0] == "verify-cert" => Ok(failed("not trusted")),
            Some("add-trusted-cert") => Ok(failed("add exploded")),
            Some("authorizationdb") if invocation.args[2] == "remove" => {
                Ok(failed("remove exploded"))
            }
            _ => Ok(ok()),
        });

        let err = install(&runner, Path::new(CERT)).await.expect_err("both fail");

        match err {
            TrustError::RevokeFailed { output, add_failure } => {
                assert!(output.contains("remove exploded"));
                let add_failure = add_failure.expect("add failure kept");
                assert!(add_failure.to_string().contains("add exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(revoke_count(&runner), 1);
    }

    #[tokio::test]
    async fn denied_grant_stops_before_keychain_changes() {
        let runner = FakeRunner::new(|invocation| {
            if invocation.args[0] == "verify-cert" {
                return Ok(failed("not trusted"));
            }
            Ok(failed("sudo: a password is required"))
        });

        let err = install(&runner, Path::new(CERT)).await.expect_err("grant denied");

        assert!(matches!(err, TrustError::PermissionDenied { .. }));
        assert_eq!(runner.calls().len(), 2);
        assert_eq!(revoke_count(&runner), 0);
    }
}
