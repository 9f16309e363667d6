//! User-facing summaries for issuance and trust results.

use crate::issue::{IssuanceRequest, IssueReport};
use crate::trust::TrustOutcome;
use std::path::Path;

/// Startup facts that only affect the guidance printed to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportContext {
    /// Running inside a container, so printed host paths need translating.
    pub in_container: bool,
}

impl ReportContext {
    /// `container_flag` is the `--container` switch, `container_var` the value
    /// of `CONTAINER`. Only the literal `true` counts.
    pub fn new(container_flag: bool, container_var: Option<&str>) -> Self {
        Self {
            in_container: container_flag || container_var == Some("true"),
        }
    }
}

/// Final issuance summary: app name, its alternative names, where to look.
pub fn print_issue_summary(request: &IssuanceRequest, report: &IssueReport, ctx: ReportContext) {
    tracing::info!(
        app = %request.app_name,
        created = report.created(),
        dir = %report.artifacts.dir.display(),
        "app certificate ready"
    );

    success!("App certs created successfully.");
    detail!("App name: {}", request.app_name);
    detail!("Domains: {}", request.alt_names.join(", "));
    detail!(
        "To see your cert files, please check the dir: {}",
        report.artifacts.dir.display()
    );
    if report.created() == 0 {
        detail!("Every artifact already existed; nothing was changed.");
    }

    if ctx.in_container {
        print_container_guidance();
    }
}

/// Outcome of a trust attempt that did not fail.
pub fn print_trust_outcome(cert: &Path, outcome: &TrustOutcome) {
    match outcome {
        TrustOutcome::Installed {
            location,
            refresh_hint,
        } => {
            success!("{} has been added to the trust store.", cert.display());
            detail!("Location: {}", location.display());
            if let Some(command) = refresh_hint {
                detail!("Run `{command}` to activate it for system TLS clients.");
            }
        }
        TrustOutcome::AlreadyTrusted => {
            success!("{} is already trusted.", cert.display());
        }
        TrustOutcome::Unsupported { platform } => {
            warn!("Unknown OS '{platform}'. Can not trust the cert.");
            detail!("Import {} into your trust store manually.", cert.display());
        }
    }
}

fn print_container_guidance() {
    warn!("You are running crtforge from a container.");
    detail!("The paths you see in the logs are not valid on the host.");
    detail!("Replace /root with your own home directory.");
    detail!("For example /root/.config/crtforge -> /home/user/.config/crtforge");
}
