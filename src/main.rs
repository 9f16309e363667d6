use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crtforge::config::{CaLayout, IntermediateCaConfig, IssueConfig};
use crtforge::report::{print_issue_summary, print_trust_outcome};
use crtforge::{ExportPassword, ReportContext, SystemRunner, TrustAnchor, issue};
use crtforge::{detail, error as error_msg};

// ============================================================================
// ERROR HANDLING STRATEGY
// ============================================================================
//
// Issuance failures are fatal: they propagate with `?` up to `main`, which
// prints them in red and exits non-zero, because a half-built chain must
// never be used.
//
// Trust failures after a successful issuance are reported and the process
// still exits 0; the certificate on disk is fine and can be trusted by hand.
// The standalone `trust` subcommand has nothing else to do, so there a trust
// failure is the exit status.
//
// Terminal coloring is decorative and its errors are ignored (see `status`).
// ============================================================================

#[derive(Parser)]
#[command(name = "crtforge")]
#[command(version, about = "Issue app certificates from a local CA and trust them on this host")]
struct Cli {
    /// Log every pipeline step
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Running inside a container (only changes path guidance). Also set by
    /// CONTAINER=true.
    #[arg(long, global = true, hide = true)]
    container: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue the certificate set for an application, completing any missing files
    Issue(IssueArgs),

    /// Add a certificate to this host's trust store
    Trust {
        /// Certificate to trust, e.g. <ca dir>/<root>/<intermediate>/<app>/<app>.crt
        cert: PathBuf,
    },
}

#[derive(Args)]
struct IssueArgs {
    /// Path to issuance config file (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Application name (used as directory and file name)
    #[arg(long, short = 'a')]
    app: Option<String>,

    /// Certificate common name (defaults to the first --alt-name)
    #[arg(long)]
    common_name: Option<String>,

    /// DNS subject alternative name, repeatable (defaults to the app name)
    #[arg(long = "alt-name", short = 'd')]
    alt_names: Vec<String>,

    /// Directory that receives <app>/ (defaults to the intermediate CA directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Base directory of the CA tree (defaults to ~/.config/crtforge)
    #[arg(long)]
    ca_dir: Option<PathBuf>,

    /// Intermediate CA OpenSSL config
    #[arg(long)]
    intermediate_cnf: Option<PathBuf>,

    /// Intermediate CA certificate
    #[arg(long)]
    intermediate_crt: Option<PathBuf>,

    /// Intermediate CA private key
    #[arg(long)]
    intermediate_key: Option<PathBuf>,

    /// Root CA certificate
    #[arg(long)]
    root_crt: Option<PathBuf>,

    /// Also export a password-protected .pfx bundle
    #[arg(long)]
    pfx: bool,

    /// Read the .pfx password from this environment variable instead of the
    /// well-known development password
    #[arg(long, requires = "pfx")]
    pfx_password_env: Option<String>,

    /// Trust the issued certificate on this host
    #[arg(long)]
    trust: bool,
}

impl IssueArgs {
    fn overrides(&self) -> IssueConfig {
        IssueConfig {
            app_name: self.app.clone(),
            common_name: self.common_name.clone(),
            alt_names: self.alt_names.clone(),
            output_dir: self.output_dir.clone(),
            intermediate_ca: IntermediateCaConfig {
                cnf: self.intermediate_cnf.clone(),
                crt: self.intermediate_crt.clone(),
                key: self.intermediate_key.clone(),
            },
            root_ca_crt: self.root_crt.clone(),
            ca_layout: CaLayout {
                base_dir: self.ca_dir.clone(),
                ..CaLayout::default()
            },
            pfx: self.pfx,
            trust: self.trust,
        }
    }

    fn export_password(&self) -> Result<ExportPassword> {
        match &self.pfx_password_env {
            Some(var) => {
                let secret = std::env::var(var)
                    .with_context(|| format!("--pfx-password-env: {var} is not set"))?;
                Ok(ExportPassword::supplied(secret))
            }
            None => Ok(ExportPassword::DevelopmentDefault),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let container_var = std::env::var("CONTAINER").ok();
    let ctx = ReportContext::new(cli.container, container_var.as_deref());

    let result = match cli.command {
        Command::Issue(args) => run_issue(args, ctx).await,
        Command::Trust { cert } => run_trust(&cert).await,
    };

    ExitCode::from(exit_status(result))
}

/// Print a failed command in red and map it to exit status 1.
fn exit_status(result: Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = ?e, "command failed");
            error_msg!("{e:#}");
            1
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "crtforge=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_issue(args: IssueArgs, ctx: ReportContext) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => IssueConfig::from_file(path)?,
        None => IssueConfig::default(),
    };
    let export_password = args.export_password()?;
    let config = file_config.merge(args.overrides());
    let trust = config.trust;
    let request = config.into_request(export_password)?;

    issue::check_openssl_installed()?;
    let report = issue::issue(&SystemRunner, &request)
        .await
        .with_context(|| format!("Failed to issue certificates for '{}'", request.app_name))?;
    print_issue_summary(&request, &report, ctx);

    if trust {
        let cert = &report.artifacts.certificate;
        match TrustAnchor::new(SystemRunner).trust(cert).await {
            Ok(outcome) => print_trust_outcome(cert, &outcome),
            Err(e) => {
                tracing::warn!(error = %e, cert = %cert.display(), "trust failed");
                error_msg!("Could not trust {}: {e}", cert.display());
                detail!("The certificate was issued; you can trust it manually.");
            }
        }
    }

    Ok(())
}

async fn run_trust(cert: &Path) -> Result<()> {
    let outcome = TrustAnchor::new(SystemRunner)
        .trust(cert)
        .await
        .with_context(|| format!("Failed to trust {}", cert.display()))?;
    print_trust_outcome(cert, &outcome);
    Ok(())
}
