//! Leaf certificate issuance.
//!
//! [`issue`] walks a fixed sequence of steps. Each step owns exactly one
//! artifact and is skipped when that artifact already exists, so a run that
//! stopped half way resumes from the first missing file and a complete
//! directory is left untouched.
//!
//! Every failure is returned as an [`IssueError`]; the caller decides whether
//! to terminate the process. A tool step that fails removes whatever partial
//! output it produced, never a file that existed before the step ran.

mod artifacts;
mod chain;
pub mod template;

pub use artifacts::{ArtifactSet, FULLCHAIN_FILE, IssueReport, StepStatus};

use crate::cleanup_path;
use crate::command::{CommandRunner, Invocation, path_arg};
use crate::error::{IssueError, IssueResult};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use zeroize::Zeroizing;

/// Validity of the signed leaf certificate.
pub const CERT_VALIDITY_DAYS: u32 = 365;

/// Well-known export password used when the caller supplies none.
pub const DEVELOPMENT_EXPORT_PASSWORD: &str = "changeit";

/// Environment variable through which a supplied export password reaches openssl.
pub const EXPORT_PASSWORD_ENV: &str = "CRTFORGE_PFX_PASSWORD";

const OPENSSL: &str = "openssl";

const OPENSSL_INSTALL_INSTRUCTIONS: &str = "\
openssl not found in PATH. Install it with your package manager:

Ubuntu/Debian:  sudo apt-get install openssl
Fedora/RHEL:    sudo dnf install openssl
Arch Linux:     sudo pacman -S openssl
macOS:          brew install openssl";

/// Password protecting the `.pfx` export bundle.
#[derive(Clone, Default)]
pub enum ExportPassword {
    /// [`DEVELOPMENT_EXPORT_PASSWORD`]. Anyone can open the bundle; local
    /// development only.
    #[default]
    DevelopmentDefault,
    /// Caller-provided secret, passed to openssl through the environment.
    Supplied(Zeroizing<String>),
}

impl ExportPassword {
    pub fn supplied(secret: String) -> Self {
        Self::Supplied(Zeroizing::new(secret))
    }

    pub fn is_development_default(&self) -> bool {
        matches!(self, Self::DevelopmentDefault)
    }
}

impl fmt::Debug for ExportPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DevelopmentDefault => f.write_str("DevelopmentDefault"),
            Self::Supplied(_) => f.write_str("Supplied(<redacted>)"),
        }
    }
}

/// Everything needed to issue one application certificate.
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    pub output_dir: PathBuf,
    pub app_name: String,
    pub intermediate_ca_cnf: PathBuf,
    pub intermediate_ca_crt: PathBuf,
    pub intermediate_ca_key: PathBuf,
    pub root_ca_crt: PathBuf,
    pub common_name: String,
    pub alt_names: Vec<String>,
    pub export_bundle: bool,
    pub export_password: ExportPassword,
}

impl IssuanceRequest {
    /// Check the request invariants before touching the filesystem.
    pub fn validate(&self) -> IssueResult<()> {
        validate_app_name(&self.app_name)?;
        if self.common_name.trim().is_empty() {
            return Err(IssueError::InvalidRequest(
                "common name must not be empty".to_string(),
            ));
        }
        check_template_value("common name", &self.common_name)?;
        if self.alt_names.is_empty() {
            return Err(IssueError::InvalidRequest(
                "at least one alternative name is required".to_string(),
            ));
        }
        for name in &self.alt_names {
            if name.trim().is_empty() {
                return Err(IssueError::InvalidRequest(format!(
                    "invalid alternative name {name:?}"
                )));
            }
            check_template_value("alternative name", name)?;
        }
        Ok(())
    }

    pub fn artifacts(&self) -> ArtifactSet {
        ArtifactSet::new(&self.output_dir, &self.app_name)
    }
}

/// The app name becomes a directory and a file stem, so it must be a single
/// plain path segment.
pub fn validate_app_name(app_name: &str) -> IssueResult<()> {
    let invalid = |reason: &str| {
        Err(IssueError::InvalidRequest(format!(
            "app name {app_name:?} {reason}"
        )))
    };
    if app_name.is_empty() {
        return invalid("must not be empty");
    }
    if app_name == "." || app_name == ".." {
        return invalid("must not be a relative directory reference");
    }
    if app_name.contains(['/', '\\']) {
        return invalid("must not contain path separators");
    }
    check_template_value("app name", app_name)
}

/// Values substituted into the OpenSSL config must stay on one line and must
/// not contain template placeholders.
fn check_template_value(field: &str, value: &str) -> IssueResult<()> {
    if value.chars().any(char::is_control) {
        return Err(IssueError::InvalidRequest(format!(
            "{field} {value:?} must not contain control characters"
        )));
    }
    if value.contains("{{") || value.contains("}}") {
        return Err(IssueError::InvalidRequest(format!(
            "{field} {value:?} must not contain template braces"
        )));
    }
    Ok(())
}

/// Fail early with install instructions when `openssl` is not on `PATH`.
pub fn check_openssl_installed() -> IssueResult<PathBuf> {
    which::which(OPENSSL)
        .map_err(|_| IssueError::MissingDependency(OPENSSL_INSTALL_INSTRUCTIONS.to_string()))
}

/// Run the issuance pipeline for `request`.
pub async fn issue<R: CommandRunner>(runner: &R, request: &IssuanceRequest) -> IssueResult<IssueReport> {
    request.validate()?;
    let artifacts = request.artifacts();
    tracing::debug!(app = %request.app_name, dir = %artifacts.dir.display(), "issuing app certificate");

    let app_dir = ensure_app_dir(&artifacts.dir).await?;
    let key = generate_key(runner, &artifacts).await?;
    let config = write_config(request, &artifacts).await?;
    let csr = generate_csr(runner, &artifacts).await?;
    let certificate = sign_certificate(runner, request, &artifacts).await?;
    let fullchain = assemble_fullchain(request, &artifacts).await?;
    let bundle = export_bundle(runner, request, &artifacts).await?;

    Ok(IssueReport {
        artifacts,
        app_dir,
        key,
        config,
        csr,
        certificate,
        fullchain,
        bundle,
    })
}

async fn ensure_app_dir(dir: &Path) -> IssueResult<StepStatus> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(0o700);

    match builder.create(dir).await {
        Ok(()) => {
            tracing::debug!(dir = %dir.display(), "app dir created");
            Ok(StepStatus::Created)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            if !tokio::fs::metadata(dir)
                .await
                .map_err(|e| IssueError::io("Failed to inspect app dir", dir, e))?
                .is_dir()
            {
                return Err(IssueError::io(
                    "App dir path exists but is not a directory",
                    dir,
                    std::io::Error::from(ErrorKind::AlreadyExists),
                ));
            }
            tracing::debug!("app dir already exists, skipping");
            Ok(StepStatus::Skipped)
        }
        Err(e) => Err(IssueError::io("Failed to create app dir", dir, e)),
    }
}

async fn generate_key<R: CommandRunner>(runner: &R, artifacts: &ArtifactSet) -> IssueResult<StepStatus> {
    if exists(&artifacts.key).await? {
        tracing::debug!("app key already exists, skipping");
        return Ok(StepStatus::Skipped);
    }

    let key = arg(&artifacts.key)?;
    let invocation = Invocation::new(OPENSSL, ["genpkey", "-algorithm", "RSA", "-out", key.as_str()]);
    run_tool(runner, "App key generation", &invocation, &artifacts.key).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&artifacts.key, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| IssueError::io("Failed to restrict app key permissions", &artifacts.key, e))?;
    }

    tracing::debug!(path = %artifacts.key.display(), "app key generated");
    Ok(StepStatus::Created)
}

async fn write_config(request: &IssuanceRequest, artifacts: &ArtifactSet) -> IssueResult<StepStatus> {
    if exists(&artifacts.config).await? {
        tracing::debug!("app cnf already exists, skipping");
        return Ok(StepStatus::Skipped);
    }

    let rendered = template::render(
        template::APP_CNF_TEMPLATE,
        &request.app_name,
        &request.common_name,
        &request.alt_names,
    );

    let path = &artifacts.config;
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| IssueError::io("Failed to create app cnf", path, e))?;

    let written = async {
        file.write_all(rendered.as_bytes()).await?;
        file.sync_all().await
    }
    .await;
    if let Err(e) = written {
        drop(file);
        cleanup_path(path, "partially written app cnf").await;
        return Err(IssueError::io("Failed to write app cnf", path, e));
    }

    tracing::debug!(path = %path.display(), "app cnf generated");
    Ok(StepStatus::Created)
}

async fn generate_csr<R: CommandRunner>(runner: &R, artifacts: &ArtifactSet) -> IssueResult<StepStatus> {
    if exists(&artifacts.csr).await? {
        tracing::debug!("app csr already exists, skipping");
        return Ok(StepStatus::Skipped);
    }

    let invocation = Invocation::new(
        OPENSSL,
        [
            "req".to_string(),
            "-new".to_string(),
            "-key".to_string(),
            arg(&artifacts.key)?,
            "-config".to_string(),
            arg(&artifacts.config)?,
            "-out".to_string(),
            arg(&artifacts.csr)?,
        ],
    );
    run_tool(runner, "App CSR generation", &invocation, &artifacts.csr).await?;

    tracing::debug!(path = %artifacts.csr.display(), "app csr generated");
    Ok(StepStatus::Created)
}

async fn sign_certificate<R: CommandRunner>(
    runner: &R,
    request: &IssuanceRequest,
    artifacts: &ArtifactSet,
) -> IssueResult<StepStatus> {
    if exists(&artifacts.certificate).await? {
        tracing::debug!("app crt already exists, skipping");
        return Ok(StepStatus::Skipped);
    }

    let invocation = Invocation::new(
        OPENSSL,
        [
            "x509".to_string(),
            "-req".to_string(),
            "-in".to_string(),
            arg(&artifacts.csr)?,
            "-CA".to_string(),
            arg(&request.intermediate_ca_crt)?,
            "-CAkey".to_string(),
            arg(&request.intermediate_ca_key)?,
            "-CAcreateserial".to_string(),
            "-days".to_string(),
            CERT_VALIDITY_DAYS.to_string(),
            "-extensions".to_string(),
            template::SIGNING_EXTENSIONS.to_string(),
            "-extfile".to_string(),
            arg(&artifacts.config)?,
            "-out".to_string(),
            arg(&artifacts.certificate)?,
        ],
    );
    run_tool(runner, "App certificate signing", &invocation, &artifacts.certificate).await?;

    tracing::debug!(path = %artifacts.certificate.display(), "app crt generated");
    Ok(StepStatus::Created)
}

async fn assemble_fullchain(request: &IssuanceRequest, artifacts: &ArtifactSet) -> IssueResult<StepStatus> {
    if exists(&artifacts.fullchain).await? {
        tracing::debug!("app fullchain crt already exists, skipping");
        return Ok(StepStatus::Skipped);
    }

    chain::assemble(
        &artifacts.certificate,
        &request.intermediate_ca_crt,
        &request.root_ca_crt,
        &artifacts.fullchain,
    )
    .await?;

    tracing::debug!(path = %artifacts.fullchain.display(), "app fullchain crt generated");
    Ok(StepStatus::Created)
}

async fn export_bundle<R: CommandRunner>(
    runner: &R,
    request: &IssuanceRequest,
    artifacts: &ArtifactSet,
) -> IssueResult<StepStatus> {
    if !request.export_bundle {
        return Ok(StepStatus::NotRequested);
    }
    if exists(&artifacts.bundle).await? {
        tracing::debug!("app pfx already exists, skipping");
        return Ok(StepStatus::Skipped);
    }

    let key_name = format!("{}.key", request.app_name);
    let bundle_name = format!("{}.pfx", request.app_name);
    let password_arg = match &request.export_password {
        ExportPassword::DevelopmentDefault => {
            crate::warn!(
                "{bundle_name} is protected by the well-known password '{DEVELOPMENT_EXPORT_PASSWORD}'. \
                 Use it for local development only."
            );
            format!("pass:{DEVELOPMENT_EXPORT_PASSWORD}")
        }
        ExportPassword::Supplied(_) => format!("env:{EXPORT_PASSWORD_ENV}"),
    };

    let mut invocation = Invocation::new(
        OPENSSL,
        [
            "pkcs12",
            "-in",
            FULLCHAIN_FILE,
            "-inkey",
            key_name.as_str(),
            "-password",
            password_arg.as_str(),
            "-export",
            "-out",
            bundle_name.as_str(),
        ],
    )
    .current_dir(&artifacts.dir);
    if let ExportPassword::Supplied(secret) = &request.export_password {
        invocation = invocation.env(EXPORT_PASSWORD_ENV, secret);
    }

    run_tool(runner, "App pfx export", &invocation, &artifacts.bundle).await?;

    tracing::debug!(path = %artifacts.bundle.display(), "app pfx generated");
    Ok(StepStatus::Created)
}

/// Run one tool step that is expected to produce `output`.
async fn run_tool<R: CommandRunner>(
    runner: &R,
    step: &'static str,
    invocation: &Invocation,
    output: &Path,
) -> IssueResult<()> {
    let failure = match runner.run(invocation).await {
        Ok(result) if result.success => {
            if exists(output).await? {
                return Ok(());
            }
            IssueError::CommandFailed {
                step,
                command: invocation.command_line(),
                output: format!(
                    "command reported success but {} was not created",
                    output.display()
                ),
            }
        }
        Ok(result) => IssueError::CommandFailed {
            step,
            command: invocation.command_line(),
            output: result.combined(),
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            IssueError::MissingDependency(OPENSSL_INSTALL_INSTRUCTIONS.to_string())
        }
        Err(source) => IssueError::CommandSpawn {
            command: invocation.command_line(),
            source,
        },
    };

    // Only reached when `output` did not exist before the step.
    cleanup_path(output, "partial tool output").await;
    Err(failure)
}

async fn exists(path: &Path) -> IssueResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| IssueError::io("Failed to check for existing artifact", path, e))
}

fn arg(path: &Path) -> IssueResult<String> {
    path_arg(path).ok_or_else(|| IssueError::NonUtf8Path(path.to_path_buf()))
}
