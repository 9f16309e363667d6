//! Configuration structures for certificate issuance.
//!
//! An [`IssueConfig`] comes from an optional TOML file and is overlaid with
//! command-line values. Missing CA paths are derived from a [`CaLayout`].

use crate::error::ConfigError;
use crate::issue::{ExportPassword, IssuanceRequest};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under `~/.config` that holds the CA tree.
pub const DEFAULT_BASE_DIR_NAME: &str = "crtforge";

/// Default root CA directory name.
pub const DEFAULT_ROOT_CA_NAME: &str = "root";

/// Default intermediate CA directory name.
pub const DEFAULT_INTERMEDIATE_CA_NAME: &str = "intermediate";

/// Issuance settings as read from TOML or assembled from the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IssueConfig {
    pub app_name: Option<String>,
    pub common_name: Option<String>,
    pub alt_names: Vec<String>,
    /// Parent of the app directory. Defaults to the intermediate CA directory.
    pub output_dir: Option<PathBuf>,
    pub intermediate_ca: IntermediateCaConfig,
    pub root_ca_crt: Option<PathBuf>,
    pub ca_layout: CaLayout,
    /// Also write a password-protected `.pfx` bundle.
    pub pfx: bool,
    /// Trust the issued certificate on this host afterwards.
    pub trust: bool,
}

/// Explicit intermediate CA file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntermediateCaConfig {
    pub cnf: Option<PathBuf>,
    pub crt: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

/// On-disk CA tree used when paths are not given explicitly:
///
/// ```text
/// <base>/<root>/<root>.crt
/// <base>/<root>/<intermediate>/<intermediate>.{cnf,crt,key}
/// <base>/<root>/<intermediate>/<app>/...
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaLayout {
    /// Defaults to `~/.config/crtforge` on every platform.
    pub base_dir: Option<PathBuf>,
    pub root: String,
    pub intermediate: String,
}

impl Default for CaLayout {
    fn default() -> Self {
        Self {
            base_dir: None,
            root: DEFAULT_ROOT_CA_NAME.to_string(),
            intermediate: DEFAULT_INTERMEDIATE_CA_NAME.to_string(),
        }
    }
}

impl CaLayout {
    pub fn base_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.base_dir {
            Some(dir) => expand_path(dir),
            None => default_base_dir(),
        }
    }

    pub fn root_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.base_dir()?.join(&self.root))
    }

    pub fn intermediate_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.root_dir()?.join(&self.intermediate))
    }

    pub fn root_crt(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.root_dir()?.join(format!("{}.crt", self.root)))
    }

    /// `<intermediate dir>/<intermediate>.<extension>`
    pub fn intermediate_file(&self, extension: &str) -> Result<PathBuf, ConfigError> {
        Ok(self
            .intermediate_dir()?
            .join(format!("{}.{extension}", self.intermediate)))
    }
}

impl IssueConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `overrides` on top of `self`. Set values win; lists replace
    /// when non-empty; flags are enabled by either side.
    #[must_use]
    pub fn merge(self, overrides: IssueConfig) -> Self {
        Self {
            app_name: overrides.app_name.or(self.app_name),
            common_name: overrides.common_name.or(self.common_name),
            alt_names: if overrides.alt_names.is_empty() {
                self.alt_names
            } else {
                overrides.alt_names
            },
            output_dir: overrides.output_dir.or(self.output_dir),
            intermediate_ca: IntermediateCaConfig {
                cnf: overrides.intermediate_ca.cnf.or(self.intermediate_ca.cnf),
                crt: overrides.intermediate_ca.crt.or(self.intermediate_ca.crt),
                key: overrides.intermediate_ca.key.or(self.intermediate_ca.key),
            },
            root_ca_crt: overrides.root_ca_crt.or(self.root_ca_crt),
            ca_layout: CaLayout {
                base_dir: overrides.ca_layout.base_dir.or(self.ca_layout.base_dir),
                ..self.ca_layout
            },
            pfx: self.pfx || overrides.pfx,
            trust: self.trust || overrides.trust,
        }
    }

    /// Resolve defaults and build the issuance request.
    ///
    /// Alt names default to the app name; the common name defaults to the
    /// first alt name.
    pub fn into_request(self, export_password: ExportPassword) -> Result<IssuanceRequest, ConfigError> {
        let app_name = self
            .app_name
            .ok_or_else(|| ConfigError::Missing("app name".to_string()))?;
        let alt_names = if self.alt_names.is_empty() {
            vec![app_name.clone()]
        } else {
            self.alt_names
        };
        let common_name = match self.common_name {
            Some(name) => name,
            None => alt_names[0].clone(),
        };

        let layout = &self.ca_layout;
        Ok(IssuanceRequest {
            output_dir: resolve(self.output_dir, || layout.intermediate_dir())?,
            intermediate_ca_cnf: resolve(self.intermediate_ca.cnf, || layout.intermediate_file("cnf"))?,
            intermediate_ca_crt: resolve(self.intermediate_ca.crt, || layout.intermediate_file("crt"))?,
            intermediate_ca_key: resolve(self.intermediate_ca.key, || layout.intermediate_file("key"))?,
            root_ca_crt: resolve(self.root_ca_crt, || layout.root_crt())?,
            app_name,
            common_name,
            alt_names,
            export_bundle: self.pfx,
            export_password,
        })
    }
}

/// `~/.config/crtforge`, on macOS as well.
pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Missing(
            "could not determine the home directory (set ca_layout.base_dir)".to_string(),
        )
    })?;
    Ok(home.join(".config").join(DEFAULT_BASE_DIR_NAME))
}

fn resolve(
    explicit: Option<PathBuf>,
    derived: impl FnOnce() -> Result<PathBuf, ConfigError>,
) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => expand_path(&path),
        None => derived(),
    }
}

/// Expand a leading `~` in `path`, failing when HOME is not available.
pub fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let Some(text) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    let expanded = shellexpand::tilde(text).to_string();

    // When HOME is unset, shellexpand leaves ~ unchanged
    if text.starts_with('~') && expanded.starts_with('~') {
        return Err(ConfigError::Invalid(format!(
            "could not expand ~ in {text} (HOME is not set); use an absolute path"
        )));
    }
    Ok(PathBuf::from(expanded))
}
