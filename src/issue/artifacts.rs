//! On-disk artifact layout for one application.

use std::path::{Path, PathBuf};

/// File name of the assembled leaf + intermediate + root chain.
pub const FULLCHAIN_FILE: &str = "fullchain.crt";

/// Paths of every artifact the pipeline may create under
/// `<output_dir>/<app_name>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub config: PathBuf,
    pub csr: PathBuf,
    pub certificate: PathBuf,
    pub fullchain: PathBuf,
    pub bundle: PathBuf,
}

impl ArtifactSet {
    pub fn new(output_dir: &Path, app_name: &str) -> Self {
        let dir = output_dir.join(app_name);
        Self {
            key: dir.join(format!("{app_name}.key")),
            config: dir.join(format!("{app_name}.cnf")),
            csr: dir.join(format!("{app_name}.csr")),
            certificate: dir.join(format!("{app_name}.crt")),
            fullchain: dir.join(FULLCHAIN_FILE),
            bundle: dir.join(format!("{app_name}.pfx")),
            dir,
        }
    }
}

/// What a pipeline step did on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Created,
    Skipped,
    NotRequested,
}

impl StepStatus {
    pub fn is_created(self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReport {
    pub artifacts: ArtifactSet,
    pub app_dir: StepStatus,
    pub key: StepStatus,
    pub config: StepStatus,
    pub csr: StepStatus,
    pub certificate: StepStatus,
    pub fullchain: StepStatus,
    pub bundle: StepStatus,
}

impl IssueReport {
    /// Number of artifacts created on this run.
    pub fn created(&self) -> usize {
        [
            self.app_dir,
            self.key,
            self.config,
            self.csr,
            self.certificate,
            self.fullchain,
            self.bundle,
        ]
        .into_iter()
        .filter(|status| status.is_created())
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_share_the_app_base_name() {
        let set = ArtifactSet::new(Path::new("/ca/root/inter"), "shop");
        assert_eq!(set.dir, Path::new("/ca/root/inter/shop"));
        assert_eq!(set.key, Path::new("/ca/root/inter/shop/shop.key"));
        assert_eq!(set.config, Path::new("/ca/root/inter/shop/shop.cnf"));
        assert_eq!(set.csr, Path::new("/ca/root/inter/shop/shop.csr"));
        assert_eq!(set.certificate, Path::new("/ca/root/inter/shop/shop.crt"));
        assert_eq!(set.fullchain, Path::new("/ca/root/inter/shop/fullchain.crt"));
        assert_eq!(set.bundle, Path::new("/ca/root/inter/shop/shop.pfx"));
    }
}
