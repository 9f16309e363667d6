//! Linux trust anchors: copy the certificate into the distribution's anchor
//! directory.
//!
//! The trust-store refresh command (`update-ca-certificates` and friends) is
//! not run here; the `refresh_hint` of the returned outcome names it so the
//! caller can tell the user.

use super::{TrustOutcome, cert_arg, execute, operation_error};
use crate::command::{CommandRunner, Invocation, path_arg};
use crate::error::{TrustError, TrustResult};
use std::path::{Component, Path, PathBuf};

/// Distribution families with a known trust-anchor directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinuxDistro {
    Debian,
    Arch,
    RedHat,
    Fedora,
}

impl LinuxDistro {
    /// Probe order for [`LinuxDistro::detect`].
    pub const ALL: [LinuxDistro; 4] = [Self::Debian, Self::Arch, Self::RedHat, Self::Fedora];

    /// Marker file, relative to the filesystem root.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Debian => "etc/debian_version",
            Self::Arch => "etc/arch-release",
            Self::RedHat => "etc/redhat-release",
            Self::Fedora => "etc/fedora-release",
        }
    }

    /// Trust-anchor directory, relative to the filesystem root.
    pub fn anchor_dir(self) -> &'static str {
        match self {
            Self::Debian => "usr/local/share/ca-certificates",
            Self::Arch => "etc/ca-certificates/trust-source/anchors",
            Self::RedHat | Self::Fedora => "etc/pki/ca-trust/source/anchors",
        }
    }

    /// Command that rebuilds the system bundle from the anchor directory.
    pub fn refresh_command(self) -> &'static str {
        match self {
            Self::Debian => "sudo update-ca-certificates",
            Self::Arch => "sudo trust extract-compat",
            Self::RedHat | Self::Fedora => "sudo update-ca-trust",
        }
    }

    /// First distribution whose marker exists under `root`; Debian/Ubuntu
    /// when none does.
    pub async fn detect(root: &Path) -> Self {
        for distro in Self::ALL {
            if tokio::fs::try_exists(root.join(distro.marker()))
                .await
                .unwrap_or(false)
            {
                return distro;
            }
        }
        Self::Debian
    }
}

/// Name for the anchored copy of `cert`, built from path components 3, 2 and
/// 0 counted from the end and joined with `-`.
///
/// For the standard layout `<root>/<intermediate>/<app>/<app>.crt` this yields
/// `<root>-<intermediate>-<app>.crt`. Paths with fewer than four components
/// are rejected.
pub fn ca_display_name(cert: &Path) -> TrustResult<String> {
    let parts: Vec<&str> = cert
        .components()
        .rev()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_str()),
            _ => None,
        })
        .collect::<Option<_>>()
        .ok_or_else(|| TrustError::NonUtf8Path(cert.to_path_buf()))?;

    if parts.len() < 4 {
        return Err(TrustError::PathLayout(cert.to_path_buf()));
    }
    Ok(format!("{}-{}-{}", parts[3], parts[2], parts[0]))
}

pub(super) async fn install<R: CommandRunner>(
    runner: &R,
    fs_root: &Path,
    cert: &Path,
) -> TrustResult<TrustOutcome> {
    let name = ca_display_name(cert)?;
    let distro = LinuxDistro::detect(fs_root).await;
    let destination: PathBuf = fs_root.join(distro.anchor_dir()).join(&name);
    tracing::debug!(?distro, destination = %destination.display(), "linux trust anchor");

    let source = cert_arg(cert)?;
    let target = path_arg(&destination).ok_or_else(|| TrustError::NonUtf8Path(destination.clone()))?;
    let copy = Invocation::new("sudo", ["cp", source.as_str(), target.as_str()]);

    let output = execute(runner, &copy).await?;
    if !output.success {
        return Err(operation_error(
            "copying the certificate into the trust store",
            &copy,
            &output,
        ));
    }

    Ok(TrustOutcome::Installed {
        location: destination,
        refresh_hint: Some(distro.refresh_command()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::{FakeRunner, failed};
    use tempfile::TempDir;

    fn with_marker(distro: LinuxDistro) -> TempDir {
        let root = TempDir::new().expect("tempdir");
        let marker = root.path().join(distro.marker());
        std::fs::create_dir_all(marker.parent().expect("marker parent")).expect("etc");
        std::fs::write(marker, "").expect("marker");
        root
    }

    #[test]
    fn display_name_uses_components_three_two_and_zero_from_the_end() {
        let name = ca_display_name(Path::new("/home/dev/.config/crtforge/root/inter/shop/shop.crt"))
            .expect("name");
        assert_eq!(name, "root-inter-shop.crt");

        let name = ca_display_name(Path::new("a/b/c/d.crt")).expect("relative");
        assert_eq!(name, "a-b-d.crt");
    }

    #[test]
    fn shallow_paths_violate_the_layout_precondition() {
        for shallow in ["/b/c/d.crt", "c/d.crt", "d.crt", "/"] {
            assert!(
                matches!(ca_display_name(Path::new(shallow)), Err(TrustError::PathLayout(_))),
                "{shallow}"
            );
        }
    }

    #[tokio::test]
    async fn arch_marker_selects_arch_anchor_dir() {
        let root = with_marker(LinuxDistro::Arch);
        assert_eq!(LinuxDistro::detect(root.path()).await, LinuxDistro::Arch);
        assert_eq!(
            LinuxDistro::Arch.anchor_dir(),
            "etc/ca-certificates/trust-source/anchors"
        );
    }

    #[tokio::test]
    async fn no_marker_defaults_to_debian() {
        let root = TempDir::new().expect("tempdir");
        assert_eq!(LinuxDistro::detect(root.path()).await, LinuxDistro::Debian);
        assert_eq!(
            LinuxDistro::Debian.anchor_dir(),
            "usr/local/share/ca-certificates"
        );
    }

    #[tokio::test]
    async fn debian_marker_wins_over_later_markers() {
        let root = with_marker(LinuxDistro::Fedora);
        std::fs::write(root.path().join(LinuxDistro::Debian.marker()), "12").expect("marker");
        assert_eq!(LinuxDistro::detect(root.path()).await, LinuxDistro::Debian);
    }

    #[tokio::test]
    async fn copies_into_detected_anchor_dir_with_sudo() {
        let root = with_marker(LinuxDistro::RedHat);
        let runner = FakeRunner::succeeding();
        let cert = Path::new("/ca/root/inter/shop/shop.crt");

        let outcome = install(&runner, root.path(), cert).await.expect("install");

        let expected = root
            .path()
            .join("etc/pki/ca-trust/source/anchors/root-inter-shop.crt");
        assert_eq!(
            runner.calls()[0].args,
            ["cp", "/ca/root/inter/shop/shop.crt", expected.to_str().expect("utf-8")]
        );
        assert_eq!(
            outcome,
            TrustOutcome::Installed {
                location: expected,
                refresh_hint: Some("sudo update-ca-trust"),
            }
        );
    }

    #[tokio::test]
    async fn copy_failure_is_reported_with_output() {
        let root = TempDir::new().expect("tempdir");
        let runner = FakeRunner::new(|_| Ok(failed("sudo: a password is required")));

        let err = install(&runner, root.path(), Path::new("/ca/root/inter/shop/shop.crt"))
            .await
            .expect_err("copy fails");

        match err {
            TrustError::PermissionDenied { output, .. } => {
                assert!(output.contains("a password is required"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn shallow_path_runs_no_commands() {
        let root = TempDir::new().expect("tempdir");
        let runner = FakeRunner::succeeding();

        let err = install(&runner, root.path(), Path::new("shop.crt"))
            .await
            .expect_err("precondition");

        assert!(matches!(err, TrustError::PathLayout(_)));
        assert!(runner.calls().is_empty());
    }
}
