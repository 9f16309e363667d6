//! Full chain assembly.

use crate::error::{IssueError, IssueResult};
use std::io::Write;
use std::path::Path;

/// Write `leaf || intermediate || root` to `dest`.
///
/// All three sources are read before anything is written. The bytes are
/// staged in a temp file next to `dest` and renamed into place without
/// clobbering, so `dest` is either absent or complete.
pub(crate) async fn assemble(
    leaf: &Path,
    intermediate: &Path,
    root: &Path,
    dest: &Path,
) -> IssueResult<()> {
    let leaf_bytes = read_source("Failed to read app certificate for fullchain", leaf).await?;
    let intermediate_bytes = read_source(
        "Failed to read intermediate CA certificate for fullchain",
        intermediate,
    )
    .await?;
    let root_bytes = read_source("Failed to read root CA certificate for fullchain", root).await?;

    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::Builder::new()
        .prefix(".fullchain-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| IssueError::io("Failed to stage fullchain file", dir, e))?;

    for chunk in [&leaf_bytes, &intermediate_bytes, &root_bytes] {
        staged
            .write_all(chunk)
            .map_err(|e| IssueError::io("Failed to write fullchain file", staged.path(), e))?;
    }
    staged
        .as_file()
        .sync_all()
        .map_err(|e| IssueError::io("Failed to flush fullchain file", staged.path(), e))?;

    // Dropping the error also drops the temp file, removing the staged copy.
    staged
        .persist_noclobber(dest)
        .map_err(|e| IssueError::io("Failed to move fullchain file into place", dest, e.error))?;

    Ok(())
}

async fn read_source(context: &'static str, path: &Path) -> IssueResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| IssueError::io(context, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).expect("write source");
        path
    }

    fn leftovers(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(".fullchain-"))
            .collect()
    }

    #[tokio::test]
    async fn chain_is_leaf_then_intermediate_then_root() {
        let dir = TempDir::new().expect("tempdir");
        let leaf = write(&dir, "app.crt", b"LEAF\n");
        let intermediate = write(&dir, "intermediate.crt", b"INTERMEDIATE\n");
        let root = write(&dir, "root.crt", b"ROOT");
        let dest = dir.path().join("fullchain.crt");

        assemble(&leaf, &intermediate, &root, &dest)
            .await
            .expect("assemble");

        let bytes = std::fs::read(&dest).expect("read fullchain");
        assert_eq!(bytes, b"LEAF\nINTERMEDIATE\nROOT");
        assert!(leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn missing_root_leaves_no_fullchain() {
        let dir = TempDir::new().expect("tempdir");
        let leaf = write(&dir, "app.crt", b"LEAF");
        let intermediate = write(&dir, "intermediate.crt", b"INTERMEDIATE");
        let root = dir.path().join("missing-root.crt");
        let dest = dir.path().join("fullchain.crt");

        let err = assemble(&leaf, &intermediate, &root, &dest)
            .await
            .expect_err("root read must fail");

        assert!(matches!(err, IssueError::Io { ref path, .. } if path == &root));
        assert!(!dest.exists());
        assert!(leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn existing_destination_is_not_clobbered() {
        let dir = TempDir::new().expect("tempdir");
        let leaf = write(&dir, "app.crt", b"NEW-LEAF");
        let intermediate = write(&dir, "intermediate.crt", b"I");
        let root = write(&dir, "root.crt", b"R");
        let dest = write(&dir, "fullchain.crt", b"GOOD");

        assemble(&leaf, &intermediate, &root, &dest)
            .await
            .expect_err("must refuse to overwrite");

        assert_eq!(std::fs::read(&dest).expect("read fullchain"), b"GOOD");
        assert!(leftovers(&dir).is_empty());
    }
}
