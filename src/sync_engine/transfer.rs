//! Copies a file and restores the source's timestamps on the destination.
//!
//! A plain copy would stamp the target with "now", which the next comparison
//! would misread as an independent target edit. Restoring the source's
//! pre-copy mtime/atime is what keeps conflict detection honest; it is
//! correctness, not an optimization.

use std::path::Path;

use anyhow::{Context, Result};
use filetime::FileTime;
use tokio::fs;

use super::types::FileDescriptor;

/// Copies `source` to `target` (overwriting, creating parent directories as
/// needed) and sets the target's mtime/atime to the source's pre-copy values.
/// Returns the number of bytes copied.
pub async fn copy_preserving_timestamps(source: &Path, target: &Path) -> Result<u64> {
    // Read before copying: the copy itself may bump the source's atime.
    let descriptor = FileDescriptor::read(source)
        .await
        .with_context(|| format!("failed to stat {}", source.display()))?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let bytes = fs::copy(source, target)
        .await
        .with_context(|| format!("failed to copy {} to {}", source.display(), target.display()))?;

    filetime::set_file_times(
        target,
        FileTime::from_system_time(descriptor.accessed),
        FileTime::from_system_time(descriptor.modified),
    )
    .with_context(|| format!("failed to set timestamps on {}", target.display()))?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_preserves_content_and_mtime() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src.txt");
        let target = dir.path().join("out/dst.txt");

        fs::write(&source, b"payload").await.unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        filetime::set_file_mtime(&source, FileTime::from_system_time(old)).unwrap();

        let bytes = copy_preserving_timestamps(&source, &target).await.unwrap();
        assert_eq!(bytes, 7);
        assert_eq!(fs::read(&target).await.unwrap(), b"payload");

        let source_desc = FileDescriptor::read(&source).await.unwrap();
        let target_desc = FileDescriptor::read(&target).await.unwrap();
        let drift = target_desc
            .modified
            .duration_since(source_desc.modified)
            .unwrap_or_else(|e| e.duration());
        assert!(drift < Duration::from_millis(100), "mtime drift: {drift:?}");
    }

    #[tokio::test]
    async fn test_copy_overwrites_existing_target() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src.txt");
        let target = dir.path().join("dst.txt");

        fs::write(&source, b"new").await.unwrap();
        fs::write(&target, b"stale target bytes").await.unwrap();

        copy_preserving_timestamps(&source, &target).await.unwrap();
        assert_eq!(fs::read(&target).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_copy_creates_missing_parents() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src.txt");
        let target = dir.path().join("a/b/c/dst.txt");

        fs::write(&source, b"deep").await.unwrap();
        copy_preserving_timestamps(&source, &target).await.unwrap();
        assert_eq!(fs::read(&target).await.unwrap(), b"deep");
    }

    #[tokio::test]
    async fn test_copy_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result =
            copy_preserving_timestamps(&dir.path().join("nope"), &dir.path().join("dst")).await;
        assert!(result.is_err());
    }
}
