//! Decides whether two files differ, cheapest signal first.
//!
//! Size inequality and a clear mtime gap resolve the common cases with
//! metadata alone; only when both are ambiguous do we pay for a streamed
//! SHA-256 of the full contents.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use super::types::{FileDescriptor, MTIME_TOLERANCE};

const HASH_BUFFER_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    tolerance: Duration,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self {
            tolerance: MTIME_TOLERANCE,
        }
    }

    pub fn with_tolerance(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Short-circuiting difference check: size, then mtime window, then
    /// content hash. Descriptors are passed in so callers stat exactly once
    /// per decision.
    pub async fn are_different(
        &self,
        source: &Path,
        source_desc: &FileDescriptor,
        target: &Path,
        target_desc: &FileDescriptor,
    ) -> Result<bool> {
        if source_desc.size != target_desc.size {
            return Ok(true);
        }

        let delta = match source_desc.modified.duration_since(target_desc.modified) {
            Ok(forward) => forward,
            Err(backward) => backward.duration(),
        };
        if delta > self.tolerance {
            return Ok(true);
        }

        // Same size, mtimes within the ambiguity window: content decides.
        let source_digest = hash_file(source).await?;
        let target_digest = hash_file(target).await?;
        Ok(source_digest != target_digest)
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Streamed SHA-256 so large files never load wholly into memory.
async fn hash_file(path: &Path) -> Result<[u8; 32]> {
    let mut file = fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::time::SystemTime;
    use tempfile::TempDir;

    async fn write_with_mtime(path: &Path, contents: &[u8], mtime: SystemTime) {
        fs::write(path, contents).await.unwrap();
        filetime::set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
    }

    async fn descriptors(a: &Path, b: &Path) -> (FileDescriptor, FileDescriptor) {
        (
            FileDescriptor::read(a).await.unwrap(),
            FileDescriptor::read(b).await.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_identical_files_are_not_different() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let now = SystemTime::now();
        write_with_mtime(&a, b"same content", now).await;
        write_with_mtime(&b, b"same content", now).await;

        let (da, db) = descriptors(&a, &b).await;
        let detector = ChangeDetector::new();
        assert!(!detector.are_different(&a, &da, &b, &db).await.unwrap());
    }

    #[tokio::test]
    async fn test_size_difference_wins_without_hashing() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let now = SystemTime::now();
        write_with_mtime(&a, b"short", now).await;
        write_with_mtime(&b, b"much longer content", now).await;

        let (da, db) = descriptors(&a, &b).await;
        let detector = ChangeDetector::new();
        assert!(detector.are_different(&a, &da, &b, &db).await.unwrap());
    }

    #[tokio::test]
    async fn test_mtime_gap_beyond_tolerance_is_different() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let now = SystemTime::now();
        write_with_mtime(&a, b"same content", now).await;
        write_with_mtime(&b, b"same content", now + Duration::from_millis(2500)).await;

        let (da, db) = descriptors(&a, &b).await;
        let detector = ChangeDetector::new();
        assert!(detector.are_different(&a, &da, &b, &db).await.unwrap());
    }

    #[tokio::test]
    async fn test_mtime_gap_within_tolerance_falls_through_to_hash() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        let now = SystemTime::now();
        write_with_mtime(&a, b"same content", now).await;
        write_with_mtime(&b, b"same content", now + Duration::from_millis(1500)).await;
        write_with_mtime(&c, b"diff content", now + Duration::from_millis(1500)).await;

        let detector = ChangeDetector::new();

        let (da, db) = descriptors(&a, &b).await;
        assert!(!detector.are_different(&a, &da, &b, &db).await.unwrap());

        // Same size and close mtimes, but the bytes differ: the hash catches it.
        let (da, dc) = descriptors(&a, &c).await;
        assert!(detector.are_different(&a, &da, &c, &dc).await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_tolerance() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let now = SystemTime::now();
        write_with_mtime(&a, b"same content", now).await;
        write_with_mtime(&b, b"same content", now + Duration::from_millis(300)).await;

        let (da, db) = descriptors(&a, &b).await;
        let strict = ChangeDetector::with_tolerance(Duration::from_millis(100));
        assert!(strict.are_different(&a, &da, &b, &db).await.unwrap());
    }
}
