//! Side-effect-free preview of what a sync would do.
//!
//! Two traversals, zero filesystem mutation: a forward scan classifying every
//! source file as create/update/conflict, and an orphan scan reporting target
//! files with no source counterpart. Orphans are reported, never deleted;
//! deletion is irreversible and bulk sync performs no target-initiated
//! deletions. The orphan scan reports files only: a target-only directory
//! surfaces through the files inside it, and an empty one holds nothing a
//! sync could act on.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::fs;

use crate::config::SyncConfig;
use crate::ignore::IgnoreMatcher;
use crate::notifier::Notifier;

use super::detector::ChangeDetector;
use super::types::{ChangeKind, ChangeRecord, FileDescriptor};
use super::walk_tree;

/// Classifies every pending action without touching the filesystem. Individual
/// stat/read failures are logged and skipped; both scans always run to
/// completion.
pub async fn preview(
    config: &SyncConfig,
    notifier: Arc<dyn Notifier>,
) -> Result<Vec<ChangeRecord>> {
    preview_with_detector(config, notifier, ChangeDetector::new()).await
}

pub async fn preview_with_detector(
    config: &SyncConfig,
    notifier: Arc<dyn Notifier>,
    detector: ChangeDetector,
) -> Result<Vec<ChangeRecord>> {
    config.validate()?;
    let ignore = IgnoreMatcher::new(&config.ignore_patterns)?;
    let mut records = Vec::new();

    forward_scan(config, &ignore, &detector, &notifier, &mut records).await;
    orphan_scan(config, &ignore, &notifier, &mut records).await;

    Ok(records)
}

/// Source-rooted scan: what a sync would create or update, and which updates
/// are actually conflicts because the target is the newer divergence.
async fn forward_scan(
    config: &SyncConfig,
    ignore: &IgnoreMatcher,
    detector: &ChangeDetector,
    notifier: &Arc<dyn Notifier>,
    records: &mut Vec<ChangeRecord>,
) {
    for entry in walk_tree(&config.source, ignore) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                notifier.warn(&format!("Preview: skipping unreadable entry: {err}"));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&config.source) else {
            continue;
        };
        let source_path = entry.path();
        let target_path = config.target.join(relative);

        if !fs::try_exists(&target_path).await.unwrap_or(false) {
            records.push(ChangeRecord {
                kind: ChangeKind::Create,
                relative_path: relative.to_path_buf(),
                source_path: Some(source_path.to_path_buf()),
                target_path: Some(target_path),
            });
            continue;
        }

        let compared = async {
            let source_desc = FileDescriptor::read(source_path).await?;
            let target_desc = FileDescriptor::read(&target_path).await?;
            let different = detector
                .are_different(source_path, &source_desc, &target_path, &target_desc)
                .await?;
            anyhow::Ok((different, source_desc, target_desc))
        }
        .await;

        match compared {
            Ok((false, _, _)) => {}
            Ok((true, source_desc, target_desc)) => {
                let kind = if source_desc.modified > target_desc.modified {
                    ChangeKind::Update
                } else {
                    // Target is the newer, unexplained change.
                    ChangeKind::Conflict
                };
                records.push(ChangeRecord {
                    kind,
                    relative_path: relative.to_path_buf(),
                    source_path: Some(source_path.to_path_buf()),
                    target_path: Some(target_path),
                });
            }
            Err(err) => {
                notifier.warn(&format!(
                    "Preview: could not compare {}: {err:#}",
                    relative.display()
                ));
            }
        }
    }
}

/// Target-rooted scan: files that exist only in the target. A sync would
/// leave them untouched; they are surfaced so the user knows.
async fn orphan_scan(
    config: &SyncConfig,
    ignore: &IgnoreMatcher,
    notifier: &Arc<dyn Notifier>,
    records: &mut Vec<ChangeRecord>,
) {
    if !target_exists(&config.target).await {
        return;
    }

    for entry in walk_tree(&config.target, ignore) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                notifier.warn(&format!("Preview: skipping unreadable entry: {err}"));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&config.target) else {
            continue;
        };

        let source_path = config.source.join(relative);
        if !fs::try_exists(&source_path).await.unwrap_or(false) {
            records.push(ChangeRecord {
                kind: ChangeKind::Orphan,
                relative_path: relative.to_path_buf(),
                source_path: None,
                target_path: Some(entry.path().to_path_buf()),
            });
        }
    }
}

async fn target_exists(target: &Path) -> bool {
    fs::try_exists(target).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::MemoryNotifier;
    use filetime::FileTime;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Fixture {
        source: TempDir,
        target: TempDir,
        notifier: Arc<MemoryNotifier>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                source: TempDir::new().unwrap(),
                target: TempDir::new().unwrap(),
                notifier: Arc::new(MemoryNotifier::default()),
            }
        }

        fn config(&self) -> SyncConfig {
            SyncConfig::new(self.source.path(), self.target.path())
        }

        async fn run(&self) -> Vec<ChangeRecord> {
            preview(&self.config(), self.notifier.clone()).await.unwrap()
        }
    }

    fn write(root: &Path, relative: &str, contents: &[u8], mtime: SystemTime) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_system_time(mtime)).unwrap();
    }

    /// Snapshot of a tree's contents and mtimes, for purity checks.
    fn snapshot(root: &Path) -> BTreeMap<PathBuf, (Vec<u8>, FileTime)> {
        let mut map = BTreeMap::new();
        for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                let metadata = entry.metadata().unwrap();
                map.insert(
                    entry.path().to_path_buf(),
                    (
                        std::fs::read(entry.path()).unwrap(),
                        FileTime::from_last_modification_time(&metadata),
                    ),
                );
            }
        }
        map
    }

    #[tokio::test]
    async fn test_classification() {
        let fx = Fixture::new();
        let base = SystemTime::now() - Duration::from_secs(3600);

        // Create: only in source.
        write(fx.source.path(), "new.txt", b"n", base);
        // Update: both sides differ, source newer.
        write(fx.source.path(), "upd.txt", b"source!", base + Duration::from_secs(100));
        write(fx.target.path(), "upd.txt", b"target", base);
        // Conflict: both sides differ, target newer.
        write(fx.source.path(), "cfl.txt", b"source!", base);
        write(fx.target.path(), "cfl.txt", b"target", base + Duration::from_secs(100));
        // Unchanged: identical.
        write(fx.source.path(), "same.txt", b"equal", base);
        write(fx.target.path(), "same.txt", b"equal", base);

        let records = fx.run().await;
        let kind_of = |name: &str| {
            records
                .iter()
                .find(|r| r.relative_path == Path::new(name))
                .map(|r| r.kind)
        };

        assert_eq!(kind_of("new.txt"), Some(ChangeKind::Create));
        assert_eq!(kind_of("upd.txt"), Some(ChangeKind::Update));
        assert_eq!(kind_of("cfl.txt"), Some(ChangeKind::Conflict));
        assert_eq!(kind_of("same.txt"), None);
    }

    #[tokio::test]
    async fn test_orphan_detection() {
        let fx = Fixture::new();
        let now = SystemTime::now();
        write(fx.target.path(), "old.txt", b"left behind", now);

        let records = fx.run().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, ChangeKind::Orphan);
        assert_eq!(records[0].relative_path, Path::new("old.txt"));
        assert!(records[0].source_path.is_none());
    }

    #[tokio::test]
    async fn test_preview_is_pure() {
        let fx = Fixture::new();
        let base = SystemTime::now() - Duration::from_secs(3600);
        write(fx.source.path(), "a.txt", b"aaa", base);
        write(fx.source.path(), "dir/b.txt", b"bbb", base);
        write(fx.target.path(), "a.txt", b"old", base + Duration::from_secs(5));
        write(fx.target.path(), "orphan.txt", b"ooo", base);

        let source_before = snapshot(fx.source.path());
        let target_before = snapshot(fx.target.path());

        let records = fx.run().await;
        assert!(!records.is_empty());

        assert_eq!(snapshot(fx.source.path()), source_before);
        assert_eq!(snapshot(fx.target.path()), target_before);
    }

    #[tokio::test]
    async fn test_missing_target_yields_all_creates() {
        let source = TempDir::new().unwrap();
        let now = SystemTime::now();
        write(source.path(), "one.txt", b"1", now);
        write(source.path(), "sub/two.txt", b"2", now);

        let holder = TempDir::new().unwrap();
        let config = SyncConfig::new(source.path(), holder.path().join("never-created"));
        let notifier: Arc<dyn Notifier> = Arc::new(MemoryNotifier::default());

        let records = preview(&config, notifier).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind == ChangeKind::Create));
    }

    #[tokio::test]
    async fn test_ignored_paths_excluded_from_both_scans() {
        let fx = Fixture::new();
        let now = SystemTime::now();
        write(fx.source.path(), "node_modules/x.js", b"x", now);
        write(fx.target.path(), "node_modules/y.js", b"y", now);
        write(fx.source.path(), "real.txt", b"r", now);

        let mut config = fx.config();
        config.ignore_patterns = vec!["**/node_modules".to_string()];
        let records = preview(&config, fx.notifier.clone()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path, Path::new("real.txt"));
    }
}
