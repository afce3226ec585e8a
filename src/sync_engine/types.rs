use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Window within which two mtimes count as equal. Filesystem timestamps are
/// rounded differently across volumes and platforms; anything inside this
/// window is ambiguous and falls through to content hashing.
pub const MTIME_TOLERANCE: Duration = Duration::from_millis(2000);

/// Snapshot of a file's metadata, read at decision time. Never cached across
/// calls: a stale descriptor would corrupt conflict decisions.
#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor {
    pub size: u64,
    pub modified: SystemTime,
    pub accessed: SystemTime,
}

impl FileDescriptor {
    pub async fn read(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).await?;
        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified()?,
            accessed: metadata.accessed()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present in source, absent in target.
    Create,
    /// Present in both, source is the newer divergence.
    Update,
    /// Present in both, target is the newer, unexplained divergence.
    Conflict,
    /// Present only in target. Reported, never auto-deleted.
    Orphan,
}

/// One pending action classified by the preview calculator. Transient:
/// produced by a single traversal, rendered, discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub relative_path: PathBuf,
    pub source_path: Option<PathBuf>,
    pub target_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one bulk pass. Per-entry failures land in `errors` instead of
/// aborting the traversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub files_copied: u64,
    pub files_skipped: u64,
    pub conflicts: u64,
    pub bytes_copied: u64,
    pub errors: Vec<SyncError>,
}

/// State shared between bulk sync and the live watcher: the last instant a
/// sync mutated the target tree, and the set of source paths whose conflict
/// is currently awaiting interactive resolution.
///
/// Lock scopes are kept free of await points so a concurrent callback for the
/// same path can never observe a half-applied read-decide-write sequence.
pub struct SyncState {
    last_sync: Mutex<Option<SystemTime>>,
    pending: Mutex<HashSet<PathBuf>>,
}

impl SyncState {
    pub fn new(last_sync: Option<SystemTime>) -> Self {
        Self {
            last_sync: Mutex::new(last_sync),
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn last_sync(&self) -> Option<SystemTime> {
        *self.last_sync.lock().unwrap()
    }

    /// Records that a unit of work just mutated the target tree. Called after
    /// every successful copy or deletion, by bulk sync and watcher alike.
    pub fn mark_synced(&self) {
        *self.last_sync.lock().unwrap() = Some(SystemTime::now());
    }

    /// Whether `source` is already awaiting an interactive resolution.
    pub fn is_pending(&self, source: &Path) -> bool {
        self.pending.lock().unwrap().contains(source)
    }

    /// Claims `source` for interactive resolution. Returns `None` if a
    /// resolution for the same path is already in flight. The returned guard
    /// releases the claim on drop, on every exit path.
    pub fn begin_resolution(state: &Arc<SyncState>, source: &Path) -> Option<PendingGuard> {
        let mut pending = state.pending.lock().unwrap();
        if !pending.insert(source.to_path_buf()) {
            return None;
        }
        Some(PendingGuard {
            state: Arc::clone(state),
            path: source.to_path_buf(),
        })
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Scoped membership in the pending-conflict set. Dropping the guard removes
/// the path, so an aborted resolution can never leave it locked forever.
pub struct PendingGuard {
    state: Arc<SyncState>,
    path: PathBuf,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.state.pending.lock().unwrap().remove(&self.path);
    }
}
