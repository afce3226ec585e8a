pub mod conflict;
pub mod detector;
pub mod preview;
pub mod strategy;
pub mod transfer;
pub mod types;

pub use conflict::{ConflictResolver, DiffViewer, FixedChoice, PromptProvider};
pub use detector::ChangeDetector;
pub use preview::preview;
pub use strategy::BulkSync;
pub use transfer::copy_preserving_timestamps;
pub use types::{
    ChangeKind, ChangeRecord, FileDescriptor, PendingGuard, SyncError, SyncReport, SyncState,
    MTIME_TOLERANCE,
};

use std::path::Path;

use crate::ignore::IgnoreMatcher;

/// Deterministic, ignore-pruned walk of a tree. Entries come out sorted by
/// file name; pruned directories are never descended into. Ignore checks are
/// always against the path relative to `root`, not the current recursion
/// level. Symlinks are not followed.
pub(crate) fn walk_tree(
    root: &Path,
    ignore: &IgnoreMatcher,
) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    let root = root.to_path_buf();
    let ignore = ignore.clone();
    walkdir::WalkDir::new(root.clone())
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| match entry.path().strip_prefix(&root) {
            Ok(relative) => !ignore.is_ignored(relative),
            Err(_) => true,
        })
}
