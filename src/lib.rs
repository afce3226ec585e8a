//! treesync keeps a target directory tree synchronized with a source tree,
//! either in a single bulk pass (Smart or Force) or continuously via
//! filesystem event watching, with a dry-run preview and conflict handling
//! that never silently loses unsynced edits in the target tree.

pub mod config;
pub mod ignore;
pub mod notifier;
pub mod sync_engine;
pub mod watcher;

pub use config::{ConfigError, ConflictPolicy, SyncConfig, SyncMode};
pub use ignore::IgnoreMatcher;
pub use notifier::{LogEntry, LogLevel, MemoryNotifier, Notifier};
pub use sync_engine::{
    preview, BulkSync, ChangeDetector, ChangeKind, ChangeRecord, ConflictResolver, DiffViewer,
    PromptProvider, SyncReport, SyncState, MTIME_TOLERANCE,
};
pub use watcher::{LiveWatcher, WatchHandler};
