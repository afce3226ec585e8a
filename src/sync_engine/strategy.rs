//! Bulk synchronization: one full top-down pass reconciling target to source.
//!
//! Two modes share the traversal. `Force` mirrors unconditionally and never
//! consults the change detector; `Smart` copies only what is new or changed
//! and routes "target is newer" divergences through the conflict resolver.
//! A single file's I/O failure is recorded and logged, never fatal to the
//! pass.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs;

use crate::config::{SyncConfig, SyncMode};
use crate::ignore::IgnoreMatcher;
use crate::notifier::Notifier;

use super::conflict::{ConflictResolver, DiffViewer, PromptProvider};
use super::detector::ChangeDetector;
use super::transfer::copy_preserving_timestamps;
use super::types::{FileDescriptor, SyncError, SyncReport, SyncState};
use super::walk_tree;

pub struct BulkSync {
    config: SyncConfig,
    detector: ChangeDetector,
    resolver: ConflictResolver,
    notifier: Arc<dyn Notifier>,
    state: Arc<SyncState>,
}

impl BulkSync {
    pub fn new(config: SyncConfig, notifier: Arc<dyn Notifier>, state: Arc<SyncState>) -> Self {
        let resolver =
            ConflictResolver::new(config.conflict_policy, notifier.clone(), state.clone());
        Self {
            config,
            detector: ChangeDetector::new(),
            resolver,
            notifier,
            state,
        }
    }

    pub fn with_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptProvider>) -> Self {
        self.resolver = self.resolver.with_prompts(prompts);
        self
    }

    pub fn with_diff_viewer(mut self, viewer: Arc<dyn DiffViewer>) -> Self {
        self.resolver = self.resolver.with_diff_viewer(viewer);
        self
    }

    pub async fn execute(&self) -> Result<SyncReport> {
        self.execute_with_progress(|_, _| {}).await
    }

    /// Runs the pass. `progress` is called after each copied file with the
    /// relative path and the cumulative bytes copied.
    pub async fn execute_with_progress(
        &self,
        progress: impl Fn(&Path, u64),
    ) -> Result<SyncReport> {
        self.config.validate()?;
        let ignore = IgnoreMatcher::new(&self.config.ignore_patterns)?;
        let source_root = &self.config.source;
        let target_root = &self.config.target;

        fs::create_dir_all(target_root)
            .await
            .with_context(|| format!("failed to create target {}", target_root.display()))?;

        let mut report = SyncReport::default();

        for entry in walk_tree(source_root, &ignore) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .and_then(|p| p.strip_prefix(source_root).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    self.record_failure(&mut report, &path, &err.to_string());
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(source_root) {
                Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
                _ => continue, // the root itself
            };
            let target_path = target_root.join(&relative);

            if entry.file_type().is_dir() {
                if let Err(err) = fs::create_dir_all(&target_path).await {
                    self.record_failure(&mut report, &relative, &err.to_string());
                }
                continue;
            }
            if !entry.file_type().is_file() {
                // Symlinks and special files are not mirrored.
                continue;
            }

            match self
                .sync_file(entry.path(), &target_path, &relative, &mut report)
                .await
            {
                Ok(copied) => {
                    if copied {
                        progress(&relative, report.bytes_copied);
                    }
                }
                Err(err) => self.record_failure(&mut report, &relative, &format!("{err:#}")),
            }
        }

        Ok(report)
    }

    /// Returns Ok(true) if the file was copied, Ok(false) if skipped.
    async fn sync_file(
        &self,
        source: &Path,
        target: &Path,
        relative: &Path,
        report: &mut SyncReport,
    ) -> Result<bool> {
        if self.config.mode == SyncMode::Force {
            return self.copy(source, target, report).await.map(|_| true);
        }

        if !fs::try_exists(target).await.unwrap_or(false) {
            return self.copy(source, target, report).await.map(|_| true);
        }

        let source_desc = FileDescriptor::read(source).await?;
        let target_desc = FileDescriptor::read(target).await?;

        if !self
            .detector
            .are_different(source, &source_desc, target, &target_desc)
            .await?
        {
            report.files_skipped += 1;
            return Ok(false);
        }

        let target_newer =
            target_desc.modified > source_desc.modified + self.detector.tolerance();
        if target_newer {
            report.conflicts += 1;
            if !self.resolver.resolve_bulk(source, target, relative).await {
                report.files_skipped += 1;
                return Ok(false);
            }
        }

        self.copy(source, target, report).await?;
        Ok(true)
    }

    async fn copy(&self, source: &Path, target: &Path, report: &mut SyncReport) -> Result<()> {
        let bytes = copy_preserving_timestamps(source, target).await?;
        self.state.mark_synced();
        report.files_copied += 1;
        report.bytes_copied += bytes;
        Ok(())
    }

    fn record_failure(&self, report: &mut SyncReport, relative: &Path, message: &str) {
        let display = format!("Sync failed for {}", relative.display());
        self.notifier.error(&display, Some(message));
        self.notifier.persistent_error(&display);
        report.errors.push(SyncError {
            path: relative.to_path_buf(),
            message: message.to_string(),
        });
    }
}
