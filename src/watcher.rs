//! Continuous synchronization driven by filesystem change notifications.
//!
//! A [`WatchHandler`] holds the per-task state machine; [`LiveWatcher`] owns
//! the OS watch handle and the event loop's lifetime. Events are processed in
//! delivery order, one at a time. The exception is interactive conflict
//! resolution, which can wait on a human for arbitrary real time: it runs in
//! its own task while the pending-conflict set keeps further events for the
//! same path from double-processing it.
//!
//! The conflict definition here differs from bulk sync on purpose: a target
//! file is conflicting if it was modified after the last successful sync,
//! not if its mtime beats the source's. Each mutating action advances that
//! timestamp, so the check is always scoped to "changed since the last thing
//! we did".

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ConflictPolicy, SyncConfig, SyncMode};
use crate::ignore::IgnoreMatcher;
use crate::notifier::Notifier;
use crate::sync_engine::{
    copy_preserving_timestamps, ChangeDetector, ConflictResolver, DiffViewer, FileDescriptor,
    PromptProvider, SyncState,
};

/// Bounded buffer between the notify callback thread and the event loop.
/// Overflow drops the event with a warning instead of growing without bound.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Per-event sync logic. Built once per watch session; configuration is
/// re-read by the caller on every (re)start, never cached across sessions.
pub struct WatchHandler {
    config: SyncConfig,
    ignore: IgnoreMatcher,
    detector: ChangeDetector,
    resolver: Arc<ConflictResolver>,
    notifier: Arc<dyn Notifier>,
    state: Arc<SyncState>,
    prompts: Option<Arc<dyn PromptProvider>>,
    diff_viewer: Option<Arc<dyn DiffViewer>>,
}

impl WatchHandler {
    pub fn new(
        config: SyncConfig,
        notifier: Arc<dyn Notifier>,
        state: Arc<SyncState>,
    ) -> Result<Self> {
        config.validate()?;
        let ignore = IgnoreMatcher::new(&config.ignore_patterns)?;
        let resolver = Arc::new(ConflictResolver::new(
            config.conflict_policy,
            notifier.clone(),
            state.clone(),
        ));
        Ok(Self {
            config,
            ignore,
            detector: ChangeDetector::new(),
            resolver,
            notifier,
            state,
            prompts: None,
            diff_viewer: None,
        })
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptProvider>) -> Self {
        self.prompts = Some(prompts.clone());
        self.rebuild_resolver();
        self
    }

    pub fn with_diff_viewer(mut self, viewer: Arc<dyn DiffViewer>) -> Self {
        self.diff_viewer = Some(viewer);
        self.rebuild_resolver();
        self
    }

    pub fn with_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn source(&self) -> &Path {
        &self.config.source
    }

    fn rebuild_resolver(&mut self) {
        let mut resolver = ConflictResolver::new(
            self.config.conflict_policy,
            self.notifier.clone(),
            self.state.clone(),
        );
        if let Some(prompts) = &self.prompts {
            resolver = resolver.with_prompts(prompts.clone());
        }
        if let Some(viewer) = &self.diff_viewer {
            resolver = resolver.with_diff_viewer(viewer.clone());
        }
        self.resolver = Arc::new(resolver);
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.config.source).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(relative.to_path_buf())
    }

    /// Processes one notification. Per-path failures are logged and raised as
    /// a persistent error; they never stop the event loop.
    pub async fn dispatch(&self, event: Event) {
        for path in &event.paths {
            let Some(relative) = self.relative(path) else {
                continue;
            };
            if self.ignore.is_ignored(&relative) {
                continue;
            }

            let result = match event.kind {
                EventKind::Create(CreateKind::Folder) => self.on_dir_created(&relative).await,
                EventKind::Create(_) | EventKind::Modify(_) => {
                    self.on_path_changed(path, &relative).await
                }
                EventKind::Remove(_) => self.on_removed(&relative).await,
                _ => Ok(()),
            };

            if let Err(err) = result {
                let message = format!("Sync failed for {}", relative.display());
                self.notifier.error(&message, Some(&format!("{err:#}")));
                self.notifier.persistent_error(&message);
            }
        }
    }

    async fn on_dir_created(&self, relative: &Path) -> Result<()> {
        let target = self.config.target.join(relative);
        fs::create_dir_all(&target)
            .await
            .with_context(|| format!("failed to create {}", target.display()))?;
        Ok(())
    }

    /// Create/modify events converge here. The path is re-stat'ed because
    /// notifications race against further changes: it may have become a
    /// directory, or be gone already.
    async fn on_path_changed(&self, source: &Path, relative: &Path) -> Result<()> {
        let metadata = match fs::metadata(source).await {
            Ok(metadata) => metadata,
            // Raced delete or rename-away: mirror the removal.
            Err(_) => return self.on_removed(relative).await,
        };
        if metadata.is_dir() {
            return self.on_dir_created(relative).await;
        }
        if !metadata.is_file() {
            return Ok(());
        }
        self.sync_file(source, relative).await
    }

    async fn sync_file(&self, source: &Path, relative: &Path) -> Result<()> {
        // Resolution in flight for this path: a later event will pick up
        // whatever the user decides.
        if self.state.is_pending(source) {
            return Ok(());
        }

        let target = self.config.target.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        if self.config.mode == SyncMode::Force {
            return self.copy(source, &target, relative).await;
        }

        if !fs::try_exists(&target).await.unwrap_or(false) {
            return self.copy(source, &target, relative).await;
        }

        let target_desc = FileDescriptor::read(&target).await?;
        let conflicting = match self.state.last_sync() {
            Some(last_sync) => target_desc.modified > last_sync,
            // Nothing has ever been synced: an existing target file is an
            // unexplained divergence. Protect it.
            None => true,
        };

        if !conflicting {
            // Target is stale relative to our last write; safe to overwrite.
            return self.copy(source, &target, relative).await;
        }

        // The target may just hold the bytes we'd copy (e.g. seeded by an
        // earlier bulk sync). Not a conflict, nothing to do.
        let source_desc = FileDescriptor::read(source).await?;
        if !self
            .detector
            .are_different(source, &source_desc, &target, &target_desc)
            .await?
        {
            return Ok(());
        }

        if self.resolver.policy() == ConflictPolicy::Ask {
            // The prompt can wait on the user indefinitely; resolve off the
            // event loop so other paths keep syncing. The pending set stops
            // re-entry for this path in the meantime.
            let resolver = Arc::clone(&self.resolver);
            let notifier = self.notifier.clone();
            let state = self.state.clone();
            let source = source.to_path_buf();
            let relative = relative.to_path_buf();
            tokio::spawn(async move {
                if resolver.resolve(&source, &target, &relative).await {
                    match copy_preserving_timestamps(&source, &target).await {
                        Ok(_) => {
                            state.mark_synced();
                            notifier.info(&format!("Synced {}", relative.display()));
                        }
                        Err(err) => {
                            let message = format!("Sync failed for {}", relative.display());
                            notifier.error(&message, Some(&format!("{err:#}")));
                            notifier.persistent_error(&message);
                        }
                    }
                }
            });
            return Ok(());
        }

        if self.resolver.resolve(source, &target, relative).await {
            return self.copy(source, &target, relative).await;
        }
        Ok(())
    }

    async fn on_removed(&self, relative: &Path) -> Result<()> {
        let target = self.config.target.join(relative);
        match fs::metadata(&target).await {
            Ok(metadata) if metadata.is_dir() => {
                fs::remove_dir_all(&target)
                    .await
                    .with_context(|| format!("failed to remove {}", target.display()))?;
            }
            Ok(_) => {
                fs::remove_file(&target)
                    .await
                    .with_context(|| format!("failed to remove {}", target.display()))?;
            }
            // Nothing to mirror.
            Err(_) => return Ok(()),
        }
        self.state.mark_synced();
        self.notifier
            .info(&format!("Removed {}", relative.display()));
        Ok(())
    }

    async fn copy(&self, source: &Path, target: &Path, relative: &Path) -> Result<()> {
        copy_preserving_timestamps(source, target).await?;
        self.state.mark_synced();
        self.notifier.info(&format!("Synced {}", relative.display()));
        Ok(())
    }
}

/// Owns the OS watch handle and the event-loop task for one source tree.
/// Stopping (or dropping) cancels the loop and releases the watch handle;
/// in-flight interactive resolutions complete on their own without touching
/// the watcher again.
pub struct LiveWatcher {
    watcher: Option<RecommendedWatcher>,
    cancellation_token: CancellationToken,
    source: PathBuf,
}

impl LiveWatcher {
    pub fn start(handler: WatchHandler) -> Result<Self> {
        let handler = Arc::new(handler);
        let source = handler.source().to_path_buf();

        let (tx, mut rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
        let channel_notifier = handler.notifier.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                        if tx.try_send(event).is_err() {
                            channel_notifier.warn("Watch event dropped: queue full");
                        }
                    }
                    _ => {}
                },
                Err(err) => channel_notifier.error("Watch error", Some(&err.to_string())),
            })?;
        watcher
            .watch(&source, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", source.display()))?;

        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => handler.dispatch(event).await,
                        None => break,
                    },
                }
            }
        });

        Ok(Self {
            watcher: Some(watcher),
            cancellation_token,
            source,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }

    /// Stops delivering events and releases the OS watch handle.
    pub fn stop(&mut self) {
        self.cancellation_token.cancel();
        self.watcher = None;
    }
}

impl Drop for LiveWatcher {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
