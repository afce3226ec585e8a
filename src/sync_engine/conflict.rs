//! Conflict resolution: given a detected divergence, decide whether the
//! source version may overwrite the target.
//!
//! A conflict is routine control flow, never an error. The only hard rule is
//! that nothing here may silently overwrite: every path that cannot reach a
//! positive decision (prompt failure, dismissal, missing provider) resolves
//! to skip.

use std::path::Path;
use std::sync::Arc;

use crate::config::ConflictPolicy;
use crate::notifier::Notifier;

use super::types::SyncState;

pub const CHOICE_OVERWRITE: &str = "Overwrite (source wins)";
pub const CHOICE_SKIP: &str = "Skip (keep target)";
pub const CHOICE_VIEW_DIFF: &str = "View diff";

/// Interactive prompt seam, used only under [`ConflictPolicy::Ask`].
/// Implementations may block for arbitrary real time; the resolver runs them
/// on a blocking thread. `None` means dismissed without a choice.
pub trait PromptProvider: Send + Sync {
    fn present_choice(&self, message: &str, choices: &[&str]) -> Option<usize>;
}

/// Fire-and-forget diff display, invoked from the "View diff" choice.
pub trait DiffViewer: Send + Sync {
    fn open_diff(&self, left: &Path, right: &Path, title: &str);
}

pub struct ConflictResolver {
    policy: ConflictPolicy,
    notifier: Arc<dyn Notifier>,
    state: Arc<SyncState>,
    prompts: Option<Arc<dyn PromptProvider>>,
    diff_viewer: Option<Arc<dyn DiffViewer>>,
}

impl ConflictResolver {
    pub fn new(policy: ConflictPolicy, notifier: Arc<dyn Notifier>, state: Arc<SyncState>) -> Self {
        Self {
            policy,
            notifier,
            state,
            prompts: None,
            diff_viewer: None,
        }
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptProvider>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn with_diff_viewer(mut self, viewer: Arc<dyn DiffViewer>) -> Self {
        self.diff_viewer = Some(viewer);
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Resolves with the configured (live) policy. Under `Ask` this may
    /// suspend until the user answers. Returns true to overwrite.
    pub async fn resolve(&self, source: &Path, target: &Path, relative: &Path) -> bool {
        self.resolve_with(self.policy, source, target, relative).await
    }

    /// Resolution for bulk traversals: `Ask` degrades to `LogAndSkip` for
    /// this call only, so a large batch cannot prompt once per conflicting
    /// file. The stored configuration is untouched.
    pub async fn resolve_bulk(&self, source: &Path, target: &Path, relative: &Path) -> bool {
        let policy = match self.policy {
            ConflictPolicy::Ask => ConflictPolicy::LogAndSkip,
            other => other,
        };
        self.resolve_with(policy, source, target, relative).await
    }

    async fn resolve_with(
        &self,
        policy: ConflictPolicy,
        source: &Path,
        target: &Path,
        relative: &Path,
    ) -> bool {
        match policy {
            ConflictPolicy::SourceWins => {
                self.notifier.warn(&format!(
                    "Conflict on {}: overwriting target (source wins)",
                    relative.display()
                ));
                true
            }
            ConflictPolicy::TargetWins => {
                self.notifier.info(&format!(
                    "Conflict on {}: keeping target (target wins)",
                    relative.display()
                ));
                false
            }
            ConflictPolicy::LogAndSkip => {
                let message = format!(
                    "Conflict on {}: target was modified independently; skipped",
                    relative.display()
                );
                self.notifier.error(&message, None);
                self.notifier.persistent_error(&message);
                false
            }
            ConflictPolicy::Ask => self.ask(source, target, relative).await,
        }
    }

    async fn ask(&self, source: &Path, target: &Path, relative: &Path) -> bool {
        // Claim the path for the whole prompt; a second event for it no-ops
        // until the guard drops.
        let _guard = match SyncState::begin_resolution(&self.state, source) {
            Some(guard) => guard,
            None => return false,
        };

        let Some(prompts) = self.prompts.clone() else {
            self.notifier.error(
                &format!(
                    "Conflict on {}: no prompt available; skipped",
                    relative.display()
                ),
                None,
            );
            return false;
        };

        let message = format!(
            "{} was modified in both source and target",
            relative.display()
        );
        let choice = tokio::task::spawn_blocking(move || {
            prompts.present_choice(&message, &[CHOICE_OVERWRITE, CHOICE_SKIP, CHOICE_VIEW_DIFF])
        })
        .await;

        match choice {
            Ok(Some(0)) => {
                self.notifier.warn(&format!(
                    "Conflict on {}: user chose overwrite",
                    relative.display()
                ));
                true
            }
            Ok(Some(2)) => {
                if let Some(viewer) = &self.diff_viewer {
                    viewer.open_diff(
                        source,
                        target,
                        &format!("{} (source vs target)", relative.display()),
                    );
                }
                self.notifier.info(&format!(
                    "Opened diff for {}; re-run sync after resolving manually",
                    relative.display()
                ));
                false
            }
            Ok(Some(_)) => {
                self.notifier
                    .info(&format!("Conflict on {}: user chose skip", relative.display()));
                false
            }
            Ok(None) => {
                self.notifier.info(&format!(
                    "Conflict prompt for {} dismissed; skipped",
                    relative.display()
                ));
                false
            }
            Err(err) => {
                self.notifier.error(
                    &format!("Conflict prompt failed for {}; skipped", relative.display()),
                    Some(&err.to_string()),
                );
                false
            }
        }
    }
}

/// Test and headless-use prompt provider with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedChoice(pub Option<usize>);

impl PromptProvider for FixedChoice {
    fn present_choice(&self, _message: &str, _choices: &[&str]) -> Option<usize> {
        self.0
    }
}
