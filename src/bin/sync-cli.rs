use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use treesync_lib::sync_engine::{preview, BulkSync, ChangeKind, DiffViewer, PromptProvider, SyncState};
use treesync_lib::{ConflictPolicy, Notifier, SyncConfig, SyncMode};

#[derive(Parser)]
#[command(name = "sync-cli")]
#[command(about = "Directory tree synchronization CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// One-time bulk synchronization of target to source
    Sync {
        #[command(flatten)]
        task: TaskArgs,

        /// Mirror unconditionally instead of copying only what changed
        #[arg(short, long)]
        force: bool,
    },
    /// Show pending changes without touching the filesystem
    Preview {
        #[command(flatten)]
        task: TaskArgs,

        /// Emit the change records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch the source tree and mirror changes continuously until Ctrl-C
    Watch {
        #[command(flatten)]
        task: TaskArgs,
    },
}

#[derive(Args)]
struct TaskArgs {
    #[arg(short, long)]
    source: Option<PathBuf>,

    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Glob pattern to exclude (repeatable)
    #[arg(short, long = "ignore")]
    ignore: Vec<String>,

    /// What to do when the target copy changed independently
    #[arg(short, long, value_enum)]
    policy: Option<PolicyArg>,

    /// Load the task from a YAML file; flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    SourceWins,
    TargetWins,
    LogAndSkip,
    Ask,
}

impl From<PolicyArg> for ConflictPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::SourceWins => ConflictPolicy::SourceWins,
            PolicyArg::TargetWins => ConflictPolicy::TargetWins,
            PolicyArg::LogAndSkip => ConflictPolicy::LogAndSkip,
            PolicyArg::Ask => ConflictPolicy::Ask,
        }
    }
}

impl TaskArgs {
    fn build_config(&self) -> anyhow::Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::from_yaml_file(path)?,
            None => {
                let source = self
                    .source
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("Missing required argument: --source"))?;
                let target = self
                    .target
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("Missing required argument: --target"))?;
                SyncConfig::new(source, target)
            }
        };
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if !self.ignore.is_empty() {
            config.ignore_patterns = self.ignore.clone();
        }
        if let Some(policy) = self.policy {
            config.conflict_policy = policy.into();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Prints engine notifications straight to the terminal.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn info(&self, message: &str) {
        println!("   {message}");
    }

    fn warn(&self, message: &str) {
        println!("⚠️  {message}");
    }

    fn error(&self, message: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => eprintln!("❌ {message}: {detail}"),
            None => eprintln!("❌ {message}"),
        }
    }

    fn persistent_error(&self, message: &str) {
        eprintln!("❗ ACTION REQUIRED: {message}");
    }
}

/// Interactive conflict prompt for Ask policy.
struct SelectPrompt;

impl PromptProvider for SelectPrompt {
    fn present_choice(&self, message: &str, choices: &[&str]) -> Option<usize> {
        dialoguer::Select::new()
            .with_prompt(message)
            .items(choices)
            .default(1)
            .interact_opt()
            .ok()
            .flatten()
    }
}

/// Terminal stand-in for a graphical diff view: prints both paths so the user
/// can open them in a tool of their choice.
struct PathPrintingDiffViewer;

impl DiffViewer for PathPrintingDiffViewer {
    fn open_diff(&self, left: &Path, right: &Path, title: &str) {
        println!("🔍 {title}");
        println!("   source: {}", left.display());
        println!("   target: {}", right.display());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Sync { task, force } => {
            let mut config = task.build_config()?;
            if force {
                config.mode = SyncMode::Force;
            }
            run_sync(config).await
        }
        Command::Preview { task, json } => {
            let config = task.build_config()?;
            run_preview(config, json).await
        }
        Command::Watch { task } => {
            let config = task.build_config()?;
            run_watch(config).await
        }
    }
}

async fn run_sync(config: SyncConfig) -> anyhow::Result<()> {
    println!("🚀 Starting synchronization...");
    println!("   Source: {}", config.source.display());
    println!("   Target: {}", config.target.display());
    println!("   Mode: {:?}", config.mode);
    println!();

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let state = Arc::new(SyncState::new(config.last_sync.map(SystemTime::from)));

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {bytes} {msg}")?,
    );

    let bulk = BulkSync::new(config, notifier, state);
    let report = bulk
        .execute_with_progress(|relative, bytes_copied| {
            pb.set_position(bytes_copied);
            pb.set_message(relative.display().to_string());
        })
        .await;

    match report {
        Ok(report) => {
            pb.finish_with_message("done");
            println!();
            println!("📊 Results:");
            println!("   Files copied: {}", report.files_copied);
            println!("   Files skipped: {}", report.files_skipped);
            println!("   Conflicts: {}", report.conflicts);
            println!("   Bytes copied: {}", report.bytes_copied);
            if !report.errors.is_empty() {
                println!("   Errors: {}", report.errors.len());
                for error in &report.errors {
                    eprintln!("   ⚠️  {}: {}", error.path.display(), error.message);
                }
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            eprintln!("❌ Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run_preview(config: SyncConfig, json: bool) -> anyhow::Result<()> {
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let records = preview(&config, notifier).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("✅ Directories are in sync!");
        return Ok(());
    }

    println!("📝 Pending changes:");
    for record in &records {
        let (icon, action) = match record.kind {
            ChangeKind::Create => ("➕", "CREATE"),
            ChangeKind::Update => ("🔄", "UPDATE"),
            ChangeKind::Conflict => ("⚡", "CONFLICT"),
            ChangeKind::Orphan => ("👻", "ORPHAN (target only)"),
        };
        println!("   {} {} - {}", icon, record.relative_path.display(), action);
    }

    let conflicts = records
        .iter()
        .filter(|r| r.kind == ChangeKind::Conflict)
        .count();
    if conflicts > 0 {
        println!();
        println!("⚡ {conflicts} conflict(s): the target copies changed independently.");
    }
    Ok(())
}

async fn run_watch(config: SyncConfig) -> anyhow::Result<()> {
    println!("👀 Watching {}", config.source.display());
    println!("   Mirroring into {}", config.target.display());
    println!("   Press Ctrl-C to stop.");
    println!();

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let state = Arc::new(SyncState::new(config.last_sync.map(SystemTime::from)));

    let mut handler =
        treesync_lib::WatchHandler::new(config.clone(), notifier, state)?;
    if config.conflict_policy == ConflictPolicy::Ask {
        handler = handler
            .with_prompts(Arc::new(SelectPrompt))
            .with_diff_viewer(Arc::new(PathPrintingDiffViewer));
    }

    let mut watcher = treesync_lib::LiveWatcher::start(handler)?;
    tokio::signal::ctrl_c().await?;
    watcher.stop();
    println!();
    println!("✅ Watcher stopped.");
    Ok(())
}
