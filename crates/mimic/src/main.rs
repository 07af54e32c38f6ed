use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use mimic_common::knowledge::KnowledgeRecord;
use mimic_core::backend::Backend;
use mimic_core::cli::{self, OutputHandlers, ReplOptions};
use mimic_core::config::{ConfigLoader, MimicConfig};
use mimic_core::interpreter::{CommandInterpreter, ReplayEvent};
use mimic_core::learner::{PatternAnalyzer, SessionLog};
use mimic_core::recorder::{EventBus, HostEvent, Recorder};
use mimic_core::store::{FileKvStore, KnowledgeStore};
use mimic_core::virtual_backend::VirtualBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mimic", version, about = "Learn UI tasks from demonstrations and replay them")]
struct Args {
    #[command(subcommand)]
    command: Cmd,

    /// Config file (defaults to ./mimic.yaml, then ~/.mimic/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Record one demonstration from a YAML list of host events
    Record {
        #[arg(long)]
        task: String,
        /// Attempt number (defaults to one past the stored attempts)
        #[arg(long)]
        attempt: Option<u32>,
        #[arg(long)]
        events: PathBuf,
    },
    /// Learn a pattern from recorded sessions
    Analyze {
        /// Session files; when empty, all stored sessions of --task are used
        files: Vec<PathBuf>,
        #[arg(long)]
        task: Option<String>,
        /// Store the learned behavior in the knowledge store
        #[arg(long)]
        save: bool,
    },
    /// Replay a stored behavior or a command file against a UI fixture
    Replay {
        #[arg(long)]
        fixture: PathBuf,
        /// Behavior id or goal text
        #[arg(long, conflicts_with = "commands")]
        behavior: Option<String>,
        /// File with one command per line
        #[arg(long)]
        commands: Option<PathBuf>,
    },
    /// Inspect and edit the knowledge store
    Behaviors {
        #[command(subcommand)]
        action: BehaviorsCmd,
    },
    /// Run commands interactively against a UI fixture
    Repl {
        #[arg(long)]
        fixture: PathBuf,
    },
}

#[derive(Subcommand)]
enum BehaviorsCmd {
    /// List behaviors, optionally matching a goal
    List { goal: Option<String> },
    Show { id: String },
    Remove { id: String },
    /// Delete every stored behavior
    Wipe,
}

fn print_out(msg: &str) {
    println!("{}", msg);
}

fn print_err(msg: &str) {
    eprintln!("{}", msg);
}

const OUTPUT: OutputHandlers = OutputHandlers {
    out: print_out,
    err: print_err,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries command output.
    let filter = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await,
        None => ConfigLoader::load_default().await,
    }
    .context("loading config")?;

    match args.command {
        Cmd::Record {
            task,
            attempt,
            events,
        } => record(&config, &task, attempt, &events).await,
        Cmd::Analyze { files, task, save } => analyze(&config, files, task, save).await,
        Cmd::Replay {
            fixture,
            behavior,
            commands,
        } => replay(&config, &fixture, behavior, commands).await,
        Cmd::Behaviors { action } => behaviors(&config, action).await,
        Cmd::Repl { fixture } => repl(&config, &fixture).await,
    }
}

fn open_store(config: &MimicConfig) -> KnowledgeStore {
    let kv = Arc::new(FileKvStore::new(config.store.path.clone()));
    KnowledgeStore::open(kv, &config.store)
}

async fn launch(fixture: &Path) -> anyhow::Result<VirtualBackend> {
    let mut backend = VirtualBackend::load(fixture)
        .await
        .with_context(|| format!("loading fixture {}", fixture.display()))?;
    backend.launch().await?;
    Ok(backend)
}

async fn record(
    config: &MimicConfig,
    task: &str,
    attempt: Option<u32>,
    events: &Path,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("reading {}", events.display()))?;
    let events: Vec<HostEvent> = serde_yaml::from_str(&content)?;

    let log = SessionLog::new(config.store.sessions_dir.clone());
    let attempt = match attempt {
        Some(n) => n,
        None => log.attempt_count(task).await? as u32 + 1,
    };

    let bus = EventBus::new();
    let mut recorder = Recorder::new(bus.clone(), config.recorder.clone());
    recorder.start(task, attempt)?;
    for event in &events {
        bus.dispatch(event);
    }
    let session = recorder
        .stop()
        .ok_or_else(|| anyhow!("recording produced no session"))?;

    let path = log.save(&session).await?;
    println!(
        "Recorded {} actions for '{}' (attempt {}) to {}",
        session.actions.len(),
        task,
        attempt,
        path.display()
    );
    Ok(())
}

async fn analyze(
    config: &MimicConfig,
    files: Vec<PathBuf>,
    task: Option<String>,
    save: bool,
) -> anyhow::Result<()> {
    let sessions = if files.is_empty() {
        let Some(task) = task else {
            bail!("give session files or --task");
        };
        SessionLog::new(config.store.sessions_dir.clone())
            .load_task(&task)
            .await?
    } else {
        let mut sessions = Vec::with_capacity(files.len());
        for file in &files {
            sessions.push(
                SessionLog::load_file(file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?,
            );
        }
        sessions
    };

    let analyzer = PatternAnalyzer::new(config.analyzer.clone());
    let pattern = analyzer.analyze(&sessions)?;
    let record = analyzer.to_knowledge_record(&pattern, &sessions);
    println!("{}", record.description);
    println!("{}", serde_yaml::to_string(&pattern)?);

    if save {
        let store = open_store(config);
        store.add_behavior(record.clone()).await?;
        println!("Saved behavior {} ({:.2} confidence)", record.id, record.confidence);
    }
    Ok(())
}

/// Exact id first, otherwise the most confident behavior matching the goal.
async fn find_behavior(store: &KnowledgeStore, key: &str) -> Option<KnowledgeRecord> {
    if let Some(record) = store.get(key).await {
        return Some(record);
    }
    store.find_matching(key).await.into_iter().next()
}

fn spawn_progress_printer() -> tokio::sync::mpsc::UnboundedSender<ReplayEvent> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ReplayEvent::Log(line) => println!("{}", line),
                ReplayEvent::Cursor(p) => tracing::debug!("cursor at ({:.0}, {:.0})", p.x, p.y),
            }
        }
    });
    tx
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling replay");
            child.cancel();
        }
    });
    token
}

async fn replay(
    config: &MimicConfig,
    fixture: &Path,
    behavior: Option<String>,
    commands: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut backend = launch(fixture).await?;
    let mut interpreter = CommandInterpreter::new(config.replay.clone())
        .with_events(spawn_progress_printer())
        .with_cancellation(cancel_on_ctrl_c());

    match (behavior, commands) {
        (Some(key), _) => {
            let store = open_store(config);
            let Some(record) = find_behavior(&store, &key).await else {
                bail!("no behavior matches '{}'", key);
            };
            info!("Replaying '{}' ({})", record.name, record.id);

            let report = interpreter
                .execute_plan(&mut backend, &record.decision_tree)
                .await;
            cli::print_report(&report, OUTPUT);
            store
                .record_execution(
                    &record.id,
                    report.success(),
                    report.duration_ms,
                    report.failure_reason(),
                )
                .await?;
        }
        (None, Some(path)) => {
            cli::run_file(&mut backend, &mut interpreter, OUTPUT, &path)
                .await
                .map_err(|e| anyhow!("{}: {}", path.display(), e))?;
        }
        (None, None) => bail!("give --behavior or --commands"),
    }

    backend.close().await?;
    Ok(())
}

async fn behaviors(config: &MimicConfig, action: BehaviorsCmd) -> anyhow::Result<()> {
    let store = open_store(config);
    match action {
        BehaviorsCmd::List { goal } => {
            let records = store.find_matching(goal.as_deref().unwrap_or("")).await;
            if records.is_empty() {
                println!("No behaviors stored.");
            }
            for record in records {
                println!(
                    "{}  {:.2}  {:>3} runs  {}",
                    record.id, record.confidence, record.statistics.times_executed, record.name
                );
            }
        }
        BehaviorsCmd::Show { id } => {
            let record = store
                .get(&id)
                .await
                .ok_or_else(|| anyhow!("no behavior with id {}", id))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        BehaviorsCmd::Remove { id } => {
            if !store.remove_behavior(&id).await? {
                bail!("no behavior with id {}", id);
            }
            println!("Removed {}", id);
        }
        BehaviorsCmd::Wipe => {
            store.wipe().await?;
            println!("Knowledge store wiped.");
        }
    }
    store.close();
    Ok(())
}

async fn repl(config: &MimicConfig, fixture: &Path) -> anyhow::Result<()> {
    let mut backend = launch(fixture).await?;
    let mut interpreter = CommandInterpreter::new(config.replay.clone());
    let options = ReplOptions {
        banner_lines: &[
            "Fixture loaded. Enter commands (e.g. 'CLICK:text=Save', 'TYPE:hello').",
            "Type 'exit' or 'quit' to close.",
        ],
        prompt: "> ",
        exit_commands: &["exit", "quit"],
        handle_ctrl_c: true,
    };

    cli::run_repl(&mut backend, &mut interpreter, OUTPUT, options)
        .await
        .map_err(|e| anyhow!("session error: {}", e))?;
    backend.close().await?;
    Ok(())
}
