use crate::apps::AppRegistry;
use crate::config::{self, ClientConfig, FileConfig};
use crate::designer::{
    AutoConfirm, Confirm, DesignerApi, DirLoadFlow, GraphCache, GraphSync, HttpDesignerClient,
    StdinConfirm, StreamingSurface, SurfaceExit,
};
use crate::error::LifecycleError;
use crate::model::{LifecycleEvent, RunMode};
use crate::orchestrator::{
    ControllerParts, LifecycleController, OperationOutcome, ScriptRun, SpawnedTask,
};
use crate::presenter;
use crate::scripts::ScriptCatalog;
use crate::tasks::TaskRegistry;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
/// Locks are taken per line; tracing and the confirmation prompt share stderr.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let mut out = std::io::stdout();
        let mut err = std::io::stderr();

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "appctl",
    version,
    about = "Load, reload and run scripts of designer-managed apps"
)]
pub struct Cli {
    /// Base URL of the designer service [default: http://localhost:49483]
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Per-request timeout, e.g. 10s or 1m [default: 10s]
    #[arg(long, global = true)]
    pub timeout: Option<humantime::Duration>,

    /// Config file to read instead of the per-user one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Answer yes to confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Debug logging and extra progress output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List loaded apps with their status
    List,
    /// Load the app in a directory
    Load { dir: String },
    /// Unload an app
    Unload { key: String },
    /// Reload one app, or every app when no key is given
    Reload { key: Option<String> },
    /// List an app's runnable scripts
    Scripts { key: String },
    /// List the designer's execution graphs
    Graphs,
    /// Install an app's dependencies and stream the output
    Install { key: String },
    /// Run one of an app's scripts
    Run {
        key: String,
        script: String,
        /// Track the run as a background task of the app
        #[arg(long)]
        background: bool,
    },
}

/// Build a `ClientConfig` from CLI arguments and the optional config file.
pub fn build_config(args: &Cli) -> Result<ClientConfig> {
    let file = match args.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::load_default()?,
    };
    Ok(config::resolve(
        args.base_url.clone(),
        args.timeout.map(Into::into),
        file,
    ))
}

/// Wired-up controller plus the output plumbing around it.
struct Session {
    controller: LifecycleController,
    graph: Arc<GraphCache>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
}

impl Session {
    fn stdout(&self, line: impl Into<String>) {
        let _ = self.out_tx.send(OutputLine::Stdout(line.into()));
    }

    fn stderr(&self, line: impl Into<String>) {
        let _ = self.out_tx.send(OutputLine::Stderr(line.into()));
    }

    /// Report a rejected or failed operation; returns the exit status.
    fn report(&self, result: Result<OperationOutcome, LifecycleError>) -> bool {
        match result {
            Ok(OperationOutcome::Completed) => true,
            Ok(OperationOutcome::Cancelled) => {
                self.stderr("Cancelled");
                true
            }
            // The controller already emitted a failure notice.
            Ok(OperationOutcome::Failed(_)) => false,
            Err(e) => {
                self.stderr(presenter::error_line(&e));
                false
            }
        }
    }
}

/// Forward controller events to stderr and job log lines to stdout until told
/// to stop, then drain whatever is still queued.
fn spawn_event_forwarder(
    mut events: mpsc::UnboundedReceiver<LifecycleEvent>,
    mut lines: mpsc::UnboundedReceiver<String>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
    verbose: bool,
) -> (oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let forward_event = |event: LifecycleEvent| {
            if let Some(line) = presenter::event_line(&event, verbose) {
                let _ = out_tx.send(OutputLine::Stderr(line));
            }
        };
        loop {
            tokio::select! {
                Some(event) = events.recv() => forward_event(event),
                Some(line) = lines.recv() => {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
                _ = &mut stop_rx => break,
                else => break,
            }
        }
        while let Ok(line) = lines.try_recv() {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
        while let Ok(event) = events.try_recv() {
            forward_event(event);
        }
    });
    (stop_tx, handle)
}

/// Run the parsed command. `Ok(false)` means the operation failed or was
/// rejected and the process should exit non-zero.
pub async fn run(args: Cli) -> Result<bool> {
    let cfg = build_config(&args)?;
    tracing::debug!(base_url = %cfg.base_url, timeout = ?cfg.request_timeout, "client config");

    let api: Arc<dyn DesignerApi> =
        Arc::new(HttpDesignerClient::new(&cfg).context("failed to build HTTP client")?);
    let (event_tx, event_rx) = mpsc::unbounded_channel::<LifecycleEvent>();
    let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();
    let graph = Arc::new(GraphCache::new(api.clone()));
    let controller = LifecycleController::new(ControllerParts {
        api: api.clone(),
        apps: Arc::new(AppRegistry::new(api.clone())),
        tasks: Arc::new(TaskRegistry::new()),
        scripts: Arc::new(ScriptCatalog::new(api.clone())),
        graph: graph.clone(),
        surface: Arc::new(StreamingSurface::new(api.clone(), line_tx)),
        event_tx,
    });

    let (out_tx, out_handle) = spawn_output_writer();
    let (stop_tx, forwarder) =
        spawn_event_forwarder(event_rx, line_rx, out_tx.clone(), args.verbose);
    let session = Session {
        controller,
        graph,
        out_tx,
    };

    let result = dispatch(&session, &args, api).await;

    let _ = stop_tx.send(());
    let _ = forwarder.await;
    drop(session);
    let _ = out_handle.await;
    result
}

async fn dispatch(session: &Session, args: &Cli, api: Arc<dyn DesignerApi>) -> Result<bool> {
    let controller = &session.controller;
    match &args.command {
        Command::List => {
            let views = controller
                .refresh()
                .await
                .context("failed to list apps")?;
            for line in presenter::build_app_table(&views).lines {
                session.stdout(line);
            }
            for line in presenter::orphan_lines(&controller.orphaned_tasks().await) {
                session.stderr(line);
            }
            Ok(true)
        }
        Command::Load { dir } => {
            let flow = DirLoadFlow::new(api, controller.apps().clone(), dir.clone());
            let outcome = controller.load_app(&flow).await;
            Ok(session.report(Ok(outcome)))
        }
        Command::Unload { key } => Ok(session.report(controller.unload_app(key).await)),
        Command::Reload { key } => {
            let confirm: Box<dyn Confirm> = if args.yes {
                Box::new(AutoConfirm)
            } else {
                Box::new(StdinConfirm)
            };
            let result = controller.reload_app(key.as_deref(), &*confirm).await;
            Ok(session.report(result))
        }
        Command::Scripts { key } => {
            let scripts = controller
                .scripts_for(key)
                .await
                .with_context(|| format!("failed to list scripts for {key}"))?;
            for line in presenter::script_lines(key, &scripts) {
                session.stdout(line);
            }
            Ok(true)
        }
        Command::Graphs => {
            session.graph.resync().await;
            for line in presenter::graph_lines(&session.graph.graphs().await) {
                session.stdout(line);
            }
            Ok(true)
        }
        Command::Install { key } => {
            controller.refresh().await.context("failed to list apps")?;
            match controller.install_dependencies(key).await {
                Ok(spawned) => Ok(follow(session, key, spawned).await),
                Err(e) => Ok(session.report(Err(e))),
            }
        }
        Command::Run {
            key,
            script,
            background,
        } => {
            controller.refresh().await.context("failed to list apps")?;
            let scripts = controller
                .scripts_for(key)
                .await
                .with_context(|| format!("failed to list scripts for {key}"))?;
            let mode = if *background {
                RunMode::Background
            } else {
                RunMode::Foreground
            };
            match controller.run_script(key, &scripts, script, mode).await {
                Ok(ScriptRun::Background(spawned)) => Ok(follow(session, key, spawned).await),
                Ok(ScriptRun::Foreground(handle)) => {
                    tokio::select! {
                        exit = handle.closed() => Ok(exit_ok(session, &exit)),
                        _ = tokio::signal::ctrl_c() => {
                            session.stderr("Interrupted");
                            Ok(false)
                        }
                    }
                }
                Err(e) => Ok(session.report(Err(e))),
            }
        }
    }
}

/// Wait for a tracked task's surface to close and its follow-up reload to
/// finish. Ctrl-C stops tracking every task of `key` instead.
async fn follow(session: &Session, key: &str, spawned: SpawnedTask) -> bool {
    let id = spawned.id.clone();
    tokio::select! {
        exit = spawned.finished() => exit_ok(session, &exit.surface) && exit.succeeded(),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(key, task = %id, "interrupted; stopping tasks");
            session.controller.stop_all(key).await;
            false
        }
    }
}

fn exit_ok(session: &Session, exit: &SurfaceExit) -> bool {
    match exit {
        SurfaceExit::Completed => true,
        SurfaceExit::Failed(reason) => {
            session.stderr(format!("error: log stream failed: {reason}"));
            false
        }
        SurfaceExit::Dropped => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["appctl", "reload", "/a", "--yes", "--timeout", "30s"])
            .expect("valid args");
        assert!(cli.yes);
        assert!(matches!(cli.command, Command::Reload { key: Some(ref k) } if k == "/a"));
        assert_eq!(
            cli.timeout.map(Duration::from),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn reload_without_key_targets_all() {
        let cli = Cli::try_parse_from(["appctl", "reload"]).expect("valid args");
        assert!(matches!(cli.command, Command::Reload { key: None }));
    }

    #[test]
    fn graphs_takes_no_arguments() {
        let cli = Cli::try_parse_from(["appctl", "graphs"]).expect("valid args");
        assert!(matches!(cli.command, Command::Graphs));
        assert!(Cli::try_parse_from(["appctl", "graphs", "/a"]).is_err());
    }

    #[test]
    fn run_background_flag() {
        let cli = Cli::try_parse_from(["appctl", "run", "/a", "start", "--background"])
            .expect("valid args");
        match cli.command {
            Command::Run {
                key,
                script,
                background,
            } => {
                assert_eq!(key, "/a");
                assert_eq!(script, "start");
                assert!(background);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn build_config_prefers_flags() {
        let path = std::env::temp_dir().join(format!("appctl-cli-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"base_url":"http://file:1","request_timeout":"5s"}"#).unwrap();
        let cli = Cli::try_parse_from([
            "appctl",
            "--config",
            path.to_str().unwrap(),
            "--base-url",
            "http://flag:2",
            "list",
        ])
        .expect("valid args");
        let cfg = build_config(&cli).expect("config");
        let _ = std::fs::remove_file(&path);
        assert_eq!(cfg.base_url, "http://flag:2");
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    }
}
