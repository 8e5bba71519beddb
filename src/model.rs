use serde::{Deserialize, Serialize};
use std::fmt;

/// An application known to the designer backend, keyed by its base directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Application {
    pub key: String,
}

impl Application {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Install,
    Run,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Install => "install",
            TaskKind::Run => "run",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub id: TaskId,
    pub owner_key: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub started_utc: String,
}

/// What a log surface needs to know to stream a job for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub base_dir: String,
    /// Script name for `Run` jobs.
    #[serde(default)]
    pub script: Option<String>,
    pub background: bool,
}

impl TaskDescriptor {
    /// Command line understood by the designer exec endpoint.
    pub fn command(&self) -> String {
        match (self.kind, self.script.as_deref()) {
            (TaskKind::Install, _) => "tman install".to_string(),
            (TaskKind::Run, Some(script)) => format!("tman run {script}"),
            (TaskKind::Run, None) => "tman run".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppStatus {
    Loaded,
    Running,
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppStatus::Loaded => f.write_str("LOADED"),
            AppStatus::Running => f.write_str("RUNNING"),
        }
    }
}

/// One derived row of the application table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppView {
    pub key: String,
    pub status: AppStatus,
    pub tasks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Foreground,
    Background,
}

/// Which applications a reload targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadScope {
    Single(String),
    All,
}

impl ReloadScope {
    pub fn from_key(key: Option<&str>) -> Self {
        match key {
            Some(k) => ReloadScope::Single(k.to_string()),
            None => ReloadScope::All,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            ReloadScope::Single(k) => Some(k),
            ReloadScope::All => None,
        }
    }
}

/// Question put to the user before a destructive operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPrompt {
    pub title: String,
    pub body: String,
}

impl ConfirmPrompt {
    pub fn for_reload(scope: &ReloadScope) -> Self {
        match scope {
            ReloadScope::Single(key) => Self {
                title: "Reload app".into(),
                body: format!("Reload the app at {key}? Running graphs will be stopped."),
            },
            ReloadScope::All => Self {
                title: "Reload all apps".into(),
                body: "Reload every loaded app? Running graphs will be stopped.".into(),
            },
        }
    }
}

/// User-visible outcome messages produced by the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    Loaded { key: String },
    LoadFailed { detail: String },
    Unloaded { key: String },
    UnloadFailed { key: String, detail: String },
    Reloaded { scope: ReloadScope },
    ReloadFailed { scope: ReloadScope, detail: String },
    TaskStarted { key: String, kind: TaskKind, id: TaskId },
    TaskFinished { key: String, kind: TaskKind, id: TaskId },
    TasksStopped { key: String, count: usize },
    OrphanedTasks { count: usize },
}

impl Notice {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Notice::LoadFailed { .. } | Notice::UnloadFailed { .. } | Notice::ReloadFailed { .. }
        )
    }

    /// Render a human-readable message for the presentation layer.
    pub fn to_message(&self) -> String {
        match self {
            Notice::Loaded { key } => format!("Loaded app {key}"),
            Notice::LoadFailed { detail } => format!("Failed to load app: {detail}"),
            Notice::Unloaded { key } => format!("Unloaded app {key}"),
            Notice::UnloadFailed { key, detail } => {
                format!("Failed to unload app {key}: {detail}")
            }
            Notice::Reloaded { scope } => match scope {
                ReloadScope::Single(key) => format!("Reloaded app {key}"),
                ReloadScope::All => "Reloaded all apps".to_string(),
            },
            Notice::ReloadFailed { scope, detail } => match scope {
                ReloadScope::Single(key) => format!("Failed to reload app {key}: {detail}"),
                ReloadScope::All => format!("Failed to reload apps: {detail}"),
            },
            Notice::TaskStarted { key, kind, id } => {
                format!("Started {kind} for {key} ({id})")
            }
            Notice::TaskFinished { key, kind, id } => {
                format!("Finished {kind} for {key} ({id})")
            }
            Notice::TasksStopped { key, count } => {
                format!("Stopped tracking {count} task(s) for {key}")
            }
            Notice::OrphanedTasks { count } => {
                format!("{count} background task(s) belong to apps that are no longer loaded")
            }
        }
    }
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Notice(Notice),
    AppsRefreshed { count: usize },
    GraphViewCleared,
}
