//! Designer backend boundary.
//!
//! Everything the lifecycle core talks to lives behind the traits in this
//! module: the designer HTTP API, the log-streaming surface, the execution
//! graph cache, confirmation prompts and the folder-selection load flow.

mod graph;
mod http;
mod surface;

pub use graph::GraphCache;
pub use http::HttpDesignerClient;
#[cfg(test)]
pub use surface::SurfaceCloser;
pub use surface::{StreamingSurface, SurfaceExit, SurfaceHandle};

use crate::error::LifecycleResult;
use crate::model::ConfirmPrompt;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// One entry returned by the list-apps endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub base_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInfo {
    pub name: String,
    #[serde(default)]
    pub auto_start: Option<bool>,
    #[serde(default)]
    pub base_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub base_dir: String,
    pub cmd: String,
}

/// Log lines produced by an exec call, ending when the job's output ends.
pub type LineStream = BoxStream<'static, LifecycleResult<String>>;

#[async_trait]
pub trait DesignerApi: Send + Sync {
    async fn list_apps(&self) -> LifecycleResult<Vec<AppInfo>>;
    async fn load_app(&self, base_dir: &str) -> LifecycleResult<()>;
    async fn unload_app(&self, base_dir: &str) -> LifecycleResult<()>;
    /// `None` reloads every loaded app.
    async fn reload_app(&self, base_dir: Option<&str>) -> LifecycleResult<()>;
    async fn list_scripts(&self, base_dir: &str) -> LifecycleResult<Vec<String>>;
    async fn list_graphs(&self) -> LifecycleResult<Vec<GraphInfo>>;
    async fn exec(&self, request: ExecRequest) -> LifecycleResult<LineStream>;
}

/// A place where a job's log output is shown. The handle resolves when the
/// surface is closed, whether by the job ending or by the user.
pub trait LogSurface: Send + Sync {
    fn open(&self, descriptor: crate::model::TaskDescriptor) -> SurfaceHandle;
}

/// Keeps the execution-graph view consistent with the app list.
#[async_trait]
pub trait GraphSync: Send + Sync {
    /// Fire-and-forget: implementations log failures instead of returning them.
    async fn resync(&self);
    /// Drop the currently displayed graph; its topology may no longer exist.
    async fn clear_view(&self);
}

#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> bool;
}

/// Folder selection followed by a load request. Returns the loaded base
/// directory, or `None` when the user backed out.
#[async_trait]
pub trait LoadFlow: Send + Sync {
    async fn run(&self) -> LifecycleResult<Option<String>>;
}

/// Confirms every prompt. Used for `--yes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _prompt: &ConfirmPrompt) -> bool {
        true
    }
}

/// Asks on stderr and reads a `y`/`yes` answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        let question = format!("{}: {} [y/N] ", prompt.title, prompt.body);
        let answer = tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut err = std::io::stderr();
            let _ = write!(err, "{question}");
            let _ = err.flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

/// Load flow for a directory chosen up front (the CLI's `load <dir>`).
pub struct DirLoadFlow {
    api: std::sync::Arc<dyn DesignerApi>,
    apps: std::sync::Arc<crate::apps::AppRegistry>,
    dir: String,
}

impl DirLoadFlow {
    pub fn new(
        api: std::sync::Arc<dyn DesignerApi>,
        apps: std::sync::Arc<crate::apps::AppRegistry>,
        dir: impl Into<String>,
    ) -> Self {
        Self {
            api,
            apps,
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl LoadFlow for DirLoadFlow {
    async fn run(&self) -> LifecycleResult<Option<String>> {
        self.api.load_app(&self.dir).await?;
        // Refresh failure keeps the old list; the load itself went through.
        if let Err(e) = self.apps.refresh().await {
            tracing::warn!(error = %e, "app list refresh after load failed");
        }
        Ok(Some(self.dir.clone()))
    }
}
