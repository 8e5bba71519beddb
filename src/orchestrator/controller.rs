//! App lifecycle controller.
//!
//! Owns load/unload/reload orchestration and background task bookkeeping, and
//! emits events for presentation layers. Every operation makes exactly one
//! designer call and then resynchronizes the app registry and graph cache,
//! whether the call succeeded or not.

#[cfg(test)]
use super::busy::BusyState;
use super::busy::{BusyGate, OperationCategory};
use crate::apps::AppRegistry;
use crate::designer::{
    Confirm, DesignerApi, GraphSync, LoadFlow, LogSurface, SurfaceExit, SurfaceHandle,
};
use crate::error::{LifecycleError, LifecycleResult};
use crate::model::{
    AppView, Application, BackgroundTask, ConfirmPrompt, LifecycleEvent, Notice,
    ReloadScope, RunMode, TaskDescriptor, TaskId, TaskKind,
};
use crate::scripts::ScriptCatalog;
use crate::status;
use crate::tasks::TaskRegistry;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// How an operation that reached (or declined to reach) the designer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed,
    /// The designer call failed; local state was still resynchronized.
    Failed(LifecycleError),
    /// The user declined the confirmation. Nothing was called.
    Cancelled,
}

/// How a background task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExit {
    pub surface: SurfaceExit,
    /// Outcome of the follow-up reload; `None` for script runs.
    pub reload: Option<OperationOutcome>,
}

impl TaskExit {
    pub fn succeeded(&self) -> bool {
        self.surface == SurfaceExit::Completed
            && !matches!(self.reload, Some(OperationOutcome::Failed(_)))
    }
}

/// A background task whose surface is open.
#[derive(Debug)]
pub struct SpawnedTask {
    pub id: TaskId,
    watcher: JoinHandle<TaskExit>,
}

impl SpawnedTask {
    /// Wait until the surface closed and teardown (unregister, follow-up
    /// reload) has finished.
    pub async fn finished(self) -> TaskExit {
        self.watcher.await.unwrap_or(TaskExit {
            surface: SurfaceExit::Dropped,
            reload: None,
        })
    }
}

/// What `run_script` opened.
#[derive(Debug)]
pub enum ScriptRun {
    /// Independent surface; nothing is tracked.
    Foreground(SurfaceHandle),
    Background(SpawnedTask),
}

/// Collaborators the controller is built from.
pub struct ControllerParts {
    pub api: Arc<dyn DesignerApi>,
    pub apps: Arc<AppRegistry>,
    pub tasks: Arc<TaskRegistry>,
    pub scripts: Arc<ScriptCatalog>,
    pub graph: Arc<dyn GraphSync>,
    pub surface: Arc<dyn LogSurface>,
    pub event_tx: UnboundedSender<LifecycleEvent>,
}

#[derive(Clone)]
pub struct LifecycleController {
    api: Arc<dyn DesignerApi>,
    apps: Arc<AppRegistry>,
    tasks: Arc<TaskRegistry>,
    scripts: Arc<ScriptCatalog>,
    graph: Arc<dyn GraphSync>,
    surface: Arc<dyn LogSurface>,
    event_tx: UnboundedSender<LifecycleEvent>,
    unload_gate: BusyGate,
    reload_gate: BusyGate,
}

impl LifecycleController {
    pub fn new(parts: ControllerParts) -> Self {
        let ControllerParts {
            api,
            apps,
            tasks,
            scripts,
            graph,
            surface,
            event_tx,
        } = parts;
        Self {
            api,
            apps,
            tasks,
            scripts,
            graph,
            surface,
            event_tx,
            unload_gate: BusyGate::new(OperationCategory::Unload),
            reload_gate: BusyGate::new(OperationCategory::Reload),
        }
    }

    #[cfg(test)]
    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn apps(&self) -> &Arc<AppRegistry> {
        &self.apps
    }

    #[cfg(test)]
    pub fn busy_state(&self, category: OperationCategory) -> BusyState {
        match category {
            OperationCategory::Unload => self.unload_gate.state(),
            OperationCategory::Reload => self.reload_gate.state(),
        }
    }

    /// Current rows, derived from the cached app list and the task registry.
    pub async fn views(&self) -> Vec<AppView> {
        let apps = self.apps.apps().await;
        let snapshot = self.tasks.snapshot().await;
        status::resolve_all(&apps, &snapshot)
    }

    #[cfg(test)]
    pub async fn status(&self, key: &str) -> Option<crate::model::AppStatus> {
        let apps = self.apps.apps().await;
        let app = apps.iter().find(|app| app.key == key)?;
        Some(status::resolve(app, &self.tasks.snapshot().await))
    }

    /// Manual refresh of the app list. Unlike the post-operation resync this
    /// reports fetch errors to the caller.
    pub async fn refresh(&self) -> LifecycleResult<Vec<AppView>> {
        let apps = self.apps.refresh().await?;
        self.after_refresh(&apps).await;
        Ok(self.views().await)
    }

    pub async fn scripts_for(&self, key: &str) -> LifecycleResult<Vec<String>> {
        self.scripts.scripts_for(key).await
    }

    pub async fn orphaned_tasks(&self) -> Vec<BackgroundTask> {
        let apps = self.apps.apps().await;
        self.tasks
            .orphans(apps.iter().map(|app| app.key.as_str()))
            .await
    }

    /// Hand over to the load flow. The flow does its own follow-up; nothing
    /// here mutates local state.
    pub async fn load_app(&self, flow: &dyn LoadFlow) -> OperationOutcome {
        match flow.run().await {
            Ok(Some(key)) => {
                tracing::info!(key = %key, "app loaded");
                self.notify(Notice::Loaded { key });
                OperationOutcome::Completed
            }
            Ok(None) => OperationOutcome::Cancelled,
            Err(e) => {
                tracing::warn!(error = %e, "app load failed");
                self.notify(Notice::LoadFailed {
                    detail: e.to_string(),
                });
                OperationOutcome::Failed(e)
            }
        }
    }

    pub async fn unload_app(&self, key: &str) -> LifecycleResult<OperationOutcome> {
        let _busy = self.unload_gate.try_acquire()?;

        tracing::info!(key, "unloading app");
        let outcome = match self.api.unload_app(key).await {
            Ok(()) => {
                self.notify(Notice::Unloaded {
                    key: key.to_string(),
                });
                OperationOutcome::Completed
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "unload failed");
                self.notify(Notice::UnloadFailed {
                    key: key.to_string(),
                    detail: e.to_string(),
                });
                OperationOutcome::Failed(e)
            }
        };
        // Resync on failure too.
        self.resync().await;
        Ok(outcome)
    }

    /// Reload one app (`Some(key)`) or all of them (`None`) after asking
    /// `confirm`. Declining returns `Cancelled` before any designer call.
    pub async fn reload_app(
        &self,
        key: Option<&str>,
        confirm: &dyn Confirm,
    ) -> LifecycleResult<OperationOutcome> {
        let _busy = self.reload_gate.try_acquire()?;

        let scope = ReloadScope::from_key(key);
        if !confirm.confirm(&ConfirmPrompt::for_reload(&scope)).await {
            tracing::debug!(?scope, "reload declined");
            return Ok(OperationOutcome::Cancelled);
        }
        Ok(self.perform_reload(scope).await)
    }

    /// Register an install task for `key` and open its log surface. When the
    /// surface closes the task is unregistered and `key` is reloaded once the
    /// reload gate is free.
    pub async fn install_dependencies(&self, key: &str) -> LifecycleResult<SpawnedTask> {
        self.ensure_known(key).await?;
        let descriptor = TaskDescriptor {
            kind: TaskKind::Install,
            base_dir: key.to_string(),
            script: None,
            background: true,
        };
        Ok(self.spawn_background(descriptor).await)
    }

    /// Run `script` from `scripts`. Rejected without any designer call when
    /// the list is empty or does not contain `script`.
    pub async fn run_script(
        &self,
        key: &str,
        scripts: &[String],
        script: &str,
        mode: RunMode,
    ) -> LifecycleResult<ScriptRun> {
        if scripts.is_empty() {
            return Err(LifecycleError::NoScripts {
                key: key.to_string(),
            });
        }
        if !scripts.iter().any(|s| s == script) {
            return Err(LifecycleError::UnknownScript {
                key: key.to_string(),
                script: script.to_string(),
            });
        }
        self.ensure_known(key).await?;

        let background = mode == RunMode::Background;
        let descriptor = TaskDescriptor {
            kind: TaskKind::Run,
            base_dir: key.to_string(),
            script: Some(script.to_string()),
            background,
        };
        if background {
            Ok(ScriptRun::Background(self.spawn_background(descriptor).await))
        } else {
            tracing::info!(key, script, "running script in foreground");
            Ok(ScriptRun::Foreground(self.surface.open(descriptor)))
        }
    }

    /// Stop tracking every task owned by `key`. Best effort: the jobs
    /// themselves may keep running on the designer side.
    pub async fn stop_all(&self, key: &str) -> Vec<TaskId> {
        let mut stopped = Vec::new();
        for id in self.tasks.list_by_owner(key).await {
            if self.tasks.unregister(&id).await.is_some() {
                stopped.push(id);
            }
        }
        if !stopped.is_empty() {
            tracing::info!(key, count = stopped.len(), "stopped background tasks");
            self.notify(Notice::TasksStopped {
                key: key.to_string(),
                count: stopped.len(),
            });
        }
        stopped
    }

    async fn ensure_known(&self, key: &str) -> LifecycleResult<()> {
        if self.apps.contains(key).await {
            Ok(())
        } else {
            Err(LifecycleError::UnknownApp(key.to_string()))
        }
    }

    async fn spawn_background(&self, descriptor: TaskDescriptor) -> SpawnedTask {
        let key = descriptor.base_dir.clone();
        let kind = descriptor.kind;
        let id = self.tasks.register(&key, kind).await;
        tracing::info!(key = %key, %kind, task = %id, "background task started");
        self.notify(Notice::TaskStarted {
            key: key.clone(),
            kind,
            id: id.clone(),
        });

        let handle = self.surface.open(descriptor);
        let this = self.clone();
        let task_id = id.clone();
        let watcher = tokio::spawn(async move {
            let surface = handle.closed().await;
            let reload = this.finish_task(&task_id, &key, kind, &surface).await;
            TaskExit { surface, reload }
        });
        SpawnedTask { id, watcher }
    }

    async fn finish_task(
        &self,
        id: &TaskId,
        key: &str,
        kind: TaskKind,
        exit: &SurfaceExit,
    ) -> Option<OperationOutcome> {
        tracing::debug!(task = %id, ?exit, "log surface closed");
        if self.tasks.unregister(id).await.is_some() {
            self.notify(Notice::TaskFinished {
                key: key.to_string(),
                kind,
                id: id.clone(),
            });
        }
        if kind != TaskKind::Install {
            return None;
        }
        // No confirmation, but queue behind any reload already in flight.
        let Some(_busy) = self.reload_gate.acquire().await else {
            tracing::warn!(key, "reload gate closed; skipping post-install reload");
            return None;
        };
        Some(self.perform_reload(ReloadScope::Single(key.to_string())).await)
    }

    async fn perform_reload(&self, scope: ReloadScope) -> OperationOutcome {
        tracing::info!(?scope, "reloading");
        let outcome = match self.api.reload_app(scope.key()).await {
            Ok(()) => {
                self.notify(Notice::Reloaded {
                    scope: scope.clone(),
                });
                OperationOutcome::Completed
            }
            Err(e) => {
                tracing::warn!(?scope, error = %e, "reload failed");
                self.notify(Notice::ReloadFailed {
                    scope: scope.clone(),
                    detail: e.to_string(),
                });
                OperationOutcome::Failed(e)
            }
        };
        // Graph topology may have changed under the current view.
        self.graph.clear_view().await;
        let _ = self.event_tx.send(LifecycleEvent::GraphViewCleared);
        self.resync().await;
        outcome
    }

    /// Registry refresh followed by graph resync, in that order.
    async fn resync(&self) {
        match self.apps.refresh().await {
            Ok(apps) => self.after_refresh(&apps).await,
            Err(e) => tracing::warn!(error = %e, "app list refresh failed; keeping cached list"),
        }
        self.graph.resync().await;
    }

    async fn after_refresh(&self, apps: &[Application]) {
        let _ = self
            .event_tx
            .send(LifecycleEvent::AppsRefreshed { count: apps.len() });
        let keys = || apps.iter().map(|app| app.key.as_str());
        self.scripts.retain(keys()).await;

        let orphans = self.tasks.orphans(keys()).await;
        if !orphans.is_empty() {
            for task in &orphans {
                tracing::warn!(
                    task = %task.id,
                    owner = %task.owner_key,
                    "background task belongs to an app that is no longer loaded"
                );
            }
            self.notify(Notice::OrphanedTasks {
                count: orphans.len(),
            });
        }
    }

    fn notify(&self, notice: Notice) {
        let _ = self.event_tx.send(LifecycleEvent::Notice(notice));
    }
}
