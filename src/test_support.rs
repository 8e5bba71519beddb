//! In-memory collaborators shared by unit tests.

use crate::designer::{
    AppInfo, Confirm, DesignerApi, ExecRequest, GraphInfo, GraphSync, LineStream, LogSurface,
    SurfaceCloser, SurfaceHandle,
};
use crate::error::{LifecycleError, LifecycleResult};
use crate::model::{ConfirmPrompt, TaskDescriptor};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Everything the collaborators were asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListApps,
    Load(String),
    Unload(String),
    Reload(Option<String>),
    ListScripts(String),
    ListGraphs,
    Exec(ExecRequest),
    GraphResync,
    GraphCleared,
    Confirm(ConfirmPrompt),
    SurfaceOpened(TaskDescriptor),
}

#[derive(Default)]
pub struct MockDesigner {
    apps: Mutex<Vec<String>>,
    scripts: Mutex<HashMap<String, Vec<String>>>,
    graphs: Mutex<Vec<GraphInfo>>,
    failures: Mutex<HashMap<&'static str, LifecycleError>>,
    calls: Mutex<Vec<Call>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl MockDesigner {
    pub fn with_apps(dirs: &[&str]) -> Arc<Self> {
        let mock = Self::default();
        *mock.apps.lock().unwrap() = dirs.iter().map(|d| d.to_string()).collect();
        Arc::new(mock)
    }

    pub fn set_apps(&self, dirs: &[&str]) {
        *self.apps.lock().unwrap() = dirs.iter().map(|d| d.to_string()).collect();
    }

    pub fn set_scripts(&self, base_dir: &str, scripts: &[&str]) {
        self.scripts.lock().unwrap().insert(
            base_dir.to_string(),
            scripts.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn set_graphs(&self, names: &[&str]) {
        *self.graphs.lock().unwrap() = names
            .iter()
            .map(|name| GraphInfo {
                name: name.to_string(),
                auto_start: None,
                base_dir: None,
            })
            .collect();
    }

    /// Make `op` (the trait method name) fail with `err` until cleared.
    pub fn fail(&self, op: &'static str, err: LifecycleError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Park unload, reload and script-list calls until the returned notify
    /// is signalled.
    pub fn hold_actions(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn check(&self, op: &'static str) -> LifecycleResult<()> {
        match self.failures.lock().unwrap().get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn wait_if_held(&self) {
        let hold = self.hold.lock().unwrap().clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
    }
}

#[async_trait]
impl DesignerApi for MockDesigner {
    async fn list_apps(&self) -> LifecycleResult<Vec<AppInfo>> {
        self.record(Call::ListApps);
        self.check("list_apps")?;
        Ok(self
            .apps
            .lock()
            .unwrap()
            .iter()
            .map(|d| AppInfo {
                base_dir: d.clone(),
            })
            .collect())
    }

    async fn load_app(&self, base_dir: &str) -> LifecycleResult<()> {
        self.record(Call::Load(base_dir.to_string()));
        self.check("load_app")?;
        self.apps.lock().unwrap().push(base_dir.to_string());
        Ok(())
    }

    async fn unload_app(&self, base_dir: &str) -> LifecycleResult<()> {
        self.record(Call::Unload(base_dir.to_string()));
        self.wait_if_held().await;
        self.check("unload_app")?;
        self.apps.lock().unwrap().retain(|d| d != base_dir);
        Ok(())
    }

    async fn reload_app(&self, base_dir: Option<&str>) -> LifecycleResult<()> {
        self.record(Call::Reload(base_dir.map(str::to_string)));
        self.wait_if_held().await;
        self.check("reload_app")
    }

    async fn list_scripts(&self, base_dir: &str) -> LifecycleResult<Vec<String>> {
        self.record(Call::ListScripts(base_dir.to_string()));
        self.wait_if_held().await;
        self.check("list_scripts")?;
        Ok(self
            .scripts
            .lock()
            .unwrap()
            .get(base_dir)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_graphs(&self) -> LifecycleResult<Vec<GraphInfo>> {
        self.record(Call::ListGraphs);
        self.check("list_graphs")?;
        Ok(self.graphs.lock().unwrap().clone())
    }

    async fn exec(&self, request: ExecRequest) -> LifecycleResult<LineStream> {
        self.record(Call::Exec(request.clone()));
        self.check("exec")?;
        let lines = vec![Ok(format!("$ {}", request.cmd)), Ok("done".to_string())];
        Ok(futures::stream::iter(lines).boxed())
    }
}

/// Graph sync that only records calls into the designer's journal.
pub struct RecordingGraph {
    journal: Arc<MockDesigner>,
}

impl RecordingGraph {
    pub fn new(journal: Arc<MockDesigner>) -> Arc<Self> {
        Arc::new(Self { journal })
    }
}

#[async_trait]
impl GraphSync for RecordingGraph {
    async fn resync(&self) {
        self.journal.record(Call::GraphResync);
    }

    async fn clear_view(&self) {
        self.journal.record(Call::GraphCleared);
    }
}

/// Confirmation with a fixed answer.
pub struct FixedConfirm {
    answer: bool,
    journal: Arc<MockDesigner>,
}

impl FixedConfirm {
    pub fn new(answer: bool, journal: Arc<MockDesigner>) -> Self {
        Self { answer, journal }
    }
}

#[async_trait]
impl Confirm for FixedConfirm {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        self.journal.record(Call::Confirm(prompt.clone()));
        self.answer
    }
}

/// Log surface the test closes by hand.
pub struct ManualSurface {
    journal: Arc<MockDesigner>,
    open: Mutex<Vec<(TaskDescriptor, SurfaceCloser)>>,
}

impl ManualSurface {
    pub fn new(journal: Arc<MockDesigner>) -> Arc<Self> {
        Arc::new(Self {
            journal,
            open: Mutex::new(Vec::new()),
        })
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().unwrap().len()
    }

    /// Close the oldest open surface for `base_dir`.
    pub fn close(&self, base_dir: &str, exit: crate::designer::SurfaceExit) -> bool {
        let mut open = self.open.lock().unwrap();
        let Some(pos) = open.iter().position(|(d, _)| d.base_dir == base_dir) else {
            return false;
        };
        let (_, closer) = open.remove(pos);
        closer.close(exit);
        true
    }
}

impl LogSurface for ManualSurface {
    fn open(&self, descriptor: TaskDescriptor) -> SurfaceHandle {
        self.journal.record(Call::SurfaceOpened(descriptor.clone()));
        let (closer, handle) = SurfaceHandle::pair();
        self.open.lock().unwrap().push((descriptor, closer));
        handle
    }
}
