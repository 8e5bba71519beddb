//! Background task registry.
//!
//! Tracks install/run jobs by id together with the application they act on.
//! The registry is owned by whoever constructs it and shared through `Arc`;
//! both the lifecycle controller and surface-close watchers mutate it.

use crate::model::{BackgroundTask, TaskId, TaskKind};
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

/// Immutable view of the registry at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSnapshot {
    tasks: Vec<BackgroundTask>,
}

impl TaskSnapshot {
    pub fn new(tasks: Vec<BackgroundTask>) -> Self {
        Self { tasks }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackgroundTask> {
        self.tasks.iter()
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    // Keyed by insertion sequence so listings keep registration order.
    tasks: RwLock<BTreeMap<u64, BackgroundTask>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new task for `owner_key` and return its id.
    pub async fn register(&self, owner_key: &str, kind: TaskKind) -> TaskId {
        let seq = self
            .next_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let now = time::OffsetDateTime::now_utc();
        let id = gen_task_id(kind, now.unix_timestamp_nanos());
        let task = BackgroundTask {
            id: id.clone(),
            owner_key: owner_key.to_string(),
            kind,
            started_utc: now
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
        };
        self.tasks.write().await.insert(seq, task);
        tracing::debug!(task = %id, owner = owner_key, %kind, "registered background task");
        id
    }

    /// Remove a task. Unknown ids are ignored.
    pub async fn unregister(&self, id: &TaskId) -> Option<BackgroundTask> {
        let mut tasks = self.tasks.write().await;
        let seq = tasks
            .iter()
            .find_map(|(seq, task)| (&task.id == id).then_some(*seq))?;
        let removed = tasks.remove(&seq);
        tracing::debug!(task = %id, "unregistered background task");
        removed
    }

    pub async fn list_by_owner(&self, owner_key: &str) -> Vec<TaskId> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| task.owner_key == owner_key)
            .map(|task| task.id.clone())
            .collect()
    }

    #[cfg(test)]
    pub async fn get(&self, id: &TaskId) -> Option<BackgroundTask> {
        self.tasks
            .read()
            .await
            .values()
            .find(|task| &task.id == id)
            .cloned()
    }

    pub async fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot::new(self.tasks.read().await.values().cloned().collect())
    }

    /// Tasks whose owner is not among `known_keys`.
    pub async fn orphans<'a>(
        &self,
        known_keys: impl IntoIterator<Item = &'a str>,
    ) -> Vec<BackgroundTask> {
        let known: HashSet<&str> = known_keys.into_iter().collect();
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| !known.contains(task.owner_key.as_str()))
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

/// Build a timestamp-qualified task id with a random suffix.
fn gen_task_id(kind: TaskKind, unix_nanos: i128) -> TaskId {
    let suffix: u32 = rand::thread_rng().gen();
    TaskId::new(format!("{}-{}-{:08x}", kind.as_str(), unix_nanos, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_allows_multiple_tasks_per_owner() {
        let registry = TaskRegistry::new();
        let first = registry.register("/a", TaskKind::Install).await;
        let second = registry.register("/a", TaskKind::Install).await;

        assert_ne!(first, second);
        assert_eq!(registry.list_by_owner("/a").await, vec![first, second]);
        assert!(registry.list_by_owner("/b").await.is_empty());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = TaskRegistry::new();
        let keep = registry.register("/a", TaskKind::Run).await;
        let drop = registry.register("/a", TaskKind::Install).await;

        assert!(registry.unregister(&drop).await.is_some());
        let once = registry.snapshot().await;
        assert!(registry.unregister(&drop).await.is_none());
        let twice = registry.snapshot().await;

        assert_eq!(once, twice);
        assert_eq!(registry.list_by_owner("/a").await, vec![keep]);
    }

    #[tokio::test]
    async fn unregister_unknown_id_is_noop() {
        let registry = TaskRegistry::new();
        registry.register("/a", TaskKind::Run).await;
        assert!(registry.unregister(&TaskId::new("missing")).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn task_ids_carry_kind_prefix() {
        let registry = TaskRegistry::new();
        let id = registry.register("/a", TaskKind::Install).await;
        assert!(id.as_str().starts_with("install-"));

        let task = registry.get(&id).await.expect("registered task");
        assert_eq!(task.owner_key, "/a");
        assert_eq!(task.kind, TaskKind::Install);
        assert!(!task.started_utc.is_empty());
    }

    #[tokio::test]
    async fn orphans_lists_tasks_of_unknown_owners() {
        let registry = TaskRegistry::new();
        registry.register("/a", TaskKind::Install).await;
        let orphan = registry.register("/gone", TaskKind::Run).await;

        let orphans = registry.orphans(["/a"]).await;
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, orphan);
        // Reported only, never purged.
        assert_eq!(registry.len().await, 2);
    }
}
