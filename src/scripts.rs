//! Per-application script catalog.
//!
//! Script names are fetched lazily the first time an application's scripts
//! are asked for and memoized until the entry is invalidated or the
//! application disappears from the registry. Concurrent first requests for
//! the same key share one fetch.

use crate::designer::DesignerApi;
use crate::error::LifecycleResult;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

type ScriptCell = Arc<OnceCell<Vec<String>>>;

pub struct ScriptCatalog {
    api: Arc<dyn DesignerApi>,
    entries: RwLock<HashMap<String, ScriptCell>>,
}

impl ScriptCatalog {
    pub fn new(api: Arc<dyn DesignerApi>) -> Self {
        Self {
            api,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Script names for `key`, fetching them on first use. Failed fetches are
    /// not cached; the next call tries again.
    pub async fn scripts_for(&self, key: &str) -> LifecycleResult<Vec<String>> {
        let cell = {
            let mut entries = self.entries.write().await;
            entries.entry(key.to_string()).or_default().clone()
        };
        let scripts = cell
            .get_or_try_init(|| async move {
                tracing::debug!(key, "fetching app scripts");
                self.api.list_scripts(key).await
            })
            .await?;
        Ok(scripts.clone())
    }

    /// Cached scripts for `key`; `None` while not yet fetched or still loading.
    #[cfg(test)]
    pub async fn cached(&self, key: &str) -> Option<Vec<String>> {
        self.entries
            .read()
            .await
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    #[cfg(test)]
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Drop entries whose application is no longer known.
    pub async fn retain<'a>(&self, known_keys: impl IntoIterator<Item = &'a str>) {
        let known: HashSet<&str> = known_keys.into_iter().collect();
        self.entries
            .write()
            .await
            .retain(|key, _| known.contains(key.as_str()));
    }
}
