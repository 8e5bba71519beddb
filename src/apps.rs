//! Cached list of applications known to the designer.

use crate::designer::DesignerApi;
use crate::error::{LifecycleError, LifecycleResult};
use crate::model::Application;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct AppRegistry {
    api: Arc<dyn DesignerApi>,
    // Swapped whole on refresh; readers clone the Arc.
    cache: RwLock<Arc<Vec<Application>>>,
}

impl AppRegistry {
    pub fn new(api: Arc<dyn DesignerApi>) -> Self {
        Self {
            api,
            cache: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Fetch the current list from the designer without touching the cache.
    pub async fn fetch_all(&self) -> LifecycleResult<Vec<Application>> {
        let infos = self.api.list_apps().await?;
        let mut seen = HashSet::with_capacity(infos.len());
        let mut apps = Vec::with_capacity(infos.len());
        for info in infos {
            if info.base_dir.trim().is_empty() {
                return Err(LifecycleError::Validation(
                    "app entry with empty base_dir".into(),
                ));
            }
            if !seen.insert(info.base_dir.clone()) {
                return Err(LifecycleError::Validation(format!(
                    "duplicate app base_dir {}",
                    info.base_dir
                )));
            }
            apps.push(Application::new(info.base_dir));
        }
        Ok(apps)
    }

    /// Re-fetch and replace the cache. On error the previous list is kept.
    pub async fn refresh(&self) -> LifecycleResult<Arc<Vec<Application>>> {
        let apps = Arc::new(self.fetch_all().await?);
        *self.cache.write().await = apps.clone();
        tracing::debug!(count = apps.len(), "app list refreshed");
        Ok(apps)
    }

    pub async fn apps(&self) -> Arc<Vec<Application>> {
        self.cache.read().await.clone()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.cache.read().await.iter().any(|app| app.key == key)
    }
}
