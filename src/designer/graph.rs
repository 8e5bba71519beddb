use super::{DesignerApi, GraphInfo, GraphSync};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Local copy of the designer's execution graphs plus the graph currently
/// being viewed.
pub struct GraphCache {
    api: Arc<dyn DesignerApi>,
    graphs: RwLock<Vec<GraphInfo>>,
    selected: RwLock<Option<String>>,
}

impl GraphCache {
    pub fn new(api: Arc<dyn DesignerApi>) -> Self {
        Self {
            api,
            graphs: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
        }
    }

    pub async fn graphs(&self) -> Vec<GraphInfo> {
        self.graphs.read().await.clone()
    }

    #[cfg(test)]
    pub async fn select(&self, name: impl Into<String>) {
        *self.selected.write().await = Some(name.into());
    }

    #[cfg(test)]
    pub async fn selected(&self) -> Option<String> {
        self.selected.read().await.clone()
    }
}

#[async_trait]
impl GraphSync for GraphCache {
    async fn resync(&self) {
        match self.api.list_graphs().await {
            Ok(graphs) => {
                tracing::debug!(count = graphs.len(), "graph cache resynced");
                let mut selected = self.selected.write().await;
                let vanished = selected
                    .as_deref()
                    .is_some_and(|name| !graphs.iter().any(|g| g.name == name));
                if vanished {
                    *selected = None;
                }
                *self.graphs.write().await = graphs;
            }
            Err(e) => tracing::warn!(error = %e, "graph resync failed; keeping previous graphs"),
        }
    }

    async fn clear_view(&self) {
        *self.selected.write().await = None;
    }
}
