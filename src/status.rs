//! Derived application status.
//!
//! Status is never stored: it is computed from the current task snapshot on
//! every read.

use crate::model::{AppStatus, AppView, Application};
use crate::tasks::TaskSnapshot;

/// `Running` when at least one task is owned by `app`, `Loaded` otherwise.
pub fn resolve(app: &Application, snapshot: &TaskSnapshot) -> AppStatus {
    if snapshot.iter().any(|task| task.owner_key == app.key) {
        AppStatus::Running
    } else {
        AppStatus::Loaded
    }
}

/// Build view rows for `apps` in their registry order.
pub fn resolve_all(apps: &[Application], snapshot: &TaskSnapshot) -> Vec<AppView> {
    apps.iter()
        .map(|app| AppView {
            key: app.key.clone(),
            status: resolve(app, snapshot),
            tasks: snapshot
                .iter()
                .filter(|task| task.owner_key == app.key)
                .count(),
        })
        .collect()
}
