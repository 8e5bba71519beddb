//! Text rendering for CLI output.
//!
//! Formats derived app rows, script lists and controller events into plain
//! lines. Nothing here touches the designer or the registries.

use crate::designer::GraphInfo;
use crate::error::LifecycleError;
use crate::model::{AppView, BackgroundTask, LifecycleEvent, Notice};

/// Pre-formatted lines for text output.
pub(crate) struct AppTable {
    pub lines: Vec<String>,
}

/// Build the `list` table. Column widths follow the longest key.
pub(crate) fn build_app_table(views: &[AppView]) -> AppTable {
    if views.is_empty() {
        return AppTable {
            lines: vec!["No apps loaded".to_string()],
        };
    }
    let width = views
        .iter()
        .map(|v| v.key.len())
        .max()
        .unwrap_or(0)
        .max("APP".len());
    let mut lines = Vec::with_capacity(views.len() + 1);
    lines.push(format!("{:<width$}  {:<7}  TASKS", "APP", "STATUS"));
    for view in views {
        lines.push(format!(
            "{:<width$}  {:<7}  {}",
            view.key,
            view.status.to_string(),
            view.tasks
        ));
    }
    AppTable { lines }
}

pub(crate) fn script_lines(key: &str, scripts: &[String]) -> Vec<String> {
    if scripts.is_empty() {
        return vec![format!("{key} has no scripts")];
    }
    scripts.iter().map(|s| format!("  {s}")).collect()
}

pub(crate) fn graph_lines(graphs: &[GraphInfo]) -> Vec<String> {
    if graphs.is_empty() {
        return vec!["No graphs".to_string()];
    }
    graphs
        .iter()
        .map(|g| match g.auto_start {
            Some(true) => format!("{} (auto start)", g.name),
            _ => g.name.clone(),
        })
        .collect()
}

/// Warnings for tasks whose app is no longer loaded.
pub(crate) fn orphan_lines(orphans: &[BackgroundTask]) -> Vec<String> {
    orphans
        .iter()
        .map(|task| {
            format!(
                "warning: {} task {} belongs to {}, which is not loaded",
                task.kind, task.id, task.owner_key
            )
        })
        .collect()
}

/// Rejections never reached the designer; say so.
pub(crate) fn error_line(err: &LifecycleError) -> String {
    if err.is_rejection() {
        format!("rejected: {err}")
    } else {
        format!("error: {err}")
    }
}

/// Notice line for stderr. Failures are prefixed so they stand out in logs.
pub(crate) fn notice_line(notice: &Notice) -> String {
    if notice.is_failure() {
        format!("error: {}", notice.to_message())
    } else {
        notice.to_message()
    }
}

/// Stderr line for a controller event, if it is worth showing.
pub(crate) fn event_line(event: &LifecycleEvent, verbose: bool) -> Option<String> {
    match event {
        LifecycleEvent::Notice(notice) => Some(notice_line(notice)),
        LifecycleEvent::AppsRefreshed { count } if verbose => {
            Some(format!("App list refreshed ({count} loaded)"))
        }
        LifecycleEvent::GraphViewCleared if verbose => Some("Graph view cleared".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppStatus, ReloadScope, TaskId, TaskKind};
    use crate::orchestrator::OperationCategory;

    fn view(key: &str, status: AppStatus, tasks: usize) -> AppView {
        AppView {
            key: key.to_string(),
            status,
            tasks,
        }
    }

    #[test]
    fn table_aligns_on_longest_key() {
        let table = build_app_table(&[
            view("/srv/app", AppStatus::Loaded, 0),
            view("/b", AppStatus::Running, 2),
        ]);
        assert_eq!(table.lines.len(), 3);
        assert_eq!(table.lines[0], "APP       STATUS   TASKS");
        assert_eq!(table.lines[1], "/srv/app  LOADED   0");
        assert_eq!(table.lines[2], "/b        RUNNING  2");
    }

    #[test]
    fn empty_table_says_so() {
        assert_eq!(build_app_table(&[]).lines, vec!["No apps loaded"]);
    }

    #[test]
    fn failures_are_prefixed() {
        let line = notice_line(&Notice::ReloadFailed {
            scope: ReloadScope::All,
            detail: "timeout".into(),
        });
        assert!(line.starts_with("error: "));
        assert!(!notice_line(&Notice::Unloaded { key: "/a".into() }).starts_with("error: "));
    }

    #[test]
    fn rejections_are_worded_apart_from_failures() {
        assert_eq!(
            error_line(&LifecycleError::Busy(OperationCategory::Reload)),
            "rejected: another reload is already in progress"
        );
        assert!(error_line(&LifecycleError::Transport("down".into())).starts_with("error: "));
    }

    #[test]
    fn orphan_lines_name_task_and_owner() {
        let lines = orphan_lines(&[BackgroundTask {
            id: TaskId::new("install-1-00000000"),
            owner_key: "/gone".into(),
            kind: TaskKind::Install,
            started_utc: String::new(),
        }]);
        assert_eq!(
            lines,
            vec!["warning: install task install-1-00000000 belongs to /gone, which is not loaded"]
        );
        assert!(orphan_lines(&[]).is_empty());
    }

    #[test]
    fn graph_lines_mark_auto_start() {
        let graphs = vec![
            GraphInfo {
                name: "voice".into(),
                auto_start: Some(true),
                base_dir: None,
            },
            GraphInfo {
                name: "debug".into(),
                auto_start: None,
                base_dir: None,
            },
        ];
        assert_eq!(graph_lines(&graphs), vec!["voice (auto start)", "debug"]);
        assert_eq!(graph_lines(&[]), vec!["No graphs"]);
    }

    #[test]
    fn refresh_events_only_shown_when_verbose() {
        let event = LifecycleEvent::AppsRefreshed { count: 3 };
        assert_eq!(event_line(&event, false), None);
        assert!(event_line(&event, true).is_some());
    }
}
