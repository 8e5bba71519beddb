use crate::orchestrator::OperationCategory;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("designer request failed: {0}")]
    Transport(String),
    #[error("designer returned malformed data: {0}")]
    Validation(String),
    #[error("another {0} is already in progress")]
    Busy(OperationCategory),
    #[error("app is not loaded: {0}")]
    UnknownApp(String),
    #[error("app {key} has no runnable scripts")]
    NoScripts { key: String },
    #[error("app {key} has no script named {script}")]
    UnknownScript { key: String, script: String },
}

impl LifecycleError {
    /// Rejections happen before any external call is made.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Busy(_) | Self::UnknownApp(_) | Self::NoScripts { .. } | Self::UnknownScript { .. }
        )
    }
}

impl From<reqwest::Error> for LifecycleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Validation(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
