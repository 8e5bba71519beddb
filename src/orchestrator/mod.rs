//! Application-level orchestration.
//!
//! This module owns the app lifecycle (load/unload/reload, install and script
//! runs, stopping tracked tasks) and the busy gates that keep destructive
//! operations from overlapping. CLI layers call into this module and render
//! the events it emits.

mod busy;
mod controller;

#[cfg(test)]
pub use busy::BusyState;
pub use busy::OperationCategory;
pub use controller::{
    ControllerParts, LifecycleController, OperationOutcome, ScriptRun, SpawnedTask,
};
