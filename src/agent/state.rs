use serde::{Deserialize, Serialize};

use crate::agent::actions::Action;

/// Lifecycle states of one run. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    Running,
    AwaitingModel { image_base64: String },
    Executing { actions: Vec<Action> },
    Done { summary: String },
    Aborted { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The model declared the objective met, or the iteration budget ran out.
    Done,
    /// Unrecoverable failure; the process should exit non-zero.
    Aborted,
    /// Operator interrupt honored at a loop boundary.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub summary: String,
    /// Completed model-call iterations.
    pub iterations: u32,
}
