use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Caller asked for a new run. Any run still in flight is cancelled first.
    StartRequested { now: DateTime<Utc> },
    /// Caller asked to abandon the active run.
    CancelRequested,
    /// Caller asked to return a finished or failed run to idle.
    ResetRequested,
    /// Upstream acknowledged the run.
    WorkflowStarted { task_id: String, run_id: String },
    /// Upstream began executing a node.
    NodeStarted { node_id: String, title: String },
    /// Upstream finished a node.
    NodeFinished {
        node_id: String,
        elapsed_seconds: Option<f64>,
    },
    /// Upstream reported the terminal success event.
    WorkflowFinished,
    /// Upstream or transport reported a terminal failure.
    Failed { message: String },
    /// The event stream ended.
    StreamClosed,
    /// Fallback for placeholder wiring.
    NoOp,
}
