//! Report core: pure progress state machine and view-model helpers.
mod effect;
mod msg;
mod node;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use node::{phase_description, NodeGraph, WorkflowNode};
pub use state::{
    ProgressAggregator, ProgressState, RunStatus, CANCELLED_MESSAGE, STREAM_CLOSED_MESSAGE,
};
pub use update::update;
pub use view_model::ProgressView;
