use crate::{Effect, Msg, ProgressAggregator, RunStatus, CANCELLED_MESSAGE, STREAM_CLOSED_MESSAGE};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: ProgressAggregator, msg: Msg) -> (ProgressAggregator, Vec<Effect>) {
    let effects = match msg {
        Msg::StartRequested { now } => {
            // At most one run per client context: the old stream goes first.
            let mut effects = Vec::with_capacity(2);
            match state.status() {
                RunStatus::Running => effects.push(Effect::CancelStream),
                RunStatus::Completed | RunStatus::Error => {
                    state.reset();
                }
                RunStatus::Idle => {}
            }
            state.start(now);
            effects.push(Effect::OpenStream);
            effects
        }
        Msg::CancelRequested => {
            if state.fail(CANCELLED_MESSAGE) {
                vec![Effect::CancelStream]
            } else {
                Vec::new()
            }
        }
        Msg::ResetRequested => {
            state.reset();
            Vec::new()
        }
        Msg::WorkflowStarted { run_id, .. } => {
            state.on_workflow_started(&run_id);
            Vec::new()
        }
        Msg::NodeStarted { node_id, title } => {
            state.on_node_started(&node_id, &title);
            Vec::new()
        }
        Msg::NodeFinished {
            node_id,
            elapsed_seconds,
        } => {
            state.on_node_finished(&node_id, elapsed_seconds);
            Vec::new()
        }
        Msg::WorkflowFinished => {
            state.finish();
            Vec::new()
        }
        Msg::Failed { message } => {
            state.fail(message);
            Vec::new()
        }
        Msg::StreamClosed => {
            state.fail(STREAM_CLOSED_MESSAGE);
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
