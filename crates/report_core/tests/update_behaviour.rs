use std::sync::Once;

use chrono::{TimeZone, Utc};
use report_core::{
    update, Effect, Msg, NodeGraph, ProgressAggregator, RunStatus, CANCELLED_MESSAGE,
    STREAM_CLOSED_MESSAGE,
};
use report_core::WorkflowNode;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn fresh() -> ProgressAggregator {
    ProgressAggregator::new(NodeGraph::new(vec![
        WorkflowNode::new("a", "Alpha", 1.0, 0),
        WorkflowNode::new("b", "Beta", 3.0, 1),
        WorkflowNode::new("c", "Gamma", 1.0, 2),
    ]))
}

fn start(state: ProgressAggregator) -> (ProgressAggregator, Vec<Effect>) {
    let now = Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap();
    update(state, Msg::StartRequested { now })
}

fn node_finished(id: &str) -> Msg {
    Msg::NodeFinished {
        node_id: id.to_string(),
        elapsed_seconds: None,
    }
}

#[test]
fn start_from_idle_opens_stream() {
    init_logging();
    let (mut state, effects) = start(fresh());

    assert_eq!(effects, vec![Effect::OpenStream]);
    assert_eq!(state.status(), RunStatus::Running);
    assert!(state.state().start_time().is_some());
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn start_while_running_cancels_previous_stream_first() {
    init_logging();
    let (state, _) = start(fresh());
    let (state, _) = update(state, node_finished("a"));
    let (state, effects) = start(state);

    assert_eq!(effects, vec![Effect::CancelStream, Effect::OpenStream]);
    assert_eq!(state.status(), RunStatus::Running);
    assert!(state.state().completed_node_ids().is_empty());
}

#[test]
fn start_after_failure_resets_then_opens_stream() {
    init_logging();
    let (state, _) = start(fresh());
    let (state, _) = update(state, node_finished("b"));
    let (state, _) = update(
        state,
        Msg::Failed {
            message: "upstream down".to_string(),
        },
    );
    assert_eq!(state.status(), RunStatus::Error);

    let (state, effects) = start(state);
    assert_eq!(effects, vec![Effect::OpenStream]);
    assert_eq!(state.status(), RunStatus::Running);
    assert!(state.state().completed_node_ids().is_empty());
    assert_eq!(state.state().error(), None);
    assert_eq!(state.percentage(), 0);
}

#[test]
fn full_run_reaches_completed() {
    init_logging();
    let (state, _) = start(fresh());
    let (state, _) = update(
        state,
        Msg::WorkflowStarted {
            task_id: "task-1".to_string(),
            run_id: "run-1".to_string(),
        },
    );
    let (state, _) = update(
        state,
        Msg::NodeStarted {
            node_id: "a".to_string(),
            title: "Alpha".to_string(),
        },
    );
    assert_eq!(state.state().current_node_id(), Some("a"));
    let (state, _) = update(state, node_finished("a"));
    let (state, _) = update(state, node_finished("b"));
    assert_eq!(state.percentage(), 80);

    let (state, effects) = update(state, Msg::WorkflowFinished);
    assert!(effects.is_empty());
    assert_eq!(state.status(), RunStatus::Completed);
    assert_eq!(state.state().run_id(), Some("run-1"));
    assert_eq!(state.percentage(), 80);
}

#[test]
fn failure_is_terminal() {
    init_logging();
    let (state, _) = start(fresh());
    let (state, _) = update(
        state,
        Msg::Failed {
            message: "upstream error: 500".to_string(),
        },
    );
    let (state, _) = update(state, node_finished("a"));
    let (state, _) = update(state, Msg::WorkflowFinished);

    assert_eq!(state.status(), RunStatus::Error);
    assert_eq!(state.state().error(), Some("upstream error: 500"));
    assert!(state.state().completed_node_ids().is_empty());
}

#[test]
fn stream_closed_without_terminal_event_fails_run() {
    init_logging();
    let (state, _) = start(fresh());
    let (state, _) = update(state, node_finished("a"));
    let (state, _) = update(state, Msg::StreamClosed);

    assert_eq!(state.status(), RunStatus::Error);
    assert_eq!(state.state().error(), Some(STREAM_CLOSED_MESSAGE));
    // Events applied before the close are kept.
    assert_eq!(state.percentage(), 20);
}

#[test]
fn stream_closed_after_finish_is_harmless() {
    init_logging();
    let (state, _) = start(fresh());
    let (state, _) = update(state, Msg::WorkflowFinished);
    let (state, _) = update(state, Msg::StreamClosed);
    assert_eq!(state.status(), RunStatus::Completed);
    assert_eq!(state.state().error(), None);
}

#[test]
fn cancel_emits_effect_and_keeps_applied_events() {
    init_logging();
    let (state, _) = start(fresh());
    let (state, _) = update(state, node_finished("b"));
    let (state, effects) = update(state, Msg::CancelRequested);

    assert_eq!(effects, vec![Effect::CancelStream]);
    assert_eq!(state.status(), RunStatus::Error);
    assert_eq!(state.state().error(), Some(CANCELLED_MESSAGE));
    assert_eq!(state.percentage(), 60);
}

#[test]
fn cancel_while_idle_does_nothing() {
    init_logging();
    let mut state = fresh();
    let before = state.clone();
    let (mut next, effects) = update(state.clone(), Msg::CancelRequested);

    assert!(effects.is_empty());
    assert_eq!(next, before);
    assert!(!next.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn reset_returns_terminal_run_to_idle() {
    init_logging();
    let (state, _) = start(fresh());
    let (state, _) = update(state, Msg::WorkflowFinished);
    let (state, effects) = update(state, Msg::ResetRequested);

    assert!(effects.is_empty());
    assert_eq!(state.status(), RunStatus::Idle);
    assert_eq!(state.state().start_time(), None);
}

#[test]
fn node_events_before_start_are_ignored() {
    init_logging();
    let (mut state, _) = update(fresh(), node_finished("a"));
    assert_eq!(state.status(), RunStatus::Idle);
    assert!(state.state().completed_node_ids().is_empty());
    assert!(!state.consume_dirty());
}
