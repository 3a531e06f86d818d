use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::node::NodeGraph;
use crate::view_model::ProgressView;

/// Failure message recorded when a run is cancelled by the caller.
pub const CANCELLED_MESSAGE: &str = "cancelled";
/// Failure message recorded when the stream ends without a terminal event.
pub const STREAM_CLOSED_MESSAGE: &str = "stream closed before the workflow finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }
}

/// Progress of one run. Only [`ProgressAggregator`] mutates it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressState {
    status: RunStatus,
    current_node_id: Option<String>,
    current_node_title: Option<String>,
    completed_node_ids: Vec<String>,
    node_timings: BTreeMap<String, f64>,
    start_time: Option<DateTime<Utc>>,
    run_id: Option<String>,
    error: Option<String>,
}

impl ProgressState {
    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    pub fn current_node_title(&self) -> Option<&str> {
        self.current_node_title.as_deref()
    }

    /// Completed ids in completion order, without duplicates.
    pub fn completed_node_ids(&self) -> &[String] {
        &self.completed_node_ids
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed_node_ids.iter().any(|done| done == id)
    }

    /// Elapsed seconds per node id, as reported upstream.
    pub fn node_timings(&self) -> &BTreeMap<String, f64> {
        &self.node_timings
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Upstream run id, once the workflow acknowledged the run.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn clear_current(&mut self) {
        self.current_node_id = None;
        self.current_node_title = None;
    }
}

/// Weighted progress tracker for one client context.
///
/// Status transitions: `Idle -> Running` on [`start`](Self::start),
/// `Running -> Completed` on [`finish`](Self::finish), `Running -> Error` on
/// [`fail`](Self::fail), terminal states back to `Idle` on
/// [`reset`](Self::reset). Node events are ignored unless `Running`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressAggregator {
    graph: NodeGraph,
    state: ProgressState,
    dirty: bool,
}

impl ProgressAggregator {
    pub fn new(graph: NodeGraph) -> Self {
        Self {
            graph,
            state: ProgressState::default(),
            dirty: false,
        }
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    /// Clears all node state and begins a run stamped at `now`.
    ///
    /// Valid from `Idle`, or from `Running` to restart. A terminal run must be
    /// [`reset`](Self::reset) first; returns `false` otherwise.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.status.is_terminal() {
            return false;
        }
        self.state = ProgressState {
            status: RunStatus::Running,
            start_time: Some(now),
            ..ProgressState::default()
        };
        self.dirty = true;
        true
    }

    /// Records the upstream run id. Returns `false` when ignored.
    pub fn on_workflow_started(&mut self, run_id: &str) -> bool {
        if self.state.status != RunStatus::Running {
            return false;
        }
        if !run_id.is_empty() {
            self.state.run_id = Some(run_id.to_string());
            self.dirty = true;
        }
        true
    }

    /// Points the current node at `id`. Returns `false` when ignored.
    ///
    /// A node that already finished in this run is not made current again.
    pub fn on_node_started(&mut self, id: &str, title: &str) -> bool {
        if self.state.status != RunStatus::Running || self.state.is_completed(id) {
            return false;
        }
        self.state.current_node_id = Some(id.to_string());
        self.state.current_node_title = Some(title.to_string());
        self.dirty = true;
        true
    }

    /// Marks `id` complete. Idempotent on membership; the latest timing wins.
    /// Returns `false` when ignored.
    pub fn on_node_finished(&mut self, id: &str, elapsed_seconds: Option<f64>) -> bool {
        if self.state.status != RunStatus::Running {
            return false;
        }
        if !self.state.is_completed(id) {
            self.state.completed_node_ids.push(id.to_string());
        }
        if let Some(elapsed) = elapsed_seconds.filter(|e| e.is_finite() && *e >= 0.0) {
            self.state.node_timings.insert(id.to_string(), elapsed);
        }
        self.state.clear_current();
        self.dirty = true;
        true
    }

    /// Ends the run successfully. Nodes never reported finished stay pending.
    pub fn finish(&mut self) -> bool {
        if self.state.status != RunStatus::Running {
            return false;
        }
        self.state.status = RunStatus::Completed;
        self.state.clear_current();
        self.dirty = true;
        true
    }

    /// Ends the run with `message`.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.state.status != RunStatus::Running {
            return false;
        }
        self.state.status = RunStatus::Error;
        self.state.error = Some(message.into());
        self.state.clear_current();
        self.dirty = true;
        true
    }

    /// Returns a terminal run to `Idle`. A running run is left untouched.
    pub fn reset(&mut self) -> bool {
        match self.state.status {
            RunStatus::Running => false,
            RunStatus::Idle => true,
            RunStatus::Completed | RunStatus::Error => {
                self.state = ProgressState::default();
                self.dirty = true;
                true
            }
        }
    }

    /// Completed share of the total weight, rounded, in `0..=100`.
    pub fn percentage(&self) -> u8 {
        let total = self.graph.total_weight();
        if total <= 0.0 {
            return 0;
        }
        let done: f64 = self
            .state
            .completed_node_ids
            .iter()
            .map(|id| self.graph.weight_of(id))
            .sum();
        (100.0 * done / total).round().clamp(0.0, 100.0) as u8
    }

    /// Seconds left, extrapolated from the time per unit weight of the
    /// completed nodes that reported a timing.
    pub fn estimated_remaining(&self) -> Option<u64> {
        let mut pending_weight = 0.0;
        let mut pending = 0usize;
        let mut timed_seconds = 0.0;
        let mut timed_weight = 0.0;
        for node in self.graph.nodes() {
            if !self.state.is_completed(&node.id) {
                pending += 1;
                pending_weight += node.weight;
            } else if let Some(seconds) = self.state.node_timings.get(&node.id) {
                timed_seconds += seconds;
                timed_weight += node.weight;
            }
        }
        if pending == 0 || timed_weight <= 0.0 {
            return None;
        }
        Some((pending_weight * (timed_seconds / timed_weight)).round() as u64)
    }

    pub fn view(&self, now: DateTime<Utc>) -> ProgressView {
        let elapsed_seconds = match (self.state.status, self.state.start_time) {
            (RunStatus::Idle, _) | (_, None) => 0,
            (_, Some(start)) => (now - start).num_seconds().max(0) as u64,
        };
        ProgressView {
            status: self.state.status,
            percentage: self.percentage(),
            current_node_title: self.state.current_node_title.clone(),
            completed_nodes: self
                .state
                .completed_node_ids
                .iter()
                .filter(|id| self.graph.contains(id))
                .count(),
            total_nodes: self.graph.len(),
            eta_seconds: self.estimated_remaining(),
            elapsed_seconds,
            error: self.state.error.clone(),
        }
    }

    /// Reports whether anything changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
