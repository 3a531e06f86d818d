//! One client context driving report runs end to end.
//!
//! The session owns the reducer state and the latest result bundle. Engine
//! events are applied one at a time on the caller's task, so no state is
//! shared across threads.

use chrono::Utc;
use engine_logging::{engine_info, engine_warn};
use report_core::{update, Msg, NodeGraph, ProgressAggregator, ProgressView, RunStatus};
use report_engine::{
    EventKind, Extractor, InputError, ReportClient, ReportInputs, ResultBundle, ResultExtractor,
};

use crate::config::AppConfig;
use crate::effects::{event_to_msg, EffectRunner};

/// Final state of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub view: ProgressView,
    pub bundle: ResultBundle,
}

pub struct ReportSession {
    progress: ProgressAggregator,
    bundle: ResultBundle,
    inputs: ReportInputs,
    runner: EffectRunner,
    extractor: Box<dyn Extractor>,
}

impl ReportSession {
    pub fn new(graph: NodeGraph, client: ReportClient) -> Self {
        Self {
            progress: ProgressAggregator::new(graph),
            bundle: ResultBundle::default(),
            inputs: ReportInputs::default(),
            runner: EffectRunner::new(client),
            extractor: Box::new(ResultExtractor::default()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.node_graph(),
            ReportClient::new(config.upstream_settings()),
        )
    }

    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    pub fn bundle(&self) -> &ResultBundle {
        &self.bundle
    }

    pub fn view(&self) -> ProgressView {
        self.progress.view(Utc::now())
    }

    /// Executes one run to its end and returns the final view and bundle.
    pub async fn run(&mut self, inputs: &ReportInputs) -> Result<RunOutcome, InputError> {
        self.start(inputs)?;
        while self.step().await {}
        Ok(RunOutcome {
            view: self.view(),
            bundle: self.bundle.clone(),
        })
    }

    /// Begins a run, replacing any run in flight. A blank topic is rejected
    /// and leaves the session untouched.
    pub fn start(&mut self, inputs: &ReportInputs) -> Result<(), InputError> {
        self.inputs = inputs.validated()?;
        self.bundle = ResultBundle::default();
        self.dispatch(Msg::StartRequested { now: Utc::now() });
        Ok(())
    }

    /// Applies the next upstream event. Returns `false` once the run has
    /// nothing more to deliver.
    pub async fn step(&mut self) -> bool {
        if !self.runner.has_active_run() {
            return false;
        }
        let Some(event) = self.runner.next_event().await else {
            self.dispatch(Msg::StreamClosed);
            return false;
        };

        if let EventKind::WorkflowFinished { outputs } = &event.kind {
            self.bundle = self.extractor.extract(outputs);
            if self.bundle.document_body.is_empty() {
                engine_warn!("Run finished without a document body");
            }
        }
        self.dispatch(event_to_msg(&event));

        if event.kind.is_terminal() {
            self.runner.release();
            return false;
        }
        true
    }

    /// Abandons the active run. Events already applied are kept.
    pub fn cancel(&mut self) {
        self.dispatch(Msg::CancelRequested);
    }

    /// Returns a finished or failed run to idle.
    pub fn reset(&mut self) {
        self.dispatch(Msg::ResetRequested);
        if self.progress.status() == RunStatus::Idle {
            self.bundle = ResultBundle::default();
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let mut pending = Some(msg);
        while let Some(msg) = pending.take() {
            let state = std::mem::take(&mut self.progress);
            let (state, effects) = update(state, msg);
            self.progress = state;
            pending = self.runner.execute(effects, &self.inputs);
            self.log_progress();
        }
    }

    fn log_progress(&mut self) {
        if !self.progress.consume_dirty() {
            return;
        }
        let view = self.view();
        match view.status {
            RunStatus::Error => engine_warn!(
                "Run failed at {}%: {}",
                view.percentage,
                view.error.as_deref().unwrap_or_default()
            ),
            status => engine_info!(
                "{:?} {}% ({}/{} nodes) node={:?} eta={:?}s",
                status,
                view.percentage,
                view.completed_nodes,
                view.total_nodes,
                view.current_node_title,
                view.eta_seconds
            ),
        }
    }
}
