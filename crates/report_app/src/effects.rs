use engine_logging::{engine_info, engine_warn};
use report_core::{Effect, Msg};
use report_engine::{EventKind, ReportClient, ReportInputs, ReportRun, UpstreamEvent};

/// Executes reducer effects against the engine and feeds engine output back
/// as messages.
pub struct EffectRunner {
    client: ReportClient,
    run: Option<ReportRun>,
}

impl EffectRunner {
    pub fn new(client: ReportClient) -> Self {
        Self { client, run: None }
    }

    /// Runs `effects` in order. Returns a message when an effect could not be
    /// carried out.
    pub fn execute(&mut self, effects: Vec<Effect>, inputs: &ReportInputs) -> Option<Msg> {
        let mut failure = None;
        for effect in effects {
            match effect {
                Effect::OpenStream => match self.client.begin(inputs) {
                    Ok(run) => {
                        engine_info!("OpenStream topic_len={}", inputs.topic.len());
                        self.run = Some(run);
                    }
                    Err(err) => {
                        engine_warn!("OpenStream rejected: {}", err);
                        failure = Some(Msg::Failed {
                            message: err.to_string(),
                        });
                    }
                },
                Effect::CancelStream => {
                    engine_info!("CancelStream");
                    self.client.cancel();
                    self.run = None;
                }
            }
        }
        failure
    }

    pub fn has_active_run(&self) -> bool {
        self.run.is_some()
    }

    /// Drops the active run after its terminal event.
    pub fn release(&mut self) {
        self.run = None;
    }

    /// Pulls the next upstream event of the active run. `None` once the run
    /// has ended or none is active.
    pub async fn next_event(&mut self) -> Option<UpstreamEvent> {
        let run = self.run.as_mut()?;
        let event = run.next_event().await;
        if event.is_none() {
            self.run = None;
        }
        event
    }
}

/// Translates an upstream event into the reducer's vocabulary.
pub fn event_to_msg(event: &UpstreamEvent) -> Msg {
    match &event.kind {
        EventKind::WorkflowStarted => Msg::WorkflowStarted {
            task_id: event.task_id.clone(),
            run_id: event.run_id.clone(),
        },
        EventKind::NodeStarted { node_id, title } => Msg::NodeStarted {
            node_id: node_id.clone(),
            title: title.clone(),
        },
        EventKind::NodeFinished {
            node_id,
            elapsed_seconds,
        } => Msg::NodeFinished {
            node_id: node_id.clone(),
            elapsed_seconds: *elapsed_seconds,
        },
        EventKind::WorkflowFinished { .. } => Msg::WorkflowFinished,
        EventKind::Error { message } => Msg::Failed {
            message: message.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn event(kind: EventKind) -> UpstreamEvent {
        UpstreamEvent {
            task_id: "t".to_string(),
            run_id: "r".to_string(),
            kind,
        }
    }

    #[test]
    fn maps_every_event_kind() {
        assert_eq!(
            event_to_msg(&event(EventKind::WorkflowStarted)),
            Msg::WorkflowStarted {
                task_id: "t".to_string(),
                run_id: "r".to_string(),
            }
        );
        assert_eq!(
            event_to_msg(&event(EventKind::NodeFinished {
                node_id: "2003".to_string(),
                elapsed_seconds: Some(4.0),
            })),
            Msg::NodeFinished {
                node_id: "2003".to_string(),
                elapsed_seconds: Some(4.0),
            }
        );
        assert_eq!(
            event_to_msg(&event(EventKind::WorkflowFinished {
                outputs: Map::new()
            })),
            Msg::WorkflowFinished
        );
        assert_eq!(
            event_to_msg(&event(EventKind::Error {
                message: "boom".to_string()
            })),
            Msg::Failed {
                message: "boom".to_string()
            }
        );
    }
}
