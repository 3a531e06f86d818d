use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// Upstream defaults applied to optional request fields.
pub const DEFAULT_REPORT_KIND: &str = "行业研报";
pub const DEFAULT_DEPTH: &str = "深度研究";
pub const DEFAULT_TARGET_LENGTH: &str = "3000字";

/// A report request as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportInputs {
    pub topic: String,
    pub report_kind: String,
    pub depth: String,
    pub target_length: String,
}

impl ReportInputs {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Trims every field and fills blanks with the upstream defaults.
    /// Rejects a blank topic.
    pub fn validated(&self) -> Result<ReportInputs, InputError> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err(InputError::MissingTopic);
        }
        Ok(ReportInputs {
            topic: topic.to_string(),
            report_kind: or_default(&self.report_kind, DEFAULT_REPORT_KIND),
            depth: or_default(&self.depth, DEFAULT_DEPTH),
            target_length: or_default(&self.target_length, DEFAULT_TARGET_LENGTH),
        })
    }
}

fn or_default(value: &str, default: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("research topic is required")]
    MissingTopic,
}

/// One decoded record of the upstream event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEvent {
    pub task_id: String,
    pub run_id: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    WorkflowStarted,
    NodeStarted {
        node_id: String,
        title: String,
    },
    NodeFinished {
        node_id: String,
        elapsed_seconds: Option<f64>,
    },
    WorkflowFinished {
        outputs: Map<String, Value>,
    },
    Error {
        message: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::WorkflowStarted => "workflow_started",
            EventKind::NodeStarted { .. } => "node_started",
            EventKind::NodeFinished { .. } => "node_finished",
            EventKind::WorkflowFinished { .. } => "workflow_finished",
            EventKind::Error { .. } => "error",
        }
    }

    /// `workflow_finished` and `error` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::WorkflowFinished { .. } | EventKind::Error { .. }
        )
    }
}

/// A stream line that could not be turned into an [`UpstreamEvent`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("invalid event json: {0}")]
    InvalidJson(String),
    #[error("unknown event kind {0:?}")]
    UnknownEvent(String),
    #[error("{event} event without {field}")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Radar,
    Table,
}

impl ChartKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "pie" => Some(ChartKind::Pie),
            "radar" => Some(ChartKind::Radar),
            "table" => Some(ChartKind::Table),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Radar => "radar",
            ChartKind::Table => "table",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A renderable chart. `table_data` is set only for [`ChartKind::Table`],
/// `render_option` only for the other kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub id: String,
    pub kind: ChartKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_option: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_data: Option<TableData>,
}

/// Normalized output of a finished run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBundle {
    pub document_body: String,
    pub charts: Vec<ChartSpec>,
    pub structured_data: Option<Map<String, Value>>,
    pub download_url: Option<String>,
}

impl ResultBundle {
    pub fn is_empty(&self) -> bool {
        self.document_body.is_empty()
            && self.charts.is_empty()
            && self.structured_data.is_none()
            && self.download_url.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidEndpoint,
    HttpStatus(u16),
    Timeout,
    IdleTimeout,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidEndpoint => write!(f, "invalid upstream endpoint"),
            FailureKind::HttpStatus(code) => write!(f, "upstream http status {code}"),
            FailureKind::Timeout => write!(f, "upstream timeout"),
            FailureKind::IdleTimeout => write!(f, "upstream idle timeout"),
            FailureKind::Network => write!(f, "upstream network error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_topic_is_rejected() {
        assert_eq!(
            ReportInputs::new("   ").validated(),
            Err(InputError::MissingTopic)
        );
    }

    #[test]
    fn blank_options_take_upstream_defaults() {
        let inputs = ReportInputs {
            topic: "  solid-state batteries ".to_string(),
            report_kind: String::new(),
            depth: " 快速概览 ".to_string(),
            target_length: "  ".to_string(),
        };
        let validated = inputs.validated().unwrap();
        assert_eq!(validated.topic, "solid-state batteries");
        assert_eq!(validated.report_kind, DEFAULT_REPORT_KIND);
        assert_eq!(validated.depth, "快速概览");
        assert_eq!(validated.target_length, DEFAULT_TARGET_LENGTH);
    }

    #[test]
    fn chart_kind_round_trips_names() {
        for kind in [
            ChartKind::Bar,
            ChartKind::Line,
            ChartKind::Pie,
            ChartKind::Radar,
            ChartKind::Table,
        ] {
            assert_eq!(ChartKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChartKind::parse("scatter"), None);
    }

    #[test]
    fn transport_error_display_names_kind() {
        let err = TransportError::new(FailureKind::HttpStatus(502), "bad gateway");
        assert_eq!(err.to_string(), "upstream http status 502: bad gateway");
    }
}
