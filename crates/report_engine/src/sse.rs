//! Server-sent event decoding.
//!
//! The upstream stream is a sequence of `data: <json>` lines separated by
//! blank lines. Chunks arrive at arbitrary byte offsets, so bytes are buffered
//! until a line break and only complete lines are decoded. A line that fails
//! to decode is logged and skipped; it never ends the stream.

use std::collections::VecDeque;

use bytes::Bytes;
use engine_logging::{engine_debug, engine_trace, engine_warn};
use futures_util::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{EventKind, FrameError, UpstreamEvent};

/// Prefix marking a payload line.
pub const DATA_PREFIX: &str = "data:";

const UNKNOWN_ERROR: &str = "unknown upstream error";
const LOGGED_LINE_LIMIT: usize = 200;

/// Incremental line decoder. Feed chunks with [`push`](Self::push) and call
/// [`finish`](Self::finish) once the stream closes.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    dropped: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and decodes every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<UpstreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete
            .split(|b| *b == b'\n')
            .filter_map(|line| self.decode(line))
            .collect()
    }

    /// Decodes a trailing line that was never terminated.
    pub fn finish(&mut self) -> Vec<UpstreamEvent> {
        let tail = std::mem::take(&mut self.buffer);
        self.decode(&tail).into_iter().collect()
    }

    /// Number of malformed lines skipped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn decode(&mut self, line: &[u8]) -> Option<UpstreamEvent> {
        let line = String::from_utf8_lossy(line);
        match decode_line(&line)? {
            Ok(event) => Some(event),
            Err(FrameError::UnknownEvent(kind)) => {
                engine_debug!("Ignoring upstream event kind {:?}", kind);
                None
            }
            Err(err) => {
                self.dropped += 1;
                engine_warn!("Dropping malformed stream line ({}): {}", err, clip(&line));
                None
            }
        }
    }
}

/// Decodes one line. `None` means the line is framing rather than payload.
pub fn decode_line(line: &str) -> Option<Result<UpstreamEvent, FrameError>> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        if !line.trim().is_empty() {
            engine_trace!("Skipping non-data line: {}", clip(line));
        }
        return None;
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }
    Some(parse_event(payload))
}

/// Turns a byte stream into the events it carries, in order.
pub fn decode_stream<S>(bytes: S) -> impl Stream<Item = UpstreamEvent> + Send
where
    S: Stream<Item = Bytes> + Send + Unpin + 'static,
{
    struct DecodeState<S> {
        bytes: S,
        decoder: SseDecoder,
        pending: VecDeque<UpstreamEvent>,
        closed: bool,
    }

    let state = DecodeState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        closed: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.closed {
                return None;
            }
            match state.bytes.next().await {
                Some(chunk) => {
                    let events = state.decoder.push(&chunk);
                    state.pending.extend(events);
                }
                None => {
                    state.closed = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    })
}

/// Encodes a terminal `error` record the way upstream would send it.
pub fn error_frame(message: &str) -> Bytes {
    let record = json!({
        "event": "error",
        "task_id": "",
        "workflow_run_id": "",
        "data": { "error": message },
    });
    Bytes::from(format!("{DATA_PREFIX} {record}\n\n"))
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    workflow_run_id: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
struct NodePayload {
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    elapsed_time: Option<f64>,
}

impl NodePayload {
    fn node_id(&self) -> Option<&str> {
        [self.node_id.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FinishedPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    outputs: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Decodes one JSON record into a typed event.
pub fn parse_event(json: &str) -> Result<UpstreamEvent, FrameError> {
    let raw: RawEvent =
        serde_json::from_str(json).map_err(|err| FrameError::InvalidJson(err.to_string()))?;

    let kind = match raw.event.as_str() {
        "workflow_started" => EventKind::WorkflowStarted,
        "node_started" => {
            let payload: NodePayload = payload(raw.data)?;
            let node_id = payload.node_id().ok_or(FrameError::MissingField {
                event: "node_started",
                field: "node_id",
            })?;
            let title = payload
                .title
                .as_deref()
                .filter(|title| !title.trim().is_empty())
                .unwrap_or(node_id);
            EventKind::NodeStarted {
                node_id: node_id.to_string(),
                title: title.to_string(),
            }
        }
        "node_finished" => {
            let payload: NodePayload = payload(raw.data)?;
            let node_id = payload.node_id().ok_or(FrameError::MissingField {
                event: "node_finished",
                field: "node_id",
            })?;
            EventKind::NodeFinished {
                node_id: node_id.to_string(),
                elapsed_seconds: payload.elapsed_time,
            }
        }
        "workflow_finished" => {
            let payload: FinishedPayload = payload(raw.data)?;
            let status = payload.status.unwrap_or_default();
            if status == "failed" || status == "stopped" {
                EventKind::Error {
                    message: non_empty(payload.error)
                        .unwrap_or_else(|| format!("workflow {status}")),
                }
            } else {
                EventKind::WorkflowFinished {
                    outputs: payload.outputs.unwrap_or_default(),
                }
            }
        }
        "error" => {
            let payload: ErrorPayload = payload(raw.data)?;
            let message = non_empty(payload.error)
                .or_else(|| non_empty(payload.message))
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
            EventKind::Error { message }
        }
        other => return Err(FrameError::UnknownEvent(other.to_string())),
    };

    Ok(UpstreamEvent {
        task_id: raw.task_id.unwrap_or_default(),
        run_id: raw.workflow_run_id.unwrap_or_default(),
        kind,
    })
}

fn payload<T>(data: Value) -> Result<T, FrameError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|err| FrameError::InvalidJson(err.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn clip(line: &str) -> &str {
    match line.char_indices().nth(LOGGED_LINE_LIMIT) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}
