use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use engine_logging::{engine_error, engine_info};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::sse::error_frame;
use crate::{FailureKind, InputError, ReportInputs, TransportError};

/// Response headers for an HTTP layer that forwards the relayed stream.
pub const EVENT_STREAM_HEADERS: &[(&str, &str)] = &[
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache, no-transform"),
    ("X-Accel-Buffering", "no"),
];

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    /// Longest wait for response headers or for the next chunk.
    pub idle_timeout: Duration,
    pub user_prefix: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost/v1/workflows/run".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(120),
            user_prefix: "report-user".to_string(),
        }
    }
}

/// Raw upstream body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Submits one run and returns its response body once headers arrive.
    async fn open(&self, inputs: &ReportInputs) -> Result<ByteStream, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    settings: UpstreamSettings,
}

impl ReqwestTransport {
    pub fn new(settings: UpstreamSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, TransportError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .build()
            .map_err(|err| TransportError::new(FailureKind::Network, err.to_string()))
    }

    fn request_body(&self, inputs: &ReportInputs) -> serde_json::Value {
        json!({
            "inputs": {
                "research_topic": inputs.topic,
                "report_type": inputs.report_kind,
                "depth_level": inputs.depth,
                "word_count": inputs.target_length,
            },
            "response_mode": "streaming",
            "user": format!("{}-{}", self.settings.user_prefix, Utc::now().timestamp_millis()),
        })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn open(&self, inputs: &ReportInputs) -> Result<ByteStream, TransportError> {
        let endpoint = url::Url::parse(&self.settings.endpoint)
            .map_err(|err| TransportError::new(FailureKind::InvalidEndpoint, err.to_string()))?;
        let client = self.build_client()?;
        let body = serde_json::to_vec(&self.request_body(inputs))
            .map_err(|err| TransportError::new(FailureKind::Network, err.to_string()))?;

        let mut request = client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .body(body);
        if let Some(key) = self.settings.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.trim();
            let message = if text.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {text}")
            };
            return Err(TransportError::new(
                FailureKind::HttpStatus(status.as_u16()),
                message,
            ));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_builder() {
        return TransportError::new(FailureKind::InvalidEndpoint, err.to_string());
    }
    TransportError::new(FailureKind::Network, err.to_string())
}

/// Pass-through of the upstream byte stream with failure synthesis.
///
/// Transport failures and idle timeouts are turned into one encoded `error`
/// record followed by the end of the stream. Cancellation ends the stream
/// without a record and drops the connection.
#[derive(Clone)]
pub struct StreamRelay {
    transport: Arc<dyn Transport>,
    idle_timeout: Duration,
}

enum RelayPhase {
    Connect(ReportInputs),
    Streaming(ByteStream),
    Done,
}

struct RelayState {
    transport: Arc<dyn Transport>,
    idle_timeout: Duration,
    cancel: CancellationToken,
    phase: RelayPhase,
}

impl StreamRelay {
    pub fn new(transport: Arc<dyn Transport>, idle_timeout: Duration) -> Self {
        Self {
            transport,
            idle_timeout,
        }
    }

    /// Validates `inputs` and returns the relayed stream. A blank topic is
    /// rejected before any upstream call.
    pub fn relay(
        &self,
        inputs: &ReportInputs,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Bytes>, InputError> {
        let inputs = inputs.validated()?;
        engine_info!("Opening upstream stream for topic {:?}", inputs.topic);
        let state = RelayState {
            transport: self.transport.clone(),
            idle_timeout: self.idle_timeout,
            cancel,
            phase: RelayPhase::Connect(inputs),
        };
        Ok(stream::unfold(state, next_chunk).boxed())
    }
}

async fn next_chunk(mut state: RelayState) -> Option<(Bytes, RelayState)> {
    let cancel = state.cancel.clone();
    let idle = state.idle_timeout;
    loop {
        match std::mem::replace(&mut state.phase, RelayPhase::Done) {
            RelayPhase::Connect(inputs) => {
                let transport = state.transport.clone();
                let opened = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    opened = tokio::time::timeout(idle, transport.open(&inputs)) => opened,
                };
                match opened {
                    Ok(Ok(body)) => state.phase = RelayPhase::Streaming(body),
                    Ok(Err(err)) => return Some((failure_frame(&err), state)),
                    Err(_) => return Some((idle_frame(idle), state)),
                }
            }
            RelayPhase::Streaming(mut body) => {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    next = tokio::time::timeout(idle, body.next()) => next,
                };
                return match next {
                    Ok(Some(Ok(chunk))) => {
                        state.phase = RelayPhase::Streaming(body);
                        Some((chunk, state))
                    }
                    Ok(Some(Err(err))) => Some((failure_frame(&err), state)),
                    Ok(None) => None,
                    Err(_) => Some((idle_frame(idle), state)),
                };
            }
            RelayPhase::Done => return None,
        }
    }
}

fn failure_frame(err: &TransportError) -> Bytes {
    engine_error!("Upstream transport failed: {}", err);
    error_frame(&err.to_string())
}

fn idle_frame(idle_timeout: Duration) -> Bytes {
    let err = TransportError::new(
        FailureKind::IdleTimeout,
        format!("no data received for {}s", idle_timeout.as_secs()),
    );
    failure_frame(&err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_inputs_and_user() {
        let transport = ReqwestTransport::new(UpstreamSettings {
            user_prefix: "tester".to_string(),
            ..UpstreamSettings::default()
        });
        let inputs = ReportInputs::new("edge AI chips").validated().unwrap();
        let body = transport.request_body(&inputs);
        assert_eq!(body["inputs"]["research_topic"], "edge AI chips");
        assert_eq!(body["inputs"]["report_type"], crate::DEFAULT_REPORT_KIND);
        assert_eq!(body["response_mode"], "streaming");
        assert!(body["user"].as_str().unwrap().starts_with("tester-"));
    }

    #[test]
    fn event_stream_headers_disable_buffering() {
        assert!(EVENT_STREAM_HEADERS.contains(&("X-Accel-Buffering", "no")));
        assert!(EVENT_STREAM_HEADERS.contains(&("Content-Type", "text/event-stream")));
    }
}
