use std::sync::Arc;
use std::time::Duration;

use engine_logging::engine_info;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::sse::decode_stream;
use crate::transport::{ReqwestTransport, StreamRelay, Transport, UpstreamSettings};
use crate::{InputError, ReportInputs, UpstreamEvent};

/// One client context. At most one run is active at a time: beginning a new
/// run cancels the previous one first.
pub struct ReportClient {
    relay: StreamRelay,
    active: Option<CancellationToken>,
}

impl ReportClient {
    pub fn new(settings: UpstreamSettings) -> Self {
        let idle_timeout = settings.idle_timeout;
        Self::with_transport(Arc::new(ReqwestTransport::new(settings)), idle_timeout)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, idle_timeout: Duration) -> Self {
        Self {
            relay: StreamRelay::new(transport, idle_timeout),
            active: None,
        }
    }

    /// Starts a run. Nothing is sent upstream when `inputs` are invalid, and
    /// a rejected request leaves the current run untouched.
    pub fn begin(&mut self, inputs: &ReportInputs) -> Result<ReportRun, InputError> {
        let cancel = CancellationToken::new();
        let bytes = self.relay.relay(inputs, cancel.clone())?;
        if let Some(previous) = self.active.replace(cancel.clone()) {
            if !previous.is_cancelled() {
                engine_info!("Cancelling previous run");
                previous.cancel();
            }
        }
        Ok(ReportRun {
            events: decode_stream(bytes).boxed(),
            cancel,
        })
    }

    /// Cancels the active run, if any.
    pub fn cancel(&mut self) {
        if let Some(token) = self.active.take() {
            token.cancel();
        }
    }
}

/// Events of one run, pulled in order. Nothing is read from upstream until
/// the next event is requested.
pub struct ReportRun {
    events: BoxStream<'static, UpstreamEvent>,
    cancel: CancellationToken,
}

impl ReportRun {
    /// The next decoded event, or `None` once the stream has ended or the
    /// run was cancelled.
    pub async fn next_event(&mut self) -> Option<UpstreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.events.next().await
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ReportRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
