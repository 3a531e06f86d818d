//! Report engine: upstream streaming, event decoding and result extraction.
mod charts;
mod engine;
mod extract;
mod fence;
mod sse;
mod transport;
mod types;

pub use charts::{ChartNormalizer, PALETTE};
pub use engine::{ReportClient, ReportRun};
pub use extract::{
    parse_embedded_json, Extractor, ResultExtractor, CHART_FIELDS, DOCUMENT_FIELDS,
    DOWNLOAD_URL_FIELD, STRUCTURED_DATA_FIELD,
};
pub use fence::{strip_fences, FENCE_LANGUAGES};
pub use sse::{decode_line, decode_stream, error_frame, parse_event, SseDecoder, DATA_PREFIX};
pub use transport::{
    ByteStream, ReqwestTransport, StreamRelay, Transport, UpstreamSettings, EVENT_STREAM_HEADERS,
};
pub use types::{
    ChartKind, ChartSpec, EventKind, FailureKind, FrameError, InputError, ReportInputs,
    ResultBundle, TableData, TransportError, UpstreamEvent, DEFAULT_DEPTH, DEFAULT_REPORT_KIND,
    DEFAULT_TARGET_LENGTH,
};
