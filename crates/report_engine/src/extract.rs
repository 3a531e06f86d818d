use engine_logging::{engine_debug, engine_warn};
use serde_json::{Map, Value};

use crate::charts::ChartNormalizer;
use crate::fence::strip_fences;
use crate::ResultBundle;

/// Output fields that may carry the document body, highest priority first.
pub const DOCUMENT_FIELDS: &[&str] = &["result", "html_content", "html", "report_content"];
/// Output fields that may carry explicit charts, highest priority first.
pub const CHART_FIELDS: &[&str] = &["charts_json", "charts"];
pub const STRUCTURED_DATA_FIELD: &str = "structured_data";
pub const DOWNLOAD_URL_FIELD: &str = "download_url";

pub trait Extractor: Send + Sync {
    fn extract(&self, outputs: &Map<String, Value>) -> ResultBundle;
}

/// Turns a finished run's output mapping into a [`ResultBundle`].
///
/// - document body: first candidate field that is non-empty after fence
///   stripping
/// - charts: explicit chart field if it yields any chart, otherwise charts
///   synthesized from structured data
/// - structured data: kept only when it parses to an object
///
/// Extraction never fails; unusable fields resolve to empty or absent.
#[derive(Debug, Default)]
pub struct ResultExtractor {
    normalizer: ChartNormalizer,
}

impl ResultExtractor {
    pub fn new(normalizer: ChartNormalizer) -> Self {
        Self { normalizer }
    }
}

impl Extractor for ResultExtractor {
    fn extract(&self, outputs: &Map<String, Value>) -> ResultBundle {
        let document_body = DOCUMENT_FIELDS
            .iter()
            .filter_map(|field| outputs.get(*field).and_then(Value::as_str))
            .map(strip_fences)
            .find(|body| !body.is_empty())
            .unwrap_or_default()
            .to_string();

        let structured_data = match outputs.get(STRUCTURED_DATA_FIELD).and_then(json_field) {
            Some(Value::Object(data)) => Some(data),
            Some(_) => {
                engine_warn!("Ignoring non-object {}", STRUCTURED_DATA_FIELD);
                None
            }
            None => None,
        };

        let mut charts = CHART_FIELDS
            .iter()
            .filter_map(|field| outputs.get(*field).and_then(json_field))
            .map(|payload| self.normalizer.charts_from_payload(&payload))
            .find(|charts| !charts.is_empty())
            .unwrap_or_default();
        if charts.is_empty() {
            if let Some(data) = structured_data.as_ref() {
                charts = self.normalizer.synthesize(data);
                engine_debug!("Synthesized {} charts from structured data", charts.len());
            }
        }

        let download_url = outputs
            .get(DOWNLOAD_URL_FIELD)
            .and_then(Value::as_str)
            .map(strip_fences)
            .filter(|url| !url.is_empty())
            .map(ToOwned::to_owned);

        ResultBundle {
            document_body,
            charts,
            structured_data,
            download_url,
        }
    }
}

/// A field expected to carry JSON: structured values are used as they are,
/// strings go through [`parse_embedded_json`].
fn json_field(value: &Value) -> Option<Value> {
    match value {
        Value::String(text) => parse_embedded_json(text),
        Value::Array(_) | Value::Object(_) => Some(value.clone()),
        _ => None,
    }
}

/// Opening and closing brackets of the JSON containers recovery looks for.
const CONTAINER_BRACKETS: [(char, char); 2] = [('[', ']'), ('{', '}')];

/// Parses JSON that may be fenced or surrounded by prose.
///
/// After a direct parse fails, each container kind is tried once, starting
/// with the one whose opener appears first: the span from the first opener to
/// the last closer of the same kind.
pub fn parse_embedded_json(text: &str) -> Option<Value> {
    let text = strip_fences(text);
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    let mut spans: Vec<(usize, char)> = CONTAINER_BRACKETS
        .iter()
        .filter_map(|&(open, close)| text.find(open).map(|start| (start, close)))
        .collect();
    spans.sort_by_key(|&(start, _)| start);
    spans.into_iter().find_map(|(start, close)| {
        let end = text.rfind(close).filter(|&end| end > start)?;
        match serde_json::from_str(&text[start..=end]) {
            Ok(value) => Some(value),
            Err(err) => {
                engine_debug!("Embedded JSON recovery failed for {:?}: {}", close, err);
                None
            }
        }
    })
}
