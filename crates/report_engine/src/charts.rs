//! Chart validation and synthesis.
//!
//! Explicit chart candidates are validated and canonicalized into
//! [`ChartSpec`]s. When a report carries no explicit charts, charts are built
//! from its structured data: comparisons become bar charts, trends line
//! charts, distributions pie charts and evaluations radar charts.

use std::collections::HashSet;

use engine_logging::{engine_debug, engine_warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{ChartKind, ChartSpec, TableData};

/// Series colors, assigned as `PALETTE[i % PALETTE.len()]`.
pub const PALETTE: &[&str] = &[
    "#1d1d1f", "#636366", "#86868b", "#aeaeb2", "#c7c7cc", "#d1d1d6",
];

const COMPARISON_FIELD: &str = "comparisonData";
const TREND_FIELD: &str = "trendData";
const DISTRIBUTION_FIELD: &str = "distributionData";
const EVALUATION_FIELD: &str = "evaluationData";

#[derive(Debug, Default, Clone, Copy)]
pub struct ChartNormalizer;

impl ChartNormalizer {
    /// Validates one candidate. Requires a known kind and a non-empty title;
    /// a missing id is replaced with a generated one.
    pub fn normalize(&self, candidate: &Value) -> Option<ChartSpec> {
        let chart = candidate.as_object()?;
        let kind = first_str(chart, &["type", "kind"]).and_then(ChartKind::parse)?;
        let title = first_str(chart, &["title"])?.trim();
        if title.is_empty() {
            return None;
        }
        let id = first_str(chart, &["id"])
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(generate_chart_id);
        let description = first_str(chart, &["description"])
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToOwned::to_owned);

        let (render_option, table_data) = if kind == ChartKind::Table {
            let table = chart.get("tableData").and_then(table_data);
            (None, table)
        } else {
            let option = ["option", "renderOption"]
                .iter()
                .filter_map(|key| chart.get(*key))
                .find(|value| value.is_object())
                .cloned();
            (option, None)
        };

        Some(ChartSpec {
            id,
            kind,
            title: title.to_string(),
            description,
            render_option,
            table_data,
        })
    }

    /// Normalizes a batch, dropping invalid candidates and re-identifying
    /// charts whose id was already taken.
    pub fn normalize_batch<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a Value>,
    ) -> Vec<ChartSpec> {
        let mut seen = HashSet::new();
        let mut charts = Vec::new();
        for (position, candidate) in candidates.into_iter().enumerate() {
            let Some(mut chart) = self.normalize(candidate) else {
                engine_warn!("Dropping invalid chart candidate at position {}", position);
                continue;
            };
            if !seen.insert(chart.id.clone()) {
                engine_debug!("Chart id {} repeated; assigning a new one", chart.id);
                chart.id = generate_chart_id();
                seen.insert(chart.id.clone());
            }
            charts.push(chart);
        }
        charts
    }

    /// Accepts an array of charts, an object with a `charts` array, or a
    /// single chart object.
    pub fn charts_from_payload(&self, payload: &Value) -> Vec<ChartSpec> {
        match payload {
            Value::Array(items) => self.normalize_batch(items),
            Value::Object(object) => match object.get("charts") {
                Some(Value::Array(items)) => self.normalize_batch(items),
                _ => self.normalize_batch([payload]),
            },
            _ => Vec::new(),
        }
    }

    /// Builds charts from structured report data.
    ///
    /// Order is all comparisons, then trends, distributions, evaluations.
    /// Ids are `"{kind}_{n}"` with one counter across all categories.
    pub fn synthesize(&self, data: &Map<String, Value>) -> Vec<ChartSpec> {
        let mut charts = Vec::new();
        let mut index = 0usize;
        synthesize_category(data, COMPARISON_FIELD, &mut index, &mut charts, bar_chart);
        synthesize_category(data, TREND_FIELD, &mut index, &mut charts, line_chart);
        synthesize_category(data, DISTRIBUTION_FIELD, &mut index, &mut charts, pie_chart);
        synthesize_category(data, EVALUATION_FIELD, &mut index, &mut charts, radar_chart);
        charts
    }
}

fn synthesize_category<T: DeserializeOwned>(
    data: &Map<String, Value>,
    field: &str,
    index: &mut usize,
    charts: &mut Vec<ChartSpec>,
    build: fn(T, usize) -> ChartSpec,
) {
    let Some(entries) = data.get(field).and_then(Value::as_array) else {
        return;
    };
    for (position, entry) in entries.iter().enumerate() {
        match serde_json::from_value::<T>(entry.clone()) {
            Ok(parsed) => {
                charts.push(build(parsed, *index));
                *index += 1;
            }
            Err(err) => {
                engine_warn!("Skipping {} entry {}: {}", field, position, err);
            }
        }
    }
}

fn generate_chart_id() -> String {
    format!("chart_{}", Uuid::new_v4().simple())
}

fn first_str<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
}

fn table_data(value: &Value) -> Option<TableData> {
    let table = value.as_object()?;
    let headers = table
        .get("headers")
        .and_then(Value::as_array)
        .map(|cells| cells.iter().map(cell_text).collect())
        .unwrap_or_default();
    let rows = table
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_array)
                .map(|cells| cells.iter().map(cell_text).collect())
                .collect()
        })
        .unwrap_or_default();
    Some(TableData { headers, rows })
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn palette_color(i: usize) -> &'static str {
    PALETTE[i % PALETTE.len()]
}

fn title_block(title: &str) -> Value {
    json!({ "text": title, "left": "center", "top": 20 })
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    name: String,
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ComparisonEntry {
    title: String,
    #[serde(default)]
    categories: Vec<Value>,
    #[serde(default)]
    series: Vec<Series>,
}

#[derive(Debug, Deserialize)]
struct TrendEntry {
    title: String,
    #[serde(default, rename = "xAxisData")]
    x_axis_data: Vec<Value>,
    #[serde(default)]
    series: Vec<Series>,
}

#[derive(Debug, Deserialize)]
struct Slice {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct DistributionEntry {
    title: String,
    #[serde(default)]
    data: Vec<Slice>,
}

#[derive(Debug, Deserialize)]
struct Score {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct EvaluationEntry {
    title: String,
    #[serde(default)]
    indicators: Vec<Value>,
    #[serde(default)]
    data: Vec<Score>,
}

fn synthesized(kind: ChartKind, index: usize, title: String, option: Value) -> ChartSpec {
    ChartSpec {
        id: format!("{kind}_{index}"),
        kind,
        title,
        description: None,
        render_option: Some(option),
        table_data: None,
    }
}

fn bar_chart(entry: ComparisonEntry, index: usize) -> ChartSpec {
    let option = json!({
        "title": title_block(&entry.title),
        "tooltip": { "trigger": "axis", "axisPointer": { "type": "shadow" } },
        "legend": {
            "data": entry.series.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "bottom": 20,
        },
        "xAxis": { "type": "category", "data": entry.categories },
        "yAxis": { "type": "value" },
        "series": entry.series.iter().enumerate().map(|(i, s)| json!({
            "name": s.name,
            "type": "bar",
            "data": s.data,
            "itemStyle": { "color": palette_color(i) },
        })).collect::<Vec<_>>(),
    });
    synthesized(ChartKind::Bar, index, entry.title, option)
}

fn line_chart(entry: TrendEntry, index: usize) -> ChartSpec {
    let option = json!({
        "title": title_block(&entry.title),
        "tooltip": { "trigger": "axis" },
        "legend": {
            "data": entry.series.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "bottom": 20,
        },
        "xAxis": { "type": "category", "data": entry.x_axis_data, "boundaryGap": false },
        "yAxis": { "type": "value" },
        "series": entry.series.iter().enumerate().map(|(i, s)| {
            let color = palette_color(i);
            json!({
                "name": s.name,
                "type": "line",
                "data": s.data,
                "smooth": true,
                "lineStyle": { "width": 3, "color": color },
                "areaStyle": {
                    "color": {
                        "type": "linear",
                        "x": 0, "y": 0, "x2": 0, "y2": 1,
                        "colorStops": [
                            { "offset": 0, "color": format!("{color}20") },
                            { "offset": 1, "color": format!("{color}05") },
                        ],
                    },
                },
            })
        }).collect::<Vec<_>>(),
    });
    synthesized(ChartKind::Line, index, entry.title, option)
}

fn pie_chart(entry: DistributionEntry, index: usize) -> ChartSpec {
    let option = json!({
        "title": title_block(&entry.title),
        "tooltip": { "trigger": "item", "formatter": "{b}: {c} ({d}%)" },
        "legend": { "bottom": 20 },
        "series": [{
            "name": entry.title,
            "type": "pie",
            "radius": ["40%", "70%"],
            "center": ["50%", "55%"],
            "data": entry.data.iter().enumerate().map(|(i, slice)| json!({
                "name": slice.name,
                "value": slice.value,
                "itemStyle": { "color": palette_color(i) },
            })).collect::<Vec<_>>(),
        }],
    });
    synthesized(ChartKind::Pie, index, entry.title, option)
}

fn radar_chart(entry: EvaluationEntry, index: usize) -> ChartSpec {
    let option = json!({
        "title": title_block(&entry.title),
        "tooltip": { "trigger": "item" },
        "legend": {
            "data": entry.data.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            "bottom": 20,
        },
        "radar": { "indicator": entry.indicators },
        "series": [{
            "type": "radar",
            "data": entry.data.iter().enumerate().map(|(i, score)| {
                let color = palette_color(i);
                json!({
                    "name": score.name,
                    "value": score.value,
                    "lineStyle": { "color": color, "width": 2 },
                    "areaStyle": { "color": format!("{color}30") },
                })
            }).collect::<Vec<_>>(),
        }],
    });
    synthesized(ChartKind::Radar, index, entry.title, option)
}
