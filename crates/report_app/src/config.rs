use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine_logging::engine_info;
use log::LevelFilter;
use report_core::{NodeGraph, WorkflowNode};
use report_engine::UpstreamSettings;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "report.ron";
pub const API_KEY_ENV: &str = "REPORT_API_KEY";
pub const ENDPOINT_ENV: &str = "REPORT_ENDPOINT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub log_level: String,
    /// Node weights of the upstream workflow; must match its definition.
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub user_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub title: String,
    pub weight: f64,
    pub phase: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        let settings = UpstreamSettings::default();
        Self {
            endpoint: settings.endpoint,
            api_key: settings.api_key,
            connect_timeout_secs: settings.connect_timeout.as_secs(),
            idle_timeout_secs: settings.idle_timeout.as_secs(),
            user_prefix: settings.user_prefix,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            log_level: "info".to_string(),
            nodes: default_nodes(),
        }
    }
}

fn node(id: &str, title: &str, weight: f64, phase: u32) -> NodeConfig {
    NodeConfig {
        id: id.to_string(),
        title: title.to_string(),
        weight,
        phase,
    }
}

fn default_nodes() -> Vec<NodeConfig> {
    let mut nodes = vec![node("2001", "Start", 0.1, 0)];
    nodes.extend((1..=5).map(|n| node(&format!("2002{n}"), &format!("Search fetch {n}"), 1.0, 1)));
    nodes.extend([
        node("2002", "Search aggregation", 3.0, 1),
        node("2003", "Deep analysis", 6.0, 2),
        node("2004", "Report writing", 10.0, 3),
        node("2005", "Format conversion", 8.0, 4),
        node("2009", "Output", 0.1, 5),
    ]);
    nodes
}

impl AppConfig {
    /// Reads `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                engine_info!("No config at {:?}; using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: AppConfig = ron::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        engine_info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// [`load`](Self::load) followed by the process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies `REPORT_API_KEY` and `REPORT_ENDPOINT`. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(key) = lookup(API_KEY_ENV) {
            self.upstream.api_key = Some(key);
        }
        if let Some(endpoint) = lookup(ENDPOINT_ENV) {
            self.upstream.endpoint = endpoint;
        }
    }

    pub fn upstream_settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            endpoint: self.upstream.endpoint.clone(),
            api_key: self.upstream.api_key.clone(),
            connect_timeout: Duration::from_secs(self.upstream.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.upstream.idle_timeout_secs),
            user_prefix: self.upstream.user_prefix.clone(),
        }
    }

    pub fn node_graph(&self) -> NodeGraph {
        NodeGraph::new(
            self.nodes
                .iter()
                .map(|n| WorkflowNode::new(n.id.clone(), n.title.clone(), n.weight, n.phase)),
        )
    }

    pub fn log_level(&self) -> LevelFilter {
        engine_logging::parse_level(&self.log_level)
    }
}
