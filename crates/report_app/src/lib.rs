//! Report app: configuration, effect execution and the end-to-end session.
pub mod config;
pub mod effects;
pub mod session;

pub use config::{AppConfig, ConfigError};
pub use session::{ReportSession, RunOutcome};
