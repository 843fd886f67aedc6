//! # Process-wide `tracing` subscriber setup (feature `logging`).
//!
//! ```rust,no_run
//! use taskwarden::{LoggerConfig, LoggerFormat, logger_init};
//!
//! let cfg = LoggerConfig {
//!     format: LoggerFormat::Json,
//!     level: "info,taskwarden=debug".into(),
//!     ..LoggerConfig::default()
//! };
//! logger_init(&cfg).expect("logger");
//! ```

mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Installs the global `tracing` subscriber described by `cfg`.
///
/// Fails with [`LoggerError::AlreadyInitialized`] when one is already installed.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    match cfg.format {
        LoggerFormat::Text => log::Logger::text(cfg),
        LoggerFormat::Json => log::Logger::json(cfg),
    }
}
