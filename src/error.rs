use std::path::PathBuf;

use thiserror::Error;

/// Errors callers are expected to branch on. Everything else travels as `anyhow::Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is out of range or inconsistent.
    #[error("configuration error: {field} - {message}")]
    Config { field: String, message: String },

    /// The configuration file is not valid TOML for `Config`.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid target {name}: {reason}")]
    InvalidTarget { name: String, reason: String },

    /// The attack toolkit cannot be used. Raised before any hybrid phase runs.
    #[error("attack toolkit unavailable: {0}")]
    ToolkitUnavailable(String),

    #[error("I/O error: {operation} failed for {path} - {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
