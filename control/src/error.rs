use std::path::PathBuf;
use thiserror::Error;

/// Route Exporter Errors
///
/// Only the configuration variants are fatal. Everything else is absorbed by
/// the pipeline and surfaced through logs and error callbacks.
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid namespace exclusion pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Unable to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unable to connect to {source_name}: {message}")]
    Connection {
        source_name: String,
        message: String,
    },

    #[error("Malformed route event: {0}")]
    MalformedEvent(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExporterError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Connection {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors abort startup; all others are reported and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExporterError::Config(_) | ExporterError::InvalidPattern(_) | ExporterError::Yaml(_)
        )
    }
}
