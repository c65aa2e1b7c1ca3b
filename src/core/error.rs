//! Errors surfaced by the telemetry engine.
//!
//! All of them are local and recoverable; the HTTP layer maps each one to a
//! 4xx response.

use crate::core::types::SourceId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid source '{0}' (expected 'manual' or 'device')")]
    InvalidSource(String),

    #[error("No data in the {0} buffer")]
    NoData(SourceId),

    #[error("Malformed input for '{field}': {reason}")]
    MalformedInput { field: String, reason: String },
}

impl EngineError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidSource(_) => "INVALID_SOURCE",
            EngineError::NoData(_) => "NO_DATA",
            EngineError::MalformedInput { .. } => "MALFORMED_INPUT",
        }
    }
}
