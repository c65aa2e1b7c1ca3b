//! Activity accounting for the telemetry engine.
//!
//! Counts what the engine has done since start-up so the diagnostics
//! endpoint can report it. Nothing here is persisted.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_log, ActivityLog, ActivityStats, SharedActivityLog};
