//! Core functionality for the telemetry engine.
//!
//! This module contains:
//! - The signal model that turns sensor channels into a glucose value
//! - Per-source buffers with fixed-capacity history
//! - Point generation with a one-second throttle
//! - Axis-range estimation and CSV/JSON rendering

pub mod clock;
pub mod engine;
pub mod error;
pub mod generator;
pub mod history;
pub mod range;
pub mod report;
pub mod signal;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use engine::{
    CurrentData, Diagnostics, Engine, EngineSettings, IngestOutcome, SourceCounts,
    SourceDiagnostics, DEVICE_TIMEOUT_SECS,
};
pub use error::EngineError;
pub use history::{HistoryBuffer, RingBuffer, HISTORY_CAPACITY};
pub use range::{estimate_range, AxisRange, DEFAULT_RANGE};
pub use report::{CsvExport, PointRow};
pub use signal::{compute_reading, SignalParams, GLUCOSE_MAX, GLUCOSE_MIN};
pub use store::{BufferState, BufferStore};
pub use types::{GlucosePoint, ReadingUpdate, SensorReading, SourceId};
