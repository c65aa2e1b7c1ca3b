//! Glucose Telemetry - pseudo-glucose telemetry buffer engine.
//!
//! This library turns a small set of optical and environmental sensor
//! channels into a synthetic glucose trend, kept in fixed-size per-source
//! histories and served to a live dashboard.
//!
//! # Sources
//!
//! - **manual**: channels set by hand from the dashboard
//! - **device**: channels pushed by a wearable (or the bundled simulator)
//!
//! Both sources keep independent buffers. Only the active source
//! generates points on refresh, at most one per second.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Glucose Telemetry                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Device    │──▶│   Server    │──▶│   Engine    │       │
//! │  │  (pushes)   │   │   (axum)    │   │ (buffers)   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                              │              │
//! │                           ┌──────────────────┼──────┐       │
//! │                           ▼                  ▼      ▼       │
//! │                    ┌─────────────┐   ┌──────────┐ ┌─────┐  │
//! │                    │  Activity   │   │  Range   │ │ CSV │  │
//! │                    │    Log      │   │ Estimate │ │     │  │
//! │                    └─────────────┘   └──────────┘ └─────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use glucose_telemetry::core::{Engine, EngineSettings, ReadingUpdate, SourceId};
//!
//! let engine = Engine::new(EngineSettings::default());
//! engine.set_active_source("device").unwrap();
//!
//! let update = ReadingUpdate {
//!     temperature: Some(37.2),
//!     ..ReadingUpdate::default()
//! };
//! let outcome = engine.ingest_device(&update);
//! assert_eq!(outcome.source, SourceId::Device);
//! assert!(outcome.point_added);
//! ```

pub mod activity;
pub mod config;
pub mod core;
pub mod device;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use activity::{ActivityLog, ActivityStats, SharedActivityLog};
pub use config::{Config, ConfigError, DeviceConfig};
pub use core::{
    AxisRange, CurrentData, Engine, EngineError, EngineSettings, GlucosePoint, IngestOutcome,
    ReadingUpdate, SensorReading, SourceId,
};

// Device client re-exports (when enabled)
#[cfg(feature = "device")]
pub use device::{DeviceClient, DeviceError, DeviceFeed};

// Server re-exports (when enabled)
#[cfg(feature = "server")]
pub use server::ServerConfig;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
