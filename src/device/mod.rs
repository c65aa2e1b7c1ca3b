//! Simulated device feed.
//!
//! Emulates the wearable that pushes readings to `/api/sensor-data`:
//! - [`conditioning`] turns raw optical counts into normalized channels
//! - [`client`] pushes them to the server on a fixed interval
//!
//! # Feature Flag
//!
//! The HTTP client is only available when the `device` feature is enabled.

pub mod conditioning;

#[cfg(feature = "device")]
pub mod client;

pub use conditioning::{
    normalize, ConditionedSample, RawSample, SignalConditioner, SyntheticOptics,
};

#[cfg(feature = "device")]
pub use client::{
    default_device_id, DeviceClient, DeviceError, DeviceFeed, DevicePayload, FeedReport,
    PushResponse,
};
