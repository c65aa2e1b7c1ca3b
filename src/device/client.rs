//! HTTP client that pushes conditioned readings to the telemetry server.

use crate::config::DeviceConfig;
use crate::device::conditioning::{ConditionedSample, SignalConditioner, SyntheticOptics};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Raw samples folded into the moving average between two pushes.
const SAMPLE_PERIOD: Duration = Duration::from_millis(100);

/// Device client error types.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device network error: {0}")]
    Network(String),
    #[error("Device server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Device serialization error: {0}")]
    Serialization(String),
}

/// Body of a device push.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevicePayload {
    pub red_signal: f64,
    pub ir_signal: f64,
    pub temperature: f64,
    pub motion: f64,
    pub device_id: String,
    pub raw_red: f64,
    pub raw_ir: f64,
    /// Seconds since the feed started
    pub timestamp: u64,
}

impl DevicePayload {
    pub fn new(sample: &ConditionedSample, device_id: &str, uptime: Duration) -> Self {
        Self {
            red_signal: sample.reading.red_signal,
            ir_signal: sample.reading.ir_signal,
            temperature: sample.reading.temperature,
            motion: sample.reading.motion,
            device_id: device_id.to_string(),
            raw_red: sample.raw_red.round(),
            raw_ir: sample.raw_ir.round(),
            timestamp: uptime.as_secs(),
        }
    }
}

/// Server acknowledgement of a push.
#[derive(Debug, Clone, Deserialize)]
pub struct PushResponse {
    pub status: String,
    #[serde(default)]
    pub buffer_size: Option<usize>,
    #[serde(default)]
    pub point_added: Option<bool>,
}

/// Generate a device ID from hostname + a random suffix.
pub fn default_device_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("sim-{}-{}", hostname, &uuid::Uuid::new_v4().to_string()[..8])
}

/// Client for the telemetry server's device endpoint.
pub struct DeviceClient {
    base_url: String,
    client: reqwest::Client,
    device_id: String,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeviceError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            client,
            device_id: config.device_id.clone().unwrap_or_else(default_device_id),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn push_url(&self) -> String {
        format!("{}/api/sensor-data", self.base_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    /// Test connection to the server.
    pub async fn test_connection(&self) -> Result<bool, DeviceError> {
        let response = self
            .client
            .get(self.health_url())
            .send()
            .await
            .map_err(|e| DeviceError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Push one payload.
    pub async fn push(&self, payload: &DevicePayload) -> Result<PushResponse, DeviceError> {
        let response = self
            .client
            .post(self.push_url())
            .json(payload)
            .send()
            .await
            .map_err(|e| DeviceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeviceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| DeviceError::Serialization(e.to_string()))
    }
}

/// Summary of a finished feed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub pushed: u64,
    pub failed: u64,
}

/// Sampling loop that emulates the wearable: sample every 100 ms, push on
/// every interval.
pub struct DeviceFeed {
    client: DeviceClient,
    optics: SyntheticOptics,
    conditioner: SignalConditioner,
    push_interval: Duration,
}

impl DeviceFeed {
    pub fn new(client: DeviceClient, optics: SyntheticOptics, push_interval: Duration) -> Self {
        Self {
            client,
            optics,
            conditioner: SignalConditioner::new(),
            push_interval: push_interval.max(SAMPLE_PERIOD),
        }
    }

    fn samples_per_push(&self) -> u32 {
        (self.push_interval.as_millis() / SAMPLE_PERIOD.as_millis()).max(1) as u32
    }

    /// Run until `limit` pushes have been attempted or `shutdown` resolves.
    pub async fn run<F>(mut self, limit: Option<u64>, shutdown: F) -> FeedReport
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut report = FeedReport::default();
        let mut ticker = tokio::time::interval(self.push_interval);
        tokio::pin!(shutdown);

        loop {
            if limit.is_some_and(|limit| report.pushed + report.failed >= limit) {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Device feed shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {}
            }

            for _ in 0..self.samples_per_push() {
                self.conditioner.push(self.optics.next_sample());
            }

            let sample = self.conditioner.sample();
            let payload = DevicePayload::new(&sample, self.client.device_id(), started.elapsed());

            match self.client.push(&payload).await {
                Ok(response) => {
                    report.pushed += 1;
                    tracing::info!(
                        red = payload.red_signal,
                        ir = payload.ir_signal,
                        temperature = payload.temperature,
                        motion = payload.motion,
                        buffer_size = ?response.buffer_size,
                        "Device push accepted"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Device push failed: {}", e);
                }
            }
        }

        report
    }
}
