//! Lock-free activity counters.

use crate::core::types::SourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running totals for the current process.
#[derive(Debug)]
pub struct ActivityLog {
    /// Points generated for the manual source
    manual_points: AtomicU64,
    /// Points generated for the device source
    device_points: AtomicU64,
    /// Manual sensor updates accepted
    manual_updates: AtomicU64,
    /// Device pushes accepted
    device_pushes: AtomicU64,
    /// Active-source switches
    source_switches: AtomicU64,
    /// Buffers cleared
    buffers_cleared: AtomicU64,
    /// CSV exports served
    csv_exports: AtomicU64,
    /// Requests rejected with an engine error
    rejected_requests: AtomicU64,
    /// Engine start time
    started_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            manual_points: AtomicU64::new(0),
            device_points: AtomicU64::new(0),
            manual_updates: AtomicU64::new(0),
            device_pushes: AtomicU64::new(0),
            source_switches: AtomicU64::new(0),
            buffers_cleared: AtomicU64::new(0),
            csv_exports: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            started_at,
        }
    }

    /// Record a generated point.
    pub fn record_point(&self, source: SourceId) {
        let counter = match source {
            SourceId::Manual => &self.manual_points,
            SourceId::Device => &self.device_points,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted ingestion.
    pub fn record_ingest(&self, source: SourceId) {
        let counter = match source {
            SourceId::Manual => &self.manual_updates,
            SourceId::Device => &self.device_pushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_switch(&self) {
        self.source_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_clear(&self) {
        self.buffers_cleared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self) {
        self.csv_exports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics as of `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> ActivityStats {
        ActivityStats {
            manual_points: self.manual_points.load(Ordering::Relaxed),
            device_points: self.device_points.load(Ordering::Relaxed),
            manual_updates: self.manual_updates.load(Ordering::Relaxed),
            device_pushes: self.device_pushes.load(Ordering::Relaxed),
            source_switches: self.source_switches.load(Ordering::Relaxed),
            buffers_cleared: self.buffers_cleared.load(Ordering::Relaxed),
            csv_exports: self.csv_exports.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self, now: DateTime<Utc>) -> String {
        let stats = self.stats(now);
        format!(
            "Engine Activity:\n\
             - Points generated (manual): {}\n\
             - Points generated (device): {}\n\
             - Manual updates: {}\n\
             - Device pushes: {}\n\
             - Source switches: {}\n\
             - Buffers cleared: {}\n\
             - CSV exports: {}\n\
             - Rejected requests: {}\n\
             - Uptime: {} seconds",
            stats.manual_points,
            stats.device_points,
            stats.manual_updates,
            stats.device_pushes,
            stats.source_switches,
            stats.buffers_cleared,
            stats.csv_exports,
            stats.rejected_requests,
            stats.uptime_secs
        )
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Snapshot of activity counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub manual_points: u64,
    pub device_points: u64,
    pub manual_updates: u64,
    pub device_pushes: u64,
    pub source_switches: u64,
    pub buffers_cleared: u64,
    pub csv_exports: u64,
    pub rejected_requests: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

/// Create a new shared activity log starting at `started_at`.
pub fn create_shared_log(started_at: DateTime<Utc>) -> SharedActivityLog {
    Arc::new(ActivityLog::new(started_at))
}
