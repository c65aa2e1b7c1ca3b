//! Per-source buffer state.
//!
//! Each source owns one [`BufferState`] behind its own mutex. The two sources
//! never need to be locked together, so no cross-source ordering exists.

use crate::core::history::HistoryBuffer;
use crate::core::types::{GlucosePoint, SensorReading, SourceId};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Everything the engine tracks for one source.
#[derive(Debug, Clone, Default)]
pub struct BufferState {
    /// Live sensor inputs, overwritten by ingestion
    pub reading: SensorReading,
    /// Generated points, oldest first
    pub history: HistoryBuffer,
    /// When the last point was generated (absent = never)
    pub last_generated_at: Option<DateTime<Utc>>,
    /// When a device last pushed readings (device source only)
    pub last_ingested_at: Option<DateTime<Utc>>,
    /// Identifier from the most recent device push
    pub last_device_id: Option<String>,
}

impl BufferState {
    pub fn append(&mut self, point: GlucosePoint) {
        self.history.push(point);
    }

    /// Most recent stored glucose value.
    pub fn last_glucose(&self) -> Option<f64> {
        self.history.last().map(|p| p.glucose)
    }

    /// Empty the history and return readings and timers to their defaults.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Process-wide storage for both sources.
#[derive(Debug, Default)]
pub struct BufferStore {
    manual: Mutex<BufferState>,
    device: Mutex<BufferState>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock one source's state for a compound operation.
    ///
    /// Every mutation through the guard completes before the lock is released,
    /// so a poisoned lock still holds consistent state and is recovered.
    pub fn lock(&self, source: SourceId) -> MutexGuard<'_, BufferState> {
        let slot = match source {
            SourceId::Manual => &self.manual,
            SourceId::Device => &self.device,
        };
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reading(&self, source: SourceId) -> SensorReading {
        self.lock(source).reading
    }

    /// Copy of the history, oldest first.
    pub fn history(&self, source: SourceId) -> Vec<GlucosePoint> {
        self.lock(source).history.to_vec()
    }

    pub fn len(&self, source: SourceId) -> usize {
        self.lock(source).history.len()
    }

    pub fn last_generated_at(&self, source: SourceId) -> Option<DateTime<Utc>> {
        self.lock(source).last_generated_at
    }

    pub fn last_ingested_at(&self, source: SourceId) -> Option<DateTime<Utc>> {
        self.lock(source).last_ingested_at
    }

    pub fn append(&self, source: SourceId, point: GlucosePoint) {
        self.lock(source).append(point);
    }

    /// Overwrite all four channels.
    pub fn replace_reading(&self, source: SourceId, reading: SensorReading) {
        self.lock(source).reading = reading;
    }

    pub fn clear(&self, source: SourceId) {
        self.lock(source).clear();
    }

    /// Cloned view of one source's full state.
    pub fn snapshot(&self, source: SourceId) -> BufferState {
        self.lock(source).clone()
    }
}
