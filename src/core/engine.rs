//! The telemetry engine: source selection, ingestion, generation and reads.
//!
//! One [`Engine`] is constructed at start-up and shared (behind an `Arc`) by
//! every request handler. Both sources run through the same code path; the
//! only asymmetry is that device pushes stamp a last-seen time used for
//! connectivity.

use crate::activity::{create_shared_log, ActivityStats, SharedActivityLog};
use crate::core::clock::{SharedClock, SystemClock};
use crate::core::error::EngineError;
use crate::core::generator;
use crate::core::range::{estimate_range, AxisRange};
use crate::core::report::{self, CsvExport};
use crate::core::signal::SignalParams;
use crate::core::store::{BufferState, BufferStore};
use crate::core::types::{GlucosePoint, ReadingUpdate, SensorReading, SourceId};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

/// A device is considered connected while its last push is younger than this.
pub const DEVICE_TIMEOUT_SECS: i64 = 10;

/// Construction options for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub params: SignalParams,
    /// Timezone used to render clock times
    pub timezone: Tz,
    /// Fixed RNG seed; random when absent
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            params: SignalParams::default(),
            timezone: Tz::UTC,
            seed: None,
        }
    }
}

/// Result of an ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub source: SourceId,
    /// History length after the call
    pub buffer_size: usize,
    pub point_added: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<GlucosePoint>,
    pub device_connected: bool,
}

/// Everything the dashboard needs for one refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentData {
    pub source: SourceId,
    pub reading: SensorReading,
    pub device_connected: bool,
    pub history: Vec<GlucosePoint>,
    pub y_range: AxisRange,
    /// Point produced by this refresh, if the throttle allowed one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated: Option<GlucosePoint>,
    pub timestamp: DateTime<Utc>,
}

/// History length per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub manual: usize,
    pub device: usize,
}

/// Diagnostic view of one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDiagnostics {
    pub source: SourceId,
    pub reading: SensorReading,
    pub history_len: usize,
    pub last_glucose: Option<f64>,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub last_device_id: Option<String>,
    pub connected: bool,
}

/// Read-only dump of the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub instance_id: Uuid,
    pub version: &'static str,
    pub active_source: SourceId,
    pub timezone: String,
    pub now: DateTime<Utc>,
    pub sources: Vec<SourceDiagnostics>,
    pub activity: ActivityStats,
}

pub struct Engine {
    store: BufferStore,
    active: RwLock<SourceId>,
    params: SignalParams,
    timezone: Tz,
    clock: SharedClock,
    rng: Mutex<StdRng>,
    activity: SharedActivityLog,
    instance_id: Uuid,
}

impl Engine {
    /// Create an engine on the system clock.
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create an engine driven by the given clock.
    pub fn with_clock(settings: EngineSettings, clock: SharedClock) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            store: BufferStore::new(),
            active: RwLock::new(SourceId::default()),
            params: settings.params,
            timezone: settings.timezone,
            activity: create_shared_log(clock.now()),
            clock,
            rng: Mutex::new(rng),
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn store(&self) -> &BufferStore {
        &self.store
    }

    pub fn activity(&self) -> &SharedActivityLog {
        &self.activity
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn active_source(&self) -> SourceId {
        *self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch the active source by its wire name.
    pub fn set_active_source(&self, id: &str) -> Result<SourceId, EngineError> {
        let source: SourceId = id.parse()?;
        self.select_source(source);
        Ok(source)
    }

    pub fn select_source(&self, source: SourceId) {
        let previous = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, source)
        };
        self.activity.record_source_switch();
        tracing::info!(from = %previous, to = %source, "Active source switched");
    }

    /// Generate a point for `source` if at least one second has passed.
    pub fn maybe_generate(&self, source: SourceId) -> Option<GlucosePoint> {
        let now = self.clock.now();
        let mut state = self.store.lock(source);
        self.generate_locked(source, &mut state, now)
    }

    /// Apply a manual update. Generates immediately when manual is active.
    pub fn ingest_manual(&self, update: &ReadingUpdate) -> IngestOutcome {
        self.ingest(SourceId::Manual, update)
    }

    /// Apply a device push. Generates immediately when the device is active.
    pub fn ingest_device(&self, update: &ReadingUpdate) -> IngestOutcome {
        self.ingest(SourceId::Device, update)
    }

    fn ingest(&self, source: SourceId, update: &ReadingUpdate) -> IngestOutcome {
        let now = self.clock.now();

        let mut state = self.store.lock(source);
        state.reading.apply(update);

        if source == SourceId::Device {
            state.last_ingested_at = Some(now);
            if let Some(device_id) = &update.device_id {
                state.last_device_id = Some(device_id.clone());
            }
        }

        generator::mark_stale(&mut state, now);
        // Active source is checked with the buffer lock held.
        let point = if source == self.active_source() {
            self.generate_locked(source, &mut state, now)
        } else {
            None
        };

        self.activity.record_ingest(source);
        tracing::debug!(
            %source,
            red = state.reading.red_signal,
            ir = state.reading.ir_signal,
            temperature = state.reading.temperature,
            motion = state.reading.motion,
            "Readings updated"
        );

        IngestOutcome {
            source,
            buffer_size: state.history.len(),
            point_added: point.is_some(),
            point,
            device_connected: source == SourceId::Device,
        }
    }

    /// Whether the active source counts as connected right now.
    pub fn connectivity(&self) -> bool {
        self.connectivity_at(self.clock.now())
    }

    /// Whether the active source counts as connected at `now`.
    ///
    /// Only the device source can be connected.
    pub fn connectivity_at(&self, now: DateTime<Utc>) -> bool {
        match self.active_source() {
            SourceId::Manual => false,
            SourceId::Device => device_fresh(&self.store.lock(SourceId::Device), now),
        }
    }

    /// Empty a buffer and reset its readings and timers.
    pub fn clear(&self, source: SourceId) {
        self.store.clear(source);
        self.activity.record_clear();
        tracing::info!(%source, "Buffer cleared");
    }

    /// Clear a buffer by wire name, or the active one when no name is given.
    pub fn clear_named(&self, name: Option<&str>) -> Result<SourceId, EngineError> {
        let source = match name {
            Some(name) => name.parse()?,
            None => self.active_source(),
        };
        self.clear(source);
        Ok(source)
    }

    /// Refresh the active source and return what the dashboard shows.
    pub fn current_data(&self) -> CurrentData {
        let now = self.clock.now();
        let source = self.active_source();

        let (generated, state) = {
            let mut state = self.store.lock(source);
            let generated = self.generate_locked(source, &mut state, now);
            (generated, state.clone())
        };

        let history = state.history.to_vec();
        CurrentData {
            source,
            reading: state.reading,
            device_connected: source == SourceId::Device && device_fresh(&state, now),
            y_range: estimate_range(&history),
            history,
            generated,
            timestamp: now,
        }
    }

    pub fn counts(&self) -> SourceCounts {
        SourceCounts {
            manual: self.store.len(SourceId::Manual),
            device: self.store.len(SourceId::Device),
        }
    }

    /// Render the active source's history as CSV.
    pub fn export_csv(&self) -> Result<CsvExport, EngineError> {
        let source = self.active_source();
        let history = self.store.history(source);
        let export = report::to_csv(source, &history, self.timezone)?;
        self.activity.record_export();
        Ok(export)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let now = self.clock.now();
        let sources = SourceId::ALL
            .into_iter()
            .map(|source| {
                let state = self.store.snapshot(source);
                SourceDiagnostics {
                    source,
                    reading: state.reading,
                    history_len: state.history.len(),
                    last_glucose: state.last_glucose(),
                    last_generated_at: state.last_generated_at,
                    last_ingested_at: state.last_ingested_at,
                    connected: source == SourceId::Device && device_fresh(&state, now),
                    last_device_id: state.last_device_id,
                }
            })
            .collect();

        Diagnostics {
            instance_id: self.instance_id,
            version: crate::VERSION,
            active_source: self.active_source(),
            timezone: self.timezone.name().to_string(),
            now,
            sources,
            activity: self.activity.stats(now),
        }
    }

    fn generate_locked(
        &self,
        source: SourceId,
        state: &mut BufferState,
        now: DateTime<Utc>,
    ) -> Option<GlucosePoint> {
        let point = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            generator::maybe_generate(state, now, &self.params, &mut *rng)
        };

        match point {
            Some(point) => {
                self.activity.record_point(source);
                tracing::info!(%source, glucose = point.glucose, "Generated point ({:.1} mg/dL)", point.glucose);
            }
            None => tracing::debug!(%source, "Generation throttled"),
        }
        point
    }
}

fn device_fresh(state: &BufferState, now: DateTime<Utc>) -> bool {
    state
        .last_ingested_at
        .is_some_and(|seen| now - seen < Duration::seconds(DEVICE_TIMEOUT_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use chrono::TimeZone;

    fn engine() -> (Engine, Arc<ManualClock>) {
        let clock = ManualClock::shared(Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap());
        let settings = EngineSettings {
            seed: Some(17),
            ..EngineSettings::default()
        };
        (Engine::with_clock(settings, clock.clone()), clock)
    }

    fn device_update() -> ReadingUpdate {
        ReadingUpdate::full(SensorReading {
            red_signal: 0.5,
            ir_signal: 0.6,
            temperature: 37.0,
            motion: 0.1,
        })
    }

    #[test]
    fn test_defaults_to_manual() {
        let (engine, _) = engine();
        assert_eq!(engine.active_source(), SourceId::Manual);
        assert!(!engine.connectivity());
    }

    #[test]
    fn test_set_active_source_validates() {
        let (engine, _) = engine();
        assert_eq!(engine.set_active_source("esp32"), Ok(SourceId::Device));
        assert_eq!(engine.active_source(), SourceId::Device);

        let err = engine.set_active_source("serial").unwrap_err();
        assert_eq!(err.code(), "INVALID_SOURCE");
        assert_eq!(engine.active_source(), SourceId::Device);
    }

    #[test]
    fn test_maybe_generate_twice_within_a_second() {
        let (engine, clock) = engine();
        assert!(engine.maybe_generate(SourceId::Manual).is_some());
        clock.advance_millis(400);
        assert!(engine.maybe_generate(SourceId::Manual).is_none());
        assert_eq!(engine.counts().manual, 1);
    }

    #[test]
    fn test_ingest_into_inactive_source_does_not_generate() {
        let (engine, _) = engine();
        let outcome = engine.ingest_device(&device_update());

        assert!(!outcome.point_added);
        assert_eq!(outcome.buffer_size, 0);
        assert_eq!(engine.store().reading(SourceId::Device).motion, 0.1);
        // timer is stale, so the first refresh after switching generates
        engine.select_source(SourceId::Device);
        assert!(engine.current_data().generated.is_some());
    }

    #[test]
    fn test_ingest_into_active_source_bypasses_throttle() {
        let (engine, clock) = engine();
        assert!(engine.maybe_generate(SourceId::Manual).is_some());

        clock.advance_millis(200);
        let update = ReadingUpdate {
            motion: Some(0.0),
            ..ReadingUpdate::default()
        };
        let outcome = engine.ingest_manual(&update);

        assert!(outcome.point_added);
        assert_eq!(outcome.buffer_size, 2);
        assert!(!outcome.device_connected);
        assert_eq!(outcome.point.map(|p| p.motion), Some(0.0));
    }

    #[test]
    fn test_ingest_after_switching_away_only_marks_stale() {
        let (engine, clock) = engine();
        engine.select_source(SourceId::Device);
        assert!(engine.ingest_device(&device_update()).point_added);

        engine.select_source(SourceId::Manual);
        clock.advance_millis(200);
        let outcome = engine.ingest_device(&device_update());

        assert!(!outcome.point_added);
        assert_eq!(outcome.buffer_size, 1);
        assert!(generator::is_due(&engine.store().snapshot(SourceId::Device), engine.now()));
    }

    #[test]
    fn test_device_connectivity_expires() {
        let (engine, clock) = engine();
        engine.select_source(SourceId::Device);
        engine.ingest_device(&device_update());
        assert!(engine.connectivity());

        clock.advance_millis(9_999);
        assert!(engine.connectivity());
        clock.advance_millis(1);
        assert!(!engine.connectivity());
    }

    #[test]
    fn test_manual_is_never_connected() {
        let (engine, _) = engine();
        engine.ingest_device(&device_update());
        assert!(!engine.connectivity());
        assert!(!engine.current_data().device_connected);
    }

    #[test]
    fn test_current_data_reports_range_and_history() {
        let (engine, clock) = engine();
        for _ in 0..5 {
            engine.current_data();
            clock.advance_millis(1_000);
        }

        let data = engine.current_data();
        assert_eq!(data.history.len(), 6);
        assert_eq!(data.source, SourceId::Manual);
        assert!(data.y_range.span() >= 20.0);
        assert_eq!(data.y_range, estimate_range(&data.history));
    }

    #[test]
    fn test_clear_named_defaults_to_active() {
        let (engine, _) = engine();
        engine.maybe_generate(SourceId::Manual);
        engine.maybe_generate(SourceId::Device);

        assert_eq!(engine.clear_named(None), Ok(SourceId::Manual));
        assert_eq!(engine.counts(), SourceCounts { manual: 0, device: 1 });
        assert!(engine.clear_named(Some("nope")).is_err());
    }

    #[test]
    fn test_export_requires_data() {
        let (engine, _) = engine();
        assert_eq!(engine.export_csv().unwrap_err(), EngineError::NoData(SourceId::Manual));

        engine.maybe_generate(SourceId::Manual);
        let export = engine.export_csv().unwrap();
        assert_eq!(export.rows, 1);
        assert_eq!(engine.activity().stats(engine.now()).csv_exports, 1);
    }

    #[test]
    fn test_diagnostics_cover_both_sources() {
        let (engine, _) = engine();
        let update = ReadingUpdate {
            device_id: Some("esp32_max30102".to_string()),
            ..device_update()
        };
        engine.ingest_device(&update);

        let diag = engine.diagnostics();
        assert_eq!(diag.sources.len(), 2);
        let device = &diag.sources[1];
        assert_eq!(device.source, SourceId::Device);
        assert_eq!(device.last_device_id.as_deref(), Some("esp32_max30102"));
        assert!(device.connected);
        assert!(!diag.sources[0].connected);
        assert_eq!(diag.activity.device_pushes, 1);
    }
}
