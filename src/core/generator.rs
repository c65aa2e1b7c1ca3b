//! Decides when a buffer gets a new point and produces it.

use crate::core::signal::{compute_reading, round_tenth, SignalParams};
use crate::core::store::BufferState;
use crate::core::types::GlucosePoint;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::Rng;

/// Minimum time between two generated points of the same source.
pub const GENERATION_INTERVAL_MS: i64 = 1000;

/// How far in the past ingestion seeds the timer to force a new point.
pub const STALE_OFFSET_SECS: i64 = 2;

/// Whether enough time has passed since the last point.
pub fn is_due(state: &BufferState, now: DateTime<Utc>) -> bool {
    match state.last_generated_at {
        Some(last) => now - last >= Duration::milliseconds(GENERATION_INTERVAL_MS),
        None => true,
    }
}

/// Push the state's timer into the past so the next check is due.
pub fn mark_stale(state: &mut BufferState, now: DateTime<Utc>) {
    state.last_generated_at = Some(now - Duration::seconds(STALE_OFFSET_SECS));
}

/// Generate and append a point if the throttle allows it.
///
/// Must be called with the source's lock held so the due-check and the
/// append happen atomically.
pub fn maybe_generate<R: Rng + ?Sized>(
    state: &mut BufferState,
    now: DateTime<Utc>,
    params: &SignalParams,
    rng: &mut R,
) -> Option<GlucosePoint> {
    if !is_due(state, now) {
        return None;
    }

    let reading = state.reading;
    let glucose = compute_reading(&reading, now, state.last_glucose(), params, rng);

    let point = GlucosePoint {
        time: now.trunc_subsecs(0),
        glucose: round_tenth(glucose),
        red: reading.red_signal,
        ir: reading.ir_signal,
        temperature: reading.temperature,
        motion: reading.motion,
    };

    state.append(point);
    state.last_generated_at = Some(now);
    Some(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::HISTORY_CAPACITY;
    use crate::core::types::SensorReading;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_first_call_generates_immediately() {
        let mut state = BufferState::default();
        let mut rng = StdRng::seed_from_u64(3);

        let point = maybe_generate(&mut state, start(), &SignalParams::default(), &mut rng);
        assert!(point.is_some());
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.last_generated_at, Some(start()));
    }

    #[test]
    fn test_throttles_within_one_second() {
        let mut state = BufferState::default();
        let mut rng = StdRng::seed_from_u64(3);
        let params = SignalParams::default();

        assert!(maybe_generate(&mut state, start(), &params, &mut rng).is_some());
        let soon = start() + Duration::milliseconds(999);
        assert!(maybe_generate(&mut state, soon, &params, &mut rng).is_none());
        assert_eq!(state.history.len(), 1);

        let later = start() + Duration::milliseconds(1000);
        assert!(maybe_generate(&mut state, later, &params, &mut rng).is_some());
        assert_eq!(state.history.len(), 2);
    }

    #[test]
    fn test_stale_timer_bypasses_throttle() {
        let mut state = BufferState::default();
        let mut rng = StdRng::seed_from_u64(3);
        let params = SignalParams::default();

        maybe_generate(&mut state, start(), &params, &mut rng);
        let soon = start() + Duration::milliseconds(100);
        mark_stale(&mut state, soon);
        assert!(maybe_generate(&mut state, soon, &params, &mut rng).is_some());
    }

    #[test]
    fn test_point_snapshots_reading_at_generation() {
        let mut state = BufferState::default();
        let mut rng = StdRng::seed_from_u64(3);
        state.reading = SensorReading {
            red_signal: 0.5,
            ir_signal: 0.6,
            temperature: 37.0,
            motion: 0.1,
        };

        let now = start() + Duration::milliseconds(750);
        let point = maybe_generate(&mut state, now, &SignalParams::default(), &mut rng).unwrap();
        state.reading.motion = 0.8;

        assert_eq!(point.reading().motion, 0.1);
        assert_eq!(state.history.last().map(|p| p.motion), Some(0.1));
        assert_eq!(point.time, start());
    }

    #[test]
    fn test_smooths_against_previous_point() {
        let mut state = BufferState::default();
        let mut rng = StdRng::seed_from_u64(3);
        let params = SignalParams::noiseless();

        // second 0 and second 30 both have a zero circadian term
        let first = maybe_generate(&mut state, start(), &params, &mut rng).unwrap();
        assert_eq!(first.glucose, 51.0);

        state.reading.motion = 0.0;
        let second = maybe_generate(&mut state, start() + Duration::seconds(30), &params, &mut rng)
            .unwrap();
        // raw 63, 0.9 * 51 + 0.1 * 63 = 52.2
        assert_eq!(second.glucose, 52.2);
    }

    #[test]
    fn test_long_run_keeps_cap_and_range() {
        let mut state = BufferState::default();
        let mut rng = StdRng::seed_from_u64(11);
        let params = SignalParams::default();

        for i in 0..100 {
            let now = start() + Duration::seconds(i);
            maybe_generate(&mut state, now, &params, &mut rng);
        }

        assert_eq!(state.history.len(), HISTORY_CAPACITY);
        assert!(state.history.iter().all(|p| (20.0..=200.0).contains(&p.glucose)));
        assert_eq!(
            state.history.iter().next().map(|p| p.time),
            Some(start() + Duration::seconds(70))
        );
    }
}
