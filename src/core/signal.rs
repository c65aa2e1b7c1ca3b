//! Signal model: four sensor channels plus time in, one smoothed glucose value out.
//!
//! ```text
//! raw = (2 − (red + ir))·90 + (temp − 36.5)·3 − motion·40 + A·sin(phase) + N(0, σ)
//! out = clip(α·previous + (1 − α)·raw, 20, 200)
//! ```
//!
//! The circadian term uses a 60-second cycle: the phase is the
//! second-of-minute mapped onto a full sine period.

use crate::core::types::SensorReading;
use chrono::{DateTime, Timelike, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Lowest value a generated point can take (mg/dL).
pub const GLUCOSE_MIN: f64 = 20.0;
/// Highest value a generated point can take (mg/dL).
pub const GLUCOSE_MAX: f64 = 200.0;

/// Baseline body temperature the thermal term is measured against.
const REFERENCE_TEMPERATURE: f64 = 36.5;

/// Tunables of the signal model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalParams {
    /// Weight of the previous value when smoothing (higher is smoother)
    pub smoothing_alpha: f64,
    /// Standard deviation of the additive Gaussian noise
    pub noise_sigma: f64,
    /// Amplitude of the circadian oscillation
    pub circadian_amplitude: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.9,
            noise_sigma: 1.0,
            circadian_amplitude: 3.0,
        }
    }
}

impl SignalParams {
    /// Same model with the noise term switched off.
    pub fn noiseless() -> Self {
        Self {
            noise_sigma: 0.0,
            ..Self::default()
        }
    }
}

/// Compute a new reading from the sensor channels.
///
/// `now` and `rng` are the model's only hidden inputs; pass a fixed time and a
/// seeded generator to make the output reproducible.
pub fn compute_reading<R: Rng + ?Sized>(
    reading: &SensorReading,
    now: DateTime<Utc>,
    previous: Option<f64>,
    params: &SignalParams,
    rng: &mut R,
) -> f64 {
    let optical = (2.0 - (reading.red_signal + reading.ir_signal)) * 90.0;
    let thermal = (reading.temperature - REFERENCE_TEMPERATURE) * 3.0;
    let kinetic = -reading.motion * 40.0;
    let circadian = circadian_effect(now, params.circadian_amplitude);
    let noise = sample_noise(params.noise_sigma, rng);

    let raw = optical + thermal + kinetic + circadian + noise;

    let smoothed = match previous {
        Some(prev) => params.smoothing_alpha * prev + (1.0 - params.smoothing_alpha) * raw,
        None => raw,
    };

    clip(smoothed)
}

/// Circadian term for a given instant.
pub fn circadian_effect(now: DateTime<Utc>, amplitude: f64) -> f64 {
    let second = f64::from(now.second());
    amplitude * (second / 30.0 * PI).sin()
}

fn sample_noise<R: Rng + ?Sized>(sigma: f64, rng: &mut R) -> f64 {
    if sigma <= 0.0 {
        return 0.0;
    }
    Normal::new(0.0, sigma)
        .map(|normal| normal.sample(rng))
        .unwrap_or(0.0)
}

fn clip(value: f64) -> f64 {
    if value.is_nan() {
        return GLUCOSE_MIN;
    }
    value.clamp(GLUCOSE_MIN, GLUCOSE_MAX)
}

/// Round to one decimal place, the precision points are stored at.
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at_second(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap()
    }

    #[test]
    fn test_default_reading_without_noise() {
        let mut rng = StdRng::seed_from_u64(1);
        let reading = SensorReading::default();
        // At second 0 the circadian term vanishes.
        let value = compute_reading(&reading, at_second(0), None, &SignalParams::noiseless(), &mut rng);

        // optical (2 - 1.3) * 90 = 63, thermal 0, kinetic -12
        assert!((value - 51.0).abs() < 1e-9);
    }

    #[test]
    fn test_circadian_peaks_at_quarter_cycle() {
        assert!((circadian_effect(at_second(15), 3.0) - 3.0).abs() < 1e-9);
        assert!((circadian_effect(at_second(45), 3.0) + 3.0).abs() < 1e-9);
        assert!(circadian_effect(at_second(30), 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_smoothing_weights_previous_value() {
        let mut rng = StdRng::seed_from_u64(1);
        let reading = SensorReading::default();
        let value = compute_reading(
            &reading,
            at_second(0),
            Some(100.0),
            &SignalParams::noiseless(),
            &mut rng,
        );

        // 0.9 * 100 + 0.1 * 51
        assert!((value - 95.1).abs() < 1e-9);
    }

    #[test]
    fn test_output_is_clipped() {
        let mut rng = StdRng::seed_from_u64(7);
        let params = SignalParams::default();

        let low = SensorReading {
            red_signal: 1.0,
            ir_signal: 1.0,
            temperature: 30.0,
            motion: 5.0,
        };
        let high = SensorReading {
            red_signal: -3.0,
            ir_signal: -3.0,
            temperature: 45.0,
            motion: 0.0,
        };

        for second in 0..60 {
            let now = at_second(second);
            assert_eq!(compute_reading(&low, now, None, &params, &mut rng), GLUCOSE_MIN);
            assert_eq!(compute_reading(&high, now, None, &params, &mut rng), GLUCOSE_MAX);
        }
    }

    #[test]
    fn test_output_stays_in_range_for_varied_inputs() {
        let mut rng = StdRng::seed_from_u64(42);
        let params = SignalParams::default();
        let mut previous = None;

        for i in 0..500 {
            let reading = SensorReading {
                red_signal: rng.gen_range(-1.0..2.0),
                ir_signal: rng.gen_range(-1.0..2.0),
                temperature: rng.gen_range(30.0..42.0),
                motion: rng.gen_range(0.0..3.0),
            };
            let value = compute_reading(&reading, at_second(i % 60), previous, &params, &mut rng);
            assert!((GLUCOSE_MIN..=GLUCOSE_MAX).contains(&value), "{value} out of range");
            previous = Some(value);
        }
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let reading = SensorReading::default();
        let params = SignalParams::default();
        let a = compute_reading(&reading, at_second(10), None, &params, &mut StdRng::seed_from_u64(9));
        let b = compute_reading(&reading, at_second(10), None, &params, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_round_tenth() {
        assert_eq!(round_tenth(95.14), 95.1);
        assert_eq!(round_tenth(95.16), 95.2);
    }
}
