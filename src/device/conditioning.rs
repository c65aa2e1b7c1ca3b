//! Raw optical counts in, normalized device readings out.
//!
//! Mirrors what the wearable does before pushing: a short moving average
//! over the raw red/IR counts, linear normalization into 0..1, and a motion
//! estimate derived from how much the IR channel jumps between samples.

use crate::core::history::RingBuffer;
use crate::core::types::SensorReading;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Samples in the moving average.
pub const SMOOTHING_SAMPLES: usize = 10;

/// Raw red counts mapped to 0.0 and 1.0.
pub const RED_RANGE: (f64, f64) = (5_000.0, 100_000.0);
/// Raw IR counts mapped to 0.0 and 1.0.
pub const IR_RANGE: (f64, f64) = (10_000.0, 150_000.0);

const INITIAL_MOTION: f64 = 0.3;
const MOTION_ALPHA: f64 = 0.8;
const MOTION_SCALE: f64 = 10_000.0;

/// One raw reading from the optical front end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub red: u32,
    pub ir: u32,
    /// Die temperature in °C
    pub temperature: f64,
}

/// Conditioned values ready to push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionedSample {
    pub reading: SensorReading,
    /// Moving-average red count
    pub raw_red: f64,
    /// Moving-average IR count
    pub raw_ir: f64,
}

/// Linear map of `value` from `range` into 0..1, clamped.
pub fn normalize(value: f64, range: (f64, f64)) -> f64 {
    let (min, max) = range;
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct SignalConditioner {
    red: RingBuffer<u32>,
    ir: RingBuffer<u32>,
    temperature: f64,
    motion: f64,
    last_ir: Option<f64>,
}

impl SignalConditioner {
    pub fn new() -> Self {
        Self {
            red: RingBuffer::with_capacity(SMOOTHING_SAMPLES),
            ir: RingBuffer::with_capacity(SMOOTHING_SAMPLES),
            temperature: SensorReading::DEFAULT.temperature,
            motion: INITIAL_MOTION,
            last_ir: None,
        }
    }

    /// Feed one raw sample.
    pub fn push(&mut self, sample: RawSample) {
        self.red.push(sample.red);
        self.ir.push(sample.ir);
        self.temperature = sample.temperature;

        let ir = self.ir_average();
        if let Some(last_ir) = self.last_ir {
            let variation = (ir - last_ir).abs() / MOTION_SCALE;
            self.motion =
                (MOTION_ALPHA * self.motion + (1.0 - MOTION_ALPHA) * variation).clamp(0.0, 1.0);
        }
        self.last_ir = Some(ir);
    }

    /// Current conditioned output.
    pub fn sample(&self) -> ConditionedSample {
        let raw_red = self.red_average();
        let raw_ir = self.ir_average();

        ConditionedSample {
            reading: SensorReading {
                red_signal: normalize(raw_red, RED_RANGE),
                ir_signal: normalize(raw_ir, IR_RANGE),
                temperature: self.temperature,
                motion: self.motion,
            },
            raw_red,
            raw_ir,
        }
    }

    pub fn motion(&self) -> f64 {
        self.motion
    }

    fn red_average(&self) -> f64 {
        average(&self.red)
    }

    fn ir_average(&self) -> f64 {
        average(&self.ir)
    }
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new()
    }
}

fn average(ring: &RingBuffer<u32>) -> f64 {
    if ring.is_empty() {
        return 0.0;
    }
    ring.iter().map(|&v| f64::from(v)).sum::<f64>() / ring.len() as f64
}

/// Stand-in for an optical sensor: a bounded random walk over raw counts.
#[derive(Debug, Clone)]
pub struct SyntheticOptics {
    rng: StdRng,
    red: f64,
    ir: f64,
    temperature: f64,
}

impl SyntheticOptics {
    /// Per-sample standard deviation of the raw count walk
    const COUNT_STEP: f64 = 400.0;
    /// Per-sample standard deviation of the temperature walk
    const TEMPERATURE_STEP: f64 = 0.02;

    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            red: 50_000.0,
            ir: 80_000.0,
            temperature: 36.6,
        }
    }

    /// Next raw reading.
    pub fn next_sample(&mut self) -> RawSample {
        self.red = (self.red + self.step(Self::COUNT_STEP)).clamp(RED_RANGE.0, RED_RANGE.1);
        self.ir = (self.ir + self.step(Self::COUNT_STEP)).clamp(IR_RANGE.0, IR_RANGE.1);
        self.temperature =
            (self.temperature + self.step(Self::TEMPERATURE_STEP)).clamp(35.0, 39.0);

        RawSample {
            red: self.red.round() as u32,
            ir: self.ir.round() as u32,
            temperature: (self.temperature * 10.0).round() / 10.0,
        }
    }

    fn step(&mut self, sigma: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * sigma
    }
}
