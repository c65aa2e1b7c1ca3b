//! Data types shared by the telemetry engine.
//!
//! A [`SensorReading`] is the live, mutable input for one source. A
//! [`GlucosePoint`] is an immutable sample derived from it at generation time.

use crate::core::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two parallel telemetry pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// Readings entered by hand on the dashboard
    #[default]
    Manual,
    /// Readings pushed by a networked device
    Device,
}

impl SourceId {
    pub const ALL: [SourceId; 2] = [SourceId::Manual, SourceId::Device];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Manual => "manual",
            SourceId::Device => "device",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = EngineError;

    /// Accepts `manual`, `device`, and the legacy `esp32` alias for the device feed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(SourceId::Manual),
            "device" | "esp32" => Ok(SourceId::Device),
            _ => Err(EngineError::InvalidSource(s.to_string())),
        }
    }
}

/// The four raw inputs the signal model consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Normalized red channel (nominally 0-1, not clipped)
    pub red_signal: f64,
    /// Normalized infrared channel
    pub ir_signal: f64,
    /// Skin temperature in °C
    pub temperature: f64,
    /// Motion intensity
    pub motion: f64,
}

impl SensorReading {
    pub const DEFAULT: SensorReading = SensorReading {
        red_signal: 0.6,
        ir_signal: 0.7,
        temperature: 36.5,
        motion: 0.3,
    };

    /// Overwrite the fields present in `update`, keeping the rest.
    pub fn apply(&mut self, update: &ReadingUpdate) {
        if let Some(v) = update.red_signal {
            self.red_signal = v;
        }
        if let Some(v) = update.ir_signal {
            self.ir_signal = v;
        }
        if let Some(v) = update.temperature {
            self.temperature = v;
        }
        if let Some(v) = update.motion {
            self.motion = v;
        }
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A partial update to a [`SensorReading`]. Absent fields keep their prior value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingUpdate {
    pub red_signal: Option<f64>,
    pub ir_signal: Option<f64>,
    pub temperature: Option<f64>,
    pub motion: Option<f64>,
    /// Identifier reported by a device push, if any
    pub device_id: Option<String>,
}

impl ReadingUpdate {
    const FIELDS: [&'static str; 4] = ["red_signal", "ir_signal", "temperature", "motion"];

    /// Update that overwrites every field.
    pub fn full(reading: SensorReading) -> Self {
        Self {
            red_signal: Some(reading.red_signal),
            ir_signal: Some(reading.ir_signal),
            temperature: Some(reading.temperature),
            motion: Some(reading.motion),
            device_id: None,
        }
    }

    /// Parse an ingestion payload.
    ///
    /// Each reading field may be missing or `null`, a JSON number, or a
    /// string holding a finite float. Anything else is rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, EngineError> {
        let object = value.as_object().ok_or_else(|| EngineError::MalformedInput {
            field: "body".to_string(),
            reason: "expected a JSON object".to_string(),
        })?;

        let mut parsed = [None; 4];
        for (slot, field) in parsed.iter_mut().zip(Self::FIELDS) {
            *slot = match object.get(field) {
                None | Some(serde_json::Value::Null) => None,
                Some(v) => Some(parse_number(field, v)?),
            };
        }
        let [red_signal, ir_signal, temperature, motion] = parsed;

        let device_id = object.get("device_id").and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(Self {
            red_signal,
            ir_signal,
            temperature,
            motion,
            device_id,
        })
    }
}

fn parse_number(field: &str, value: &serde_json::Value) -> Result<f64, EngineError> {
    let malformed = |reason: String| EngineError::MalformedInput {
        field: field.to_string(),
        reason,
    };

    let number = match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| malformed(format!("{n} is not representable as a float")))?,
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed(format!("'{s}' is not a number")))?,
        other => return Err(malformed(format!("expected a number, got {other}"))),
    };

    if number.is_finite() {
        Ok(number)
    } else {
        Err(malformed("value must be finite".to_string()))
    }
}

/// A generated sample. Immutable once stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucosePoint {
    /// Generation time, truncated to whole seconds
    pub time: DateTime<Utc>,
    /// mg/dL, rounded to one decimal
    pub glucose: f64,
    pub red: f64,
    pub ir: f64,
    pub temperature: f64,
    pub motion: f64,
}

impl GlucosePoint {
    /// The sensor values this point was generated from.
    pub fn reading(&self) -> SensorReading {
        SensorReading {
            red_signal: self.red,
            ir_signal: self.ir,
            temperature: self.temperature,
            motion: self.motion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_id_parsing() {
        assert_eq!("manual".parse::<SourceId>().unwrap(), SourceId::Manual);
        assert_eq!("Device".parse::<SourceId>().unwrap(), SourceId::Device);
        assert_eq!("esp32".parse::<SourceId>().unwrap(), SourceId::Device);

        let err = "bluetooth".parse::<SourceId>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidSource(ref s) if s == "bluetooth"));
    }

    #[test]
    fn test_source_id_serializes_lowercase() {
        assert_eq!(serde_json::to_value(SourceId::Device).unwrap(), json!("device"));
    }

    #[test]
    fn test_partial_update_keeps_prior_values() {
        let mut reading = SensorReading::default();
        let update = ReadingUpdate::from_json(&json!({ "motion": 0.9 })).unwrap();
        reading.apply(&update);

        assert_eq!(reading.motion, 0.9);
        assert_eq!(reading.red_signal, 0.6);
        assert_eq!(reading.temperature, 36.5);
    }

    #[test]
    fn test_update_accepts_numeric_strings_and_null() {
        let update = ReadingUpdate::from_json(&json!({
            "red_signal": "0.45",
            "ir_signal": null,
            "device_id": "esp32_max30102"
        }))
        .unwrap();

        assert_eq!(update.red_signal, Some(0.45));
        assert_eq!(update.ir_signal, None);
        assert_eq!(update.device_id.as_deref(), Some("esp32_max30102"));
    }

    #[test]
    fn test_update_rejects_non_numeric_field() {
        let err = ReadingUpdate::from_json(&json!({ "temperature": "warm" })).unwrap_err();
        match err {
            EngineError::MalformedInput { field, .. } => assert_eq!(field, "temperature"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(ReadingUpdate::from_json(&json!({ "motion": [1, 2] })).is_err());
        assert!(ReadingUpdate::from_json(&json!([0.5])).is_err());
    }
}
