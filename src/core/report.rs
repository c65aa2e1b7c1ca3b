//! Rendering of buffered history for the dashboard: JSON rows and CSV.
//!
//! Both use the dashboard's column names (`Time, Glucose, Red, IR,
//! Temperature, Motion`) with times shown as `HH:MM:SS` in the configured
//! timezone.

use crate::core::error::EngineError;
use crate::core::types::{GlucosePoint, SourceId};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt::Write;

pub const CSV_HEADER: &str = "Time,Glucose,Red,IR,Temperature,Motion";

/// Wall-clock `HH:MM:SS` of an instant in `tz`.
pub fn clock_time(time: DateTime<Utc>, tz: Tz) -> String {
    time.with_timezone(&tz).format("%H:%M:%S").to_string()
}

/// One history row as the dashboard expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRow {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Glucose")]
    pub glucose: f64,
    #[serde(rename = "Red")]
    pub red: f64,
    #[serde(rename = "IR")]
    pub ir: f64,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Motion")]
    pub motion: f64,
}

impl PointRow {
    pub fn new(point: &GlucosePoint, tz: Tz) -> Self {
        Self {
            time: clock_time(point.time, tz),
            glucose: point.glucose,
            red: point.red,
            ir: point.ir,
            temperature: point.temperature,
            motion: point.motion,
        }
    }
}

pub fn rows(points: &[GlucosePoint], tz: Tz) -> Vec<PointRow> {
    points.iter().map(|p| PointRow::new(p, tz)).collect()
}

/// A rendered CSV download.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub source: SourceId,
    pub rows: usize,
    pub body: String,
}

impl CsvExport {
    /// Download name, e.g. `glucose_device.csv`.
    pub fn filename(&self) -> String {
        format!("glucose_{}.csv", self.source)
    }
}

/// Render a buffer as CSV. An empty buffer has nothing to export.
pub fn to_csv(source: SourceId, points: &[GlucosePoint], tz: Tz) -> Result<CsvExport, EngineError> {
    if points.is_empty() {
        return Err(EngineError::NoData(source));
    }

    let mut body = String::with_capacity(CSV_HEADER.len() + points.len() * 48);
    body.push_str(CSV_HEADER);
    body.push('\n');

    for point in points {
        // Writing into a String cannot fail. `{:?}` keeps whole floats as `37.0`.
        let _ = writeln!(
            body,
            "{},{:.1},{:?},{:?},{:?},{:?}",
            clock_time(point.time, tz),
            point.glucose,
            point.red,
            point.ir,
            point.temperature,
            point.motion
        );
    }

    Ok(CsvExport {
        source,
        rows: points.len(),
        body,
    })
}
