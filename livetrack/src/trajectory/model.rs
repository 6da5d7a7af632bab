//! Trajectory model and wire decoding.

use serde_json::Value;

use super::error::{TrajectoryError, TrajectoryResult};
use super::geometry::Geometry;

/// One trajectory sample: at `time_ms` the vehicle is at `fraction` of the line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeInterval {
    /// Epoch milliseconds.
    pub time_ms: i64,
    /// Arc-length fraction along the geometry, `0..=1`.
    pub fraction: f64,
    /// Vehicle rotation in radians, when the server provides one.
    pub rotation: Option<f64>,
}

/// A vehicle and the samples describing its movement.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub id: String,
    pub geometry: Geometry,
    /// Sorted ascending by time.
    pub time_intervals: Vec<TimeInterval>,
    /// Subtracted from "now" before looking up the intervals.
    pub time_offset_ms: i64,
    pub line_name: Option<String>,
    pub vehicle_type: Option<String>,
}

impl Trajectory {
    /// Build a trajectory, sorting `time_intervals` by time.
    pub fn new(id: impl Into<String>, geometry: Geometry, mut time_intervals: Vec<TimeInterval>) -> Self {
        time_intervals.sort_by_key(|i| i.time_ms);
        Self {
            id: id.into(),
            geometry,
            time_intervals,
            time_offset_ms: 0,
            line_name: None,
            vehicle_type: None,
        }
    }

    /// Set the time offset.
    pub fn with_time_offset(mut self, offset_ms: i64) -> Self {
        self.time_offset_ms = offset_ms;
        self
    }

    /// Set the line name.
    pub fn with_line_name(mut self, name: impl Into<String>) -> Self {
        self.line_name = Some(name.into());
        self
    }

    /// End of the last interval, if any.
    pub fn last_time_ms(&self) -> Option<i64> {
        self.time_intervals.last().map(|i| i.time_ms)
    }
}

/// What a trajectory frame asks the store to do.
#[derive(Debug, Clone, PartialEq)]
pub enum TrajectoryMessage {
    /// Insert or replace a vehicle.
    Upsert(Trajectory),
    /// Forget a vehicle. Sent as a feature with `null` geometry.
    Delete(String),
}

impl TrajectoryMessage {
    /// Decode one trajectory feature.
    ///
    /// ```text
    /// {"type": "Feature",
    ///  "geometry": {"type": "LineString", "coordinates": [[x, y], ...]} | null,
    ///  "properties": {"train_id": "..", "time_intervals": [[ms, frac, rot|null], ...],
    ///                 "time_offset": ms, "line": {"name": ".."}, "type": ".."}}
    /// ```
    pub fn decode(feature: &Value) -> TrajectoryResult<Self> {
        let properties = feature.get("properties").unwrap_or(&Value::Null);
        let id = properties
            .get("train_id")
            .and_then(id_string)
            .ok_or(TrajectoryError::MissingId)?;

        let geometry = match feature.get("geometry") {
            None | Some(Value::Null) => return Ok(TrajectoryMessage::Delete(id)),
            Some(geometry) => Geometry::from_geojson(geometry)?,
        };

        let time_intervals = match properties.get("time_intervals") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(decode_interval)
                .collect::<TrajectoryResult<Vec<_>>>()?,
            Some(other) => {
                return Err(TrajectoryError::InvalidField {
                    field: "time_intervals",
                    reason: format!("expected a list, got {}", other),
                })
            }
        };

        let mut trajectory = Trajectory::new(id, geometry, time_intervals);
        trajectory.time_offset_ms = properties
            .get("time_offset")
            .and_then(Value::as_f64)
            .map(|v| v as i64)
            .unwrap_or(0);
        trajectory.line_name = properties
            .get("line")
            .and_then(|line| line.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        trajectory.vehicle_type = properties.get("type").and_then(id_string);

        Ok(TrajectoryMessage::Upsert(trajectory))
    }
}

fn decode_interval(value: &Value) -> TrajectoryResult<TimeInterval> {
    let invalid = || TrajectoryError::InvalidField {
        field: "time_intervals",
        reason: format!("expected [ms, fraction, rotation?], got {}", value),
    };

    let entry = value.as_array().filter(|a| a.len() >= 2).ok_or_else(invalid)?;
    let time_ms = entry[0].as_f64().ok_or_else(invalid)? as i64;
    let fraction = entry[1].as_f64().ok_or_else(invalid)?;
    let rotation = entry.get(2).and_then(Value::as_f64);

    Ok(TimeInterval {
        time_ms,
        fraction,
        rotation,
    })
}

/// An id sent as either a string or a number.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
