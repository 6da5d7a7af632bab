//! Decoded payloads of realtime channels.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{RealtimeError, RealtimeResult};
use crate::trajectory::{Geometry, GeometryError};

/// A GeoJSON feature (stations, full trajectories, extra geometries).
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// `None` for features without geometry.
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Decode a single feature.
    pub fn from_value(value: &Value) -> Result<Self, GeometryError> {
        let geometry = match value.get("geometry") {
            None | Some(Value::Null) => None,
            Some(g) => Some(Geometry::from_geojson(g)?),
        };
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(Self {
            geometry,
            properties,
        })
    }

    /// Decode a `Feature` or every feature of a `FeatureCollection`.
    pub fn collect(value: &Value) -> Result<Vec<Self>, GeometryError> {
        match value.get("features").and_then(Value::as_array) {
            Some(features) => features.iter().map(Self::from_value).collect(),
            None => Ok(vec![Self::from_value(value)?]),
        }
    }

    /// A string property.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// One stop of a stop sequence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Stop {
    #[serde(default)]
    pub station_id: Option<Value>,
    #[serde(default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<i64>,
    #[serde(default)]
    pub departure_time: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub coordinate: Option<[f64; 2]>,
}

/// The stops a vehicle serves.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StopSequence {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub stations: Vec<Stop>,
}

/// Check a one-shot response and hand back its content.
///
/// `null` or empty content is [`RealtimeError::EmptyContent`]; an object with
/// an `error` field is [`RealtimeError::RequestRejected`].
pub fn require_content(channel: &str, content: Value) -> RealtimeResult<Value> {
    let empty = match &content {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    };
    if empty {
        return Err(RealtimeError::EmptyContent {
            channel: channel.to_string(),
        });
    }

    if let Some(error) = content.get("error").filter(|e| !e.is_null()) {
        let reason = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(RealtimeError::RequestRejected {
            channel: channel.to_string(),
            reason,
        });
    }

    Ok(content)
}

/// Deserialize content, tagging failures with the channel.
pub fn decode_content<T: DeserializeOwned>(channel: &str, content: Value) -> RealtimeResult<T> {
    serde_json::from_value(content).map_err(|source| RealtimeError::Decode {
        channel: channel.to_string(),
        source,
    })
}

/// Stop sequences arrive as a list, or as a single object.
pub fn decode_stop_sequences(channel: &str, content: Value) -> RealtimeResult<Vec<StopSequence>> {
    match content {
        Value::Array(_) => decode_content(channel, content),
        single => Ok(vec![decode_content(channel, single)?]),
    }
}

/// Features of a one-shot response.
pub fn decode_features(channel: &str, content: &Value) -> RealtimeResult<Vec<Feature>> {
    Feature::collect(content).map_err(|e| RealtimeError::RequestRejected {
        channel: channel.to_string(),
        reason: e.to_string(),
    })
}

/// Deleted-vehicle payloads: the id itself, or an object carrying it.
pub fn deleted_vehicle_id(content: &Value) -> Option<String> {
    match content {
        Value::Object(o) => ["id", "train_id"]
            .iter()
            .find_map(|k| o.get(*k).and_then(crate::trajectory::id_string)),
        other => crate::trajectory::id_string(other),
    }
}
