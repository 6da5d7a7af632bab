//! Vehicle geometries and arc-length sampling.

use serde_json::Value;

use super::error::GeometryError;

/// A map coordinate in the feed's projection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    /// Create a coordinate.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Direction towards `other` in radians, counter-clockwise from the x axis.
    pub fn bearing(&self, other: &Coordinate) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    fn from_json(value: &Value) -> Result<Self, GeometryError> {
        let pair = value
            .as_array()
            .filter(|a| a.len() >= 2)
            .ok_or_else(|| GeometryError::Malformed(format!("expected [x, y], got {}", value)))?;
        match (pair[0].as_f64(), pair[1].as_f64()) {
            (Some(x), Some(y)) => Ok(Self { x, y }),
            _ => Err(GeometryError::Malformed(format!(
                "non-numeric coordinate {}",
                value
            ))),
        }
    }
}

/// A point sampled on a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSample {
    pub coordinate: Coordinate,
    /// Bearing of the segment the sample lies on, radians.
    pub bearing: f64,
}

/// A line with precomputed cumulative arc length.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    points: Vec<Coordinate>,
    cumulative: Vec<f64>,
}

impl Polyline {
    /// Build a polyline. Needs at least two points.
    pub fn new(points: Vec<Coordinate>) -> Result<Self, GeometryError> {
        if points.len() < 2 {
            return Err(GeometryError::Degenerate {
                points: points.len(),
            });
        }

        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            total += pair[0].distance(&pair[1]);
            cumulative.push(total);
        }

        Ok(Self { points, cumulative })
    }

    /// The vertices.
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    /// Total length.
    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Sample the line at `fraction` of its length (clamped to `0..=1`).
    pub fn sample(&self, fraction: f64) -> LineSample {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let target = fraction * self.length();
        let last = self.points.len() - 1;

        // First vertex at or past the target ends the segment
        let end = self.cumulative.partition_point(|&d| d < target).clamp(1, last);
        let start = end - 1;

        let (a, b) = (self.points[start], self.points[end]);
        let segment = self.cumulative[end] - self.cumulative[start];
        let t = if segment > 0.0 {
            ((target - self.cumulative[start]) / segment).clamp(0.0, 1.0)
        } else {
            0.0
        };

        LineSample {
            coordinate: Coordinate::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t),
            bearing: self.segment_bearing(start),
        }
    }

    /// Bearing of segment `index`, or of the nearest non-empty segment.
    fn segment_bearing(&self, index: usize) -> f64 {
        let non_empty = |i: &usize| self.points[*i] != self.points[*i + 1];
        (index..self.points.len() - 1)
            .find(non_empty)
            .or_else(|| (0..index).rev().find(non_empty))
            .map(|i| self.points[i].bearing(&self.points[i + 1]))
            .unwrap_or(0.0)
    }
}

/// Geometry of a vehicle feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A stationary vehicle.
    Point(Coordinate),
    /// The path a vehicle travels along.
    LineString(Polyline),
    /// Anything else, including lines with fewer than two points. Kept,
    /// but never interpolated.
    Unsupported(String),
}

impl Geometry {
    /// GeoJSON type name, or a description of why the geometry is unusable.
    pub fn kind(&self) -> &str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Unsupported(kind) => kind,
        }
    }

    /// Decode a GeoJSON geometry object.
    pub fn from_geojson(value: &Value) -> Result<Self, GeometryError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| GeometryError::Malformed("missing geometry type".to_string()))?;
        let coordinates = value.get("coordinates").unwrap_or(&Value::Null);

        match kind {
            "Point" => Ok(Geometry::Point(Coordinate::from_json(coordinates)?)),
            "LineString" => {
                let points = coordinates
                    .as_array()
                    .ok_or_else(|| {
                        GeometryError::Malformed("LineString coordinates must be a list".to_string())
                    })?
                    .iter()
                    .map(Coordinate::from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                match Polyline::new(points) {
                    Ok(line) => Ok(Geometry::LineString(line)),
                    // Too short to move along; the vehicle is kept but never drawn
                    Err(e @ GeometryError::Degenerate { .. }) => {
                        Ok(Geometry::Unsupported(e.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
            other => Ok(Geometry::Unsupported(other.to_string())),
        }
    }
}
