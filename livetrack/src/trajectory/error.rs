//! Trajectory errors.

use thiserror::Error;

/// Result alias for trajectory decoding.
pub type TrajectoryResult<T> = Result<T, TrajectoryError>;

/// Geometry that cannot be interpolated along.
///
/// Interpolation logs these and skips the trajectory for the tick; the
/// trajectory stays in the store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    /// Geometry type the interpolator does not handle.
    #[error("Unsupported geometry type: {kind}")]
    Unsupported { kind: String },

    /// A line with fewer than two points.
    #[error("Degenerate line geometry with {points} point(s)")]
    Degenerate { points: usize },

    /// Coordinates that are not numeric pairs.
    #[error("Malformed geometry: {0}")]
    Malformed(String),
}

/// A trajectory frame that could not be decoded.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrajectoryError {
    /// No usable vehicle id in the feature properties.
    #[error("Trajectory has no train_id")]
    MissingId,

    /// A property with the wrong shape.
    #[error("Invalid trajectory field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The feature geometry is broken.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GeometryError::Unsupported {
            kind: "MultiPolygon".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported geometry type: MultiPolygon");

        let err = TrajectoryError::from(GeometryError::Degenerate { points: 1 });
        assert_eq!(err.to_string(), "Degenerate line geometry with 1 point(s)");
    }
}
