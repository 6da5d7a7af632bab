//! Position of a vehicle at a point in time.

use crate::trajectory::{Coordinate, Geometry, GeometryError, LineSample, Polyline, TimeInterval, Trajectory};

/// Where a vehicle is and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolated {
    pub coordinate: Coordinate,
    /// Radians.
    pub rotation: f64,
}

/// Position of `trajectory` at `now_ms`.
///
/// Looks up the interval bracketing `now_ms - time_offset`. Before the first
/// sample the vehicle sits at the first sample, after the last at the last;
/// in between the arc fraction is interpolated linearly in time. A single
/// sample is a fixed position. Rotation comes from the interval's start
/// sample, or from the line direction when the sample has none.
///
/// Returns `Ok(None)` when there are no samples to place the vehicle with.
pub fn interpolate(trajectory: &Trajectory, now_ms: i64) -> Result<Option<Interpolated>, GeometryError> {
    let intervals = &trajectory.time_intervals;
    let (Some(first), Some(last)) = (intervals.first(), intervals.last()) else {
        return Ok(None);
    };

    match &trajectory.geometry {
        Geometry::Unsupported(kind) => Err(GeometryError::Unsupported { kind: kind.clone() }),
        Geometry::Point(coordinate) => Ok(Some(Interpolated {
            coordinate: *coordinate,
            rotation: first.rotation.unwrap_or(0.0),
        })),
        Geometry::LineString(line) => {
            let t = now_ms - trajectory.time_offset_ms;

            if intervals.len() == 1 || t < first.time_ms {
                return Ok(Some(at_sample(line, first)));
            }
            if t >= last.time_ms {
                return Ok(Some(at_sample(line, last)));
            }

            // Samples are few; a linear scan is enough
            let Some(pair) = intervals
                .windows(2)
                .find(|pair| pair[0].time_ms <= t && t < pair[1].time_ms)
            else {
                return Ok(Some(at_sample(line, last)));
            };
            let (start, end) = (&pair[0], &pair[1]);

            let span = (end.time_ms - start.time_ms) as f64;
            let time_fraction = ((t - start.time_ms) as f64 / span).clamp(0.0, 1.0);
            let arc_fraction = start.fraction + time_fraction * (end.fraction - start.fraction);

            let LineSample { coordinate, bearing } = line.sample(arc_fraction);
            Ok(Some(Interpolated {
                coordinate,
                rotation: start.rotation.unwrap_or(bearing),
            }))
        }
    }
}

fn at_sample(line: &Polyline, sample: &TimeInterval) -> Interpolated {
    let LineSample { coordinate, bearing } = line.sample(sample.fraction);
    Interpolated {
        coordinate,
        rotation: sample.rotation.unwrap_or(bearing),
    }
}
