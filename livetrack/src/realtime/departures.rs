//! Departure list derivation for station timetables.
//!
//! The timetable channel sends one record per call; the client keeps them in
//! a map keyed by `call_id` and re-derives the displayed list on every update
//! with [`derive_departures`].

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::trajectory::id_string;

/// State of a record that should not be shown.
pub const STATE_HIDDEN: &str = "HIDDEN";

/// State of a vehicle at its platform.
pub const STATE_BOARDING: &str = "BOARDING";

/// State of a vehicle pulling out.
pub const STATE_LEAVING: &str = "LEAVING";

/// Records flagged `has_fzo` in one of these states sort first, in this order.
const TOP_STATES: [&str; 3] = [STATE_HIDDEN, STATE_LEAVING, STATE_BOARDING];

/// Records within this many milliseconds of an identical predecessor are duplicates.
const DUPLICATE_WINDOW_MS: i64 = 1_000;

/// Cancellation states. The pattern is anchored: the whole state must be one
/// of these, so a value like `NOT_STOP_CANCELLED` does not count.
fn cancellation_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(STOP_CANCELLED|JOURNEY_CANCELLED)$").ok())
        .as_ref()
}

/// Line a departure belongs to.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LineInfo {
    #[serde(default)]
    pub name: Option<String>,
}

/// One departure record of a station timetable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Departure {
    /// Identifies the call; later records with the same id replace earlier ones.
    #[serde(deserialize_with = "deserialize_id")]
    pub call_id: String,

    /// Primary scheduled time, epoch milliseconds.
    pub time: i64,

    #[serde(default)]
    pub arrival_time: Option<i64>,

    #[serde(default)]
    pub departure_time: Option<i64>,

    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub state: Option<String>,

    /// Destination shown to passengers.
    #[serde(default, alias = "to")]
    pub destination: Option<String>,

    #[serde(default)]
    pub line: Option<LineInfo>,

    /// The vehicle is tracked at the platform.
    #[serde(default)]
    pub has_fzo: bool,

    /// Set by [`derive_departures`].
    #[serde(skip)]
    pub cancelled: bool,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_string(&value).ok_or_else(|| serde::de::Error::custom("call_id must be a string or number"))
}

impl Departure {
    /// Earlier of arrival and departure, falling back to `time`.
    pub fn min_arrival_time(&self) -> i64 {
        match (self.arrival_time, self.departure_time) {
            (Some(a), Some(d)) => a.min(d),
            (Some(t), None) | (None, Some(t)) => t,
            (None, None) => self.time,
        }
    }

    /// Line name, if known.
    pub fn line_name(&self) -> Option<&str> {
        self.line.as_ref().and_then(|l| l.name.as_deref())
    }

    /// Whether the record is marked hidden.
    pub fn is_hidden(&self) -> bool {
        self.state.as_deref() == Some(STATE_HIDDEN)
    }

    fn is_boarding(&self) -> bool {
        self.state.as_deref() == Some(STATE_BOARDING)
    }

    fn top_rank(&self) -> Option<usize> {
        if !self.has_fzo {
            return None;
        }
        let state = self.state.as_deref()?;
        TOP_STATES.iter().position(|s| *s == state)
    }
}

/// How to derive the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartureOptions {
    /// Window half-width in minutes.
    pub max_departure_age_min: u32,
    /// Order by the earlier of arrival/departure instead of `time`.
    pub sort_by_min_arrival_time: bool,
}

impl Default for DepartureOptions {
    fn default() -> Self {
        Self {
            max_departure_age_min: super::config::DEFAULT_MAX_DEPARTURE_AGE_MIN,
            sort_by_min_arrival_time: false,
        }
    }
}

fn compare(a: &Departure, b: &Departure, options: &DepartureOptions) -> Ordering {
    let rank = match (a.top_rank(), b.top_rank()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let time = if options.sort_by_min_arrival_time {
        a.min_arrival_time().cmp(&b.min_arrival_time())
    } else {
        a.time.cmp(&b.time)
    };
    // call_id keeps the order independent of map iteration
    rank.then(time).then_with(|| a.call_id.cmp(&b.call_id))
}

/// Build the displayed departure list from the per-call records.
///
/// - sorted (tracked at-platform records first, then by time);
/// - records whose `time` lies outside `now ± max_departure_age_min` are dropped;
/// - a `BOARDING` record at a platform where an earlier record is already
///   boarding is marked `HIDDEN`, as is a record repeating the previous
///   record's destination and line within one second;
/// - cancelled states set `cancelled`.
pub fn derive_departures(
    records: &HashMap<String, Departure>,
    now_ms: i64,
    options: &DepartureOptions,
) -> Vec<Departure> {
    let window_ms = i64::from(options.max_departure_age_min) * 60_000;
    let (from, to) = (now_ms - window_ms, now_ms + window_ms);

    let mut list: Vec<Departure> = records
        .values()
        .filter(|d| d.time >= from && d.time <= to)
        .cloned()
        .collect();
    list.sort_by(|a, b| compare(a, b, options));

    let mut boarding_platforms: HashSet<String> = HashSet::new();
    let mut result: Vec<Departure> = Vec::with_capacity(list.len());

    for mut departure in list {
        if departure.is_boarding() {
            if let Some(platform) = &departure.platform {
                if !boarding_platforms.insert(platform.clone()) {
                    departure.state = Some(STATE_HIDDEN.to_string());
                }
            }
        }

        if let Some(previous) = result.last() {
            let repeated = previous.destination == departure.destination
                && previous.line_name() == departure.line_name()
                && (departure.time - previous.time).abs() <= DUPLICATE_WINDOW_MS;
            if repeated {
                departure.state = Some(STATE_HIDDEN.to_string());
            }
        }

        departure.cancelled = match (departure.state.as_deref(), cancellation_pattern()) {
            (Some(state), Some(pattern)) => pattern.is_match(state),
            _ => false,
        };

        result.push(departure);
    }

    result
}

/// Drop records whose `time` is before the window start. Returns the number removed.
pub fn prune_departures(records: &mut HashMap<String, Departure>, now_ms: i64, options: &DepartureOptions) -> usize {
    let from = now_ms - i64::from(options.max_departure_age_min) * 60_000;
    let before = records.len();
    records.retain(|_, d| d.time >= from);
    before - records.len()
}
