use chrono::{Duration, NaiveDateTime};

/// Storage format for appointment instants (minute precision). The
/// format sorts lexicographically, which the listing queries rely on.
pub const STORED_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Upper bound on a service duration: one day. Durations past this are
/// rejected before interval arithmetic ever sees them.
pub const MAX_DURATION_MIN: i64 = 1440;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    /// Build the interval an appointment occupies: `[start, start + duration)`.
    pub fn from_start(start: NaiveDateTime, duration_min: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(duration_min),
        }
    }

    /// Standard half-open overlap test: `s1 < e2 && s2 < e1`. The end
    /// bound is excluded, so back-to-back intervals do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

pub fn parse_stored(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, STORED_FORMAT).ok()
}

pub fn format_stored(dt: NaiveDateTime) -> String {
    dt.format(STORED_FORMAT).to_string()
}
