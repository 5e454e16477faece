//! Change stamps for whole-dataset ordering.
//!
//! Each store records a single "last change" stamp. Comparing the two stamps
//! is how a cycle decides which side holds the authoritative dataset.

use crate::{error::Result, Error};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::cmp::Ordering;

/// A point in time, in milliseconds since the Unix epoch.
///
/// A side that never recorded a change sits at the epoch and therefore
/// always compares as the oldest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeStamp(i64);

impl ChangeStamp {
    /// The epoch stamp.
    pub const EPOCH: ChangeStamp = ChangeStamp(0);

    /// Create a stamp from milliseconds since the epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis())
    }

    /// Parse a stored ISO-8601 value. Missing or blank values map to the epoch.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::EPOCH),
            Some(raw) => raw,
        };
        DateTime::parse_from_rfc3339(raw)
            .map(|at| Self(at.timestamp_millis()))
            .map_err(|e| Error::InvalidTimestamp(format!("{raw}: {e}")))
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    /// Absolute distance to another stamp in milliseconds.
    pub fn abs_diff_ms(self, other: ChangeStamp) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// Render as `YYYY-MM-DDTHH:MM:SS.mmmZ`. Rendered values sort lexicographically.
    pub fn to_iso(self) -> String {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn is_epoch(self) -> bool {
        self.0 == 0
    }
}

impl Ord for ChangeStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for ChangeStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ChangeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_is_epoch() {
        assert_eq!(ChangeStamp::parse(None).unwrap(), ChangeStamp::EPOCH);
        assert_eq!(ChangeStamp::parse(Some("  ")).unwrap(), ChangeStamp::EPOCH);
    }

    #[test]
    fn parses_iso_with_millis() {
        let stamp = ChangeStamp::parse(Some("2024-03-01T10:00:00.250Z")).unwrap();
        assert_eq!(stamp.millis(), 1_709_287_200_250);
    }

    #[test]
    fn parses_offsets() {
        let utc = ChangeStamp::parse(Some("2024-03-01T10:00:00Z")).unwrap();
        let bogota = ChangeStamp::parse(Some("2024-03-01T05:00:00-05:00")).unwrap();
        assert_eq!(utc, bogota);
    }

    #[test]
    fn rejects_garbage() {
        let err = ChangeStamp::parse(Some("yesterday")).unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp(_)));
    }

    #[test]
    fn iso_roundtrip() {
        let stamp = ChangeStamp::from_millis(1_709_287_200_250);
        assert_eq!(stamp.to_iso(), "2024-03-01T10:00:00.250Z");
        assert_eq!(ChangeStamp::parse(Some(&stamp.to_iso())).unwrap(), stamp);
    }

    #[test]
    fn iso_sorts_like_stamps() {
        let a = ChangeStamp::from_millis(1_000_000_000_000);
        let b = ChangeStamp::from_millis(1_700_000_000_000);
        assert!(a < b);
        assert!(a.to_iso() < b.to_iso());
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = ChangeStamp::from_millis(5_000);
        let b = ChangeStamp::from_millis(3_500);
        assert_eq!(a.abs_diff_ms(b), 1_500);
        assert_eq!(b.abs_diff_ms(a), 1_500);
    }
}
