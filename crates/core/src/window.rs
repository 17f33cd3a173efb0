//! Digest cadences and date-range math.
//!
//! Each scheduled digest run covers a window ending at the end of "now"'s
//! day and starting at the beginning of the day one cadence step back, both
//! computed in the configured time zone. Zone configuration is a fixed
//! offset string such as `"+02:00"`; anything unparseable logs and falls
//! back to UTC rather than failing the run.

use chrono::{DateTime, Days, FixedOffset, Months, NaiveTime, Offset, TimeZone, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Inclusive window bounds, as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// How often a digest run fires.
///
/// The label strings are a cross-boundary contract: a subscriber's
/// `frequency` config value must equal the label of the cadence they want,
/// case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    /// Cadence label matched against subscriber `frequency` values.
    pub fn label(&self) -> &'static str {
        match self {
            Cadence::Daily => "Daily",
            Cadence::Weekly => "Weekly",
            Cadence::Monthly => "Monthly",
        }
    }

    /// Compute this cadence's digest window relative to `now`.
    ///
    /// The end is `now`'s day at 23:59:59.999 in `zone`; the start is the
    /// beginning of the day one cadence step earlier (7 days for Weekly,
    /// one calendar month for Monthly). Daily subtracts nothing: a daily
    /// run fires at the end of the day it reports on, so its window is
    /// that day itself; stepping back a day would double-report yesterday.
    pub fn window(&self, now: DateTime<Utc>, zone: FixedOffset) -> DateRange {
        let local_day = now.with_timezone(&zone).date_naive();
        let start_day = match self {
            Cadence::Daily => local_day,
            Cadence::Weekly => local_day.checked_sub_days(Days::new(7)).unwrap_or(local_day),
            Cadence::Monthly => local_day
                .checked_sub_months(Months::new(1))
                .unwrap_or(local_day),
        };

        let end_of_day =
            NaiveTime::from_hms_milli_opt(23, 59, 59, 999).expect("valid end-of-day time");
        let start = local_instant(start_day.and_time(NaiveTime::MIN), zone);
        let end = local_instant(local_day.and_time(end_of_day), zone);
        DateRange { start, end }
    }
}

/// Convert a local wall-clock time in `zone` to a UTC instant. Fixed
/// offsets have no DST gaps, so the conversion is always single-valued.
fn local_instant(local: chrono::NaiveDateTime, zone: FixedOffset) -> DateTime<Utc> {
    zone.from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}

// ---------------------------------------------------------------------------
// Zone resolution
// ---------------------------------------------------------------------------

/// Resolve the configured zone string, falling back to UTC when it is
/// unset, blank, or unparseable.
pub fn resolve_zone(configured: Option<&str>) -> FixedOffset {
    let utc = Utc.fix();
    let Some(raw) = configured else {
        return utc;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return utc;
    }
    match raw.parse::<FixedOffset>() {
        Ok(zone) => zone,
        Err(error) => {
            tracing::error!(zone = raw, %error, "Could not parse configured time zone, using UTC");
            utc
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid RFC 3339 timestamp")
    }

    #[test]
    fn monthly_window_spans_one_calendar_month() {
        let range = Cadence::Monthly.window(utc("2024-03-15T10:00:00Z"), Utc.fix());
        assert_eq!(range.start, utc("2024-02-15T00:00:00Z"));
        assert_eq!(range.end, utc("2024-03-15T23:59:59.999Z"));
    }

    #[test]
    fn daily_window_covers_the_current_day() {
        let range = Cadence::Daily.window(utc("2024-03-15T10:00:00Z"), Utc.fix());
        assert_eq!(range.start, utc("2024-03-15T00:00:00Z"));
        assert_eq!(range.end, utc("2024-03-15T23:59:59.999Z"));
    }

    #[test]
    fn weekly_window_spans_seven_days() {
        let range = Cadence::Weekly.window(utc("2024-03-15T10:00:00Z"), Utc.fix());
        assert_eq!(range.start, utc("2024-03-08T00:00:00Z"));
        assert_eq!(range.end, utc("2024-03-15T23:59:59.999Z"));
    }

    #[test]
    fn monthly_window_clamps_at_month_end() {
        // March 31 minus one month clamps to February 29 (leap year).
        let range = Cadence::Monthly.window(utc("2024-03-31T12:00:00Z"), Utc.fix());
        assert_eq!(range.start, utc("2024-02-29T00:00:00Z"));
    }

    #[test]
    fn window_respects_configured_offset() {
        // 23:30Z on the 15th is already the 16th at +02:00.
        let zone = FixedOffset::east_opt(2 * 3600).expect("valid offset");
        let range = Cadence::Daily.window(utc("2024-03-15T23:30:00Z"), zone);
        assert_eq!(range.start, utc("2024-03-15T22:00:00Z"));
        assert_eq!(range.end, utc("2024-03-16T21:59:59.999Z"));
    }

    #[test]
    fn contains_is_inclusive_on_both_bounds() {
        let range = Cadence::Daily.window(utc("2024-03-15T10:00:00Z"), Utc.fix());
        assert!(range.contains(range.start));
        assert!(range.contains(range.end));
        assert!(!range.contains(utc("2024-03-16T00:00:00Z")));
    }

    #[test]
    fn resolve_zone_parses_fixed_offset() {
        let zone = resolve_zone(Some("+05:30"));
        assert_eq!(zone.local_minus_utc(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn resolve_zone_defaults_to_utc_when_unset() {
        assert_eq!(resolve_zone(None).local_minus_utc(), 0);
        assert_eq!(resolve_zone(Some("  ")).local_minus_utc(), 0);
    }

    #[test]
    fn resolve_zone_falls_back_on_garbage() {
        assert_eq!(resolve_zone(Some("Mars/Olympus")).local_minus_utc(), 0);
    }
}
