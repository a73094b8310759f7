//! FILETIME handling and fixed-zone timestamp rendering.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

/// 100-nanosecond intervals since 1601-01-01 00:00:00 UTC.
///
/// Zero means "not set" throughout the NTFS artifacts; it renders as the
/// empty string, never a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Filetime(pub u64);

impl Filetime {
    pub const ZERO: Filetime = Filetime(0);

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// UTC instant, or `None` for zero and out-of-range values.
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.0 == 0 {
            return None;
        }
        let seconds = (self.0 / 10_000_000) as i64;
        let nanos = ((self.0 % 10_000_000) * 100) as i64;
        let epoch = Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).single()?;
        epoch
            .checked_add_signed(Duration::seconds(seconds))?
            .checked_add_signed(Duration::nanoseconds(nanos))
    }
}

/// The default rendering zone, UTC+9.
#[must_use]
pub fn default_zone() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("static offset is in range")
}

/// Renders a FILETIME as `YYYY-MM-DD HH:MM:SS` in the given zone. Zero and
/// out-of-range values render as the empty string.
#[must_use]
pub fn format_filetime(ft: Filetime, zone: &FixedOffset) -> String {
    match ft.to_datetime() {
        Some(dt) => dt
            .with_timezone(zone)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => String::new(),
    }
}

/// Parses a fixed offset: `+09:00`, `-05:30`, or bare hours like `9` / `-5`.
#[must_use]
pub fn parse_zone(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn zero_filetime_renders_empty() {
        assert_eq!(format_filetime(Filetime::ZERO, &default_zone()), "");
    }

    #[test]
    fn known_filetime_renders_in_utc() {
        // 2020-01-01 00:00:00 UTC.
        let ft = Filetime(132_223_104_000_000_000);
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(format_filetime(ft, &utc), "2020-01-01 00:00:00");
    }

    #[test]
    fn default_zone_is_nine_hours_ahead() {
        let ft = Filetime(132_223_104_000_000_000);
        assert_eq!(format_filetime(ft, &default_zone()), "2020-01-01 09:00:00");
    }

    #[test]
    fn out_of_range_filetime_renders_empty() {
        assert_eq!(format_filetime(Filetime(u64::MAX), &default_zone()), "");
    }

    #[test]
    fn render_round_trips_at_second_resolution() {
        let zone = default_zone();
        let ft = Filetime(132_223_104_123_456_700);
        let rendered = format_filetime(ft, &zone);
        let parsed = NaiveDateTime::parse_from_str(&rendered, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_local_timezone(zone)
            .unwrap();
        let expected = ft.to_datetime().unwrap();
        assert_eq!(parsed.timestamp(), expected.timestamp());
        assert_eq!(format_filetime(ft, &zone), rendered);
    }

    #[test]
    fn parse_zone_forms() {
        assert_eq!(parse_zone("+09:00"), FixedOffset::east_opt(9 * 3600));
        assert_eq!(parse_zone("-05:30"), FixedOffset::east_opt(-(5 * 3600 + 1800)));
        assert_eq!(parse_zone("9"), FixedOffset::east_opt(9 * 3600));
        assert_eq!(parse_zone("0"), FixedOffset::east_opt(0));
        assert_eq!(parse_zone("+15:00"), None);
        assert_eq!(parse_zone("abc"), None);
    }
}
