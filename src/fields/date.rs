//! Compact natural-language date parser
//!
//! Understands absolute dates (`2026-10-25 09:00`, `25.10.2026 9:00`,
//! `25.10 18:30`), relative days (`today`, `tomorrow`, weekday names with an
//! optional `next`) and 12/24-hour times (`9am`, `9:30 pm`, `18:00`, `noon`).
//! Everything is interpreted as a naive wall-clock time; callers attach the
//! zone.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::Regex;
use std::sync::LazyLock;

/// Time used when only a day is given
const DEFAULT_HOUR: u32 = 12;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<day>.*?)\s+)?(?:at\s+)?(?P<time>noon|midnight|\d{1,2}(?::\d{2})?\s*(?:am|pm)?)$")
        .expect("invalid time pattern")
});

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<h>\d{1,2})(?::(?P<m>\d{2}))?\s*(?P<ampm>am|pm)?$")
        .expect("invalid clock pattern")
});

/// Parse `raw` relative to `now`
pub fn parse_naive(raw: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let normalized = raw
        .trim()
        .to_lowercase()
        .replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        return None;
    }

    if let Some(full) = parse_absolute(&normalized) {
        return Some(full);
    }

    let (day_part, time) = match TIME_RE.captures(&normalized) {
        Some(caps) => {
            let time = parse_time(caps.name("time")?.as_str())?;
            let day = caps
                .name("day")
                .map(|m| m.as_str().trim().trim_end_matches(" at").to_string())
                .filter(|d| !d.is_empty());
            (day, Some(time))
        }
        None => (Some(normalized.clone()), None),
    };

    match day_part {
        Some(day) => {
            let date = parse_day(&day, now.date())?;
            let time = time.or_else(|| NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0))?;
            Some(date.and_time(time))
        }
        None => {
            // A bare time means its next occurrence
            let time = time?;
            let today = now.date().and_time(time);
            if today < now {
                Some(today + Duration::days(1))
            } else {
                Some(today)
            }
        }
    }
}

fn parse_absolute(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%d.%m.%Y %H:%M",
        "%d/%m/%Y %H:%M",
    ];
    let upper = raw.to_uppercase();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&upper, fmt).ok())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    match raw {
        "noon" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }
    let caps = CLOCK_RE.captures(raw.trim())?;
    let mut hour: u32 = caps.name("h")?.as_str().parse().ok()?;
    let minute: u32 = match caps.name("m") {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    match caps.name("ampm").map(|m| m.as_str()) {
        Some(suffix) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            hour %= 12;
            if suffix == "pm" {
                hour += 12;
            }
        }
        // A bare number without minutes is too ambiguous to be a time
        None if caps.name("m").is_none() => return None,
        None => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_day(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    match raw {
        "today" | "tonight" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        "day after tomorrow" => return today.succ_opt()?.succ_opt(),
        _ => {}
    }

    let (explicit_next, name) = match raw.strip_prefix("next ") {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix("this ").unwrap_or(raw)),
    };
    if let Some(weekday) = parse_weekday(name) {
        let current = i64::from(today.weekday().num_days_from_monday());
        let target = i64::from(weekday.num_days_from_monday());
        let mut ahead = (target - current).rem_euclid(7);
        if explicit_next && ahead == 0 {
            ahead = 7;
        }
        return today.checked_add_signed(Duration::days(ahead));
    }

    for fmt in ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    // Day and month without a year: the next such date
    for fmt in ["%d.%m", "%d/%m"] {
        let with_year = format!("{raw}.{}", today.year());
        let fmt_with_year = format!("{fmt}.%Y");
        if let Ok(date) = NaiveDate::parse_from_str(&with_year, &fmt_with_year) {
            if date < today {
                return date.with_year(today.year() + 1);
            }
            return Some(date);
        }
    }
    None
}

fn parse_weekday(raw: &str) -> Option<Weekday> {
    let weekday = match raw {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tues" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thur" | "thurs" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wednesday 2026-10-14 15:00
    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_absolute_formats() {
        assert_eq!(parse_naive("2026-10-25 09:00", now()), Some(at(2026, 10, 25, 9, 0)));
        assert_eq!(parse_naive("25.10.2026 18:30", now()), Some(at(2026, 10, 25, 18, 30)));
        assert_eq!(parse_naive("25/10/2026 7:05", now()), Some(at(2026, 10, 25, 7, 5)));
    }

    #[test]
    fn test_relative_days() {
        assert_eq!(parse_naive("tomorrow 9am", now()), Some(at(2026, 10, 15, 9, 0)));
        assert_eq!(parse_naive("Tomorrow at 9:30 PM", now()), Some(at(2026, 10, 15, 21, 30)));
        assert_eq!(parse_naive("today 18:00", now()), Some(at(2026, 10, 14, 18, 0)));
        assert_eq!(parse_naive("tomorrow", now()), Some(at(2026, 10, 15, 12, 0)));
    }

    #[test]
    fn test_weekdays() {
        assert_eq!(parse_naive("saturday 8am", now()), Some(at(2026, 10, 17, 8, 0)));
        assert_eq!(parse_naive("wed 19:00", now()), Some(at(2026, 10, 14, 19, 0)));
        assert_eq!(parse_naive("next wed 19:00", now()), Some(at(2026, 10, 21, 19, 0)));
    }

    #[test]
    fn test_day_month_rolls_into_next_year() {
        assert_eq!(parse_naive("25.10 10:00", now()), Some(at(2026, 10, 25, 10, 0)));
        assert_eq!(parse_naive("02.01 10:00", now()), Some(at(2027, 1, 2, 10, 0)));
    }

    #[test]
    fn test_bare_time_rolls_forward() {
        assert_eq!(parse_naive("9am", now()), Some(at(2026, 10, 15, 9, 0)));
        assert_eq!(parse_naive("noon", now()), Some(at(2026, 10, 15, 12, 0)));
        assert_eq!(parse_naive("16:30", now()), Some(at(2026, 10, 14, 16, 30)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(parse_naive("", now()), None);
        assert_eq!(parse_naive("whenever", now()), None);
        assert_eq!(parse_naive("tomorrow 25:00", now()), None);
        assert_eq!(parse_naive("13pm", now()), None);
    }
}
