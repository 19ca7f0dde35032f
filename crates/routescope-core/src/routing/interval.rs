//! Compiled time intervals for mute/active route windows

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::models::{TimeIntervalConfig, TimeRangeConfig, TimeSpecConfig};

const WEEKDAYS: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Time zone a spec is evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// The host's local time zone
    Local,
    /// An IANA zone such as `Europe/Paris`; `UTC` when not declared
    Zone(Tz),
}

impl Default for Location {
    fn default() -> Self {
        Self::Zone(Tz::UTC)
    }
}

impl Location {
    fn parse(name: Option<&str>) -> Result<Self, String> {
        match name.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some("Local") => Ok(Self::Local),
            Some(name) => name
                .parse::<Tz>()
                .map(Self::Zone)
                .map_err(|e| format!("unknown location '{name}': {e}")),
        }
    }
}

/// A named interval: active when any of its specs is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeInterval {
    specs: Vec<TimeSpec>,
}

/// One alternative; every non-empty field must match
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeSpec {
    /// Minutes since midnight, end exclusive
    times: Vec<(u32, u32)>,
    /// Days from Sunday
    weekdays: Vec<RangeInclusive<u32>>,
    /// Negative values count back from the last day of the month
    days_of_month: Vec<(i32, i32)>,
    months: Vec<RangeInclusive<u32>>,
    years: Vec<RangeInclusive<i32>>,
    location: Location,
}

impl TimeInterval {
    /// Compile a document definition, reporting the first problem found
    pub fn compile(config: &TimeIntervalConfig) -> Result<Self, String> {
        let specs = config
            .time_intervals
            .iter()
            .map(TimeSpec::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { specs })
    }

    /// Whether the interval covers `at`
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.specs.iter().any(|spec| spec.contains(at))
    }
}

impl TimeSpec {
    fn compile(config: &TimeSpecConfig) -> Result<Self, String> {
        Ok(Self {
            times: config
                .times
                .iter()
                .map(parse_time_range)
                .collect::<Result<_, _>>()?,
            weekdays: config
                .weekdays
                .iter()
                .map(|s| parse_range(s, |v| parse_named(v, &WEEKDAYS, 0), "weekday"))
                .collect::<Result<_, _>>()?,
            days_of_month: config
                .days_of_month
                .iter()
                .map(|s| parse_day_range(s))
                .collect::<Result<_, _>>()?,
            months: config
                .months
                .iter()
                .map(|s| parse_range(s, |v| parse_named(v, &MONTHS, 1), "month"))
                .collect::<Result<_, _>>()?,
            years: config
                .years
                .iter()
                .map(|s| parse_range(s, |v| v.parse::<i32>().ok(), "year"))
                .collect::<Result<_, _>>()?,
            location: Location::parse(config.location.as_deref())?,
        })
    }

    fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = match self.location {
            Location::Local => at.with_timezone(&Local).naive_local(),
            Location::Zone(tz) => at.with_timezone(&tz).naive_local(),
        };

        self.matches_time(&local)
            && self.matches_weekday(&local)
            && self.matches_day_of_month(&local)
            && self.matches_month(&local)
            && self.matches_year(&local)
    }

    fn matches_time(&self, at: &NaiveDateTime) -> bool {
        let minute = at.hour() * 60 + at.minute();
        self.times.is_empty()
            || self
                .times
                .iter()
                .any(|&(start, end)| minute >= start && minute < end)
    }

    fn matches_weekday(&self, at: &NaiveDateTime) -> bool {
        let day = at.weekday().num_days_from_sunday();
        self.weekdays.is_empty() || self.weekdays.iter().any(|r| r.contains(&day))
    }

    fn matches_day_of_month(&self, at: &NaiveDateTime) -> bool {
        if self.days_of_month.is_empty() {
            return true;
        }

        let last = days_in_month(at.year(), at.month()) as i32;
        let day = at.day() as i32;
        let resolve = |d: i32| if d < 0 { last + d + 1 } else { d };

        self.days_of_month.iter().any(|&(start, end)| {
            let (start, end) = (resolve(start).max(1), resolve(end).min(last));
            day >= start && day <= end
        })
    }

    fn matches_month(&self, at: &NaiveDateTime) -> bool {
        let month = at.month();
        self.months.is_empty() || self.months.iter().any(|r| r.contains(&month))
    }

    fn matches_year(&self, at: &NaiveDateTime) -> bool {
        let year = at.year();
        self.years.is_empty() || self.years.iter().any(|r| r.contains(&year))
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(31, |d| d.day())
}

fn parse_clock(raw: &str) -> Result<u32, String> {
    let invalid = || format!("invalid time '{raw}', expected HH:MM");
    let (hours, minutes) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;

    if minutes > 59 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

fn parse_time_range(range: &TimeRangeConfig) -> Result<(u32, u32), String> {
    let start = parse_clock(&range.start_time)?;
    let end = parse_clock(&range.end_time)?;
    if start >= end {
        return Err(format!(
            "start_time {} must be before end_time {}",
            range.start_time, range.end_time
        ));
    }
    Ok((start, end))
}

/// Case-insensitive name lookup, falling back to a number within the table
fn parse_named(raw: &str, names: &[&str], first: u32) -> Option<u32> {
    let lowered = raw.trim().to_ascii_lowercase();
    if let Some(pos) = names.iter().position(|n| *n == lowered) {
        return u32::try_from(pos).ok().map(|p| p + first);
    }
    let last = first + u32::try_from(names.len()).ok()? - 1;
    lowered
        .parse::<u32>()
        .ok()
        .filter(|n| (first..=last).contains(n))
}

/// Parse `a` or `a:b` into an inclusive range
fn parse_range<T, F>(raw: &str, parse: F, what: &str) -> Result<RangeInclusive<T>, String>
where
    T: PartialOrd + Copy,
    F: Fn(&str) -> Option<T>,
{
    let value = |s: &str| parse(s).ok_or_else(|| format!("invalid {what} '{s}'"));
    let (start, end) = match raw.split_once(':') {
        Some((start, end)) => (value(start)?, value(end)?),
        None => {
            let single = value(raw)?;
            (single, single)
        }
    };
    if start > end {
        return Err(format!("{what} range '{raw}' ends before it starts"));
    }
    Ok(start..=end)
}

fn parse_day_range(raw: &str) -> Result<(i32, i32), String> {
    let day = |s: &str| {
        s.trim()
            .parse::<i32>()
            .ok()
            .filter(|d| *d != 0 && (-31..=31).contains(d))
            .ok_or_else(|| format!("invalid day of month '{s}'"))
    };
    let (start, end) = match raw.split_once(':') {
        Some((start, end)) => (day(start)?, day(end)?),
        None => {
            let single = day(raw)?;
            (single, single)
        }
    };
    // Mixed signs can only be compared once a month is known
    if start.signum() == end.signum() && start > end {
        return Err(format!("day of month range '{raw}' ends before it starts"));
    }
    Ok((start, end))
}
