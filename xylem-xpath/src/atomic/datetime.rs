//! Date, time and duration values.
//!
//! Chrono supplies the calendar arithmetic; the wrapper types add the
//! XSD notion of an *optional* timezone offset, which chrono's own
//! types cannot express. Values without an offset compare and subtract
//! using the implicit timezone (UTC here).

use std::cmp::Ordering;
use std::fmt;

use chrono::{
    DateTime, Datelike, Duration as TimeDelta, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, TimeZone, Timelike, Utc,
};

use crate::error::{Error, Result};

/// An `xs:duration`: a months part and a seconds part, either of which
/// may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    /// The year/month component in months.
    pub months: i64,
    /// The day/time component.
    pub delta: TimeDelta,
}

impl Duration {
    /// A duration from both components.
    pub fn new(months: i64, delta: TimeDelta) -> Self {
        Self { months, delta }
    }

    /// An `xs:yearMonthDuration`.
    pub fn from_months(months: i64) -> Self {
        Self {
            months,
            delta: TimeDelta::zero(),
        }
    }

    /// An `xs:dayTimeDuration`.
    pub fn from_delta(delta: TimeDelta) -> Self {
        Self { months: 0, delta }
    }

    /// Parse any duration lexical form.
    pub fn parse(lexical: &str) -> Result<Self> {
        parse_duration(lexical)
    }

    pub(crate) fn negate(&self) -> Result<Self> {
        Ok(Self {
            months: self.months.checked_neg().ok_or(Error::FODT0002)?,
            delta: TimeDelta::zero()
                .checked_sub(&self.delta)
                .ok_or(Error::FODT0002)?,
        })
    }

    pub(crate) fn checked_add(&self, other: &Duration) -> Result<Self> {
        Ok(Self {
            months: self.months.checked_add(other.months).ok_or(Error::FODT0002)?,
            delta: self
                .delta
                .checked_add(&other.delta)
                .ok_or(Error::FODT0002)?,
        })
    }

    /// Canonical lexical form for the general duration type.
    pub fn canonical(&self) -> String {
        if self.months == 0 && self.delta.is_zero() {
            return "PT0S".to_string();
        }
        let negative = self.months < 0 || (self.months == 0 && self.delta < TimeDelta::zero());
        let mut out = String::new();
        if negative {
            out.push('-');
        }
        out.push('P');
        let months = self.months.abs();
        if months != 0 {
            let years = months / 12;
            let rem = months % 12;
            if years != 0 {
                out.push_str(&format!("{years}Y"));
            }
            if rem != 0 {
                out.push_str(&format!("{rem}M"));
            }
        }
        let delta = if negative {
            TimeDelta::zero() - self.delta
        } else {
            self.delta
        };
        if !delta.is_zero() {
            out.push_str(&format_delta(delta));
        }
        out
    }

    /// Canonical form when treated as `xs:yearMonthDuration`.
    pub fn canonical_year_month(&self) -> String {
        if self.months == 0 {
            return "P0M".to_string();
        }
        Duration::from_months(self.months).canonical()
    }

    /// Canonical form when treated as `xs:dayTimeDuration`.
    pub fn canonical_day_time(&self) -> String {
        if self.delta.is_zero() {
            return "PT0S".to_string();
        }
        Duration::from_delta(self.delta).canonical()
    }

    /// Total seconds of the day/time part, as a double.
    pub fn total_seconds(&self) -> f64 {
        self.delta.num_milliseconds() as f64 / 1000.0
    }
}

// days/hours/minutes/seconds rendering of a non-negative delta
fn format_delta(delta: TimeDelta) -> String {
    let mut out = String::new();
    let total_millis = delta.num_milliseconds();
    let days = total_millis / 86_400_000;
    let mut rem = total_millis % 86_400_000;
    if days != 0 {
        out.push_str(&format!("{days}D"));
    }
    let hours = rem / 3_600_000;
    rem %= 3_600_000;
    let minutes = rem / 60_000;
    rem %= 60_000;
    let seconds = rem / 1000;
    let millis = rem % 1000;
    if hours != 0 || minutes != 0 || seconds != 0 || millis != 0 {
        out.push('T');
        if hours != 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes != 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds != 0 || millis != 0 {
            if millis != 0 {
                let fractional = format!("{:03}", millis);
                let fractional = fractional.trim_end_matches('0');
                out.push_str(&format!("{seconds}.{fractional}S"));
            } else {
                out.push_str(&format!("{seconds}S"));
            }
        }
    }
    out
}

fn parse_duration(lexical: &str) -> Result<Duration> {
    let s = lexical.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let s = s.strip_prefix('P').ok_or(Error::FORG0001)?;
    let (date_part, time_part) = match s.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (s, None),
    };
    if date_part.is_empty() && time_part.map_or(true, |t| t.is_empty()) {
        return Err(Error::FORG0001);
    }
    let mut months: i64 = 0;
    let mut delta = TimeDelta::zero();
    let mut rest = date_part;
    for (designator, factor) in [('Y', 12i64), ('M', 1), ('D', 0)] {
        if let Some(pos) = rest.find(designator) {
            let digits = &rest[..pos];
            let value: i64 = digits.parse().map_err(|_| Error::FORG0001)?;
            if designator == 'D' {
                delta = delta
                    .checked_add(&TimeDelta::try_days(value).ok_or(Error::FODT0002)?)
                    .ok_or(Error::FODT0002)?;
            } else {
                months = months
                    .checked_add(value.checked_mul(factor).ok_or(Error::FODT0002)?)
                    .ok_or(Error::FODT0002)?;
            }
            rest = &rest[pos + 1..];
        }
    }
    if !rest.is_empty() {
        return Err(Error::FORG0001);
    }
    if let Some(time) = time_part {
        let mut rest = time;
        for designator in ['H', 'M', 'S'] {
            if let Some(pos) = rest.find(designator) {
                let digits = &rest[..pos];
                let add = match designator {
                    'H' => {
                        let value: i64 = digits.parse().map_err(|_| Error::FORG0001)?;
                        TimeDelta::try_hours(value).ok_or(Error::FODT0002)?
                    }
                    'M' => {
                        let value: i64 = digits.parse().map_err(|_| Error::FORG0001)?;
                        TimeDelta::try_minutes(value).ok_or(Error::FODT0002)?
                    }
                    _ => {
                        let value: f64 = digits.parse().map_err(|_| Error::FORG0001)?;
                        if !value.is_finite() || value < 0.0 {
                            return Err(Error::FORG0001);
                        }
                        TimeDelta::try_milliseconds((value * 1000.0).round() as i64)
                            .ok_or(Error::FODT0002)?
                    }
                };
                delta = delta.checked_add(&add).ok_or(Error::FODT0002)?;
                rest = &rest[pos + 1..];
            }
        }
        if rest.is_empty() && time.is_empty() {
            return Err(Error::FORG0001);
        }
        if !rest.is_empty() {
            return Err(Error::FORG0001);
        }
    }
    if negative {
        months = -months;
        delta = TimeDelta::zero() - delta;
    }
    Ok(Duration { months, delta })
}

/// An `xs:dateTime` with an optional timezone offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NaiveDateTimeWithOffset {
    /// The local date and time.
    pub date_time: NaiveDateTime,
    /// The timezone offset, if the lexical form carried one.
    pub offset: Option<FixedOffset>,
}

/// An `xs:date` with an optional timezone offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NaiveDateWithOffset {
    /// The local date.
    pub date: NaiveDate,
    /// The timezone offset, if any.
    pub offset: Option<FixedOffset>,
}

/// An `xs:time` with an optional timezone offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NaiveTimeWithOffset {
    /// The local time.
    pub time: NaiveTime,
    /// The timezone offset, if any.
    pub offset: Option<FixedOffset>,
}

/// A Gregorian partial date (`xs:gYear`, `xs:gYearMonth`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gregorian {
    /// Year, when the type carries one.
    pub year: Option<i32>,
    /// Month, when the type carries one.
    pub month: Option<u32>,
    /// Day, when the type carries one.
    pub day: Option<u32>,
    /// Timezone offset, if any.
    pub offset: Option<FixedOffset>,
}

impl NaiveDateTimeWithOffset {
    /// Construct from parts.
    pub fn new(date_time: NaiveDateTime, offset: Option<FixedOffset>) -> Self {
        Self { date_time, offset }
    }

    /// Parse the `xs:dateTime` lexical form.
    pub fn parse(lexical: &str) -> Result<Self> {
        let s = lexical.trim();
        let t = s.find('T').ok_or(Error::FORG0001)?;
        let date = parse_date_piece(&s[..t])?;
        let (time, offset) = parse_time_piece(&s[t + 1..])?;
        Ok(Self {
            date_time: NaiveDateTime::new(date, time),
            offset,
        })
    }

    /// The instant this value denotes, using UTC for a missing offset.
    pub fn to_instant(&self) -> DateTime<Utc> {
        match self.offset {
            Some(offset) => match offset.from_local_datetime(&self.date_time).single() {
                Some(dt) => dt.with_timezone(&Utc),
                None => Utc.from_utc_datetime(&self.date_time),
            },
            None => Utc.from_utc_datetime(&self.date_time),
        }
    }

    /// Canonical lexical form.
    pub fn canonical(&self) -> String {
        format!(
            "{}T{}{}",
            format_date(self.date_time.date()),
            format_time(self.date_time.time()),
            format_offset(self.offset)
        )
    }
}

impl NaiveDateWithOffset {
    /// Parse the `xs:date` lexical form.
    pub fn parse(lexical: &str) -> Result<Self> {
        let s = lexical.trim();
        let (date_str, offset) = split_offset(s);
        let date = parse_date_piece(date_str)?;
        let offset = parse_offset(offset)?;
        Ok(Self { date, offset })
    }

    /// Canonical lexical form.
    pub fn canonical(&self) -> String {
        format!("{}{}", format_date(self.date), format_offset(self.offset))
    }

    pub(crate) fn at_midnight(&self) -> NaiveDateTimeWithOffset {
        NaiveDateTimeWithOffset {
            date_time: NaiveDateTime::new(
                self.date,
                NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            ),
            offset: self.offset,
        }
    }
}

impl NaiveTimeWithOffset {
    /// Parse the `xs:time` lexical form.
    pub fn parse(lexical: &str) -> Result<Self> {
        let (time, offset) = parse_time_piece(lexical.trim())?;
        Ok(Self { time, offset })
    }

    /// Canonical lexical form.
    pub fn canonical(&self) -> String {
        format!("{}{}", format_time(self.time), format_offset(self.offset))
    }
}

impl Gregorian {
    /// Parse one of the Gregorian lexical forms, selected by which
    /// components the target type carries.
    pub fn parse(lexical: &str, year: bool, month: bool, day: bool) -> Result<Self> {
        let s = lexical.trim();
        let (body, offset) = split_offset(s);
        let offset = parse_offset(offset)?;
        let mut result = Gregorian {
            year: None,
            month: None,
            day: None,
            offset,
        };
        let mut rest = body;
        if year {
            // a year is at least 4 digits, optionally negative
            let negative = rest.starts_with('-');
            let digits_start = if negative { 1 } else { 0 };
            let end = rest[digits_start..]
                .find(|c: char| !c.is_ascii_digit())
                .map(|i| i + digits_start)
                .unwrap_or(rest.len());
            let year_value: i32 = rest[..end].parse().map_err(|_| Error::FORG0001)?;
            result.year = Some(year_value);
            rest = &rest[end..];
        } else {
            rest = rest.strip_prefix("--").ok_or(Error::FORG0001)?;
            // put back one '-' separator handling below
            return parse_gregorian_md(rest, month, day, result);
        }
        if month {
            rest = rest.strip_prefix('-').ok_or(Error::FORG0001)?;
            if rest.len() < 2 {
                return Err(Error::FORG0001);
            }
            let month_value: u32 = rest[..2].parse().map_err(|_| Error::FORG0001)?;
            if !(1..=12).contains(&month_value) {
                return Err(Error::FORG0001);
            }
            result.month = Some(month_value);
            rest = &rest[2..];
        }
        if !rest.is_empty() {
            return Err(Error::FORG0001);
        }
        Ok(result)
    }

    /// Canonical lexical form, reconstructed from the components.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), None) => out.push_str(&format!("{y:04}-{m:02}")),
            (Some(y), None, None) => out.push_str(&format!("{y:04}")),
            (None, Some(m), Some(d)) => out.push_str(&format!("--{m:02}-{d:02}")),
            (None, Some(m), None) => out.push_str(&format!("--{m:02}")),
            (None, None, Some(d)) => out.push_str(&format!("---{d:02}")),
            _ => {}
        }
        out.push_str(&format_offset(self.offset));
        out
    }
}

fn parse_gregorian_md(
    rest: &str,
    month: bool,
    day: bool,
    mut result: Gregorian,
) -> Result<Gregorian> {
    let mut rest = rest;
    if month {
        if rest.len() < 2 {
            return Err(Error::FORG0001);
        }
        let month_value: u32 = rest[..2].parse().map_err(|_| Error::FORG0001)?;
        if !(1..=12).contains(&month_value) {
            return Err(Error::FORG0001);
        }
        result.month = Some(month_value);
        rest = &rest[2..];
        if day {
            rest = rest.strip_prefix('-').ok_or(Error::FORG0001)?;
        }
    } else {
        // gDay: ---DD
        rest = rest.strip_prefix('-').ok_or(Error::FORG0001)?;
    }
    if day {
        if rest.len() < 2 {
            return Err(Error::FORG0001);
        }
        let day_value: u32 = rest[..2].parse().map_err(|_| Error::FORG0001)?;
        if !(1..=31).contains(&day_value) {
            return Err(Error::FORG0001);
        }
        result.day = Some(day_value);
        rest = &rest[2..];
    }
    if !rest.is_empty() {
        return Err(Error::FORG0001);
    }
    Ok(result)
}

fn parse_date_piece(s: &str) -> Result<NaiveDate> {
    // [-]YYYY-MM-DD with at least four year digits
    let negative = s.starts_with('-');
    let body = if negative { &s[1..] } else { s };
    let mut parts = body.splitn(3, '-');
    let (y, m, d) = match (parts.next(), parts.next(), parts.next()) {
        (Some(y), Some(m), Some(d)) => (y, m, d),
        _ => return Err(Error::FORG0001),
    };
    if y.len() < 4 || m.len() != 2 || d.len() != 2 {
        return Err(Error::FORG0001);
    }
    let mut year: i32 = y.parse().map_err(|_| Error::FORG0001)?;
    if negative {
        year = -year;
    }
    let month: u32 = m.parse().map_err(|_| Error::FORG0001)?;
    let day: u32 = d.parse().map_err(|_| Error::FORG0001)?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or(Error::FORG0001)
}

fn parse_time_piece(s: &str) -> Result<(NaiveTime, Option<FixedOffset>)> {
    let (body, offset) = split_offset(s);
    let offset = parse_offset(offset)?;
    let mut parts = body.splitn(3, ':');
    let (h, m, rest) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(rest)) => (h, m, rest),
        _ => return Err(Error::FORG0001),
    };
    if h.len() != 2 || m.len() != 2 {
        return Err(Error::FORG0001);
    }
    let hour: u32 = h.parse().map_err(|_| Error::FORG0001)?;
    let minute: u32 = m.parse().map_err(|_| Error::FORG0001)?;
    let (sec_str, nanos) = match rest.split_once('.') {
        Some((sec, frac)) => {
            let digits: String = frac.chars().take(9).collect();
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::FORG0001);
            }
            let mut value: u64 = digits.parse().map_err(|_| Error::FORG0001)?;
            for _ in digits.len()..9 {
                value *= 10;
            }
            (sec, value as u32)
        }
        None => (rest, 0),
    };
    if sec_str.len() != 2 {
        return Err(Error::FORG0001);
    }
    let second: u32 = sec_str.parse().map_err(|_| Error::FORG0001)?;
    let time =
        NaiveTime::from_hms_nano_opt(hour, minute, second, nanos).ok_or(Error::FORG0001)?;
    Ok((time, offset))
}

// split a trailing timezone designator off a lexical form
fn split_offset(s: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = s.strip_suffix('Z') {
        return (stripped, Some("Z"));
    }
    // find '+' or '-' introducing ±HH:MM; '-' may also be a date
    // separator, so only the last 6 characters qualify
    if s.len() >= 6 {
        let tail = &s[s.len() - 6..];
        if (tail.starts_with('+') || tail.starts_with('-')) && tail.as_bytes()[3] == b':' {
            return (&s[..s.len() - 6], Some(tail));
        }
    }
    (s, None)
}

fn parse_offset(offset: Option<&str>) -> Result<Option<FixedOffset>> {
    let offset = match offset {
        Some(offset) => offset,
        None => return Ok(None),
    };
    if offset == "Z" {
        return Ok(Some(FixedOffset::east_opt(0).unwrap()));
    }
    let negative = offset.starts_with('-');
    let hours: i32 = offset[1..3].parse().map_err(|_| Error::FODT0003)?;
    let minutes: i32 = offset[4..6].parse().map_err(|_| Error::FODT0003)?;
    if hours > 14 || minutes > 59 {
        return Err(Error::FODT0003);
    }
    let mut seconds = hours * 3600 + minutes * 60;
    if negative {
        seconds = -seconds;
    }
    FixedOffset::east_opt(seconds).map(Some).ok_or(Error::FODT0003)
}

fn format_date(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

fn format_time(time: NaiveTime) -> String {
    let base = format!(
        "{:02}:{:02}:{:02}",
        time.hour(),
        time.minute(),
        time.second()
    );
    let nanos = time.nanosecond();
    if nanos == 0 {
        base
    } else {
        let fractional = format!("{:09}", nanos);
        let fractional = fractional.trim_end_matches('0');
        format!("{base}.{fractional}")
    }
}

fn format_offset(offset: Option<FixedOffset>) -> String {
    match offset {
        None => String::new(),
        Some(offset) => {
            let seconds = offset.fix().local_minus_utc();
            if seconds == 0 {
                "Z".to_string()
            } else {
                let sign = if seconds < 0 { '-' } else { '+' };
                let abs = seconds.abs();
                format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
            }
        }
    }
}

/// Compare two instants, using UTC for missing offsets.
pub(crate) fn compare_date_times(
    a: &NaiveDateTimeWithOffset,
    b: &NaiveDateTimeWithOffset,
) -> Ordering {
    a.to_instant().cmp(&b.to_instant())
}

/// Add a duration to a date/time: months first, then the exact delta.
pub(crate) fn add_duration_to_date_time(
    value: &NaiveDateTimeWithOffset,
    duration: &Duration,
) -> Result<NaiveDateTimeWithOffset> {
    let with_months = add_months(value.date_time, duration.months)?;
    let date_time = with_months
        .checked_add_signed(duration.delta)
        .ok_or(Error::FODT0001)?;
    Ok(NaiveDateTimeWithOffset {
        date_time,
        offset: value.offset,
    })
}

pub(crate) fn add_months(date_time: NaiveDateTime, months: i64) -> Result<NaiveDateTime> {
    if months == 0 {
        return Ok(date_time);
    }
    let date = date_time.date();
    let total = date.year() as i64 * 12 + date.month0() as i64 + months;
    let year: i32 = (total.div_euclid(12)).try_into().map_err(|_| Error::FODT0001)?;
    let month = total.rem_euclid(12) as u32 + 1;
    // clamp the day to the target month's length
    let mut day = date.day();
    let new_date = loop {
        match NaiveDate::from_ymd_opt(year, month, day) {
            Some(d) => break d,
            None => {
                if day <= 28 {
                    return Err(Error::FODT0001);
                }
                day -= 1;
            }
        }
    };
    Ok(NaiveDateTime::new(new_date, date_time.time()))
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_round_trip() {
        let d = Duration::parse("P1Y2M3DT4H5M6.5S").unwrap();
        assert_eq!(d.months, 14);
        assert_eq!(d.canonical(), "P1Y2M3DT4H5M6.5S");
        assert_eq!(Duration::parse("PT0S").unwrap().canonical(), "PT0S");
        assert_eq!(Duration::parse("-P1M").unwrap().canonical(), "-P1M");
    }

    #[test]
    fn date_time_parse_and_canonical() {
        let dt = NaiveDateTimeWithOffset::parse("2023-04-05T06:07:08+02:00").unwrap();
        assert_eq!(dt.canonical(), "2023-04-05T06:07:08+02:00");
        let z = NaiveDateTimeWithOffset::parse("2023-04-05T06:07:08Z").unwrap();
        assert_eq!(z.canonical(), "2023-04-05T06:07:08Z");
        let plain = NaiveDateTimeWithOffset::parse("2023-04-05T06:07:08.250").unwrap();
        assert_eq!(plain.canonical(), "2023-04-05T06:07:08.25");
    }

    #[test]
    fn date_time_comparison_uses_offsets() {
        let a = NaiveDateTimeWithOffset::parse("2023-04-05T12:00:00+02:00").unwrap();
        let b = NaiveDateTimeWithOffset::parse("2023-04-05T10:00:00Z").unwrap();
        assert_eq!(compare_date_times(&a, &b), Ordering::Equal);
    }

    #[test]
    fn add_year_month_duration_clamps_days() {
        let dt = NaiveDateTimeWithOffset::parse("2024-01-31T00:00:00").unwrap();
        let d = Duration::parse("P1M").unwrap();
        let result = add_duration_to_date_time(&dt, &d).unwrap();
        assert_eq!(result.canonical(), "2024-02-29T00:00:00");
    }

    #[test]
    fn gregorian_forms() {
        let g = Gregorian::parse("2023-04", true, true, false).unwrap();
        assert_eq!(g.canonical(), "2023-04");
        let g = Gregorian::parse("--04-05", false, true, true).unwrap();
        assert_eq!(g.canonical(), "--04-05");
        let g = Gregorian::parse("---05Z", false, false, true).unwrap();
        assert_eq!(g.canonical(), "---05Z");
    }
}
