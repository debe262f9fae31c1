//! Cron schedules for the receive adapter.
//!
//! Accepts the standard five field format (`minute hour day-of-month month
//! day-of-week`) plus the usual `@daily`-style descriptors and `@every <duration>`.
//! All evaluation happens in UTC.

use crate::{
    duration,
    error::{Error, Result},
};
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, Timelike, Utc};

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Give up looking for an activation this many years past the start.
const MAX_YEARS_AHEAD: i32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Schedule {
    Cron(CronSpec),
    Every(Duration),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSpec {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_star: bool,
    dow_star: bool,
}

struct FieldRange {
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Offset applied to the index of a name to get its value.
    name_base: u32,
    /// `?` stands for "no specific value", only meaningful for the day fields
    allows_question: bool,
}

const MINUTES: FieldRange = FieldRange {
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
    allows_question: false,
};
const HOURS: FieldRange = FieldRange {
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
    allows_question: false,
};
const DAYS_OF_MONTH: FieldRange = FieldRange {
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
    allows_question: true,
};
const MONTHS: FieldRange = FieldRange {
    min: 1,
    max: 12,
    names: MONTH_NAMES,
    name_base: 1,
    allows_question: false,
};
// 7 is accepted as an alias for Sunday and folded into bit 0
const DAYS_OF_WEEK: FieldRange = FieldRange {
    min: 0,
    max: 7,
    names: DAY_NAMES,
    name_base: 0,
    allows_question: true,
};

impl Schedule {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let invalid = |reason: &str| Error::InvalidSchedule {
            schedule: spec.to_string(),
            reason: reason.to_string(),
        };

        if spec.is_empty() {
            return Err(invalid("empty schedule"));
        }

        if let Some(descriptor) = spec.strip_prefix('@') {
            if let Some(every) = descriptor.strip_prefix("every ") {
                let delay = duration::parse(every).map_err(|_| invalid("invalid @every duration"))?;
                if delay < Duration::seconds(1) {
                    return Err(invalid("@every duration must be at least 1s"));
                }
                // sub-second precision is dropped
                return Ok(Schedule::Every(Duration::seconds(delay.num_seconds())));
            }
            let expanded = match descriptor {
                "yearly" | "annually" => "0 0 1 1 *",
                "monthly" => "0 0 1 * *",
                "weekly" => "0 0 * * 0",
                "daily" | "midnight" => "0 0 * * *",
                "hourly" => "0 * * * *",
                _ => return Err(invalid("unrecognized descriptor")),
            };
            return Self::parse(expanded);
        }

        let fields: Vec<&str> = spec.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(&format!("expected 5 fields, found {}", fields.len())));
        }

        let (minutes, _) = parse_field(fields[0], &MINUTES).map_err(|e| invalid(&e))?;
        let (hours, _) = parse_field(fields[1], &HOURS).map_err(|e| invalid(&e))?;
        let (days_of_month, dom_star) =
            parse_field(fields[2], &DAYS_OF_MONTH).map_err(|e| invalid(&e))?;
        let (months, _) = parse_field(fields[3], &MONTHS).map_err(|e| invalid(&e))?;
        let (mut days_of_week, dow_star) =
            parse_field(fields[4], &DAYS_OF_WEEK).map_err(|e| invalid(&e))?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Schedule::Cron(CronSpec {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_star,
            dow_star,
        }))
    }

    /// First activation strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Every(delay) => {
                let truncated = after.with_nanosecond(0)?;
                truncated.checked_add_signed(*delay)
            }
            Schedule::Cron(spec) => spec.next_after(after),
        }
    }
}

impl CronSpec {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = after.with_nanosecond(0)?.with_second(0)? + Duration::minutes(1);
        let year_limit = t.year() + MAX_YEARS_AHEAD;

        'wrap: loop {
            if t.year() > year_limit {
                return None;
            }

            while !has(self.months, t.month()) {
                t = start_of_next_month(t)?;
                if t.year() > year_limit {
                    return None;
                }
            }

            while !self.day_matches(t) {
                t = start_of_next_day(t)?;
                if t.day() == 1 {
                    continue 'wrap;
                }
            }

            while !has(self.hours, t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                if t.hour() == 0 {
                    continue 'wrap;
                }
            }

            while !has(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                if t.minute() == 0 {
                    continue 'wrap;
                }
            }

            return Some(t);
        }
    }

    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom = has(self.days_of_month, t.day());
        let dow = has(self.days_of_week, t.weekday().num_days_from_sunday());
        if self.dom_star || self.dow_star {
            dom && dow
        } else {
            dom || dow
        }
    }
}

fn has(bits: u64, value: u32) -> bool {
    bits & (1u64 << value) != 0
}

fn start_of_next_day(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(
        t.date_naive()
            .checked_add_days(Days::new(1))?
            .and_hms_opt(0, 0, 0)?
            .and_utc(),
    )
}

fn start_of_next_month(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Some(NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Parse one cron field into a bit set. The flag reports whether the field
/// was an unrestricted `*` (or `?` in the day fields), which matters for day
/// matching.
fn parse_field(field: &str, range: &FieldRange) -> std::result::Result<(u64, bool), String> {
    let mut bits = 0u64;
    let mut star = false;

    for part in field.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| format!("invalid step {:?}", s))?;
                if step == 0 {
                    return Err("step must be positive".to_string());
                }
                (r, Some(step))
            }
            None => (part, None),
        };

        if range_part == "?" && !range.allows_question {
            return Err("? is only allowed in the day fields".to_string());
        }

        let (start, end) = if range_part == "*" || range_part == "?" {
            if step.unwrap_or(1) == 1 {
                star = true;
            }
            (range.min, range.max)
        } else if let Some((lo, hi)) = range_part.split_once('-') {
            (parse_value(lo, range)?, parse_value(hi, range)?)
        } else {
            let value = parse_value(range_part, range)?;
            // "5/10" means starting at 5 through the end of the range
            (value, if step.is_some() { range.max } else { value })
        };

        if start > end {
            return Err(format!("range {}-{} is backwards", start, end));
        }

        let step = step.unwrap_or(1);
        let mut value = start;
        while value <= end {
            bits |= 1 << value;
            value = match value.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    }

    Ok((bits, star))
}

fn parse_value(s: &str, range: &FieldRange) -> std::result::Result<u32, String> {
    let lower = s.to_ascii_lowercase();
    let value = match range.names.iter().position(|n| *n == lower) {
        Some(idx) => idx as u32 + range.name_base,
        None => s.parse().map_err(|_| format!("invalid value {:?}", s))?,
    };
    if value < range.min || value > range.max {
        return Err(format!(
            "value {} out of range [{}, {}]",
            value, range.min, range.max
        ));
    }
    Ok(value)
}
