//! Task schedules and next-run evaluation
//!
//! A task is scheduled by exactly one of:
//! - **Cron**: a five-field (`min hour dom mon dow`) or six-field
//!   (`sec min hour dom mon dow`) expression, Unix day-of-week numbering.
//!   As in Unix cron, when both day fields are restricted a day matching
//!   either one fires
//! - **Frequency**: a key from the fixed [`frequencies`] catalog, optionally
//!   parameterized (`dailyAt 13:00`)
//!
//! [`ExpressionEvaluator`] turns either form into the next trigger instant,
//! evaluated in the task's timezone so DST shifts follow wall-clock intent.

mod frequency;


use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

pub use frequency::{frequencies, lookup_frequency, Frequency};

/// Schedule of a task. Exactly one representation is ever active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Cron expression (e.g. "0 9 * * 1-5" for 9 AM on weekdays)
    Cron {
        /// Five- or six-field expression
        expression: String,
    },
    /// Named frequency from the catalog
    Frequency {
        /// Canonical catalog key (e.g. "everyFiveMinutes")
        interval: String,
        /// Positional parameters for parameterized entries
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        parameters: Vec<String>,
    },
}

impl Schedule {
    /// Create a cron schedule
    pub fn cron(expression: impl Into<String>) -> Self {
        Self::Cron {
            expression: expression.into(),
        }
    }

    /// Create a parameterless frequency schedule
    pub fn frequency(interval: impl Into<String>) -> Self {
        Self::Frequency {
            interval: interval.into(),
            parameters: Vec::new(),
        }
    }

    /// Create a parameterized frequency schedule
    pub fn frequency_with(interval: impl Into<String>, parameters: Vec<String>) -> Self {
        Self::Frequency {
            interval: interval.into(),
            parameters,
        }
    }

    /// Build a schedule from the two optional inputs an admin form submits.
    ///
    /// Blank values count as absent. Supplying both or neither is a
    /// [`SchedulerError::ScheduleConflict`].
    pub fn from_parts(
        expression: Option<&str>,
        frequency: Option<&str>,
        parameters: Vec<String>,
    ) -> Result<Self> {
        let expression = expression.map(str::trim).filter(|s| !s.is_empty());
        let frequency = frequency.map(str::trim).filter(|s| !s.is_empty());

        match (expression, frequency) {
            (Some(expression), None) => {
                if !parameters.is_empty() {
                    return Err(SchedulerError::ScheduleConflict(
                        "frequency parameters given for a cron schedule".to_string(),
                    ));
                }
                Ok(Self::cron(expression))
            }
            (None, Some(interval)) => Ok(Self::frequency_with(interval, parameters)),
            (Some(_), Some(_)) => Err(SchedulerError::ScheduleConflict(
                "both a cron expression and a frequency were given".to_string(),
            )),
            (None, None) => Err(SchedulerError::ScheduleConflict(
                "either a cron expression or a frequency is required".to_string(),
            )),
        }
    }

    /// Short representation name ("cron" or "frequency")
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cron { .. } => "cron",
            Self::Frequency { .. } => "frequency",
        }
    }

    /// Resolve to the cron expression this schedule fires on
    pub fn cron_expression(&self) -> Result<String> {
        match self {
            Self::Cron { expression } => Ok(expression.clone()),
            Self::Frequency {
                interval,
                parameters,
            } => lookup_frequency(interval)?.to_cron(parameters),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cron { expression } => write!(f, "cron({})", expression),
            Self::Frequency {
                interval,
                parameters,
            } if parameters.is_empty() => write!(f, "{}", interval),
            Self::Frequency {
                interval,
                parameters,
            } => write!(f, "{}({})", interval, parameters.join(", ")),
        }
    }
}

/// Computes next trigger instants for schedules.
///
/// Pure: no clock access, no I/O. The default timezone is explicit
/// configuration and applies to tasks that do not name their own.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionEvaluator {
    default_timezone: Tz,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl ExpressionEvaluator {
    /// Create an evaluator with the given default timezone
    #[must_use]
    pub fn new(default_timezone: Tz) -> Self {
        Self { default_timezone }
    }

    /// Create an evaluator from an IANA timezone name
    pub fn from_timezone_name(name: &str) -> Result<Self> {
        Ok(Self::new(parse_timezone(name)?))
    }

    /// Timezone used when a task does not name one
    #[must_use]
    pub fn default_timezone(&self) -> Tz {
        self.default_timezone
    }

    /// Resolve a task's timezone, falling back to the default
    pub fn resolve_timezone(&self, name: Option<&str>) -> Result<Tz> {
        match name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => parse_timezone(name),
            None => Ok(self.default_timezone),
        }
    }

    /// Check that a schedule parses and fires at least once
    pub fn validate(&self, schedule: &Schedule) -> Result<()> {
        self.next_run(schedule, None, Utc::now()).map(|_| ())
    }

    /// First trigger instant strictly after `reference`.
    ///
    /// The result is always `>= reference` and non-decreasing in `reference`.
    pub fn next_run(
        &self,
        schedule: &Schedule,
        timezone: Option<&str>,
        reference: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let (expression, triggers) = compile(schedule)?;
        let tz = self.resolve_timezone(timezone)?;

        triggers
            .upcoming(&reference.with_timezone(&tz), 1)
            .into_iter()
            .next()
            .map(|next| next.with_timezone(&Utc))
            .ok_or_else(|| SchedulerError::InvalidExpression {
                expression,
                reason: "expression never fires".to_string(),
            })
    }

    /// The next `count` trigger instants after `reference`
    pub fn upcoming(
        &self,
        schedule: &Schedule,
        timezone: Option<&str>,
        reference: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<DateTime<Utc>>> {
        let (_, triggers) = compile(schedule)?;
        let tz = self.resolve_timezone(timezone)?;

        Ok(triggers
            .upcoming(&reference.with_timezone(&tz), count)
            .into_iter()
            .map(|next| next.with_timezone(&Utc))
            .collect())
    }
}

/// Parse an IANA timezone identifier
pub fn parse_timezone(name: &str) -> Result<Tz> {
    Tz::from_str(name.trim()).map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}

// One compiled schedule, or two whose union is the expression
struct Triggers(Vec<cron::Schedule>);

impl Triggers {
    fn upcoming(&self, from: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        let mut times: Vec<DateTime<Tz>> = self
            .0
            .iter()
            .flat_map(|schedule| schedule.after(from).take(count))
            .collect();
        times.sort();
        times.dedup();
        times.truncate(count);
        times
    }
}

fn compile(schedule: &Schedule) -> Result<(String, Triggers)> {
    let expression = schedule.cron_expression()?;

    let mut compiled = Vec::new();
    for variant in day_variants(&expression) {
        let normalized = normalize_expression(&variant)?;
        let parsed = cron::Schedule::from_str(&normalized).map_err(|e| {
            SchedulerError::InvalidExpression {
                expression: expression.clone(),
                reason: e.to_string(),
            }
        })?;
        compiled.push(parsed);
    }

    Ok((expression, Triggers(compiled)))
}

/// Split an expression restricting both day-of-month and day-of-week into
/// one expression per day field.
///
/// The `cron` crate requires both day fields to match; Unix cron fires on
/// either. A field counts as unrestricted when it starts with `*` or is `?`.
/// Other expressions, malformed ones included, come back unchanged.
pub fn day_variants(expression: &str) -> Vec<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let (dom, dow) = match fields.len() {
        5 => (2, 4),
        6 => (3, 5),
        _ => return vec![expression.to_string()],
    };

    let restricted = |field: &str| !field.starts_with('*') && field != "?";
    if !(restricted(fields[dom]) && restricted(fields[dow])) {
        return vec![expression.to_string()];
    }

    let with_star = |index: usize| {
        let mut variant = fields.clone();
        variant[index] = "*";
        variant.join(" ")
    };
    vec![with_star(dow), with_star(dom)]
}

/// Rewrite a five/six-field Unix expression into the seconds-first form
/// the `cron` crate parses, translating day-of-week numbering.
pub fn normalize_expression(expression: &str) -> Result<String> {
    let invalid = |reason: String| SchedulerError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    };

    let fields: Vec<&str> = expression.split_whitespace().collect();
    let (seconds, rest) = match fields.len() {
        5 => ("0", &fields[..]),
        6 => (fields[0], &fields[1..]),
        n => return Err(invalid(format!("expected 5 or 6 fields, got {}", n))),
    };

    let day_of_week = translate_day_of_week(rest[4]).map_err(invalid)?;

    Ok(format!(
        "{} {} {} {} {} {}",
        seconds, rest[0], rest[1], rest[2], rest[3], day_of_week
    ))
}

// Unix numbers Sunday as 0 (or 7); the cron crate numbers it 1..=7 from Sunday.
fn translate_day_of_week(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    let mut named = Vec::new();

    for part in field.split(',') {
        if part.chars().any(|c| c.is_ascii_alphabetic()) {
            named.push(part.to_string());
            continue;
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("day-of-week step '{}' is not numeric", step))?;
                if step == 0 {
                    return Err("day-of-week step must be > 0".to_string());
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (0, 6)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (parse_day(lo)?, parse_day(hi)?)
        } else {
            let day = parse_day(range)?;
            if step > 1 {
                (day, 6)
            } else {
                (day, day)
            }
        };

        if lo > hi {
            return Err(format!("day-of-week range {}-{} is reversed", lo, hi));
        }

        for day in (lo..=hi).step_by(step as usize) {
            days.insert(day % 7 + 1);
        }
    }

    let mut parts: Vec<String> = days.into_iter().map(|d| d.to_string()).collect();
    parts.extend(named);
    Ok(parts.join(","))
}

fn parse_day(value: &str) -> std::result::Result<u32, String> {
    let day: u32 = value
        .parse()
        .map_err(|_| format!("day-of-week '{}' is not numeric", value))?;
    if day > 7 {
        return Err(format!("day-of-week {} out of [0, 7]", day));
    }
    Ok(day)
}
