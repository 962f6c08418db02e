//! Fixed catalog of named frequencies
//!
//! Frequencies are calendar-aligned: "every five minutes" fires at :00, :05,
//! :10 and so on, never relative to when the task was saved.

use serde::Serialize;

use crate::error::{Result, SchedulerError};

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Frequency {
    /// Canonical key stored on tasks
    pub interval: &'static str,
    /// Human label for display
    pub label: &'static str,
    /// Names of the positional parameters this entry takes
    pub parameters: &'static [&'static str],
    #[serde(skip)]
    cron: &'static str,
}

impl Frequency {
    const fn fixed(interval: &'static str, label: &'static str, cron: &'static str) -> Self {
        Self {
            interval,
            label,
            parameters: &[],
            cron,
        }
    }

    const fn parameterized(
        interval: &'static str,
        label: &'static str,
        parameters: &'static [&'static str],
    ) -> Self {
        Self {
            interval,
            label,
            parameters,
            cron: "",
        }
    }

    /// Expand into a five-field cron expression
    pub fn to_cron(&self, parameters: &[String]) -> Result<String> {
        if parameters.len() != self.parameters.len() {
            return Err(self.invalid(format!(
                "expected {} parameter(s) [{}], got {}",
                self.parameters.len(),
                self.parameters.join(", "),
                parameters.len()
            )));
        }

        match self.interval {
            "hourlyAt" => {
                let minute = self.number(&parameters[0], "minute", 0, 59)?;
                Ok(format!("{} * * * *", minute))
            }
            "dailyAt" => {
                let (hour, minute) = self.time(&parameters[0])?;
                Ok(format!("{} {} * * *", minute, hour))
            }
            "twiceDaily" => {
                let first = self.number(&parameters[0], "first_hour", 0, 23)?;
                let second = self.number(&parameters[1], "second_hour", 0, 23)?;
                if first == second {
                    return Err(self.invalid("the two hours must differ".to_string()));
                }
                Ok(format!("0 {},{} * * *", first.min(second), first.max(second)))
            }
            "weeklyOn" => {
                let day = self.number(&parameters[0], "day", 0, 6)?;
                let (hour, minute) = self.time(&parameters[1])?;
                Ok(format!("{} {} * * {}", minute, hour, day))
            }
            "monthlyOn" => {
                let day = self.number(&parameters[0], "day", 1, 31)?;
                let (hour, minute) = self.time(&parameters[1])?;
                Ok(format!("{} {} {} * *", minute, hour, day))
            }
            _ => Ok(self.cron.to_string()),
        }
    }

    fn number(&self, raw: &str, name: &str, min: u32, max: u32) -> Result<u32> {
        let value: u32 = raw
            .trim()
            .parse()
            .map_err(|_| self.invalid(format!("{} '{}' is not a number", name, raw)))?;
        if value < min || value > max {
            return Err(self.invalid(format!(
                "{} {} out of [{}, {}]",
                name, value, min, max
            )));
        }
        Ok(value)
    }

    // "HH:MM" or a bare hour
    fn time(&self, raw: &str) -> Result<(u32, u32)> {
        match raw.trim().split_once(':') {
            Some((hour, minute)) => Ok((
                self.number(hour, "hour", 0, 23)?,
                self.number(minute, "minute", 0, 59)?,
            )),
            None => Ok((self.number(raw, "hour", 0, 23)?, 0)),
        }
    }

    fn invalid(&self, reason: String) -> SchedulerError {
        SchedulerError::InvalidFrequencyParameters {
            interval: self.interval.to_string(),
            reason,
        }
    }
}

const CATALOG: &[Frequency] = &[
    Frequency::fixed("everyMinute", "Every Minute", "* * * * *"),
    Frequency::fixed("everyTwoMinutes", "Every Two Minutes", "*/2 * * * *"),
    Frequency::fixed("everyFiveMinutes", "Every Five Minutes", "*/5 * * * *"),
    Frequency::fixed("everyTenMinutes", "Every Ten Minutes", "*/10 * * * *"),
    Frequency::fixed("everyFifteenMinutes", "Every Fifteen Minutes", "*/15 * * * *"),
    Frequency::fixed("everyThirtyMinutes", "Every Thirty Minutes", "0,30 * * * *"),
    Frequency::fixed("hourly", "Hourly", "0 * * * *"),
    Frequency::parameterized("hourlyAt", "Hourly At", &["minute"]),
    Frequency::fixed("daily", "Daily", "0 0 * * *"),
    Frequency::parameterized("dailyAt", "Daily At", &["time"]),
    Frequency::parameterized("twiceDaily", "Twice Daily", &["first_hour", "second_hour"]),
    Frequency::fixed("weekdays", "Weekdays", "0 0 * * 1-5"),
    Frequency::fixed("weekends", "Weekends", "0 0 * * 0,6"),
    Frequency::fixed("weekly", "Weekly", "0 0 * * 0"),
    Frequency::parameterized("weeklyOn", "Weekly On", &["day", "time"]),
    Frequency::fixed("monthly", "Monthly", "0 0 1 * *"),
    Frequency::parameterized("monthlyOn", "Monthly On", &["day", "time"]),
    Frequency::fixed("quarterly", "Quarterly", "0 0 1 1,4,7,10 *"),
    Frequency::fixed("yearly", "Yearly", "0 0 1 1 *"),
];

/// The full frequency catalog, in display order
#[must_use]
pub fn frequencies() -> &'static [Frequency] {
    CATALOG
}

/// Find a catalog entry by its canonical key
pub fn lookup_frequency(interval: &str) -> Result<&'static Frequency> {
    CATALOG
        .iter()
        .find(|f| f.interval == interval)
        .ok_or_else(|| SchedulerError::UnknownFrequency(interval.to_string()))
}
