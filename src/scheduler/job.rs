//! Scheduled job entries and their keys.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RuntimeError;
use crate::tasks::TaskRef;

/// How a job is re-armed after firing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScheduleKind {
    /// Re-inserted `interval` after each firing.
    Interval,
    /// Fires once at a wall-clock time, then dropped.
    At,
    /// Fires as soon as possible, then dropped.
    Once,
}

impl ScheduleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleKind::Interval => "interval",
            ScheduleKind::At => "at",
            ScheduleKind::Once => "once",
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of an interval schedule. Hours unless chosen otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    #[default]
    Hours,
    Days,
}

impl TimeUnit {
    /// Length of one unit in seconds.
    pub fn seconds(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" => Ok(TimeUnit::Seconds),
            "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "hour" | "hours" => Ok(TimeUnit::Hours),
            "day" | "days" => Ok(TimeUnit::Days),
            _ => Err(RuntimeError::InvalidTime {
                time: s.to_string(),
            }),
        }
    }
}

/// Job table key: due time (unix seconds) then task name.
///
/// Ordering follows the due time, so iterating the table visits jobs in the order
/// they become due. Renders as `"{due}__{name}"`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey {
    pub due: i64,
    pub name: String,
}

impl JobKey {
    pub fn new(due: i64, name: impl Into<String>) -> Self {
        Self {
            due,
            name: name.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}", self.due, self.name)
    }
}

/// One scheduled job.
#[derive(Clone, Debug)]
pub struct Job {
    pub task: TaskRef,
    pub kind: ScheduleKind,
    /// Re-arm period; zero unless `kind` is [`ScheduleKind::Interval`].
    pub interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_sort_by_due_time_first() {
        let mut keys = vec![
            JobKey::new(20, "a"),
            JobKey::new(10, "z"),
            JobKey::new(10, "b"),
        ];
        keys.sort();
        assert_eq!(keys[0].to_string(), "10__b");
        assert_eq!(keys[1].to_string(), "10__z");
        assert_eq!(keys[2].to_string(), "20__a");
    }

    #[test]
    fn units_parse_singular_and_plural() {
        assert_eq!("minute".parse::<TimeUnit>().unwrap(), TimeUnit::Minutes);
        assert_eq!("Days".parse::<TimeUnit>().unwrap(), TimeUnit::Days);
        assert!("fortnight".parse::<TimeUnit>().is_err());
        assert_eq!(TimeUnit::default(), TimeUnit::Hours);
    }
}
