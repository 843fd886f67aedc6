//! Fluent schedule description: `every(n)?.minutes().run(task)?`.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};

use crate::error::RuntimeError;
use crate::scheduler::job::{Job, JobKey, ScheduleKind, TimeUnit};
use crate::scheduler::Scheduler;
use crate::tasks::TaskRef;

const DAY_SECS: i64 = 86_400;

/// Describes when a task should run; finished by [`Schedule::run`].
#[derive(Debug)]
#[must_use = "a schedule does nothing until `run(task)` is called"]
pub struct Schedule<'a> {
    scheduler: &'a Scheduler,
    kind: ScheduleKind,
    interval: u64,
    unit: TimeUnit,
    at: Option<NaiveTime>,
}

impl<'a> Schedule<'a> {
    pub(crate) fn interval(scheduler: &'a Scheduler, interval: u64) -> Self {
        Self {
            scheduler,
            kind: ScheduleKind::Interval,
            interval,
            unit: TimeUnit::default(),
            at: None,
        }
    }

    pub(crate) fn at(scheduler: &'a Scheduler, time: NaiveTime) -> Self {
        Self {
            scheduler,
            kind: ScheduleKind::At,
            interval: 0,
            unit: TimeUnit::default(),
            at: Some(time),
        }
    }

    pub(crate) fn once(scheduler: &'a Scheduler) -> Self {
        Self {
            scheduler,
            kind: ScheduleKind::Once,
            interval: 0,
            unit: TimeUnit::default(),
            at: None,
        }
    }

    pub fn unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn seconds(self) -> Self {
        self.unit(TimeUnit::Seconds)
    }

    pub fn minutes(self) -> Self {
        self.unit(TimeUnit::Minutes)
    }

    pub fn hours(self) -> Self {
        self.unit(TimeUnit::Hours)
    }

    pub fn days(self) -> Self {
        self.unit(TimeUnit::Days)
    }

    pub fn second(self) -> Self {
        self.seconds()
    }

    pub fn minute(self) -> Self {
        self.minutes()
    }

    pub fn hour(self) -> Self {
        self.hours()
    }

    pub fn day(self) -> Self {
        self.days()
    }

    /// Schedule kind being built.
    pub fn kind(&self) -> ScheduleKind {
        self.kind
    }

    /// Seconds from now until the first run.
    ///
    /// Interval: the interval in its unit. At: until the next occurrence of the
    /// wall-clock time. Once: zero.
    pub fn calc_next_run(&self) -> i64 {
        match (self.kind, self.at) {
            (ScheduleKind::Interval, _) => self.period_secs(),
            (ScheduleKind::At, Some(time)) => {
                let now = Local::now();
                due_at(time, &now) - now.timestamp()
            }
            _ => 0,
        }
    }

    fn period_secs(&self) -> i64 {
        i64::try_from(self.interval.saturating_mul(self.unit.seconds())).unwrap_or(i64::MAX)
    }

    /// Adds the job to the scheduler table and wakes its loop.
    ///
    /// Returns the key the job was stored under.
    pub fn run(self, task: TaskRef) -> Result<JobKey, RuntimeError> {
        let due = Utc::now().timestamp().saturating_add(self.calc_next_run());
        let interval = match self.kind {
            ScheduleKind::Interval => Duration::from_secs(self.period_secs().unsigned_abs()),
            _ => Duration::ZERO,
        };
        let key = JobKey::new(due, task.id());
        self.scheduler.add(
            key,
            Job {
                task,
                kind: self.kind,
                interval,
            },
        )
    }
}

/// Parses a 24-hour `HH:MM` (or `HH:MM:SS`) clock time.
pub(crate) fn parse_clock(time: &str) -> Result<NaiveTime, RuntimeError> {
    let trimmed = time.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| RuntimeError::InvalidTime {
            time: time.to_string(),
        })
}

/// Unix time of `time` today in `now`'s timezone, or tomorrow if already past.
pub(crate) fn due_at<Tz: TimeZone>(time: NaiveTime, now: &DateTime<Tz>) -> i64 {
    let naive = now.date_naive().and_time(time);
    let today = now
        .timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp());

    if now.timestamp() > today {
        today + DAY_SECS
    } else {
        today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_times_parse_strictly() {
        assert_eq!(
            parse_clock("07:30").unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert!(parse_clock("7h30").is_err());
        assert!(parse_clock("25:00").is_err());
        assert!(parse_clock("").is_err());
    }

    #[test]
    fn past_time_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let later = due_at(NaiveTime::from_hms_opt(13, 0, 0).unwrap(), &now);
        assert_eq!(later - now.timestamp(), 3_600);

        let earlier = due_at(NaiveTime::from_hms_opt(11, 0, 0).unwrap(), &now);
        assert_eq!(earlier - now.timestamp(), DAY_SECS - 3_600);

        let exact = due_at(NaiveTime::from_hms_opt(12, 0, 0).unwrap(), &now);
        assert_eq!(exact, now.timestamp());
    }

    #[test]
    fn interval_defaults_to_hours() {
        let scheduler = Scheduler::new();
        let schedule = scheduler.every(2).unwrap();
        assert_eq!(schedule.calc_next_run(), 7_200);
        assert_eq!(scheduler.every(2).unwrap().minute().calc_next_run(), 120);
        assert_eq!(scheduler.once().calc_next_run(), 0);
    }
}
