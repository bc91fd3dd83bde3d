//! Cron scheduler backed by tokio tasks.

use chaincore::{ScheduledTask, Scheduler, TickHandler, TriggerError};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Convert a 5- or 6-field cron expression to the form the `cron` crate expects.
///
/// Standard cron: `[sec] min hour day month weekday`, weekdays 0-7 with 0 and 7 = Sunday
/// Cron crate:    `sec min hour day month weekday [year]`, weekdays 1-7 with 1 = Sunday
///
/// 7-field expressions are already in the crate's dialect and pass through.
pub fn normalize_cron_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.as_slice() {
        [min, hour, day, month, weekday] => {
            format!("0 {min} {hour} {day} {month} {} *", crate_weekdays(weekday))
        }
        [sec, min, hour, day, month, weekday] => {
            format!("{sec} {min} {hour} {day} {month} {}", crate_weekdays(weekday))
        }
        _ => expr.trim().to_string(),
    }
}

/// Rewrite a numeric weekday field as an explicit list of the crate's ordinals.
/// Fields using names, or that don't parse, are returned unchanged.
fn crate_weekdays(field: &str) -> String {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return field.to_string();
    }
    let Some(days) = weekday_set(field) else {
        return field.to_string();
    };
    days.iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(day, _)| (day + 1).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Days selected by a standard weekday field, indexed from Sunday = 0.
fn weekday_set(field: &str) -> Option<[bool; 7]> {
    let mut days = [false; 7];
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, step.parse::<usize>().ok().filter(|s| *s > 0)?),
            None => (item, 1),
        };
        let (start, end) = match base {
            "*" => (0, 7),
            _ => match base.split_once('-') {
                Some((start, end)) => (start.parse::<usize>().ok()?, end.parse::<usize>().ok()?),
                // `n/step` runs from n to the end of the week.
                None if item.contains('/') => (base.parse::<usize>().ok()?, 7),
                None => {
                    let day = base.parse::<usize>().ok()?;
                    (day, day)
                }
            },
        };
        if start > end || end > 7 {
            return None;
        }
        for day in (start..=end).step_by(step) {
            days[day % 7] = true;
        }
    }
    Some(days)
}

pub fn parse_schedule(expression: &str) -> Result<Schedule, TriggerError> {
    Schedule::from_str(&normalize_cron_expression(expression)).map_err(|e| {
        TriggerError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Spawns one tokio task per scheduled expression. Each tick runs on its own
/// task, so a slow run never delays the next tick.
#[derive(Debug, Default, Clone)]
pub struct CronScheduler;

impl CronScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for CronScheduler {
    fn validate(&self, expression: &str) -> bool {
        parse_schedule(expression).is_ok()
    }

    fn schedule(&self, expression: &str, tick: TickHandler) -> Result<ScheduledTask, TriggerError> {
        let schedule = parse_schedule(expression)?;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| TriggerError::Scheduler(format!("no tokio runtime: {e}")))?;

        handle.spawn(async move {
            let mut last: Option<DateTime<Utc>> = None;
            loop {
                let now = Utc::now();
                // Never fire the same occurrence twice, even if the clock has not moved.
                let from = last.map_or(now, |last| last.max(now));
                let Some(next) = schedule.after(&from).next() else {
                    tracing::warn!("Cron schedule has no upcoming occurrences, stopping");
                    return;
                };
                let delay = (next - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::from_millis(0));

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        if task_token.is_cancelled() {
                            return;
                        }
                        last = Some(next);
                        tokio::spawn(tick());
                    }
                    _ = task_token.cancelled() => {
                        return;
                    }
                }
            }
        });

        Ok(ScheduledTask::new(expression, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_expressions_gain_seconds_and_year() {
        assert_eq!(normalize_cron_expression("*/5 * * * *"), "0 */5 * * * * *");
        assert_eq!(normalize_cron_expression("0 */5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron_expression("0 0 9 * * 2 2030"), "0 0 9 * * 2 2030");
    }

    #[test]
    fn weekdays_use_standard_numbering() {
        assert_eq!(normalize_cron_expression("0 0 * * 0"), "0 0 0 * * 1 *");
        assert_eq!(normalize_cron_expression("0 0 * * 7"), "0 0 0 * * 1 *");
        assert_eq!(normalize_cron_expression("0 9 * * 1-5"), "0 0 9 * * 2,3,4,5,6 *");
        assert_eq!(normalize_cron_expression("0 0 * * 5-7"), "0 0 0 * * 1,6,7 *");
        assert_eq!(normalize_cron_expression("0 0 * * */2"), "0 0 0 * * 1,3,5,7 *");
        assert_eq!(normalize_cron_expression("0 0 * * 0,3"), "0 0 0 * * 1,4 *");
        assert_eq!(normalize_cron_expression("0 0 * * MON-FRI"), "0 0 0 * * MON-FRI *");
        assert_eq!(normalize_cron_expression("30 0 0 * * 6"), "30 0 0 * * 7");
    }

    #[test]
    fn sunday_as_zero_or_seven_is_valid() {
        let scheduler = CronScheduler::new();
        assert!(scheduler.validate("0 0 * * 0"));
        assert!(scheduler.validate("0 0 * * 7"));
        assert!(!scheduler.validate("0 0 * * 8"));
        assert!(!scheduler.validate("0 0 * * 5-2"));
    }

    #[test]
    fn weekday_ranges_fire_on_the_named_days() {
        use chrono::{Datelike, TimeZone, Weekday};

        // 2024-01-01 is a Monday.
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let days: Vec<Weekday> = parse_schedule("0 9 * * 1-5")
            .unwrap()
            .after(&from)
            .take(6)
            .map(|at| at.weekday())
            .collect();
        assert_eq!(
            days,
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri, Weekday::Mon]
        );

        let sunday = parse_schedule("0 0 * * 0").unwrap().after(&from).next().unwrap();
        assert_eq!(sunday.weekday(), Weekday::Sun);
    }

    #[test]
    fn validate_accepts_standard_and_rejects_garbage() {
        let scheduler = CronScheduler::new();
        assert!(scheduler.validate("*/5 * * * *"));
        assert!(scheduler.validate("*/10 * * * * *"));
        assert!(!scheduler.validate("not-a-cron"));
        assert!(!scheduler.validate(""));
    }
}
