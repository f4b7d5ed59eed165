use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use mitsuki_core::scheduling::TriggerSpec;

/// Errors found while validating a task's trigger at startup.
#[derive(Debug)]
pub enum TriggerError {
    /// Interval and delay triggers must be strictly positive.
    ZeroPeriod { task: String },
    /// The cron expression does not parse under the six-field grammar.
    InvalidCron { expression: String, reason: String },
    /// The time-zone identifier is not in the tz database.
    UnknownTimezone(String),
    /// The cron expression never fires in the future.
    NoFutureOccurrence(String),
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerError::ZeroPeriod { task } => {
                write!(f, "task '{task}' declares a zero interval or delay")
            }
            TriggerError::InvalidCron { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
            TriggerError::UnknownTimezone(tz) => write!(f, "unknown time zone '{tz}'"),
            TriggerError::NoFutureOccurrence(expr) => {
                write!(f, "cron expression '{expr}' never fires in the future")
            }
        }
    }
}

impl std::error::Error for TriggerError {}

/// A validated trigger, ready for the task loop.
///
/// The accepted cron grammar is the standard six-field form
/// (second, minute, hour, day-of-month, month, day-of-week) with `*`,
/// `*/N`, `a-b`, `a,b,c`, and month / day-of-week names. The
/// `@yearly`/`@annually`/`@monthly`/`@weekly`/`@daily`/`@midnight`/
/// `@hourly` macros expand to their equivalent expressions. Time zones
/// are tz-database identifiers; the empty string means UTC.
#[derive(Debug)]
pub enum Trigger {
    FixedRate {
        interval: Duration,
        initial_delay: Duration,
    },
    FixedDelay {
        delay: Duration,
        initial_delay: Duration,
    },
    Cron {
        schedule: cron::Schedule,
        timezone: Tz,
        expression: String,
    },
}

/// Expand the named cron macros to six-field expressions.
fn expand_macro(expression: &str) -> &str {
    match expression.trim() {
        "@yearly" | "@annually" => "0 0 0 1 1 *",
        "@monthly" => "0 0 0 1 * *",
        "@weekly" => "0 0 0 * * SUN",
        "@daily" | "@midnight" => "0 0 0 * * *",
        "@hourly" => "0 0 * * * *",
        other => other,
    }
}

impl Trigger {
    /// Validate a declared [`TriggerSpec`]. `task` names the task in error
    /// messages.
    pub fn from_spec(task: &str, spec: &TriggerSpec) -> Result<Self, TriggerError> {
        match spec {
            TriggerSpec::FixedRate {
                interval,
                initial_delay,
            } => {
                if interval.is_zero() {
                    return Err(TriggerError::ZeroPeriod {
                        task: task.to_string(),
                    });
                }
                Ok(Trigger::FixedRate {
                    interval: *interval,
                    initial_delay: *initial_delay,
                })
            }
            TriggerSpec::FixedDelay {
                delay,
                initial_delay,
            } => {
                if delay.is_zero() {
                    return Err(TriggerError::ZeroPeriod {
                        task: task.to_string(),
                    });
                }
                Ok(Trigger::FixedDelay {
                    delay: *delay,
                    initial_delay: *initial_delay,
                })
            }
            TriggerSpec::Cron {
                expression,
                timezone,
            } => {
                let expanded = expand_macro(expression);
                let schedule = cron::Schedule::from_str(expanded).map_err(|e| {
                    TriggerError::InvalidCron {
                        expression: expression.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let timezone = if timezone.is_empty() {
                    chrono_tz::UTC
                } else {
                    timezone
                        .parse::<Tz>()
                        .map_err(|_| TriggerError::UnknownTimezone(timezone.clone()))?
                };
                let trigger = Trigger::Cron {
                    schedule,
                    timezone,
                    expression: expression.clone(),
                };
                if trigger.next_after(Utc::now()).is_none() {
                    return Err(TriggerError::NoFutureOccurrence(expression.clone()));
                }
                Ok(trigger)
            }
        }
    }

    /// Next cron occurrence strictly after `after`, in UTC. `None` for
    /// interval triggers (their grid lives in the task loop).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron {
                schedule, timezone, ..
            } => schedule
                .after(&after.with_timezone(timezone))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Human-readable schedule description for logs and snapshots.
    pub fn describe(&self) -> String {
        match self {
            Trigger::FixedRate {
                interval,
                initial_delay,
            } if initial_delay.is_zero() => format!("every {}ms", interval.as_millis()),
            Trigger::FixedRate {
                interval,
                initial_delay,
            } => format!(
                "every {}ms (initial delay {}ms)",
                interval.as_millis(),
                initial_delay.as_millis()
            ),
            Trigger::FixedDelay {
                delay,
                initial_delay,
            } if initial_delay.is_zero() => {
                format!("{}ms after completion", delay.as_millis())
            }
            Trigger::FixedDelay {
                delay,
                initial_delay,
            } => format!(
                "{}ms after completion (initial delay {}ms)",
                delay.as_millis(),
                initial_delay.as_millis()
            ),
            Trigger::Cron {
                expression,
                timezone,
                ..
            } => format!("cron {expression} ({timezone})"),
        }
    }
}
