//! Reminder sweep and response-log cleanup on cron schedules
//!
//! The sweep reminds every active user whose last logged message is older than a
//! threshold: a short one after a command, a long one after anything else.

use crate::config::{ReminderSettings, COMMAND_PREFIX};
use crate::error::{Error, Result};
use crate::format::Formatter;
use crate::store::{Response, Store, User};
use crate::transport::{chat_id_for, Transport};
use chrono::{DateTime, Local, TimeDelta, Timelike, Utc};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Parse a cron expression. Five-field expressions get a leading seconds field.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let full_cron = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    Ok(Schedule::from_str(&full_cron)?)
}

/// Whether `hour` lies in the inclusive reminder window
pub fn in_active_window(hour: u32, settings: &ReminderSettings) -> bool {
    hour >= settings.start_hour && hour <= settings.end_hour
}

/// Decide whether a user whose newest log row is `last` should be reminded at `now`
pub fn should_send_reminder(
    last: Option<&Response>,
    now: DateTime<Utc>,
    settings: &ReminderSettings,
) -> bool {
    let Some(last) = last else {
        return true;
    };

    let threshold = if last.response_type.starts_with(COMMAND_PREFIX) {
        settings.fast_interval
    } else {
        settings.interval
    };

    match (now - last.created_at).to_std() {
        Ok(elapsed) => elapsed >= threshold,
        // Logged in the future relative to `now`
        Err(_) => false,
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct ReminderScheduler {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    formatter: Formatter,
    settings: ReminderSettings,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        formatter: Formatter,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            store,
            transport,
            formatter,
            settings,
        }
    }

    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    /// Hourly job body. Returns `None` when `now` is outside the active window.
    pub async fn hourly_tick(&self, now: DateTime<Local>) -> Option<SweepReport> {
        if !in_active_window(now.hour(), &self.settings) {
            debug!("Hour {} outside reminder window, skipping sweep", now.hour());
            return None;
        }

        match self.send_reminders(now).await {
            Ok(report) => Some(report),
            Err(e) => {
                self.report("Error in reminder sweep", &e);
                None
            }
        }
    }

    /// Remind every active user that is due. Per-user failures are logged and counted.
    pub async fn send_reminders(&self, now: DateTime<Local>) -> Result<SweepReport> {
        let users = self.store.active_users()?;
        let now_utc = now.with_timezone(&Utc);
        let mut report = SweepReport::default();

        for user in &users {
            report.checked += 1;

            let last = match self.store.last_response(&user.number) {
                Ok(last) => last,
                Err(e) => {
                    report.failed += 1;
                    self.report(&format!("Error checking reminder for {}", user.number), &e);
                    continue;
                }
            };

            if !should_send_reminder(last.as_ref(), now_utc, &self.settings) {
                continue;
            }

            match self.send_reminder(user, &now).await {
                Ok(()) => {
                    report.sent += 1;
                    info!("Reminder sent to {} at {}", user.number, now);
                }
                Err(e) => {
                    report.failed += 1;
                    self.report(&format!("Failed to send reminder to {}", user.number), &e);
                }
            }
        }

        info!(
            "Reminder sweep: {} checked, {} sent, {} failed",
            report.checked, report.sent, report.failed
        );
        Ok(report)
    }

    pub fn reminder_text(&self, user: &User, now: &DateTime<Local>) -> String {
        format!(
            "Hello {},\n\nHow are you doing today?\n\nThis message was sent automatically at: {}",
            user.name,
            self.formatter.date_time(now)
        )
    }

    async fn send_reminder(&self, user: &User, now: &DateTime<Local>) -> Result<()> {
        let text = self.reminder_text(user, now);
        self.transport.send_message(&chat_id_for(&user.number), &text).await
    }

    /// Delete response rows strictly older than the retention period
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<usize> {
        let days = self.settings.retention_days;
        let cutoff = TimeDelta::try_days(days)
            .and_then(|retention| now.checked_sub_signed(retention))
            .ok_or_else(|| Error::Config(format!("retention of {} days is out of range", days)))?;
        self.store.delete_responses_before(cutoff)
    }

    /// Daily job body
    pub fn cleanup_tick(&self, now: DateTime<Utc>) {
        match self.cleanup(now) {
            Ok(count) => info!("Old responses cleaned up successfully ({} removed)", count),
            Err(e) => self.report("Error cleaning up old responses", &e),
        }
    }

    /// Spawn the sweep and cleanup jobs as independent tasks
    pub fn spawn(self: Arc<Self>, sweep: Schedule, cleanup: Schedule) -> Vec<JoinHandle<()>> {
        let sweeper = self.clone();
        let sweep_task = tokio::spawn(run_on_schedule("reminder sweep", sweep, move |at| {
            let sweeper = sweeper.clone();
            async move {
                sweeper.hourly_tick(at).await;
            }
        }));

        let cleaner = self;
        let cleanup_task = tokio::spawn(run_on_schedule("response cleanup", cleanup, move |at| {
            let cleaner = cleaner.clone();
            async move {
                cleaner.cleanup_tick(at.with_timezone(&Utc));
            }
        }));

        vec![sweep_task, cleanup_task]
    }

    fn report(&self, context: &str, err: &Error) {
        error!("{}:\n{}", context, self.formatter.error(err, &Local::now()));
    }
}

/// Next firing time after `now`, never at or before the last one that fired.
///
/// Firings missed while the process was stalled are skipped rather than replayed.
pub fn next_fire(
    schedule: &Schedule,
    last_fired: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    let from = match last_fired {
        Some(last) if last > now => last,
        _ => now,
    };
    schedule.after(&from).next()
}

/// Run `job` at every firing of `schedule`, passing the scheduled instant
async fn run_on_schedule<F, Fut>(name: &'static str, schedule: Schedule, mut job: F)
where
    F: FnMut(DateTime<Local>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut last_fired = None;

    loop {
        let Some(next) = next_fire(&schedule, last_fired, Local::now()) else {
            warn!("Schedule for {} has no upcoming times, stopping", name);
            return;
        };

        let wait = (next - Local::now()).to_std().unwrap_or_default();
        debug!("Next {} at {}", name, next);
        tokio::time::sleep(wait).await;

        job(next).await;
        last_fired = Some(next);
    }
}
