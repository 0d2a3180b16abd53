//! Weekly trigger loop.
//!
//! Computes the next configured weekday/time and sleeps until it, then runs
//! the reshuffle on a blocking thread under a timeout. The loop survives
//! failed runs: an error is logged and the next occurrence is scheduled.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use tracing::{error, info};

use crate::config::ScheduleConfig;
use crate::engine::{RotationEngine, RunStats};
use crate::error::{ConfigError, EngineError, Result};

/// The next occurrence of the configured weekday and time (UTC), strictly
/// after `after`.
pub fn next_run_after(
    after: DateTime<Utc>,
    schedule: &ScheduleConfig,
) -> Result<DateTime<Utc>, ConfigError> {
    let weekday = schedule.weekday()?;
    let time = NaiveTime::from_hms_opt(schedule.hour, schedule.minute, 0).ok_or_else(|| {
        ConfigError::InvalidValue {
            key: "schedule".to_string(),
            message: format!("invalid time {:02}:{:02}", schedule.hour, schedule.minute),
        }
    })?;

    let days_ahead = (weekday.num_days_from_monday() + 7
        - after.weekday().num_days_from_monday())
        % 7;
    let candidate_date = after.date_naive() + Duration::days(days_ahead as i64);
    let mut candidate = Utc.from_utc_datetime(&candidate_date.and_time(time));
    if candidate <= after {
        candidate += Duration::days(7);
    }
    Ok(candidate)
}

/// Drives the engine's reshuffle on the configured weekly schedule.
pub struct WeeklyScheduler {
    engine: Arc<RotationEngine>,
}

impl WeeklyScheduler {
    pub fn new(engine: Arc<RotationEngine>) -> Self {
        Self { engine }
    }

    /// Run the schedule loop forever. Intended to be spawned as a task.
    pub async fn run(self) -> Result<()> {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, &self.engine.config().schedule)?;
            let wait = (next - now)
                .to_std()
                .unwrap_or(StdDuration::ZERO);
            info!(next_run = %next, "weekly reshuffle scheduled");
            tokio::time::sleep(wait).await;

            match self.run_once().await {
                Ok(stats) => {
                    info!(pairs = stats.pairs_created, "scheduled reshuffle finished");
                }
                Err(e) => {
                    error!("scheduled reshuffle failed: {e}");
                }
            }
        }
    }

    /// Execute one reshuffle on a blocking thread, bounded by the configured
    /// timeout.
    ///
    /// The timeout abandons the run, it does not cancel it: the blocking
    /// task keeps executing and holds the engine's single-flight flag, so
    /// triggers arriving before it finishes get a `ConcurrencyConflict`.
    pub async fn run_once(&self) -> Result<RunStats> {
        let timeout_secs = self.engine.config().run_timeout_secs;
        let engine = self.engine.clone();
        let run = tokio::task::spawn_blocking(move || engine.reshuffle());

        match tokio::time::timeout(StdDuration::from_secs(timeout_secs), run).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(EngineError::ConcurrencyConflict(format!(
                "reshuffle task panicked: {join_err}"
            ))),
            Err(_) => Err(EngineError::RunTimeout { timeout_secs }),
        }
    }
}
