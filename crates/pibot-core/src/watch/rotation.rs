use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveTime};
use tracing::info;

use super::{Clock, Watcher};
use crate::logbook::LogBook;

const FALLBACK_DELAY: Duration = Duration::from_secs(24 * 60 * 60);
const RETRY_DELAY: Duration = Duration::from_secs(60);

/// Earliest configured time of day strictly after `after`, rolling into the
/// following days when today's times have passed. Local times that do not
/// exist (DST gaps) are skipped.
pub fn next_boundary(after: DateTime<Local>, times: &[NaiveTime]) -> Option<DateTime<Local>> {
    let today = after.date_naive();
    (0..=2u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .flat_map(|day| times.iter().map(move |time| day.and_time(*time)))
        .filter_map(|naive| naive.and_local_timezone(Local).earliest())
        .filter(|candidate| *candidate > after)
        .min()
}

/// Resets the log book at fixed times of day.
pub struct RotationWatcher {
    log: Arc<LogBook>,
    times: Vec<NaiveTime>,
    clock: Arc<dyn Clock>,
    target: Option<DateTime<Local>>,
    last_fired: Option<DateTime<Local>>,
    missed: Option<DateTime<Local>>,
}

impl RotationWatcher {
    pub fn new(log: Arc<LogBook>, times: Vec<NaiveTime>, clock: Arc<dyn Clock>) -> Self {
        Self {
            log,
            times,
            clock,
            target: None,
            last_fired: None,
            missed: None,
        }
    }

    pub fn target(&self) -> Option<DateTime<Local>> {
        self.target
    }
}

#[async_trait]
impl Watcher for RotationWatcher {
    fn name(&self) -> &str {
        "log_rotation"
    }

    fn next_delay(&mut self) -> Duration {
        if let Some(missed) = self.missed.take() {
            self.target = Some(missed);
            return RETRY_DELAY;
        }
        let now = self.clock.now();
        // A timer that wakes a little early must not land on the same boundary twice.
        let after = match self.last_fired {
            Some(fired) if fired > now => fired,
            _ => now,
        };
        self.target = next_boundary(after, &self.times);
        match self.target {
            Some(target) => (target - now).to_std().unwrap_or(Duration::ZERO),
            None => FALLBACK_DELAY,
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let Some(target) = self.target.take() else {
            return Ok(());
        };
        let log = self.log.clone();
        let stamp = self.clock.now();
        let reset = tokio::task::spawn_blocking(move || log.reset_at(stamp))
            .await
            .context("log rotation task failed")
            .and_then(|result| result);
        if let Err(err) = reset {
            // Retried shortly instead of waiting for the next boundary.
            self.missed = Some(target);
            return Err(err);
        }
        self.last_fired = Some(target);
        info!(boundary = %target.to_rfc3339(), "log rotated");
        Ok(())
    }
}
