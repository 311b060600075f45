//! Background watchers: periodic checks that run beside the command loop and
//! push alerts to the owner.

mod conditions;
mod rotation;
mod supervisor;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::collab::MessageSink;
use crate::message::OutgoingMessage;

pub use conditions::{LinkCondition, TemperatureCondition, TimeWindow, WakeSignalCondition};
pub use rotation::{RotationWatcher, next_boundary};
pub use supervisor::WatcherSupervisor;

/// A single indefinitely repeating check.
#[async_trait]
pub trait Watcher: Send {
    fn name(&self) -> &str;

    /// Delay before the next tick. Called once per loop iteration, before sleeping.
    fn next_delay(&mut self) -> Duration;

    async fn tick(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Raised,
    Cleared,
    Unchanged,
}

/// Debounce latch: remembers whether the current episode was already announced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Latch {
    notified: bool,
}

impl Latch {
    pub fn is_set(&self) -> bool {
        self.notified
    }

    /// What observing `triggered` would do, without committing it.
    pub fn transition(&self, triggered: bool) -> Transition {
        match (self.notified, triggered) {
            (false, true) => Transition::Raised,
            (true, false) => Transition::Cleared,
            _ => Transition::Unchanged,
        }
    }

    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Raised => self.notified = true,
            Transition::Cleared => self.notified = false,
            Transition::Unchanged => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Condition holds; carries the alert text (HTML).
    Triggered(String),
    Clear,
}

/// The sampling half of a debounced watcher.
#[async_trait]
pub trait Condition: Send + Sync {
    async fn observe(&self) -> Result<Observation>;

    /// Side effect to run once per raised episode, before the alert goes out.
    async fn on_raise(&self) -> Result<()> {
        Ok(())
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Settable clock for tests and dry runs.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Two-state (quiet / alerted) watcher around a [`Condition`].
///
/// An alert goes out only on the quiet to alerted edge. If sending fails the
/// latch stays quiet so the next tick tries again.
pub struct DebouncedWatcher {
    name: String,
    condition: Box<dyn Condition>,
    sink: Arc<dyn MessageSink>,
    chat_id: i64,
    latch: Latch,
    /// `on_raise` already ran for an episode whose alert is still undelivered.
    raise_done: bool,
    initial_delay: Option<Duration>,
    interval: Duration,
}

impl DebouncedWatcher {
    pub fn new(
        name: impl Into<String>,
        condition: Box<dyn Condition>,
        sink: Arc<dyn MessageSink>,
        chat_id: i64,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            sink,
            chat_id,
            latch: Latch::default(),
            raise_done: false,
            initial_delay: None,
            interval,
        }
    }

    /// Waits `grace` before the first sample instead of a full interval.
    pub fn with_initial_delay(mut self, grace: Duration) -> Self {
        self.initial_delay = Some(grace);
        self
    }

    pub fn latch(&self) -> Latch {
        self.latch
    }
}

#[async_trait]
impl Watcher for DebouncedWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_delay(&mut self) -> Duration {
        self.initial_delay.take().unwrap_or(self.interval)
    }

    async fn tick(&mut self) -> Result<()> {
        let observation = self.condition.observe().await?;
        let triggered = matches!(observation, Observation::Triggered(_));
        let transition = self.latch.transition(triggered);
        match (transition, observation) {
            (Transition::Raised, Observation::Triggered(alert)) => {
                if !self.raise_done {
                    self.condition.on_raise().await?;
                    self.raise_done = true;
                }
                self.sink
                    .send(self.chat_id, OutgoingMessage::html(alert))
                    .await
                    .with_context(|| format!("{} alert could not be delivered", self.name))?;
                info!(watcher = %self.name, "alert sent");
            }
            (Transition::Cleared, _) => {
                debug!(watcher = %self.name, "condition cleared");
            }
            _ => {}
        }
        self.latch.apply(transition);
        self.raise_done = false;
        Ok(())
    }
}
