use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use tracing::debug;

use super::{Clock, Condition, Observation};
use crate::collab::{RemotePc, SystemProbe, WakeSignalSource};
use crate::format;

pub struct TemperatureCondition {
    probe: Arc<dyn SystemProbe>,
    threshold: f64,
}

impl TemperatureCondition {
    pub fn new(probe: Arc<dyn SystemProbe>, threshold: f64) -> Self {
        Self { probe, threshold }
    }
}

#[async_trait]
impl Condition for TemperatureCondition {
    async fn observe(&self) -> Result<Observation> {
        let temp = self
            .probe
            .cpu_temperature()
            .await
            .context("cpu temperature unavailable")?;
        if temp > self.threshold {
            Ok(Observation::Triggered(format!(
                "🔥 Warning! CPU temperature {temp:.1}°C exceeds the {:.1}°C threshold.",
                self.threshold
            )))
        } else {
            Ok(Observation::Clear)
        }
    }
}

pub struct LinkCondition {
    probe: Arc<dyn SystemProbe>,
    interface: String,
}

impl LinkCondition {
    pub fn new(probe: Arc<dyn SystemProbe>, interface: impl Into<String>) -> Self {
        Self {
            probe,
            interface: interface.into(),
        }
    }
}

#[async_trait]
impl Condition for LinkCondition {
    async fn observe(&self) -> Result<Observation> {
        if self.probe.link_up().await.context("link state unavailable")? {
            Ok(Observation::Clear)
        } else {
            Ok(Observation::Triggered(format!(
                "🛜 Warning! Network link {} is down.",
                format::code(&self.interface)
            )))
        }
    }
}

/// Time-of-day range, `[start, end)`, wrapping past midnight when
/// `start > end`. Equal bounds describe an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: NaiveTime) -> bool {
        if self.start == self.end {
            return false;
        }
        if self.start < self.end {
            self.start <= at && at < self.end
        } else {
            at >= self.start || at < self.end
        }
    }
}

/// Positive remote wake signals inside the window wake the PC. Signals
/// outside the window are dropped, not deferred.
pub struct WakeSignalCondition {
    source: Arc<dyn WakeSignalSource>,
    remote: Arc<dyn RemotePc>,
    window: TimeWindow,
    clock: Arc<dyn Clock>,
}

impl WakeSignalCondition {
    pub fn new(
        source: Arc<dyn WakeSignalSource>,
        remote: Arc<dyn RemotePc>,
        window: TimeWindow,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            remote,
            window,
            clock,
        }
    }
}

#[async_trait]
impl Condition for WakeSignalCondition {
    async fn observe(&self) -> Result<Observation> {
        if !self.source.poll().await.context("wake signal poll failed")? {
            return Ok(Observation::Clear);
        }
        let now = self.clock.now().time();
        if !self.window.contains(now) {
            debug!(at = %now.format("%H:%M"), "wake signal outside window discarded");
            return Ok(Observation::Clear);
        }
        Ok(Observation::Triggered(
            "⚡ Wake signal received, PC is starting.".to_string(),
        ))
    }

    async fn on_raise(&self) -> Result<()> {
        self.remote.wake().await.context("wake-on-lan failed")
    }
}
