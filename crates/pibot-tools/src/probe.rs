use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use pibot_common::PibotConfig;
use pibot_core::{Invocation, ProcessRunner, SystemProbe, SystemSnapshot};
use regex::Regex;
use sysinfo::{Disks, System};

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
const SMART_ATTRIBUTE: &str = "Temperature_Celsius";

/// Reads host metrics from sysinfo, the thermal zone file and a few
/// standard utilities (`ip`, `hostname`, `smartctl`).
pub struct HostProbe {
    thermal_zone: PathBuf,
    interface: String,
    disk_device: String,
    runner: Arc<dyn ProcessRunner>,
}

impl HostProbe {
    pub fn new(
        thermal_zone: impl Into<PathBuf>,
        interface: impl Into<String>,
        disk_device: impl Into<String>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            thermal_zone: thermal_zone.into(),
            interface: interface.into(),
            disk_device: disk_device.into(),
            runner,
        }
    }

    pub fn from_config(config: &PibotConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self::new(
            config.paths.thermal_zone.clone(),
            config.watchers.link_interface.clone(),
            config.paths.disk_device.clone(),
            runner,
        )
    }

    async fn primary_ip(&self) -> Option<String> {
        let output = self
            .runner
            .run(Invocation::argv(["hostname", "-I"]), PROBE_TIMEOUT)
            .await
            .ok()?;
        output
            .stdout
            .split_whitespace()
            .next()
            .map(str::to_string)
    }
}

#[async_trait]
impl SystemProbe for HostProbe {
    async fn cpu_temperature(&self) -> Result<f64> {
        let raw = tokio::fs::read_to_string(&self.thermal_zone)
            .await
            .with_context(|| format!("failed to read {}", self.thermal_zone.display()))?;
        parse_millidegrees(&raw)
    }

    async fn link_up(&self) -> Result<bool> {
        let output = self
            .runner
            .run(
                Invocation::argv(["ip", "addr", "show", self.interface.as_str()]),
                PROBE_TIMEOUT,
            )
            .await?;
        Ok(output.success() && output.stdout.contains("inet "))
    }

    async fn snapshot(&self) -> Result<SystemSnapshot> {
        let mut snapshot = tokio::task::spawn_blocking(collect_metrics)
            .await
            .context("metrics task failed")?;
        snapshot.temperature = self.cpu_temperature().await.ok();
        snapshot.ip = self.primary_ip().await;
        Ok(snapshot)
    }

    async fn disk_temperature(&self) -> Result<String> {
        let output = self
            .runner
            .run(
                Invocation::argv(["smartctl", "-A", "-d", "sat", self.disk_device.as_str()]),
                PROBE_TIMEOUT,
            )
            .await
            .context("smartctl failed")?;
        Ok(parse_smartctl_temperature(&output.stdout))
    }
}

fn collect_metrics() -> SystemSnapshot {
    let mut sys = System::new_all();
    // CPU usage is a delta between two refreshes.
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();

    let disks = Disks::new_with_refreshed_list();
    let root = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .or_else(|| disks.list().first());
    let (disk_total, disk_used) = root
        .map(|disk| {
            let total = disk.total_space();
            (total, total.saturating_sub(disk.available_space()))
        })
        .unwrap_or((0, 0));

    SystemSnapshot {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        cpu_per_core: sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect(),
        ram_used: sys.used_memory(),
        ram_total: sys.total_memory(),
        disk_used,
        disk_total,
        temperature: None,
        uptime_secs: System::uptime(),
        ip: None,
    }
}

fn parse_millidegrees(raw: &str) -> Result<f64> {
    let milli: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("unexpected thermal reading {:?}", raw.trim()))?;
    Ok(milli as f64 / 1000.0)
}

const SMART_RAW_VALUE: &str = r"-\s+(\d+)";

/// Pulls the raw value of the SMART temperature attribute out of
/// `smartctl -A` output. Falls back to the whole attribute line when its
/// layout is unfamiliar.
pub fn parse_smartctl_temperature(output: &str) -> String {
    let Some(line) = output.lines().find(|line| line.contains(SMART_ATTRIBUTE)) else {
        return "Temperature not found".to_string();
    };
    let caps = Regex::new(SMART_RAW_VALUE)
        .ok()
        .and_then(|re| re.captures(line));
    match caps {
        Some(caps) => format!("{} °C", &caps[1]),
        None => line.trim().to_string(),
    }
}
