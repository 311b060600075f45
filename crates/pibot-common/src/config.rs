use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = ".pibot/config.toml";
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PibotConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub owner: OwnerConfig,
    #[serde(default)]
    pub remote_pc: RemotePcConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub watchers: WatchersConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// The single caller allowed to run privileged commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerConfig {
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePcConfig {
    pub host: Option<String>,
    pub mac: Option<String>,
    #[serde(default = "default_broadcast")]
    pub broadcast_addr: String,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: String,
}

impl Default for RemotePcConfig {
    fn default() -> Self {
        Self {
            host: None,
            mac: None,
            broadcast_addr: default_broadcast(),
            ssh_user: default_ssh_user(),
            shutdown_command: default_shutdown_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Command line of the deploy script; split shell-style before running.
    pub deploy_command: String,
    pub repo_dir: PathBuf,
    pub push_branch: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            deploy_command: home
                .join("portfolio-site/update.sh")
                .display()
                .to_string(),
            repo_dir: home.join("pibot"),
            push_branch: "rpi-commits".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchersConfig {
    pub temperature_threshold: f64,
    pub temperature_interval_secs: u64,
    pub link_interface: String,
    pub link_interval_secs: u64,
    pub link_grace_secs: u64,
    pub wake_signal_url: Option<String>,
    pub wake_signal_key: Option<String>,
    pub wake_poll_interval_secs: u64,
    pub wake_window_start: String,
    pub wake_window_end: String,
    pub rotation_times: Vec<String>,
}

impl Default for WatchersConfig {
    fn default() -> Self {
        Self {
            temperature_threshold: 60.0,
            temperature_interval_secs: 60,
            link_interface: "wlan0".to_string(),
            link_interval_secs: 120,
            link_grace_secs: 10,
            wake_signal_url: None,
            wake_signal_key: None,
            wake_poll_interval_secs: 5,
            wake_window_start: "06:00".to_string(),
            wake_window_end: "12:00".to_string(),
            rotation_times: vec!["00:00".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_file: PathBuf,
    pub thermal_zone: PathBuf,
    pub download_dir: PathBuf,
    pub disk_device: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pibot");
        Self {
            log_file: base.join("access.log"),
            thermal_zone: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            download_dir: base.join("downloads"),
            disk_device: "/dev/sda".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Upper bound on characters of collaborator output shown in one message.
    pub display_cap: usize,
    pub command_timeout_secs: u64,
    pub log_tail_lines: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            display_cap: 4000,
            command_timeout_secs: 120,
            log_tail_lines: 50,
        }
    }
}

impl Default for PibotConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            telegram: TelegramConfig::default(),
            owner: OwnerConfig::default(),
            remote_pc: RemotePcConfig::default(),
            site: SiteConfig::default(),
            watchers: WatchersConfig::default(),
            paths: PathsConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_broadcast() -> String {
    "255.255.255.255:9".to_string()
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_shutdown_command() -> String {
    "shutdown /s /t 0".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config has invalid value: {0}")]
    ValidationFailed(String),
}

impl PibotConfig {
    pub fn resolve_path() -> PathBuf {
        if let Ok(path) = env::var("PIBOT_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then the TOML file when it exists, then the process
    /// environment (seeded from `.env` if present).
    pub fn load_layered(explicit: Option<&Path>) -> Result<(Self, PathBuf), ConfigError> {
        let _ = dotenvy::dotenv();
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::resolve_path);
        let mut cfg = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env_with(|key| env::var(key).ok());
        Ok((cfg, path))
    }

    /// Applies the environment variable layer through `lookup` so callers can
    /// feed a fixed map instead of the process environment.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = non_empty("BOT_TOKEN") {
            self.telegram.token = Some(token.trim().to_string());
        }
        if let Some(raw) = lookup("MY_ID") {
            // An unparsable id must not leave a stale value from the file behind.
            self.owner.id = raw.trim().parse::<i64>().ok();
        }
        if let Some(host) = non_empty("PC_IP") {
            self.remote_pc.host = Some(host);
        }
        if let Some(mac) = non_empty("PC_MAC") {
            self.remote_pc.mac = Some(mac);
        }
        if let Some(key) = non_empty("SECRET_KEY") {
            self.watchers.wake_signal_key = Some(key);
        }
        if let Some(url) = non_empty("WAKE_SIGNAL_URL") {
            self.watchers.wake_signal_url = Some(url);
        }
        if let Some(path) = non_empty("LOG_FILE") {
            self.paths.log_file = PathBuf::from(path);
        }
        if let Some(level) = non_empty("PIBOT_LOG") {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "log_level cannot be empty".to_string(),
            ));
        }
        match &self.telegram.token {
            Some(token) if !token.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::ValidationFailed(
                    "bot token missing: set BOT_TOKEN or telegram.token".to_string(),
                ));
            }
        }
        if self.owner.id.is_none() {
            return Err(ConfigError::ValidationFailed(
                "owner id missing or not a number: set MY_ID or owner.id".to_string(),
            ));
        }
        if self.paths.log_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "paths.log_file cannot be empty".to_string(),
            ));
        }
        if self.site.deploy_command.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "site.deploy_command cannot be empty".to_string(),
            ));
        }
        if self.limits.display_cap == 0 {
            return Err(ConfigError::ValidationFailed(
                "limits.display_cap must be positive".to_string(),
            ));
        }
        parse_time_of_day(&self.watchers.wake_window_start)?;
        parse_time_of_day(&self.watchers.wake_window_end)?;
        if self.watchers.rotation_times.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "watchers.rotation_times needs at least one HH:MM entry".to_string(),
            ));
        }
        for raw in &self.watchers.rotation_times {
            parse_time_of_day(raw)?;
        }
        Ok(())
    }

    pub fn rotation_times(&self) -> Result<Vec<NaiveTime>, ConfigError> {
        self.watchers
            .rotation_times
            .iter()
            .map(|raw| parse_time_of_day(raw))
            .collect()
    }
}

pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), TIME_OF_DAY_FORMAT).map_err(|_| {
        ConfigError::ValidationFailed(format!("invalid time of day '{raw}', expected HH:MM"))
    })
}
