pub mod config;
pub mod logging;

pub const APP_NAME: &str = "pibot";

pub use config::{
    ConfigError, LimitsConfig, OwnerConfig, PathsConfig, PibotConfig, RemotePcConfig, SiteConfig,
    TelegramConfig, WatchersConfig, parse_time_of_day,
};
