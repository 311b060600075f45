//! Builds the long-running bot out of a validated configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use pibot_common::PibotConfig;
use pibot_common::parse_time_of_day;
use pibot_core::watch::{
    Clock, DebouncedWatcher, LinkCondition, RotationWatcher, SystemClock, TemperatureCondition,
    TimeWindow, WakeSignalCondition, Watcher,
};
use pibot_core::{
    Collaborators, LogBook, MessageSink, ProcessRunner, RemotePc, Router, RouterSettings,
    SystemProbe, WakeSignalSource,
};
use pibot_telegram::{TelegramApi, TelegramSink};
use pibot_tools::{HostProbe, HttpWakeSignal, LanRemotePc, SystemRunner, YtDlpFetcher};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const WAKE_SIGNAL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct App {
    pub api: Arc<TelegramApi>,
    pub router: Arc<Router>,
    pub watchers: Vec<Box<dyn Watcher>>,
}

/// Everything a watcher may need, already constructed.
pub struct WatcherDeps {
    pub owner: i64,
    pub sink: Arc<dyn MessageSink>,
    pub probe: Arc<dyn SystemProbe>,
    pub remote: Arc<dyn RemotePc>,
    pub wake_source: Option<Arc<dyn WakeSignalSource>>,
    pub log: Arc<LogBook>,
    pub clock: Arc<dyn Clock>,
}

pub fn build(config: &PibotConfig) -> Result<App> {
    let owner = config
        .owner
        .id
        .ok_or_else(|| anyhow!("owner id is not configured"))?;
    let token = config
        .telegram
        .token
        .as_deref()
        .ok_or_else(|| anyhow!("bot token is not configured"))?;

    let api = Arc::new(TelegramApi::new(
        &config.telegram.api_base,
        token,
        Duration::from_secs(config.telegram.poll_timeout_secs),
    )?);
    let sink: Arc<dyn MessageSink> = Arc::new(TelegramSink::new(api.clone()));
    let log = Arc::new(LogBook::open(&config.paths.log_file)?);

    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner::new());
    let probe: Arc<dyn SystemProbe> = Arc::new(HostProbe::from_config(config, runner.clone()));
    let remote: Arc<dyn RemotePc> =
        Arc::new(LanRemotePc::from_config(&config.remote_pc, runner.clone())?);
    let media = Arc::new(YtDlpFetcher::new(
        runner.clone(),
        config.paths.download_dir.clone(),
        DOWNLOAD_TIMEOUT,
    )?);

    let wake_source: Option<Arc<dyn WakeSignalSource>> = match &config.watchers.wake_signal_url {
        Some(url) => Some(Arc::new(HttpWakeSignal::new(
            url,
            config.watchers.wake_signal_key.clone(),
            WAKE_SIGNAL_TIMEOUT,
        )?)),
        None => None,
    };

    let collab = Collaborators {
        sink: sink.clone(),
        runner,
        probe: probe.clone(),
        remote: remote.clone(),
        media,
    };
    let router = Arc::new(Router::new(
        Some(owner),
        log.clone(),
        collab,
        RouterSettings::from_config(config),
    ));

    let watchers = build_watchers(
        config,
        WatcherDeps {
            owner,
            sink,
            probe,
            remote,
            wake_source,
            log,
            clock: Arc::new(SystemClock),
        },
    )?;

    Ok(App {
        api,
        router,
        watchers,
    })
}

/// Temperature, link and log rotation always run; the wake signal watcher
/// only when an endpoint is configured.
pub fn build_watchers(config: &PibotConfig, deps: WatcherDeps) -> Result<Vec<Box<dyn Watcher>>> {
    let cfg = &config.watchers;
    let mut watchers: Vec<Box<dyn Watcher>> = Vec::new();

    watchers.push(Box::new(DebouncedWatcher::new(
        "temperature",
        Box::new(TemperatureCondition::new(
            deps.probe.clone(),
            cfg.temperature_threshold,
        )),
        deps.sink.clone(),
        deps.owner,
        Duration::from_secs(cfg.temperature_interval_secs),
    )));

    watchers.push(Box::new(
        DebouncedWatcher::new(
            "link",
            Box::new(LinkCondition::new(
                deps.probe.clone(),
                cfg.link_interface.clone(),
            )),
            deps.sink.clone(),
            deps.owner,
            Duration::from_secs(cfg.link_interval_secs),
        )
        .with_initial_delay(Duration::from_secs(cfg.link_grace_secs)),
    ));

    if let Some(source) = deps.wake_source {
        let window = TimeWindow::new(
            parse_time_of_day(&cfg.wake_window_start)?,
            parse_time_of_day(&cfg.wake_window_end)?,
        );
        watchers.push(Box::new(DebouncedWatcher::new(
            "wake_signal",
            Box::new(WakeSignalCondition::new(
                source,
                deps.remote.clone(),
                window,
                deps.clock.clone(),
            )),
            deps.sink.clone(),
            deps.owner,
            Duration::from_secs(cfg.wake_poll_interval_secs),
        )));
    }

    let times = config
        .rotation_times()
        .context("invalid log rotation schedule")?;
    watchers.push(Box::new(RotationWatcher::new(deps.log, times, deps.clock)));

    Ok(watchers)
}
