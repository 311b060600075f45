mod app;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pibot_common::{APP_NAME, PibotConfig, logging};
use pibot_core::watch::WatcherSupervisor;
use pibot_telegram::{PollSettings, poll_loop};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "pibot", about = "Home server remote-control bot", version)]
struct Cli {
    /// Config file (defaults to $PIBOT_CONFIG, then ~/.pibot/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Tracing filter, e.g. `info` or `pibot_core=debug`. `RUST_LOG` still wins.
    #[arg(long)]
    log_level: Option<String>,
    /// Validate the configuration, check the bot token, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, path) = PibotConfig::load_layered(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    logging::init(&config.log_level);
    config
        .validate()
        .with_context(|| format!("invalid configuration ({})", path.display()))?;
    info!(config = %path.display(), "configuration loaded");

    let app = app::build(&config)?;

    if cli.check {
        let me = app.api.get_me().await.context("bot token check failed")?;
        println!(
            "{APP_NAME}: configuration OK, connected as @{}",
            me.username.unwrap_or(me.first_name)
        );
        return Ok(());
    }

    let mut supervisor = WatcherSupervisor::new();
    for watcher in app.watchers {
        supervisor.spawn(watcher);
    }

    let cancel = CancellationToken::new();
    let settings = PollSettings {
        timeout_secs: config.telegram.poll_timeout_secs,
        ..PollSettings::default()
    };
    let poller = tokio::spawn(poll_loop(
        Arc::clone(&app.api),
        Arc::clone(&app.router),
        settings,
        cancel.clone(),
    ));
    info!(watchers = ?supervisor.names(), "{APP_NAME} running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(5), poller).await.is_err() {
        warn!("poller did not stop in time");
    }
    supervisor.shutdown().await;
    Ok(())
}
