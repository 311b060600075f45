//! Inbound message dispatch: gate first, then any pending confirmation, then
//! the command itself.

mod command;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::FutureExt;
use pibot_common::PibotConfig;
use tracing::{debug, error, info, warn};

use crate::collab::{
    Invocation, MediaFetcher, MessageSink, ProcessOutput, ProcessRunner, RemotePc, SystemProbe,
};
use crate::confirm::{ConfirmationBroker, Decision, GuardedAction};
use crate::format::{self, code, pre, truncate_head, truncate_tail};
use crate::gate::{ACCESS_DENIED, CapabilityGate};
use crate::logbook::LogBook;
use crate::menu;
use crate::message::{InboundMessage, OutgoingMessage};

pub use command::Command;

/// Longest command line echoed back in a `/sh` reply.
const COMMAND_ECHO_CAP: usize = 64;

const HELP_TEXT: &str = "Commands:\n\
/status - system status\n\
/disk_temp - disk temperature\n\
/update_site - run the site deploy script\n\
/commit_force <message> - commit everything and force-push\n\
/wake - wake the PC\n\
/shutdown_pc - shut the PC down\n\
/sh <command> - run a shell command\n\
/logs - show the access log\n\
/clear_logs - reset the access log\n\
/download <url> - fetch a YouTube, TikTok or Instagram video";

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub deploy_command: String,
    pub repo_dir: PathBuf,
    pub push_branch: String,
    pub display_cap: usize,
    pub command_timeout: Duration,
    pub log_tail_lines: usize,
}

impl RouterSettings {
    pub fn from_config(config: &PibotConfig) -> Self {
        Self {
            deploy_command: config.site.deploy_command.clone(),
            repo_dir: config.site.repo_dir.clone(),
            push_branch: config.site.push_branch.clone(),
            display_cap: config.limits.display_cap,
            command_timeout: Duration::from_secs(config.limits.command_timeout_secs),
            log_tail_lines: config.limits.log_tail_lines,
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from_config(&PibotConfig::default())
    }
}

/// External services the handlers call into.
#[derive(Clone)]
pub struct Collaborators {
    pub sink: Arc<dyn MessageSink>,
    pub runner: Arc<dyn ProcessRunner>,
    pub probe: Arc<dyn SystemProbe>,
    pub remote: Arc<dyn RemotePc>,
    pub media: Arc<dyn MediaFetcher>,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Denied,
    Confirmed(GuardedAction),
    Cancelled(GuardedAction),
    Discarded(GuardedAction),
    Handled(&'static str),
    Failed(&'static str),
    Ignored,
}

pub struct Router {
    gate: CapabilityGate,
    broker: ConfirmationBroker,
    log: Arc<LogBook>,
    collab: Collaborators,
    settings: RouterSettings,
}

impl Router {
    pub fn new(
        owner: Option<i64>,
        log: Arc<LogBook>,
        collab: Collaborators,
        settings: RouterSettings,
    ) -> Self {
        Self {
            gate: CapabilityGate::new(owner, log.clone()),
            broker: ConfirmationBroker::new(),
            log,
            collab,
            settings,
        }
    }

    pub fn broker(&self) -> &ConfirmationBroker {
        &self.broker
    }

    /// Handles one message to completion. Handler failures and panics are
    /// reported to the chat and never escape.
    pub async fn dispatch(&self, inbound: InboundMessage) -> Outcome {
        let chat_id = inbound.chat_id;
        if !self.gate.authorize(&inbound).await {
            self.reply(chat_id, OutgoingMessage::plain(ACCESS_DENIED)).await;
            return Outcome::Denied;
        }

        match self.broker.resolve(inbound.caller.id, &inbound.text) {
            Decision::NotPending => {}
            Decision::Confirmed(action) => {
                info!(caller_id = inbound.caller.id, action = action.as_str(), "confirmed");
                self.guarded(chat_id, action.as_str(), self.run_action(chat_id, action))
                    .await;
                return Outcome::Confirmed(action);
            }
            Decision::Cancelled(action) => {
                info!(caller_id = inbound.caller.id, action = action.as_str(), "cancelled");
                let msg = OutgoingMessage::plain("❌ Cancelled.").with_keyboard(menu::main_keyboard());
                self.reply(chat_id, msg).await;
                return Outcome::Cancelled(action);
            }
            Decision::Discarded(action) => {
                info!(
                    caller_id = inbound.caller.id,
                    action = action.as_str(),
                    "pending confirmation dropped by unrelated reply"
                );
                // A guarded command replaces the dropped one and prompts again.
                if !matches!(
                    Command::parse(&inbound.text),
                    Some(Command::UpdateSite | Command::ShutdownPc)
                ) {
                    return Outcome::Discarded(action);
                }
            }
        }

        let Some(command) = Command::parse(&inbound.text) else {
            debug!(caller_id = inbound.caller.id, "ignoring unmatched input");
            return Outcome::Ignored;
        };
        let name = command.name();
        debug!(caller_id = inbound.caller.id, command = name, "dispatching");
        if self.guarded(chat_id, name, self.handle(&inbound, command)).await {
            Outcome::Handled(name)
        } else {
            Outcome::Failed(name)
        }
    }

    async fn guarded<F>(&self, chat_id: i64, name: &'static str, handler: F) -> bool
    where
        F: Future<Output = Result<()>>,
    {
        match AssertUnwindSafe(handler).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(command = name, error = %format!("{err:#}"), "handler failed");
                let detail = truncate_head(&format!("{err:#}"), self.settings.display_cap);
                self.reply(
                    chat_id,
                    OutgoingMessage::html(format!("❌ Unexpected error:\n{}", code(&detail))),
                )
                .await;
                false
            }
            Err(_) => {
                error!(command = name, "handler panicked");
                self.reply(
                    chat_id,
                    OutgoingMessage::plain("❌ Unexpected error: the command crashed."),
                )
                .await;
                false
            }
        }
    }

    async fn reply(&self, chat_id: i64, message: OutgoingMessage) {
        if let Err(err) = self.collab.sink.send(chat_id, message).await {
            warn!(chat_id, error = %format!("{err:#}"), "failed to deliver reply");
        }
    }

    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<()> {
        self.collab.sink.send(chat_id, message).await
    }

    async fn handle(&self, inbound: &InboundMessage, command: Command) -> Result<()> {
        let chat_id = inbound.chat_id;
        match command {
            Command::Start => {
                let greeting = format!("👋 Hello, {}!", inbound.caller.display_name);
                self.send(
                    chat_id,
                    OutgoingMessage::plain(greeting).with_keyboard(menu::main_keyboard()),
                )
                .await
            }
            Command::Help => self.send(chat_id, OutgoingMessage::plain(HELP_TEXT)).await,
            Command::PcMenu => {
                self.send(
                    chat_id,
                    OutgoingMessage::plain("💻 PC control").with_keyboard(menu::pc_keyboard()),
                )
                .await
            }
            Command::Status => self.status(chat_id).await,
            Command::DiskTemp => {
                let temp = self.collab.probe.disk_temperature().await?;
                self.send(
                    chat_id,
                    OutgoingMessage::html(format!("🧊 Disk temperature:\n{}", code(&temp))),
                )
                .await
            }
            Command::UpdateSite => {
                let prompt = self.broker.request(inbound.caller.id, GuardedAction::UpdateSite);
                self.send(chat_id, prompt).await
            }
            Command::ShutdownPc => {
                let prompt = self.broker.request(inbound.caller.id, GuardedAction::ShutdownPc);
                self.send(chat_id, prompt).await
            }
            Command::CommitForce(message) => self.commit_force(chat_id, &message).await,
            Command::Wake => {
                self.collab.remote.wake().await?;
                self.send(chat_id, OutgoingMessage::plain("⚡ Magic packet sent to the PC."))
                    .await
            }
            Command::Shell(cmd) => self.shell(chat_id, &cmd).await,
            Command::Logs => self.logs(chat_id).await,
            Command::ClearLogs => {
                let log = self.log.clone();
                tokio::task::spawn_blocking(move || log.reset())
                    .await
                    .context("log reset task failed")??;
                info!("log cleared on request");
                self.send(chat_id, OutgoingMessage::plain("🧹 Log cleared.")).await
            }
            Command::Download(url) => self.download(chat_id, &url).await,
        }
    }

    async fn run_action(&self, chat_id: i64, action: GuardedAction) -> Result<()> {
        match action {
            GuardedAction::UpdateSite => {
                let invocation = Invocation::parse(&self.settings.deploy_command)
                    .context("deploy command is not runnable")?;
                let output = self
                    .collab
                    .runner
                    .run(invocation, self.settings.command_timeout)
                    .await?;
                let body = code(&truncate_head(&output.combined(), self.settings.display_cap));
                let text = if output.success() {
                    format!("✅ Site updated:\n{body}")
                } else {
                    format!("❌ Error (code {}):\n{body}", output.code_label())
                };
                self.send(
                    chat_id,
                    OutgoingMessage::html(text).with_keyboard(menu::main_keyboard()),
                )
                .await
            }
            GuardedAction::ShutdownPc => {
                let output = self.collab.remote.shutdown().await?;
                let text = if output.success() {
                    "⏻ Shutdown command sent to the PC.".to_string()
                } else {
                    format!(
                        "❌ Shutdown failed (code {}):\n{}",
                        output.code_label(),
                        code(&truncate_head(&output.combined(), self.settings.display_cap))
                    )
                };
                self.send(
                    chat_id,
                    OutgoingMessage::html(text).with_keyboard(menu::pc_keyboard()),
                )
                .await
            }
        }
    }

    async fn status(&self, chat_id: i64) -> Result<()> {
        let snap = self.collab.probe.snapshot().await?;
        let cpu = snap
            .cpu_per_core
            .iter()
            .map(|usage| format!("{usage:.1}%"))
            .collect::<Vec<_>>()
            .join(" / ");
        let temp = snap
            .temperature
            .map(|celsius| format!("{celsius:.1} °C"))
            .unwrap_or_else(|| "N/A".to_string());
        let ip = snap.ip.as_deref().unwrap_or("N/A");
        let text = format!(
            "📡 <b>{} · System Status</b>\n\
             🧠 CPU: {}\n\
             💾 RAM: {}\n\
             📀 Disk: {}\n\
             🌡 Temp: {}\n\
             ⏱ Uptime: {}\n\
             🌐 IP: {}",
            format::html_escape(&snap.hostname),
            code(&cpu),
            code(&format!(
                "{} / {}",
                format::format_bytes(snap.ram_used),
                format::format_bytes(snap.ram_total)
            )),
            code(&format!(
                "{} / {}",
                format::format_bytes(snap.disk_used),
                format::format_bytes(snap.disk_total)
            )),
            code(&temp),
            code(&format::format_uptime(snap.uptime_secs)),
            code(ip),
        );
        self.send(chat_id, OutgoingMessage::html(text)).await
    }

    async fn commit_force(&self, chat_id: i64, message: &str) -> Result<()> {
        if message.is_empty() {
            return self
                .send(
                    chat_id,
                    OutgoingMessage::plain("❗ Give a commit message: /commit_force <message>"),
                )
                .await;
        }
        let status = self
            .git(&["status", "--porcelain"])
            .await
            .context("git status failed")?;
        if !status.success() {
            return self.report_git_failure(chat_id, "status", &status).await;
        }
        if status.stdout.trim().is_empty() {
            return self
                .send(chat_id, OutgoingMessage::plain("ℹ️ No changes to commit."))
                .await;
        }
        let branch = self.settings.push_branch.clone();
        let steps: [(&str, Vec<&str>); 3] = [
            ("add", vec!["add", "."]),
            ("commit", vec!["commit", "-m", message]),
            ("push", vec!["push", "-f", "origin", branch.as_str()]),
        ];
        for (step, args) in steps {
            let output = self
                .git(&args)
                .await
                .with_context(|| format!("git {step} failed"))?;
            if !output.success() {
                return self.report_git_failure(chat_id, step, &output).await;
            }
        }
        info!(branch = %branch, "force-pushed");
        self.send(
            chat_id,
            OutgoingMessage::html(format!("✅ Force-push done to {}", code(&branch))),
        )
        .await
    }

    async fn git(&self, args: &[&str]) -> Result<ProcessOutput> {
        let argv = std::iter::once("git").chain(args.iter().copied());
        let invocation = Invocation::argv(argv).in_dir(self.settings.repo_dir.clone());
        self.collab
            .runner
            .run(invocation, self.settings.command_timeout)
            .await
    }

    async fn report_git_failure(&self, chat_id: i64, step: &str, output: &ProcessOutput) -> Result<()> {
        warn!(step, code = %output.code_label(), "git step failed");
        let text = format!(
            "❌ Force-push failed at {} (code {}):\n{}",
            code(&format!("git {step}")),
            output.code_label(),
            code(&truncate_head(&output.combined(), self.settings.display_cap))
        );
        self.send(chat_id, OutgoingMessage::html(text)).await
    }

    async fn shell(&self, chat_id: i64, cmd: &str) -> Result<()> {
        if cmd.is_empty() {
            return self
                .send(chat_id, OutgoingMessage::plain("❗ Usage: /sh <command>"))
                .await;
        }
        info!(command = "sh", line = %cmd, "running shell command");
        let output = self
            .collab
            .runner
            .run(Invocation::shell(cmd), self.settings.command_timeout)
            .await?;
        let echoed = format::ellipsize(cmd, COMMAND_ECHO_CAP);
        let label = output.code_label();
        // The cap covers the whole visible message, header included.
        let header_chars = format!("💻 {echoed} exited with {label}:\n").chars().count();
        let budget = self
            .settings
            .display_cap
            .saturating_sub(header_chars + format::HEAD_TRUNCATION_MARKER.chars().count());
        let combined = output.combined();
        let body = if combined.trim().is_empty() {
            "(no output)".to_string()
        } else {
            truncate_head(combined.trim_end(), budget)
        };
        let text = format!(
            "💻 {} exited with {}:\n{}",
            code(&echoed),
            label,
            pre(&body)
        );
        self.send(chat_id, OutgoingMessage::html(text)).await
    }

    async fn logs(&self, chat_id: i64) -> Result<()> {
        let log = self.log.clone();
        let lines = self.settings.log_tail_lines;
        let tail = tokio::task::spawn_blocking(move || log.tail(lines))
            .await
            .context("log read task failed")??;
        let text = format!(
            "📜 Access log:\n{}",
            pre(&truncate_tail(&tail, self.settings.display_cap))
        );
        self.send(chat_id, OutgoingMessage::html(text)).await
    }

    async fn download(&self, chat_id: i64, url: &str) -> Result<()> {
        if url.is_empty() {
            return self
                .send(chat_id, OutgoingMessage::plain("❗ Usage: /download <url>"))
                .await;
        }
        self.send(chat_id, OutgoingMessage::plain("⏳ Downloading..."))
            .await?;
        let media = self.collab.media.fetch(url).await?;
        let caption = match media.duration_secs {
            Some(secs) => format!("🎬 {} ({})", media.title, format::format_uptime(secs)),
            None => format!("🎬 {}", media.title),
        };
        let sent = self
            .collab
            .sink
            .send_video(chat_id, &media.path, &caption)
            .await;
        if let Err(err) = tokio::fs::remove_file(&media.path).await {
            warn!(path = %media.path.display(), error = %err, "failed to remove downloaded file");
        }
        sent.context("failed to upload video")
    }
}
