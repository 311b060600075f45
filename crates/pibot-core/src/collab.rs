//! Narrow interfaces to everything the bot does not own: the chat transport,
//! process execution, OS metrics, the remote PC and media downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::message::OutgoingMessage;

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<()>;
    async fn send_video(&self, chat_id: i64, path: &Path, caption: &str) -> Result<()>;
}

/// A process to run: either an argv vector or a string for `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub shell: bool,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: args.into_iter().map(Into::into).collect(),
            shell: false,
            cwd: None,
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            argv: vec![command.into()],
            shell: true,
            cwd: None,
        }
    }

    /// Splits a command line shell-style (quotes respected, no expansion).
    pub fn parse(command_line: &str) -> Result<Self> {
        let args = shlex::split(command_line)
            .ok_or_else(|| anyhow!("invalid command line: {command_line}"))?;
        if args.is_empty() {
            return Err(anyhow!("empty command line"));
        }
        Ok(Self::argv(args))
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    pub fn code_label(&self) -> String {
        self.exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string())
    }
}

/// Runs external processes. Timeouts are errors; a non-zero exit is not.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: Invocation, timeout: Duration) -> Result<ProcessOutput>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemSnapshot {
    pub hostname: String,
    pub cpu_per_core: Vec<f32>,
    pub ram_used: u64,
    pub ram_total: u64,
    pub disk_used: u64,
    pub disk_total: u64,
    pub temperature: Option<f64>,
    pub uptime_secs: u64,
    pub ip: Option<String>,
}

#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// CPU temperature in degrees Celsius.
    async fn cpu_temperature(&self) -> Result<f64>;
    async fn link_up(&self) -> Result<bool>;
    async fn snapshot(&self) -> Result<SystemSnapshot>;
    async fn disk_temperature(&self) -> Result<String>;
}

#[async_trait]
pub trait RemotePc: Send + Sync {
    async fn wake(&self) -> Result<()>;
    async fn shutdown(&self) -> Result<ProcessOutput>;
}

/// External endpoint that reports whether someone asked to wake the PC.
#[async_trait]
pub trait WakeSignalSource: Send + Sync {
    async fn poll(&self) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: String,
    pub duration_secs: Option<u64>,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<DownloadedMedia>;
}
