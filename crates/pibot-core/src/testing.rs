//! In-memory collaborators for tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::collab::{
    DownloadedMedia, Invocation, MediaFetcher, MessageSink, ProcessOutput, ProcessRunner,
    RemotePc, SystemProbe, SystemSnapshot, WakeSignalSource,
};
use crate::message::OutgoingMessage;

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(i64, OutgoingMessage)>>,
    videos: Mutex<Vec<(i64, PathBuf, String)>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send returns an error and records nothing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<(i64, OutgoingMessage)> {
        locked(&self.messages).clone()
    }

    pub fn texts(&self) -> Vec<String> {
        locked(&self.messages)
            .iter()
            .map(|(_, msg)| msg.text.clone())
            .collect()
    }

    pub fn last(&self) -> Option<OutgoingMessage> {
        locked(&self.messages).last().map(|(_, msg)| msg.clone())
    }

    pub fn videos(&self) -> Vec<(i64, PathBuf, String)> {
        locked(&self.videos).clone()
    }

    pub fn clear(&self) {
        locked(&self.messages).clear();
        locked(&self.videos).clear();
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("sink unavailable"));
        }
        locked(&self.messages).push((chat_id, message));
        Ok(())
    }

    async fn send_video(&self, chat_id: i64, path: &Path, caption: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("sink unavailable"));
        }
        locked(&self.videos).push((chat_id, path.to_path_buf(), caption.to_string()));
        Ok(())
    }
}

/// Replays queued results in order; once the queue is empty every call
/// succeeds with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<ProcessOutput, String>>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, exit_code: i32, stdout: &str, stderr: &str) {
        locked(&self.script).push_back(Ok(ProcessOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }));
    }

    pub fn push_error(&self, message: &str) {
        locked(&self.script).push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<Invocation> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: Invocation, _timeout: Duration) -> Result<ProcessOutput> {
        locked(&self.calls).push(invocation);
        match locked(&self.script).pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(ProcessOutput {
                exit_code: Some(0),
                ..ProcessOutput::default()
            }),
        }
    }
}

#[derive(Debug)]
pub struct FakeProbe {
    temperature: Mutex<Option<f64>>,
    link_up: AtomicBool,
    panic_next: AtomicBool,
    snapshot: Mutex<SystemSnapshot>,
    disk_temperature: Mutex<String>,
    temperature_reads: AtomicUsize,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            temperature: Mutex::new(Some(45.0)),
            link_up: AtomicBool::new(true),
            panic_next: AtomicBool::new(false),
            snapshot: Mutex::new(SystemSnapshot {
                hostname: "pi".to_string(),
                cpu_per_core: vec![12.5, 3.0],
                ram_used: 512 * 1024 * 1024,
                ram_total: 4 * 1024 * 1024 * 1024,
                disk_used: 10 * 1024 * 1024 * 1024,
                disk_total: 64 * 1024 * 1024 * 1024,
                temperature: Some(45.0),
                uptime_secs: 3661,
                ip: Some("192.168.1.10".to_string()),
            }),
            disk_temperature: Mutex::new("34 °C".to_string()),
            temperature_reads: AtomicUsize::new(0),
        }
    }
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` makes the sensor read fail.
    pub fn set_temperature(&self, celsius: Option<f64>) {
        *locked(&self.temperature) = celsius;
    }

    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
    }

    pub fn panic_on_next_read(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn set_snapshot(&self, snapshot: SystemSnapshot) {
        *locked(&self.snapshot) = snapshot;
    }

    pub fn temperature_reads(&self) -> usize {
        self.temperature_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SystemProbe for FakeProbe {
    async fn cpu_temperature(&self) -> Result<f64> {
        self.temperature_reads.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("sensor driver crashed");
        }
        (*locked(&self.temperature)).ok_or_else(|| anyhow!("thermal zone unreadable"))
    }

    async fn link_up(&self) -> Result<bool> {
        Ok(self.link_up.load(Ordering::SeqCst))
    }

    async fn snapshot(&self) -> Result<SystemSnapshot> {
        Ok(locked(&self.snapshot).clone())
    }

    async fn disk_temperature(&self) -> Result<String> {
        Ok(locked(&self.disk_temperature).clone())
    }
}

#[derive(Debug, Default)]
pub struct FakeRemotePc {
    wakes: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl FakeRemotePc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wakes(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemotePc for FakeRemotePc {
    async fn wake(&self) -> Result<()> {
        self.wakes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<ProcessOutput> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessOutput {
            exit_code: Some(0),
            ..ProcessOutput::default()
        })
    }
}

/// Returns queued answers, then `false` forever.
#[derive(Debug, Default)]
pub struct FakeWakeSource {
    answers: Mutex<VecDeque<Result<bool, String>>>,
}

impl FakeWakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, signal: bool) {
        locked(&self.answers).push_back(Ok(signal));
    }

    pub fn push_error(&self, message: &str) {
        locked(&self.answers).push_back(Err(message.to_string()));
    }
}

#[async_trait]
impl WakeSignalSource for FakeWakeSource {
    async fn poll(&self) -> Result<bool> {
        match locked(&self.answers).pop_front() {
            Some(Ok(signal)) => Ok(signal),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(false),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeMedia {
    result: Mutex<Option<DownloadedMedia>>,
    requested: Mutex<Vec<String>>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn will_return(&self, media: DownloadedMedia) {
        *locked(&self.result) = Some(media);
    }

    pub fn requested(&self) -> Vec<String> {
        locked(&self.requested).clone()
    }
}

#[async_trait]
impl MediaFetcher for FakeMedia {
    async fn fetch(&self, url: &str) -> Result<DownloadedMedia> {
        locked(&self.requested).push(url.to_string());
        locked(&self.result)
            .clone()
            .ok_or_else(|| anyhow!("unsupported link: {url}"))
    }
}
