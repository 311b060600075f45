use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat};
use tempfile::NamedTempFile;

use crate::message::CallerIdentity;

pub const RESET_HEADER: &str = "log started";

/// Append-only text log of rejected callers.
///
/// Every line is `[ISO-8601 timestamp] text`. A reset replaces the whole file
/// with a single header line through a temp file and rename, so a reader never
/// observes a half-written file. All writes go through one lock.
#[derive(Debug)]
pub struct LogBook {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LogBook {
    /// Opens the log, seeding it with a header line when it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let book = Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        };
        if !path.exists() {
            book.reset()?;
        }
        Ok(book)
    }

    pub fn append(&self, text: &str) -> Result<()> {
        let line = format_line(Local::now(), &single_line(text));
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to log {}", self.path.display()))?;
        Ok(())
    }

    pub fn record_denial(&self, caller: &CallerIdentity, text: &str) -> Result<()> {
        self.append(&format!(
            "denied id={} name={:?} text={:?}",
            caller.id, caller.display_name, text
        ))
    }

    /// Truncates the log down to a single fresh header line.
    pub fn reset(&self) -> Result<()> {
        self.reset_at(Local::now())
    }

    pub fn reset_at(&self, now: DateTime<Local>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to stage log reset in {}", dir.display()))?;
        tmp.write_all(format_line(now, RESET_HEADER).as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace log {}", self.path.display()))?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read log {}", self.path.display()))
    }

    pub fn tail(&self, lines: usize) -> Result<String> {
        let raw = self.read_all()?;
        let all: Vec<&str> = raw.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].join("\n"))
    }

    pub fn line_count(&self) -> Result<usize> {
        Ok(self.read_all()?.lines().count())
    }
}

fn format_line(at: DateTime<Local>, text: &str) -> String {
    format!("[{}] {}\n", at.to_rfc3339_opts(SecondsFormat::Secs, false), text)
}

fn single_line(text: &str) -> String {
    text.replace('\r', "").replace('\n', "\\n")
}
