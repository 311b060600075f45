use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use pibot_core::{Invocation, ProcessOutput, ProcessRunner};
use tracing::debug;
use wait_timeout::ChildExt;

/// Runs processes on the host. Each run occupies one blocking-pool thread
/// until the child exits or the timeout kills it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: Invocation, timeout: Duration) -> Result<ProcessOutput> {
        tokio::task::spawn_blocking(move || run_blocking(&invocation, timeout))
            .await
            .context("process task failed")?
    }
}

fn build_command(invocation: &Invocation) -> Result<Command> {
    let mut command = if invocation.shell {
        let line = invocation
            .argv
            .first()
            .ok_or_else(|| anyhow!("empty shell command"))?;
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    } else {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd
    };
    if let Some(dir) = &invocation.cwd {
        command.current_dir(dir);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    Ok(command)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn run_blocking(invocation: &Invocation, timeout: Duration) -> Result<ProcessOutput> {
    let label = invocation.display();
    debug!(command = %label, "spawning");
    let mut child = build_command(invocation)?
        .spawn()
        .with_context(|| format!("failed to spawn command '{label}'"))?;

    // Pipes are drained concurrently so a chatty child cannot block on a full buffer.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            bail!("command '{label}' timed out after {}s", timeout.as_secs());
        }
    };

    let stdout = stdout.join().map_err(|_| anyhow!("stdout reader panicked"))?;
    let stderr = stderr.join().map_err(|_| anyhow!("stderr reader panicked"))?;
    Ok(ProcessOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}
