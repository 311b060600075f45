use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::Watcher;

/// Runs each watcher in its own task. A failing or panicking tick is logged
/// and the loop goes back to sleep; nothing short of cancellation stops it.
#[derive(Default)]
pub struct WatcherSupervisor {
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl WatcherSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, watcher: Box<dyn Watcher>) {
        let name = watcher.name().to_string();
        let cancel = self.cancel.child_token();
        info!(watcher = %name, "starting watcher");
        let handle = tokio::spawn(run_watcher(watcher, cancel));
        self.handles.push((name, handle));
    }

    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Stops every watcher and waits for its task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.handles {
            if let Err(err) = handle.await {
                warn!(watcher = %name, error = %err, "watcher task ended abnormally");
            }
        }
    }
}

async fn run_watcher(mut watcher: Box<dyn Watcher>, cancel: CancellationToken) {
    loop {
        let delay = watcher.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        let outcome = AssertUnwindSafe(watcher.tick()).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(watcher = %watcher.name(), error = %format!("{err:#}"), "watcher tick failed");
            }
            Err(_) => {
                error!(watcher = %watcher.name(), "watcher tick panicked");
            }
        }
    }
    info!(watcher = %watcher.name(), "watcher stopped");
}
