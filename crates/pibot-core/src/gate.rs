use std::sync::Arc;

use tracing::{error, warn};

use crate::logbook::LogBook;
use crate::message::InboundMessage;

pub const ACCESS_DENIED: &str = "You don't have access 🙅";

/// Decides whether a caller may run privileged commands.
///
/// Exactly one owner id is allowed. Without a configured owner the gate
/// rejects everyone.
pub struct CapabilityGate {
    owner: Option<i64>,
    log: Arc<LogBook>,
}

impl CapabilityGate {
    pub fn new(owner: Option<i64>, log: Arc<LogBook>) -> Self {
        if owner.is_none() {
            error!("no owner id configured; every caller will be rejected");
        }
        Self { owner, log }
    }

    /// Returns `true` for the owner. Any other caller is written to the log
    /// book on the blocking pool.
    pub async fn authorize(&self, inbound: &InboundMessage) -> bool {
        if self.owner == Some(inbound.caller.id) {
            return true;
        }
        warn!(
            caller_id = inbound.caller.id,
            caller_name = %inbound.caller.display_name,
            "rejected caller"
        );
        let log = self.log.clone();
        let caller = inbound.caller.clone();
        let text = inbound.text.clone();
        match tokio::task::spawn_blocking(move || log.record_denial(&caller, &text)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %format!("{err:#}"), "failed to record rejected caller"),
            Err(err) => warn!(error = %err, "denial log task failed"),
        }
        false
    }
}
