//! Long-polling loop for `getUpdates`. Updates are handed to the router one
//! at a time, in the order Telegram delivered them.

use std::sync::Arc;
use std::time::Duration;

use pibot_core::{CallerIdentity, InboundMessage, Router};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TelegramApi;
use crate::error::TransportError;
use crate::types::Update;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub timeout_secs: u64,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Text messages from human senders become router input; everything else
/// (edits, stickers, bots, channel posts) is skipped.
pub fn to_inbound(update: Update) -> Option<InboundMessage> {
    let message = update.message?;
    let from = message.from?;
    if from.is_bot {
        return None;
    }
    let text = message.text?;
    let caller = CallerIdentity::new(from.id, from.display_name());
    Some(InboundMessage::new(message.chat.id, caller, text))
}

/// Dispatches a batch sequentially and returns the offset that acknowledges it.
pub async fn dispatch_updates(
    router: &Router,
    updates: Vec<Update>,
    mut offset: Option<i64>,
) -> Option<i64> {
    for update in updates {
        offset = Some(update.update_id + 1);
        let update_id = update.update_id;
        let Some(inbound) = to_inbound(update) else {
            debug!(update_id, "skipping non-text update");
            continue;
        };
        let caller_id = inbound.caller.id;
        let outcome = router.dispatch(inbound).await;
        debug!(update_id, caller_id, ?outcome, "update handled");
    }
    offset
}

/// One `getUpdates` round trip followed by dispatch of what it returned.
pub async fn poll_once(
    api: &TelegramApi,
    router: &Router,
    offset: Option<i64>,
    timeout_secs: u64,
) -> Result<Option<i64>, TransportError> {
    let updates = api.get_updates(offset, timeout_secs).await?;
    Ok(dispatch_updates(router, updates, offset).await)
}

/// Runs until `cancel` fires. Transport errors back off exponentially;
/// cancellation is only observed between dispatches.
pub async fn poll_loop(
    api: Arc<TelegramApi>,
    router: Arc<Router>,
    settings: PollSettings,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    let mut backoff = settings.initial_backoff;
    info!(timeout_secs = settings.timeout_secs, "telegram poller started");

    loop {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(offset, settings.timeout_secs) => result,
        };

        match fetched {
            Ok(updates) => {
                backoff = settings.initial_backoff;
                offset = dispatch_updates(&router, updates, offset).await;
            }
            Err(error) => {
                warn!(%error, backoff_secs = backoff.as_secs(), "getUpdates failed, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(settings.max_backoff);
            }
        }
    }
    info!("telegram poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).expect("update")
    }

    #[test]
    fn text_message_becomes_inbound() {
        let inbound = to_inbound(update(serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 2,
                "from": {"id": 4242, "is_bot": false, "first_name": "Ana"},
                "chat": {"id": 4242, "type": "private"},
                "text": "📊 Status"
            }
        })))
        .expect("inbound");
        assert_eq!(inbound.chat_id, 4242);
        assert_eq!(inbound.caller, CallerIdentity::new(4242, "Ana"));
        assert_eq!(inbound.text, "📊 Status");
    }

    #[test]
    fn non_text_and_bot_updates_are_skipped() {
        assert!(to_inbound(update(serde_json::json!({"update_id": 1}))).is_none());
        assert!(
            to_inbound(update(serde_json::json!({
                "update_id": 2,
                "message": {
                    "message_id": 3,
                    "from": {"id": 5, "is_bot": false, "first_name": "Ana"},
                    "chat": {"id": 5}
                }
            })))
            .is_none()
        );
        assert!(
            to_inbound(update(serde_json::json!({
                "update_id": 3,
                "message": {
                    "message_id": 4,
                    "from": {"id": 6, "is_bot": true, "first_name": "other_bot"},
                    "chat": {"id": 5},
                    "text": "/status"
                }
            })))
            .is_none()
        );
    }
}
