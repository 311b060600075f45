use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use pibot_core::{MessageSink, OutgoingMessage, TextFormat};

use crate::api::TelegramApi;
use crate::types::reply_markup;

/// Delivers router replies and watcher alerts through the Bot API.
#[derive(Clone)]
pub struct TelegramSink {
    api: Arc<TelegramApi>,
}

impl TelegramSink {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self { api }
    }
}

fn parse_mode(format: TextFormat) -> Option<&'static str> {
    match format {
        TextFormat::Plain => None,
        TextFormat::Html => Some("HTML"),
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<()> {
        self.api
            .send_message(
                chat_id,
                &message.text,
                parse_mode(message.format),
                reply_markup(&message.keyboard),
            )
            .await?;
        Ok(())
    }

    async fn send_video(&self, chat_id: i64, path: &Path, caption: &str) -> Result<()> {
        self.api.send_video(chat_id, path, caption).await?;
        Ok(())
    }
}
