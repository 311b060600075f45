//! Telegram Bot API transport: long polling for inbound messages and a
//! [`pibot_core::MessageSink`] for replies, alerts and videos.

pub mod api;
pub mod error;
pub mod poller;
pub mod sink;
pub mod types;

pub use api::TelegramApi;
pub use error::TransportError;
pub use poller::{PollSettings, dispatch_updates, poll_loop, poll_once, to_inbound};
pub use sink::TelegramSink;
