//! Raw calls to the Telegram Bot API: `getMe`, `getUpdates`, `sendMessage`
//! and `sendVideo`.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::types::{ApiResponse, ReplyMarkup, SentMessage, Update, User};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Slack on top of the long-poll timeout before the HTTP client gives up.
const REQUEST_SLACK: Duration = Duration::from_secs(15);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self, TransportError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TransportError::EmptyToken);
        }
        let client = Client::builder()
            .timeout(poll_timeout + REQUEST_SLACK)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &'static str,
        response: reqwest::Response,
    ) -> Result<Option<T>, TransportError> {
        let body: ApiResponse<T> = response.json().await?;
        if !body.ok {
            let description = body.description.unwrap_or_default();
            warn!(method, %description, "telegram call rejected");
            return Err(TransportError::Api {
                method,
                description,
            });
        }
        Ok(body.result)
    }

    /// Identity of the bot; doubles as a credential check.
    pub async fn get_me(&self) -> Result<User, TransportError> {
        let response = self.client.get(self.endpoint("getMe")).send().await?;
        Self::unwrap_response::<User>("getMe", response)
            .await?
            .ok_or(TransportError::Api {
                method: "getMe",
                description: "empty result".to_string(),
            })
    }

    /// Long-polls for updates. `offset` acknowledges everything below it.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let response = self
            .client
            .post(self.endpoint("getUpdates"))
            .json(&body)
            .send()
            .await?;
        Ok(Self::unwrap_response::<Vec<Update>>("getUpdates", response)
            .await?
            .unwrap_or_default())
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<&str>,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<i64, TransportError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = json!(mode);
        }
        if let Some(markup) = reply_markup {
            body["reply_markup"] = serde_json::to_value(markup)?;
        }
        debug!(chat_id, "sendMessage");
        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&body)
            .send()
            .await?;
        Ok(Self::unwrap_response::<SentMessage>("sendMessage", response)
            .await?
            .map(|sent| sent.message_id)
            .unwrap_or(0))
    }

    /// Uploads a local video file as a multipart form.
    pub async fn send_video(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<i64, TransportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| TransportError::Attachment {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("supports_streaming", "true")
            .part("video", Part::bytes(bytes).file_name(file_name));

        debug!(chat_id, path = %path.display(), "sendVideo");
        let response = self
            .client
            .post(self.endpoint("sendVideo"))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        Ok(Self::unwrap_response::<SentMessage>("sendVideo", response)
            .await?
            .map(|sent| sent.message_id)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use tempfile::tempdir;

    fn api(server: &MockServer) -> TelegramApi {
        TelegramApi::new(&server.base_url(), "123:abc", Duration::from_secs(1)).expect("api")
    }

    #[test]
    fn rejects_blank_token() {
        let result = TelegramApi::new(DEFAULT_API_BASE, "  ", Duration::from_secs(1));
        assert!(matches!(result, Err(TransportError::EmptyToken)));
    }

    #[tokio::test]
    async fn get_me_returns_bot_identity() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/bot123:abc/getMe");
                then.status(200).json_body(serde_json::json!({
                    "ok": true,
                    "result": {"id": 1, "is_bot": true, "first_name": "pibot", "username": "pi_bot"}
                }));
            })
            .await;
        let me = api(&server).get_me().await.expect("get_me");
        assert!(me.is_bot);
        assert_eq!(me.username.as_deref(), Some("pi_bot"));
    }

    #[tokio::test]
    async fn unauthorized_token_maps_to_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/bot123:abc/getMe");
                then.status(401)
                    .json_body(serde_json::json!({"ok": false, "description": "Unauthorized"}));
            })
            .await;
        let err = api(&server).get_me().await.expect_err("should fail");
        assert!(
            matches!(err, TransportError::Api { method: "getMe", ref description } if description == "Unauthorized")
        );
    }

    #[tokio::test]
    async fn send_message_posts_html_and_keyboard() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/bot123:abc/sendMessage")
                    .json_body_partial(
                        r#"{"chat_id": 4242, "parse_mode": "HTML", "reply_markup": {"remove_keyboard": true}}"#,
                    );
                then.status(200)
                    .json_body(serde_json::json!({"ok": true, "result": {"message_id": 31}}));
            })
            .await;
        let markup = crate::types::reply_markup(&pibot_core::KeyboardAction::Remove);
        let id = api(&server)
            .send_message(4242, "<b>hi</b>", Some("HTML"), markup)
            .await
            .expect("send");
        assert_eq!(id, 31);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_video_uploads_file() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/bot123:abc/sendVideo")
                    .body_contains("clip.mp4")
                    .body_contains("Cat video");
                then.status(200)
                    .json_body(serde_json::json!({"ok": true, "result": {"message_id": 8}}));
            })
            .await;
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("clip.mp4");
        std::fs::write(&path, b"fake video").expect("write");

        let id = api(&server)
            .send_video(4242, &path, "Cat video")
            .await
            .expect("send_video");
        assert_eq!(id, 8);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_video_file_is_reported() {
        let server = MockServer::start_async().await;
        let err = api(&server)
            .send_video(1, Path::new("/nonexistent/clip.mp4"), "")
            .await
            .expect_err("should fail");
        assert!(matches!(err, TransportError::Attachment { .. }));
    }
}
