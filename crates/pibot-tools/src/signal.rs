use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use pibot_core::WakeSignalSource;
use url::Url;

/// Polls an HTTP endpoint that answers whether a wake was requested.
///
/// Accepted bodies: JSON `{"wake": true}`, a bare JSON boolean, or plain
/// text `1`, `true`, `yes`, `wake`. Anything else counts as no signal.
pub struct HttpWakeSignal {
    client: reqwest::Client,
    url: Url,
    key: Option<String>,
}

impl HttpWakeSignal {
    pub fn new(url: &str, key: Option<String>, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid wake signal url {url}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("wake signal url must be http(s): {url}");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            url,
            key: key.filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl WakeSignalSource for HttpWakeSignal {
    async fn poll(&self) -> Result<bool> {
        let mut request = self.client.get(self.url.clone());
        if let Some(key) = &self.key {
            request = request.query(&[("key", key.as_str())]);
        }
        let response = request.send().await.context("wake signal request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("wake signal endpoint returned {status}");
        }
        let body = response.text().await.context("failed to read wake signal body")?;
        Ok(parse_signal(&body))
    }
}

pub fn parse_signal(body: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Bool(flag)) => flag,
        Ok(serde_json::Value::Object(map)) => map
            .get("wake")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        Ok(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
        _ => matches!(
            body.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "wake"
        ),
    }
}
