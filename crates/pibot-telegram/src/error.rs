use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bot token is empty")]
    EmptyToken,
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram {method} rejected: {description}")]
    Api {
        method: &'static str,
        description: String,
    },
    #[error("failed to read {path}: {source}")]
    Attachment {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}
