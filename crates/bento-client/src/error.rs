use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx reply; `detail` comes from the `{"detail": ...}` body when present.
    #[error("Server Error: {status} {detail}")]
    Server { status: u16, detail: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unknown profile {0}")]
    UnknownProfile(Uuid),
}

impl ClientError {
    /// Text shown to the user: the server's detail when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            Self::Server { detail, .. } if !detail.is_empty() => detail.clone(),
            other => other.to_string(),
        }
    }
}
