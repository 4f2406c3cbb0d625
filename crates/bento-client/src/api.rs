use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use uuid::Uuid;

use bento_types::api::{
    AnalyticsResponse, CancelRequest, ConfirmRequest, ErrorBody, HealthResponse, HistoryDetail,
    HistoryItem, InterceptRequest, InterceptResponse, LoginRequest, LoginResponse,
    ProfileCreateRequest, ProfileResponse, ProfileStatusResponse, ProfileUpdateRequest,
    RegisterRequest, RegisterResponse, StatusMessage,
};
use bento_types::models::Choice;

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_PROVIDER: &str = "gemini";

pub type FeedSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The gateway calls the client state machines depend on.
#[async_trait]
pub trait ShieldApi: Send + Sync {
    async fn intercept(&self, req: &InterceptRequest) -> Result<InterceptResponse, ClientError>;
    async fn confirm(&self, pending_id: Uuid, choice: Choice) -> Result<InterceptResponse, ClientError>;
    async fn cancel(&self, req: &CancelRequest) -> Result<StatusMessage, ClientError>;
    async fn history_detail(&self, conversation_id: &str) -> Result<HistoryDetail, ClientError>;

    async fn profile_status(&self) -> Result<ProfileStatusResponse, ClientError>;
    async fn create_profile(&self, req: &ProfileCreateRequest) -> Result<ProfileResponse, ClientError>;
    async fn update_profile(
        &self,
        profile_id: Uuid,
        req: &ProfileUpdateRequest,
    ) -> Result<ProfileResponse, ClientError>;
    async fn delete_profile(&self, profile_id: Uuid) -> Result<(), ClientError>;
    async fn activate_profile(&self, profile_id: Uuid) -> Result<ProfileResponse, ClientError>;

    async fn health(&self) -> Result<HealthResponse, ClientError>;
    async fn analytics(&self, range: &str) -> Result<AnalyticsResponse, ClientError>;
}

/// `ShieldApi` over HTTP. Sends the bearer token when logged in and the
/// shared secret key when configured.
#[derive(Clone)]
pub struct HttpShieldApi {
    http: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
    token: Option<String>,
}

impl HttpShieldApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: None,
            token: None,
        }
    }

    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(key.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.secret_key {
            req = req.header("X-Bento-Secret-Key", key);
        }
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    pub async fn register(&mut self, username: &str, password: &str) -> Result<RegisterResponse, ClientError> {
        let body = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: RegisterResponse =
            decode(self.request(Method::POST, "/auth/register").json(&body).send().await?).await?;
        self.token = Some(resp.token.clone());
        Ok(resp)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: LoginResponse =
            decode(self.request(Method::POST, "/auth/login").json(&body).send().await?).await?;
        self.token = Some(resp.token.clone());
        Ok(resp)
    }

    pub async fn history(&self, limit: u32) -> Result<Vec<HistoryItem>, ClientError> {
        let path = format!("/api/v1/history?limit={}", limit);
        decode(self.request(Method::GET, &path).send().await?).await
    }

    pub async fn delete_history(&self, conversation_id: &str) -> Result<StatusMessage, ClientError> {
        let path = format!("/api/v1/history/{}", conversation_id);
        decode(self.request(Method::DELETE, &path).send().await?).await
    }

    /// Raw CSV bytes of the audit log export.
    pub async fn export_audit_csv(&self) -> Result<Vec<u8>, ClientError> {
        let resp = check(self.request(Method::GET, "/api/v1/export/audit-csv").send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// `ws://` URL of the realtime audit feed.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/api/v1/realtime", ws_base)
    }

    pub async fn connect_feed(&self) -> Result<FeedSocket, ClientError> {
        let url = self.realtime_url();
        let (socket, resp) = connect_async(url.as_str()).await?;
        debug!("Realtime feed connected ({})", resp.status());
        Ok(socket)
    }
}

impl Default for HttpShieldApi {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Turn a non-2xx reply into `ClientError::Server`.
async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.detail)
        .unwrap_or(text);
    Err(ClientError::Server {
        status: status.as_u16(),
        detail,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let resp = check(resp).await?;
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Malformed(e.to_string()))
}

#[async_trait]
impl ShieldApi for HttpShieldApi {
    async fn intercept(&self, req: &InterceptRequest) -> Result<InterceptResponse, ClientError> {
        decode(self.request(Method::POST, "/api/v1/intercept").json(req).send().await?).await
    }

    async fn confirm(&self, pending_id: Uuid, choice: Choice) -> Result<InterceptResponse, ClientError> {
        let body = ConfirmRequest {
            pending_id,
            choice,
            llm_provider: DEFAULT_PROVIDER.to_string(),
        };
        decode(self.request(Method::POST, "/api/v1/intercept/confirm").json(&body).send().await?).await
    }

    async fn cancel(&self, req: &CancelRequest) -> Result<StatusMessage, ClientError> {
        decode(self.request(Method::POST, "/api/v1/cancel").json(req).send().await?).await
    }

    async fn history_detail(&self, conversation_id: &str) -> Result<HistoryDetail, ClientError> {
        let path = format!("/api/v1/history/{}", conversation_id);
        decode(self.request(Method::GET, &path).send().await?).await
    }

    async fn profile_status(&self) -> Result<ProfileStatusResponse, ClientError> {
        decode(self.request(Method::GET, "/api/v1/profiles/status").send().await?).await
    }

    async fn create_profile(&self, req: &ProfileCreateRequest) -> Result<ProfileResponse, ClientError> {
        decode(self.request(Method::POST, "/api/v1/profiles").json(req).send().await?).await
    }

    async fn update_profile(
        &self,
        profile_id: Uuid,
        req: &ProfileUpdateRequest,
    ) -> Result<ProfileResponse, ClientError> {
        let path = format!("/api/v1/profiles/{}", profile_id);
        decode(self.request(Method::PATCH, &path).json(req).send().await?).await
    }

    async fn delete_profile(&self, profile_id: Uuid) -> Result<(), ClientError> {
        let path = format!("/api/v1/profiles/{}", profile_id);
        check(self.request(Method::DELETE, &path).send().await?).await?;
        Ok(())
    }

    async fn activate_profile(&self, profile_id: Uuid) -> Result<ProfileResponse, ClientError> {
        let path = format!("/api/v1/profiles/{}/activate", profile_id);
        decode(self.request(Method::POST, &path).send().await?).await
    }

    async fn health(&self) -> Result<HealthResponse, ClientError> {
        decode(self.request(Method::GET, "/health").send().await?).await
    }

    async fn analytics(&self, range: &str) -> Result<AnalyticsResponse, ClientError> {
        let path = format!("/api/v1/analytics?range={}", range);
        decode(self.request(Method::GET, &path).send().await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_follows_scheme() {
        assert_eq!(
            HttpShieldApi::new("http://localhost:8000/").realtime_url(),
            "ws://localhost:8000/api/v1/realtime"
        );
        assert_eq!(
            HttpShieldApi::new("https://bento.example").realtime_url(),
            "wss://bento.example/api/v1/realtime"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_an_http_error() {
        let api = HttpShieldApi::new("http://127.0.0.1:9");
        let err = api.health().await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
    }

    #[tokio::test]
    async fn secure_feed_urls_are_supported() {
        use tokio_tungstenite::tungstenite::{Error as WsError, error::UrlError};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let api = HttpShieldApi::new(format!("https://127.0.0.1:{}", port));
        assert!(api.realtime_url().starts_with("wss://"));
        let err = api.connect_feed().await.unwrap_err();
        assert!(
            !matches!(err, ClientError::WebSocket(WsError::Url(UrlError::TlsFeatureNotEnabled))),
            "{}",
            err
        );
    }
}
