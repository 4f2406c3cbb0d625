use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{ChatRole, Choice, Hit, MessageStatus, PolicyConfig, PrivacyReceipt, ProfileToggles, Verdict};

// -- JWT Claims --

/// Bearer-token claims. Issued by `/auth/login` and checked by the profile
/// and analytics middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

// -- Interception --

fn default_source() -> String {
    "api-gateway".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterceptMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptRequest {
    /// Usually `{input, model}`, but any JSON object is scanned.
    pub payload: Value,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_config: Option<PolicyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<InterceptMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterceptStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "REQUIRES_CONFIRMATION")]
    RequiresConfirmation,
    #[serde(rename = "cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptResponse {
    pub status: InterceptStatus,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hits: Option<Vec<Hit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PrivacyReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
}

impl InterceptResponse {
    pub fn new(status: InterceptStatus) -> Self {
        Self {
            status,
            processed_at: Utc::now(),
            redacted_payload: None,
            verdict: None,
            compliance_score: None,
            reasoning: None,
            pending_id: None,
            violation_details: None,
            hits: None,
            receipt: None,
            ai_response: None,
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub pending_id: Uuid,
    pub choice: Choice,
    #[serde(default = "default_provider")]
    pub llm_provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub pending_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

// -- Scan --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub original: String,
    pub redacted: String,
    pub has_pii: bool,
}

// -- Profiles --

fn default_icon() -> String {
    "User".to_string()
}

fn default_color() -> String {
    "text-zinc-400".to_string()
}

fn default_description() -> String {
    "Custom user profile".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCreateRequest {
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon_name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default)]
    pub toggles: ProfileToggles,
    #[serde(default)]
    pub custom_keywords: Vec<String>,
}

/// Partial update: only the present fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggles: Option<ProfileToggles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ProfileUpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.icon_name.is_none()
            && self.color.is_none()
            && self.description.is_none()
            && self.toggles.is_none()
            && self.custom_keywords.is_none()
            && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub icon_name: String,
    pub color: String,
    pub description: String,
    pub is_active: bool,
    pub redact_email: bool,
    pub redact_phone: bool,
    pub redact_names: bool,
    pub redact_payment: bool,
    pub redact_location: bool,
    pub redact_credentials: bool,
    pub custom_keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileResponse {
    pub fn toggles(&self) -> ProfileToggles {
        ProfileToggles {
            email: self.redact_email,
            phone: self.redact_phone,
            names: self.redact_names,
            payment: self.redact_payment,
            location: self.redact_location,
            credentials: self.redact_credentials,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStatusResponse {
    pub setup_required: bool,
    pub profiles: Vec<ProfileResponse>,
    pub active_profile_id: Option<Uuid>,
}

// -- Analytics --

fn default_range() -> String {
    "24h".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default = "default_range")]
    pub range: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatCard {
    pub title: String,
    pub value: String,
    pub change: String,
    pub trend: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentAlert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub time: DateTime<Utc>,
    pub status: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficPoint {
    pub name: String,
    pub requests: u64,
    pub blocked: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub safety_score: u32,
    pub stats: Vec<StatCard>,
    pub recent_alerts: Vec<RecentAlert>,
    pub traffic_chart: Vec<TrafficPoint>,
}

// -- History --

fn default_history_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub date: DateTime<Utc>,
    pub model: String,
    pub status: String,
    pub verdict_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryDetail {
    pub id: String,
    pub messages: Vec<HistoryMessage>,
}

// -- Health --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub database: ComponentCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    pub checks: HealthChecks,
}
