use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outcome recorded for every audited request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Valid,
    Flagged,
    Rejected,
    Canceled,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Flagged => "FLAGGED",
            Self::Rejected => "REJECTED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Anything other than `VALID` counts against the safety score.
    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::Valid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VALID" => Ok(Self::Valid),
            "FLAGGED" => Ok(Self::Flagged),
            "REJECTED" => Ok(Self::Rejected),
            // older rows spell it with two Ls
            "CANCELED" | "CANCELLED" => Ok(Self::Canceled),
            other => Err(format!("unknown verdict '{}'", other)),
        }
    }
}

/// Per-message status shared by the server's chat log and the client view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Scanning,
    Verified,
    Warning,
    Insecure,
    Glitch,
    Canceled,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Scanning => "scanning",
            Self::Verified => "verified",
            Self::Warning => "warning",
            Self::Insecure => "insecure",
            Self::Glitch => "glitch",
            Self::Canceled => "canceled",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(Self::Sending),
            "scanning" => Ok(Self::Scanning),
            "verified" => Ok(Self::Verified),
            "warning" => Ok(Self::Warning),
            "insecure" => Ok(Self::Insecure),
            "glitch" => Ok(Self::Glitch),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown message status '{}'", other)),
        }
    }
}

/// Author of a chat message. Stored as `user`/`assistant`, shown as `user`/`ai`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Ai,
}

impl ChatRole {
    /// Column value in `chat_messages.role`.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "assistant",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        if s == "user" { Self::User } else { Self::Ai }
    }
}

/// The user's decision on an intercepted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Choice {
    /// Forward the redacted payload.
    Safe,
    /// Forward the original payload (bypass).
    Original,
    Cancel,
}

/// Category of a detected sensitive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HitKind {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "phone")]
    Phone,
    #[serde(rename = "credit_card")]
    CreditCard,
    #[serde(rename = "api_key")]
    ApiKey,
    #[serde(rename = "ssn")]
    Ssn,
    #[serde(rename = "PERSON")]
    Person,
    #[serde(rename = "ORG")]
    Org,
    #[serde(rename = "GPE")]
    Location,
    #[serde(rename = "CUSTOM_KEYWORD")]
    CustomKeyword,
}

impl HitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::CreditCard => "credit_card",
            Self::ApiKey => "api_key",
            Self::Ssn => "ssn",
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Location => "GPE",
            Self::CustomKeyword => "CUSTOM_KEYWORD",
        }
    }
}

impl fmt::Display for HitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lines surrounding a hit, used to render diff-style evidence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HitContext {
    pub before: Vec<String>,
    #[serde(rename = "match")]
    pub matched: String,
    pub after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "type")]
    pub kind: HitKind,
    pub value: String,
    /// 1-based.
    pub line_number: usize,
    pub context: HitContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyReceipt {
    pub latency_ms: f64,
    pub engine: String,
    pub scrubbed_count: usize,
    #[serde(default)]
    pub policy_id: Option<String>,
}

/// The six user-facing redaction categories of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileToggles {
    pub email: bool,
    pub phone: bool,
    pub names: bool,
    pub payment: bool,
    pub location: bool,
    pub credentials: bool,
}

impl Default for ProfileToggles {
    fn default() -> Self {
        Self {
            email: true,
            phone: true,
            names: true,
            payment: true,
            location: true,
            credentials: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKey {
    Email,
    Phone,
    Names,
    Payment,
    Location,
    Credentials,
}

impl ProfileToggles {
    pub fn get(&self, key: ToggleKey) -> bool {
        match key {
            ToggleKey::Email => self.email,
            ToggleKey::Phone => self.phone,
            ToggleKey::Names => self.names,
            ToggleKey::Payment => self.payment,
            ToggleKey::Location => self.location,
            ToggleKey::Credentials => self.credentials,
        }
    }

    pub fn set(&mut self, key: ToggleKey, value: bool) {
        match key {
            ToggleKey::Email => self.email = value,
            ToggleKey::Phone => self.phone = value,
            ToggleKey::Names => self.names = value,
            ToggleKey::Payment => self.payment = value,
            ToggleKey::Location => self.location = value,
            ToggleKey::Credentials => self.credentials = value,
        }
    }
}

/// Redaction settings sent with an intercept request or derived from a profile.
///
/// Every switch is optional: a missing switch means "redact". The
/// category-level keys (`redact_payment`, `redact_credentials`, ...) cover
/// several detectors; the detector-level keys (`redact_ssn`, ...) override
/// them when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_phone: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_person: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_org: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_payment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_location: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_credentials: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_credit_card: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_api_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_ssn: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_gpe: Option<bool>,
    #[serde(default)]
    pub custom_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auditor_prompt: Option<String>,
}

impl PolicyConfig {
    /// Whether the detector for `kind` is enabled under this config.
    pub fn is_enabled(&self, kind: HitKind) -> bool {
        let specific = match kind {
            HitKind::Email => self.redact_email,
            HitKind::Phone => self.redact_phone,
            HitKind::CreditCard => self.redact_credit_card.or(self.redact_payment),
            HitKind::ApiKey => self.redact_api_key.or(self.redact_credentials),
            HitKind::Ssn => self.redact_ssn.or(self.redact_credentials),
            HitKind::Person => self.redact_person,
            HitKind::Org => self.redact_org,
            HitKind::Location => self.redact_gpe.or(self.redact_location),
            HitKind::CustomKeyword => Some(true),
        };
        specific.unwrap_or(true)
    }
}
