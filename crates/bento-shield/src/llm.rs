use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::ShieldError;

pub const GEMINI_MODEL: &str = "gemini-3-flash-preview";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a helpful AI assistant. Please respond to the user's request.";

/// Model output plus the token count billed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmReply {
    pub text: String,
    pub usage: u64,
}

/// Routes prompts to a model provider. Only Gemini is wired to a real API;
/// any other provider name gets a canned reply.
#[derive(Clone)]
pub struct LlmRouter {
    http: reqwest::Client,
    gemini_key: Option<String>,
    base_url: String,
}

impl LlmRouter {
    pub fn new(gemini_key: Option<String>) -> Self {
        let gemini_key = gemini_key.filter(|k| !k.trim().is_empty());
        if gemini_key.is_none() {
            warn!("GEMINI_API_KEY not set, Gemini calls will return an error text");
        }
        Self {
            http: reqwest::Client::new(),
            gemini_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Provider failures are folded into the reply text; this never errors.
    pub async fn route(&self, provider: &str, prompt: &str, system_instruction: Option<&str>) -> LlmReply {
        if !provider.eq_ignore_ascii_case("gemini") {
            return LlmReply {
                text: format!("Mock response from {}", provider),
                usage: (prompt.len() / 4) as u64,
            };
        }

        let Some(key) = &self.gemini_key else {
            return LlmReply {
                text: "Error: Gemini API Key missing.".to_string(),
                usage: 0,
            };
        };

        let full_prompt = match system_instruction {
            Some(instruction) => format!("System Instruction: {}\n\nUser Request: {}", instruction, prompt),
            None => prompt.to_string(),
        };

        match self.call_gemini(key, &full_prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Gemini call failed: {}", e);
                LlmReply {
                    text: format!("Error processing with Gemini: {}", e),
                    usage: 0,
                }
            }
        }
    }

    async fn call_gemini(&self, key: &str, prompt: &str) -> Result<LlmReply, ShieldError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, GEMINI_MODEL);
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ShieldError::Status { status, body });
        }

        let reply: Value = resp.json().await?;
        let text = extract_text(&reply)
            .ok_or_else(|| ShieldError::Malformed("no candidate text in response".into()))?;

        let usage = reply["usageMetadata"]["totalTokenCount"]
            .as_u64()
            .unwrap_or((prompt.len() / 4) as u64);

        Ok(LlmReply { text, usage })
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(reply: &Value) -> Option<String> {
    let parts = reply["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_provider_gets_mock_reply() {
        let router = LlmRouter::new(None);
        let reply = router.route("claude", "twelve chars", None).await;
        assert_eq!(reply.text, "Mock response from claude");
        assert_eq!(reply.usage, 3);
    }

    #[tokio::test]
    async fn gemini_without_key_reports_missing_key() {
        let router = LlmRouter::new(Some("   ".into()));
        let reply = router.route("Gemini", "hello", Some(DEFAULT_SYSTEM_INSTRUCTION)).await;
        assert_eq!(reply.text, "Error: Gemini API Key missing.");
        assert_eq!(reply.usage, 0);
    }

    #[tokio::test]
    async fn gemini_transport_failure_becomes_text() {
        let router = LlmRouter::new(Some("key".into())).with_base_url("http://127.0.0.1:9");
        let reply = router.route("gemini", "hello", None).await;
        assert!(reply.text.starts_with("Error processing with Gemini:"));
        assert_eq!(reply.usage, 0);
    }

    #[test]
    fn joins_candidate_parts() {
        let reply = json!({
            "candidates": [{"content": {"parts": [{"text": "Hel"}, {"text": "lo"}]}}],
            "usageMetadata": {"totalTokenCount": 7}
        });
        assert_eq!(extract_text(&reply).as_deref(), Some("Hello"));
        assert_eq!(extract_text(&json!({"candidates": []})), None);
    }
}
