//! Chat session driving the interception handshake.
//!
//! `Idle -> Scanning -> Idle` for clean messages. A message the shield
//! intercepts parks the session in `Intercepted` until the user confirms
//! the redacted version, bypasses with the original, or cancels.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use bento_types::api::{CancelRequest, HistoryMessage, InterceptMetadata, InterceptRequest, InterceptStatus};
use bento_types::models::{ChatRole, Choice, Hit, MessageStatus, PolicyConfig, PrivacyReceipt};

use crate::api::ShieldApi;
use crate::error::ClientError;
use crate::system::SharedMonitor;

pub const WELCOME_MESSAGE: &str = "Bento System initialized. Protection active.";
pub const DEFAULT_MODEL: &str = "gemini";
pub const CHAT_SOURCE: &str = "web-dashboard";
const ARCHIVE_ENGINE: &str = "Archive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    Idle,
    Scanning,
    Intercepted,
    Resuming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub sender: ChatRole,
    pub status: Option<MessageStatus>,
    pub timestamp: DateTime<Utc>,
    pub receipt: Option<PrivacyReceipt>,
}

/// What the shield held back, shown until the user decides.
#[derive(Debug, Clone, PartialEq)]
pub struct Interception {
    pub pending_id: Uuid,
    pub redacted_preview: String,
    pub violation_details: String,
    pub hits: Vec<Hit>,
}

pub struct ChatSession<A: ShieldApi + ?Sized> {
    api: Arc<A>,
    monitor: SharedMonitor,
    messages: Vec<Message>,
    status: ChatStatus,
    pending: Option<Interception>,
    last_blocked_input: Option<String>,
    conversation_id: String,
    model: String,
    next_id: u64,
}

impl<A: ShieldApi + ?Sized> ChatSession<A> {
    pub fn new(api: Arc<A>, monitor: SharedMonitor) -> Self {
        let mut session = Self {
            api,
            monitor,
            messages: Vec::new(),
            status: ChatStatus::Idle,
            pending: None,
            last_blocked_input: None,
            conversation_id: Uuid::new_v4().to_string(),
            model: DEFAULT_MODEL.to_string(),
            next_id: 1,
        };
        session.push(ChatRole::Ai, WELCOME_MESSAGE.to_string(), None, None);
        session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn interception(&self) -> Option<&Interception> {
        self.pending.as_ref()
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Text of the last message the shield stopped, for re-editing.
    pub fn last_blocked_input(&self) -> Option<&str> {
        self.last_blocked_input.as_deref()
    }

    pub fn clear_blocked_input(&mut self) {
        self.last_blocked_input = None;
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    fn push(
        &mut self,
        sender: ChatRole,
        text: String,
        status: Option<MessageStatus>,
        receipt: Option<PrivacyReceipt>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message {
            id,
            text,
            sender,
            status,
            timestamp: Utc::now(),
            receipt,
        });
        id
    }

    fn last_user_message(&mut self) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.sender == ChatRole::User)
    }

    fn mark_last_user(&mut self, status: MessageStatus, receipt: Option<PrivacyReceipt>) {
        if let Some(msg) = self.last_user_message() {
            msg.status = Some(status);
            if receipt.is_some() {
                msg.receipt = receipt;
            }
        }
    }

    fn settle(&mut self) {
        self.status = ChatStatus::Idle;
        self.pending = None;
        self.last_blocked_input = None;
    }

    /// Send `text` through the shield. Never leaves the session in `Scanning`.
    pub async fn send_message(&mut self, text: &str, policy: PolicyConfig) {
        let msg_id = self.push(ChatRole::User, text.to_string(), Some(MessageStatus::Scanning), None);
        self.status = ChatStatus::Scanning;
        self.last_blocked_input = Some(text.to_string());
        self.monitor.add_log("INGEST: HEADERS_CHECK... OK");
        self.monitor
            .add_log(&format!("SCAN: ANALYZING_PAYLOAD ({} bytes)...", text.len()));

        let req = InterceptRequest {
            payload: json!({"input": text, "model": self.model}),
            source: CHAT_SOURCE.to_string(),
            policy_id: None,
            policy_config: Some(policy),
            metadata: Some(InterceptMetadata {
                conversation_id: Some(self.conversation_id.clone()),
                ..Default::default()
            }),
        };

        let resp = match self.api.intercept(&req).await {
            Ok(resp) => resp,
            Err(e) => {
                let detail = e.user_message();
                warn!("Intercept failed: {}", e);
                self.settle();
                self.monitor.add_log(&format!("ERROR: {}", detail));
                if let Some(msg) = self.messages.iter_mut().find(|m| m.id == msg_id) {
                    msg.status = Some(MessageStatus::Glitch);
                }
                self.push(ChatRole::Ai, format!("System Error: {}", detail), None, None);
                return;
            }
        };

        if resp.status == InterceptStatus::RequiresConfirmation {
            let Some(pending_id) = resp.pending_id else {
                self.settle();
                self.monitor.add_log("ERROR: Interception without pending id");
                return;
            };
            let redacted_preview = resp
                .redacted_payload
                .as_ref()
                .and_then(|p| p.get("input"))
                .and_then(Value::as_str)
                .unwrap_or("Content Redacted")
                .to_string();
            self.pending = Some(Interception {
                pending_id,
                redacted_preview,
                violation_details: resp
                    .violation_details
                    .unwrap_or_else(|| "Potential PII Detected".to_string()),
                hits: resp.hits.unwrap_or_default(),
            });
            self.status = ChatStatus::Intercepted;
            self.monitor
                .add_log(&format!("ALERT: THREAT_DETECTED [{}]", pending_id));
            return;
        }

        self.settle();
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == msg_id) {
            msg.status = Some(MessageStatus::Verified);
            msg.receipt = resp.receipt.clone();
        }
        let reply = resp
            .ai_response
            .unwrap_or_else(|| format!("(System): Payload valid. Forwarded securely to {}.", self.model));
        self.push(ChatRole::Ai, reply, Some(MessageStatus::Verified), resp.receipt);
        self.monitor.add_log("SHIELD: SCAN_COMPLETE (0 hits)");
    }

    /// Forward the redacted version of the intercepted message.
    pub async fn confirm_action(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };
        let pending_id = pending.pending_id;
        self.status = ChatStatus::Resuming;
        self.monitor.add_log("ACTION: ADMIN_OVERRIDE_GRANTED");

        match self.api.confirm(pending_id, Choice::Safe).await {
            Ok(resp) => {
                self.settle();
                self.monitor.update_safety_score(1);
                self.mark_last_user(MessageStatus::Verified, resp.receipt.clone());
                if let Some(reply) = resp.ai_response {
                    self.push(ChatRole::Ai, reply, Some(MessageStatus::Verified), resp.receipt);
                }
            }
            Err(e) => self.resolve_failed("Confirm", e),
        }
    }

    /// Forward the original, unredacted message.
    pub async fn bypass_action(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };
        let pending_id = pending.pending_id;
        self.status = ChatStatus::Resuming;
        self.monitor.add_log("WARN: SECURITY_PROTOCOL_BYPASSED (User Override)");

        match self.api.confirm(pending_id, Choice::Original).await {
            Ok(resp) => {
                self.settle();
                self.mark_last_user(MessageStatus::Insecure, resp.receipt.clone());
                let reply = resp.ai_response.unwrap_or_else(|| {
                    "I received the original data. (Shield Warning: Unredacted PII exposed)".to_string()
                });
                self.push(ChatRole::Ai, reply, Some(MessageStatus::Insecure), resp.receipt);
            }
            Err(e) => self.resolve_failed("Bypass", e),
        }
    }

    fn resolve_failed(&mut self, action: &str, e: ClientError) {
        warn!("{} failed: {}", action, e);
        self.settle();
        self.mark_last_user(MessageStatus::Glitch, None);
        self.monitor.add_log(&format!("ERROR: {}", e.user_message()));
    }

    /// Drop the intercepted message. The server is told when possible; the
    /// local state resets either way.
    pub async fn cancel_action(&mut self) {
        if let Some(pending) = self.pending.take() {
            let req = CancelRequest {
                pending_id: pending.pending_id,
                conversation_id: Some(self.conversation_id.clone()),
            };
            if let Err(e) = self.api.cancel(&req).await {
                debug!("Cancel request failed: {}", e);
            }
        }

        self.status = ChatStatus::Idle;
        self.pending = None;
        if let Some(idx) = self.messages.iter().rposition(|m| m.sender == ChatRole::User) {
            self.messages.remove(idx);
        }
        self.monitor.add_log("ACTION: TERMINATED_BY_USER");
    }

    /// Replace the session with a stored conversation.
    pub async fn load_conversation(&mut self, conversation_id: &str) {
        let short: String = conversation_id.chars().take(8).collect();
        let detail = match self.api.history_detail(conversation_id).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!("Failed to restore conversation: {}", e);
                self.monitor
                    .add_log(&format!("ERROR: Failed to restore conversation #{}", short));
                return;
            }
        };

        self.messages.clear();
        for HistoryMessage {
            role,
            content,
            timestamp,
            status,
        } in detail.messages
        {
            let text = if !content.is_empty() {
                content
            } else if role == ChatRole::User {
                "User: Content not available.".to_string()
            } else {
                "System: Content not available.".to_string()
            };
            let id = self.next_id;
            self.next_id += 1;
            self.messages.push(Message {
                id,
                text,
                sender: role,
                status: Some(status),
                timestamp,
                receipt: Some(PrivacyReceipt {
                    latency_ms: 0.0,
                    engine: ARCHIVE_ENGINE.to_string(),
                    scrubbed_count: 0,
                    policy_id: None,
                }),
            });
        }

        self.conversation_id = conversation_id.to_string();
        self.settle();
        self.monitor
            .add_log(&format!("RESTORED: Conversation #{} loaded.", short));
    }

    /// Start a fresh conversation.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.push(ChatRole::Ai, WELCOME_MESSAGE.to_string(), None, None);
        self.settle();
        self.conversation_id = Uuid::new_v4().to_string();
        self.monitor.add_log("SYSTEM: New session initialized.");
    }
}
