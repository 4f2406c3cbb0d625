//! In-memory `ShieldApi` for the client state machine tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use bento_types::api::{
    AnalyticsResponse, CancelRequest, ComponentCheck, HealthChecks, HealthResponse, HistoryDetail,
    InterceptRequest, InterceptResponse, ProfileCreateRequest, ProfileResponse,
    ProfileStatusResponse, ProfileUpdateRequest, StatusMessage,
};
use bento_types::models::Choice;

use crate::api::ShieldApi;
use crate::error::ClientError;

#[derive(Default)]
struct FakeState {
    failing: bool,
    failing_activate: bool,
    calls: Vec<String>,
    requests: Vec<InterceptRequest>,
    intercepts: VecDeque<InterceptResponse>,
    confirms: VecDeque<InterceptResponse>,
    history: Option<HistoryDetail>,
    profiles: Vec<ProfileResponse>,
    safety_score: u32,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Every call fails with a 500 while set.
    pub fn fail(&self, failing: bool) {
        self.with(|s| s.failing = failing);
    }

    /// Only `activate_profile` fails while set.
    pub fn fail_activate(&self, failing: bool) {
        self.with(|s| s.failing_activate = failing);
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn last_request(&self) -> Option<InterceptRequest> {
        self.with(|s| s.requests.last().cloned())
    }

    pub fn push_intercept(&self, resp: InterceptResponse) {
        self.with(|s| s.intercepts.push_back(resp));
    }

    pub fn push_confirm(&self, resp: InterceptResponse) {
        self.with(|s| s.confirms.push_back(resp));
    }

    pub fn set_history(&self, detail: HistoryDetail) {
        self.with(|s| s.history = Some(detail));
    }

    pub fn set_safety_score(&self, score: u32) {
        self.with(|s| s.safety_score = score);
    }

    pub fn server_profiles(&self) -> Vec<ProfileResponse> {
        self.with(|s| s.profiles.clone())
    }

    fn call(&self, name: String) -> Result<(), ClientError> {
        self.with(|s| {
            s.calls.push(name);
            if s.failing {
                Err(ClientError::Server {
                    status: 500,
                    detail: "boom".into(),
                })
            } else {
                Ok(())
            }
        })
    }
}

fn not_found() -> ClientError {
    ClientError::Server {
        status: 404,
        detail: "Profile not found".into(),
    }
}

#[async_trait]
impl ShieldApi for FakeApi {
    async fn intercept(&self, req: &InterceptRequest) -> Result<InterceptResponse, ClientError> {
        self.call("intercept".into())?;
        self.with(|s| {
            s.requests.push(req.clone());
            s.intercepts
                .pop_front()
                .ok_or_else(|| ClientError::Malformed("no queued intercept reply".into()))
        })
    }

    async fn confirm(&self, pending_id: Uuid, choice: Choice) -> Result<InterceptResponse, ClientError> {
        self.call(format!("confirm {} {:?}", pending_id, choice))?;
        self.with(|s| {
            s.confirms
                .pop_front()
                .ok_or_else(|| ClientError::Malformed("no queued confirm reply".into()))
        })
    }

    async fn cancel(&self, req: &CancelRequest) -> Result<StatusMessage, ClientError> {
        self.call(format!("cancel {}", req.pending_id))?;
        Ok(StatusMessage {
            status: "success".into(),
            message: "Cancellation logged".into(),
        })
    }

    async fn history_detail(&self, conversation_id: &str) -> Result<HistoryDetail, ClientError> {
        self.call(format!("history {}", conversation_id))?;
        self.with(|s| s.history.clone()).ok_or(ClientError::Server {
            status: 404,
            detail: "Conversation not found".into(),
        })
    }

    async fn profile_status(&self) -> Result<ProfileStatusResponse, ClientError> {
        self.call("profile_status".into())?;
        Ok(self.with(|s| ProfileStatusResponse {
            setup_required: s.profiles.is_empty(),
            active_profile_id: s.profiles.iter().find(|p| p.is_active).map(|p| p.id),
            profiles: s.profiles.clone(),
        }))
    }

    async fn create_profile(&self, req: &ProfileCreateRequest) -> Result<ProfileResponse, ClientError> {
        self.call(format!("create {}", req.name))?;
        Ok(self.with(|s| {
            let now = Utc::now();
            let profile = ProfileResponse {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                name: req.name.clone(),
                icon_name: req.icon_name.clone(),
                color: req.color.clone(),
                description: req.description.clone(),
                is_active: s.profiles.is_empty(),
                redact_email: req.toggles.email,
                redact_phone: req.toggles.phone,
                redact_names: req.toggles.names,
                redact_payment: req.toggles.payment,
                redact_location: req.toggles.location,
                redact_credentials: req.toggles.credentials,
                custom_keywords: req.custom_keywords.clone(),
                created_at: now,
                updated_at: now,
            };
            s.profiles.push(profile.clone());
            profile
        }))
    }

    async fn update_profile(
        &self,
        profile_id: Uuid,
        req: &ProfileUpdateRequest,
    ) -> Result<ProfileResponse, ClientError> {
        self.call(format!("update {}", profile_id))?;
        self.with(|s| {
            let profile = s.profiles.iter_mut().find(|p| p.id == profile_id).ok_or_else(not_found)?;
            if let Some(t) = &req.toggles {
                profile.redact_email = t.email;
                profile.redact_phone = t.phone;
                profile.redact_names = t.names;
                profile.redact_payment = t.payment;
                profile.redact_location = t.location;
                profile.redact_credentials = t.credentials;
            }
            if let Some(keywords) = &req.custom_keywords {
                profile.custom_keywords = keywords.clone();
            }
            Ok(profile.clone())
        })
    }

    async fn delete_profile(&self, profile_id: Uuid) -> Result<(), ClientError> {
        self.call(format!("delete {}", profile_id))?;
        self.with(|s| {
            let idx = s.profiles.iter().position(|p| p.id == profile_id).ok_or_else(not_found)?;
            let removed = s.profiles.remove(idx);
            if removed.is_active {
                if let Some(first) = s.profiles.first_mut() {
                    first.is_active = true;
                }
            }
            Ok(())
        })
    }

    async fn activate_profile(&self, profile_id: Uuid) -> Result<ProfileResponse, ClientError> {
        self.call(format!("activate {}", profile_id))?;
        self.with(|s| {
            if s.failing_activate {
                return Err(ClientError::Server {
                    status: 500,
                    detail: "boom".into(),
                });
            }
            if !s.profiles.iter().any(|p| p.id == profile_id) {
                return Err(not_found());
            }
            for p in s.profiles.iter_mut() {
                p.is_active = p.id == profile_id;
            }
            s.profiles.iter().find(|p| p.id == profile_id).cloned().ok_or_else(not_found)
        })
    }

    async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.call("health".into())?;
        Ok(HealthResponse {
            status: "healthy".into(),
            timestamp: Utc::now(),
            version: "1.0.0".into(),
            environment: "test".into(),
            checks: HealthChecks {
                database: ComponentCheck {
                    status: "healthy".into(),
                    latency_ms: Some(0.1),
                    message: None,
                    error: None,
                },
            },
        })
    }

    async fn analytics(&self, range: &str) -> Result<AnalyticsResponse, ClientError> {
        self.call(format!("analytics {}", range))?;
        Ok(AnalyticsResponse {
            safety_score: self.with(|s| s.safety_score),
            stats: Vec::new(),
            recent_alerts: Vec::new(),
            traffic_chart: Vec::new(),
        })
    }
}
