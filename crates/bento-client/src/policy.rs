//! Local mirror of the account's policy profiles.
//!
//! Edits are applied optimistically and rolled back when the server rejects
//! them. At most one profile is active, matching the server.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use bento_types::api::{ProfileCreateRequest, ProfileResponse, ProfileStatusResponse, ProfileUpdateRequest};
use bento_types::models::{PolicyConfig, ProfileToggles, ToggleKey};

use crate::api::ShieldApi;
use crate::error::ClientError;
use crate::system::SharedMonitor;

pub const STANDARD_AUDITOR_PROMPT: &str = "Standard security protocols active.";

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyProfile {
    pub id: Uuid,
    pub name: String,
    pub icon_name: String,
    pub color: String,
    pub description: String,
    pub toggles: ProfileToggles,
    pub custom_keywords: Vec<String>,
}

impl From<&ProfileResponse> for PolicyProfile {
    fn from(p: &ProfileResponse) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            icon_name: p.icon_name.clone(),
            color: p.color.clone(),
            description: p.description.clone(),
            toggles: p.toggles(),
            custom_keywords: p.custom_keywords.clone(),
        }
    }
}

pub struct PolicyStore<A: ShieldApi + ?Sized> {
    api: Arc<A>,
    monitor: SharedMonitor,
    profiles: Vec<PolicyProfile>,
    active: Option<Uuid>,
    loaded: bool,
}

impl<A: ShieldApi + ?Sized> PolicyStore<A> {
    pub fn new(api: Arc<A>, monitor: SharedMonitor) -> Self {
        Self {
            api,
            monitor,
            profiles: Vec::new(),
            active: None,
            loaded: false,
        }
    }

    pub fn profiles(&self) -> &[PolicyProfile] {
        &self.profiles
    }

    pub fn profile(&self, id: Uuid) -> Option<&PolicyProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn active_profile_id(&self) -> Option<Uuid> {
        self.active
    }

    pub fn active_profile(&self) -> Option<&PolicyProfile> {
        self.active.and_then(|id| self.profile(id))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether the account still needs its first profile.
    pub fn setup_required(&self) -> bool {
        self.loaded && self.profiles.is_empty()
    }

    fn profile_mut(&mut self, id: Uuid) -> Result<&mut PolicyProfile, ClientError> {
        self.profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ClientError::UnknownProfile(id))
    }

    fn apply_status(&mut self, status: ProfileStatusResponse) {
        if status.setup_required {
            self.profiles.clear();
            self.active = None;
        } else {
            self.profiles = status.profiles.iter().map(PolicyProfile::from).collect();
            self.active = status.active_profile_id;
        }
        self.loaded = true;
    }

    /// Replace the mirror with the server's profiles. A failed load still
    /// marks the store loaded, leaving it empty.
    pub async fn load(&mut self) -> Result<(), ClientError> {
        match self.api.profile_status().await {
            Ok(status) => {
                self.apply_status(status);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load profiles: {}", e);
                self.loaded = true;
                Err(e)
            }
        }
    }

    /// Redaction config for the next intercept request.
    pub fn policy_config(&self) -> PolicyConfig {
        let Some(p) = self.active_profile() else {
            return PolicyConfig {
                auditor_prompt: Some(STANDARD_AUDITOR_PROMPT.to_string()),
                ..Default::default()
            };
        };

        PolicyConfig {
            redact_email: Some(p.toggles.email),
            redact_phone: Some(p.toggles.phone),
            redact_person: Some(p.toggles.names),
            redact_payment: Some(p.toggles.payment),
            redact_location: Some(p.toggles.location),
            redact_credentials: Some(p.toggles.credentials),
            custom_keywords: p.custom_keywords.clone(),
            auditor_prompt: Some(format!(
                "You are a compliance officer for {} context. Policy: {}.",
                p.name, p.name
            )),
            ..Default::default()
        }
    }

    /// Create a profile and make it the active one, on the server and here.
    pub async fn add_profile(
        &mut self,
        name: &str,
        icon_name: &str,
        color: &str,
        toggles: Option<ProfileToggles>,
        custom_keywords: Vec<String>,
    ) -> Result<Uuid, ClientError> {
        let req = ProfileCreateRequest {
            name: name.to_string(),
            icon_name: icon_name.to_string(),
            color: color.to_string(),
            description: "Custom user profile".to_string(),
            toggles: toggles.unwrap_or_default(),
            custom_keywords,
        };

        let created = self.api.create_profile(&req).await.inspect_err(|e| {
            self.monitor.add_log(&format!("ERROR: Failed to create profile ({})", e.user_message()));
        })?;
        let id = created.id;
        self.profiles.push(PolicyProfile::from(&created));

        if !created.is_active {
            if let Err(e) = self.api.activate_profile(id).await {
                warn!("Profile {} created but not activated: {}", id, e);
                self.monitor.add_log(&format!(
                    "ERROR: Profile '{}' created but not activated ({})",
                    created.name,
                    e.user_message()
                ));
                return Err(e);
            }
        }
        self.active = Some(id);
        self.monitor.add_log(&format!("POLICY: Profile '{}' created", created.name));
        Ok(id)
    }

    /// Flip one toggle, reverting it when the server refuses.
    pub async fn update_toggle(&mut self, id: Uuid, key: ToggleKey, value: bool) -> Result<(), ClientError> {
        let profile = self.profile_mut(id)?;
        let previous = profile.toggles;
        profile.toggles.set(key, value);
        let req = ProfileUpdateRequest {
            toggles: Some(profile.toggles),
            ..Default::default()
        };

        if let Err(e) = self.api.update_profile(id, &req).await {
            warn!("Failed to update profile toggle: {}", e);
            self.profile_mut(id)?.toggles = previous;
            return Err(e);
        }
        Ok(())
    }

    pub async fn update_custom_keywords(&mut self, id: Uuid, keywords: Vec<String>) -> Result<(), ClientError> {
        let profile = self.profile_mut(id)?;
        let previous = std::mem::replace(&mut profile.custom_keywords, keywords.clone());
        let req = ProfileUpdateRequest {
            custom_keywords: Some(keywords),
            ..Default::default()
        };

        if let Err(e) = self.api.update_profile(id, &req).await {
            warn!("Failed to update custom keywords: {}", e);
            self.profile_mut(id)?.custom_keywords = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Activate on the server first; the mirror only follows on success.
    pub async fn set_active(&mut self, id: Uuid) -> Result<(), ClientError> {
        self.api.activate_profile(id).await?;
        self.active = Some(id);
        if let Some(p) = self.profile(id) {
            let line = format!("POLICY: Switched to '{}'", p.name);
            self.monitor.add_log(&line);
        }
        Ok(())
    }

    /// Delete a profile. Removing the active one reloads the mirror so it
    /// picks up whichever profile the server activated in its place.
    pub async fn delete(&mut self, id: Uuid) -> Result<(), ClientError> {
        self.api.delete_profile(id).await?;
        self.profiles.retain(|p| p.id != id);

        if self.active == Some(id) {
            self.active = None;
            if let Err(e) = self.load().await {
                warn!("Reload after deleting the active profile failed: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;

    fn store(api: &Arc<FakeApi>) -> PolicyStore<FakeApi> {
        PolicyStore::new(api.clone(), SharedMonitor::new())
    }

    #[tokio::test]
    async fn empty_account_requires_setup() {
        let api = Arc::new(FakeApi::default());
        let mut store = store(&api);
        assert!(!store.setup_required());
        store.load().await.unwrap();
        assert!(store.setup_required());

        let config = store.policy_config();
        assert!(config.custom_keywords.is_empty());
        assert_eq!(config.auditor_prompt.as_deref(), Some(STANDARD_AUDITOR_PROMPT));
        assert_eq!(config.redact_email, None);
    }

    #[tokio::test]
    async fn added_profile_becomes_active() {
        let api = Arc::new(FakeApi::default());
        let mut store = store(&api);
        let work = store.add_profile("Work", "Briefcase", "text-blue-400", None, vec![]).await.unwrap();
        let home = store
            .add_profile("Home", "Home", "text-green-400", None, vec!["Falcon".into()])
            .await
            .unwrap();

        assert_eq!(store.active_profile_id(), Some(home));
        let server_active: Vec<Uuid> =
            api.server_profiles().iter().filter(|p| p.is_active).map(|p| p.id).collect();
        assert_eq!(server_active, vec![home]);

        store.set_active(work).await.unwrap();
        assert_eq!(store.active_profile_id(), Some(work));
        let config = store.policy_config();
        assert_eq!(
            config.auditor_prompt.as_deref(),
            Some("You are a compliance officer for Work context. Policy: Work.")
        );
        assert_eq!(config.redact_person, Some(true));
    }

    #[tokio::test]
    async fn added_profile_activation_failure_is_logged() {
        let api = Arc::new(FakeApi::default());
        let monitor = SharedMonitor::new();
        let mut store = PolicyStore::new(api.clone(), monitor.clone());
        let work = store.add_profile("Work", "Briefcase", "c", None, vec![]).await.unwrap();

        api.fail_activate(true);
        assert!(store.add_profile("Home", "Home", "c", None, vec![]).await.is_err());

        assert_eq!(store.active_profile_id(), Some(work));
        assert_eq!(store.profiles().len(), 2);
        let last = monitor.log_lines().last().cloned().unwrap();
        assert!(last.ends_with("ERROR: Profile 'Home' created but not activated (boom)"), "{}", last);
    }

    #[tokio::test]
    async fn rejected_toggle_is_rolled_back() {
        let api = Arc::new(FakeApi::default());
        let mut store = store(&api);
        let id = store.add_profile("Work", "Briefcase", "c", None, vec![]).await.unwrap();

        store.update_toggle(id, ToggleKey::Email, false).await.unwrap();
        assert_eq!(store.policy_config().redact_email, Some(false));
        assert!(!api.server_profiles()[0].redact_email);

        api.fail(true);
        assert!(store.update_toggle(id, ToggleKey::Phone, false).await.is_err());
        assert!(store.profile(id).unwrap().toggles.phone);
        assert!(!store.profile(id).unwrap().toggles.email);
    }

    #[tokio::test]
    async fn rejected_keywords_are_rolled_back() {
        let api = Arc::new(FakeApi::default());
        let mut store = store(&api);
        let id = store.add_profile("Work", "Briefcase", "c", None, vec!["a".into()]).await.unwrap();

        api.fail(true);
        let err = store.update_custom_keywords(id, vec!["b".into()]).await.unwrap_err();
        assert_eq!(err.user_message(), "boom");
        assert_eq!(store.profile(id).unwrap().custom_keywords, vec!["a".to_string()]);

        api.fail(false);
        store.update_custom_keywords(id, vec!["b".into()]).await.unwrap();
        assert_eq!(store.policy_config().custom_keywords, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn unknown_profile_is_an_error() {
        let api = Arc::new(FakeApi::default());
        let mut store = store(&api);
        let id = Uuid::new_v4();
        assert!(matches!(
            store.update_toggle(id, ToggleKey::Email, false).await,
            Err(ClientError::UnknownProfile(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn deleting_active_profile_follows_server() {
        let api = Arc::new(FakeApi::default());
        let mut store = store(&api);
        let work = store.add_profile("Work", "Briefcase", "c", None, vec![]).await.unwrap();
        let home = store.add_profile("Home", "Home", "c", None, vec![]).await.unwrap();

        store.delete(home).await.unwrap();
        assert_eq!(store.profiles().len(), 1);
        assert_eq!(store.active_profile_id(), Some(work));

        store.delete(work).await.unwrap();
        assert!(store.active_profile_id().is_none());
        assert!(store.setup_required());
    }

    #[tokio::test]
    async fn failed_activation_keeps_current_profile() {
        let api = Arc::new(FakeApi::default());
        let mut store = store(&api);
        let work = store.add_profile("Work", "Briefcase", "c", None, vec![]).await.unwrap();

        assert!(store.set_active(Uuid::new_v4()).await.is_err());
        assert_eq!(store.active_profile_id(), Some(work));
    }
}
