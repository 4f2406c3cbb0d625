use bento_types::models::{PolicyConfig, ProfileToggles};

pub const DEFAULT_PROFILE_NAME: &str = "Safe Default";

const STRICT_AUDITOR_PROMPT: &str = "You are a strict compliance officer. \
Flag any personally identifiable information (PII), financial data, credentials, \
or sensitive content. If valid, return score 1.0.";

/// Config used when the caller has no usable profile. Every detector is on.
pub fn default_config() -> PolicyConfig {
    PolicyConfig {
        profile_id: None,
        profile_name: Some(DEFAULT_PROFILE_NAME.to_string()),
        redact_email: Some(true),
        redact_phone: Some(true),
        redact_person: Some(true),
        redact_org: Some(true),
        redact_payment: Some(true),
        redact_location: Some(true),
        redact_credentials: Some(true),
        redact_credit_card: None,
        redact_api_key: None,
        redact_ssn: None,
        redact_gpe: None,
        custom_keywords: Vec::new(),
        auditor_prompt: Some(STRICT_AUDITOR_PROMPT.to_string()),
    }
}

/// Human-readable list of what a profile protects, for the auditor prompt.
fn protections(toggles: &ProfileToggles) -> String {
    let listed: Vec<&str> = [
        (toggles.email, "email addresses"),
        (toggles.phone, "phone numbers"),
        (toggles.names, "personal names"),
        (toggles.payment, "payment information"),
        (toggles.location, "location data"),
        (toggles.credentials, "credentials and secrets"),
    ]
    .into_iter()
    .filter_map(|(on, label)| on.then_some(label))
    .collect();

    if listed.is_empty() {
        "all sensitive data".to_string()
    } else {
        listed.join(", ")
    }
}

/// Map a stored profile onto the redaction config. Organisations have no
/// profile toggle and stay off.
pub fn config_for_profile(
    profile_id: &str,
    name: &str,
    toggles: &ProfileToggles,
    custom_keywords: &[String],
) -> PolicyConfig {
    let auditor_prompt = format!(
        "You are a compliance officer for the '{}' privacy context. \
         Your role is to protect: {}. \
         Analyze the payload and flag any violations. \
         If the content is safe, return a compliance score of 1.0.",
        name,
        protections(toggles)
    );

    PolicyConfig {
        profile_id: Some(profile_id.to_string()),
        profile_name: Some(name.to_string()),
        redact_email: Some(toggles.email),
        redact_phone: Some(toggles.phone),
        redact_person: Some(toggles.names),
        redact_org: Some(false),
        redact_payment: Some(toggles.payment),
        redact_location: Some(toggles.location),
        redact_credentials: Some(toggles.credentials),
        custom_keywords: custom_keywords.to_vec(),
        auditor_prompt: Some(auditor_prompt),
        ..Default::default()
    }
}

/// Overlay a request-supplied config on the profile config. Every key the
/// request sets wins; an empty keyword list in the request keeps the
/// profile's keywords.
pub fn merge(request: Option<&PolicyConfig>, profile: PolicyConfig) -> PolicyConfig {
    let Some(req) = request else {
        return profile;
    };

    PolicyConfig {
        profile_id: req.profile_id.clone().or(profile.profile_id),
        profile_name: req.profile_name.clone().or(profile.profile_name),
        redact_email: req.redact_email.or(profile.redact_email),
        redact_phone: req.redact_phone.or(profile.redact_phone),
        redact_person: req.redact_person.or(profile.redact_person),
        redact_org: req.redact_org.or(profile.redact_org),
        redact_payment: req.redact_payment.or(profile.redact_payment),
        redact_location: req.redact_location.or(profile.redact_location),
        redact_credentials: req.redact_credentials.or(profile.redact_credentials),
        redact_credit_card: req.redact_credit_card.or(profile.redact_credit_card),
        redact_api_key: req.redact_api_key.or(profile.redact_api_key),
        redact_ssn: req.redact_ssn.or(profile.redact_ssn),
        redact_gpe: req.redact_gpe.or(profile.redact_gpe),
        custom_keywords: if req.custom_keywords.is_empty() {
            profile.custom_keywords
        } else {
            req.custom_keywords.clone()
        },
        auditor_prompt: req.auditor_prompt.clone().or(profile.auditor_prompt),
    }
}
