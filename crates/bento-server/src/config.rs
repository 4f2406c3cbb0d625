use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Placeholder JWT secrets that MUST NOT be used in production.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub secret_key: Option<String>,
    pub environment: String,
    pub gemini_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub max_payload_bytes: usize,
    pub request_timeout: Duration,
    pub pending_ttl: Duration,
    pub rate_limit: u32,
    pub rate_window: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            match get(key) {
                Some(raw) => raw.parse().with_context(|| format!("{} must be a number, got '{}'", key, raw)),
                None => Ok(default),
            }
        };

        let port = number("BENTO_PORT", 8000)?;
        let rate_limit = number("BENTO_RATE_LIMIT", 100)?;
        let rate_limit = u32::try_from(rate_limit)
            .with_context(|| format!("BENTO_RATE_LIMIT out of range: {}", rate_limit))?;
        let port = u16::try_from(port).with_context(|| format!("BENTO_PORT out of range: {}", port))?;

        Ok(Self {
            host: get("BENTO_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("BENTO_DB_PATH").unwrap_or_else(|| "bento.db".into()).into(),
            jwt_secret: get("BENTO_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into()),
            secret_key: get("BENTO_SECRET_KEY"),
            environment: get("BENTO_ENVIRONMENT").unwrap_or_else(|| "development".into()),
            gemini_api_key: get("GEMINI_API_KEY"),
            groq_api_key: get("GROQ_API_KEY"),
            allowed_origins: get("BENTO_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty() && o != "*")
                        .collect()
                })
                .unwrap_or_default(),
            max_payload_bytes: number("BENTO_MAX_PAYLOAD_BYTES", 10 * 1024 * 1024)? as usize,
            request_timeout: Duration::from_secs(number("BENTO_REQUEST_TIMEOUT_SECS", 30)?),
            pending_ttl: Duration::from_secs(number("BENTO_PENDING_TTL_SECS", 300)?),
            rate_limit,
            rate_window: Duration::from_secs(number("BENTO_RATE_WINDOW_SECS", 60)?),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn has_placeholder_secret(&self) -> bool {
        PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("bento.db"));
        assert_eq!(config.max_payload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.pending_ttl, Duration::from_secs(300));
        assert_eq!(config.rate_limit, 100);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert!(config.secret_key.is_none());
        assert!(config.allowed_origins.is_empty());
        assert!(config.has_placeholder_secret());
        assert!(!config.is_production());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("BENTO_PORT", "9000"),
            ("BENTO_SECRET_KEY", "k"),
            ("BENTO_ENVIRONMENT", "Production"),
            ("BENTO_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("BENTO_JWT_SECRET", "a-real-secret"),
            ("GEMINI_API_KEY", "  "),
            ("BENTO_RATE_LIMIT", "20"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.secret_key.as_deref(), Some("k"));
        assert!(config.is_production());
        assert_eq!(config.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert!(!config.has_placeholder_secret());
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.rate_limit, 20);
        assert_eq!(config.addr().unwrap().port(), 9000);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(config(&[("BENTO_PORT", "eighty")]).is_err());
        assert!(config(&[("BENTO_PORT", "70000")]).is_err());
        assert!(config(&[("BENTO_PENDING_TTL_SECS", "-1")]).is_err());
        assert!(config(&[("BENTO_RATE_LIMIT", "5000000000")]).is_err());
    }

    #[test]
    fn wildcard_origin_means_any() {
        assert!(config(&[("BENTO_ALLOWED_ORIGINS", "*")]).unwrap().allowed_origins.is_empty());
    }
}
