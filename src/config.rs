//! Process-wide configuration
//!
//! Resolved once at startup and injected into the services that need it.
//! Secrets are looked up from an ordered list of candidate variables; in a
//! production environment a missing or weak secret is fatal.

use base64::Engine;
use rand::RngCore;
use std::env;

use crate::constants::{
    DEFAULT_HOST, DEFAULT_LOCALE, DEFAULT_PORT, INVITATION_TTL_DAYS, SESSION_COOKIE_NAME,
    TWO_FACTOR_TTL_MINUTES,
};
use crate::error::{ClinicGateError, Result};

/// Candidate variables for the session signing secret, in priority order
pub const SESSION_SECRET_VARS: [&str; 3] =
    ["CLINIC_GATE_SESSION_SECRET", "SESSION_SECRET", "JWT_SECRET"];

/// Candidate variables for the tenant key encryption secret, in priority order
pub const KEY_ENCRYPTION_SECRET_VARS: [&str; 2] =
    ["CLINIC_GATE_KEY_ENCRYPTION_SECRET", "KEY_ENCRYPTION_SECRET"];

const ENVIRONMENT_VARS: [&str; 3] = ["CLINIC_GATE_ENV", "RUST_ENV", "ENVIRONMENT"];

const DEFAULT_CALENDAR_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Runtime configuration for the authentication core
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub host: String,
    pub port: u16,
    /// Name of the detected environment (`development`, `production`, ...)
    pub environment: String,
    /// True when running in a production-like environment
    pub production: bool,
    /// HMAC secret for session and purpose tokens
    pub session_secret: String,
    /// Secret the tenant key-wrapping key is derived from
    pub key_encryption_secret: String,
    pub two_factor_ttl_minutes: i64,
    pub invitation_ttl_days: i64,
    pub session_cookie_name: String,
    /// Adds the `Secure` attribute to the session cookie
    pub secure_cookies: bool,
    pub calendar_client_id: Option<String>,
    pub calendar_authorize_url: String,
    pub default_locale: String,
    /// Lets the development notifier print codes to the log
    pub development_mode: bool,
}

impl AuthConfig {
    /// Deterministic configuration for tests
    pub fn for_testing() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            environment: "test".to_string(),
            production: false,
            session_secret: "test-session-key-for-unit-tests-only-0123456789".to_string(),
            key_encryption_secret: "test-kek-for-unit-tests-only-9876543210-abcdef".to_string(),
            two_factor_ttl_minutes: TWO_FACTOR_TTL_MINUTES,
            invitation_ttl_days: INVITATION_TTL_DAYS,
            session_cookie_name: SESSION_COOKIE_NAME.to_string(),
            secure_cookies: false,
            calendar_client_id: Some("test-calendar-client".to_string()),
            calendar_authorize_url: DEFAULT_CALENDAR_AUTHORIZE_URL.to_string(),
            default_locale: DEFAULT_LOCALE.to_string(),
            development_mode: true,
        }
    }

    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = ENVIRONMENT_VARS
            .iter()
            .find_map(|name| non_empty(lookup(name)))
            .unwrap_or_else(|| "development".to_string());
        let production = is_production(&environment);

        let host = lookup("CLINIC_GATE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = lookup("CLINIC_GATE_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let session_secret =
            Self::required_secret(&lookup, &SESSION_SECRET_VARS, "Session", production)?;
        let key_encryption_secret = Self::required_secret(
            &lookup,
            &KEY_ENCRYPTION_SECRET_VARS,
            "Key encryption",
            production,
        )?;

        if session_secret == key_encryption_secret {
            return Err(ClinicGateError::ConfigError(
                "Session and key encryption secrets must be different".to_string(),
            ));
        }

        let two_factor_ttl_minutes = lookup("CLINIC_GATE_TWO_FACTOR_TTL_MINUTES")
            .and_then(|v| v.parse().ok())
            .filter(|v: &i64| *v > 0)
            .unwrap_or(TWO_FACTOR_TTL_MINUTES);

        let invitation_ttl_days = lookup("CLINIC_GATE_INVITATION_TTL_DAYS")
            .and_then(|v| v.parse().ok())
            .filter(|v: &i64| *v > 0)
            .unwrap_or(INVITATION_TTL_DAYS);

        let session_cookie_name = lookup("CLINIC_GATE_SESSION_COOKIE")
            .and_then(|v| non_empty(Some(v)))
            .unwrap_or_else(|| SESSION_COOKIE_NAME.to_string());

        // SECURITY: Secure cookies are forced on in production
        let secure_cookies = production
            || lookup("CLINIC_GATE_SECURE_COOKIES")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false);

        let development_mode = !production
            && lookup("CLINIC_GATE_DEVELOPMENT_MODE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false);

        Ok(Self {
            host,
            port,
            environment,
            production,
            session_secret,
            key_encryption_secret,
            two_factor_ttl_minutes,
            invitation_ttl_days,
            session_cookie_name,
            secure_cookies,
            calendar_client_id: non_empty(lookup("CLINIC_GATE_CALENDAR_CLIENT_ID")),
            calendar_authorize_url: non_empty(lookup("CLINIC_GATE_CALENDAR_AUTHORIZE_URL"))
                .unwrap_or_else(|| DEFAULT_CALENDAR_AUTHORIZE_URL.to_string()),
            default_locale: non_empty(lookup("CLINIC_GATE_DEFAULT_LOCALE"))
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            development_mode,
        })
    }

    /// Resolve a secret from its candidate variables.
    ///
    /// Production fails closed; elsewhere a random per-process secret is
    /// generated so nothing guessable is ever used for signing.
    fn required_secret<F>(
        lookup: &F,
        candidates: &[&str],
        secret_type: &str,
        production: bool,
    ) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        match resolve_secret(lookup, candidates) {
            Some(secret) => {
                if production {
                    validate_secret(&secret, secret_type)?;
                } else if let Err(e) = validate_secret(&secret, secret_type) {
                    log::warn!("{} (accepted outside production)", e);
                }
                Ok(secret)
            }
            None if production => Err(ClinicGateError::ConfigError(format!(
                "{} secret is required in production. Set one of: {}. \
                 Generate one with: openssl rand -base64 48",
                secret_type,
                candidates.join(", ")
            ))),
            None => {
                log::warn!(
                    "{} secret not configured; using a random per-process secret. \
                     Tokens will not survive a restart.",
                    secret_type
                );
                Ok(random_secret())
            }
        }
    }
}

/// First non-empty value among the candidate variables
pub fn resolve_secret<F>(lookup: &F, candidates: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    candidates.iter().find_map(|name| non_empty(lookup(name)))
}

/// Validate that a secret meets minimum strength requirements
pub fn validate_secret(secret: &str, secret_type: &str) -> Result<()> {
    if secret.len() < 32 {
        return Err(ClinicGateError::ConfigError(format!(
            "{} secret must be at least 32 characters long",
            secret_type
        )));
    }

    let insecure_patterns = ["change-this", "changeme", "your-secret", "example", "default", "12345"];
    let lowered = secret.to_lowercase();
    if let Some(pattern) = insecure_patterns.iter().find(|p| lowered.contains(*p)) {
        return Err(ClinicGateError::ConfigError(format!(
            "{} secret contains insecure pattern '{}'",
            secret_type, pattern
        )));
    }

    if secret.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ClinicGateError::ConfigError(format!(
            "{} secret should mix letters, digits and symbols",
            secret_type
        )));
    }

    Ok(())
}

fn is_production(environment: &str) -> bool {
    matches!(environment.to_lowercase().as_str(), "production" | "prod" | "release")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn random_secret() -> String {
    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const SESSION: &str = "sEss10n_k3y_with_enough_entropy_abc_xyz_42";
    const KEK: &str = "k3k_material_with_enough_entropy_def_uvw_99";

    #[test]
    fn test_production_requires_session_secret() {
        let result = AuthConfig::from_lookup(lookup_from(&[
            ("CLINIC_GATE_ENV", "production"),
            ("KEY_ENCRYPTION_SECRET", KEK),
        ]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("CLINIC_GATE_SESSION_SECRET"));
    }

    #[test]
    fn test_candidates_resolved_in_order() {
        let config = AuthConfig::from_lookup(lookup_from(&[
            ("CLINIC_GATE_ENV", "production"),
            ("JWT_SECRET", "jwt_fallback_value_that_is_long_enough_0001"),
            ("SESSION_SECRET", SESSION),
            ("KEY_ENCRYPTION_SECRET", KEK),
        ]))
        .unwrap();
        assert_eq!(config.session_secret, SESSION);
        assert!(config.production);
        assert!(config.secure_cookies);
    }

    #[test]
    fn test_empty_candidate_is_skipped() {
        let lookup = lookup_from(&[("CLINIC_GATE_SESSION_SECRET", "   "), ("JWT_SECRET", SESSION)]);
        assert_eq!(resolve_secret(&lookup, &SESSION_SECRET_VARS), Some(SESSION.to_string()));
    }

    #[test]
    fn test_development_generates_random_secret() {
        let first = AuthConfig::from_lookup(lookup_from(&[])).unwrap();
        let second = AuthConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(!first.production);
        assert!(first.session_secret.len() >= 32);
        assert_ne!(first.session_secret, second.session_secret);
    }

    #[test]
    fn test_weak_secret_rejected_in_production() {
        let result = AuthConfig::from_lookup(lookup_from(&[
            ("ENVIRONMENT", "prod"),
            ("SESSION_SECRET", "short"),
            ("KEY_ENCRYPTION_SECRET", KEK),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let result = AuthConfig::from_lookup(lookup_from(&[
            ("SESSION_SECRET", SESSION),
            ("KEY_ENCRYPTION_SECRET", SESSION),
        ]));
        assert!(result.unwrap_err().to_string().contains("must be different"));
    }
}
