//! One-time numeric codes that gate session issuance
//!
//! A challenge goes `Issued -> Consumed` or `Issued -> Expired` and never
//! leaves a terminal state. Sending again writes a new challenge over the
//! user's previous one, so only the newest code is authoritative. Expiry is
//! evaluated when a code is submitted; nothing purges old challenges.

use chrono::{Duration, Utc};
use rand::Rng;
use std::fmt;
use std::sync::Arc;

use crate::auth::user::User;
use crate::config::AuthConfig;
use crate::constants::{TWO_FACTOR_CODE_MAX, TWO_FACTOR_CODE_MIN, TWO_FACTOR_MAX_ATTEMPTS};
use crate::error::{ClinicGateError, Result};
use crate::notify::TwoFactorNotifier;
use crate::security::constant_time_eq;
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::{AttemptClaim, TwoFactorChallenge, TwoFactorStore};

/// Why a submitted code was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidCodeReason {
    NoChallenge,
    Expired,
    AlreadyUsed,
    Mismatch,
    TooManyAttempts,
}

impl InvalidCodeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoChallenge => "no_challenge",
            Self::Expired => "expired",
            Self::AlreadyUsed => "already_used",
            Self::Mismatch => "mismatch",
            Self::TooManyAttempts => "too_many_attempts",
        }
    }
}

impl fmt::Display for InvalidCodeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating a submitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeVerdict {
    Valid,
    Invalid(InvalidCodeReason),
}

impl CodeVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, CodeVerdict::Valid)
    }

    /// Translate a rejection into the error taxonomy
    pub fn into_result(self) -> Result<()> {
        match self {
            CodeVerdict::Valid => Ok(()),
            CodeVerdict::Invalid(InvalidCodeReason::AlreadyUsed) => Err(ClinicGateError::AlreadyUsed(
                "This verification code has already been used".to_string(),
            )),
            CodeVerdict::Invalid(InvalidCodeReason::TooManyAttempts) => Err(ClinicGateError::Unauthenticated(
                "Too many incorrect attempts. Request a new code.".to_string(),
            )),
            CodeVerdict::Invalid(_) => Err(ClinicGateError::Unauthenticated(
                "Invalid or expired verification code".to_string(),
            )),
        }
    }
}

/// Generates, stores and validates two-factor challenges
pub struct TwoFactorEngine {
    store: Arc<dyn TwoFactorStore>,
    notifier: Arc<dyn TwoFactorNotifier>,
    ttl: Duration,
    default_locale: String,
}

impl TwoFactorEngine {
    pub fn new(store: Arc<dyn TwoFactorStore>, notifier: Arc<dyn TwoFactorNotifier>, config: &AuthConfig) -> Self {
        Self {
            store,
            notifier,
            ttl: Duration::minutes(config.two_factor_ttl_minutes),
            default_locale: config.default_locale.clone(),
        }
    }

    /// Overrides the challenge lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl.num_minutes()
    }

    /// Six-digit code drawn uniformly from 100000..=999999
    pub fn generate_code() -> String {
        rand::thread_rng()
            .gen_range(TWO_FACTOR_CODE_MIN..=TWO_FACTOR_CODE_MAX)
            .to_string()
    }

    /// Issue a fresh challenge for `user` and dispatch it.
    ///
    /// The new challenge replaces any earlier one before the notifier runs.
    pub async fn send(&self, user: &User) -> Result<TwoFactorChallenge> {
        let email = match user.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => return Err(ClinicGateError::NoEmailOnFile),
        };

        let now = Utc::now();
        let challenge = TwoFactorChallenge {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            code: Self::generate_code(),
            created_at: now,
            expires_at: now + self.ttl,
            consumed_at: None,
            attempts: 0,
        };

        self.store
            .upsert_challenge(challenge.clone())
            .await
            .map_err(|e| {
                log::error!("Failed to store two-factor challenge for {}: {}", user.id, e);
                e
            })?;

        let locale = user.locale.as_deref().unwrap_or(&self.default_locale);
        self.notifier
            .send_code(&email, &challenge.code, self.ttl_minutes(), locale)
            .await
            .map_err(|e| {
                log::error!("Two-factor delivery failed for {}: {}", user.id, e);
                match e {
                    ClinicGateError::DeliveryError(_) => e,
                    other => ClinicGateError::DeliveryError(other.to_string()),
                }
            })?;

        log_security_event(SecurityEvent::TwoFactorSent {
            user_id: user.id.clone(),
        })
        .await;

        Ok(challenge)
    }

    /// Check `submitted` against the user's latest challenge, consuming it on success
    pub async fn validate(&self, user_id: &str, submitted: &str) -> Result<CodeVerdict> {
        let verdict = self.evaluate(user_id, submitted).await?;

        if let CodeVerdict::Invalid(reason) = verdict {
            log_security_event(SecurityEvent::TwoFactorRejected {
                user_id: user_id.to_string(),
                reason: reason.to_string(),
            })
            .await;
        }

        Ok(verdict)
    }

    async fn evaluate(&self, user_id: &str, submitted: &str) -> Result<CodeVerdict> {
        let challenge = match self.store.latest_challenge(user_id).await? {
            Some(challenge) => challenge,
            None => return Ok(CodeVerdict::Invalid(InvalidCodeReason::NoChallenge)),
        };

        let now = Utc::now();
        if challenge.is_consumed() {
            return Ok(CodeVerdict::Invalid(InvalidCodeReason::AlreadyUsed));
        }
        if challenge.is_expired_at(now) {
            return Ok(CodeVerdict::Invalid(InvalidCodeReason::Expired));
        }
        if challenge.attempts >= TWO_FACTOR_MAX_ATTEMPTS {
            return Ok(CodeVerdict::Invalid(InvalidCodeReason::TooManyAttempts));
        }

        // The slot is taken before comparing, so concurrent submissions share
        // one budget and no comparison runs once it is spent
        let attempt = match self
            .store
            .claim_attempt(user_id, &challenge.id, TWO_FACTOR_MAX_ATTEMPTS)
            .await?
        {
            AttemptClaim::Granted(attempt) => attempt,
            AttemptClaim::Exhausted => return Ok(CodeVerdict::Invalid(InvalidCodeReason::TooManyAttempts)),
            AttemptClaim::Consumed => return Ok(CodeVerdict::Invalid(InvalidCodeReason::AlreadyUsed)),
            AttemptClaim::Superseded => return Ok(CodeVerdict::Invalid(InvalidCodeReason::Mismatch)),
        };

        if !constant_time_eq(submitted, &challenge.code) {
            log::debug!(
                "Two-factor mismatch for {} (attempt {} of {})",
                user_id,
                attempt,
                TWO_FACTOR_MAX_ATTEMPTS
            );
            return Ok(CodeVerdict::Invalid(InvalidCodeReason::Mismatch));
        }

        // Lost a race with a concurrent submit or a newer send
        if !self.store.consume_challenge(user_id, &challenge.id, now).await? {
            return Ok(CodeVerdict::Invalid(InvalidCodeReason::AlreadyUsed));
        }

        Ok(CodeVerdict::Valid)
    }
}
