//! Password login gated by a two-factor challenge
//!
//! `begin` checks the password and sends a code, returning a short-lived
//! purpose token that names the pending user. Only `complete`, with that
//! token and the right code, issues a session.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::password::verify_password;
use crate::auth::token::{IssuedSession, SessionClaims, TokenService};
use crate::auth::two_factor::TwoFactorEngine;
use crate::auth::user::{mask_email, AccountType, User};
use crate::constants::PURPOSE_TWO_FACTOR_LOGIN;
use crate::error::{ClinicGateError, Result};
use crate::security::AuthTimer;
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::{RevokedSession, SessionRevocationStore, UserStore};
use crate::tenant::capability::CapabilityGate;

/// Payload of the pending-login purpose token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PendingLogin {
    user_id: String,
}

/// What the caller gets back after the password step
#[derive(Debug, Clone, Serialize)]
pub struct LoginChallenge {
    pub pending_token: String,
    pub masked_email: String,
    pub expires_in_minutes: i64,
}

/// A completed login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: IssuedSession,
}

pub struct LoginService {
    users: Arc<dyn UserStore>,
    revocations: Arc<dyn SessionRevocationStore>,
    two_factor: Arc<TwoFactorEngine>,
    tokens: Arc<TokenService>,
    gate: Arc<CapabilityGate>,
}

impl LoginService {
    pub fn new(
        users: Arc<dyn UserStore>,
        revocations: Arc<dyn SessionRevocationStore>,
        two_factor: Arc<TwoFactorEngine>,
        tokens: Arc<TokenService>,
        gate: Arc<CapabilityGate>,
    ) -> Self {
        Self {
            users,
            revocations,
            two_factor,
            tokens,
            gate,
        }
    }

    /// Check credentials and send a two-factor code
    pub async fn begin(&self, identifier: &str, account_type: AccountType, password: &str) -> Result<LoginChallenge> {
        let timer = AuthTimer::for_login();

        let user = match self.check_password(identifier, account_type, password).await {
            Ok(user) => user,
            Err(e) => {
                timer.wait().await;
                return Err(e);
            }
        };

        self.challenge(&user).await
    }

    /// Finish a login with the emailed code
    pub async fn complete(&self, pending_token: &str, code: &str) -> Result<LoginOutcome> {
        let pending: PendingLogin = self.tokens.verify_purpose(pending_token, PURPOSE_TWO_FACTOR_LOGIN)?;

        self.two_factor
            .validate(&pending.user_id, code.trim())
            .await?
            .into_result()?;

        // Re-read: the account may have been disabled or changed meanwhile
        let user = self.live_user(&pending.user_id).await?;
        let session = self
            .tokens
            .issue_session_token(&self.gate.session_identity(&user).await?)?;

        log_security_event(SecurityEvent::LoginSucceeded {
            user_id: user.id.clone(),
        })
        .await;

        Ok(LoginOutcome { user, session })
    }

    /// Send a fresh code, superseding the previous one
    pub async fn resend(&self, pending_token: &str) -> Result<LoginChallenge> {
        let pending: PendingLogin = self.tokens.verify_purpose(pending_token, PURPOSE_TWO_FACTOR_LOGIN)?;
        let user = self.live_user(&pending.user_id).await?;
        self.challenge(&user).await
    }

    /// Revoke the session until its natural expiry
    pub async fn logout(&self, claims: &SessionClaims) -> Result<()> {
        self.revocations
            .revoke_session(RevokedSession {
                token_id: claims.jti.clone(),
                user_id: claims.sub.clone(),
                revoked_at: Utc::now(),
                expires_at: claims.expires_at(),
            })
            .await?;

        log_security_event(SecurityEvent::SessionRevoked {
            user_id: claims.sub.clone(),
            token_id: claims.jti.clone(),
        })
        .await;
        Ok(())
    }

    async fn check_password(&self, identifier: &str, account_type: AccountType, password: &str) -> Result<User> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(ClinicGateError::InvalidInput(
                "Identifier and password are required".to_string(),
            ));
        }

        let user = self.users.find_by_identifier(identifier, account_type).await?;
        let verified = match &user {
            Some(user) => user
                .password_hash
                .as_deref()
                .map_or(false, |hash| verify_password(password, hash)),
            None => false,
        };

        match user {
            Some(user) if verified => Ok(user),
            other => {
                let reason = if other.is_none() { "unknown_account" } else { "bad_credentials" };
                log_security_event(SecurityEvent::LoginFailed {
                    identifier: identifier.to_string(),
                    reason: reason.to_string(),
                })
                .await;
                Err(ClinicGateError::Unauthenticated(
                    "Invalid identifier or password".to_string(),
                ))
            }
        }
    }

    async fn challenge(&self, user: &User) -> Result<LoginChallenge> {
        self.two_factor.send(user).await?;

        let pending_token = self.tokens.issue_default_purpose_token(
            PURPOSE_TWO_FACTOR_LOGIN,
            &PendingLogin {
                user_id: user.id.clone(),
            },
        )?;

        Ok(LoginChallenge {
            pending_token,
            masked_email: user.email.as_deref().map(mask_email).unwrap_or_default(),
            expires_in_minutes: self.two_factor.ttl_minutes(),
        })
    }

    async fn live_user(&self, user_id: &str) -> Result<User> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ClinicGateError::Unauthenticated("Sign in again".to_string()))?;

        if user.disabled {
            return Err(ClinicGateError::AccessRestricted(
                "This account has been disabled".to_string(),
            ));
        }
        Ok(user)
    }
}
