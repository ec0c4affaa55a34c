use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::user::{AccountType, Identity, SubscriptionPlan, TeamRole};
use crate::config::AuthConfig;
use crate::constants::{MAX_TOKEN_LENGTH, PURPOSE_TOKEN_TTL_MINUTES, SESSION_TTL_HOURS};
use crate::error::{ClinicGateError, Result};

/// Claims of a session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub identifier: String,
    pub account_type: AccountType,
    pub owner_professional_id: Option<String>,
    pub team_role: Option<TeamRole>,
    pub team_clinic_id: Option<String>,
    pub plan: Option<SubscriptionPlan>,
    /// Unique token id, used for revocation
    pub jti: String,
    /// Issued at (UTC timestamp)
    pub iat: i64,
    /// Expiration time (UTC timestamp)
    pub exp: i64,
}

impl SessionClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.sub.clone(),
            identifier: self.identifier.clone(),
            account_type: self.account_type,
            owner_professional_id: self.owner_professional_id.clone(),
            team_role: self.team_role,
            team_clinic_id: self.team_clinic_id.clone(),
            plan: self.plan,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// Claims of a short-lived purpose token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurposeClaims {
    /// What the token was minted for; verification must name the same purpose
    pub purpose: String,
    pub data: serde_json::Value,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Any token this service signs, tagged by use so one kind can never
/// stand in for the other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "token_use", rename_all = "snake_case")]
pub enum TokenPayload {
    Session(SessionClaims),
    Purpose(PurposeClaims),
}

/// A freshly signed session token
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
}

impl IssuedSession {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at()
    }
}

/// Signs and verifies session and purpose tokens (HS256).
///
/// The secret is handed in at construction; the service never reads the
/// environment itself.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    session_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            session_ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.session_secret)
    }

    /// Overrides the session lifetime
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Issue a session token embedding the identity snapshot
    pub fn issue_session_token(&self, identity: &Identity) -> Result<IssuedSession> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: identity.user_id.clone(),
            identifier: identity.identifier.clone(),
            account_type: identity.account_type,
            owner_professional_id: identity.owner_professional_id.clone(),
            team_role: identity.team_role,
            team_clinic_id: identity.team_clinic_id.clone(),
            plan: identity.plan,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.session_ttl).timestamp(),
        };

        let token = self.sign(&TokenPayload::Session(claims.clone()))?;
        Ok(IssuedSession { token, claims })
    }

    /// Issue a purpose token carrying `payload` for `ttl`
    pub fn issue_purpose_token<T: Serialize>(
        &self,
        purpose: &str,
        payload: &T,
        ttl: Duration,
    ) -> Result<String> {
        let data = serde_json::to_value(payload).map_err(|e| {
            ClinicGateError::InvalidInput(format!("Purpose payload is not serializable: {}", e))
        })?;

        let now = Utc::now();
        let claims = PurposeClaims {
            purpose: purpose.to_string(),
            data,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        self.sign(&TokenPayload::Purpose(claims))
    }

    /// Issue a purpose token with the default ten-minute lifetime
    pub fn issue_default_purpose_token<T: Serialize>(&self, purpose: &str, payload: &T) -> Result<String> {
        self.issue_purpose_token(purpose, payload, Duration::minutes(PURPOSE_TOKEN_TTL_MINUTES))
    }

    /// Verify signature and expiry.
    ///
    /// Every failure, whatever the cause, is reported as `InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<TokenPayload> {
        if token.is_empty() || token.len() > MAX_TOKEN_LENGTH {
            return Err(ClinicGateError::InvalidToken);
        }

        decode::<TokenPayload>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("Token verification failed: {}", e);
                ClinicGateError::InvalidToken
            })
    }

    /// Verify a session token
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims> {
        match self.verify(token)? {
            TokenPayload::Session(claims) => Ok(claims),
            TokenPayload::Purpose(_) => {
                log::debug!("Purpose token presented as a session token");
                Err(ClinicGateError::InvalidToken)
            }
        }
    }

    /// Verify a purpose token minted for `purpose` and decode its payload
    pub fn verify_purpose<T: DeserializeOwned>(&self, token: &str, purpose: &str) -> Result<T> {
        let claims = match self.verify(token)? {
            TokenPayload::Purpose(claims) => claims,
            TokenPayload::Session(_) => {
                log::debug!("Session token presented as a purpose token");
                return Err(ClinicGateError::InvalidToken);
            }
        };

        if claims.purpose != purpose {
            log::debug!(
                "Purpose token minted for '{}' presented for '{}'",
                claims.purpose,
                purpose
            );
            return Err(ClinicGateError::InvalidToken);
        }

        serde_json::from_value(claims.data).map_err(|e| {
            log::debug!("Purpose token payload does not match expected shape: {}", e);
            ClinicGateError::InvalidToken
        })
    }

    fn sign(&self, payload: &TokenPayload) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), payload, &self.encoding_key)
            .map_err(|e| ClinicGateError::unavailable("token signing", e))
    }
}

/// Extracts bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let (scheme, token) = auth_header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}
