//! Caller identity from inbound request headers
//!
//! An `Authorization: Bearer` header takes precedence over the session
//! cookie. Anything that does not verify resolves to anonymous; nothing
//! here fails past this boundary.

use std::sync::Arc;
use warp::http::header::{AUTHORIZATION, COOKIE};
use warp::http::HeaderMap;

use crate::auth::token::{extract_bearer_token, SessionClaims, TokenService};
use crate::config::AuthConfig;
use crate::error::{ClinicGateError, Result};
use crate::storage::SessionRevocationStore;

/// Where a session token was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Bearer,
    Cookie,
}

/// Secure token extraction: Authorization header first, then the cookie.
///
/// A present Authorization header is authoritative even when malformed; the
/// cookie is not consulted in that case.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<(String, TokenSource)> {
    if let Some(auth_header) = headers.get(AUTHORIZATION) {
        return auth_header
            .to_str()
            .ok()
            .and_then(extract_bearer_token)
            .map(|token| (token.to_string(), TokenSource::Bearer));
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| (value.to_string(), TokenSource::Cookie))
}

/// Resolves the caller behind a request
pub struct SessionResolver {
    tokens: Arc<TokenService>,
    revocations: Arc<dyn SessionRevocationStore>,
    cookie_name: String,
    secure_cookies: bool,
}

impl SessionResolver {
    pub fn new(
        tokens: Arc<TokenService>,
        revocations: Arc<dyn SessionRevocationStore>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            tokens,
            revocations,
            cookie_name: config.session_cookie_name.clone(),
            secure_cookies: config.secure_cookies,
        }
    }

    /// Verified session claims, or `None` for an anonymous caller
    pub async fn resolve(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        let (token, source) = extract_session_token(headers, &self.cookie_name)?;

        let claims = match self.tokens.verify_session(&token) {
            Ok(claims) => claims,
            Err(_) => {
                log::debug!("Discarding unverifiable session token from {:?}", source);
                return None;
            }
        };

        match self.revocations.is_session_revoked(&claims.jti).await {
            Ok(false) => Some(claims),
            Ok(true) => {
                log::debug!("Revoked session presented by {}", claims.sub);
                None
            }
            Err(e) => {
                // Fail closed
                log::error!("Revocation lookup failed, treating caller as anonymous: {}", e);
                None
            }
        }
    }

    /// Like [`SessionResolver::resolve`] but anonymous callers are an error
    pub async fn require(&self, headers: &HeaderMap) -> Result<SessionClaims> {
        self.resolve(headers)
            .await
            .ok_or_else(|| ClinicGateError::Unauthenticated("Sign in to continue".to_string()))
    }

    /// `Set-Cookie` value carrying a session token
    pub fn session_cookie(&self, token: &str) -> String {
        let max_age = self.tokens.session_ttl().num_seconds();
        self.cookie(token, max_age)
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn clear_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name, value, max_age
        );
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }
}
