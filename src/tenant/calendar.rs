//! Calendar OAuth `state` handling
//!
//! The state parameter is a purpose token, so no server-side storage is
//! needed across the provider redirect.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::auth::token::TokenService;
use crate::auth::user::Identity;
use crate::config::AuthConfig;
use crate::constants::PURPOSE_CALENDAR_OAUTH;
use crate::error::{ClinicGateError, Result};
use crate::tenant::capability::{Capability, CapabilityGate};
use crate::tenant::resolver::TenantContext;

const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

/// State carried through the OAuth round trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarState {
    pub user_id: String,
    pub owner_tenant_id: String,
    pub redirect_uri: String,
}

pub struct CalendarOAuth {
    tokens: Arc<TokenService>,
    gate: Arc<CapabilityGate>,
    client_id: Option<String>,
    authorize_url: String,
}

impl CalendarOAuth {
    pub fn new(tokens: Arc<TokenService>, gate: Arc<CapabilityGate>, config: &AuthConfig) -> Self {
        Self {
            tokens,
            gate,
            client_id: config.calendar_client_id.clone(),
            authorize_url: config.calendar_authorize_url.clone(),
        }
    }

    /// Provider URL to send the user to, with a signed `state`
    pub async fn authorization_url(&self, identity: &Identity, redirect_uri: &str) -> Result<String> {
        let ctx = TenantContext::from_identity(identity);
        self.gate.ensure_capability(&ctx, Capability::CalendarSync).await?;

        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| ClinicGateError::ConfigError("Calendar client id is not configured".to_string()))?;

        let redirect = Url::parse(redirect_uri)
            .map_err(|_| ClinicGateError::InvalidInput("Invalid redirect URI".to_string()))?;
        if !matches!(redirect.scheme(), "https" | "http") {
            return Err(ClinicGateError::InvalidInput("Invalid redirect URI".to_string()));
        }

        let state = self.tokens.issue_default_purpose_token(
            PURPOSE_CALENDAR_OAUTH,
            &CalendarState {
                user_id: ctx.user_id,
                owner_tenant_id: ctx.owner_tenant_id,
                redirect_uri: redirect.to_string(),
            },
        )?;

        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| ClinicGateError::ConfigError(format!("Invalid calendar authorize URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", CALENDAR_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &state);

        Ok(url.into())
    }

    /// Decode the `state` returned by the provider
    pub fn verify_state(&self, state: &str) -> Result<CalendarState> {
        self.tokens.verify_purpose(state, PURPOSE_CALENDAR_OAUTH)
    }
}
