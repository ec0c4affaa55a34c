//! Authentication endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warp::http::header::SET_COOKIE;
use warp::http::{HeaderMap, HeaderValue, StatusCode};
use warp::reply::Response;
use warp::Rejection;

use super::{error_response, json_response};
use crate::app::AppState;
use crate::auth::user::{mask_email, AccountType, Identity, SubscriptionPlan, TeamRole, User};
use crate::error::{ClinicGateError, Result};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    #[serde(default = "default_account_type", alias = "accountType")]
    pub account_type: AccountType,
    pub password: String,
}

fn default_account_type() -> AccountType {
    AccountType::Professional
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(alias = "pendingToken")]
    pub pending_token: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendCodeRequest {
    #[serde(alias = "pendingToken")]
    pub pending_token: String,
}

/// Account as returned to its owner; never carries the password hash
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub identifier: String,
    pub account_type: AccountType,
    pub display_name: String,
    pub email: Option<String>,
    pub owner_professional_id: Option<String>,
    pub team_role: Option<TeamRole>,
    pub team_clinic_id: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            identifier: user.identifier.clone(),
            account_type: user.account_type,
            display_name: user.display_name.clone(),
            email: user.email.as_deref().map(mask_email),
            owner_professional_id: user.owner_professional_id.clone(),
            team_role: user.team_role,
            team_clinic_id: user.team_clinic_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserView,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct MeResponse {
    identity: Identity,
    owner_tenant_id: String,
    plan: SubscriptionPlan,
    expires_at: DateTime<Utc>,
}

/// Attach a `Set-Cookie` header to a response
pub fn with_cookie(mut response: Response, cookie: String) -> Response {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(SET_COOKIE, value);
        }
        Err(e) => log::error!("Session cookie is not a valid header value: {}", e),
    }
    response
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => json_response(&body, StatusCode::OK),
        Err(e) => error_response(&e),
    }
}

pub async fn login(request: LoginRequest, state: AppState) -> std::result::Result<Response, Rejection> {
    let result = state
        .login
        .begin(&request.identifier, request.account_type, &request.password)
        .await;
    Ok(respond(result))
}

pub async fn verify_code(request: VerifyCodeRequest, state: AppState) -> std::result::Result<Response, Rejection> {
    match state.login.complete(&request.pending_token, &request.code).await {
        Ok(outcome) => {
            let body = SessionResponse {
                user: UserView::from(&outcome.user),
                expires_at: outcome.session.expires_at(),
                token: outcome.session.token,
            };
            let cookie = state.sessions.session_cookie(&body.token);
            Ok(with_cookie(json_response(&body, StatusCode::OK), cookie))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn resend_code(request: ResendCodeRequest, state: AppState) -> std::result::Result<Response, Rejection> {
    Ok(respond(state.login.resend(&request.pending_token).await))
}

pub async fn logout(headers: HeaderMap, state: AppState) -> std::result::Result<Response, Rejection> {
    let claims = match state.sessions.require(&headers).await {
        Ok(claims) => claims,
        Err(e) => return Ok(error_response(&e)),
    };

    match state.login.logout(&claims).await {
        Ok(()) => Ok(with_cookie(
            json_response(&serde_json::json!({ "ok": true }), StatusCode::OK),
            state.sessions.clear_cookie(),
        )),
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn me(headers: HeaderMap, state: AppState) -> std::result::Result<Response, Rejection> {
    let result = async {
        let claims = state.sessions.require(&headers).await?;
        let identity = claims.identity();
        let owner_tenant_id = identity
            .owner_professional_id
            .clone()
            .unwrap_or_else(|| identity.user_id.clone());
        // Live plan, not the copy in the token
        let plan = state.gate.tenant_plan(&owner_tenant_id).await?;

        Ok::<_, ClinicGateError>(MeResponse {
            identity,
            owner_tenant_id,
            plan,
            expires_at: claims.expires_at(),
        })
    }
    .await;

    Ok(respond(result))
}
