//! Tenant-scoped endpoints: invitations, clinics and key rotation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warp::http::{HeaderMap, StatusCode};
use warp::reply::Response;
use warp::Rejection;

use super::auth::{with_cookie, SessionResponse, UserView};
use super::{error_response, json_response};
use crate::app::AppState;
use crate::auth::user::Identity;
use crate::error::{ClinicGateError, Result};
use crate::tenant::invitation::{AcceptInvitation, CreateInvitation, InvitationSummary};
use crate::tenant::TenantContext;

#[derive(Debug, Deserialize)]
pub struct CreateClinicRequest {
    pub name: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Serialize)]
struct CreatedInvitation {
    invitation: InvitationSummary,
    /// Shown once; only its digest is stored
    token: String,
}

#[derive(Debug, Serialize)]
struct AcceptedResponse {
    #[serde(flatten)]
    session: SessionResponse,
    owner_tenant_id: String,
}

async fn caller(headers: &HeaderMap, state: &AppState) -> Result<Identity> {
    Ok(state.sessions.require(headers).await?.identity())
}

fn created<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => json_response(&body, StatusCode::CREATED),
        Err(e) => error_response(&e),
    }
}

pub async fn create_invitation(
    headers: HeaderMap,
    request: CreateInvitation,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    let result = async {
        let identity = caller(&headers, &state).await?;
        let issued = state.invitations.create(&identity, request).await?;
        Ok::<_, ClinicGateError>(CreatedInvitation {
            invitation: InvitationSummary::from(&issued.invitation),
            token: issued.token,
        })
    }
    .await;

    Ok(created(result))
}

pub async fn accept_invitation(request: AcceptInvitation, state: AppState) -> std::result::Result<Response, Rejection> {
    match state.invitations.accept(request).await {
        Ok(accepted) => {
            let body = AcceptedResponse {
                session: SessionResponse {
                    user: UserView::from(&accepted.staff),
                    expires_at: accepted.session.expires_at(),
                    token: accepted.session.token,
                },
                owner_tenant_id: accepted.owner_tenant_id,
            };
            let cookie = state.sessions.session_cookie(&body.session.token);
            Ok(with_cookie(json_response(&body, StatusCode::CREATED), cookie))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn create_clinic(
    headers: HeaderMap,
    request: CreateClinicRequest,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    let result = async {
        let identity = caller(&headers, &state).await?;
        state.clinics.create(&identity, &request.name, &request.address).await
    }
    .await;

    Ok(created(result))
}

pub async fn list_clinics(headers: HeaderMap, state: AppState) -> std::result::Result<Response, Rejection> {
    let result = async {
        let identity = caller(&headers, &state).await?;
        state.clinics.visible_clinics(&identity).await
    }
    .await;

    Ok(match result {
        Ok(clinics) => json_response(&clinics, StatusCode::OK),
        Err(e) => error_response(&e),
    })
}

#[derive(Debug, Serialize)]
struct RotationResponse {
    tenant_id: String,
    key_id: String,
    version: u64,
    retired_keys: usize,
    rotated_at: DateTime<Utc>,
}

pub async fn rotate_key(headers: HeaderMap, state: AppState) -> std::result::Result<Response, Rejection> {
    let result = async {
        let identity = caller(&headers, &state).await?;
        let ctx = TenantContext::from_identity(&identity);
        state.gate.ensure_tenant_owner(&ctx, "rotate_key").await?;

        let status = state.keys.rotate_key(&ctx.owner_tenant_id).await?;
        Ok::<_, ClinicGateError>(RotationResponse {
            tenant_id: status.tenant_id,
            key_id: status.key_id,
            version: status.version,
            retired_keys: status.retired_keys,
            rotated_at: status.created_at,
        })
    }
    .await;

    Ok(match result {
        Ok(body) => json_response(&body, StatusCode::OK),
        Err(e) => error_response(&e),
    })
}
