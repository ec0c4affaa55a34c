//! HTTP surface
//!
//! Thin warp routes over the services in [`AppState`]. Every error is
//! rendered as `{"error": kind, "message": text}` with the status from the
//! error taxonomy.

pub mod auth;
pub mod tenant;

use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::app::AppState;
use crate::error::ClinicGateError;

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// All routes, with rejection recovery
pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let health = warp::path!("health").and(warp::get()).map(|| "OK");

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(auth::login);

    let verify = warp::path!("auth" / "2fa" / "verify")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(auth::verify_code);

    let resend = warp::path!("auth" / "2fa" / "resend")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(auth::resend_code);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(with_state(state.clone()))
        .and_then(auth::logout);

    let me = warp::path!("auth" / "me")
        .and(warp::get())
        .and(warp::header::headers_cloned())
        .and(with_state(state.clone()))
        .and_then(auth::me);

    let create_invitation = warp::path!("invitations")
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(tenant::create_invitation);

    let accept_invitation = warp::path!("invitations" / "accept")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(tenant::accept_invitation);

    let create_clinic = warp::path!("clinics")
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(tenant::create_clinic);

    let list_clinics = warp::path!("clinics")
        .and(warp::get())
        .and(warp::header::headers_cloned())
        .and(with_state(state.clone()))
        .and_then(tenant::list_clinics);

    let rotate_key = warp::path!("keys" / "rotate")
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(with_state(state))
        .and_then(tenant::rotate_key);

    health
        .or(login)
        .or(verify)
        .or(resend)
        .or(logout)
        .or(me)
        .or(accept_invitation)
        .or(create_invitation)
        .or(create_clinic)
        .or(list_clinics)
        .or(rotate_key)
        .recover(handle_rejection)
}

// Helper function to include shared state in request
fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// JSON reply with an explicit status
pub fn json_response<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

/// Render a service error. Server-side failures are logged in full and
/// answered with a generic message.
pub fn error_response(err: &ClinicGateError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        log::error!("Request failed: {}", err);
    } else {
        log::debug!("Request rejected: {}", err);
    }

    json_response(
        &ErrorBody {
            error: err.kind(),
            message: err.public_message(),
        },
        status,
    )
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, error, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "invalid_input", format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "invalid_input", "Request body too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "Method not allowed".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::reject::LengthRequired>().is_some()
    {
        (StatusCode::BAD_REQUEST, "invalid_input", "Expected a JSON body".to_string())
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "unavailable",
            "The service is temporarily unavailable. Please try again later.".to_string(),
        )
    };

    Ok(json_response(&ErrorBody { error, message }, status))
}
