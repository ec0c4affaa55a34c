// HTTP surface: status codes, error bodies and the session cookie

use std::sync::Arc;

use clinic_gate::auth::password::hash_password;
use clinic_gate::auth::user::{SubscriptionPlan, User};
use clinic_gate::handlers::routes;
use clinic_gate::notify::MemoryNotifier;
use clinic_gate::storage::{MemoryStore, UserStore};
use clinic_gate::{AppState, AuthConfig};
use serde_json::{json, Value};
use warp::http::StatusCode;

const PASSWORD: &str = "correct horse battery";
const EMAIL: &str = "ramos@example.com";

async fn setup() -> (AppState, Arc<MemoryNotifier>) {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let state = AppState::new(store.clone(), notifier.clone(), AuthConfig::for_testing()).unwrap();

    let owner = User::professional("52998224725", "Dr. Ramos", SubscriptionPlan::Pro)
        .with_email(EMAIL)
        .with_password_hash(hash_password(PASSWORD).unwrap());
    store.create_user(owner).await.unwrap();

    (state, notifier)
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

/// Runs the full login and returns the session cookie pair (`name=value`)
async fn sign_in(state: &AppState, notifier: &MemoryNotifier) -> String {
    let api = routes(state.clone());

    let resp = warp::test::request()
        .method("POST")
        .path("/auth/login")
        .json(&json!({ "identifier": "52998224725", "password": PASSWORD }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let pending = body_json(resp.body())["pending_token"].as_str().unwrap().to_string();

    let code = notifier.last_code_for(EMAIL).await.unwrap();
    let resp = warp::test::request()
        .method("POST")
        .path("/auth/2fa/verify")
        .json(&json!({ "pendingToken": pending, "code": code }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (state, _) = setup().await;
    let resp = warp::test::request().path("/health").reply(&routes(state)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.body(), "OK");
}

#[tokio::test]
async fn test_login_then_me_with_cookie() {
    let (state, notifier) = setup().await;
    let cookie = sign_in(&state, &notifier).await;

    let resp = warp::test::request()
        .path("/auth/me")
        .header("cookie", cookie)
        .reply(&routes(state))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp.body());
    assert_eq!(body["identity"]["identifier"], "52998224725");
    assert_eq!(body["plan"], "pro");
}

#[tokio::test]
async fn test_me_without_session_is_unauthenticated() {
    let (state, _) = setup().await;
    let resp = warp::test::request().path("/auth/me").reply(&routes(state)).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp.body());
    assert_eq!(body["error"], "unauthenticated");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_malformed_bearer_ignores_cookie() {
    let (state, notifier) = setup().await;
    let cookie = sign_in(&state, &notifier).await;

    let resp = warp::test::request()
        .path("/auth/me")
        .header("authorization", "Token abc")
        .header("cookie", cookie)
        .reply(&routes(state))
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_clears_cookie_and_revokes() {
    let (state, notifier) = setup().await;
    let cookie = sign_in(&state, &notifier).await;
    let api = routes(state);

    let resp = warp::test::request()
        .method("POST")
        .path("/auth/logout")
        .header("cookie", cookie.clone())
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["set-cookie"].to_str().unwrap().contains("Max-Age=0"));

    let resp = warp::test::request()
        .path("/auth/me")
        .header("cookie", cookie)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_code_is_rejected_as_json() {
    let (state, _) = setup().await;
    let api = routes(state);

    let resp = warp::test::request()
        .method("POST")
        .path("/auth/login")
        .json(&json!({ "identifier": "52998224725", "password": PASSWORD }))
        .reply(&api)
        .await;
    let pending = body_json(resp.body())["pending_token"].as_str().unwrap().to_string();

    let resp = warp::test::request()
        .method("POST")
        .path("/auth/2fa/verify")
        .json(&json!({ "pending_token": pending, "code": "not-a-code" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get("set-cookie").is_none());
}

#[tokio::test]
async fn test_invalid_body_and_unknown_route() {
    let (state, _) = setup().await;
    let api = routes(state);

    let resp = warp::test::request()
        .method("POST")
        .path("/auth/login")
        .header("content-type", "application/json")
        .body("{\"identifier\":")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp.body())["error"], "invalid_input");

    let resp = warp::test::request().path("/nowhere").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp.body())["error"], "not_found");
}

#[tokio::test]
async fn test_clinic_creation_over_http() {
    let (state, notifier) = setup().await;
    let cookie = sign_in(&state, &notifier).await;
    let api = routes(state);

    for (name, expected) in [
        ("Centro", StatusCode::CREATED),
        ("Norte", StatusCode::CREATED),
        ("Sul", StatusCode::FORBIDDEN),
    ] {
        let resp = warp::test::request()
            .method("POST")
            .path("/clinics")
            .header("cookie", cookie.clone())
            .json(&json!({ "name": name }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), expected, "creating {}", name);
    }

    let resp = warp::test::request()
        .path("/clinics")
        .header("cookie", cookie)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.body()).as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invitation_accept_over_http() {
    let (state, notifier) = setup().await;
    let cookie = sign_in(&state, &notifier).await;
    let api = routes(state);

    let resp = warp::test::request()
        .method("POST")
        .path("/invitations")
        .header("cookie", cookie)
        .json(&json!({ "role": "assistant" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let token = body_json(resp.body())["token"].as_str().unwrap().to_string();

    let accept = json!({
        "token": token,
        "identifier": "11144477735",
        "displayName": "Bia",
        "password": "assistant password",
    });
    let resp = warp::test::request()
        .method("POST")
        .path("/invitations/accept")
        .json(&accept)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(resp.headers().get("set-cookie").is_some());

    let resp = warp::test::request()
        .method("POST")
        .path("/invitations/accept")
        .json(&accept)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp.body())["error"], "already_used");
}
