// Login, two-factor and session lifecycle through the assembled services

use std::sync::Arc;

use clinic_gate::auth::password::hash_password;
use clinic_gate::auth::user::{AccountType, SubscriptionPlan, TeamRole, User};
use clinic_gate::auth::TokenPayload;
use clinic_gate::notify::MemoryNotifier;
use clinic_gate::storage::{MemoryStore, UserStore};
use clinic_gate::{AppState, AuthConfig, ClinicGateError};
use warp::http::{HeaderMap, HeaderValue};

const PASSWORD: &str = "correct horse battery";
const EMAIL: &str = "lima@example.com";

async fn setup() -> (AppState, Arc<MemoryStore>, Arc<MemoryNotifier>, User) {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let state = AppState::new(store.clone(), notifier.clone(), AuthConfig::for_testing()).unwrap();

    let owner = User::professional("52998224725", "Dr. Lima", SubscriptionPlan::Pro)
        .with_email(EMAIL)
        .with_password_hash(hash_password(PASSWORD).unwrap());
    store.create_user(owner.clone()).await.unwrap();

    (state, store, notifier, owner)
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

#[tokio::test]
async fn test_login_issues_session_only_after_code() {
    let (state, _, notifier, owner) = setup().await;

    let challenge = state
        .login
        .begin("52998224725", AccountType::Professional, PASSWORD)
        .await
        .unwrap();
    assert_eq!(challenge.masked_email, "l***@example.com");

    // The pending token is not a session
    assert!(state.tokens.verify_session(&challenge.pending_token).is_err());
    assert!(state.sessions.require(&bearer(&challenge.pending_token)).await.is_err());

    let code = notifier.last_code_for(EMAIL).await.unwrap();
    assert_eq!(code.len(), 6);

    let outcome = state.login.complete(&challenge.pending_token, &code).await.unwrap();
    let claims = state.sessions.require(&bearer(&outcome.session.token)).await.unwrap();
    assert_eq!(claims.sub, owner.id);
    assert_eq!(claims.identity(), owner.identity());
}

#[tokio::test]
async fn test_code_is_single_use() {
    let (state, _, notifier, _) = setup().await;
    let challenge = state
        .login
        .begin("52998224725", AccountType::Professional, PASSWORD)
        .await
        .unwrap();
    let code = notifier.last_code_for(EMAIL).await.unwrap();

    state.login.complete(&challenge.pending_token, &code).await.unwrap();
    let replay = state.login.complete(&challenge.pending_token, &code).await;
    assert!(matches!(replay, Err(ClinicGateError::AlreadyUsed(_))));
}

#[tokio::test]
async fn test_resend_supersedes_previous_code() {
    let (state, _, notifier, _) = setup().await;
    let challenge = state
        .login
        .begin("52998224725", AccountType::Professional, PASSWORD)
        .await
        .unwrap();
    let first = notifier.last_code_for(EMAIL).await.unwrap();

    let mut second = first.clone();
    // Codes are random; resend until a different one comes out
    for _ in 0..10 {
        state.login.resend(&challenge.pending_token).await.unwrap();
        second = notifier.last_code_for(EMAIL).await.unwrap();
        if second != first {
            break;
        }
    }
    assert_ne!(first, second);

    let stale = state.login.complete(&challenge.pending_token, &first).await;
    assert!(matches!(stale, Err(ClinicGateError::Unauthenticated(_))));
    assert!(state.login.complete(&challenge.pending_token, &second).await.is_ok());
}

#[tokio::test]
async fn test_unknown_account_and_wrong_password_look_alike() {
    let (state, _, notifier, _) = setup().await;

    let unknown = state
        .login
        .begin("00000000000", AccountType::Professional, PASSWORD)
        .await
        .unwrap_err();
    let wrong = state
        .login
        .begin("52998224725", AccountType::Professional, "not the password")
        .await
        .unwrap_err();

    assert_eq!(unknown.kind(), wrong.kind());
    assert_eq!(unknown.public_message(), wrong.public_message());
    assert!(notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_same_identifier_other_account_type_is_separate() {
    let (state, store, _, _) = setup().await;
    let patient = User::new(
        "52998224725".to_string(),
        AccountType::Patient,
        "Paciente".to_string(),
    )
    .with_email("patient@example.com")
    .with_password_hash(hash_password("another long secret").unwrap());
    store.create_user(patient).await.unwrap();

    assert!(state
        .login
        .begin("52998224725", AccountType::Patient, PASSWORD)
        .await
        .is_err());
    assert!(state
        .login
        .begin("52998224725", AccountType::Patient, "another long secret")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let (state, _, notifier, _) = setup().await;
    let challenge = state
        .login
        .begin("52998224725", AccountType::Professional, PASSWORD)
        .await
        .unwrap();
    let code = notifier.last_code_for(EMAIL).await.unwrap();
    let outcome = state.login.complete(&challenge.pending_token, &code).await.unwrap();

    let headers = bearer(&outcome.session.token);
    let claims = state.sessions.require(&headers).await.unwrap();
    state.login.logout(&claims).await.unwrap();

    assert!(state.sessions.resolve(&headers).await.is_none());
}

#[tokio::test]
async fn test_disabled_between_steps_blocks_completion() {
    let (state, store, notifier, owner) = setup().await;
    let challenge = state
        .login
        .begin("52998224725", AccountType::Professional, PASSWORD)
        .await
        .unwrap();
    let code = notifier.last_code_for(EMAIL).await.unwrap();

    let mut disabled = owner.clone();
    disabled.disabled = true;
    store.update_user(disabled).await.unwrap();

    let result = state.login.complete(&challenge.pending_token, &code).await;
    assert!(matches!(result, Err(ClinicGateError::AccessRestricted(_))));
}

#[tokio::test]
async fn test_staff_session_carries_owner_plan() {
    let (state, store, notifier, owner) = setup().await;
    let staff = User::staff("11144477735", "Ana", &owner.id, TeamRole::Assistant, None)
        .with_email("ana@example.com")
        .with_password_hash(hash_password("assistant password").unwrap());
    store.create_user(staff.clone()).await.unwrap();

    let challenge = state
        .login
        .begin("11144477735", AccountType::Professional, "assistant password")
        .await
        .unwrap();
    let code = notifier.last_code_for("ana@example.com").await.unwrap();
    let outcome = state.login.complete(&challenge.pending_token, &code).await.unwrap();

    match state.tokens.verify(&outcome.session.token).unwrap() {
        TokenPayload::Session(claims) => {
            assert_eq!(claims.owner_professional_id.as_deref(), Some(owner.id.as_str()));
            assert_eq!(claims.plan, Some(SubscriptionPlan::Pro));
        }
        other => panic!("expected a session token, got {:?}", other),
    }
}

#[tokio::test]
async fn test_delivery_failure_is_reported() {
    let (state, _, notifier, _) = setup().await;
    notifier.set_failing(true);

    let result = state
        .login
        .begin("52998224725", AccountType::Professional, PASSWORD)
        .await;
    assert!(matches!(result, Err(ClinicGateError::DeliveryError(_))));
}
