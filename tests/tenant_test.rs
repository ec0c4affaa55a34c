// Tenant boundaries, clinic scoping and plan limits

use std::sync::Arc;

use clinic_gate::auth::user::{SubscriptionPlan, SubscriptionStatus, TeamRole, User};
use clinic_gate::notify::MemoryNotifier;
use clinic_gate::storage::{MemoryStore, PatientRecord, UserStore};
use clinic_gate::tenant::invitation::{AcceptInvitation, CreateInvitation};
use clinic_gate::tenant::ClinicScope;
use clinic_gate::{AppState, AuthConfig, ClinicGateError};

async fn setup(plan: SubscriptionPlan) -> (AppState, Arc<MemoryStore>, User) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        store.clone(),
        Arc::new(MemoryNotifier::new()),
        AuthConfig::for_testing(),
    )
    .unwrap();

    let owner = User::professional("52998224725", "Dr. Souza", plan).with_email("souza@example.com");
    store.create_user(owner.clone()).await.unwrap();
    (state, store, owner)
}

fn acceptance(token: &str, identifier: &str) -> AcceptInvitation {
    AcceptInvitation {
        token: token.to_string(),
        identifier: identifier.to_string(),
        display_name: "Bia".to_string(),
        password: "assistant password".to_string(),
        email: None,
    }
}

#[tokio::test]
async fn test_pro_tenant_end_to_end() {
    let (state, store, owner) = setup(SubscriptionPlan::Pro).await;
    let owner_identity = owner.identity();

    // Two clinics fit the plan, a third does not
    let c1 = state.clinics.create(&owner_identity, "Centro", "Rua A, 10").await.unwrap();
    let c2 = state.clinics.create(&owner_identity, "Norte", "").await.unwrap();
    let third = state.clinics.create(&owner_identity, "Sul", "").await;
    assert!(matches!(third, Err(ClinicGateError::LimitExceeded(_))));

    // An assistant invited into C1
    let issued = state
        .invitations
        .create(
            &owner_identity,
            CreateInvitation {
                role: TeamRole::Assistant,
                clinic_id: Some(c1.id.clone()),
                email: Some("bia@example.com".to_string()),
            },
        )
        .await
        .unwrap();

    let accepted = state
        .invitations
        .accept(acceptance(&issued.token, "11144477735"))
        .await
        .unwrap();
    assert_eq!(accepted.owner_tenant_id, owner.id);
    assert_eq!(accepted.staff.email.as_deref(), Some("bia@example.com"));

    let again = state
        .invitations
        .accept(acceptance(&issued.token, "39053344705"))
        .await;
    assert!(matches!(again, Err(ClinicGateError::AlreadyUsed(_))));
    assert_eq!(store.count_staff(&owner.id).await.unwrap(), 1);

    let assistant = accepted.session.claims.identity();

    // Whatever clinic the assistant asks for, the assigned one is used
    let clinic = state
        .resolver
        .resolve_clinic(&assistant, Some(&c2.id))
        .await
        .unwrap();
    assert_eq!(clinic.as_deref(), Some(c1.id.as_str()));
    assert_eq!(
        state.resolver.clinic_scope(&assistant).unwrap(),
        ClinicScope::Only(c1.id.clone())
    );

    let visible = state.clinics.visible_clinics(&assistant).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, c1.id);

    // Patients outside the assigned clinic look nonexistent
    for (id, clinic_id) in [("p1", &c1.id), ("p2", &c2.id)] {
        store
            .insert_patient(PatientRecord {
                id: id.to_string(),
                owner_id: owner.id.clone(),
                clinic_id: Some(clinic_id.clone()),
                display_name: format!("Paciente {}", id),
            })
            .await;
    }
    assert!(state.resolver.authorize_patient(&assistant, "p1").await.is_ok());
    assert!(matches!(
        state.resolver.authorize_patient(&assistant, "p2").await,
        Err(ClinicGateError::NotFound)
    ));
    assert!(state.resolver.authorize_patient(&owner_identity, "p2").await.is_ok());

    // Restricted staff cannot manage the tenant
    let denied = state
        .invitations
        .create(
            &assistant,
            CreateInvitation {
                role: TeamRole::Assistant,
                clinic_id: None,
                email: None,
            },
        )
        .await;
    assert!(matches!(denied, Err(ClinicGateError::AccessRestricted(_))));
}

#[tokio::test]
async fn test_other_tenant_patient_is_not_found() {
    let (state, store, owner) = setup(SubscriptionPlan::Pro).await;
    let other = User::professional("39053344705", "Dr. Reis", SubscriptionPlan::Pro);
    store.create_user(other.clone()).await.unwrap();

    store
        .insert_patient(PatientRecord {
            id: "shared-looking-id".to_string(),
            owner_id: other.id.clone(),
            clinic_id: None,
            display_name: "Paciente".to_string(),
        })
        .await;

    let result = state
        .resolver
        .authorize_patient(&owner.identity(), "shared-looking-id")
        .await;
    assert!(matches!(result, Err(ClinicGateError::NotFound)));
    assert!(state
        .resolver
        .authorize_patient(&other.identity(), "shared-looking-id")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_foreign_clinic_rejected_for_owner() {
    let (state, store, owner) = setup(SubscriptionPlan::Pro).await;
    let other = User::professional("39053344705", "Dr. Reis", SubscriptionPlan::Pro);
    store.create_user(other.clone()).await.unwrap();
    let foreign = state.clinics.create(&other.identity(), "Alheia", "").await.unwrap();

    let result = state
        .resolver
        .resolve_clinic(&owner.identity(), Some(&foreign.id))
        .await;
    assert!(matches!(result, Err(ClinicGateError::InvalidClinic)));
}

#[tokio::test]
async fn test_starter_plan_limits() {
    let (state, _, owner) = setup(SubscriptionPlan::Starter).await;
    let identity = owner.identity();

    state.clinics.create(&identity, "Unica", "").await.unwrap();
    assert!(matches!(
        state.clinics.create(&identity, "Segunda", "").await,
        Err(ClinicGateError::LimitExceeded(_))
    ));

    let invite = state
        .invitations
        .create(
            &identity,
            CreateInvitation {
                role: TeamRole::Assistant,
                clinic_id: None,
                email: None,
            },
        )
        .await;
    assert!(matches!(invite, Err(ClinicGateError::LimitExceeded(_))));

    assert!(matches!(
        state.ai.store_api_key(&identity, "sk-test-123").await,
        Err(ClinicGateError::AccessRestricted(_))
    ));
}

#[tokio::test]
async fn test_lapsed_subscription_falls_back_to_starter() {
    let (state, store, mut owner) = setup(SubscriptionPlan::Enterprise).await;
    if let Some(subscription) = owner.subscription.as_mut() {
        subscription.status = SubscriptionStatus::Canceled;
    }
    store.update_user(owner.clone()).await.unwrap();

    assert_eq!(
        state.gate.tenant_plan(&owner.id).await.unwrap(),
        SubscriptionPlan::Starter
    );
}

#[tokio::test]
async fn test_downgrade_applies_to_staff_immediately() {
    let (state, store, mut owner) = setup(SubscriptionPlan::Pro).await;
    let staff = User::staff("11144477735", "Bia", &owner.id, TeamRole::Professional, None);
    store.create_user(staff.clone()).await.unwrap();

    // Token copy still says Pro; the live plan decides
    let staff_identity = state.gate.session_identity(&staff).await.unwrap();
    assert_eq!(staff_identity.plan, Some(SubscriptionPlan::Pro));
    state.ai.api_key(&staff_identity).await.unwrap();

    owner.subscription = Some(clinic_gate::auth::user::SubscriptionSummary::active(
        SubscriptionPlan::Starter,
    ));
    store.update_user(owner).await.unwrap();

    assert!(matches!(
        state.ai.api_key(&staff_identity).await,
        Err(ClinicGateError::AccessRestricted(_))
    ));
}

#[tokio::test]
async fn test_ai_key_encrypted_and_shared_with_team() {
    let (state, store, owner) = setup(SubscriptionPlan::Pro).await;
    let staff = User::staff("11144477735", "Bia", &owner.id, TeamRole::Professional, None);
    store.create_user(staff.clone()).await.unwrap();

    state.ai.store_api_key(&owner.identity(), "sk-live-abc123").await.unwrap();
    assert_eq!(
        state.ai.api_key(&staff.identity()).await.unwrap().as_deref(),
        Some("sk-live-abc123")
    );

    // Only the owner may change it
    assert!(matches!(
        state.ai.remove_api_key(&staff.identity()).await,
        Err(ClinicGateError::AccessRestricted(_))
    ));
    state.ai.remove_api_key(&owner.identity()).await.unwrap();
    assert_eq!(state.ai.api_key(&owner.identity()).await.unwrap(), None);
}

#[tokio::test]
async fn test_calendar_state_binds_tenant() {
    let (state, _, owner) = setup(SubscriptionPlan::Starter).await;
    let url = state
        .calendar
        .authorization_url(&owner.identity(), "https://app.example.com/calendar/callback")
        .await
        .unwrap();

    let parsed = url::Url::parse(&url).unwrap();
    let returned = parsed
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let decoded = state.calendar.verify_state(&returned).unwrap();
    assert_eq!(decoded.owner_tenant_id, owner.id);
    assert_eq!(decoded.user_id, owner.id);

    // A calendar state is not a session
    assert!(state.tokens.verify_session(&returned).is_err());
}
