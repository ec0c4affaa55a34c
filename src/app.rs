//! Service wiring
//!
//! Builds every service over one shared store so the server binary and
//! tests assemble the core the same way.

use std::sync::Arc;

use crate::auth::{LoginService, SessionResolver, TokenService, TwoFactorEngine};
use crate::config::AuthConfig;
use crate::crypto::KeyLifecycleManager;
use crate::error::Result;
use crate::notify::TwoFactorNotifier;
use crate::storage::CredentialStore;
use crate::tenant::{
    AiCredentialService, CalendarOAuth, CapabilityGate, ClinicService, InvitationService, TenantResolver,
};

/// Shared handles to every service
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionResolver>,
    pub two_factor: Arc<TwoFactorEngine>,
    pub login: Arc<LoginService>,
    pub resolver: Arc<TenantResolver>,
    pub gate: Arc<CapabilityGate>,
    pub clinics: Arc<ClinicService>,
    pub invitations: Arc<InvitationService>,
    pub keys: Arc<KeyLifecycleManager>,
    pub ai: Arc<AiCredentialService>,
    pub calendar: Arc<CalendarOAuth>,
}

impl AppState {
    pub fn new<S: CredentialStore>(
        store: Arc<S>,
        notifier: Arc<dyn TwoFactorNotifier>,
        config: AuthConfig,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenService::from_config(&config));
        let keys = Arc::new(KeyLifecycleManager::from_config(store.clone(), &config)?);
        let gate = Arc::new(CapabilityGate::new(store.clone()));
        let resolver = Arc::new(TenantResolver::new(store.clone(), store.clone()));

        let sessions = Arc::new(SessionResolver::new(tokens.clone(), store.clone(), &config));
        let two_factor = Arc::new(TwoFactorEngine::new(store.clone(), notifier, &config));
        let login = Arc::new(LoginService::new(
            store.clone(),
            store.clone(),
            two_factor.clone(),
            tokens.clone(),
            gate.clone(),
        ));

        let clinics = Arc::new(ClinicService::new(store.clone(), resolver.clone(), gate.clone()));
        let invitations = Arc::new(InvitationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            gate.clone(),
            tokens.clone(),
            &config,
        ));
        let ai = Arc::new(AiCredentialService::new(store.clone(), keys.clone(), gate.clone()));
        let calendar = Arc::new(CalendarOAuth::new(tokens.clone(), gate.clone(), &config));

        Ok(Self {
            config: Arc::new(config),
            tokens,
            sessions,
            two_factor,
            login,
            resolver,
            gate,
            clinics,
            invitations,
            keys,
            ai,
            calendar,
        })
    }
}
