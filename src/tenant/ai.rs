//! AI provider credential gating
//!
//! Only the tenant owner may configure the key. It is stored encrypted
//! under the tenant's current data key.

use std::sync::Arc;

use crate::auth::user::Identity;
use crate::crypto::KeyLifecycleManager;
use crate::error::{ClinicGateError, Result};
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::TenantSettingsStore;
use crate::tenant::capability::{Capability, CapabilityGate};
use crate::tenant::resolver::TenantContext;

const MAX_API_KEY_LENGTH: usize = 512;

pub struct AiCredentialService {
    settings: Arc<dyn TenantSettingsStore>,
    keys: Arc<KeyLifecycleManager>,
    gate: Arc<CapabilityGate>,
}

impl AiCredentialService {
    pub fn new(
        settings: Arc<dyn TenantSettingsStore>,
        keys: Arc<KeyLifecycleManager>,
        gate: Arc<CapabilityGate>,
    ) -> Self {
        Self { settings, keys, gate }
    }

    pub async fn store_api_key(&self, identity: &Identity, api_key: &str) -> Result<()> {
        let ctx = TenantContext::from_identity(identity);
        self.gate.ensure_tenant_owner(&ctx, "store_ai_key").await?;
        self.gate.ensure_capability(&ctx, Capability::AiInsights).await?;

        let api_key = api_key.trim();
        if api_key.is_empty()
            || api_key.len() > MAX_API_KEY_LENGTH
            || api_key.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ClinicGateError::InvalidInput("Invalid API key".to_string()));
        }

        let encrypted = self.keys.encrypt_field(&ctx.owner_tenant_id, api_key).await?;
        self.settings
            .set_ai_credential(&ctx.owner_tenant_id, Some(encrypted))
            .await?;

        self.audit(&ctx, "stored").await;
        Ok(())
    }

    /// Decrypted key for any tenant member whose plan includes AI insights
    pub async fn api_key(&self, identity: &Identity) -> Result<Option<String>> {
        let ctx = TenantContext::from_identity(identity);
        self.gate.ensure_capability(&ctx, Capability::AiInsights).await?;

        match self.settings.get_ai_credential(&ctx.owner_tenant_id).await? {
            Some(secret) => self
                .keys
                .decrypt_field(&ctx.owner_tenant_id, &secret)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    pub async fn remove_api_key(&self, identity: &Identity) -> Result<()> {
        let ctx = TenantContext::from_identity(identity);
        self.gate.ensure_tenant_owner(&ctx, "remove_ai_key").await?;

        self.settings.set_ai_credential(&ctx.owner_tenant_id, None).await?;
        self.audit(&ctx, "removed").await;
        Ok(())
    }

    async fn audit(&self, ctx: &TenantContext, action: &str) {
        log_security_event(SecurityEvent::AiCredentialChanged {
            tenant_id: ctx.owner_tenant_id.clone(),
            user_id: ctx.user_id.clone(),
            action: action.to_string(),
        })
        .await;
    }
}
