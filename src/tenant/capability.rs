//! Plan-based capability gating
//!
//! The plan tables are static. Every gate re-reads the tenant owner's live
//! subscription instead of trusting the plan copied into a session token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::auth::user::{Identity, SubscriptionPlan, User};
use crate::error::{ClinicGateError, Result};
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::UserStore;
use crate::tenant::resolver::TenantContext;

/// Named feature gated by subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    MultiClinic,
    AiInsights,
    CalendarSync,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::MultiClinic => "multi_clinic",
            Capability::AiInsights => "ai_insights",
            Capability::CalendarSync => "calendar_sync",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn plan_supports_capability(plan: SubscriptionPlan, capability: Capability) -> bool {
    match plan {
        SubscriptionPlan::Starter => matches!(capability, Capability::CalendarSync),
        SubscriptionPlan::Pro | SubscriptionPlan::Enterprise => true,
    }
}

/// Maximum clinics per tenant; `None` is unbounded
pub fn clinic_limit(plan: SubscriptionPlan) -> Option<usize> {
    match plan {
        SubscriptionPlan::Starter => Some(1),
        SubscriptionPlan::Pro => Some(2),
        SubscriptionPlan::Enterprise => None,
    }
}

/// Maximum seats per tenant, owner included; `None` is unbounded
pub fn staff_seat_limit(plan: SubscriptionPlan) -> Option<usize> {
    match plan {
        SubscriptionPlan::Starter => Some(1),
        SubscriptionPlan::Pro => Some(5),
        SubscriptionPlan::Enterprise => None,
    }
}

/// Whether one more clinic fits when `existing` already exist
pub fn clinic_allowed(plan: SubscriptionPlan, existing: usize) -> bool {
    clinic_limit(plan).map_or(true, |limit| existing < limit)
}

/// Whether one more staff member fits next to `current_staff` and the owner
pub fn seat_available(plan: SubscriptionPlan, current_staff: usize) -> bool {
    staff_seat_limit(plan).map_or(true, |limit| limit.saturating_sub(current_staff + 1) > 0)
}

/// Capability checks against live tenant state
pub struct CapabilityGate {
    users: Arc<dyn UserStore>,
}

impl CapabilityGate {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Plan whose entitlements currently apply to the tenant
    pub async fn tenant_plan(&self, owner_tenant_id: &str) -> Result<SubscriptionPlan> {
        let owner = self.users.find_by_id(owner_tenant_id).await?.ok_or_else(|| {
            log::error!("Tenant owner {} not found", owner_tenant_id);
            ClinicGateError::AccessRestricted("This workspace is no longer available".to_string())
        })?;

        if owner.disabled {
            return Err(ClinicGateError::AccessRestricted(
                "This workspace has been disabled".to_string(),
            ));
        }

        Ok(owner
            .subscription
            .map(|s| s.effective_plan())
            .unwrap_or(SubscriptionPlan::Starter))
    }

    /// Session identity for `user`, with the plan read from the tenant owner
    pub async fn session_identity(&self, user: &User) -> Result<Identity> {
        let mut identity = user.identity();
        if let Some(owner_id) = user.owner_professional_id.as_deref() {
            identity.plan = Some(self.tenant_plan(owner_id).await?);
        }
        Ok(identity)
    }

    pub async fn ensure_capability(&self, ctx: &TenantContext, capability: Capability) -> Result<SubscriptionPlan> {
        let plan = self.tenant_plan(&ctx.owner_tenant_id).await?;
        if plan_supports_capability(plan, capability) {
            return Ok(plan);
        }

        self.deny(ctx, capability.as_str(), "plan").await;
        Err(ClinicGateError::AccessRestricted(format!(
            "Your plan does not include {}",
            capability
        )))
    }

    /// Only the tenant owner, never a staff member
    pub async fn ensure_tenant_owner(&self, ctx: &TenantContext, action: &str) -> Result<()> {
        if ctx.is_team_member() {
            self.deny(ctx, action, "owner_only").await;
            return Err(ClinicGateError::AccessRestricted(
                "Only the account owner can do this".to_string(),
            ));
        }
        Ok(())
    }

    /// Owner or tenant admin
    pub async fn ensure_tenant_manager(&self, ctx: &TenantContext, action: &str) -> Result<()> {
        if ctx.is_team_member() && !ctx.is_tenant_admin() {
            self.deny(ctx, action, "admin_only").await;
            return Err(ClinicGateError::AccessRestricted(
                "Only the account owner or an administrator can do this".to_string(),
            ));
        }
        Ok(())
    }

    /// Clinic-limit gate for creating one more clinic
    pub async fn ensure_clinic_capacity(&self, ctx: &TenantContext, existing: usize) -> Result<()> {
        let plan = self.tenant_plan(&ctx.owner_tenant_id).await?;

        if !clinic_allowed(plan, existing) {
            self.deny(ctx, "create_clinic", "clinic_limit").await;
            return Err(ClinicGateError::LimitExceeded(format!(
                "Your plan allows at most {} clinic(s)",
                clinic_limit(plan).unwrap_or(existing)
            )));
        }
        if existing >= 1 && !plan_supports_capability(plan, Capability::MultiClinic) {
            self.deny(ctx, "create_clinic", "multi_clinic").await;
            return Err(ClinicGateError::AccessRestricted(
                "Managing several clinics requires an upgraded plan".to_string(),
            ));
        }
        Ok(())
    }

    /// Seat gate for adding one more staff member
    pub async fn ensure_seat_available(&self, ctx: &TenantContext, current_staff: usize) -> Result<()> {
        let plan = self.tenant_plan(&ctx.owner_tenant_id).await?;

        if !seat_available(plan, current_staff) {
            self.deny(ctx, "add_staff", "seat_limit").await;
            return Err(ClinicGateError::LimitExceeded(format!(
                "Your plan allows at most {} seat(s), including the owner",
                staff_seat_limit(plan).unwrap_or(current_staff + 1)
            )));
        }
        Ok(())
    }

    async fn deny(&self, ctx: &TenantContext, action: &str, reason: &str) {
        log_security_event(SecurityEvent::PolicyDenied {
            user_id: ctx.user_id.clone(),
            action: action.to_string(),
            reason: reason.to_string(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::{SubscriptionStatus, TeamRole};
    use crate::storage::MemoryStore;

    #[test]
    fn test_capability_table() {
        assert!(!plan_supports_capability(SubscriptionPlan::Starter, Capability::AiInsights));
        assert!(!plan_supports_capability(SubscriptionPlan::Starter, Capability::MultiClinic));
        assert!(plan_supports_capability(SubscriptionPlan::Starter, Capability::CalendarSync));
        assert!(plan_supports_capability(SubscriptionPlan::Pro, Capability::AiInsights));
        assert!(plan_supports_capability(SubscriptionPlan::Enterprise, Capability::MultiClinic));
    }

    #[test]
    fn test_clinic_limit_boundary() {
        assert!(clinic_allowed(SubscriptionPlan::Pro, 1));
        assert!(!clinic_allowed(SubscriptionPlan::Pro, 2));
        assert!(clinic_allowed(SubscriptionPlan::Enterprise, 10_000));
    }

    #[test]
    fn test_seat_limit_counts_owner() {
        assert!(!seat_available(SubscriptionPlan::Starter, 0));
        assert!(seat_available(SubscriptionPlan::Pro, 3));
        assert!(!seat_available(SubscriptionPlan::Pro, 4));
        assert!(!seat_available(SubscriptionPlan::Pro, 9));
        assert!(seat_available(SubscriptionPlan::Enterprise, 500));
    }

    #[tokio::test]
    async fn test_gate_uses_live_plan() {
        let store = Arc::new(MemoryStore::new());
        let mut owner = User::professional("100", "Dr. Prado", SubscriptionPlan::Pro);
        store.create_user(owner.clone()).await.unwrap();
        let gate = CapabilityGate::new(store.clone());
        let ctx = TenantContext::from_identity(&owner.identity());

        assert!(gate.ensure_capability(&ctx, Capability::AiInsights).await.is_ok());

        owner.subscription.as_mut().unwrap().status = SubscriptionStatus::Canceled;
        store.update_user(owner).await.unwrap();
        assert!(matches!(
            gate.ensure_capability(&ctx, Capability::AiInsights).await,
            Err(ClinicGateError::AccessRestricted(_))
        ));
    }

    #[tokio::test]
    async fn test_staff_session_identity_carries_owner_plan() {
        let store = Arc::new(MemoryStore::new());
        let owner = User::professional("100", "Dr. Prado", SubscriptionPlan::Pro);
        let staff = User::staff("200", "Rui", &owner.id, TeamRole::Assistant, Some("c1"));
        store.create_user(owner.clone()).await.unwrap();

        let gate = CapabilityGate::new(store);
        let identity = gate.session_identity(&staff).await.unwrap();
        assert_eq!(identity.plan, Some(SubscriptionPlan::Pro));
        assert_eq!(identity.owner_professional_id, Some(owner.id));
    }

    #[tokio::test]
    async fn test_staff_cannot_act_as_owner() {
        let gate = CapabilityGate::new(Arc::new(MemoryStore::new()));
        let admin = User::staff("300", "Lia", "owner-1", TeamRole::Admin, None);
        let ctx = TenantContext::from_identity(&admin.identity());

        assert!(gate.ensure_tenant_manager(&ctx, "invite").await.is_ok());
        assert!(matches!(
            gate.ensure_tenant_owner(&ctx, "store_ai_key").await,
            Err(ClinicGateError::AccessRestricted(_))
        ));
    }
}
