//! Tenant and role resolution
//!
//! Pure function of the caller identity, the requested target and records
//! fetched fresh for this call. Nothing is cached between calls, and every
//! failure denies.

use std::sync::Arc;

use crate::auth::user::{Identity, TeamRole};
use crate::error::{ClinicGateError, Result};
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::{ClinicStore, PatientRecord, PatientStore};

/// The caller's position inside a tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub user_id: String,
    /// Tenant the caller acts within: the owner reference, or the caller
    pub owner_tenant_id: String,
    pub team_role: Option<TeamRole>,
    pub team_clinic_id: Option<String>,
}

impl TenantContext {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            owner_tenant_id: identity
                .owner_professional_id
                .clone()
                .unwrap_or_else(|| identity.user_id.clone()),
            team_role: identity.owner_professional_id.as_ref().and(identity.team_role),
            team_clinic_id: identity.team_clinic_id.clone(),
        }
    }

    /// Context of the tenant owner themself
    pub fn owner(owner_tenant_id: &str) -> Self {
        Self {
            user_id: owner_tenant_id.to_string(),
            owner_tenant_id: owner_tenant_id.to_string(),
            team_role: None,
            team_clinic_id: None,
        }
    }

    pub fn is_team_member(&self) -> bool {
        self.user_id != self.owner_tenant_id
    }

    pub fn is_tenant_admin(&self) -> bool {
        self.is_team_member() && self.team_role.map_or(false, |role| role.is_admin())
    }

    /// Staff limited to their assigned clinic
    pub fn is_clinic_restricted(&self) -> bool {
        self.is_team_member() && !self.is_tenant_admin()
    }
}

/// Which clinics a list query may cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClinicScope {
    All,
    Only(String),
}

impl ClinicScope {
    pub fn permits(&self, clinic_id: Option<&str>) -> bool {
        match self {
            ClinicScope::All => true,
            ClinicScope::Only(assigned) => clinic_id == Some(assigned.as_str()),
        }
    }
}

pub struct TenantResolver {
    clinics: Arc<dyn ClinicStore>,
    patients: Arc<dyn PatientStore>,
}

impl TenantResolver {
    pub fn new(clinics: Arc<dyn ClinicStore>, patients: Arc<dyn PatientStore>) -> Self {
        Self { clinics, patients }
    }

    /// Clinic a new or filtered tenant-scoped record belongs to.
    ///
    /// Restricted staff always get their assigned clinic, whatever they
    /// asked for. Owners and admins may name any clinic of their tenant;
    /// `None` means tenant-wide.
    pub async fn resolve_clinic(&self, identity: &Identity, requested: Option<&str>) -> Result<Option<String>> {
        let ctx = TenantContext::from_identity(identity);

        if ctx.is_clinic_restricted() {
            let assigned = ctx.team_clinic_id.clone().ok_or(ClinicGateError::NoClinicAssigned)?;
            if let Some(requested) = requested.filter(|r| *r != assigned) {
                log::debug!(
                    "User {} requested clinic {}, substituting assigned clinic {}",
                    ctx.user_id,
                    requested,
                    assigned
                );
            }
            return Ok(Some(assigned));
        }

        match requested {
            Some(clinic_id) => match self.clinics.find_clinic(&ctx.owner_tenant_id, clinic_id).await? {
                Some(clinic) => Ok(Some(clinic.id)),
                None => {
                    log::warn!(
                        "User {} named clinic {} outside tenant {}",
                        ctx.user_id,
                        clinic_id,
                        ctx.owner_tenant_id
                    );
                    Err(ClinicGateError::InvalidClinic)
                }
            },
            None => Ok(ctx.team_clinic_id),
        }
    }

    /// Filter for tenant-scoped list queries
    pub fn clinic_scope(&self, identity: &Identity) -> Result<ClinicScope> {
        let ctx = TenantContext::from_identity(identity);
        if ctx.is_clinic_restricted() {
            return ctx
                .team_clinic_id
                .map(ClinicScope::Only)
                .ok_or(ClinicGateError::NoClinicAssigned);
        }
        Ok(ClinicScope::All)
    }

    /// Fetch a patient the caller may touch.
    ///
    /// Records of another tenant, or of another clinic for restricted
    /// staff, are reported exactly like records that do not exist.
    pub async fn authorize_patient(&self, identity: &Identity, patient_id: &str) -> Result<PatientRecord> {
        let ctx = TenantContext::from_identity(identity);

        let patient = self
            .patients
            .find_patient(&ctx.owner_tenant_id, patient_id)
            .await?
            .ok_or(ClinicGateError::NotFound)?;

        if ctx.is_clinic_restricted() {
            let same_clinic = match (&ctx.team_clinic_id, &patient.clinic_id) {
                (Some(assigned), Some(clinic)) => assigned == clinic,
                _ => false,
            };
            if !same_clinic {
                log_security_event(SecurityEvent::TenantBoundaryDenied {
                    user_id: ctx.user_id.clone(),
                    tenant_id: ctx.owner_tenant_id.clone(),
                    resource: format!("patient:{}", patient_id),
                })
                .await;
                return Err(ClinicGateError::NotFound);
            }
        }

        Ok(patient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::{SubscriptionPlan, User};
    use crate::storage::{Clinic, MemoryStore};
    use chrono::Utc;

    async fn fixture() -> (TenantResolver, Arc<MemoryStore>, User) {
        let store = Arc::new(MemoryStore::new());
        let owner = User::professional("100", "Dr. Prado", SubscriptionPlan::Pro);
        for id in ["c1", "c2"] {
            store
                .create_clinic(Clinic {
                    id: id.to_string(),
                    owner_id: owner.id.clone(),
                    name: format!("Clinic {}", id),
                    address: "Rua A, 1".to_string(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        store
            .insert_patient(PatientRecord {
                id: "p2".to_string(),
                owner_id: owner.id.clone(),
                clinic_id: Some("c2".to_string()),
                display_name: "Paciente".to_string(),
            })
            .await;
        (TenantResolver::new(store.clone(), store.clone()), store, owner)
    }

    #[test]
    fn test_context_roles() {
        let owner = User::professional("1", "Owner", SubscriptionPlan::Pro);
        let ctx = TenantContext::from_identity(&owner.identity());
        assert_eq!(ctx.owner_tenant_id, owner.id);
        assert!(!ctx.is_team_member());

        let admin = User::staff("2", "Admin", &owner.id, TeamRole::Admin, None);
        let ctx = TenantContext::from_identity(&admin.identity());
        assert!(ctx.is_tenant_admin());
        assert!(!ctx.is_clinic_restricted());
        assert_eq!(ctx.owner_tenant_id, owner.id);
    }

    #[tokio::test]
    async fn test_restricted_staff_get_assigned_clinic() {
        let (resolver, _, owner) = fixture().await;
        let assistant = User::staff("3", "Ana", &owner.id, TeamRole::Assistant, Some("c1"));

        let clinic = resolver.resolve_clinic(&assistant.identity(), Some("c2")).await.unwrap();
        assert_eq!(clinic.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_unassigned_staff_rejected() {
        let (resolver, _, owner) = fixture().await;
        let assistant = User::staff("3", "Ana", &owner.id, TeamRole::Assistant, None);

        assert_eq!(
            resolver.resolve_clinic(&assistant.identity(), None).await,
            Err(ClinicGateError::NoClinicAssigned)
        );
        assert_eq!(resolver.clinic_scope(&assistant.identity()), Err(ClinicGateError::NoClinicAssigned));
    }

    #[tokio::test]
    async fn test_owner_clinic_must_belong_to_tenant() {
        let (resolver, _, owner) = fixture().await;
        let identity = owner.identity();

        assert_eq!(resolver.resolve_clinic(&identity, Some("c2")).await.unwrap().as_deref(), Some("c2"));
        assert_eq!(resolver.resolve_clinic(&identity, None).await.unwrap(), None);

        let stranger = User::professional("999", "Other", SubscriptionPlan::Pro);
        assert_eq!(
            resolver.resolve_clinic(&stranger.identity(), Some("c1")).await,
            Err(ClinicGateError::InvalidClinic)
        );
    }

    #[tokio::test]
    async fn test_patient_access_collapses_to_not_found() {
        let (resolver, _, owner) = fixture().await;

        assert!(resolver.authorize_patient(&owner.identity(), "p2").await.is_ok());

        let wrong_clinic = User::staff("3", "Ana", &owner.id, TeamRole::Assistant, Some("c1"));
        assert_eq!(
            resolver.authorize_patient(&wrong_clinic.identity(), "p2").await,
            Err(ClinicGateError::NotFound)
        );

        let admin = User::staff("4", "Lia", &owner.id, TeamRole::Admin, Some("c1"));
        assert!(resolver.authorize_patient(&admin.identity(), "p2").await.is_ok());

        let other_tenant = User::professional("999", "Other", SubscriptionPlan::Pro);
        assert_eq!(
            resolver.authorize_patient(&other_tenant.identity(), "p2").await,
            Err(ClinicGateError::NotFound)
        );
    }

    #[test]
    fn test_scope_filter() {
        assert!(ClinicScope::All.permits(None));
        let only = ClinicScope::Only("c1".to_string());
        assert!(only.permits(Some("c1")));
        assert!(!only.permits(Some("c2")));
        assert!(!only.permits(None));
    }
}
