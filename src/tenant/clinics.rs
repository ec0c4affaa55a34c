use chrono::Utc;
use std::sync::Arc;

use crate::auth::user::Identity;
use crate::error::{ClinicGateError, Result};
use crate::storage::{Clinic, ClinicStore};
use crate::tenant::capability::CapabilityGate;
use crate::tenant::resolver::{ClinicScope, TenantContext, TenantResolver};

const MAX_CLINIC_NAME_LENGTH: usize = 120;
const MAX_CLINIC_ADDRESS_LENGTH: usize = 300;

/// Clinic creation and visibility within a tenant
pub struct ClinicService {
    clinics: Arc<dyn ClinicStore>,
    resolver: Arc<TenantResolver>,
    gate: Arc<CapabilityGate>,
}

impl ClinicService {
    pub fn new(clinics: Arc<dyn ClinicStore>, resolver: Arc<TenantResolver>, gate: Arc<CapabilityGate>) -> Self {
        Self { clinics, resolver, gate }
    }

    /// Create a clinic for the caller's tenant, subject to the plan's clinic limit
    pub async fn create(&self, identity: &Identity, name: &str, address: &str) -> Result<Clinic> {
        let ctx = TenantContext::from_identity(identity);
        self.gate.ensure_tenant_manager(&ctx, "create_clinic").await?;

        let name = name.trim();
        let address = address.trim();
        if name.is_empty() || name.chars().count() > MAX_CLINIC_NAME_LENGTH {
            return Err(ClinicGateError::InvalidInput(format!(
                "Clinic name must be 1 to {} characters",
                MAX_CLINIC_NAME_LENGTH
            )));
        }
        if address.chars().count() > MAX_CLINIC_ADDRESS_LENGTH {
            return Err(ClinicGateError::InvalidInput("Clinic address is too long".to_string()));
        }

        let existing = self.clinics.count_clinics(&ctx.owner_tenant_id).await?;
        self.gate.ensure_clinic_capacity(&ctx, existing).await?;

        let clinic = Clinic {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: ctx.owner_tenant_id.clone(),
            name: name.to_string(),
            address: address.to_string(),
            created_at: Utc::now(),
        };
        self.clinics.create_clinic(clinic.clone()).await?;

        log::info!(
            "Clinic {} created for tenant {} by {}",
            clinic.id,
            ctx.owner_tenant_id,
            ctx.user_id
        );
        Ok(clinic)
    }

    /// Clinics the caller can see
    pub async fn visible_clinics(&self, identity: &Identity) -> Result<Vec<Clinic>> {
        let ctx = TenantContext::from_identity(identity);

        match self.resolver.clinic_scope(identity) {
            Ok(ClinicScope::All) => self.clinics.list_clinics(&ctx.owner_tenant_id).await,
            Ok(ClinicScope::Only(clinic_id)) => Ok(self
                .clinics
                .find_clinic(&ctx.owner_tenant_id, &clinic_id)
                .await?
                .into_iter()
                .collect()),
            Err(ClinicGateError::NoClinicAssigned) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
