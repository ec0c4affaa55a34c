//! Staff invitations
//!
//! The plaintext invitation token is handed out once at creation; only its
//! SHA-256 digest is stored. Acceptance consumes the invitation atomically
//! before the staff account is created, so a token can never produce two
//! accounts.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::auth::password::{hash_password, validate_password};
use crate::auth::token::{IssuedSession, TokenService};
use crate::auth::user::{AccountType, Identity, TeamRole, User};
use crate::config::AuthConfig;
use crate::constants::INVITATION_TOKEN_BYTES;
use crate::error::{ClinicGateError, Result};
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::{ClinicStore, InvitationStore, StaffInvitation, UserStore};
use crate::tenant::capability::CapabilityGate;
use crate::tenant::resolver::TenantContext;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvitation {
    pub role: TeamRole,
    #[serde(default, alias = "clinicId")]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptInvitation {
    pub token: String,
    pub identifier: String,
    #[serde(alias = "displayName")]
    pub display_name: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Invitation as shown to tenant managers; never includes the token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvitationSummary {
    pub id: String,
    pub role: TeamRole,
    pub clinic_id: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&StaffInvitation> for InvitationSummary {
    fn from(invitation: &StaffInvitation) -> Self {
        Self {
            id: invitation.id.clone(),
            role: invitation.role,
            clinic_id: invitation.clinic_id.clone(),
            email: invitation.email.clone(),
            created_at: invitation.created_at,
            expires_at: invitation.expires_at,
        }
    }
}

/// A newly created invitation and its one-time plaintext token
#[derive(Debug, Clone)]
pub struct IssuedInvitation {
    pub invitation: StaffInvitation,
    pub token: String,
}

/// Result of accepting an invitation
#[derive(Debug, Clone)]
pub struct AcceptedInvitation {
    pub staff: User,
    pub owner_tenant_id: String,
    pub session: IssuedSession,
}

/// Hex SHA-256 of an invitation token
pub fn hash_invitation_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}

fn generate_invitation_token() -> String {
    let mut bytes = [0u8; INVITATION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct InvitationService {
    invitations: Arc<dyn InvitationStore>,
    users: Arc<dyn UserStore>,
    clinics: Arc<dyn ClinicStore>,
    gate: Arc<CapabilityGate>,
    tokens: Arc<TokenService>,
    ttl: Duration,
}

impl InvitationService {
    pub fn new(
        invitations: Arc<dyn InvitationStore>,
        users: Arc<dyn UserStore>,
        clinics: Arc<dyn ClinicStore>,
        gate: Arc<CapabilityGate>,
        tokens: Arc<TokenService>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            invitations,
            users,
            clinics,
            gate,
            tokens,
            ttl: Duration::days(config.invitation_ttl_days),
        }
    }

    /// Issue an invitation into the caller's tenant
    pub async fn create(&self, identity: &Identity, request: CreateInvitation) -> Result<IssuedInvitation> {
        let ctx = TenantContext::from_identity(identity);
        self.gate.ensure_tenant_manager(&ctx, "invite_staff").await?;

        if let Some(clinic_id) = request.clinic_id.as_deref() {
            if self.clinics.find_clinic(&ctx.owner_tenant_id, clinic_id).await?.is_none() {
                return Err(ClinicGateError::InvalidClinic);
            }
        }

        let email = request
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        if let Some(email) = email.as_deref() {
            if !email.contains('@') || email.len() > 254 {
                return Err(ClinicGateError::InvalidInput("Invalid email address".to_string()));
            }
        }

        let staff = self.users.count_staff(&ctx.owner_tenant_id).await?;
        self.gate.ensure_seat_available(&ctx, staff).await?;

        let token = generate_invitation_token();
        let now = Utc::now();
        let invitation = StaffInvitation {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: ctx.owner_tenant_id.clone(),
            invited_by: ctx.user_id.clone(),
            email,
            role: request.role,
            clinic_id: request.clinic_id,
            token_hash: hash_invitation_token(&token),
            created_at: now,
            expires_at: now + self.ttl,
            consumed_at: None,
            accepted_user_id: None,
            revoked_at: None,
        };
        self.invitations.create_invitation(invitation.clone()).await?;

        log_security_event(SecurityEvent::InvitationIssued {
            tenant_id: ctx.owner_tenant_id,
            invitation_id: invitation.id.clone(),
            issued_by: ctx.user_id,
        })
        .await;

        Ok(IssuedInvitation { invitation, token })
    }

    /// Accept an invitation, creating the staff account and its first session
    pub async fn accept(&self, request: AcceptInvitation) -> Result<AcceptedInvitation> {
        let identifier = request.identifier.trim();
        let display_name = request.display_name.trim();
        if request.token.trim().is_empty() || identifier.is_empty() || display_name.is_empty() {
            return Err(ClinicGateError::InvalidInput(
                "Token, identifier and name are required".to_string(),
            ));
        }
        validate_password(&request.password)?;

        let invitation = self
            .invitations
            .find_invitation_by_token_hash(&hash_invitation_token(&request.token))
            .await?;
        let invitation = self.check_usable(invitation).await?;

        match self.users.find_by_identifier(identifier, AccountType::Professional).await {
            Ok(None) => {}
            Ok(Some(_)) | Err(ClinicGateError::AccessRestricted(_)) => {
                return Err(ClinicGateError::Conflict(
                    "An account with this identifier already exists".to_string(),
                ));
            }
            Err(e) => return Err(e),
        }

        let owner_ctx = TenantContext::owner(&invitation.owner_id);
        let staff_count = self.users.count_staff(&invitation.owner_id).await?;
        self.gate.ensure_seat_available(&owner_ctx, staff_count).await?;

        let password_hash = hash_password(&request.password)?;
        let mut staff = User::staff(
            identifier,
            display_name,
            &invitation.owner_id,
            invitation.role,
            invitation.clinic_id.as_deref(),
        )
        .with_password_hash(password_hash);
        staff.email = request
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .or_else(|| invitation.email.clone());

        if !self
            .invitations
            .consume_invitation(&invitation.id, &staff.id, Utc::now())
            .await?
        {
            return Err(Self::already_used());
        }

        if let Err(e) = self.users.create_user(staff.clone()).await {
            log::error!(
                "Invitation {} consumed but staff account creation failed: {}",
                invitation.id,
                e
            );
            return Err(e);
        }

        let session = self
            .tokens
            .issue_session_token(&self.gate.session_identity(&staff).await?)?;

        log_security_event(SecurityEvent::InvitationAccepted {
            tenant_id: invitation.owner_id.clone(),
            invitation_id: invitation.id.clone(),
            user_id: staff.id.clone(),
        })
        .await;

        Ok(AcceptedInvitation {
            staff,
            owner_tenant_id: invitation.owner_id,
            session,
        })
    }

    /// Revoke a pending invitation of the caller's tenant
    pub async fn revoke(&self, identity: &Identity, invitation_id: &str) -> Result<()> {
        let ctx = TenantContext::from_identity(identity);
        self.gate.ensure_tenant_manager(&ctx, "revoke_invitation").await?;

        let invitation = self
            .invitations
            .find_invitation(&ctx.owner_tenant_id, invitation_id)
            .await?
            .ok_or(ClinicGateError::NotFound)?;

        if !self.invitations.revoke_invitation(&invitation.id, Utc::now()).await? {
            return Err(ClinicGateError::AlreadyUsed(
                "This invitation is no longer pending".to_string(),
            ));
        }

        log_security_event(SecurityEvent::InvitationRevoked {
            tenant_id: ctx.owner_tenant_id,
            invitation_id: invitation.id,
            revoked_by: ctx.user_id,
        })
        .await;
        Ok(())
    }

    /// Pending invitations of the caller's tenant
    pub async fn list(&self, identity: &Identity) -> Result<Vec<InvitationSummary>> {
        let ctx = TenantContext::from_identity(identity);
        self.gate.ensure_tenant_manager(&ctx, "list_invitations").await?;

        let now = Utc::now();
        Ok(self
            .invitations
            .list_invitations(&ctx.owner_tenant_id)
            .await?
            .iter()
            .filter(|i| i.is_pending_at(now))
            .map(InvitationSummary::from)
            .collect())
    }

    async fn check_usable(&self, invitation: Option<StaffInvitation>) -> Result<StaffInvitation> {
        let now = Utc::now();
        let (reason, error) = match invitation {
            None => ("unknown", Self::invalid()),
            Some(i) if i.revoked_at.is_some() => ("revoked", Self::invalid()),
            Some(i) if i.consumed_at.is_some() => ("consumed", Self::already_used()),
            Some(i) if i.is_expired_at(now) => (
                "expired",
                ClinicGateError::InvalidInput(
                    "This invitation has expired. Ask for a new one.".to_string(),
                ),
            ),
            Some(i) => return Ok(i),
        };

        log_security_event(SecurityEvent::InvitationRejected {
            reason: reason.to_string(),
        })
        .await;
        Err(error)
    }

    fn invalid() -> ClinicGateError {
        ClinicGateError::InvalidInput("This invitation link is not valid".to_string())
    }

    fn already_used() -> ClinicGateError {
        ClinicGateError::AlreadyUsed("This invitation has already been used".to_string())
    }
}
