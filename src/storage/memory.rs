//! In-memory storage implementation for development and testing
//!
//! Every collaborator trait is implemented by one `MemoryStore`. Each
//! compare-and-swap style operation runs under a single write lock, which
//! gives it the atomicity the traits require.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::traits::*;
use crate::auth::user::{AccountType, User};
use crate::error::{ClinicGateError, Result};

/// In-memory credential store
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    challenges: RwLock<HashMap<String, TwoFactorChallenge>>, // user_id -> latest challenge
    invitations: RwLock<HashMap<String, StaffInvitation>>,
    clinics: RwLock<HashMap<String, Clinic>>,
    patients: RwLock<HashMap<String, PatientRecord>>,
    keys: RwLock<HashMap<String, EncryptionKeyRecord>>, // tenant_id -> record
    revoked_sessions: RwLock<HashMap<String, RevokedSession>>,
    ai_credentials: RwLock<HashMap<String, EncryptedSecret>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a patient record; patient CRUD itself lives outside this crate
    pub async fn insert_patient(&self, patient: PatientRecord) {
        self.patients.write().await.insert(patient.id.clone(), patient);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_identifier(&self, identifier: &str, account_type: AccountType) -> Result<Option<User>> {
        let users = self.users.read().await;
        let found = users
            .values()
            .find(|u| u.identifier == identifier && u.account_type == account_type);

        match found {
            Some(user) if user.disabled => Err(ClinicGateError::AccessRestricted(
                "This account has been disabled".to_string(),
            )),
            Some(user) => Ok(Some(user.clone())),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn create_user(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;

        let taken = users
            .values()
            .any(|u| u.identifier == user.identifier && u.account_type == user.account_type);
        if taken || users.contains_key(&user.id) {
            return Err(ClinicGateError::Conflict(format!(
                "An account with this identifier already exists for {}",
                user.account_type
            )));
        }

        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn update_user(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;

        if !users.contains_key(&user.id) {
            return Err(ClinicGateError::NotFound);
        }
        let clash = users.values().any(|u| {
            u.id != user.id && u.identifier == user.identifier && u.account_type == user.account_type
        });
        if clash {
            return Err(ClinicGateError::Conflict(
                "Identifier already in use for this account type".to_string(),
            ));
        }

        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn count_staff(&self, owner_id: &str) -> Result<usize> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|u| !u.disabled && u.owner_professional_id.as_deref() == Some(owner_id))
            .count())
    }
}

#[async_trait]
impl TwoFactorStore for MemoryStore {
    async fn upsert_challenge(&self, challenge: TwoFactorChallenge) -> Result<()> {
        self.challenges
            .write()
            .await
            .insert(challenge.user_id.clone(), challenge);
        Ok(())
    }

    async fn latest_challenge(&self, user_id: &str) -> Result<Option<TwoFactorChallenge>> {
        Ok(self.challenges.read().await.get(user_id).cloned())
    }

    async fn consume_challenge(&self, user_id: &str, challenge_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut challenges = self.challenges.write().await;
        match challenges.get_mut(user_id) {
            Some(challenge) if challenge.id == challenge_id && challenge.consumed_at.is_none() => {
                challenge.consumed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_attempt(&self, user_id: &str, challenge_id: &str, max_attempts: u32) -> Result<AttemptClaim> {
        let mut challenges = self.challenges.write().await;
        let challenge = match challenges.get_mut(user_id) {
            Some(challenge) if challenge.id == challenge_id => challenge,
            _ => return Ok(AttemptClaim::Superseded),
        };

        if challenge.consumed_at.is_some() {
            return Ok(AttemptClaim::Consumed);
        }
        if challenge.attempts >= max_attempts {
            return Ok(AttemptClaim::Exhausted);
        }
        challenge.attempts += 1;
        Ok(AttemptClaim::Granted(challenge.attempts))
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn create_invitation(&self, invitation: StaffInvitation) -> Result<()> {
        let mut invitations = self.invitations.write().await;
        if invitations
            .values()
            .any(|i| i.id == invitation.id || i.token_hash == invitation.token_hash)
        {
            return Err(ClinicGateError::Conflict("Invitation already exists".to_string()));
        }
        invitations.insert(invitation.id.clone(), invitation);
        Ok(())
    }

    async fn find_invitation_by_token_hash(&self, token_hash: &str) -> Result<Option<StaffInvitation>> {
        let invitations = self.invitations.read().await;
        Ok(invitations.values().find(|i| i.token_hash == token_hash).cloned())
    }

    async fn find_invitation(&self, owner_id: &str, invitation_id: &str) -> Result<Option<StaffInvitation>> {
        let invitations = self.invitations.read().await;
        Ok(invitations
            .get(invitation_id)
            .filter(|i| i.owner_id == owner_id)
            .cloned())
    }

    async fn consume_invitation(&self, invitation_id: &str, user_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut invitations = self.invitations.write().await;
        match invitations.get_mut(invitation_id) {
            Some(invitation) if invitation.consumed_at.is_none() && invitation.revoked_at.is_none() => {
                invitation.consumed_at = Some(at);
                invitation.accepted_user_id = Some(user_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_invitation(&self, invitation_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut invitations = self.invitations.write().await;
        match invitations.get_mut(invitation_id) {
            Some(invitation) if invitation.consumed_at.is_none() && invitation.revoked_at.is_none() => {
                invitation.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_invitations(&self, owner_id: &str) -> Result<Vec<StaffInvitation>> {
        let invitations = self.invitations.read().await;
        let mut result: Vec<StaffInvitation> = invitations
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }
}

#[async_trait]
impl ClinicStore for MemoryStore {
    async fn create_clinic(&self, clinic: Clinic) -> Result<()> {
        let mut clinics = self.clinics.write().await;
        if clinics.contains_key(&clinic.id) {
            return Err(ClinicGateError::Conflict("Clinic already exists".to_string()));
        }
        clinics.insert(clinic.id.clone(), clinic);
        Ok(())
    }

    async fn find_clinic(&self, owner_id: &str, clinic_id: &str) -> Result<Option<Clinic>> {
        let clinics = self.clinics.read().await;
        Ok(clinics.get(clinic_id).filter(|c| c.owner_id == owner_id).cloned())
    }

    async fn count_clinics(&self, owner_id: &str) -> Result<usize> {
        let clinics = self.clinics.read().await;
        Ok(clinics.values().filter(|c| c.owner_id == owner_id).count())
    }

    async fn list_clinics(&self, owner_id: &str) -> Result<Vec<Clinic>> {
        let clinics = self.clinics.read().await;
        let mut result: Vec<Clinic> = clinics
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(result)
    }
}

#[async_trait]
impl PatientStore for MemoryStore {
    async fn find_patient(&self, owner_id: &str, patient_id: &str) -> Result<Option<PatientRecord>> {
        let patients = self.patients.read().await;
        Ok(patients.get(patient_id).filter(|p| p.owner_id == owner_id).cloned())
    }
}

#[async_trait]
impl EncryptionKeyStore for MemoryStore {
    async fn get_key_record(&self, tenant_id: &str) -> Result<Option<EncryptionKeyRecord>> {
        Ok(self.keys.read().await.get(tenant_id).cloned())
    }

    async fn swap_key_record(&self, expected_revision: Option<u64>, record: EncryptionKeyRecord) -> Result<bool> {
        let mut keys = self.keys.write().await;
        let stored_revision = keys.get(&record.tenant_id).map(|r| r.revision);

        if stored_revision != expected_revision {
            return Ok(false);
        }

        keys.insert(record.tenant_id.clone(), record);
        Ok(true)
    }
}

#[async_trait]
impl SessionRevocationStore for MemoryStore {
    async fn revoke_session(&self, revoked: RevokedSession) -> Result<()> {
        self.revoked_sessions
            .write()
            .await
            .insert(revoked.token_id.clone(), revoked);
        Ok(())
    }

    async fn is_session_revoked(&self, token_id: &str) -> Result<bool> {
        Ok(self.revoked_sessions.read().await.contains_key(token_id))
    }

    async fn purge_expired_revocations(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut revoked = self.revoked_sessions.write().await;
        let before = revoked.len();
        revoked.retain(|_, r| r.expires_at > now);
        Ok(before - revoked.len())
    }
}

#[async_trait]
impl TenantSettingsStore for MemoryStore {
    async fn get_ai_credential(&self, owner_id: &str) -> Result<Option<EncryptedSecret>> {
        Ok(self.ai_credentials.read().await.get(owner_id).cloned())
    }

    async fn set_ai_credential(&self, owner_id: &str, credential: Option<EncryptedSecret>) -> Result<()> {
        let mut credentials = self.ai_credentials.write().await;
        match credential {
            Some(secret) => {
                credentials.insert(owner_id.to_string(), secret);
            }
            None => {
                credentials.remove(owner_id);
            }
        }
        Ok(())
    }
}
