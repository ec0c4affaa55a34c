//! Collaborator interfaces for the persisted store
//!
//! The core never owns storage; it reaches records through these narrow
//! repository calls. Implementations must make the compare-and-swap style
//! operations (`consume_*`, `swap_key_record`) atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::user::{AccountType, TeamRole, User};
use crate::error::Result;

/// One-time two-factor code issued to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoFactorChallenge {
    pub id: String,
    pub user_id: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    /// Submissions compared against this code so far, right or wrong
    pub attempts: u32,
}

impl TwoFactorChallenge {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

/// Outcome of claiming one submission slot on a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClaim {
    /// Slot granted; carries the attempt number, starting at 1
    Granted(u32),
    /// Every slot has been used
    Exhausted,
    Consumed,
    /// A newer challenge replaced this one
    Superseded,
}

/// Token-addressable invitation to join a tenant as staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffInvitation {
    pub id: String,
    /// Tenant (owning professional) the invitee will join
    pub owner_id: String,
    pub invited_by: String,
    pub email: Option<String>,
    pub role: TeamRole,
    pub clinic_id: Option<String>,
    /// SHA-256 of the invitation token; the plaintext is never stored
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub accepted_user_id: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl StaffInvitation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Neither consumed, revoked nor expired
    pub fn is_pending_at(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.revoked_at.is_none() && !self.is_expired_at(now)
    }
}

/// Clinic owned by exactly one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clinic {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// The authorization-relevant slice of a patient record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub owner_id: String,
    pub clinic_id: Option<String>,
    pub display_name: String,
}

/// One generation of a tenant data key, stored wrapped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantKey {
    pub key_id: String,
    /// Generation number, starting at 1
    pub version: u64,
    /// Base64 of nonce || AES-256-GCM ciphertext under the master key
    pub wrapped_key: String,
    pub created_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
}

/// Current key plus retained history for one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionKeyRecord {
    pub tenant_id: String,
    /// Record revision used for compare-and-swap
    pub revision: u64,
    pub current: TenantKey,
    /// Retired keys, oldest first
    pub history: Vec<TenantKey>,
    pub updated_at: DateTime<Utc>,
}

impl EncryptionKeyRecord {
    /// Any retained key (current or retired) by id
    pub fn find_key(&self, key_id: &str) -> Option<&TenantKey> {
        std::iter::once(&self.current)
            .chain(self.history.iter())
            .find(|key| key.key_id == key_id)
    }
}

/// Ciphertext tagged with the tenant key that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub key_id: String,
    /// Base64 of nonce || ciphertext
    pub ciphertext: String,
}

/// Revoked session token id, kept until the token would have expired anyway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokedSession {
    pub token_id: String,
    pub user_id: String,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Account storage interface
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up by identifier and account type.
    ///
    /// Disabled accounts fail with `AccessRestricted` rather than `None`.
    async fn find_by_identifier(&self, identifier: &str, account_type: AccountType) -> Result<Option<User>>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// Fails with `Conflict` when the identifier is taken for that account type
    async fn create_user(&self, user: User) -> Result<()>;

    async fn update_user(&self, user: User) -> Result<()>;

    /// Active staff accounts attached to a tenant (the owner excluded)
    async fn count_staff(&self, owner_id: &str) -> Result<usize>;
}

/// Two-factor challenge storage interface
#[async_trait]
pub trait TwoFactorStore: Send + Sync {
    /// Store a challenge, replacing any previous one for the same user
    async fn upsert_challenge(&self, challenge: TwoFactorChallenge) -> Result<()>;

    /// Most recent challenge for a user
    async fn latest_challenge(&self, user_id: &str) -> Result<Option<TwoFactorChallenge>>;

    /// Mark a challenge consumed. Returns false when it was already consumed
    /// or has been superseded.
    async fn consume_challenge(&self, user_id: &str, challenge_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Atomically claim a submission slot before a code is compared. At most
    /// `max_attempts` claims are ever granted per challenge.
    async fn claim_attempt(&self, user_id: &str, challenge_id: &str, max_attempts: u32) -> Result<AttemptClaim>;
}

/// Staff invitation storage interface
#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn create_invitation(&self, invitation: StaffInvitation) -> Result<()>;

    async fn find_invitation_by_token_hash(&self, token_hash: &str) -> Result<Option<StaffInvitation>>;

    /// Look up an invitation within one tenant
    async fn find_invitation(&self, owner_id: &str, invitation_id: &str) -> Result<Option<StaffInvitation>>;

    /// Consume an invitation. Returns false when it was already consumed or revoked.
    async fn consume_invitation(&self, invitation_id: &str, user_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Revoke an invitation. Returns false when it was already consumed or revoked.
    async fn revoke_invitation(&self, invitation_id: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn list_invitations(&self, owner_id: &str) -> Result<Vec<StaffInvitation>>;
}

/// Clinic storage interface; every call is scoped to a tenant
#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn create_clinic(&self, clinic: Clinic) -> Result<()>;

    async fn find_clinic(&self, owner_id: &str, clinic_id: &str) -> Result<Option<Clinic>>;

    async fn count_clinics(&self, owner_id: &str) -> Result<usize>;

    async fn list_clinics(&self, owner_id: &str) -> Result<Vec<Clinic>>;
}

/// Patient lookup, scoped to a tenant
#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn find_patient(&self, owner_id: &str, patient_id: &str) -> Result<Option<PatientRecord>>;
}

/// Tenant encryption key storage interface
#[async_trait]
pub trait EncryptionKeyStore: Send + Sync {
    async fn get_key_record(&self, tenant_id: &str) -> Result<Option<EncryptionKeyRecord>>;

    /// Replace the record only if its stored revision equals `expected_revision`
    /// (`None` meaning no record exists yet). Returns false when the swap lost.
    async fn swap_key_record(&self, expected_revision: Option<u64>, record: EncryptionKeyRecord) -> Result<bool>;
}

/// Session revocation storage interface
#[async_trait]
pub trait SessionRevocationStore: Send + Sync {
    async fn revoke_session(&self, revoked: RevokedSession) -> Result<()>;

    async fn is_session_revoked(&self, token_id: &str) -> Result<bool>;

    /// Drop revocations whose tokens have expired anyway
    async fn purge_expired_revocations(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Per-tenant integration settings
#[async_trait]
pub trait TenantSettingsStore: Send + Sync {
    async fn get_ai_credential(&self, owner_id: &str) -> Result<Option<EncryptedSecret>>;

    async fn set_ai_credential(&self, owner_id: &str, credential: Option<EncryptedSecret>) -> Result<()>;
}

/// Every collaborator interface in one bound, for wiring a single backend
pub trait CredentialStore:
    UserStore
    + TwoFactorStore
    + InvitationStore
    + ClinicStore
    + PatientStore
    + EncryptionKeyStore
    + SessionRevocationStore
    + TenantSettingsStore
    + 'static
{
}

impl<T> CredentialStore for T where
    T: UserStore
        + TwoFactorStore
        + InvitationStore
        + ClinicStore
        + PatientStore
        + EncryptionKeyStore
        + SessionRevocationStore
        + TenantSettingsStore
        + 'static
{
}
