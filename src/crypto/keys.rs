//! Per-tenant data key lifecycle
//!
//! Each tenant has exactly one current key. Rotation builds the complete
//! next record (new key generated and wrapped, old key retired into history)
//! before a single compare-and-swap publishes it, so readers only ever see
//! the old record or the new one. A rotation that loses the swap to a
//! concurrent one reports the winner's state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::cipher::{generate_data_key, AeadCipher, MasterKey};
use crate::config::AuthConfig;
use crate::error::{ClinicGateError, Result};
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::{EncryptedSecret, EncryptionKeyRecord, EncryptionKeyStore, TenantKey};

/// Public view of a tenant's key state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub tenant_id: String,
    pub key_id: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    /// Retired keys still held for decryption
    pub retired_keys: usize,
}

impl From<&EncryptionKeyRecord> for KeyStatus {
    fn from(record: &EncryptionKeyRecord) -> Self {
        Self {
            tenant_id: record.tenant_id.clone(),
            key_id: record.current.key_id.clone(),
            version: record.current.version,
            created_at: record.current.created_at,
            retired_keys: record.history.len(),
        }
    }
}

pub struct KeyLifecycleManager {
    store: Arc<dyn EncryptionKeyStore>,
    master: MasterKey,
}

impl KeyLifecycleManager {
    pub fn new(store: Arc<dyn EncryptionKeyStore>, master: MasterKey) -> Self {
        Self { store, master }
    }

    pub fn from_config(store: Arc<dyn EncryptionKeyStore>, config: &AuthConfig) -> Result<Self> {
        Ok(Self::new(store, MasterKey::from_secret(&config.key_encryption_secret)?))
    }

    /// Current key state, if the tenant has one
    pub async fn status(&self, tenant_id: &str) -> Result<Option<KeyStatus>> {
        Ok(self.store.get_key_record(tenant_id).await?.as_ref().map(KeyStatus::from))
    }

    /// Make sure the tenant has a current key. Pure read when one exists.
    pub async fn ensure_key(&self, tenant_id: &str) -> Result<KeyStatus> {
        let record = self.ensure_record(tenant_id).await?;
        Ok(KeyStatus::from(&record))
    }

    /// Replace the current key with a new one, retiring the old key to history
    pub async fn rotate_key(&self, tenant_id: &str) -> Result<KeyStatus> {
        let existing = match self.store.get_key_record(tenant_id).await? {
            Some(record) => record,
            None => return self.ensure_key(tenant_id).await,
        };

        let now = Utc::now();
        let next_key = self.generate_key(tenant_id, existing.current.version + 1, now)?;

        let mut retired = existing.current.clone();
        retired.retired_at = Some(now);
        let mut history = existing.history.clone();
        history.push(retired);

        let next = EncryptionKeyRecord {
            tenant_id: tenant_id.to_string(),
            revision: existing.revision + 1,
            current: next_key,
            history,
            updated_at: now,
        };

        if self.store.swap_key_record(Some(existing.revision), next.clone()).await? {
            log_security_event(SecurityEvent::EncryptionKeyRotated {
                tenant_id: tenant_id.to_string(),
                previous_key_id: existing.current.key_id.clone(),
                key_id: next.current.key_id.clone(),
                version: next.current.version,
            })
            .await;
            return Ok(KeyStatus::from(&next));
        }

        log::info!(
            "Concurrent key rotation for tenant {} won by another caller; returning its result",
            tenant_id
        );
        self.read_required(tenant_id).await.map(|record| KeyStatus::from(&record))
    }

    /// Encrypt a field under the tenant's current key
    pub async fn encrypt_field(&self, tenant_id: &str, plaintext: &str) -> Result<EncryptedSecret> {
        let record = self.ensure_record(tenant_id).await?;
        let cipher = self.data_cipher(tenant_id, &record.current)?;

        Ok(EncryptedSecret {
            key_id: record.current.key_id.clone(),
            ciphertext: cipher.seal(plaintext.as_bytes(), tenant_id.as_bytes())?,
        })
    }

    /// Decrypt a field with whichever retained key produced it
    pub async fn decrypt_field(&self, tenant_id: &str, secret: &EncryptedSecret) -> Result<String> {
        let record = self.read_required(tenant_id).await?;
        let key = record.find_key(&secret.key_id).ok_or_else(|| {
            ClinicGateError::unavailable(
                "field decryption",
                format!("key {} is not retained for tenant {}", secret.key_id, tenant_id),
            )
        })?;

        let plaintext = self
            .data_cipher(tenant_id, key)?
            .open(&secret.ciphertext, tenant_id.as_bytes())?;
        String::from_utf8(plaintext).map_err(|e| ClinicGateError::unavailable("field decryption", e))
    }

    async fn ensure_record(&self, tenant_id: &str) -> Result<EncryptionKeyRecord> {
        if let Some(record) = self.store.get_key_record(tenant_id).await? {
            return Ok(record);
        }

        let now = Utc::now();
        let record = EncryptionKeyRecord {
            tenant_id: tenant_id.to_string(),
            revision: 1,
            current: self.generate_key(tenant_id, 1, now)?,
            history: Vec::new(),
            updated_at: now,
        };

        if self.store.swap_key_record(None, record.clone()).await? {
            log_security_event(SecurityEvent::EncryptionKeyCreated {
                tenant_id: tenant_id.to_string(),
                key_id: record.current.key_id.clone(),
            })
            .await;
            return Ok(record);
        }

        // Another caller created the first key in the meantime
        self.read_required(tenant_id).await
    }

    async fn read_required(&self, tenant_id: &str) -> Result<EncryptionKeyRecord> {
        self.store.get_key_record(tenant_id).await?.ok_or_else(|| {
            ClinicGateError::unavailable("key lookup", format!("no key record for tenant {}", tenant_id))
        })
    }

    fn generate_key(&self, tenant_id: &str, version: u64, now: DateTime<Utc>) -> Result<TenantKey> {
        let data_key = generate_data_key()?;
        Ok(TenantKey {
            key_id: uuid::Uuid::new_v4().to_string(),
            version,
            wrapped_key: self.master.wrap(tenant_id, &data_key)?,
            created_at: now,
            retired_at: None,
        })
    }

    fn data_cipher(&self, tenant_id: &str, key: &TenantKey) -> Result<AeadCipher> {
        let data_key = self.master.unwrap_key(tenant_id, &key.wrapped_key)?;
        AeadCipher::new(&data_key)
    }
}
