//! Tenant data-encryption keys

pub mod cipher;
pub mod keys;

pub use cipher::{AeadCipher, MasterKey};
pub use keys::{KeyLifecycleManager, KeyStatus};
