//! Two-factor code delivery
//!
//! Outbound email is an external concern; the core only needs something
//! that accepts a code and reports whether delivery was accepted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::auth::user::mask_email;
use crate::error::{ClinicGateError, Result};

/// Delivers two-factor codes to users
#[async_trait]
pub trait TwoFactorNotifier: Send + Sync {
    async fn send_code(&self, to_email: &str, code: &str, expiry_minutes: i64, locale: &str) -> Result<()>;
}

/// Notifier that only writes to the log.
///
/// The code itself is printed only in development mode.
pub struct LogNotifier {
    development_mode: bool,
}

impl LogNotifier {
    pub fn new(development_mode: bool) -> Self {
        Self { development_mode }
    }
}

#[async_trait]
impl TwoFactorNotifier for LogNotifier {
    async fn send_code(&self, to_email: &str, code: &str, expiry_minutes: i64, locale: &str) -> Result<()> {
        if self.development_mode {
            log::warn!(
                "DEVELOPMENT: two-factor code for {} is {} (expires in {} min, locale {})",
                mask_email(to_email),
                code,
                expiry_minutes,
                locale
            );
        } else {
            log::info!(
                "Two-factor code dispatched to {} (expires in {} min)",
                mask_email(to_email),
                expiry_minutes
            );
        }
        Ok(())
    }
}

/// A message captured by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub to_email: String,
    pub code: String,
    pub expiry_minutes: i64,
    pub locale: String,
}

/// Notifier that keeps every message in memory, for tests
#[derive(Default)]
pub struct MemoryNotifier {
    sent: RwLock<Vec<SentCode>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with a delivery error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentCode> {
        self.sent.read().await.clone()
    }

    /// Most recent code sent to `email`
    pub async fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .read()
            .await
            .iter()
            .rev()
            .find(|m| m.to_email == email)
            .map(|m| m.code.clone())
    }
}

#[async_trait]
impl TwoFactorNotifier for MemoryNotifier {
    async fn send_code(&self, to_email: &str, code: &str, expiry_minutes: i64, locale: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClinicGateError::DeliveryError("mail relay rejected the message".to_string()));
        }

        self.sent.write().await.push(SentCode {
            to_email: to_email.to_string(),
            code: code.to_string(),
            expiry_minutes,
            locale: locale.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_notifier_captures_codes() {
        let notifier = MemoryNotifier::new();
        notifier.send_code("a@example.com", "111111", 5, "en").await.unwrap();
        notifier.send_code("a@example.com", "222222", 5, "pt-BR").await.unwrap();

        assert_eq!(notifier.sent().await.len(), 2);
        assert_eq!(notifier.last_code_for("a@example.com").await.as_deref(), Some("222222"));
        assert_eq!(notifier.last_code_for("b@example.com").await, None);
    }

    #[tokio::test]
    async fn test_failing_notifier_reports_delivery_error() {
        let notifier = MemoryNotifier::new();
        notifier.set_failing(true);

        let result = notifier.send_code("a@example.com", "111111", 5, "en").await;
        assert!(matches!(result, Err(ClinicGateError::DeliveryError(_))));
        assert!(notifier.sent().await.is_empty());
    }
}
