//! Security-focused logging module to track security events

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

/// Types of security events to track
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityEvent {
    // Authentication events
    LoginFailed { identifier: String, reason: String },
    LoginSucceeded { user_id: String },
    TwoFactorSent { user_id: String },
    TwoFactorRejected { user_id: String, reason: String },
    SessionRevoked { user_id: String, token_id: String },

    // Authorization events
    TenantBoundaryDenied { user_id: String, tenant_id: String, resource: String },
    PolicyDenied { user_id: String, action: String, reason: String },

    // Staff invitations
    InvitationIssued { tenant_id: String, invitation_id: String, issued_by: String },
    InvitationAccepted { tenant_id: String, invitation_id: String, user_id: String },
    InvitationRevoked { tenant_id: String, invitation_id: String, revoked_by: String },
    InvitationRejected { reason: String },

    // Encryption keys
    EncryptionKeyCreated { tenant_id: String, key_id: String },
    EncryptionKeyRotated { tenant_id: String, previous_key_id: String, key_id: String, version: u64 },
    AiCredentialChanged { tenant_id: String, user_id: String, action: String },

    // System security
    ConfigurationError { component: String, error: String },
}

impl SecurityEvent {
    /// Event key for counting and alert thresholds
    pub fn key(&self) -> &'static str {
        match self {
            SecurityEvent::LoginFailed { .. } => "login_failed",
            SecurityEvent::LoginSucceeded { .. } => "login_succeeded",
            SecurityEvent::TwoFactorSent { .. } => "two_factor_sent",
            SecurityEvent::TwoFactorRejected { .. } => "two_factor_rejected",
            SecurityEvent::SessionRevoked { .. } => "session_revoked",
            SecurityEvent::TenantBoundaryDenied { .. } => "tenant_boundary_denied",
            SecurityEvent::PolicyDenied { .. } => "policy_denied",
            SecurityEvent::InvitationIssued { .. } => "invitation_issued",
            SecurityEvent::InvitationAccepted { .. } => "invitation_accepted",
            SecurityEvent::InvitationRevoked { .. } => "invitation_revoked",
            SecurityEvent::InvitationRejected { .. } => "invitation_rejected",
            SecurityEvent::EncryptionKeyCreated { .. } => "encryption_key_created",
            SecurityEvent::EncryptionKeyRotated { .. } => "encryption_key_rotated",
            SecurityEvent::AiCredentialChanged { .. } => "ai_credential_changed",
            SecurityEvent::ConfigurationError { .. } => "config_error",
        }
    }
}

/// Security event with timestamp
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub event: SecurityEvent,
    pub at: DateTime<Utc>,
}

/// Security logger for tracking and alerting on security events
pub struct SecurityLogger {
    events: RwLock<Vec<RecordedEvent>>,
    event_counts: RwLock<HashMap<&'static str, usize>>,
    max_events: usize,
    alert_thresholds: HashMap<&'static str, usize>,
}

impl SecurityLogger {
    pub fn new() -> Self {
        let mut alert_thresholds = HashMap::new();
        alert_thresholds.insert("login_failed", 10);
        alert_thresholds.insert("two_factor_rejected", 10);
        alert_thresholds.insert("tenant_boundary_denied", 5);
        alert_thresholds.insert("policy_denied", 20);
        alert_thresholds.insert("invitation_rejected", 10);
        alert_thresholds.insert("config_error", 1);

        Self {
            events: RwLock::new(Vec::new()),
            event_counts: RwLock::new(HashMap::new()),
            max_events: 10_000,
            alert_thresholds,
        }
    }

    /// Log a security event
    pub async fn log_event(&self, event: SecurityEvent) {
        let key = event.key();

        {
            let mut events = self.events.write().await;
            events.push(RecordedEvent {
                event: event.clone(),
                at: Utc::now(),
            });

            // Limit memory usage
            if events.len() > self.max_events {
                let overflow = events.len() - self.max_events;
                events.drain(0..overflow);
            }
        }

        {
            let mut counts = self.event_counts.write().await;
            let count = counts.entry(key).or_insert(0);
            *count += 1;

            if let Some(&threshold) = self.alert_thresholds.get(key) {
                if *count >= threshold {
                    log::error!("SECURITY ALERT: {} events of type '{}' detected", count, key);
                    log::error!("Sample event: {:?}", event);
                    *count = 0;
                }
            }
        }

        write_log_line(&event);
    }

    /// Events recorded within the last `window`
    pub async fn recent_events(&self, window: Duration) -> Vec<RecordedEvent> {
        let cutoff = Utc::now() - window;
        self.events
            .read()
            .await
            .iter()
            .filter(|recorded| recorded.at > cutoff)
            .cloned()
            .collect()
    }

    /// Drop events older than `max_age`
    pub async fn cleanup_old_events(&self, max_age: Duration) {
        let cutoff = Utc::now() - max_age;
        self.events.write().await.retain(|recorded| recorded.at > cutoff);
    }

    /// Start periodic cleanup task
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                self.cleanup_old_events(Duration::hours(24)).await;
            }
        });
    }
}

impl Default for SecurityLogger {
    fn default() -> Self {
        Self::new()
    }
}

fn write_log_line(event: &SecurityEvent) {
    match event {
        SecurityEvent::LoginFailed { identifier, reason } => {
            log::warn!("SECURITY: Login failed - Identifier: {}, Reason: {}", identifier, reason);
        }
        SecurityEvent::LoginSucceeded { user_id } => {
            log::info!("SECURITY: Login succeeded - User: {}", user_id);
        }
        SecurityEvent::TwoFactorSent { user_id } => {
            log::info!("SECURITY: Two-factor code sent - User: {}", user_id);
        }
        SecurityEvent::TwoFactorRejected { user_id, reason } => {
            log::warn!("SECURITY: Two-factor code rejected - User: {}, Reason: {}", user_id, reason);
        }
        SecurityEvent::SessionRevoked { user_id, token_id } => {
            log::info!("SECURITY: Session revoked - User: {}, Token: {}", user_id, token_id);
        }
        SecurityEvent::TenantBoundaryDenied { user_id, tenant_id, resource } => {
            log::warn!(
                "SECURITY: Tenant boundary denied - User: {}, Tenant: {}, Resource: {}",
                user_id, tenant_id, resource
            );
        }
        SecurityEvent::PolicyDenied { user_id, action, reason } => {
            log::warn!("SECURITY: Policy denied - User: {}, Action: {}, Reason: {}", user_id, action, reason);
        }
        SecurityEvent::InvitationIssued { tenant_id, invitation_id, issued_by } => {
            log::info!(
                "SECURITY: Invitation issued - Tenant: {}, Invitation: {}, By: {}",
                tenant_id, invitation_id, issued_by
            );
        }
        SecurityEvent::InvitationAccepted { tenant_id, invitation_id, user_id } => {
            log::info!(
                "SECURITY: Invitation accepted - Tenant: {}, Invitation: {}, User: {}",
                tenant_id, invitation_id, user_id
            );
        }
        SecurityEvent::InvitationRevoked { tenant_id, invitation_id, revoked_by } => {
            log::info!(
                "SECURITY: Invitation revoked - Tenant: {}, Invitation: {}, By: {}",
                tenant_id, invitation_id, revoked_by
            );
        }
        SecurityEvent::InvitationRejected { reason } => {
            log::warn!("SECURITY: Invitation rejected - Reason: {}", reason);
        }
        SecurityEvent::EncryptionKeyCreated { tenant_id, key_id } => {
            log::info!("SECURITY: Encryption key created - Tenant: {}, Key: {}", tenant_id, key_id);
        }
        SecurityEvent::EncryptionKeyRotated { tenant_id, previous_key_id, key_id, version } => {
            log::warn!(
                "SECURITY: Encryption key rotated - Tenant: {}, Previous: {}, Current: {}, Version: {}",
                tenant_id, previous_key_id, key_id, version
            );
        }
        SecurityEvent::AiCredentialChanged { tenant_id, user_id, action } => {
            log::info!(
                "SECURITY: AI credential {} - Tenant: {}, User: {}",
                action, tenant_id, user_id
            );
        }
        SecurityEvent::ConfigurationError { component, error } => {
            log::error!("SECURITY: Configuration error - Component: {}, Error: {}", component, error);
        }
    }
}

/// Global security logger instance
static SECURITY_LOGGER: OnceLock<Arc<SecurityLogger>> = OnceLock::new();

/// Initialize the global security logger (requires a running tokio runtime)
pub fn init_security_logger() {
    SECURITY_LOGGER.get_or_init(|| {
        let logger = Arc::new(SecurityLogger::new());
        logger.clone().start_cleanup_task();
        logger
    });
}

/// Get the global security logger
pub fn get_security_logger() -> Option<Arc<SecurityLogger>> {
    SECURITY_LOGGER.get().cloned()
}

/// Log a security event using the global logger.
///
/// Before initialisation the event still reaches the regular log.
pub async fn log_security_event(event: SecurityEvent) {
    match get_security_logger() {
        Some(logger) => logger.log_event(event).await,
        None => write_log_line(&event),
    }
}
