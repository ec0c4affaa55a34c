//! clinic-gate - authentication, session and multi-tenant authorization core
//!
//! This library issues and verifies session credentials, gates sessions
//! behind a two-factor challenge, resolves which tenant and clinic a caller
//! may act for, and manages per-tenant data-encryption keys. Persistence
//! and email delivery are reached through collaborator traits.

pub mod app;
pub mod auth;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod security;
pub mod security_logger;
pub mod storage;
pub mod tenant;

// Re-export main components
pub use app::AppState;
pub use config::AuthConfig;
pub use error::{ClinicGateError, Result};
