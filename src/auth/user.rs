use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClinicGateError;

/// Kind of account; identifiers are unique per account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Professional,
    Patient,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Professional => "professional",
            AccountType::Patient => "patient",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = ClinicGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Ok(AccountType::Professional),
            "patient" => Ok(AccountType::Patient),
            other => Err(ClinicGateError::InvalidInput(format!("Unknown account type '{}'", other))),
        }
    }
}

/// Authority level of a staff member inside a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Admin,
    Professional,
    Assistant,
}

impl TeamRole {
    /// Admins act with the tenant owner's clinic authority
    pub fn is_admin(&self) -> bool {
        matches!(self, TeamRole::Admin)
    }
}

/// Subscription tier of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    Starter,
    Pro,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

/// Plan and status owned by the top-level professional
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
}

impl SubscriptionSummary {
    pub fn active(plan: SubscriptionPlan) -> Self {
        Self {
            plan,
            status: SubscriptionStatus::Active,
        }
    }

    /// Plan whose entitlements currently apply.
    ///
    /// Lapsed subscriptions keep their stored tier but only get starter
    /// entitlements until they are active again.
    pub fn effective_plan(&self) -> SubscriptionPlan {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing => self.plan,
            SubscriptionStatus::PastDue | SubscriptionStatus::Canceled => SubscriptionPlan::Starter,
        }
    }
}

/// Persisted account record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Internal identifier
    pub id: String,
    /// National-id style identifier, unique per account type
    pub identifier: String,
    pub account_type: AccountType,
    pub display_name: String,
    pub email: Option<String>,
    /// Argon2 PHC string; accounts without one cannot log in with a password
    pub password_hash: Option<String>,
    /// Only meaningful for tenant owners
    pub subscription: Option<SubscriptionSummary>,
    /// Set when this account is a staff member of another professional's tenant
    pub owner_professional_id: Option<String>,
    pub team_role: Option<TeamRole>,
    pub team_clinic_id: Option<String>,
    pub locale: Option<String>,
    /// Soft-disable flag; accounts are never hard-deleted
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new account with a fresh id
    pub fn new(identifier: String, account_type: AccountType, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identifier,
            account_type,
            display_name,
            email: None,
            password_hash: None,
            subscription: None,
            owner_professional_id: None,
            team_role: None,
            team_clinic_id: None,
            locale: None,
            disabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a tenant-owning professional on the given plan
    pub fn professional(identifier: &str, display_name: &str, plan: SubscriptionPlan) -> Self {
        let mut user = Self::new(
            identifier.to_string(),
            AccountType::Professional,
            display_name.to_string(),
        );
        user.subscription = Some(SubscriptionSummary::active(plan));
        user
    }

    /// Creates a staff account attached to `owner_id`'s tenant
    pub fn staff(
        identifier: &str,
        display_name: &str,
        owner_id: &str,
        role: TeamRole,
        clinic_id: Option<&str>,
    ) -> Self {
        let mut user = Self::new(
            identifier.to_string(),
            AccountType::Professional,
            display_name.to_string(),
        );
        user.owner_professional_id = Some(owner_id.to_string());
        user.team_role = Some(role);
        user.team_clinic_id = clinic_id.map(str::to_string);
        user
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_password_hash(mut self, hash: String) -> Self {
        self.password_hash = Some(hash);
        self
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Minimal authorization snapshot of this account
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id.clone(),
            identifier: self.identifier.clone(),
            account_type: self.account_type,
            owner_professional_id: self.owner_professional_id.clone(),
            team_role: self.team_role,
            team_clinic_id: self.team_clinic_id.clone(),
            plan: self.subscription.map(|s| s.plan),
        }
    }
}

/// Caller identity carried by a session token.
///
/// These fields are convenience copies; capability decisions re-read the
/// tenant owner's live record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub identifier: String,
    pub account_type: AccountType,
    pub owner_professional_id: Option<String>,
    pub team_role: Option<TeamRole>,
    pub team_clinic_id: Option<String>,
    pub plan: Option<SubscriptionPlan>,
}

/// Masks an email for display, e.g. `j***@example.com`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_parsing() {
        assert_eq!("Professional".parse::<AccountType>().unwrap(), AccountType::Professional);
        assert_eq!(" patient ".parse::<AccountType>().unwrap(), AccountType::Patient);
        assert!("admin".parse::<AccountType>().is_err());
    }

    #[test]
    fn test_lapsed_subscription_falls_back_to_starter() {
        let mut summary = SubscriptionSummary::active(SubscriptionPlan::Pro);
        assert_eq!(summary.effective_plan(), SubscriptionPlan::Pro);

        summary.status = SubscriptionStatus::Trialing;
        assert_eq!(summary.effective_plan(), SubscriptionPlan::Pro);

        summary.status = SubscriptionStatus::PastDue;
        assert_eq!(summary.effective_plan(), SubscriptionPlan::Starter);
    }

    #[test]
    fn test_staff_identity_snapshot() {
        let staff = User::staff("111", "Ana", "owner-1", TeamRole::Assistant, Some("c1"));
        let identity = staff.identity();
        assert_eq!(identity.owner_professional_id.as_deref(), Some("owner-1"));
        assert_eq!(identity.team_role, Some(TeamRole::Assistant));
        assert_eq!(identity.team_clinic_id.as_deref(), Some("c1"));
        assert_eq!(identity.plan, None);
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("julia@example.com"), "j***@example.com");
        assert_eq!(mask_email("broken"), "***");
    }
}
