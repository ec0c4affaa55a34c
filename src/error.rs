use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClinicGateError {
    // Session errors
    Unauthenticated(String),
    InvalidToken,

    // Authorization errors
    AccessRestricted(String),
    LimitExceeded(String),
    NotFound,

    // Tenant resolution errors
    NoClinicAssigned,
    InvalidClinic,

    // Input errors
    InvalidInput(String),
    AlreadyUsed(String),
    Conflict(String),

    // Two-factor delivery errors
    NoEmailOnFile,
    DeliveryError(String),

    // Collaborator errors (detail is for server logs only)
    Unavailable(String),

    // Configuration errors
    ConfigError(String),
}

impl ClinicGateError {
    /// HTTP-equivalent status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated(_) | Self::InvalidToken => 401,
            Self::AccessRestricted(_) | Self::LimitExceeded(_) => 403,
            Self::NotFound => 404,
            Self::NoClinicAssigned
            | Self::InvalidClinic
            | Self::InvalidInput(_)
            | Self::AlreadyUsed(_)
            | Self::Conflict(_)
            | Self::NoEmailOnFile => 400,
            Self::DeliveryError(_) | Self::Unavailable(_) | Self::ConfigError(_) => 500,
        }
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::InvalidToken => "invalid_token",
            Self::AccessRestricted(_) => "access_restricted",
            Self::LimitExceeded(_) => "limit_exceeded",
            Self::NotFound => "not_found",
            Self::NoClinicAssigned => "no_clinic_assigned",
            Self::InvalidClinic => "invalid_clinic",
            Self::InvalidInput(_) => "invalid_input",
            Self::AlreadyUsed(_) => "already_used",
            Self::Conflict(_) => "conflict",
            Self::NoEmailOnFile => "no_email_on_file",
            Self::DeliveryError(_) => "delivery_error",
            Self::Unavailable(_) => "unavailable",
            Self::ConfigError(_) => "config_error",
        }
    }

    /// Message that is safe to hand back to the caller.
    ///
    /// Collaborator and configuration failures never expose their internal
    /// detail; that goes to the server log instead.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unavailable(_) | Self::ConfigError(_) => {
                "The service is temporarily unavailable. Please try again later.".to_string()
            }
            Self::DeliveryError(_) => {
                "The verification code could not be delivered. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Shorthand for wrapping a collaborator failure
    pub fn unavailable(context: &str, err: impl fmt::Display) -> Self {
        Self::Unavailable(format!("{}: {}", context, err))
    }
}

impl fmt::Display for ClinicGateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated(msg) => write!(f, "Authentication required: {}", msg),
            Self::InvalidToken => write!(f, "Invalid or expired token"),
            Self::AccessRestricted(msg) => write!(f, "Access restricted: {}", msg),
            Self::LimitExceeded(msg) => write!(f, "Plan limit exceeded: {}", msg),
            Self::NotFound => write!(f, "Not found"),
            Self::NoClinicAssigned => write!(
                f,
                "No clinic is assigned to your account. Ask your clinic administrator to assign one."
            ),
            Self::InvalidClinic => write!(f, "Invalid clinic"),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::AlreadyUsed(msg) => write!(f, "Already used: {}", msg),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::NoEmailOnFile => write!(f, "No email address on file for two-factor verification"),
            Self::DeliveryError(msg) => write!(f, "Delivery error: {}", msg),
            Self::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for ClinicGateError {}

// Generic result type for clinic-gate
pub type Result<T> = std::result::Result<T, ClinicGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(ClinicGateError::Unauthenticated("x".into()).status_code(), 401);
        assert_eq!(ClinicGateError::InvalidToken.status_code(), 401);
        assert_eq!(ClinicGateError::AccessRestricted("x".into()).status_code(), 403);
        assert_eq!(ClinicGateError::NotFound.status_code(), 404);
        assert_eq!(ClinicGateError::NoClinicAssigned.status_code(), 400);
        assert_eq!(ClinicGateError::AlreadyUsed("x".into()).status_code(), 400);
        assert_eq!(ClinicGateError::Unavailable("x".into()).status_code(), 500);
    }

    #[test]
    fn test_unavailable_hides_internal_detail() {
        let err = ClinicGateError::unavailable("user lookup", "connection refused on 10.0.0.7:5432");
        assert!(err.to_string().contains("10.0.0.7"));
        assert!(!err.public_message().contains("10.0.0.7"));
    }
}
