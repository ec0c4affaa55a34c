//! Authentication: tokens, two-factor challenges, sessions and login

pub mod login;
pub mod password;
pub mod session;
pub mod token;
pub mod two_factor;
pub mod user;

// Re-export main components
pub use login::{LoginChallenge, LoginOutcome, LoginService};
pub use session::SessionResolver;
pub use token::{IssuedSession, SessionClaims, TokenPayload, TokenService};
pub use two_factor::{CodeVerdict, InvalidCodeReason, TwoFactorEngine};
pub use user::{AccountType, Identity, SubscriptionPlan, TeamRole, User};
