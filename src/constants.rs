// Server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;

// Session tokens
pub const SESSION_TTL_HOURS: i64 = 24;
pub const SESSION_COOKIE_NAME: &str = "clinic_session";
pub const MAX_TOKEN_LENGTH: usize = 4096;

// Purpose tokens
pub const PURPOSE_TOKEN_TTL_MINUTES: i64 = 10;
pub const PURPOSE_TWO_FACTOR_LOGIN: &str = "two_factor_login";
pub const PURPOSE_CALENDAR_OAUTH: &str = "calendar_oauth";

// Two-factor challenges
pub const TWO_FACTOR_CODE_MIN: u32 = 100_000;
pub const TWO_FACTOR_CODE_MAX: u32 = 999_999;
pub const TWO_FACTOR_TTL_MINUTES: i64 = 5;
pub const TWO_FACTOR_MAX_ATTEMPTS: u32 = 5;

// Staff invitations
pub const INVITATION_TTL_DAYS: i64 = 7;
pub const INVITATION_TOKEN_BYTES: usize = 32;

// Login timing floor (milliseconds)
pub const MIN_LOGIN_DURATION_MS: u64 = 100;

pub const DEFAULT_LOCALE: &str = "en";
