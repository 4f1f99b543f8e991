//! Wire constants
//!
//! Centralized location for endpoint paths, store keys, hook names and the
//! error-envelope vocabulary the backend speaks.

// Endpoints
pub const USER_AUTH_ENDPOINT: &str = "/access/auth/user";
pub const TRANSACTION_AUTH_ENDPOINT: &str = "/access/auth/transaction";

// Token store keys
pub const TOKEN_USER_KEY: &str = "token_user";
pub const TOKEN_TRANSACTION_KEY: &str = "token_transaction";

// Hooks
pub const HOOK_USER_PASSWORD_INPUT: &str = "user_password_input";

// Token validation
pub const DEFAULT_SAFETY_INTERVAL_MS: u64 = 30_000;

// Relation enrichment
pub const RELATION_KEY: &str = "$rel";
pub const RELATION_FETCHED_AT_KEY: &str = "$fetched_at";
pub const RELATION_UPDATED_AT_KEY: &str = "$updated_at";
pub const DEFAULT_RELATION_DEPTH: usize = 19;
pub const DEFAULT_RELATION_SERVICE: &str = "bizberry";

// Transport
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_AUTO_REFRESH_SECS: u64 = 20;
pub const DEFAULT_RETRY_BUDGET: u8 = 1;
pub const TRANSPORT_ERROR_STATUS: i32 = -1;
pub const UNKNOWN_ERROR_CODE: &str = "-1";

// Error envelope: detail.type values
pub const ERR_TYPE_AUTH: &str = "AuthError";
pub const ERR_TYPE_EXPIRED_SIGNATURE: &str = "ExpiredSignatureError";
pub const ERR_TYPE_JWT: &str = "JWTError";
pub const ERR_TYPE_JWT_CLAIMS: &str = "JWTClaimsError";
pub const ERR_TYPE_FIELD_ACCESS: &str = "FieldAccessError";

// Error envelope: detail.code values
pub const ERR_CODE_REQUIRED_AUDIENCE_MISSING: &str = "required_audience_missing";
pub const ERR_CODE_FIELD_IS_CRITICAL: &str = "access_error.field_is_critical";
pub const ERR_CODE_TOKEN_TOO_OLD: &str = "token_too_old_for_include_critical";
pub const ERR_CODE_INVALID_USER_TOKEN: &str = "invalid_user_token";
