//! Failure classification
//!
//! Maps a non-success response onto the recovery the dispatcher should
//! attempt. The table is fixed; anything it does not name is surfaced as a
//! backend error.

use bizberry_domain::constants::{
    ERR_CODE_FIELD_IS_CRITICAL, ERR_CODE_INVALID_USER_TOKEN, ERR_CODE_REQUIRED_AUDIENCE_MISSING,
    ERR_CODE_TOKEN_TOO_OLD, ERR_TYPE_AUTH, ERR_TYPE_EXPIRED_SIGNATURE, ERR_TYPE_FIELD_ACCESS,
    ERR_TYPE_JWT, ERR_TYPE_JWT_CLAIMS,
};
use bizberry_domain::ErrorEnvelope;

/// What to do about a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    /// 403 on a critical field or audience: obtain a critical transaction
    /// token and retry
    CriticalRefresh,
    /// 401 because the user token is too old for critical access: ask the
    /// host for the password, log in again and retry
    Reauthenticate,
    /// 401 invalid user token: refresh the transaction token, then fail
    RefreshAndAbort,
    /// 401 expired signature: refresh the transaction token and retry
    RefreshAndRetry,
    /// 401 unrecoverable: log out, attempt a refresh, then fail
    LogoutAndAbort,
    /// Not an auth failure the engine recovers from
    Raise,
}

impl AuthAction {
    /// Whether this action ends in another attempt of the same request.
    pub const fn retries(self) -> bool {
        matches!(self, Self::CriticalRefresh | Self::Reauthenticate | Self::RefreshAndRetry)
    }

    /// Whether a failure with this action is an authentication failure.
    pub const fn is_auth(self) -> bool {
        !matches!(self, Self::Raise)
    }
}

/// Classify a failed response by `(status, detail.type, detail.code)`.
pub fn classify(status: u16, envelope: &ErrorEnvelope) -> AuthAction {
    let error_type = envelope.error_type().unwrap_or_default();
    let code = envelope.code().unwrap_or_default();

    match (status, error_type) {
        (403, ERR_TYPE_JWT_CLAIMS | ERR_TYPE_FIELD_ACCESS)
            if code == ERR_CODE_REQUIRED_AUDIENCE_MISSING || code == ERR_CODE_FIELD_IS_CRITICAL =>
        {
            AuthAction::CriticalRefresh
        }
        (401, ERR_TYPE_AUTH) => match code {
            ERR_CODE_TOKEN_TOO_OLD => AuthAction::Reauthenticate,
            ERR_CODE_INVALID_USER_TOKEN => AuthAction::RefreshAndAbort,
            _ => AuthAction::LogoutAndAbort,
        },
        (401, ERR_TYPE_EXPIRED_SIGNATURE) => AuthAction::RefreshAndRetry,
        (401, ERR_TYPE_JWT) => AuthAction::LogoutAndAbort,
        _ => AuthAction::Raise,
    }
}
