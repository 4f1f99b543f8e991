//! Bearer tokens and their decoded payloads
//!
//! Tokens are JWTs issued by the backend. The SDK never verifies signatures;
//! it only decodes the payload to learn expiry, subject and the critical
//! flag. Verification is the backend's job.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::TokenError;

/// Decoded JWT payload as issued by the access service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Expiry as seconds since the unix epoch
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,

    #[serde(rename = "iat", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,

    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,

    #[serde(rename = "ten", default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    #[serde(rename = "aud", default, deserialize_with = "one_or_many")]
    pub audience: Vec<String>,

    #[serde(rename = "rls", default)]
    pub roles: Vec<String>,

    #[serde(rename = "jti", default, skip_serializing_if = "Option::is_none")]
    pub jwt_id: Option<String>,

    /// Elevated "critical" privilege
    #[serde(rename = "crt", default)]
    pub critical: bool,
}

impl TokenPayload {
    /// Decode the payload segment of `token`.
    ///
    /// # Errors
    /// Returns [`TokenError`] if the token has no payload segment, the
    /// segment is not base64, or it is not a JSON object.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let segment = token
            .split('.')
            .nth(1)
            .map(|s| s.trim_end_matches('='))
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::Malformed)?;

        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .or_else(|_| STANDARD_NO_PAD.decode(segment))
            .map_err(|_| TokenError::InvalidEncoding)?;

        serde_json::from_slice(&bytes).map_err(|e| TokenError::InvalidPayload(e.to_string()))
    }

    /// Absolute expiry timestamp, if the payload carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// Milliseconds between `now` and expiry (negative once expired).
    pub fn millis_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at().map(|exp| (exp - now).num_milliseconds())
    }

    /// Whether the payload is still usable at `now` with `safety` margin.
    pub fn is_valid_at(&self, now: DateTime<Utc>, safety: Duration) -> bool {
        let margin = i64::try_from(safety.as_millis()).unwrap_or(i64::MAX);
        match self.millis_until_expiry(now) {
            Some(remaining) => remaining >= margin,
            None => false,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// An opaque bearer string together with its decoded payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    payload: TokenPayload,
}

impl Token {
    /// Parse a raw bearer string.
    ///
    /// # Errors
    /// Returns [`TokenError`] if the payload cannot be decoded.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TokenError> {
        let raw = raw.into();
        let payload = TokenPayload::decode(&raw)?;
        Ok(Self { raw, payload })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn payload(&self) -> &TokenPayload {
        &self.payload
    }

    pub fn is_critical(&self) -> bool {
        self.payload.critical
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>, safety: Duration) -> bool {
        self.payload.is_valid_at(now, safety)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token").field("raw", &"<redacted>").field("payload", &self.payload).finish()
    }
}

/// Check that `token` is present, decodable and valid for at least `safety`.
pub fn validate_token(token: Option<&str>, safety: Duration) -> bool {
    validate_token_at(token, safety, Utc::now())
}

/// [`validate_token`] against an explicit clock.
///
/// Returns `false` when `expiry - now < safety`; a token expiring exactly
/// `safety` from `now` is still valid.
pub fn validate_token_at(token: Option<&str>, safety: Duration, now: DateTime<Utc>) -> bool {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return false;
    };

    match TokenPayload::decode(token) {
        Ok(payload) => payload.is_valid_at(now, safety),
        Err(_) => false,
    }
}
