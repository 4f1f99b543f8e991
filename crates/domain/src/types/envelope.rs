//! Backend error envelope
//!
//! Wire shape: `{"detail": {...} | [{...}, ...] | "text", "event_id": "..."}`.
//! A single-element array is indistinguishable from a scalar detail; only a
//! multi-element array is kept as `details`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the envelope's `detail` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Validation errors use `msg` instead of `message`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorDetail {
    /// Human readable message (`message`, falling back to `msg`).
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref().or(self.msg.as_deref())
    }

    pub fn is(&self, error_type: &str) -> bool {
        self.error_type.as_deref() == Some(error_type)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireDetail {
    One(ErrorDetail),
    Many(Vec<ErrorDetail>),
    Text(String),
}

#[derive(Deserialize, Default)]
struct WireEnvelope {
    #[serde(default)]
    detail: Option<WireDetail>,
    #[serde(default)]
    event_id: Option<String>,
}

/// Normalized error envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorEnvelope {
    /// Scalar detail, or the first element of an array detail
    pub primary: Option<ErrorDetail>,
    /// All details when the backend sent more than one
    pub details: Option<Vec<ErrorDetail>>,
    pub event_id: Option<String>,
}

impl ErrorEnvelope {
    /// Normalize a response body. Bodies that do not match the envelope
    /// shape produce an empty envelope.
    pub fn from_body(body: &Value) -> Self {
        let wire: WireEnvelope = serde_json::from_value(body.clone()).unwrap_or_default();

        let (primary, details) = match wire.detail {
            Some(WireDetail::One(detail)) => (Some(detail), None),
            Some(WireDetail::Many(mut list)) => {
                if list.len() > 1 {
                    (list.first().cloned(), Some(list))
                } else {
                    (list.pop(), None)
                }
            }
            Some(WireDetail::Text(text)) => {
                (Some(ErrorDetail { message: Some(text), ..ErrorDetail::default() }), None)
            }
            None => (None, None),
        };

        Self { primary, details, event_id: wire.event_id }
    }

    pub fn error_type(&self) -> Option<&str> {
        self.primary.as_ref().and_then(|d| d.error_type.as_deref())
    }

    pub fn code(&self) -> Option<&str> {
        self.primary.as_ref().and_then(|d| d.code.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.event_id.is_none()
    }
}
