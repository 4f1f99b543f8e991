//! `$rel` template resolution
//!
//! A relation template looks like `bizberry/widgets/{.parent_id}?owner={.owner.id}`.
//! The first path segment names the service; only the configured service is
//! resolvable. Placeholders are dot paths evaluated against a [`Scope`]:
//! `{.a.b}` reads `a.b` on the current object, every extra leading dot climbs
//! one ancestor (`{..id}` reads the parent's `id`).

use std::sync::Arc;

use bizberry_domain::QueryParams;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;
use thiserror::Error;
use url::form_urlencoded;

/// Characters that would end or split a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Why a template could not be turned into a request target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder in '{0}'")]
    Malformed(String),

    #[error("placeholder '{{{0}}}' has no scalar value")]
    Unresolved(String),

    #[error("relation points at foreign service '{0}'")]
    ForeignService(String),
}

/// Lexical scope used while walking a response: the object being enriched
/// plus a chain of ancestors.
///
/// Ancestors live only in this chain and are never written into the
/// response itself.
#[derive(Debug)]
pub struct Scope {
    value: Value,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn root(value: Value) -> Arc<Self> {
        Arc::new(Self { value, parent: None })
    }

    /// Scope for `value` nested under `parent`.
    pub fn nested(parent: Option<Arc<Self>>, value: Value) -> Arc<Self> {
        Arc::new(Self { value, parent })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// Evaluate a placeholder expression.
    pub fn lookup(&self, expression: &str) -> Option<&Value> {
        let climbs = expression.chars().take_while(|c| *c == '.').count();
        let path = &expression[climbs..];

        let mut scope = self;
        for _ in 1..climbs.max(1) {
            scope = scope.parent.as_deref()?;
        }
        lookup_path(&scope.value, path)
    }
}

/// Walk `path` (dot separated keys or array indices) into `value`.
pub fn lookup_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').filter(|segment| !segment.is_empty()).try_fold(value, |current, segment| {
        match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

/// A resolved relation: endpoint path plus query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTarget {
    pub endpoint: String,
    pub params: QueryParams,
}

impl RelationTarget {
    /// Resolve `template` within `scope`.
    ///
    /// # Errors
    /// Returns [`TemplateError`] if a placeholder is unterminated or has no
    /// scalar value, or the template names a service other than `service`.
    pub fn resolve(template: &str, scope: &Scope, service: &str) -> Result<Self, TemplateError> {
        let (raw_path, raw_query) = match template.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (template, None),
        };

        let path =
            substitute(raw_path, scope, |v| utf8_percent_encode(v, PATH_SEGMENT).to_string())?;
        let endpoint = strip_service(&path, service)?;

        let params = match raw_query {
            Some(query) => {
                let query = substitute(query, scope, |v| {
                    form_urlencoded::byte_serialize(v.as_bytes()).collect()
                })?;
                QueryParams::parse(&query)
            }
            None => QueryParams::new(),
        };

        Ok(Self { endpoint, params })
    }

    /// Deduplication key: endpoint plus normalized query.
    pub fn cache_key(&self) -> String {
        if self.params.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?{}", self.endpoint, self.params.normalized())
        }
    }
}

fn substitute(
    template: &str,
    scope: &Scope,
    encode: impl Fn(&str) -> String,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| TemplateError::Malformed(template.to_string()))?;
        let expression = after[..close].trim();

        let value = scope
            .lookup(expression)
            .and_then(scalar_text)
            .ok_or_else(|| TemplateError::Unresolved(expression.to_string()))?;
        out.push_str(&encode(&value));

        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn strip_service(path: &str, service: &str) -> Result<String, TemplateError> {
    if path.starts_with('/') {
        return Ok(path.to_string());
    }

    match path.split_once('/') {
        Some((prefix, rest)) if prefix == service => Ok(format!("/{rest}")),
        Some((prefix, _)) => Err(TemplateError::ForeignService(prefix.to_string())),
        None => Err(TemplateError::ForeignService(path.to_string())),
    }
}
