//! Token lifecycle
//!
//! [`TokenManager`] owns the two session tokens held in the host's
//! [`TokenStore`]: the persistent user token and the short-lived transaction
//! token derived from it. It never talks HTTP itself; every call goes through
//! an [`AuthTransport`], which the API client implements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bizberry_core::{StoreOptions, TokenStore};
use bizberry_domain::constants::{
    ERR_TYPE_AUTH, TOKEN_TRANSACTION_KEY, TOKEN_USER_KEY, TRANSACTION_AUTH_ENDPOINT,
    USER_AUTH_ENDPOINT,
};
use bizberry_domain::{
    validate_token, ApiError, ApiRequest, ApiResponse, ErrorInfo, HttpMethod, QueryParams, Result,
    Token, TokenPayload,
};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Sends requests on behalf of the token lifecycle.
///
/// Requests built here carry their own `Authorization` header (or none) and
/// disable auth recovery, so an implementation never needs to call back into
/// the [`TokenManager`] for them.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Send one request without auth recovery.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Called after the session tokens were discarded.
    fn on_logout(&self) {}
}

/// Tokens obtained by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    /// Long-lived user token.
    pub user: String,
    /// `None` when the issued transaction token was already unusable
    pub transaction: Option<String>,
}

/// Reads, validates and refreshes the session tokens.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    safety_interval: Duration,
    // Single-flight guard for transaction-token issuance
    refresh_lock: Mutex<()>,
    // Bumped every time a transaction token is stored
    generation: AtomicU64,
}

impl TokenManager {
    /// Manager over `store`; tokens expiring within `safety_interval` count
    /// as invalid.
    pub fn new(store: Arc<dyn TokenStore>, safety_interval: Duration) -> Self {
        Self { store, safety_interval, refresh_lock: Mutex::new(()), generation: AtomicU64::new(0) }
    }

    /// Backing token store.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Minimum remaining lifetime of a valid token.
    pub fn safety_interval(&self) -> Duration {
        self.safety_interval
    }

    /// Whether `token` decodes and stays valid for at least the safety
    /// interval.
    pub fn validate_token(&self, token: Option<&str>) -> bool {
        validate_token(token, self.safety_interval)
    }

    /// Whether a transaction token can still be sent.
    ///
    /// Opaque tokens carry no readable expiry and are kept until the backend
    /// rejects them; decodable ones must outlive the safety interval.
    fn is_usable(&self, token: &str) -> bool {
        TokenPayload::decode(token).is_err() || self.validate_token(Some(token))
    }

    /// Stored user token.
    pub async fn user_token(&self) -> Result<Option<String>> {
        Ok(self.store.get(TOKEN_USER_KEY).await?)
    }

    /// Stored transaction token.
    pub async fn transaction_token(&self) -> Result<Option<String>> {
        Ok(self.store.get(TOKEN_TRANSACTION_KEY).await?)
    }

    /// Install a user token obtained elsewhere (e.g. restored by the host).
    pub async fn set_user_token(&self, token: &str) -> Result<()> {
        self.store.set(TOKEN_USER_KEY, token, StoreOptions::persistent()).await?;
        Ok(())
    }

    /// Store a transaction token for this process only.
    pub async fn set_transaction_token(&self, token: &str) -> Result<()> {
        self.store.set(TOKEN_TRANSACTION_KEY, token, StoreOptions::transient()).await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Decoded payloads of the stored tokens; undecodable tokens read as `None`.
    pub async fn payloads(&self) -> Result<(Option<TokenPayload>, Option<TokenPayload>)> {
        let decode = |raw: Option<String>| raw.and_then(|t| TokenPayload::decode(&t).ok());
        Ok((decode(self.user_token().await?), decode(self.transaction_token().await?)))
    }

    /// Obtain a fresh transaction token.
    ///
    /// Concurrent callers are serialized; a caller that waited while another
    /// refresh stored a suitable token reuses it instead of issuing a second
    /// request. Once a critical token is held, refreshes keep requesting
    /// critical access until that token expires.
    ///
    /// Returns `Ok(None)` when the backend issued a token whose payload is
    /// already expired; the session is logged out in that case.
    ///
    /// # Errors
    /// Fails with an auth error if no user token is stored, and with whatever
    /// the transport reports otherwise.
    #[instrument(skip(self, transport))]
    pub async fn get_transaction_token(
        &self,
        transport: &dyn AuthTransport,
        include_critical: bool,
    ) -> Result<Option<String>> {
        let observed = self.generation.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(current) = self.transaction_token().await? {
                if self.is_usable(&current) && (!include_critical || is_critical(&current)) {
                    debug!("reusing transaction token refreshed by a concurrent caller");
                    return Ok(Some(current));
                }
            }
        }

        self.issue_transaction_token(transport, include_critical).await
    }

    async fn issue_transaction_token(
        &self,
        transport: &dyn AuthTransport,
        include_critical: bool,
    ) -> Result<Option<String>> {
        let user = self.user_token().await?.ok_or_else(ApiError::missing_user_token)?;

        let sticky = match self.transaction_token().await? {
            Some(current) => is_critical(&current) && self.validate_token(Some(&current)),
            None => false,
        };
        let include_critical = include_critical || sticky;

        let request = ApiRequest::post(TRANSACTION_AUTH_ENDPOINT)
            .body(json!({ "include_critical": include_critical }))
            .header("Authorization", user)
            .without_auth_recovery()
            .retry_budget(0);
        let response = transport.send(request).await?;
        let token = token_field(response, TRANSACTION_AUTH_ENDPOINT, "transaction")?;

        self.set_transaction_token(&token).await?;

        if !self.is_usable(&token) {
            warn!("issued transaction token is already expired; logging out");
            self.logout().await?;
            transport.on_logout();
            return Ok(None);
        }

        info!(critical = include_critical, sticky, "transaction token refreshed");
        Ok(Some(token))
    }

    /// Exchange credentials for a user token, then obtain a transaction token.
    ///
    /// `credentials` is sent as-is with the tenant injected as
    /// `{"tenant": {"id": tenant}}`.
    #[instrument(skip(self, transport, credentials))]
    pub async fn login(
        &self,
        transport: &dyn AuthTransport,
        tenant: &str,
        mut credentials: Map<String, Value>,
        include_critical: bool,
    ) -> Result<SessionTokens> {
        self.store.del(TOKEN_TRANSACTION_KEY).await?;

        credentials.insert("tenant".to_string(), json!({ "id": tenant }));
        let request = ApiRequest::post(USER_AUTH_ENDPOINT)
            .body(Value::Object(credentials))
            .unauthorized()
            .without_auth_recovery()
            .retry_budget(0);
        let response = transport.send(request).await?;
        let user = token_field(response, USER_AUTH_ENDPOINT, "user")?;

        self.set_user_token(&user).await?;
        info!(tenant, "user logged in");

        let transaction = self.get_transaction_token(transport, include_critical).await?;
        Ok(SessionTokens { user, transaction })
    }

    /// Forget both tokens. Idempotent.
    pub async fn logout(&self) -> Result<()> {
        self.store.del(TOKEN_USER_KEY).await?;
        self.store.del(TOKEN_TRANSACTION_KEY).await?;
        info!("session tokens cleared");
        Ok(())
    }

    /// Refresh the transaction token when it is missing or about to expire.
    ///
    /// Does nothing without a user token. Failures are logged and swallowed.
    pub async fn refresh_if_needed(&self, transport: &dyn AuthTransport) -> Option<String> {
        match self.user_token().await {
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "token store read failed");
                return None;
            }
        }

        match self.transaction_token().await {
            Ok(Some(current)) if self.is_usable(&current) => return None,
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "token store read failed");
                return None;
            }
        }

        match self.get_transaction_token(transport, false).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, category = err.label(), "background token refresh failed");
                None
            }
        }
    }

    /// Request a transaction token with critical access.
    pub async fn force_refresh(&self, transport: &dyn AuthTransport) -> Result<Option<String>> {
        self.get_transaction_token(transport, true).await
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("safety_interval", &self.safety_interval)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn is_critical(raw: &str) -> bool {
    Token::parse(raw).is_ok_and(|token| token.is_critical())
}

/// Pull `token.<field>` out of an auth endpoint response.
fn token_field(response: ApiResponse, endpoint: &str, field: &str) -> Result<String> {
    response
        .into_json()
        .and_then(|body| body.get("token")?.get(field)?.as_str().map(str::to_string))
        .ok_or_else(|| {
            let mut info = ErrorInfo::transport(
                HttpMethod::Post,
                endpoint,
                QueryParams::new(),
                format!("response did not contain token.{field}"),
            );
            info.error_type = Some(ERR_TYPE_AUTH.to_string());
            info.code = "missing_token".to_string();
            ApiError::Auth(Box::new(info))
        })
}
