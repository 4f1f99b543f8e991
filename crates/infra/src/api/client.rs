//! Request dispatcher
//!
//! [`ApiClient`] is the engine handle. It sends one logical request, picks
//! the `Authorization` header, classifies failures and drives the bounded
//! recovery described by [`classify`](super::classify::classify). Successful
//! JSON bodies are then passed through relation enrichment.
//!
//! The handle is cheap to clone; all clones share one session.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use bizberry_core::{HookRegistry, TokenStore};
use bizberry_domain::constants::HOOK_USER_PASSWORD_INPUT;
use bizberry_domain::{
    ApiError, ApiRequest, ApiResponse, Blob, ErrorEnvelope, ErrorInfo, HttpMethod, QueryParams,
    Result, SdkConfig, TokenPayload,
};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::auth::{AuthTransport, SessionTokens, TokenManager};
use super::classify::{classify, AuthAction};
use super::relations::RelationCache;
use super::scheduler::RefreshTask;
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Mutable part of the session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionConfig {
    url: Option<String>,
    tenant: String,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    /// Backend base URL, if configured.
    pub url: Option<String>,
    /// Tenant injected into logins.
    pub tenant: String,
    /// Decoded user token payload.
    pub user: Option<TokenPayload>,
    /// Decoded transaction token payload.
    pub transaction: Option<TokenPayload>,
}

impl Session {
    /// Whether a decodable user token is stored.
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }
}

pub(crate) struct ClientInner {
    pub(crate) http: HttpClient,
    pub(crate) config: SdkConfig,
    session: RwLock<SessionConfig>,
    pub(crate) tokens: TokenManager,
    pub(crate) hooks: Arc<HookRegistry>,
    pub(crate) relations: RelationCache,
    pub(crate) auto_refresh: Mutex<Option<RefreshTask>>,
    pub(crate) liveness: Mutex<Option<bizberry_core::Subscription>>,
    pub(crate) liveness_refreshing: Arc<AtomicBool>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(task) = self.auto_refresh.get_mut().take() {
            task.cancel();
        }
    }
}

/// Authenticated request engine.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) inner: Arc<ClientInner>,
}

/// Outcome of one HTTP exchange that produced a response.
enum Attempt {
    Success(ApiResponse),
    Failure { status: u16, envelope: ErrorEnvelope },
}

impl ApiClient {
    /// Create a client for `config` storing tokens in `store`.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the HTTP client cannot be built.
    pub fn new(config: SdkConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        Self::builder().config(config).store(store).build()
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    /// Token lifecycle manager.
    pub fn tokens(&self) -> &TokenManager {
        &self.inner.tokens
    }

    /// Host callback registry.
    pub fn hooks(&self) -> &HookRegistry {
        &self.inner.hooks
    }

    /// Relation fetch cache.
    pub fn relations(&self) -> &RelationCache {
        &self.inner.relations
    }

    /// Current backend base URL.
    pub fn url(&self) -> Option<String> {
        self.inner.session.read().url.clone()
    }

    /// Point subsequent requests at another backend.
    pub fn set_url(&self, url: Option<String>) {
        self.inner.session.write().url = url;
    }

    /// Current tenant id.
    pub fn tenant(&self) -> String {
        self.inner.session.read().tenant.clone()
    }

    /// Change the tenant used by later logins.
    pub fn set_tenant(&self, tenant: impl Into<String>) {
        self.inner.session.write().tenant = tenant.into();
    }

    /// Snapshot of url, tenant and decoded token payloads.
    pub async fn session(&self) -> Result<Session> {
        let SessionConfig { url, tenant } = self.inner.session.read().clone();
        let (user, transaction) = self.inner.tokens.payloads().await?;
        Ok(Session { url, tenant, user, transaction })
    }

    // ========================================================================
    // Verbs
    // ========================================================================

    /// Send `request` and enrich a JSON result.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        match self.dispatch(request).await? {
            ApiResponse::Json(body) => Ok(ApiResponse::Json(self.enrich(body).await)),
            other => Ok(other),
        }
    }

    #[instrument(skip(self, params), fields(endpoint = %endpoint))]
    /// `GET endpoint`.
    pub async fn get(&self, endpoint: &str, params: QueryParams) -> Result<ApiResponse> {
        self.request(ApiRequest::get(endpoint).params(params)).await
    }

    #[instrument(skip(self, body, params), fields(endpoint = %endpoint))]
    /// `POST endpoint` with a JSON body.
    pub async fn post(&self, endpoint: &str, body: Value, params: QueryParams) -> Result<ApiResponse> {
        self.request(ApiRequest::post(endpoint).body(body).params(params)).await
    }

    #[instrument(skip(self, body, params), fields(endpoint = %endpoint))]
    /// `PUT endpoint` with a JSON body.
    pub async fn put(&self, endpoint: &str, body: Value, params: QueryParams) -> Result<ApiResponse> {
        self.request(ApiRequest::new(HttpMethod::Put, endpoint).body(body).params(params)).await
    }

    #[instrument(skip(self, body, params), fields(endpoint = %endpoint))]
    /// `PATCH endpoint` with a JSON body.
    pub async fn patch(
        &self,
        endpoint: &str,
        body: Value,
        params: QueryParams,
    ) -> Result<ApiResponse> {
        self.request(ApiRequest::new(HttpMethod::Patch, endpoint).body(body).params(params)).await
    }

    #[instrument(skip(self, params), fields(endpoint = %endpoint))]
    /// `DELETE endpoint`.
    pub async fn delete(&self, endpoint: &str, params: QueryParams) -> Result<ApiResponse> {
        self.request(ApiRequest::new(HttpMethod::Delete, endpoint).params(params)).await
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Log in with a JSON credentials object (`id`/`email`, `password`,
    /// optional `otp`).
    ///
    /// # Errors
    /// `ApiError::Config` if `credentials` is not an object; otherwise the
    /// login or transaction-token failure.
    #[instrument(skip(self, credentials))]
    pub async fn login(&self, credentials: Value) -> Result<SessionTokens> {
        self.login_with(credentials, false).await
    }

    async fn login_with(&self, credentials: Value, include_critical: bool) -> Result<SessionTokens> {
        let Value::Object(credentials) = credentials else {
            return Err(ApiError::Config("login credentials must be a JSON object".to_string()));
        };
        let tenant = self.tenant();
        self.inner.tokens.login(self, &tenant, credentials, include_critical).await
    }

    /// Forget both tokens and every cached relation.
    pub async fn logout(&self) -> Result<()> {
        self.inner.tokens.logout().await?;
        self.inner.relations.reset();
        Ok(())
    }

    /// See [`TokenManager::validate_token`].
    pub fn validate_token(&self, token: Option<&str>) -> bool {
        self.inner.tokens.validate_token(token)
    }

    /// See [`TokenManager::get_transaction_token`].
    pub async fn get_transaction_token(&self, include_critical: bool) -> Result<Option<String>> {
        self.inner.tokens.get_transaction_token(self, include_critical).await
    }

    /// See [`TokenManager::refresh_if_needed`].
    pub async fn refresh_if_needed(&self) -> Option<String> {
        self.inner.tokens.refresh_if_needed(self).await
    }

    /// See [`TokenManager::force_refresh`].
    pub async fn force_refresh(&self) -> Result<Option<String>> {
        self.inner.tokens.force_refresh(self).await
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Send `request` with auth recovery but without enrichment.
    pub(crate) async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let base_url = self.url().ok_or_else(|| {
            ApiError::Config("SDK has no URL configured to send requests to".to_string())
        })?;

        let mut budget = request.retry_budget;
        let mut token_fetched = false;

        loop {
            let authorization = self.authorization_for(&request, &mut token_fetched).await?;

            let (status, envelope) = match self.send_once(&base_url, &request, authorization).await {
                Ok(Attempt::Success(response)) => return Ok(response),
                Ok(Attempt::Failure { status, envelope }) => (status, envelope),
                Err(err) if budget > 0 => {
                    budget -= 1;
                    warn!(
                        method = %request.method,
                        endpoint = %request.endpoint,
                        error = %err,
                        "transport failure, retrying"
                    );
                    continue;
                }
                Err(err) => {
                    return Err(err.into_api_error(
                        request.method,
                        &request.endpoint,
                        &request.params,
                    ));
                }
            };

            let info = Box::new(ErrorInfo::from_envelope(
                request.method,
                &request.endpoint,
                request.params.clone(),
                status,
                &envelope,
            ));
            let action = classify(status, &envelope);

            if !action.is_auth() {
                return Err(ApiError::Backend(info));
            }
            if !request.auth_recovery || (action.retries() && budget == 0) {
                debug!(?action, status, code = %info.code, "auth failure not recovered");
                if request.auth_recovery && action == AuthAction::Reauthenticate {
                    // No prompt left, but the next request may still get a fresh token
                    self.refresh_quietly().await;
                }
                return Err(ApiError::Auth(info));
            }

            warn!(
                ?action,
                status,
                error_type = info.error_type.as_deref().unwrap_or_default(),
                code = %info.code,
                endpoint = %request.endpoint,
                "auth failure, recovering"
            );
            self.recover(action, &info).await?;

            if !action.retries() {
                return Err(ApiError::Auth(info));
            }
            budget -= 1;
            // The retry authenticates with whatever token recovery produced
            request.headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
        }
    }

    async fn authorization_for(
        &self,
        request: &ApiRequest,
        token_fetched: &mut bool,
    ) -> Result<Option<String>> {
        if !request.authorized || request.authorization_header().is_some() {
            return Ok(None);
        }
        if let Some(token) = self.inner.tokens.transaction_token().await? {
            return Ok(Some(token));
        }
        if *token_fetched {
            return Ok(None);
        }
        *token_fetched = true;
        self.inner.tokens.get_transaction_token(self, false).await
    }

    async fn send_once(
        &self,
        base_url: &str,
        request: &ApiRequest,
        authorization: Option<String>,
    ) -> std::result::Result<Attempt, InfraError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), request.path_and_query());
        debug!(method = %request.method, endpoint = %request.endpoint, "dispatching request");

        let mut builder = self.inner.http.request(to_reqwest_method(request.method), url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = authorization {
            builder = builder.header(AUTHORIZATION, token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = self.inner.http.send(builder).await?;
        read_response(response).await
    }

    async fn recover(&self, action: AuthAction, info: &ErrorInfo) -> Result<()> {
        let tokens = &self.inner.tokens;
        match action {
            AuthAction::CriticalRefresh => {
                tokens.get_transaction_token(self, true).await?;
            }
            AuthAction::RefreshAndRetry => {
                tokens.get_transaction_token(self, false).await?;
            }
            AuthAction::Reauthenticate => self.reauthenticate(info).await?,
            AuthAction::RefreshAndAbort => self.refresh_quietly().await,
            AuthAction::LogoutAndAbort => {
                self.logout().await?;
                self.refresh_quietly().await;
            }
            AuthAction::Raise => {}
        }
        Ok(())
    }

    async fn refresh_quietly(&self) {
        if let Err(err) = self.inner.tokens.get_transaction_token(self, false).await {
            debug!(error = %err, "transaction token refresh after auth failure failed");
        }
    }

    /// Ask the host for the user's password, log in again with critical
    /// access.
    async fn reauthenticate(&self, info: &ErrorInfo) -> Result<()> {
        let auth_error = |message: String| {
            let mut info = info.clone();
            info.message = message;
            ApiError::Auth(Box::new(info))
        };

        let args = [json!({ "include_critical": true })];
        let answers = self
            .inner
            .hooks
            .call_hook(HOOK_USER_PASSWORD_INPUT, &args)
            .await
            .map_err(|err| auth_error(err.to_string()))?;

        let credentials = match answers.into_iter().next() {
            Some(Value::String(password)) => {
                let (user, _) = self.inner.tokens.payloads().await?;
                let subject = user
                    .and_then(|payload| payload.subject)
                    .ok_or_else(|| auth_error("no user to re-authenticate".to_string()))?;
                json!({ "id": subject, "password": password })
            }
            Some(object @ Value::Object(_)) => object,
            Some(_) | None => {
                return Err(auth_error("re-authentication was not completed".to_string()));
            }
        };

        info!("re-authenticating for critical access");
        self.login_with(credentials, true).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthTransport for ApiClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.dispatch(request).await
    }

    fn on_logout(&self) {
        self.inner.relations.reset();
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.session.read();
        f.debug_struct("ApiClient")
            .field("url", &session.url)
            .field("tenant", &session.tenant)
            .field("relations", &self.inner.relations)
            .finish_non_exhaustive()
    }
}

const fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Turn a response into an [`Attempt`]. 2xx and 402 are successes.
async fn read_response(response: Response) -> std::result::Result<Attempt, InfraError> {
    let status = response.status();
    let success = status.is_success() || status == StatusCode::PAYMENT_REQUIRED;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let is_json = content_type.as_deref().is_some_and(|ct| ct.contains("application/json"));

    if status == StatusCode::NO_CONTENT {
        return Ok(Attempt::Success(ApiResponse::Empty));
    }

    let bytes = response.bytes().await?;

    if !success {
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        return Ok(Attempt::Failure {
            status: status.as_u16(),
            envelope: ErrorEnvelope::from_body(&body),
        });
    }

    if is_json {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Attempt::Success(ApiResponse::Json(json!({}))));
        }
        let body = serde_json::from_slice(&bytes)
            .map_err(|err| InfraError::new(format!("Network error: invalid JSON body: {err}")))?;
        return Ok(Attempt::Success(ApiResponse::Json(body)));
    }

    if status.is_success() {
        Ok(Attempt::Success(ApiResponse::Binary(Blob { content_type, bytes: bytes.to_vec() })))
    } else {
        Ok(Attempt::Success(ApiResponse::Json(json!({}))))
    }
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    config: SdkConfig,
    store: Option<Arc<dyn TokenStore>>,
    hooks: Option<Arc<HookRegistry>>,
    http: Option<HttpClient>,
}

impl ApiClientBuilder {
    pub fn config(mut self, config: SdkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share a hook registry with the host.
    pub fn hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Use a preconfigured HTTP client instead of one built from the config.
    pub fn http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let store =
            self.store.ok_or_else(|| ApiError::Config("Token store not set".to_string()))?;
        let config = self.config;

        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = HttpClient::builder().timeout(config.timeout());
                if let Some(agent) = &config.user_agent {
                    builder = builder.user_agent(agent.clone());
                }
                builder.build()?
            }
        };

        let session = SessionConfig { url: config.url.clone(), tenant: config.tenant.clone() };
        let inner = ClientInner {
            http,
            tokens: TokenManager::new(store, config.safety_interval()),
            hooks: self.hooks.unwrap_or_default(),
            relations: RelationCache::new(config.relation_ttl()),
            session: RwLock::new(session),
            config,
            auto_refresh: Mutex::new(None),
            liveness: Mutex::new(None),
            liveness_refreshing: Arc::new(AtomicBool::new(false)),
        };

        Ok(ApiClient { inner: Arc::new(inner) })
    }
}
