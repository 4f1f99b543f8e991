use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bizberry_core::{StoreOptions, TokenStore};
use bizberry_domain::constants::{TOKEN_TRANSACTION_KEY, TOKEN_USER_KEY};
use bizberry_domain::SdkConfig;
use bizberry_infra::{ApiClient, MemoryTokenStore};
use serde_json::{json, Value};
use wiremock::{MockServer, ResponseTemplate};

pub const TENANT: &str = "acme";

/// Unsigned JWT carrying `payload`.
pub fn jwt(payload: Value) -> String {
    format!("eyJhbGciOiJIUzI1NiJ9.{}.signature", URL_SAFE_NO_PAD.encode(payload.to_string()))
}

/// Token valid for an hour, distinguishable by `jti`.
pub fn fresh_token(id: &str, critical: bool) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    jwt(json!({"sub": "u1", "exp": exp, "crt": critical, "jti": id}))
}

/// `{"token": {<field>: token}}` as returned by the auth endpoints.
pub fn token_response(field: &str, token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "token": { field: token } }))
}

/// Backend error envelope with a single detail.
pub fn auth_error(status: u16, error_type: &str, code: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "detail": {"type": error_type, "code": code, "message": format!("{error_type}: {code}")}
    }))
}

/// Client wired to a fresh mock backend.
pub struct TestClient {
    pub server: MockServer,
    pub store: Arc<MemoryTokenStore>,
    pub client: ApiClient,
}

impl TestClient {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(configure: impl FnOnce(&mut SdkConfig)) -> Self {
        let server = MockServer::start().await;
        let mut config = SdkConfig::new(server.uri(), TENANT);
        configure(&mut config);

        let store = Arc::new(MemoryTokenStore::new());
        let client = ApiClient::new(config, store.clone()).expect("client should build");
        Self { server, store, client }
    }

    /// Seed the store with a user token and a transaction token.
    pub async fn logged_in(user: &str, transaction: &str) -> Self {
        let test = Self::new().await;
        test.store
            .set(TOKEN_USER_KEY, user, StoreOptions::persistent())
            .await
            .expect("store write should succeed");
        test.store
            .set(TOKEN_TRANSACTION_KEY, transaction, StoreOptions::transient())
            .await
            .expect("store write should succeed");
        test
    }

    pub fn user_token(&self) -> Option<String> {
        self.store.value(TOKEN_USER_KEY)
    }

    pub fn transaction_token(&self) -> Option<String> {
        self.store.value(TOKEN_TRANSACTION_KEY)
    }
}
