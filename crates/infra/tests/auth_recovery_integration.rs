//! Integration tests for the dispatcher's auth recovery
//!
//! **Coverage:**
//! - Login: user and transaction tokens issued and stored, JWT or opaque
//! - Expired transaction token: refresh, then one retry
//! - Critical access: critical refresh, then one retry, then fatal
//! - Token too old: password hook, re-login, retry
//! - Unrecoverable auth failures: logout or refresh, then fail
//! - Transport failures: one retry, then status `-1`
//!
//! **Infrastructure:**
//! - WireMock HTTP server standing in for the backend
//! - In-memory token store

#![allow(dead_code)]

#[path = "support.rs"]
mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bizberry_core::{hook_fn, HookError, StoreOptions, TokenStore};
use bizberry_domain::constants::HOOK_USER_PASSWORD_INPUT;
use bizberry_domain::{ApiError, ApiErrorCategory, ApiRequest, ApiResponse, QueryParams, SdkConfig};
use bizberry_infra::{ApiClient, MemoryTokenStore};
use serde_json::{json, Value};
use support::{auth_error, fresh_token, token_response, TestClient, TENANT};
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_issues_and_stores_both_tokens() {
    let test = TestClient::new().await;
    let user = fresh_token("user", false);
    let transaction = fresh_token("t1", false);

    Mock::given(method("POST"))
        .and(path("/access/auth/user"))
        .and(body_json(json!({
            "email": "jane@example.com",
            "password": "hunter2",
            "tenant": {"id": TENANT}
        })))
        .respond_with(token_response("user", &user))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .and(header("authorization", user.as_str()))
        .and(body_json(json!({"include_critical": false})))
        .respond_with(token_response("transaction", &transaction))
        .expect(1)
        .mount(&test.server)
        .await;

    let tokens = test
        .client
        .login(json!({"email": "jane@example.com", "password": "hunter2"}))
        .await
        .unwrap();

    assert_eq!(tokens.user, user);
    assert_eq!(tokens.transaction.as_deref(), Some(transaction.as_str()));
    assert_eq!(test.user_token().as_deref(), Some(user.as_str()));
    assert_eq!(test.transaction_token().as_deref(), Some(transaction.as_str()));
    assert_eq!(test.store.is_persistent("token_user"), Some(true));
    assert_eq!(test.store.is_persistent("token_transaction"), Some(false));

    let session = test.client.session().await.unwrap();
    assert!(session.is_logged_in());
    assert_eq!(session.user.and_then(|u| u.subject).as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_login_with_opaque_tokens() {
    let test = TestClient::new().await;

    Mock::given(method("POST"))
        .and(path("/access/auth/user"))
        .and(body_json(json!({"id": "u1", "password": "p", "tenant": {"id": TENANT}})))
        .respond_with(token_response("user", "U"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .and(header("authorization", "U"))
        .respond_with(token_response("transaction", "T"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "T"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1"})))
        .expect(1)
        .mount(&test.server)
        .await;

    let tokens = test.client.login(json!({"id": "u1", "password": "p"})).await.unwrap();

    assert_eq!(tokens.user, "U");
    assert_eq!(tokens.transaction.as_deref(), Some("T"));
    assert_eq!(test.user_token().as_deref(), Some("U"));
    assert_eq!(test.transaction_token().as_deref(), Some("T"));

    let response = test.client.get("/me", QueryParams::new()).await.unwrap();
    assert_eq!(response.json(), Some(&json!({"id": "u1"})));
}

#[tokio::test]
async fn test_login_with_wrong_password_is_not_recovered() {
    let test = TestClient::new().await;
    Mock::given(method("POST"))
        .and(path("/access/auth/user"))
        .respond_with(auth_error(401, "AuthError", "wrong_password"))
        .expect(1)
        .mount(&test.server)
        .await;

    let err = test.client.login(json!({"id": "u1", "password": "nope"})).await.unwrap_err();

    assert_eq!(err.category(), ApiErrorCategory::Authentication);
    assert_eq!(err.code(), Some("wrong_password"));
    assert!(test.user_token().is_none());
}

#[tokio::test]
async fn test_login_rejects_non_object_credentials() {
    let test = TestClient::new().await;
    let err = test.client.login(json!("hunter2")).await.unwrap_err();
    assert!(matches!(err, ApiError::Config(_)));
}

// ============================================================================
// Retry flows
// ============================================================================

#[tokio::test]
async fn test_expired_signature_refreshes_and_retries_once() {
    let stale = fresh_token("stale", false);
    let renewed = fresh_token("renewed", false);
    let test = TestClient::logged_in("USER", &stale).await;

    Mock::given(method("GET"))
        .and(path("/widgets"))
        .and(header("authorization", stale.as_str()))
        .respond_with(auth_error(401, "ExpiredSignatureError", "expired"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/widgets"))
        .and(header("authorization", renewed.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1, 2]})))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .and(header("authorization", "USER"))
        .respond_with(token_response("transaction", &renewed))
        .expect(1)
        .mount(&test.server)
        .await;

    let response = test.client.get("/widgets", QueryParams::new()).await.unwrap();

    assert_eq!(response.json(), Some(&json!({"items": [1, 2]})));
    assert_eq!(test.transaction_token().as_deref(), Some(renewed.as_str()));
}

#[tokio::test]
async fn test_critical_refresh_retries_once_then_fails() {
    let transaction = fresh_token("t1", false);
    let critical = fresh_token("t2", true);
    let test = TestClient::logged_in("USER", &transaction).await;

    Mock::given(method("GET"))
        .and(path("/salaries"))
        .and(header("authorization", transaction.as_str()))
        .respond_with(auth_error(403, "JWTClaimsError", "required_audience_missing"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/salaries"))
        .and(header("authorization", critical.as_str()))
        .respond_with(auth_error(403, "JWTClaimsError", "required_audience_missing"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .and(body_json(json!({"include_critical": true})))
        .respond_with(token_response("transaction", &critical))
        .expect(1)
        .mount(&test.server)
        .await;

    let err = test.client.get("/salaries", QueryParams::new()).await.unwrap_err();

    assert_eq!(err.category(), ApiErrorCategory::Authentication);
    assert_eq!(err.status(), Some(403));
    assert_eq!(err.code(), Some("required_audience_missing"));
    assert_eq!(test.transaction_token().as_deref(), Some(critical.as_str()));
}

#[tokio::test]
async fn test_zero_retry_budget_skips_recovery() {
    let transaction = fresh_token("t1", false);
    let test = TestClient::logged_in("USER", &transaction).await;

    Mock::given(method("GET"))
        .and(path("/widgets"))
        .respond_with(auth_error(401, "ExpiredSignatureError", "expired"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .respond_with(token_response("transaction", &fresh_token("t2", false)))
        .expect(0)
        .mount(&test.server)
        .await;

    let err = test.client.request(ApiRequest::get("/widgets").retry_budget(0)).await.unwrap_err();
    assert_eq!(err.error_type(), Some("ExpiredSignatureError"));
}

#[tokio::test]
async fn test_token_too_old_asks_for_password_and_relogs() {
    let transaction = fresh_token("t1", false);
    let user = fresh_token("user", false);
    let relogged_user = fresh_token("user2", false);
    let critical = fresh_token("t2", true);
    let test = TestClient::logged_in(&user, &transaction).await;

    test.client.hooks().add_hook(
        HOOK_USER_PASSWORD_INPUT,
        hook_fn(|args: Vec<Value>| async move {
            assert_eq!(args, vec![json!({"include_critical": true})]);
            Ok::<_, HookError>(json!("hunter2"))
        }),
        true,
    );

    Mock::given(method("DELETE"))
        .and(path("/accounts/7"))
        .and(header("authorization", transaction.as_str()))
        .respond_with(auth_error(401, "AuthError", "token_too_old_for_include_critical"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/accounts/7"))
        .and(header("authorization", critical.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/user"))
        .and(body_json(json!({"id": "u1", "password": "hunter2", "tenant": {"id": TENANT}})))
        .respond_with(token_response("user", &relogged_user))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .and(header("authorization", relogged_user.as_str()))
        .and(body_json(json!({"include_critical": true})))
        .respond_with(token_response("transaction", &critical))
        .expect(1)
        .mount(&test.server)
        .await;

    let response = test.client.delete("/accounts/7", QueryParams::new()).await.unwrap();

    assert_eq!(response, ApiResponse::Empty);
    assert_eq!(test.user_token().as_deref(), Some(relogged_user.as_str()));
}

#[tokio::test]
async fn test_token_too_old_without_budget_refreshes_then_fails() {
    let transaction = fresh_token("t1", false);
    let refreshed = fresh_token("t2", false);
    let test = TestClient::logged_in("USER", &transaction).await;

    let prompts = Arc::new(AtomicUsize::new(0));
    let prompted = Arc::clone(&prompts);
    test.client.hooks().add_hook(
        HOOK_USER_PASSWORD_INPUT,
        hook_fn(move |_args: Vec<Value>| {
            prompted.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, HookError>(json!("hunter2")) }
        }),
        true,
    );

    Mock::given(method("GET"))
        .and(path("/accounts/7"))
        .respond_with(auth_error(401, "AuthError", "token_too_old_for_include_critical"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .and(header("authorization", "USER"))
        .and(body_json(json!({"include_critical": false})))
        .respond_with(token_response("transaction", &refreshed))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/user"))
        .respond_with(token_response("user", "unused"))
        .expect(0)
        .mount(&test.server)
        .await;

    let err = test
        .client
        .request(ApiRequest::get("/accounts/7").retry_budget(0))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ApiErrorCategory::Authentication);
    assert_eq!(prompts.load(Ordering::SeqCst), 0);
    assert_eq!(err.code(), Some("token_too_old_for_include_critical"));
    assert_eq!(test.transaction_token().as_deref(), Some(refreshed.as_str()));
}

#[tokio::test]
async fn test_cancelled_password_prompt_fails_without_login() {
    let transaction = fresh_token("t1", false);
    let test = TestClient::logged_in(&fresh_token("user", false), &transaction).await;

    test.client.hooks().add_hook(
        HOOK_USER_PASSWORD_INPUT,
        hook_fn(|_| async { Ok::<_, HookError>(Value::Null) }),
        true,
    );
    Mock::given(method("GET"))
        .and(path("/payroll"))
        .respond_with(auth_error(401, "AuthError", "token_too_old_for_include_critical"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/user"))
        .respond_with(token_response("user", "unused"))
        .expect(0)
        .mount(&test.server)
        .await;

    let err = test.client.get("/payroll", QueryParams::new()).await.unwrap_err();

    assert_eq!(err.category(), ApiErrorCategory::Authentication);
    assert_eq!(err.code(), Some("token_too_old_for_include_critical"));
    assert_eq!(test.transaction_token().as_deref(), Some(transaction.as_str()));
}

// ============================================================================
// Abort flows
// ============================================================================

#[tokio::test]
async fn test_invalid_user_token_refreshes_once_then_fails() {
    let transaction = fresh_token("t1", false);
    let renewed = fresh_token("t2", false);
    let test = TestClient::logged_in("USER", &transaction).await;

    Mock::given(method("GET"))
        .and(path("/widgets"))
        .respond_with(auth_error(401, "AuthError", "invalid_user_token"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .respond_with(token_response("transaction", &renewed))
        .expect(1)
        .mount(&test.server)
        .await;

    let err = test.client.get("/widgets", QueryParams::new()).await.unwrap_err();

    assert_eq!(err.code(), Some("invalid_user_token"));
    assert_eq!(test.transaction_token().as_deref(), Some(renewed.as_str()));
}

#[tokio::test]
async fn test_jwt_error_logs_out() {
    let test = TestClient::logged_in("USER", &fresh_token("t1", false)).await;

    Mock::given(method("GET"))
        .and(path("/widgets"))
        .respond_with(auth_error(401, "JWTError", "bad_signature"))
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .respond_with(token_response("transaction", "unused"))
        .expect(0)
        .mount(&test.server)
        .await;

    let err = test.client.get("/widgets", QueryParams::new()).await.unwrap_err();

    assert_eq!(err.category(), ApiErrorCategory::Authentication);
    assert!(test.user_token().is_none());
    assert!(test.transaction_token().is_none());
    assert!(test.client.relations().is_empty());
}

#[tokio::test]
async fn test_backend_error_carries_every_detail() {
    let test = TestClient::logged_in("USER", &fresh_token("t1", false)).await;

    Mock::given(method("POST"))
        .and(path("/widgets"))
        .and(body_partial_json(json!({"name": ""})))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [
                {"type": "value_error", "msg": "name is empty", "loc": ["body", "name"]},
                {"type": "value_error", "msg": "size too large", "loc": ["body", "size"]}
            ]
        })))
        .expect(1)
        .mount(&test.server)
        .await;

    let err = test
        .client
        .post("/widgets", json!({"name": "", "size": 99}), QueryParams::new())
        .await
        .unwrap_err();

    let info = err.info().unwrap();
    assert_eq!(err.category(), ApiErrorCategory::Backend);
    assert_eq!(info.status, 422);
    assert_eq!(info.message, "name is empty");
    assert_eq!(info.details.as_ref().map(Vec::len), Some(2));
}

// ============================================================================
// Transport and responses
// ============================================================================

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let client = ApiClient::new(
        SdkConfig::new("http://127.0.0.1:1", TENANT),
        Arc::new(MemoryTokenStore::new()),
    )
    .unwrap();

    let err = client.request(ApiRequest::get("/ping").unauthorized()).await.unwrap_err();

    assert_eq!(err.category(), ApiErrorCategory::Transport);
    assert_eq!(err.status(), Some(-1));
    assert_eq!(err.info().unwrap().url, "/ping");
    assert!(err.info().unwrap().message.starts_with("Network error"));
}

#[tokio::test]
async fn test_transport_failure_is_retried_exactly_once() {
    // Accepts connections and hangs up without answering
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    let server = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });

    let client = ApiClient::new(
        SdkConfig::new(format!("http://{addr}"), TENANT),
        Arc::new(MemoryTokenStore::new()),
    )
    .unwrap();

    let err = client.request(ApiRequest::get("/ping").unauthorized()).await.unwrap_err();
    assert_eq!(err.status(), Some(-1));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);

    let err = client
        .request(ApiRequest::get("/ping").unauthorized().retry_budget(0))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ApiErrorCategory::Transport);
    assert_eq!(accepted.load(Ordering::SeqCst), 3);

    server.abort();
}

#[tokio::test]
async fn test_non_json_and_empty_responses() {
    let test = TestClient::logged_in("USER", &fresh_token("t1", false)).await;

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.7".to_vec(), "application/pdf"))
        .mount(&test.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/widgets/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&test.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/upgrade"))
        .respond_with(ResponseTemplate::new(402).set_body_string("payment required"))
        .mount(&test.server)
        .await;

    match test.client.get("/report.pdf", QueryParams::new()).await.unwrap() {
        ApiResponse::Binary(blob) => {
            assert_eq!(blob.content_type.as_deref(), Some("application/pdf"));
            assert_eq!(blob.bytes, b"%PDF-1.7");
        }
        other => panic!("expected binary response, got {other:?}"),
    }

    let response =
        test.client.put("/widgets/1", json!({"name": "w"}), QueryParams::new()).await.unwrap();
    assert!(response.is_empty());

    let response = test.client.get("/upgrade", QueryParams::new()).await.unwrap();
    assert_eq!(response.json(), Some(&json!({})));
}

#[tokio::test]
async fn test_concurrent_requests_share_one_transaction_refresh() {
    let test = TestClient::new().await;
    test.store
        .set("token_user", "USER", StoreOptions::persistent())
        .await
        .unwrap();
    let transaction = fresh_token("t1", false);

    Mock::given(method("POST"))
        .and(path("/access/auth/transaction"))
        .respond_with(
            token_response("transaction", &transaction).set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&test.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/widgets"))
        .and(header("authorization", transaction.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(3)
        .mount(&test.server)
        .await;

    let (a, b, c) = tokio::join!(
        test.client.get("/widgets", QueryParams::new()),
        test.client.get("/widgets", QueryParams::new()),
        test.client.get("/widgets", QueryParams::new()),
    );

    for response in [a, b, c] {
        assert_eq!(response.unwrap().json(), Some(&json!({"ok": true})));
    }
}

