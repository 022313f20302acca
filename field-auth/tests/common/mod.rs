//! Test helper module for field-auth integration tests.
//!
//! Builds the full service in-process on a manual clock, in-memory storage
//! and a recording notifier. Requests go straight to the router.

#![allow(dead_code)]

use chrono::Duration;
use field_auth::{
    build_router,
    config::AuthConfig,
    services::{
        AuthService, Clock, InMemoryUserDirectory, JwtService, MemoryCodeStorage, MockClock,
        MockNotifier, VerificationCodeStore,
    },
    AppState,
};
use http_body_util::BodyExt;
use service_core::axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use service_core::config::Config as CoreConfig;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_PHONE: &str = "+15551234567";
pub const TEST_SIGNING_KEY: &str = "integration-test-signing-key-with-32-plus-bytes";

/// Environment used by every test app.
pub fn test_env() -> HashMap<String, String> {
    [
        ("ENVIRONMENT", "dev"),
        ("SERVICE_NAME", "field-auth-test"),
        ("SESSION_SIGNING_KEY", TEST_SIGNING_KEY),
        ("SESSION_ISSUER", "field-auth-test"),
        ("SESSION_AUDIENCE", "field-app-test"),
        ("RATE_LIMIT_CODE_REQUESTS", "3"),
        ("RATE_LIMIT_CODE_WINDOW_SECONDS", "900"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn test_config(env: &HashMap<String, String>) -> AuthConfig {
    AuthConfig::from_lookup(CoreConfig::default(), |key| env.get(key).cloned())
        .expect("test configuration is valid")
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub clock: MockClock,
    pub storage: MemoryCodeStorage,
    pub directory: InMemoryUserDirectory,
    pub notifier: Arc<MockNotifier>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::build(None)
    }

    /// Same as [`TestApp::spawn`] with a custom session lifetime.
    pub fn spawn_with_session_ttl(session_ttl: Duration) -> Self {
        Self::build(Some(session_ttl))
    }

    fn build(session_ttl: Option<Duration>) -> Self {
        let config = Arc::new(test_config(&test_env()));
        let clock = MockClock::default();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let storage = MemoryCodeStorage::new();
        let directory = InMemoryUserDirectory::new();
        let notifier = Arc::new(MockNotifier::new());

        let codes = VerificationCodeStore::new(
            Arc::new(storage.clone()),
            shared_clock.clone(),
            &config.verification,
        );
        let mut jwt =
            JwtService::new(&config.session, shared_clock.clone()).expect("valid session config");
        if let Some(ttl) = session_ttl {
            jwt = jwt.with_session_ttl(ttl);
        }

        let auth_service = AuthService::new(
            codes,
            jwt,
            Arc::new(directory.clone()),
            notifier.clone(),
            shared_clock,
        );

        let state = AppState {
            config: config.clone(),
            auth_service,
            code_request_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.code_request_attempts,
                config.rate_limit.code_request_window_seconds,
            ),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
            ),
        };

        Self {
            router: build_router(state.clone()),
            state,
            clock,
            storage,
            directory,
            notifier,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.state.auth_service
    }

    /// The code most recently handed to the notifier.
    pub fn last_code(&self) -> String {
        self.notifier
            .last_delivery()
            .expect("a code was delivered")
            .code
    }

    /// Requests a code and verifies it, returning the session token.
    pub async fn sign_in(&self, phone: &str) -> String {
        let requested = self
            .auth()
            .request_verification_code(phone)
            .await
            .expect("code request succeeds");
        self.auth()
            .verify_code(&requested.verification_id, phone, &self.last_code())
            .await
            .expect("verification succeeds")
            .token
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> TestResponse {
        self.post_json_from(path, body, None).await
    }

    /// POST with an optional `x-forwarded-for` client address.
    pub async fn post_json_from(
        &self,
        path: &str,
        body: serde_json::Value,
        client_ip: Option<&str>,
    ) -> TestResponse {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(ip) = client_ip {
            request = request.header("x-forwarded-for", ip);
        }
        let request = request
            .body(Body::from(body.to_string()))
            .expect("request builds");
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .expect("request builds");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        let text = String::from_utf8(bytes.to_vec()).expect("utf-8 body");

        TestResponse {
            status,
            headers,
            text,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.text).expect("json body")
    }
}
