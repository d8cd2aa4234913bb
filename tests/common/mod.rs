use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;

use lunglife_auth::config::AuthConfig;
use lunglife_auth::modules::auth::memory::MemoryAuthStore;

// Allow dead_code for utilities used by other test files
#[allow(dead_code)]
pub struct TestContext {
    pub server: TestServer,
    pub store: Arc<MemoryAuthStore>,
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        access_token_secret: "test-access-secret".to_string(),
        refresh_token_secret: "test-refresh-secret".to_string(),
        jwt_issuer: "lunglife".to_string(),
        jwt_audience: "lunglife-app".to_string(),
        access_token_expiry: "15m".to_string(),
        refresh_token_expiry: "7d".to_string(),
        // Low cost so the suite stays fast.
        argon2_memory_kib: 1024,
        argon2_iterations: 1,
        lockout_threshold: 5,
        lockout_duration_secs: 15 * 60,
        rate_limit_burst: 10_000,
    }
}

#[allow(dead_code)]
impl TestContext {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryAuthStore::new());
        let app = lunglife_auth::create_app(store.clone(), &test_config()).await;
        let server = TestServer::new(app).expect("Failed to create test server");

        Self { server, store }
    }

    pub async fn register(&self, email: &str) {
        let response = self
            .server
            .post("/auth/register")
            .json(&json!({
                "email": email,
                "password": test_password(),
                "first_name": "Test",
                "last_name": "User",
                "accept_terms": true
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
    }

    pub async fn login(&self, email: &str, password: &str) -> serde_json::Value {
        self.server
            .post("/auth/login")
            .json(&json!({
                "email": email,
                "password": password
            }))
            .await
            .json()
    }

    pub async fn register_and_login(&self) -> (String, String) {
        let email = test_email();
        self.register(&email).await;
        let body = self.login(&email, test_password()).await;
        let access_token = body["access_token"].as_str().expect("access token").to_string();
        (email, access_token)
    }

    pub async fn user_id(&self, email: &str) -> String {
        self.store
            .user_by_email(email)
            .await
            .expect("user should exist")
            .id
    }
}

// Helper to generate unique test email
#[allow(dead_code)]
pub fn test_email() -> String {
    format!("test_{}@example.com", uuid::Uuid::new_v4())
}

// Helper to generate test password
#[allow(dead_code)]
pub fn test_password() -> &'static str {
    "TestPassword123!"
}
