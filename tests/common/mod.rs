#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use railpass::{ServerConfig, create_app, db::Database, jwt::JwtConfig, tokens::RefreshPolicy};
use serde_json::{Value, json};
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &[u8] = b"test-jwt-secret-for-testing-only!";
pub const TEST_PASSWORD: &str = "Passw0rd!";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub jwt: JwtConfig,
}

/// Builder for test setup with various options
pub struct TestSetup<'a> {
    base: Option<&'a str>,
    policy: RefreshPolicy,
    secure_cookies: bool,
    signin_per_minute: u32,
    db: Option<Database>,
}

impl<'a> TestSetup<'a> {
    pub fn new() -> Self {
        Self {
            base: None,
            policy: RefreshPolicy::Reuse,
            secure_cookies: false,
            signin_per_minute: 0,
            db: None,
        }
    }

    pub fn with_base(mut self, base: &'a str) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_secure_cookies(mut self) -> Self {
        self.secure_cookies = true;
        self
    }

    pub fn with_signin_limit(mut self, per_minute: u32) -> Self {
        self.signin_per_minute = per_minute;
        self
    }

    pub fn with_db(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn config(&self, db: Database) -> ServerConfig {
        ServerConfig {
            base: self.base.map(|s| s.to_string()),
            db,
            jwt_secret: TEST_JWT_SECRET.to_vec(),
            secure_cookies: self.secure_cookies,
            refresh_policy: self.policy,
            // Cheapest valid Argon2 cost, tests do not need a slow hash
            hash_memory_kib: 8,
            hash_iterations: 1,
            signin_per_minute: self.signin_per_minute,
            signup_per_minute: 0,
            trust_forwarded_for: true,
        }
    }

    pub async fn build(self) -> TestApp {
        let db = match self.db.clone() {
            Some(db) => db,
            None => Database::open(":memory:")
                .await
                .expect("Failed to open test database"),
        };
        let app = create_app(&self.config(db.clone())).expect("Failed to create app");
        TestApp {
            app,
            db,
            jwt: JwtConfig::new(TEST_JWT_SECRET),
        }
    }
}

pub async fn setup() -> TestApp {
    TestSetup::new().build().await
}

/// SQLite file in the temp dir, removed on drop. Needed where many
/// connections write concurrently.
pub struct TempDb {
    pub path: std::path::PathBuf,
}

impl TempDb {
    pub async fn open() -> (Self, Database) {
        let path = std::env::temp_dir().join(format!("railpass-test-{}.db", uuid::Uuid::new_v4()));
        let db = Database::open(path.to_str().expect("Temp path is not UTF-8"))
            .await
            .expect("Failed to open temp database");
        (Self { path }, db)
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn cookie_request(method: &str, uri: &str, secret: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", format!("refresh_token={}", secret))
        .body(Body::empty())
        .unwrap()
}

pub fn bearer_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// The refresh secret from a Set-Cookie list, if one was set (not cleared).
pub fn refresh_secret(cookies: &[String]) -> Option<String> {
    cookies.iter().find_map(|c| {
        let value = c.strip_prefix("refresh_token=")?.split(';').next()?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Check if cookies contain the refresh token being cleared (Max-Age=0)
pub fn has_cleared_refresh_cookie(cookies: &[String]) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with("refresh_token=;") && c.contains("Max-Age=0"))
}

pub fn signup_body(username: &str, email: &str) -> Value {
    json!({
        "firstname": "Test",
        "lastname": "User",
        "username": username,
        "email": email,
        "password": TEST_PASSWORD,
    })
}

pub async fn signup(app: &Router, username: &str, email: &str) -> StatusCode {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            signup_body(username, email),
        ))
        .await
        .unwrap()
        .status()
}

pub struct Signin {
    pub status: StatusCode,
    pub body: Value,
    pub cookies: Vec<String>,
}

impl Signin {
    pub fn access_token(&self) -> &str {
        self.body["accessToken"].as_str().expect("No access token")
    }

    pub fn refresh_secret(&self) -> String {
        refresh_secret(&self.cookies).expect("No refresh cookie")
    }
}

pub async fn signin(app: &Router, username: &str, password: &str) -> Signin {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/signin",
            json!({ "username": username, "password": password }),
        ))
        .await
        .unwrap();
    let status = response.status();
    let cookies = extract_set_cookies(&response);
    let body = body_json(response).await;
    Signin {
        status,
        body,
        cookies,
    }
}

/// Sign up and sign in a user with the default test password.
pub async fn signed_in_user(app: &Router, username: &str) -> Signin {
    assert_eq!(
        signup(app, username, &format!("{}@x.com", username)).await,
        StatusCode::CREATED
    );
    let result = signin(app, username, TEST_PASSWORD).await;
    assert_eq!(result.status, StatusCode::OK);
    result
}
