//! HTTP client for the auth endpoints with transparent access token renewal.
//!
//! The access token lives in memory only. The refresh secret lives in the
//! client's cookie jar, where the server put it. When a call comes back 403
//! the client exchanges the cookie for a new access token and resends, at most
//! [`MAX_REFRESH_ATTEMPTS`] times per call. If the exchange is refused the
//! caller gets the original 403 and the client is signed out.
//!
//! Concurrent callers that all see an expired token share one refresh. The
//! refresh runs on its own task so a cancelled caller cannot leave the shared
//! token half-updated.

mod error;

pub use error::ClientError;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;

/// Renewals allowed per call before giving up.
pub const MAX_REFRESH_ATTEMPTS: u32 = 4;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SIGNIN_PATH: &str = "auth/signin";
const SIGNUP_PATH: &str = "auth/signup";
const SIGNOUT_PATH: &str = "auth/signout";
const REFRESH_PATH: &str = "auth/refresh";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL including the base path, e.g. `https://host/api/`.
    pub base_url: Url,
    pub connect_timeout: Duration,
    /// Applies to every request, refresh included.
    pub request_timeout: Duration,
    pub max_refresh_attempts: u32,
}

impl ClientConfig {
    pub fn new(mut base_url: Url) -> Self {
        // Url::join replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_refresh_attempts: MAX_REFRESH_ATTEMPTS,
        }
    }
}

/// Account details for signup.
#[derive(Debug, Clone, Serialize)]
pub struct SignupForm {
    pub firstname: String,
    pub lastname: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
struct SigninBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    access_token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Refresh outcome shared between coalesced callers, so it must be `Clone`.
#[derive(Debug, Clone)]
enum RefreshFailure {
    Rejected { status: u16, message: String },
    Transport(String),
}

impl From<RefreshFailure> for ClientError {
    fn from(e: RefreshFailure) -> Self {
        match e {
            RefreshFailure::Rejected { status, message } => {
                ClientError::RefreshRejected { status, message }
            }
            RefreshFailure::Transport(e) => ClientError::RefreshFailed(e),
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshFailure>>>;

/// Single-flight slot. `generation` lets a finished refresh clear only its own entry.
#[derive(Default)]
struct RefreshSlot {
    generation: u64,
    inflight: Option<SharedRefresh>,
}

struct Inner {
    http: reqwest::Client,
    base_url: Url,
    max_refresh_attempts: u32,
    access_token: RwLock<Option<String>>,
    refresh: Mutex<RefreshSlot>,
}

impl Inner {
    fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }

    async fn fetch_refreshed_token(&self) -> Result<String, RefreshFailure> {
        let url = self
            .url(REFRESH_PATH)
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshFailure::Rejected {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let body: TokenBody = response
            .json()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;
        Ok(body.access_token)
    }
}

/// Runs on its own task: fetch, publish the result, then free the slot.
async fn run_refresh(inner: Arc<Inner>, generation: u64) -> Result<String, RefreshFailure> {
    let result = inner.fetch_refreshed_token().await;

    match &result {
        Ok(token) => {
            debug!("Access token renewed");
            *inner.access_token.write().await = Some(token.clone());
        }
        Err(e) => {
            warn!(error = ?e, "Access token renewal failed, clearing session");
            *inner.access_token.write().await = None;
        }
    }

    let mut slot = inner.refresh.lock().await;
    if slot.generation == generation {
        slot.inflight = None;
    }
    result
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("Request failed").to_string(),
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Api {
            status: status.as_u16(),
            message: error_message(response).await,
        })
    }
}

/// Calls that must never trigger a renewal.
fn is_auth_exchange(path: &str) -> bool {
    matches!(
        path.trim_start_matches('/'),
        SIGNIN_PATH | SIGNUP_PATH | REFRESH_PATH
    )
}

#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<Inner>,
}

impl AuthClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("railpass/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.base_url,
                max_refresh_attempts: config.max_refresh_attempts,
                access_token: RwLock::new(None),
                refresh: Mutex::new(RefreshSlot::default()),
            }),
        })
    }

    /// The current access token, if signed in.
    pub async fn access_token(&self) -> Option<String> {
        self.inner.access_token.read().await.clone()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.inner.access_token.read().await.is_some()
    }

    pub async fn signup(&self, form: &SignupForm) -> Result<(), ClientError> {
        let response = self
            .inner
            .http
            .post(self.inner.url(SIGNUP_PATH)?)
            .json(form)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Sign in with a username or email. Stores the access token in memory;
    /// the refresh cookie lands in the cookie jar.
    pub async fn signin(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .inner
            .http
            .post(self.inner.url(SIGNIN_PATH)?)
            .json(&SigninBody { username, password })
            .send()
            .await?;
        let body: TokenBody = ensure_success(response).await?.json().await?;
        *self.inner.access_token.write().await = Some(body.access_token);
        Ok(())
    }

    /// Revoke the session server-side. Local state is cleared even if the call fails.
    pub async fn signout(&self) -> Result<(), ClientError> {
        *self.inner.access_token.write().await = None;
        let response = self
            .inner
            .http
            .post(self.inner.url(SIGNOUT_PATH)?)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Exchange the refresh cookie for a new access token.
    ///
    /// Concurrent callers share a single in-flight request.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let refresh = {
            let mut slot = self.inner.refresh.lock().await;
            if let Some(inflight) = slot.inflight.clone() {
                inflight
            } else {
                slot.generation += 1;
                let handle = tokio::spawn(run_refresh(self.inner.clone(), slot.generation));
                let shared = async move {
                    handle
                        .await
                        .unwrap_or_else(|e| Err(RefreshFailure::Transport(e.to_string())))
                }
                .boxed()
                .shared();
                slot.inflight = Some(shared.clone());
                shared
            }
        };

        refresh.await.map(|_| ()).map_err(ClientError::from)
    }

    /// Send a request with the bearer token attached, renewing on 403.
    ///
    /// Returns the first response that is not a renewable 403. Non-success
    /// statuses are returned as-is for the caller to inspect. When renewal
    /// fails the local session is cleared and the original 403 is returned.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ClientError> {
        let renewable = !is_auth_exchange(path);
        let mut renewals = 0;

        loop {
            let token = self.access_token().await;
            let response = self
                .dispatch(method.clone(), path, body, token.as_deref())
                .await?;

            if !renewable || response.status() != StatusCode::FORBIDDEN {
                return Ok(response);
            }

            if renewals >= self.inner.max_refresh_attempts {
                warn!(path = %path, renewals, "Authorization still expired, giving up");
                return Err(ClientError::RetryLimit { attempts: renewals });
            }
            renewals += 1;

            // Another caller may have renewed, failed to renew, or signed out
            // while this request was in flight
            let current = self.access_token().await;
            if current != token {
                if current.is_none() {
                    return Ok(response);
                }
                continue;
            }

            if let Err(e) = self.refresh().await {
                debug!(path = %path, error = %e, "Renewal failed, returning original response");
                return Ok(response);
            }
        }
    }

    /// GET a JSON resource through [`send`](Self::send).
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.send(Method::GET, path, None).await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut request = self.inner.http.request(method, self.inner.url(path)?);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = ClientConfig::new(Url::parse("http://localhost:7292/api").unwrap());
        assert_eq!(config.base_url.as_str(), "http://localhost:7292/api/");
        assert_eq!(
            config.base_url.join(REFRESH_PATH).unwrap().as_str(),
            "http://localhost:7292/api/auth/refresh"
        );
    }

    #[test]
    fn test_auth_exchanges_are_not_renewed() {
        assert!(is_auth_exchange("auth/signin"));
        assert!(is_auth_exchange("/auth/refresh"));
        assert!(is_auth_exchange("auth/signup"));
        assert!(!is_auth_exchange("auth/me"));
        assert!(!is_auth_exchange("tickets"));
    }

    #[test]
    fn test_refresh_failures_require_signin() {
        let err = ClientError::from(RefreshFailure::Rejected {
            status: 403,
            message: "Refresh token expired".to_string(),
        });
        assert!(err.requires_signin());
        assert!(matches!(err, ClientError::RefreshRejected { status: 403, .. }));

        let err = ClientError::Api {
            status: 404,
            message: "Not found".to_string(),
        };
        assert!(!err.requires_signin());
    }
}
