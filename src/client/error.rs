//! Errors surfaced by [`AuthClient`](super::AuthClient).

/// Errors from client calls.
#[derive(Debug)]
pub enum ClientError {
    /// Transport failure (connect, timeout, body decoding)
    Http(reqwest::Error),
    /// The path could not be joined onto the base URL
    Url(url::ParseError),
    /// The server answered with a non-success status
    Api { status: u16, message: String },
    /// The refresh endpoint refused the refresh cookie. Local auth state is cleared.
    RefreshRejected { status: u16, message: String },
    /// The refresh request itself failed. Local auth state is cleared.
    RefreshFailed(String),
    /// Authorization kept expiring after this many renewals.
    RetryLimit { attempts: u32 },
}

impl ClientError {
    /// Whether the caller has to sign in again.
    pub fn requires_signin(&self) -> bool {
        matches!(
            self,
            ClientError::RefreshRejected { .. }
                | ClientError::RefreshFailed(_)
                | ClientError::RetryLimit { .. }
        )
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Http(e) => write!(f, "HTTP error: {}", e),
            ClientError::Url(e) => write!(f, "Invalid URL: {}", e),
            ClientError::Api { status, message } => write!(f, "{} ({})", message, status),
            ClientError::RefreshRejected { status, message } => {
                write!(f, "Refresh rejected: {} ({})", message, status)
            }
            ClientError::RefreshFailed(e) => write!(f, "Refresh failed: {}", e),
            ClientError::RetryLimit { attempts } => {
                write!(f, "Authorization still expired after {} renewals", attempts)
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e)
    }
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::Url(e)
    }
}
