use thiserror::Error;

/// Longest body excerpt carried in a `Server` error
const EXCERPT_LEN: usize = 200;

/// Why a session request failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// No connection could be made (refused, DNS, reset)
    #[error("server unreachable: {0}")]
    Unreachable(String),
    /// The request did not finish within the configured timeout
    #[error("server did not answer within {0:.1}s")]
    Timeout(f32),
    /// The server answered with a non-2xx status
    #[error("server returned HTTP {status}: {excerpt}")]
    Server { status: u16, excerpt: String },
    /// A 2xx body that cannot yield a snapshot
    #[error("response body unparseable: {0}")]
    Unparseable(String),
    /// The request could not be built or sent for another reason
    #[error("request failed: {0}")]
    Request(String),
}

impl ClientError {
    /// Server error from a status code and raw body
    ///
    /// Uses the server's `{"error": "..."}` message when there is one,
    /// otherwise the first characters of the body.
    pub fn server(status: u16, body: &str) -> Self {
        let excerpt = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().chars().take(EXCERPT_LEN).collect());
        ClientError::Server { status, excerpt }
    }

    /// Failures that mean the server could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable(_) | ClientError::Timeout(_))
    }

    /// Status line shown by the presentation layer
    pub fn status_message(&self) -> String {
        match self {
            ClientError::Unreachable(_) | ClientError::Timeout(_) => {
                format!("Cannot reach server ({self})")
            }
            ClientError::Server { status, excerpt } => {
                format!("Server rejected request (HTTP {status}: {excerpt})")
            }
            ClientError::Unparseable(detail) => format!("Track data invalid ({detail})"),
            ClientError::Request(detail) => format!("Request failed ({detail})"),
        }
    }
}
