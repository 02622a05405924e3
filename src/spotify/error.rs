use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by the auth and transport layers.
///
/// Variants map onto how a caller should react: fix configuration, restart
/// the login, wait, or report the API failure.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Bad redirect URI, missing credentials and similar. Raised before any
    /// network activity.
    #[error("configuration error: {0}")]
    Config(String),

    /// The authorization server rejected a code exchange or refresh.
    #[error("{0}")]
    Auth(String),

    /// Web API failure that survived the retry policy.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The server asked us to wait longer than the configured maximum.
    #[error("rate limited (Retry-After={retry_after}s); wait then retry")]
    RateLimited { retry_after: u64, body: String },

    #[error("operation cancelled")]
    Cancelled,

    /// A lookup the caller depends on came back empty.
    #[error("{0}")]
    NotFound(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls setup failed: {0}")]
    Tls(String),
}

impl SpotifyError {
    /// HTTP status carried by classified errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            SpotifyError::Api(e) => Some(e.status),
            SpotifyError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SpotifyError::Cancelled)
    }
}

/// Structured error returned by the Web API.
///
/// Most endpoints respond with `{"error":{"status":403,"message":"..."}}`;
/// the HTTP status code is kept next to the parsed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub body: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = if !self.message.is_empty() {
            self.message.as_str()
        } else if !self.body.is_empty() {
            self.body.as_str()
        } else {
            "spotify api error"
        };
        write!(f, "spotify api error ({}): {}", self.status, msg)
    }
}

impl std::error::Error for ApiError {}

/// Builds an [`ApiError`] from a final response.
///
/// Prefers the server's `error.message`, then the raw body, then the status line.
pub fn decode_api_error(status: StatusCode, body: &[u8]) -> ApiError {
    let raw = String::from_utf8_lossy(body).trim().to_string();

    let message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .filter(|m| !m.is_empty());

    match message {
        Some(message) => ApiError {
            status: status.as_u16(),
            message,
            body: raw,
        },
        None => {
            let msg = if raw.is_empty() {
                status.to_string()
            } else {
                raw
            };
            ApiError {
                status: status.as_u16(),
                message: msg.clone(),
                body: msg,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_message_wins() {
        let e = decode_api_error(
            StatusCode::NOT_FOUND,
            br#"{"error":{"status":404,"message":"No active device found"}}"#,
        );
        assert_eq!(e.status, 404);
        assert_eq!(e.message, "No active device found");
        assert_eq!(
            e.to_string(),
            "spotify api error (404): No active device found"
        );
    }

    #[test]
    fn falls_back_to_body_then_status_line() {
        let e = decode_api_error(StatusCode::BAD_GATEWAY, b"  upstream broke \n");
        assert_eq!(e.message, "upstream broke");

        let e = decode_api_error(StatusCode::SERVICE_UNAVAILABLE, b"");
        assert_eq!(e.message, "503 Service Unavailable");
    }

    #[test]
    fn rate_limited_reports_429() {
        let e = SpotifyError::RateLimited {
            retry_after: 20,
            body: String::new(),
        };
        assert_eq!(e.status(), Some(429));
        assert!(e.to_string().contains("Retry-After=20s"));
    }
}
