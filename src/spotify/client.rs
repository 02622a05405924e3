use std::{sync::Arc, time::Duration};

use reqwest::{
    Method, Response, StatusCode,
    header::{RETRY_AFTER, USER_AGENT},
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    config,
    management::TokenManager,
    spotify::{
        SpotifyError, decode_api_error,
        retry::{self, Decision, RetryPolicy, RetryState},
    },
};

/// Web API responses larger than this are rejected.
pub const MAX_API_BODY: usize = 2 << 20;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Builds the shared HTTP client with the default request timeout.
pub fn default_http_client(timeout: Option<Duration>) -> Result<reqwest::Client, SpotifyError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))
        .build()?)
}

/// Reads a response body, bailing out once it exceeds `limit` bytes.
pub async fn read_body(
    mut response: Response,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, SpotifyError> {
    let mut body = Vec::new();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(SpotifyError::Cancelled),
            chunk = response.chunk() => chunk?,
        };
        let Some(chunk) = chunk else {
            return Ok(body);
        };
        if body.len() + chunk.len() > limit {
            return Err(SpotifyError::ResponseTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
}

/// Sends a request unless `cancel` fires first.
pub async fn send(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<Response, SpotifyError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SpotifyError::Cancelled),
        response = request.send() => Ok(response?),
    }
}

/// One logical Web API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    expected: Vec<u16>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            expected: vec![200],
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Statuses accepted as success; defaults to `[200]`.
    pub fn expect(mut self, statuses: &[u16]) -> Self {
        self.expected = statuses.to_vec();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub http: Option<reqwest::Client>,
    pub api_base: String,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            http: None,
            api_base: config::DEFAULT_API_BASE.to_string(),
            user_agent: config::default_user_agent(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Authenticated Web API client.
///
/// Every call goes through [`Client::call`], which attaches a bearer token from
/// the shared [`TokenManager`] and applies the [`RetryPolicy`].
pub struct Client {
    tokens: Arc<TokenManager>,
    http: reqwest::Client,
    api_base: String,
    user_agent: String,
    retry: RetryPolicy,
}

impl Client {
    pub fn new(tokens: Arc<TokenManager>, options: ClientOptions) -> Self {
        let api_base = options.api_base.trim_end_matches('/');
        Self {
            tokens,
            http: options.http.unwrap_or_default(),
            api_base: if api_base.is_empty() {
                config::DEFAULT_API_BASE.to_string()
            } else {
                api_base.to_string()
            },
            user_agent: if options.user_agent.is_empty() {
                config::default_user_agent()
            } else {
                options.user_agent
            },
            retry: options.retry,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Performs a call and decodes the body into `T`.
    ///
    /// Returns `Ok(None)` when the status was expected but the body is empty
    /// (typically 204).
    pub async fn call<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        request: ApiRequest,
    ) -> Result<Option<T>, SpotifyError> {
        let (status, body) = self.perform(cancel, &request).await?;
        check_status(&request, status, &body)?;
        decode(&body)
    }

    /// Performs a call whose body is not needed; the body is never parsed.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: ApiRequest,
    ) -> Result<(), SpotifyError> {
        let (status, body) = self.perform(cancel, &request).await?;
        check_status(&request, status, &body)
    }

    /// Runs the retry loop and returns the final status and body.
    async fn perform(
        &self,
        cancel: &CancellationToken,
        request: &ApiRequest,
    ) -> Result<(StatusCode, Vec<u8>), SpotifyError> {
        let url = format!("{}{}", self.api_base, request.path);
        let mut state = RetryState::default();
        let mut force_refresh = false;

        loop {
            let (status, retry_after, body) = self
                .attempt(cancel, request, &url, force_refresh)
                .await?;
            force_refresh = false;

            match self.retry.decide(&mut state, status, retry_after.as_deref()) {
                Decision::Done => return Ok((status, body)),
                Decision::RefreshAndRetry => {
                    tracing::info!(path = %request.path, "access token rejected, refreshing");
                    force_refresh = true;
                }
                Decision::RetryAfter(delay) => {
                    tracing::warn!(
                        path = %request.path,
                        status = status.as_u16(),
                        delay_ms = delay.as_millis() as u64,
                        "retrying spotify request"
                    );
                    retry::pause(cancel, delay).await?;
                }
                Decision::RateLimitExceeded(secs) => {
                    return Err(SpotifyError::RateLimited {
                        retry_after: secs,
                        body: String::from_utf8_lossy(&body).trim().to_string(),
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        cancel: &CancellationToken,
        request: &ApiRequest,
        url: &str,
        force_refresh: bool,
    ) -> Result<(StatusCode, Option<String>, Vec<u8>), SpotifyError> {
        let token = if force_refresh {
            self.tokens.force_refresh(cancel).await?
        } else {
            self.tokens.access_token(cancel).await?
        };

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .bearer_auth(token)
            .header(USER_AGENT, &self.user_agent);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = send(builder, cancel).await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = read_body(response, MAX_API_BODY, cancel).await?;

        tracing::debug!(
            method = %request.method,
            url,
            status = status.as_u16(),
            "spotify http"
        );
        Ok((status, retry_after, body))
    }
}

fn check_status(request: &ApiRequest, status: StatusCode, body: &[u8]) -> Result<(), SpotifyError> {
    if request.expected.contains(&status.as_u16()) {
        Ok(())
    } else {
        Err(decode_api_error(status, body).into())
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, SpotifyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(body)?))
}
