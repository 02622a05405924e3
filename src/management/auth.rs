use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    config,
    spotify::{SpotifyError, read_body, send},
    types::{Credentials, Token},
    utils,
};

/// Tokens closer than this many seconds to expiry are renewed before use.
pub const EXPIRY_SKEW_SECS: i64 = 30;

const MAX_TOKEN_BODY: usize = 1 << 20;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default, Clone)]
pub struct TokenManagerOptions {
    pub http: Option<reqwest::Client>,
    /// Accounts service base URL; the token endpoint is `<base>/api/token`.
    pub accounts_base: Option<String>,
    /// Optional on-disk token cache.
    pub cache_path: Option<PathBuf>,
    pub clock: Option<Clock>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error_description: String,
}

/// Owns the refresh token and the current access token.
///
/// All reads and writes of the cached token happen under one async mutex, so
/// at most one refresh request is in flight per manager; callers queued
/// behind it see the refreshed token instead of refreshing again.
pub struct TokenManager {
    credentials: Credentials,
    http: reqwest::Client,
    accounts_base: String,
    cache_path: Option<PathBuf>,
    clock: Clock,
    current: Mutex<Option<Token>>,
}

impl TokenManager {
    /// Creates a manager, hydrating the cache from disk when possible.
    pub async fn new(credentials: Credentials, options: TokenManagerOptions) -> Self {
        let base = options
            .accounts_base
            .as_deref()
            .map(|b| b.trim().trim_end_matches('/'))
            .filter(|b| !b.is_empty())
            .unwrap_or(config::DEFAULT_ACCOUNTS_BASE)
            .to_string();

        let cached = match &options.cache_path {
            Some(path) => Self::load(path).await,
            None => None,
        };

        TokenManager {
            credentials,
            http: options.http.unwrap_or_default(),
            accounts_base: base,
            cache_path: options.cache_path,
            clock: options.clock.unwrap_or_else(|| Arc::new(Utc::now) as Clock),
            current: Mutex::new(cached),
        }
    }

    /// Returns a usable access token, refreshing when the cached one is stale.
    pub async fn access_token(&self, cancel: &CancellationToken) -> Result<String, SpotifyError> {
        let mut current = self.lock(cancel).await?;

        if let Some(token) = current.as_ref() {
            if !token.access_token.is_empty() && self.is_fresh(token) {
                return Ok(token.access_token.clone());
            }
        }

        self.renew(&mut current, cancel).await
    }

    /// Refreshes unconditionally; used when the API rejects a token that
    /// still looks valid locally.
    pub async fn force_refresh(&self, cancel: &CancellationToken) -> Result<String, SpotifyError> {
        let mut current = self.lock(cancel).await?;
        self.renew(&mut current, cancel).await
    }

    async fn lock(
        &self,
        cancel: &CancellationToken,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<Token>>, SpotifyError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(SpotifyError::Cancelled),
            guard = self.current.lock() => Ok(guard),
        }
    }

    fn is_fresh(&self, token: &Token) -> bool {
        (self.clock)() + Duration::seconds(EXPIRY_SKEW_SECS) < token.expires_at
    }

    async fn renew(
        &self,
        current: &mut Option<Token>,
        cancel: &CancellationToken,
    ) -> Result<String, SpotifyError> {
        let token = self.refresh(cancel).await?;
        if let Err(e) = self.persist(&token).await {
            tracing::warn!(error = %e, "failed to write token cache");
        }
        let access = token.access_token.clone();
        *current = Some(token);
        Ok(access)
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<Token, SpotifyError> {
        let Some(refresh_token) = self.credentials.refresh_token.as_deref() else {
            return Err(SpotifyError::Config("missing SPOTIFY_REFRESH_TOKEN".into()));
        };
        if self.credentials.client_id.is_empty() {
            return Err(SpotifyError::Config("missing SPOTIFY_CLIENT_ID".into()));
        }

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let mut request = self.http.post(format!("{}/api/token", self.accounts_base));
        match self.credentials.secret() {
            Some(secret) => {
                request = request.basic_auth(&self.credentials.client_id, Some(secret));
            }
            None => form.push(("client_id", self.credentials.client_id.as_str())),
        }

        tracing::debug!(endpoint = %self.accounts_base, "refreshing access token");
        let response = send(request.form(&form), cancel).await?;
        let status = response.status();
        let body = read_body(response, MAX_TOKEN_BODY, cancel).await?;

        if !status.is_success() {
            if status == reqwest::StatusCode::BAD_REQUEST {
                if let Ok(e) = serde_json::from_slice::<OAuthErrorBody>(&body) {
                    if !e.error_description.is_empty() {
                        return Err(SpotifyError::Auth(format!(
                            "spotify token refresh failed: {}",
                            e.error_description
                        )));
                    }
                }
            }
            return Err(SpotifyError::Auth(format!(
                "spotify token refresh failed: {}: {}",
                status,
                utils::truncate(String::from_utf8_lossy(&body).trim(), 512)
            )));
        }

        let parsed: RefreshResponse = serde_json::from_slice(&body)
            .map_err(|e| SpotifyError::Auth(format!("decode token response: {e}")))?;
        if parsed.access_token.is_empty() {
            return Err(SpotifyError::Auth(
                "token response missing access_token".into(),
            ));
        }

        tracing::info!(expires_in = parsed.expires_in, "access token refreshed");
        Ok(Token {
            access_token: parsed.access_token,
            token_type: parsed.token_type,
            scope: parsed.scope,
            expires_at: (self.clock)() + Duration::seconds(parsed.expires_in),
        })
    }

    async fn load(path: &PathBuf) -> Option<Token> {
        let content = async_fs::read_to_string(path).await.ok()?;
        match serde_json::from_str::<Token>(&content) {
            Ok(token) if !token.access_token.is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "ignoring unreadable token cache");
                None
            }
        }
    }

    async fn persist(&self, token: &Token) -> std::io::Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                async_fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(token)?;
        let tmp = path.with_extension("tmp");
        // a stale tmp file may carry wider permissions
        match async_fs::remove_file(&tmp).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }

        let mut options = async_fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use async_fs::unix::OpenOptionsExt;
            options.mode(0o600);
        }
        drop(options.open(&tmp).await?);

        async_fs::write(&tmp, json).await?;
        async_fs::rename(&tmp, path).await
    }
}
