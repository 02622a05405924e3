use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    info,
    server::CallbackServer,
    spotify::{SpotifyError, read_body, send},
    types::{AuthCodeExchangeResult, CallbackResult, Credentials},
    utils, warning,
};

const MAX_EXCHANGE_BODY: usize = 1 << 20;

#[derive(Debug, Clone, Default)]
pub struct AuthUrlOptions {
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub show_dialog: bool,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    /// Defaults to `S256` when a challenge is set.
    pub code_challenge_method: Option<String>,
}

/// Builds the authorize URL the user opens in a browser.
pub fn authorization_url(
    accounts_base: &str,
    client_id: &str,
    options: &AuthUrlOptions,
) -> Result<String, SpotifyError> {
    let base = accounts_base.trim_end_matches('/');
    let mut url = Url::parse(&format!("{base}/authorize"))
        .map_err(|e| SpotifyError::Config(format!("invalid accounts base {base}: {e}")))?;

    {
        let mut q = url.query_pairs_mut();
        q.append_pair("client_id", client_id);
        q.append_pair("response_type", "code");
        q.append_pair("redirect_uri", &options.redirect_uri);
        if !options.scopes.is_empty() {
            q.append_pair("scope", &options.scopes.join(" "));
        }
        if options.show_dialog {
            q.append_pair("show_dialog", "true");
        }
        if let Some(state) = options.state.as_deref().filter(|s| !s.is_empty()) {
            q.append_pair("state", state);
        }
        if let Some(challenge) = options.code_challenge.as_deref().filter(|c| !c.is_empty()) {
            q.append_pair("code_challenge", challenge);
            q.append_pair(
                "code_challenge_method",
                options.code_challenge_method.as_deref().unwrap_or("S256"),
            );
        }
    }

    Ok(url.into())
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeOptions {
    pub redirect_uri: String,
    /// PKCE verifier, sent unmodified.
    pub code_verifier: Option<String>,
}

/// Trades an authorization code for access and refresh tokens.
///
/// Rejections are final; a code cannot be retried.
pub async fn exchange_authorization_code(
    http: &reqwest::Client,
    accounts_base: &str,
    credentials: &Credentials,
    code: &str,
    options: &ExchangeOptions,
    cancel: &CancellationToken,
) -> Result<AuthCodeExchangeResult, SpotifyError> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", options.redirect_uri.as_str()),
    ];
    if let Some(verifier) = options.code_verifier.as_deref().filter(|v| !v.is_empty()) {
        form.push(("code_verifier", verifier));
    }

    let endpoint = format!("{}/api/token", accounts_base.trim_end_matches('/'));
    let mut request = http.post(endpoint);
    match credentials.secret() {
        Some(secret) => request = request.basic_auth(&credentials.client_id, Some(secret)),
        // public client: identify in the body
        None => form.push(("client_id", credentials.client_id.as_str())),
    }

    let response = send(request.form(&form), cancel).await?;
    let status = response.status();
    let body = read_body(response, MAX_EXCHANGE_BODY, cancel).await?;

    if !status.is_success() {
        return Err(SpotifyError::Auth(format!(
            "spotify token exchange failed: {}: {}",
            status,
            utils::truncate(String::from_utf8_lossy(&body).trim(), 512)
        )));
    }

    let result: AuthCodeExchangeResult = serde_json::from_slice(&body)?;
    if result.refresh_token.is_empty() {
        return Err(SpotifyError::Auth(
            "exchange response missing refresh_token".into(),
        ));
    }
    Ok(result)
}

#[derive(Debug, Clone)]
pub struct LoginOptions {
    pub accounts_base: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub show_dialog: bool,
    pub open_browser: bool,
}

/// Runs the interactive login: local callback server, browser consent,
/// code exchange.
///
/// PKCE is used when the credentials carry no client secret. The callback
/// server is closed on every exit path.
pub async fn login(
    http: &reqwest::Client,
    credentials: &Credentials,
    options: &LoginOptions,
    cancel: &CancellationToken,
) -> Result<AuthCodeExchangeResult, SpotifyError> {
    let state = utils::random_state();
    let pkce = credentials.secret().is_none().then(utils::generate_pkce_pair);

    info!("Starting local HTTPS callback server (browser will warn about self-signed cert)...");
    let mut server = CallbackServer::start(&options.redirect_uri).await?;

    let auth_url = authorization_url(
        &options.accounts_base,
        &credentials.client_id,
        &AuthUrlOptions {
            redirect_uri: server.redirect_url().to_string(),
            scopes: options.scopes.clone(),
            show_dialog: options.show_dialog,
            state: Some(state.clone()),
            code_challenge: pkce.as_ref().map(|p| p.challenge.clone()),
            code_challenge_method: None,
        },
    )?;

    info!("Open this URL if your browser didn't open automatically:\n{}", auth_url);
    if options.open_browser && webbrowser::open(&auth_url).is_err() {
        warning!("Failed to open browser. Please navigate to the URL above manually.");
    }

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message("Waiting for browser consent...");
    let waited = server.wait(cancel).await;
    pb.finish_and_clear();
    server.close();
    let code = callback_code(waited?, &state)?;

    exchange_authorization_code(
        http,
        &options.accounts_base,
        credentials,
        &code,
        &ExchangeOptions {
            redirect_uri: server.redirect_url().to_string(),
            code_verifier: pkce.map(|p| p.verifier),
        },
        cancel,
    )
    .await
}

/// Validates a redirect against the `state` sent with the authorize URL and
/// returns its code. A missing `state` counts as a mismatch.
fn callback_code(result: CallbackResult, expected_state: &str) -> Result<String, SpotifyError> {
    if !result.error.is_empty() {
        return Err(SpotifyError::Auth(format!(
            "spotify auth error: {}",
            result.error
        )));
    }
    if result.state != expected_state {
        return Err(SpotifyError::Auth("spotify callback state mismatch".into()));
    }
    if result.code.is_empty() {
        return Err(SpotifyError::Auth("spotify callback missing code".into()));
    }
    Ok(result.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect(code: &str, state: &str, error: &str) -> CallbackResult {
        CallbackResult {
            code: code.into(),
            state: state.into(),
            error: error.into(),
        }
    }

    #[test]
    fn matching_state_yields_code() {
        assert_eq!(callback_code(redirect("abc", "s1", ""), "s1").unwrap(), "abc");
    }

    #[test]
    fn missing_or_wrong_state_is_rejected() {
        for state in ["", "other"] {
            let err = callback_code(redirect("abc", state, ""), "s1").unwrap_err();
            assert!(err.to_string().contains("state mismatch"), "state {state:?}");
        }
    }

    #[test]
    fn error_and_missing_code_are_rejected() {
        let err = callback_code(redirect("", "s1", "access_denied"), "s1").unwrap_err();
        assert!(err.to_string().contains("access_denied"));

        let err = callback_code(redirect("", "s1", ""), "s1").unwrap_err();
        assert!(err.to_string().contains("missing code"));
    }
}
