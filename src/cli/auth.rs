use std::io::{BufRead, Write};

use url::Url;

use crate::{
    Res,
    cli::{App, ExitError},
    config,
    spotify::auth::{
        self, AuthUrlOptions, ExchangeOptions, LoginOptions, authorization_url,
        exchange_authorization_code,
    },
    success,
    types::Credentials,
};

/// Prints the authorize URL for a manual login.
pub async fn auth_url(redirect_uri: &str, scopes: &[String], show_dialog: bool) -> Res<()> {
    let credentials = config::credentials()?;
    let url = authorization_url(
        &config::accounts_base(),
        &credentials.client_id,
        &AuthUrlOptions {
            redirect_uri: redirect_uri.to_string(),
            scopes: scopes.to_vec(),
            show_dialog,
            ..Default::default()
        },
    )?;
    println!("{url}");
    Ok(())
}

/// Pulls `code` out of a pasted redirect URL.
pub(crate) fn code_from_redirect_url(redirect_url: &str) -> Res<String> {
    let url = Url::parse(redirect_url)
        .map_err(|e| ExitError::usage(format!("invalid --redirect-url: {e}")))?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ExitError::usage("redirect URL missing code=...").into())
}

/// Exchanges a code from a manual login and prints the refresh token.
pub async fn auth_exchange(
    app: &App,
    redirect_uri: &str,
    code: Option<&str>,
    redirect_url: Option<&str>,
) -> Res<()> {
    let code = match (code.map(str::trim).filter(|c| !c.is_empty()), redirect_url) {
        (Some(code), _) => code.to_string(),
        (None, Some(url)) => code_from_redirect_url(url)?,
        (None, None) => return Err(ExitError::usage("must supply --code or --redirect-url").into()),
    };

    let credentials = config::credentials()?;
    let result = exchange_authorization_code(
        &app.http,
        &config::accounts_base(),
        &credentials,
        &code,
        &ExchangeOptions {
            redirect_uri: redirect_uri.to_string(),
            code_verifier: None,
        },
        &app.cancel,
    )
    .await?;

    println!("{}", result.refresh_token);
    success!("Store this as SPOTIFY_REFRESH_TOKEN (value or file).");
    Ok(())
}

/// Reads `key` from the environment, asking on stderr/stdin when unset.
fn read_secret_or_prompt(key: &str) -> Res<String> {
    if let Some(value) = config::resolve_secret(key)? {
        return Ok(value);
    }
    eprint!("{key}: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let value = line.trim();
    if value.is_empty() {
        return Err(ExitError::usage(format!("missing {key}")).into());
    }
    Ok(value.to_string())
}

/// Interactive login through the local HTTPS callback server.
///
/// Prints only the refresh token on stdout so it can be piped into a secret
/// store.
pub async fn auth_login(
    app: &App,
    redirect_uri: &str,
    scopes: &[String],
    show_dialog: bool,
    open_browser: bool,
) -> Res<()> {
    let credentials = Credentials::new(
        read_secret_or_prompt("SPOTIFY_CLIENT_ID")?,
        config::resolve_secret("SPOTIFY_CLIENT_SECRET")?,
        None,
    );
    if credentials.secret().is_none() {
        tracing::info!("no client secret configured, logging in with PKCE");
    }

    let result = auth::login(
        &app.http,
        &credentials,
        &LoginOptions {
            accounts_base: config::accounts_base(),
            redirect_uri: redirect_uri.to_string(),
            scopes: scopes.to_vec(),
            show_dialog,
            open_browser,
        },
        &app.cancel,
    )
    .await?;

    println!("{}", result.refresh_token);
    success!("OK. Use this as SPOTIFY_REFRESH_TOKEN (value or file).");
    Ok(())
}
