//! Configuration management for spotctl.
//!
//! Settings come from environment variables, optionally seeded from a `.env`
//! file in the local data directory:
//!
//! 1. Process environment (highest priority)
//! 2. `<data_local_dir>/spotctl/.env`
//! 3. Built-in defaults
//!
//! Secrets (`SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`,
//! `SPOTIFY_REFRESH_TOKEN`) may be given directly, through a `<KEY>_FILE`
//! variable, or as a value that looks like a path (contains `/` or starts with
//! `~`), in which case the file's trimmed contents are used.

use std::{env, path::PathBuf, time::Duration};

use crate::{
    spotify::{SpotifyError, retry::DEFAULT_MAX_RETRY_AFTER},
    types::Credentials,
};

pub const APP_NAME: &str = "spotctl";

pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com";

pub const DEFAULT_SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
    "playlist-modify-private",
    "playlist-modify-public",
    "user-read-private",
];

/// Fixed `User-Agent` sent with every Web API request.
pub fn default_user_agent() -> String {
    format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION"))
}

/// Path of the optional `.env` file.
pub fn env_file_path() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_NAME);
    path.push(".env");
    path
}

/// Loads `<data_local_dir>/spotctl/.env` into the process environment.
///
/// A missing file is not an error; variables already set in the environment
/// are left untouched.
pub fn load_env() -> Result<(), SpotifyError> {
    let path = env_file_path();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no .env file");
        return Ok(());
    }
    dotenv::from_path(&path).map_err(|e| {
        SpotifyError::Config(format!("load {}: {e}", path.display()))
    })?;
    tracing::debug!(path = %path.display(), "loaded .env file");
    Ok(())
}

/// Reads an environment variable, treating blank values as unset.
pub fn var(key: &str) -> Option<String> {
    env_lookup(key)
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Expands a leading `~` or `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(h) = dirs::home_dir() {
            return h;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(h) = dirs::home_dir() {
            return h.join(rest);
        }
    }
    PathBuf::from(path)
}

fn read_secret_file(key: &str, path: &str) -> Result<String, SpotifyError> {
    let content = std::fs::read_to_string(expand_home(path))
        .map_err(|e| SpotifyError::Config(format!("read {key} file {path}: {e}")))?;
    let value = content.trim();
    if value.is_empty() {
        return Err(SpotifyError::Config(format!("{key} file is empty: {path}")));
    }
    Ok(value.to_string())
}

/// Resolves a secret through `lookup`, honouring `<KEY>_FILE` and path-like
/// values. Returns `Ok(None)` when neither is set.
pub fn resolve_secret_with<F>(key: &str, lookup: F) -> Result<Option<String>, SpotifyError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(&format!("{key}_FILE")) {
        return read_secret_file(&format!("{key}_FILE"), &path).map(Some);
    }

    match lookup(key) {
        Some(v) if v.contains('/') || v.starts_with('~') => read_secret_file(key, &v).map(Some),
        other => Ok(other),
    }
}

/// Resolves a secret from the process environment.
pub fn resolve_secret(key: &str) -> Result<Option<String>, SpotifyError> {
    resolve_secret_with(key, env_lookup)
}

/// Loads client credentials from the environment.
///
/// `SPOTIFY_CLIENT_ID` is required; the secret and refresh token are
/// optional here and checked by whoever needs them.
pub fn credentials() -> Result<Credentials, SpotifyError> {
    credentials_with(env_lookup)
}

pub fn credentials_with<F>(lookup: F) -> Result<Credentials, SpotifyError>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = resolve_secret_with("SPOTIFY_CLIENT_ID", &lookup)?
        .ok_or_else(|| SpotifyError::Config("missing SPOTIFY_CLIENT_ID".into()))?;
    Ok(Credentials::new(
        client_id,
        resolve_secret_with("SPOTIFY_CLIENT_SECRET", &lookup)?,
        resolve_secret_with("SPOTIFY_REFRESH_TOKEN", &lookup)?,
    ))
}

pub fn accounts_base() -> String {
    var("SPOTIFY_ACCOUNTS_BASE").unwrap_or_else(|| DEFAULT_ACCOUNTS_BASE.to_string())
}

pub fn api_base() -> String {
    var("SPOTIFY_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}

pub fn token_cache_path() -> Option<PathBuf> {
    var("SPOTCTL_TOKEN_CACHE").map(|p| expand_home(&p))
}

/// Longest `Retry-After` the transport will sleep for.
pub fn max_retry_after() -> Duration {
    max_retry_after_with(env_lookup)
}

/// Non-numeric or non-positive values fall back to the default.
pub fn max_retry_after_with<F>(lookup: F) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup("SPOTCTL_MAX_RETRY_AFTER_SECS")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_MAX_RETRY_AFTER)
}

pub fn user_agent() -> String {
    var("SPOTCTL_USER_AGENT").unwrap_or_else(default_user_agent)
}

fn flag(key: &str) -> bool {
    var(key).is_some_and(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
}

pub fn debug() -> bool {
    flag("SPOTCTL_DEBUG")
}

pub fn debug_http() -> bool {
    flag("SPOTCTL_DEBUG_HTTP")
}
