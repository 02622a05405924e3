//! # CLI Module
//!
//! Command implementations for the `spotctl` binary. Each command parses
//! nothing itself (clap does that in `main.rs`); it receives typed options,
//! talks to Spotify through [`crate::spotify::Client`] and prints the result.
//!
//! ## Command Categories
//!
//! ### Playback
//!
//! - [`device_list`], [`status`], [`transfer`], [`play`], [`pause`],
//!   [`next`], [`previous`], [`volume`]
//!
//! ### Catalog
//!
//! - [`search_tracks`]
//!
//! ### Playlists
//!
//! - [`playlist_create`], [`playlist_add`], [`playlist_add_query`],
//!   [`playlist_privacy`], [`playlist_cleanup`]
//!
//! ### Authentication
//!
//! - [`auth_url`], [`auth_exchange`], [`auth_login`]
//!
//! ## Output
//!
//! Results go to stdout, either as text or (`--json`) pretty-printed JSON.
//! Status lines, warnings and errors go to stderr through the crate's
//! `info!`/`success!`/`warning!`/`error!` macros.
//!
//! ## Exit Codes
//!
//! | code | meaning                         |
//! |------|---------------------------------|
//! | 0    | success                         |
//! | 1    | runtime or API failure          |
//! | 2    | usage error                     |
//! | 3    | requested device not available  |
//! | 130  | cancelled (Ctrl-C)              |

use std::{error::Error, sync::Arc};

use serde::Serialize;
use tabled::{Table, settings::Style};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    Res, config,
    management::{TokenManager, TokenManagerOptions},
    spotify::{self, Client, ClientOptions, RetryPolicy, SpotifyError},
    types::{Device, DeviceTableRow},
};

mod auth;
mod player;
mod playlist;
mod search;

pub use auth::auth_exchange;
pub use auth::auth_login;
pub use auth::auth_url;
pub use player::device_list;
pub use player::next;
pub use player::pause;
pub use player::play;
pub use player::previous;
pub use player::status;
pub use player::transfer;
pub use player::volume;
pub use playlist::CleanupOptions;
pub use playlist::DEFAULT_CLEANUP_PREFIX;
pub use playlist::playlist_add;
pub use playlist::playlist_add_query;
pub use playlist::playlist_cleanup;
pub use playlist::playlist_create;
pub use playlist::playlist_privacy;
pub use playlist::read_queries;
pub use search::search_tracks;

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_DEVICE_UNAVAILABLE: i32 = 3;
pub const EXIT_CANCELLED: i32 = 130;

/// An error that carries its own process exit code.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_USAGE,
            message: message.into(),
        }
    }

    pub fn device_unavailable(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_DEVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

/// Maps an error to the process exit code.
pub fn exit_code(err: &(dyn Error + 'static)) -> i32 {
    if let Some(e) = err.downcast_ref::<ExitError>() {
        return e.code;
    }
    match err.downcast_ref::<SpotifyError>() {
        Some(SpotifyError::Cancelled) => EXIT_CANCELLED,
        _ => EXIT_FAILURE,
    }
}

/// Turns well-known Web API failures into actionable advice.
pub fn humanize(err: &(dyn Error + 'static)) -> String {
    let api = match err.downcast_ref::<SpotifyError>() {
        Some(SpotifyError::Api(api)) => Some(api),
        _ => err.downcast_ref::<spotify::ApiError>(),
    };

    if let Some(api) = api {
        let m = api.message.as_str();
        if api.status == 403 && m.contains("Cannot control device volume") {
            return "Spotify won't let us change volume for that device via Web API. \
                    Adjust volume on the device and retry"
                .into();
        }
        if api.status == 403 && m.contains("Restriction violated") {
            return "Spotify refused that command (restriction). Try again on a different \
                    device (Desktop usually works) or start playback in-app first"
                .into();
        }
        if api.status == 404 && m.contains("No active device") {
            return "No active Spotify device. Open Spotify on the target device, then retry"
                .into();
        }
    }
    err.to_string()
}

/// Renders devices as a table, active device first, then by name.
pub fn format_devices(devices: &[Device]) -> String {
    if devices.is_empty() {
        return "(no devices)".into();
    }
    let mut sorted = devices.to_vec();
    sorted.sort_by(|a, b| {
        b.is_active
            .cmp(&a.is_active)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    let rows: Vec<DeviceTableRow> = sorted.iter().map(DeviceTableRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Message for a `--device` selector that matched nothing.
pub fn strict_device_message(selector: &str, devices: &[Device]) -> String {
    let msg = format!(
        "Spotify device not available: {selector:?}\nOpen Spotify on that device, then retry.\n"
    );
    if devices.is_empty() {
        return msg + "No devices reported by Spotify.";
    }
    msg + "Available devices:\n" + &format_devices(devices)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Res<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shared state for one CLI invocation.
pub struct App {
    pub http: reqwest::Client,
    pub cancel: CancellationToken,
}

impl App {
    pub fn new(cancel: CancellationToken) -> Res<Self> {
        Ok(Self {
            http: spotify::default_http_client(None)?,
            cancel,
        })
    }

    /// Builds an authenticated client from the environment.
    pub async fn client(&self) -> Res<Client> {
        let credentials = config::credentials()?;
        if credentials.refresh_token.is_none() {
            return Err(SpotifyError::Config(
                "missing SPOTIFY_REFRESH_TOKEN (run `spotctl auth login` first)".into(),
            )
            .into());
        }

        let tokens = TokenManager::new(
            credentials,
            TokenManagerOptions {
                http: Some(self.http.clone()),
                accounts_base: Some(config::accounts_base()),
                cache_path: config::token_cache_path(),
                clock: None,
            },
        )
        .await;

        Ok(Client::new(
            Arc::new(tokens),
            ClientOptions {
                http: Some(self.http.clone()),
                api_base: config::api_base(),
                user_agent: config::user_agent(),
                retry: RetryPolicy::default().with_max_retry_after(config::max_retry_after()),
            },
        ))
    }
}

/// Resolves `selector` to a device or fails with exit code 3.
pub(crate) async fn require_device(app: &App, client: &Client, selector: &str) -> Res<Device> {
    let found = client.resolve_device(&app.cancel, selector).await?;
    match found.device {
        Some(device) => Ok(device),
        None => Err(ExitError::device_unavailable(strict_device_message(selector, &found.devices)).into()),
    }
}

/// Like [`require_device`], but `None` passes through as "current device".
pub(crate) async fn optional_device(
    app: &App,
    client: &Client,
    selector: Option<&str>,
) -> Res<Option<String>> {
    match selector {
        Some(s) => Ok(Some(require_device(app, client, s).await?.id)),
        None => Ok(None),
    }
}
