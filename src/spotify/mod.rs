//! # Spotify Integration Module
//!
//! Authenticated access to the Spotify Web API and the accounts service.
//!
//! ## Architecture
//!
//! ```text
//! CLI layer
//!     ↓
//! Resource calls (player, search, playlist)
//!     ↓
//! Client::call  ── retry policy (401 → refresh, 429 → wait, 5xx → backoff)
//!     ↓                 ↑
//! reqwest          TokenManager (refresh token → access token, cache file)
//! ```
//!
//! ## Modules
//!
//! - [`auth`] - authorize URL, authorization-code exchange and the
//!   interactive login that drives [`crate::server::CallbackServer`]
//! - [`retry`] - the ordered, table-driven retry rules used by every call
//! - [`uri`] - normalizes URIs, open.spotify.com links and bare ids
//! - `client` - the resilient transport ([`Client`], [`ApiRequest`])
//! - `player`, `search`, `playlist` - typed wrappers over individual
//!   endpoints, implemented as methods on [`Client`]
//!
//! ## Errors
//!
//! Everything returns [`SpotifyError`]. API failures keep their HTTP status
//! and the server's message in [`ApiError`] so the CLI can turn well-known
//! failures (no active device, restricted device) into actionable text.
//!
//! ## Cancellation
//!
//! Every operation takes a [`tokio_util::sync::CancellationToken`]. Token
//! refresh, HTTP round trips, retry sleeps and the login callback wait all
//! return [`SpotifyError::Cancelled`] promptly once it fires.

pub mod auth;
pub mod retry;
pub mod uri;

mod client;
mod error;
mod player;
mod playlist;
mod search;

pub use client::ApiRequest;
pub use client::Client;
pub use client::ClientOptions;
pub use client::DEFAULT_HTTP_TIMEOUT;
pub use client::MAX_API_BODY;
pub use client::default_http_client;
pub use client::read_body;
pub use client::send;
pub use error::ApiError;
pub use error::SpotifyError;
pub use error::decode_api_error;
pub use player::DeviceMatch;
pub use player::match_device;
pub use playlist::MAX_PLAYLIST_PAGES;
pub use playlist::PLAYLIST_PAGE_SIZE;
pub use retry::RetryPolicy;
pub use search::MAX_TRACK_IDS;
pub use search::clamp_limit;
