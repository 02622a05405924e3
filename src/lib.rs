//! Spotify remote control library.
//!
//! This library provides the pieces behind the `spotctl` binary: the OAuth2
//! authorization-code login (with an ephemeral local HTTPS callback server),
//! a token manager that turns a refresh token into short-lived access tokens,
//! and a resilient Web API client that retries on expired tokens, rate limits
//! and transient server errors.
//!
//! # Modules
//!
//! - `api` - HTTP handlers for the local callback server
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `management` - Token cache and refresh management
//! - `server` - Local HTTPS server for OAuth callbacks
//! - `spotify` - Spotify Web API client implementation
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use spotctl::{config, management::{TokenManager, TokenManagerOptions}, spotify::{Client, ClientOptions}};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> spotctl::Res<()> {
//!     config::load_env()?;
//!     let tokens = TokenManager::new(config::credentials()?, TokenManagerOptions::default()).await;
//!     let client = Client::new(Arc::new(tokens), ClientOptions::default());
//!     for device in client.devices(&CancellationToken::new()).await? {
//!         println!("{}", device.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod management;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

/// A convenient Result type alias for operations that may fail.
///
/// Provides a standard error handling pattern for the command layer using a
/// boxed dynamic error trait object. Library code returns
/// [`spotify::SpotifyError`] instead, which converts into this box with `?`.
///
/// # Type Parameters
///
/// - `T` - The success type returned on successful operations
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// Status lines go to stderr so that stdout stays clean for values meant to be
/// piped, such as refresh tokens and JSON output.
///
/// # Example
///
/// ```
/// # use spotctl::info;
/// info!("Starting local HTTPS callback server...");
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// # Example
///
/// ```
/// # use spotctl::success;
/// success!("Authentication completed successfully");
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark.
///
/// The caller decides the exit code; see [`cli::exit_code`].
///
/// # Example
///
/// ```
/// # use spotctl::error;
/// let var_name = "SPOTIFY_CLIENT_ID";
/// error!("Missing required environment variable: {}", var_name);
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Used for recoverable issues that users should notice.
///
/// # Example
///
/// ```
/// # use spotctl::warning;
/// warning!("Failed to open browser; open the URL manually");
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
