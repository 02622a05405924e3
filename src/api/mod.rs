//! # API Module
//!
//! HTTP handlers mounted by the local callback server during interactive
//! login.
//!
//! The only route is the OAuth redirect target. Spotify's authorization
//! server sends the browser there with `code`, `state` or `error` query
//! parameters; [`callback`] forwards them to the waiting
//! [`crate::server::CallbackServer`] and renders a short confirmation page.
//!
//! ```rust,ignore
//! use axum::{Extension, Router, routing::get};
//!
//! let app = Router::new().route("/callback", get(callback).layer(Extension(slot)));
//! ```

mod callback;

pub use callback::callback;
