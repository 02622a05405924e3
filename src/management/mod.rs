mod auth;

pub use auth::Clock;
pub use auth::EXPIRY_SKEW_SECS;
pub use auth::TokenManager;
pub use auth::TokenManagerOptions;
