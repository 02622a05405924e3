//! Retry policy for Web API calls.
//!
//! The policy is an ordered table of rules. Each response is matched against
//! the rules starting at the one that fired last; once a later rule has fired,
//! earlier rules no longer apply to that call. A rule with no budget left is
//! skipped, and when nothing matches the response is final.

use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::spotify::SpotifyError;

pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(15);
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryRule {
    /// 401: force a token refresh and retry once.
    Unauthorized,
    /// 429 with a usable `Retry-After`: wait and retry once.
    RateLimited,
    /// 5xx: linear backoff, two more attempts.
    ServerError,
}

impl RetryRule {
    pub const ORDER: [RetryRule; 3] = [
        RetryRule::Unauthorized,
        RetryRule::RateLimited,
        RetryRule::ServerError,
    ];

    fn matches(self, status: StatusCode) -> bool {
        match self {
            RetryRule::Unauthorized => status == StatusCode::UNAUTHORIZED,
            RetryRule::RateLimited => status == StatusCode::TOO_MANY_REQUESTS,
            RetryRule::ServerError => status.is_server_error(),
        }
    }

    fn budget(self) -> u32 {
        match self {
            RetryRule::Unauthorized | RetryRule::RateLimited => 1,
            RetryRule::ServerError => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Hand the response to the caller.
    Done,
    RefreshAndRetry,
    RetryAfter(Duration),
    /// `Retry-After` (seconds) exceeds the configured maximum.
    RateLimitExceeded(u64),
}

/// Per-call bookkeeping: which rule fired last and how often.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    stage: usize,
    used: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub rules: Vec<RetryRule>,
    pub max_retry_after: Duration,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rules: RetryRule::ORDER.to_vec(),
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retry_after(mut self, max: Duration) -> Self {
        self.max_retry_after = max;
        self
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn decide(
        &self,
        state: &mut RetryState,
        status: StatusCode,
        retry_after: Option<&str>,
    ) -> Decision {
        for (idx, rule) in self.rules.iter().copied().enumerate().skip(state.stage) {
            if !rule.matches(status) {
                continue;
            }
            let used = if idx == state.stage { state.used } else { 0 };
            if used >= rule.budget() {
                continue;
            }

            let decision = match rule {
                RetryRule::Unauthorized => Decision::RefreshAndRetry,
                RetryRule::RateLimited => {
                    let Some(secs) = parse_retry_after(retry_after) else {
                        continue;
                    };
                    if secs > self.max_retry_after.as_secs() {
                        Decision::RateLimitExceeded(secs)
                    } else {
                        Decision::RetryAfter(Duration::from_secs(secs))
                    }
                }
                RetryRule::ServerError => Decision::RetryAfter(self.backoff_step * (used + 1)),
            };

            state.stage = idx;
            state.used = used + 1;
            return decision;
        }
        Decision::Done
    }
}

fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value?.trim().parse::<u64>().ok().filter(|secs| *secs > 0)
}

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn pause(cancel: &CancellationToken, delay: Duration) -> Result<(), SpotifyError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SpotifyError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn unauthorized_refreshes_once() {
        let p = policy();
        let mut st = RetryState::default();
        assert_eq!(
            p.decide(&mut st, StatusCode::UNAUTHORIZED, None),
            Decision::RefreshAndRetry
        );
        assert_eq!(p.decide(&mut st, StatusCode::UNAUTHORIZED, None), Decision::Done);
    }

    #[test]
    fn rate_limit_respects_max_wait() {
        let p = policy();
        let mut st = RetryState::default();
        assert_eq!(
            p.decide(&mut st, StatusCode::TOO_MANY_REQUESTS, Some("5")),
            Decision::RetryAfter(Duration::from_secs(5))
        );
        assert_eq!(
            p.decide(&mut st, StatusCode::TOO_MANY_REQUESTS, Some("5")),
            Decision::Done
        );

        let mut st = RetryState::default();
        assert_eq!(
            p.decide(&mut st, StatusCode::TOO_MANY_REQUESTS, Some(" 20 ")),
            Decision::RateLimitExceeded(20)
        );

        let p = policy().with_max_retry_after(Duration::from_secs(30));
        let mut st = RetryState::default();
        assert_eq!(
            p.decide(&mut st, StatusCode::TOO_MANY_REQUESTS, Some("20")),
            Decision::RetryAfter(Duration::from_secs(20))
        );
    }

    #[test]
    fn rate_limit_without_usable_header_is_final() {
        let p = policy();
        for header in [None, Some(""), Some("0"), Some("soon")] {
            let mut st = RetryState::default();
            assert_eq!(
                p.decide(&mut st, StatusCode::TOO_MANY_REQUESTS, header),
                Decision::Done
            );
        }
    }

    #[test]
    fn server_errors_back_off_linearly() {
        let p = policy();
        let mut st = RetryState::default();
        assert_eq!(
            p.decide(&mut st, StatusCode::BAD_GATEWAY, None),
            Decision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            p.decide(&mut st, StatusCode::INTERNAL_SERVER_ERROR, None),
            Decision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(p.decide(&mut st, StatusCode::BAD_GATEWAY, None), Decision::Done);
    }

    #[test]
    fn earlier_rules_do_not_fire_after_later_ones() {
        let p = policy();
        let mut st = RetryState::default();
        assert!(matches!(
            p.decide(&mut st, StatusCode::SERVICE_UNAVAILABLE, None),
            Decision::RetryAfter(_)
        ));
        assert_eq!(p.decide(&mut st, StatusCode::UNAUTHORIZED, None), Decision::Done);
    }

    #[test]
    fn refresh_then_server_error_still_backs_off() {
        let p = policy();
        let mut st = RetryState::default();
        assert_eq!(
            p.decide(&mut st, StatusCode::UNAUTHORIZED, None),
            Decision::RefreshAndRetry
        );
        assert_eq!(
            p.decide(&mut st, StatusCode::INTERNAL_SERVER_ERROR, None),
            Decision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn success_is_final() {
        let mut st = RetryState::default();
        assert_eq!(policy().decide(&mut st, StatusCode::OK, None), Decision::Done);
    }
}
