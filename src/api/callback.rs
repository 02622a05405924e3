use std::collections::HashMap;

use axum::{Extension, extract::Query, response::Html};

use crate::{server::CallbackSlot, types::CallbackResult};

const DONE_PAGE: &str = "<!doctype html><html><body>\
<h2>Spotify auth received.</h2><p>You can close this tab.</p>\
</body></html>";

/// Captures the OAuth redirect parameters and hands them to the waiting
/// listener.
///
/// Only the first request delivers a result; every request gets the same
/// confirmation page.
pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(slot): Extension<CallbackSlot>,
) -> Html<&'static str> {
    let field = |key: &str| params.get(key).cloned().unwrap_or_default();
    let result = CallbackResult {
        code: field("code"),
        state: field("state"),
        error: field("error"),
    };

    if let Some(sender) = slot.lock().await.take() {
        if sender.send(result).is_err() {
            tracing::debug!("callback listener gone before result was delivered");
        }
    } else {
        tracing::debug!("ignoring repeated callback request");
    }

    Html(DONE_PAGE)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::{Mutex, oneshot};

    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Query<HashMap<String, String>> {
        Query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn first_request_wins() {
        let (tx, rx) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(tx)));

        callback(query(&[("code", "abc"), ("state", "s1")]), Extension(slot.clone())).await;
        callback(query(&[("code", "zzz")]), Extension(slot.clone())).await;

        let got = rx.await.unwrap();
        assert_eq!(got.code, "abc");
        assert_eq!(got.state, "s1");
        assert!(got.error.is_empty());
        assert!(slot.lock().await.is_none());
    }

    #[tokio::test]
    async fn error_redirect_is_captured() {
        let (tx, rx) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(tx)));

        let Html(page) = callback(query(&[("error", "access_denied")]), Extension(slot)).await;

        assert!(page.contains("close this tab"));
        let got = rx.await.unwrap();
        assert_eq!(got.error, "access_denied");
        assert!(got.code.is_empty());
    }
}
