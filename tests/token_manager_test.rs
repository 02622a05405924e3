use std::{sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use spotctl::{
    management::{Clock, TokenManager, TokenManagerOptions},
    spotify::SpotifyError,
    types::{Credentials, Token},
};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

fn fixed_clock() -> Clock {
    Arc::new(fixed_now)
}

fn credentials(secret: Option<&str>) -> Credentials {
    Credentials::new("cid", secret.map(str::to_string), Some("rt-123".to_string()))
}

async fn manager(server: &MockServer, creds: Credentials, cache: Option<std::path::PathBuf>) -> TokenManager {
    TokenManager::new(
        creds,
        TokenManagerOptions {
            http: None,
            accounts_base: Some(server.uri()),
            cache_path: cache,
            clock: Some(fixed_clock()),
        },
    )
    .await
}

fn token_response(access: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "token_type": "Bearer",
        "scope": "user-read-private",
        "expires_in": 3600
    }))
}

fn write_cache(path: &std::path::Path, access: &str, expires_in_secs: i64) {
    let token = Token {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        scope: String::new(),
        expires_at: fixed_now() + chrono::Duration::seconds(expires_in_secs),
    };
    std::fs::write(path, serde_json::to_vec(&token).unwrap()).unwrap();
}

#[tokio::test]
async fn test_refresh_uses_basic_auth_and_refresh_grant() {
    let server = MockServer::start().await;
    let basic = format!("Basic {}", STANDARD.encode("cid:secret"));
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(header("authorization", basic.as_str()))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-123"))
        .respond_with(token_response("at"))
        .expect(1)
        .mount(&server)
        .await;

    let tm = manager(&server, credentials(Some("secret")), None).await;
    let token = tm.access_token(&CancellationToken::new()).await.unwrap();
    assert_eq!(token, "at");

    // cached now
    let again = tm.access_token(&CancellationToken::new()).await.unwrap();
    assert_eq!(again, "at");
}

#[tokio::test]
async fn test_public_client_sends_client_id_in_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("client_id=cid"))
        .respond_with(token_response("public-at"))
        .expect(1)
        .mount(&server)
        .await;

    let tm = manager(&server, credentials(None), None).await;
    let token = tm.access_token(&CancellationToken::new()).await.unwrap();
    assert_eq!(token, "public-at");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_token_outside_skew_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(token_response("fresh"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("token.json");
    write_cache(&cache, "cached", 31);

    let tm = manager(&server, credentials(Some("secret")), Some(cache)).await;
    let token = tm.access_token(&CancellationToken::new()).await.unwrap();
    assert_eq!(token, "cached");
}

#[tokio::test]
async fn test_token_inside_skew_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(token_response("fresh"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("token.json");
    write_cache(&cache, "stale", 29);

    let tm = manager(&server, credentials(Some("secret")), Some(cache)).await;
    let token = tm.access_token(&CancellationToken::new()).await.unwrap();
    assert_eq!(token, "fresh");
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(token_response("shared").set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let tm = Arc::new(manager(&server, credentials(Some("secret")), None).await);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tm = Arc::clone(&tm);
            tokio::spawn(async move { tm.access_token(&CancellationToken::new()).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "shared");
    }
}

#[tokio::test]
async fn test_force_refresh_ignores_fresh_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(token_response("forced"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("token.json");
    write_cache(&cache, "cached", 3600);

    let tm = manager(&server, credentials(Some("secret")), Some(cache)).await;
    let token = tm.force_refresh(&CancellationToken::new()).await.unwrap();
    assert_eq!(token, "forced");
}

#[tokio::test]
async fn test_refresh_writes_cache_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(token_response("persisted"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("nested").join("token.json");

    let tm = manager(&server, credentials(Some("secret")), Some(cache.clone())).await;
    tm.access_token(&CancellationToken::new()).await.unwrap();

    let saved: Token = serde_json::from_slice(&std::fs::read(&cache).unwrap()).unwrap();
    assert_eq!(saved.access_token, "persisted");
    assert_eq!(saved.expires_at, fixed_now() + chrono::Duration::seconds(3600));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&cache).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn test_corrupt_cache_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(token_response("recovered"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("token.json");
    std::fs::write(&cache, b"{not json").unwrap();

    let tm = manager(&server, credentials(Some("secret")), Some(cache)).await;
    let token = tm.access_token(&CancellationToken::new()).await.unwrap();
    assert_eq!(token, "recovered");
}

#[cfg(unix)]
#[tokio::test]
async fn test_stale_tmp_file_does_not_widen_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(token_response("private"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("token.json");
    let tmp = dir.path().join("token.tmp");
    std::fs::write(&tmp, b"leftover").unwrap();
    std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)).unwrap();

    let tm = manager(&server, credentials(Some("secret")), Some(cache.clone())).await;
    tm.access_token(&CancellationToken::new()).await.unwrap();

    let mode = std::fs::metadata(&cache).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert!(!tmp.exists());
}

#[tokio::test]
async fn test_incomplete_cache_is_ignored() {
    let expires_at = (fixed_now() + chrono::Duration::seconds(3600)).to_rfc3339();
    let incomplete = [
        json!({ "access_token": "cached" }).to_string(),
        json!({ "access_token": "", "token_type": "Bearer", "expires_at": expires_at }).to_string(),
        json!({ "token_type": "Bearer", "expires_at": expires_at }).to_string(),
    ];

    for content in incomplete {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(token_response("recovered"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("token.json");
        std::fs::write(&cache, &content).unwrap();

        let tm = manager(&server, credentials(Some("secret")), Some(cache)).await;
        let token = tm.access_token(&CancellationToken::new()).await.unwrap();
        assert_eq!(token, "recovered", "cache content: {content}");
        server.verify().await;
    }
}

#[tokio::test]
async fn test_400_prefers_error_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token revoked"
        })))
        .mount(&server)
        .await;

    let tm = manager(&server, credentials(Some("secret")), None).await;
    let err = tm.access_token(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SpotifyError::Auth(_)));
    assert!(err.to_string().contains("Refresh token revoked"));
}

#[tokio::test]
async fn test_other_failures_report_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let tm = manager(&server, credentials(Some("secret")), None).await;
    let err = tm.access_token(&CancellationToken::new()).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("503"));
    assert!(msg.contains("maintenance"));
}

#[tokio::test]
async fn test_missing_refresh_token_is_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(token_response("never"))
        .expect(0)
        .mount(&server)
        .await;

    let creds = Credentials::new("cid", Some("secret".to_string()), None);
    let tm = manager(&server, creds, None).await;
    let err = tm.access_token(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SpotifyError::Config(_)));
}

#[tokio::test]
async fn test_cancel_aborts_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(token_response("slow").set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let tm = manager(&server, credentials(Some("secret")), None).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = tm.access_token(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}
