mod common;

use anyhow::Result;
use async_trait::async_trait;
use nudge_bot::auth::{RefreshedTokens, TokenRefresher};
use nudge_bot::config::{ClientConfig, RefreshConfig};
use nudge_bot::error::NudgeError;
use nudge_bot::http::{ApiGateway, HttpClient};
use nudge_bot::retry::RetryConfig;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use common::{serve, Canned};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 5,
        backoff_factor: 2.0,
        max_backoff_ms: 20,
        add_jitter: false,
    }
}

fn client(base_url: &str) -> Result<HttpClient> {
    let config = ClientConfig::new(base_url, "stale-token")?;
    Ok(HttpClient::new(config)?.with_retry_config(fast_retry()))
}

struct StaticRefresher {
    calls: AtomicU32,
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(&self, refresh_token: &str) -> nudge_bot::error::Result<RefreshedTokens> {
        assert_eq!(refresh_token, "refresh-me");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RefreshedTokens {
            access_token: "fresh-token".to_string(),
            refresh_token: None,
        })
    }
}

#[tokio::test]
async fn test_get_sends_bearer_and_request_id() -> Result<()> {
    let (base_url, recorded) = serve(vec![Canned::json(200, json!({"fields": []}))]).await;
    let client = client(&base_url)?;

    let value = client.get("/api/fields/").await?;
    assert_eq!(value, json!({"fields": []}));

    let requests = recorded.lock().unwrap();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/api/fields/");
    assert_eq!(requests[0].headers["authorization"], "Bearer stale-token");
    assert_eq!(requests[0].headers["accept"], "application/json");
    assert_eq!(requests[0].headers["x-request-id"].len(), 36);
    Ok(())
}

#[tokio::test]
async fn test_empty_body_decodes_to_null() -> Result<()> {
    let (base_url, _) = serve(vec![Canned::empty(204)]).await;
    let client = client(&base_url)?;

    let value = client.post("/api/fields/11/saas/7", &json!({"value": "112"})).await?;
    assert!(value.is_null());
    Ok(())
}

#[tokio::test]
async fn test_error_status_carries_body_and_write_is_not_resent() -> Result<()> {
    let (base_url, recorded) = serve(vec![Canned::json(500, json!({"detail": "boom"}))]).await;
    let client = client(&base_url)?;

    let err = client
        .post("/api/fields/11/saas/7", &json!({"value": "112"}))
        .await
        .unwrap_err();
    match err {
        NudgeError::Transport { method, path, status, body } => {
            assert_eq!(method, "POST");
            assert_eq!(path, "/api/fields/11/saas/7");
            assert_eq!(status.as_u16(), 500);
            assert!(body.contains("boom"));
        }
        other => panic!("Expected transport error, got {other:?}"),
    }
    assert_eq!(recorded.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_get_is_retried_on_server_error() -> Result<()> {
    let (base_url, recorded) = serve(vec![
        Canned::json(503, json!({})),
        Canned::json(200, json!({"ok": true})),
    ])
    .await;
    let client = client(&base_url)?;

    let value = client.get("/api/service/details/zoom.us").await?;
    assert_eq!(value, json!({"ok": true}));
    assert_eq!(recorded.lock().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_csrf_token_is_learned_and_sent_on_writes() -> Result<()> {
    let (base_url, recorded) = serve(vec![
        Canned::json(200, json!({})).with_header("X-CSRF-Token", "csrf-1"),
        Canned::json(200, json!({})),
    ])
    .await;
    let client = client(&base_url)?;

    client.get("/api/fields/").await?;
    assert_eq!(client.csrf_token().as_deref(), Some("csrf-1"));
    client.put("/api/fields/", &json!({"id": "11"})).await?;

    let requests = recorded.lock().unwrap();
    assert!(!requests[0].headers.contains_key("x-csrf-token"));
    assert_eq!(requests[1].headers["x-csrf-token"], "csrf-1");
    assert_eq!(requests[1].body, r#"{"id":"11"}"#);
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_refreshes_and_retries_once() -> Result<()> {
    let (base_url, recorded) = serve(vec![
        Canned::json(401, json!({"message": "expired"})),
        Canned::json(200, json!({"fields": []})),
    ])
    .await;
    let mut config = ClientConfig::new(&base_url, "stale-token")?;
    config.refresh = Some(RefreshConfig {
        refresh_token: "refresh-me".to_string(),
        client_id: "client".to_string(),
        auth_url: "http://127.0.0.1:9/".to_string(),
    });
    let refresher = Arc::new(StaticRefresher {
        calls: AtomicU32::new(0),
    });
    let client = HttpClient::new(config)?
        .with_retry_config(fast_retry())
        .with_refresher(refresher.clone());

    client.get("/api/fields/").await?;

    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    let requests = recorded.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].headers["authorization"], "Bearer fresh-token");
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_without_refresh_is_auth_error() -> Result<()> {
    let (base_url, recorded) = serve(vec![Canned::json(401, json!({"message": "no"}))]).await;
    let client = client(&base_url)?;

    let err = client.get("/api/fields/").await.unwrap_err();
    assert!(matches!(err, NudgeError::Auth(_)));
    assert_eq!(recorded.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_base_url_path_prefix_is_kept() -> Result<()> {
    let (base_url, recorded) = serve(vec![Canned::json(200, json!({}))]).await;
    let client = client(&format!("{base_url}/tenant"))?;

    client.get("/api/fields/").await?;
    assert_eq!(recorded.lock().unwrap()[0].path, "/tenant/api/fields/");
    Ok(())
}
