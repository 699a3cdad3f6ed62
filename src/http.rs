//! Authenticated JSON transport for the Nudge API
//!
//! [`ApiGateway`] is the seam every other module talks through; the
//! production implementation is [`HttpClient`], and tests substitute an
//! in-memory gateway. `HttpClient` provides:
//! - bearer authentication with inline refresh of expired JWTs
//! - one refresh-and-retry on a 401
//! - a CSRF token on mutating requests, updated from response headers
//! - token-bucket pacing and exponential backoff on transient failures
//! - non-2xx responses surfaced as [`NudgeError::Transport`] with the body

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{CognitoRefresher, Credentials, TokenRefresher};
use crate::config::ClientConfig;
use crate::error::{NudgeError, Result};
use crate::rate_limit::{create_nudge_api_limiter, RateLimiter};
use crate::retry::{with_exponential_backoff, RetryConfig};

pub const CSRF_HEADER: &str = "X-CSRF-Token";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Authenticated access to the API, relative to a fixed base URL
///
/// Paths start with `/api/...`. Implementations return the decoded JSON body
/// (or `Value::Null` for an empty body) and fail on any non-2xx status.
#[async_trait]
pub trait ApiGateway: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value>;
    async fn post(&self, path: &str, body: &Value) -> Result<Value>;
    async fn put(&self, path: &str, body: &Value) -> Result<Value>;
}

/// reqwest-backed [`ApiGateway`]
///
/// # Examples
///
/// ```no_run
/// use nudge_bot::config::ClientConfig;
/// use nudge_bot::http::{ApiGateway, HttpClient};
///
/// # async fn example() -> nudge_bot::error::Result<()> {
/// let config = ClientConfig::new("https://api.nudgesecurity.io", "my-token")?;
/// let client = HttpClient::new(config)?;
/// let fields = client.get("/api/fields/").await?;
/// println!("{fields}");
/// # Ok(())
/// # }
/// ```
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
    credentials: Mutex<Credentials>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    csrf_token: StdMutex<Option<String>>,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(concat!("nudge-bot/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        let refresher = config.refresh.as_ref().map(|r| {
            Arc::new(CognitoRefresher::new(client.clone(), &r.auth_url, &r.client_id))
                as Arc<dyn TokenRefresher>
        });
        let credentials = Credentials::new(
            config.api_token.clone(),
            config.refresh.as_ref().map(|r| r.refresh_token.clone()),
        );
        let rate_limiter = Arc::new(create_nudge_api_limiter(config.requests_per_minute));

        Ok(Self {
            client,
            csrf_token: StdMutex::new(config.csrf_token.clone()),
            config,
            credentials: Mutex::new(credentials),
            refresher,
            rate_limiter,
        })
    }

    /// Replaces the refresh mechanism, e.g. to point at a non-Cognito issuer.
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// The CSRF token that will accompany the next mutating request
    pub fn csrf_token(&self) -> Option<String> {
        self.csrf_token.lock().ok().and_then(|t| t.clone())
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        // Writes are only resent when the server certainly did not apply them
        let idempotent = method == Method::GET;
        with_exponential_backoff(
            || self.send_authenticated(method.clone(), path, body),
            |err: &NudgeError| {
                if idempotent {
                    err.is_retriable()
                } else {
                    err.is_safe_to_resend()
                }
            },
            &self.config.retry,
        )
        .await
    }

    async fn send_authenticated(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        self.refresh_if_expired().await?;

        let result = self.send_once(method.clone(), path, body).await;
        let unauthorized = matches!(
            &result,
            Err(NudgeError::Transport { status, .. }) if *status == StatusCode::UNAUTHORIZED
        );
        if unauthorized && self.can_refresh().await {
            warn!("{} {} was unauthorized, refreshing credential and retrying once", method, path);
            self.refresh().await?;
            return self.send_once(method, path, body).await.map_err(unauthorized_to_auth);
        }
        result.map_err(unauthorized_to_auth)
    }

    async fn can_refresh(&self) -> bool {
        self.refresher.is_some() && self.credentials.lock().await.can_refresh()
    }

    async fn refresh_if_expired(&self) -> Result<()> {
        let expired = self.credentials.lock().await.is_expired();
        if expired {
            if self.can_refresh().await {
                debug!("Access token expired, refreshing before request");
                self.refresh().await?;
            } else {
                warn!("Access token appears expired and cannot be refreshed; sending anyway");
            }
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let refresher = self
            .refresher
            .as_ref()
            .ok_or_else(|| NudgeError::Auth("no token refresher configured".into()))?;
        self.credentials.lock().await.refresh_with(refresher.as_ref()).await
    }

    fn remember_csrf(&self, headers: &HeaderMap) {
        let Some(token) = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) else {
            return;
        };
        if let Ok(mut slot) = self.csrf_token.lock() {
            *slot = Some(token.to_string());
        }
    }

    async fn send_once(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.config.url_for(path)?;
        let token = self.credentials.lock().await.access_token().to_string();

        let mut req = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        if method != Method::GET {
            if let Some(csrf) = self.csrf_token() {
                req = req.header(CSRF_HEADER, csrf);
            }
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        self.rate_limiter.acquire().await;
        debug!("{} {}", method, path);
        let resp = req.send().await?;
        self.remember_csrf(resp.headers());

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            debug!("{} {} -> {}: {}", method, path, status, text);
            return Err(NudgeError::Transport {
                method: method_name(&method),
                path: path.to_string(),
                status,
                body: text,
            });
        }

        if text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }
}

fn unauthorized_to_auth(err: NudgeError) -> NudgeError {
    match err {
        NudgeError::Transport { status, path, body, .. } if status == StatusCode::UNAUTHORIZED => {
            NudgeError::Auth(format!("{path} rejected the credential: {body}"))
        }
        other => other,
    }
}

fn method_name(method: &Method) -> &'static str {
    if *method == Method::GET {
        "GET"
    } else if *method == Method::POST {
        "POST"
    } else if *method == Method::PUT {
        "PUT"
    } else {
        "REQUEST"
    }
}

#[async_trait]
impl ApiGateway for HttpClient {
    async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, Some(body)).await
    }
}
