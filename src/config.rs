//! Client configuration assembled from global CLI flags and environment
//!
//! There is no config file: every setting is a global flag with an
//! environment-variable fallback (see [`crate::cli::GlobalArgs`]).

use std::time::Duration;
use url::Url;

use crate::auth::DEFAULT_AUTH_URL;
use crate::cli::GlobalArgs;
use crate::error::{NudgeError, Result};
use crate::retry::RetryConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.nudgesecurity.io";

/// Settings for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_token: String,
    pub refresh: Option<RefreshConfig>,
    pub csrf_token: Option<String>,
    pub timeout: Duration,
    pub requests_per_minute: usize,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub refresh_token: String,
    pub client_id: String,
    pub auth_url: String,
}

impl ClientConfig {
    /// Minimal configuration for `token` against `base_url`; used by tests.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            api_token: token.into(),
            refresh: None,
            csrf_token: None,
            timeout: Duration::from_secs(30),
            requests_per_minute: 120,
            retry: RetryConfig::default(),
        })
    }

    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        let api_token = args
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NudgeError::Auth("no API token; pass --api-token or set API_TOKEN".into()))?;

        let refresh = match (&args.refresh_token, &args.client_id) {
            (Some(refresh_token), Some(client_id)) => Some(RefreshConfig {
                refresh_token: refresh_token.clone(),
                client_id: client_id.clone(),
                auth_url: args.auth_url.clone().unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            }),
            (Some(_), None) => {
                return Err(NudgeError::validation(
                    "--refresh-token requires --client-id (NUDGE_CLIENT_ID)",
                ))
            }
            _ => None,
        };

        let mut config = Self::new(&args.base_url, api_token)?;
        config.refresh = refresh;
        config.csrf_token = args.csrf_token.clone();
        config.timeout = Duration::from_millis(args.timeout_ms);
        config.requests_per_minute = args.rate_limit;
        Ok(config)
    }

    /// Joins an API path such as `/api/fields/` onto the base URL.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| NudgeError::validation(format!("bad API path {path}: {e}")))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    // A trailing slash makes `join` append rather than replace the last segment
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| NudgeError::validation(format!("invalid base URL {raw}: {e}")))
}
