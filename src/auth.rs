//! Bearer credentials and refresh-token exchange
//!
//! The API accepts the Cognito access token issued to the operator as a
//! bearer token. Access tokens are short-lived JWTs; when a refresh token
//! and app client id are configured, an expired (or rejected) access token
//! is exchanged for a new one inline, before the request that needs it.
//! Opaque API tokens carry no expiry and are used as-is.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::error::{NudgeError, Result};

/// Tokens are refreshed this many seconds before their `exp` claim
const EXPIRY_SKEW_SECS: u64 = 30;

/// Default Cognito endpoint for the Nudge user pool region
pub const DEFAULT_AUTH_URL: &str = "https://cognito-idp.us-east-1.amazonaws.com/";

#[derive(Debug, Clone)]
pub struct Credentials {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<u64>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        let access_token = access_token.into();
        let expires_at = jwt_expiry(&access_token);
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// True when the token carries an `exp` claim that is (nearly) past.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => now_secs() + EXPIRY_SKEW_SECS >= exp,
            None => false,
        }
    }

    /// Replaces the access token (and the refresh token, if the server rotated it).
    pub async fn refresh_with(&mut self, refresher: &dyn TokenRefresher) -> Result<()> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or_else(|| NudgeError::Auth("access token expired and no refresh token is configured".into()))?;

        let tokens = refresher.refresh(refresh_token).await?;
        info!("Refreshed API access token");
        self.expires_at = jwt_expiry(&tokens.access_token);
        self.access_token = tokens.access_token;
        if let Some(rotated) = tokens.refresh_token {
            self.refresh_token = Some(rotated);
        }
        Ok(())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Reads the `exp` claim of a JWT without verifying its signature.
pub fn jwt_expiry(token: &str) -> Option<u64> {
    #[derive(Deserialize)]
    struct Claims {
        exp: Option<u64>,
    }

    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok()?.exp
}

#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token for a fresh access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens>;
}

/// `REFRESH_TOKEN_AUTH` against a Cognito user pool app client
pub struct CognitoRefresher {
    client: Client,
    endpoint: String,
    client_id: String,
}

impl CognitoRefresher {
    pub fn new(client: Client, endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: AuthenticationResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[async_trait]
impl TokenRefresher for CognitoRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        debug!("Requesting token refresh from {}", self.endpoint);
        let body = json!({
            "AuthFlow": "REFRESH_TOKEN_AUTH",
            "ClientId": self.client_id,
            "AuthParameters": {"REFRESH_TOKEN": refresh_token},
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", "AWSCognitoIdentityProviderService.InitiateAuth")
            .body(body.to_string())
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(NudgeError::Auth(format!("token refresh rejected ({status}): {text}")));
        }

        let parsed: InitiateAuthResponse = serde_json::from_str(&text)?;
        Ok(RefreshedTokens {
            access_token: parsed.authentication_result.access_token,
            refresh_token: parsed.authentication_result.refresh_token,
        })
    }
}
