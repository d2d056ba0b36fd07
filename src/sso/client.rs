//! Calls to the Injast backend: session-code exchange and the basic profile.
//!
//! Both endpoints answer with an envelope:
//! `{"meta": {"success": bool, "error_code": ..}, "message": .., "data": ..}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{InjastProfile, SsoError};
use crate::config::SsoConfig;

#[async_trait]
pub trait SsoClient: Send + Sync {
    /// Trade a one-time session code for the provider's access token.
    async fn exchange_session_code(&self, session_code: &str) -> Result<String, SsoError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<InjastProfile, SsoError>;
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error_code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn failure(&self) -> String {
        let code = self
            .meta
            .error_code
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".into());
        let message = self.message.as_deref().unwrap_or("no message");
        format!("{code}: {message}")
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeData {
    #[serde(default)]
    access_token: Option<String>,
}

pub struct HttpSsoClient {
    http: reqwest::Client,
    exchange_url: String,
    profile_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl HttpSsoClient {
    pub fn new(http: reqwest::Client, config: &SsoConfig) -> Self {
        Self {
            http,
            exchange_url: config.exchange_url.clone(),
            profile_url: config.profile_url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }

    async fn profile_with(&self, authorization: &str) -> Result<InjastProfile, SsoError> {
        let response = self
            .http
            .get(&self.profile_url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SsoError::Profile(format!("request: {e}")))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(SsoError::Profile(format!("status {status}")));
        }
        if status != reqwest::StatusCode::OK {
            return Err(SsoError::ProfileRejected(format!("status {status}")));
        }
        let envelope: Envelope<InjastProfile> = response.json().await.map_err(|e| {
            if e.is_decode() {
                SsoError::ProfileRejected(format!("body: {e}"))
            } else {
                SsoError::Profile(format!("body: {e}"))
            }
        })?;
        if !envelope.meta.success {
            return Err(SsoError::ProfileRejected(envelope.failure()));
        }
        match envelope.data {
            Some(profile) if profile != InjastProfile::default() => Ok(profile),
            _ => Err(SsoError::ProfileRejected("empty profile".into())),
        }
    }
}

#[async_trait]
impl SsoClient for HttpSsoClient {
    async fn exchange_session_code(&self, session_code: &str) -> Result<String, SsoError> {
        let mut request = self
            .http
            .post(&self.exchange_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "session_code": session_code }));
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        if let Some(secret) = &self.api_secret {
            request = request.header("X-API-Secret", secret);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "session code exchange request failed");
            SsoError::Exchange(format!("request: {e}"))
        })?;
        let status = response.status();
        let envelope: Envelope<ExchangeData> = response.json().await.map_err(|e| {
            tracing::error!(%status, error = %e, "session code exchange returned an unreadable body");
            SsoError::Exchange(format!("status {status}: {e}"))
        })?;
        if !status.is_success() || !envelope.meta.success {
            return Err(SsoError::Exchange(envelope.failure()));
        }
        envelope
            .data
            .and_then(|d| d.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SsoError::Exchange("no access token in response".into()))
    }

    /// The provider has accepted both the bare token and the `Bearer` form
    /// across versions; try the bare form first.
    async fn fetch_profile(&self, access_token: &str) -> Result<InjastProfile, SsoError> {
        match self.profile_with(access_token).await {
            Ok(profile) => Ok(profile),
            Err(first) => {
                tracing::debug!(error = %first, "profile fetch with bare token failed, retrying as Bearer");
                self.profile_with(&format!("Bearer {access_token}")).await
            }
        }
    }
}
