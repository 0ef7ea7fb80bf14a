/// HTTP client for the Google endpoints (Picker API, OAuth token endpoint, media bytes).
/// Every request carries a bounded timeout; retries go through `robust_request`.
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::retry::{robust_request, RetryConfig};
use crate::config::UpstreamSettings;
use crate::errors::AppError;

/// Longest upstream error body echoed into logs and error messages.
const ERROR_BODY_PREVIEW: usize = 300;

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl UpstreamClient {
    pub fn new(settings: &UpstreamSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("photoframe/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            retry: RetryConfig::default().with_max_retries(settings.max_retries),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Default policy for calls whose transient failures may be retried silently.
    pub fn retry_policy(&self) -> &RetryConfig {
        &self.retry
    }

    /// Send with the given policy; transport failures become `AppError::Upstream`.
    pub async fn send<F>(&self, what: &str, build: F, retry: &RetryConfig) -> Result<Response, AppError>
    where
        F: Fn() -> RequestBuilder,
    {
        robust_request(build, retry).await.map_err(|e| {
            tracing::warn!(call = what, "Upstream request failed: {:#}", e);
            AppError::Upstream(format!("{} failed: {}", what, e))
        })
    }
}

/// Decode a 2xx JSON body; error statuses are classified by `expect_success`.
pub async fn expect_json<T: DeserializeOwned>(what: &str, resp: Response) -> Result<T, AppError> {
    let resp = expect_success(what, resp).await?;
    resp.json::<T>().await.map_err(|e| {
        tracing::error!(call = what, "Malformed upstream response: {}", e);
        AppError::Upstream(format!("{} returned a malformed response: {}", what, e))
    })
}

/// Pass a 2xx response through. A 401 means the bearer token was rejected and
/// becomes `AppError::Auth`; anything else is `AppError::Upstream`.
pub async fn expect_success(what: &str, resp: Response) -> Result<Response, AppError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        tracing::warn!(call = what, body = %preview, "Upstream rejected our credentials");
        return Err(AppError::Auth(format!("{} rejected the access token", what)));
    }
    tracing::error!(call = what, status = %status, body = %preview, "Upstream returned an error");
    Err(AppError::Upstream(format!("{} failed: {} {}", what, status, preview)))
}
