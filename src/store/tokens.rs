//! File-backed OAuth token store with single-flight refresh.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::atomic;
use crate::errors::AppError;
use crate::models::token::{TokenRecord, TokenResponse, TokenStatus};
use crate::oauth::OAuthClient;

pub struct TokenStore {
    path: PathBuf,
    oauth: Arc<OAuthClient>,
    margin: Duration,
    /// Serializes read-check-refresh-persist. Callers arriving during a refresh
    /// wait here and then see the refreshed record instead of refreshing again.
    write_lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>, oauth: Arc<OAuthClient>, margin: Duration) -> Self {
        Self {
            path: path.into(),
            oauth,
            margin,
            write_lock: Mutex::new(()),
        }
    }

    /// Return an access token valid for at least the safety margin,
    /// refreshing (and persisting) first if needed.
    pub async fn get_valid_access_token(&self) -> Result<String, AppError> {
        let _guard = self.write_lock.lock().await;

        let record = self
            .read()
            .await
            .ok_or_else(|| AppError::Auth("no credentials on file".into()))?;
        let refresh_token = record
            .refresh_token
            .clone()
            .ok_or_else(|| AppError::Auth("no refresh token on file".into()))?;

        if !record.needs_refresh(Utc::now(), self.margin) {
            return Ok(record.access_token);
        }

        tracing::info!(expiry = %record.expiry, "Access token expired or expiring, refreshing");
        let resp = self.oauth.refresh(&refresh_token).await?;
        let next = TokenRecord::from_response(resp, Some(&record), Utc::now());
        self.persist(&next).await?;
        tracing::info!(expiry = %next.expiry, "Access token refreshed");

        Ok(next.access_token)
    }

    /// Persist the result of an authorization-code exchange.
    pub async fn store_authorization(&self, resp: TokenResponse) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let previous = self.read().await;
        let next = TokenRecord::from_response(resp, previous.as_ref(), Utc::now());
        if next.refresh_token.is_none() {
            tracing::warn!("Authorization returned no refresh token; re-consent will be required");
        }
        self.persist(&next).await?;
        tracing::info!(has_refresh = next.refresh_token.is_some(), "Persisted authorization");
        Ok(())
    }

    pub async fn status(&self) -> TokenStatus {
        match self.read().await {
            Some(record) => TokenStatus {
                authorized: record.refresh_token.is_some(),
                expires_at: Some(record.expiry),
                scopes: record.scope.into_iter().collect(),
            },
            None => TokenStatus {
                authorized: false,
                expires_at: None,
                scopes: Vec::new(),
            },
        }
    }

    /// Forget the stored credentials. Returns whether anything was removed.
    pub async fn clear(&self) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        atomic::remove(&self.path)
            .await
            .map_err(|e| AppError::Storage(format!("{:#}", e)))
    }

    /// An unreadable token file is treated like a missing one: the user re-authorizes.
    async fn read(&self) -> Option<TokenRecord> {
        match atomic::read_json::<TokenRecord>(&self.path).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(path = %self.path.display(), "Token file unreadable: {:#}", e);
                None
            }
        }
    }

    async fn persist(&self, record: &TokenRecord) -> Result<(), AppError> {
        atomic::write_json(&self.path, record).await.map_err(|e| {
            tracing::error!(path = %self.path.display(), "Failed to persist tokens: {:#}", e);
            AppError::Storage(format!("{:#}", e))
        })
    }
}
