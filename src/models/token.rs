use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth credentials persisted in the token file. Never sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub scope: BTreeSet<String>,
}

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;
/// Longest lifetime we believe; larger values are capped.
const MAX_EXPIRES_IN: i64 = 24 * 3600;

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn token_lifetime(expires_in: Option<u64>) -> Duration {
    let secs = expires_in
        .map(|s| i64::try_from(s).unwrap_or(MAX_EXPIRES_IN).min(MAX_EXPIRES_IN))
        .unwrap_or(DEFAULT_EXPIRES_IN);
    Duration::try_seconds(secs).unwrap_or_else(|| Duration::seconds(DEFAULT_EXPIRES_IN))
}

impl TokenRecord {
    /// Build a record from a token endpoint response received at `now`.
    ///
    /// Google omits `refresh_token` on refresh unless it rotates it, so the
    /// previous record's refresh token and scope are carried over when absent.
    pub fn from_response(resp: TokenResponse, previous: Option<&TokenRecord>, now: DateTime<Utc>) -> Self {
        let scope: BTreeSet<String> = resp
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        TokenRecord {
            access_token: resp.access_token,
            refresh_token: resp
                .refresh_token
                .filter(|t| !t.is_empty())
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            token_type: resp.token_type.unwrap_or_else(default_token_type),
            expiry: now + token_lifetime(resp.expires_in),
            scope: if scope.is_empty() {
                previous.map(|p| p.scope.clone()).unwrap_or_default()
            } else {
                scope
            },
        }
    }

    /// True when the access token is expired or will be within `margin`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: std::time::Duration) -> bool {
        let margin = Duration::from_std(margin).unwrap_or_else(|_| Duration::seconds(60));
        self.expiry - margin <= now
    }
}

/// Token endpoint response (authorization-code exchange and refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// What the UI and CLI may learn about the stored credentials.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub authorized: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}
