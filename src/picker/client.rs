//! Google Photos Picker API client: create, poll, list, delete, fetch media.
//!
//! Polling is gated per session: after every answer the client records the
//! earliest instant the next poll may be sent (`now + advertised interval`)
//! and `poll_session` waits for it. Sessions that reached `EXPIRED`, or whose
//! items were listed, are closed; polling them again is refused locally.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio::time::Instant;

use crate::errors::AppError;
use crate::models::picker::{
    MediaItem, MediaItemsPage, MediaKind, PickerSession, PollOutcome, SessionResource, SessionState,
    DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL,
};
use crate::store::TokenStore;
use crate::upstream::client::expect_json;
use crate::upstream::{RetryConfig, UpstreamClient};

const PAGE_SIZE: &str = "100";
/// Guard against an upstream that keeps handing out page tokens.
const MAX_PAGES: usize = 100;

#[derive(Debug, Clone, Copy)]
struct SessionTrack {
    next_poll_at: Instant,
    interval: Duration,
    closed: bool,
}

pub struct PickerClient {
    base: String,
    upstream: UpstreamClient,
    tokens: Arc<TokenStore>,
    /// Configured lower bound for the poll interval (can only lengthen waits).
    poll_floor: Option<Duration>,
    sessions: DashMap<String, SessionTrack>,
}

impl PickerClient {
    pub fn new(
        base: impl Into<String>,
        upstream: UpstreamClient,
        tokens: Arc<TokenStore>,
        poll_floor: Option<Duration>,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            upstream,
            tokens,
            poll_floor,
            sessions: DashMap::new(),
        }
    }

    pub async fn create_session(&self) -> Result<PickerSession, AppError> {
        let token = self.tokens.get_valid_access_token().await?;
        let url = format!("{}/sessions", self.base);

        let resp = self
            .upstream
            .send(
                "create session",
                || self.upstream.http().post(&url).bearer_auth(&token).json(&json!({})),
                self.upstream.retry_policy(),
            )
            .await?;
        let resource: SessionResource = expect_json("create session", resp).await?;

        let (session_id, picker_uri) = match (resource.id.clone(), resource.picker_uri.clone()) {
            (Some(id), Some(uri)) if !id.is_empty() && !uri.is_empty() => (id, uri),
            _ => {
                tracing::error!(?resource, "Picker session created without id or pickerUri");
                return Err(AppError::Upstream(
                    "picker session response is missing id or pickerUri".into(),
                ));
            }
        };

        let interval = self.effective_interval(resource.advertised_interval());
        self.sessions.insert(
            session_id.clone(),
            SessionTrack {
                next_poll_at: Instant::now() + interval,
                interval,
                closed: false,
            },
        );

        tracing::info!(session_id = %session_id, poll_interval = ?interval, "Picker session created");
        Ok(PickerSession {
            session_id,
            picker_uri,
            state: SessionState::Pending,
            poll_interval: interval,
            expire_time: resource.expire_time,
        })
    }

    /// Fetch the session state, waiting first if the previous poll was too recent.
    pub async fn poll_session(&self, session_id: &str) -> Result<PollOutcome, AppError> {
        let (slot, interval) = self.reserve_slot(session_id)?;
        tokio::time::sleep_until(slot).await;
        if self.sessions.get(session_id).is_some_and(|t| t.closed) {
            return Err(AppError::SessionExpired);
        }

        let token = self.tokens.get_valid_access_token().await?;
        let url = format!("{}/sessions/{}", self.base, urlencoding::encode(session_id));
        let retry = self.poll_retry(interval);

        let resp = self
            .upstream
            .send(
                "poll session",
                || self.upstream.http().get(&url).bearer_auth(&token),
                &retry,
            )
            .await;
        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                // The failed attempts still count as polls.
                self.reschedule(session_id, interval);
                return Err(e);
            }
        };

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(session_id, "Picker session no longer exists upstream");
            self.close(session_id);
            return Ok(PollOutcome {
                state: SessionState::Expired,
                poll_interval: interval,
            });
        }

        let resource: SessionResource = match expect_json("poll session", resp).await {
            Ok(r) => r,
            Err(e) => {
                self.reschedule(session_id, interval);
                return Err(e);
            }
        };

        let interval = self.effective_interval(resource.advertised_interval());
        let state = resource.state_at(Utc::now());
        match state {
            SessionState::Expired => self.close(session_id),
            _ => self.reschedule(session_id, interval),
        }

        tracing::debug!(session_id, ?state, poll_interval = ?interval, "Polled picker session");
        Ok(PollOutcome {
            state,
            poll_interval: interval,
        })
    }

    /// All picked items in upstream order. Any failing page fails the whole listing.
    pub async fn list_media_items(&self, session_id: &str) -> Result<Vec<MediaItem>, AppError> {
        if self.sessions.get(session_id).is_some_and(|t| t.closed) {
            return Err(AppError::SessionExpired);
        }

        let token = self.tokens.get_valid_access_token().await?;
        let url = format!("{}/mediaItems", self.base);
        let no_retry = RetryConfig::none();

        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut query = vec![("sessionId", session_id.to_string()), ("pageSize", PAGE_SIZE.to_string())];
            if let Some(t) = &page_token {
                query.push(("pageToken", t.clone()));
            }

            let resp = self
                .upstream
                .send(
                    "list media items",
                    || self.upstream.http().get(&url).bearer_auth(&token).query(&query),
                    &no_retry,
                )
                .await?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                self.close(session_id);
                return Err(AppError::SessionExpired);
            }
            let body: MediaItemsPage = expect_json("list media items", resp).await?;

            let received = body.media_items.len();
            items.extend(body.media_items.into_iter().filter_map(|m| m.into_media_item()));
            tracing::debug!(session_id, page, received, "Listed media item page");

            match body.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => {
                    self.close(session_id);
                    tracing::info!(session_id, count = items.len(), "Listed picked media items");
                    return Ok(items);
                }
            }
        }

        Err(AppError::Upstream(format!(
            "media item listing exceeded {} pages",
            MAX_PAGES
        )))
    }

    /// Best-effort cleanup of a finished session upstream.
    pub async fn delete_session(&self, session_id: &str) {
        self.close(session_id);
        let token = match self.tokens.get_valid_access_token().await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(session_id, "Skipping session delete: {}", e);
                return;
            }
        };
        let url = format!("{}/sessions/{}", self.base, urlencoding::encode(session_id));
        let result = self
            .upstream
            .send(
                "delete session",
                || self.upstream.http().delete(&url).bearer_auth(&token),
                &RetryConfig::none(),
            )
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(session_id, "Deleted picker session");
            }
            Ok(resp) => tracing::debug!(session_id, status = %resp.status(), "Session delete refused"),
            Err(e) => tracing::debug!(session_id, "Session delete failed: {}", e),
        }
    }

    /// Download one rendition of a picked item using the server-side token.
    pub async fn fetch_media(
        &self,
        item: &MediaItem,
        kind: MediaKind,
        width: u32,
        height: u32,
    ) -> Result<(String, Bytes), AppError> {
        let token = self.tokens.get_valid_access_token().await?;
        let url = item.content_url(kind, width, height);

        let resp = self
            .upstream
            .send(
                "fetch media",
                || self.upstream.http().get(&url).bearer_auth(&token),
                self.upstream.retry_policy(),
            )
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = %status, filename = %item.filename, "Media fetch refused upstream");
            return Err(AppError::MediaUnavailable(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("fetch media body: {}", e)))?;
        Ok((content_type, bytes))
    }

    /// Forget local bookkeeping for a session (flow replaced or evicted).
    pub fn forget(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    fn effective_interval(&self, advertised: Duration) -> Duration {
        let interval = match self.poll_floor {
            Some(floor) => advertised.max(floor),
            None => advertised,
        };
        interval.min(MAX_POLL_INTERVAL)
    }

    /// Claim the next poll slot. Concurrent callers on one session queue an interval apart.
    fn reserve_slot(&self, session_id: &str) -> Result<(Instant, Duration), AppError> {
        let now = Instant::now();
        let mut track = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionTrack {
                next_poll_at: now,
                interval: self.effective_interval(DEFAULT_POLL_INTERVAL),
                closed: false,
            });
        if track.closed {
            return Err(AppError::SessionExpired);
        }
        let slot = track.next_poll_at.max(now);
        track.next_poll_at = slot + track.interval;
        Ok((slot, track.interval))
    }

    /// Retries of a poll are polls too: every wait, `Retry-After` included, lasts at least the interval.
    fn poll_retry(&self, interval: Duration) -> RetryConfig {
        self.upstream.retry_policy().clone().with_min_wait(interval)
    }

    fn reschedule(&self, session_id: &str, interval: Duration) {
        let next = SessionTrack {
            next_poll_at: Instant::now() + interval,
            interval,
            closed: false,
        };
        self.sessions
            .entry(session_id.to_string())
            .and_modify(|t| {
                if !t.closed {
                    *t = next;
                }
            })
            .or_insert(next);
    }

    fn close(&self, session_id: &str) {
        self.sessions
            .entry(session_id.to_string())
            .and_modify(|t| t.closed = true)
            .or_insert(SessionTrack {
                next_poll_at: Instant::now(),
                interval: Duration::ZERO,
                closed: true,
            });
    }
}
