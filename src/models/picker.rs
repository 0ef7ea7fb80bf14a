//! Picker API wire types and the domain types derived from them.
//!
//! Wire shapes follow https://developers.google.com/photos/picker/reference/rest
//! (only the fields we use).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interval used when the server does not advertise one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Ceiling for any poll interval, advertised or configured.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(300);

// ── Domain ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Pending,
    MediaItemsSet,
    Expired,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Pending)
    }
}

/// One user-driven pick interaction on the upstream service.
#[derive(Debug, Clone)]
pub struct PickerSession {
    pub session_id: String,
    pub picker_uri: String,
    pub state: SessionState,
    pub poll_interval: Duration,
    pub expire_time: Option<DateTime<Utc>>,
}

impl PickerSession {
    /// Picker URL that closes its own tab once the user presses Done.
    pub fn autoclose_uri(&self) -> String {
        format!("{}/autoclose", self.picker_uri.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOutcome {
    pub state: SessionState,
    /// Minimum wait before the next poll of this session.
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("video") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// A picked photo or video as persisted in the selection file.
///
/// `base_url` expires roughly an hour after listing; it is only ever used
/// server-side with a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(default)]
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
}

impl MediaItem {
    pub fn kind(&self) -> MediaKind {
        let mt = self.mime_type.to_ascii_lowercase();
        if mt.starts_with("video/") || mt.contains("motion") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    /// Content URL for the requested rendition.
    ///
    /// Videos use `=dv` (which does not combine with sizing); images are
    /// scaled to `w`×`h`. Asking a video for an image yields its still frame.
    pub fn content_url(&self, kind: MediaKind, width: u32, height: u32) -> String {
        match kind {
            MediaKind::Video => format!("{}=dv", self.base_url),
            MediaKind::Image => format!("{}=w{}-h{}", self.base_url, width.max(1), height.max(1)),
        }
    }
}

/// Parse a Google JSON duration (`"5s"`, `"1.500s"`), capped at [`MAX_POLL_INTERVAL`].
pub fn parse_duration(value: Option<&str>, default: Duration) -> Duration {
    value
        .map(str::trim)
        .and_then(|v| v.strip_suffix('s'))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(MAX_POLL_INTERVAL))
        .unwrap_or(default)
        .min(MAX_POLL_INTERVAL)
}

// ── Wire ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    pub poll_interval: Option<String>,
    pub timeout_in: Option<String>,
}

/// `sessions.create` / `sessions.get` response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub picker_uri: Option<String>,
    #[serde(default)]
    pub polling_config: Option<PollingConfig>,
    #[serde(default)]
    pub expire_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media_items_set: bool,
}

impl SessionResource {
    pub fn advertised_interval(&self) -> Duration {
        parse_duration(
            self.polling_config
                .as_ref()
                .and_then(|c| c.poll_interval.as_deref()),
            DEFAULT_POLL_INTERVAL,
        )
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.media_items_set {
            SessionState::MediaItemsSet
        } else if self.expire_time.is_some_and(|t| t <= now) {
            SessionState::Expired
        } else {
            SessionState::Pending
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub base_url: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
}

/// `mediaItems.list` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedMediaItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media_file: Option<MediaFile>,
    // Older responses put these at the top level.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl PickedMediaItem {
    /// Items without a base URL cannot be displayed and are dropped.
    pub fn into_media_item(self) -> Option<MediaItem> {
        let file = self.media_file.unwrap_or_default();
        let base_url = file
            .base_url
            .or(self.base_url)
            .filter(|u| !u.is_empty())?;
        Some(MediaItem {
            id: self.id,
            base_url,
            mime_type: file.mime_type.or(self.mime_type).unwrap_or_default(),
            filename: file.filename.or(self.filename).unwrap_or_default(),
            creation_time: self.create_time,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemsPage {
    #[serde(default)]
    pub media_items: Vec<PickedMediaItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
