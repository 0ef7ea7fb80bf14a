use std::path::PathBuf;
use std::time::Duration;

use crate::models::picker::MAX_POLL_INTERVAL;
use crate::slideshow::MusicSettings;

pub const PICKER_SCOPE: &str = "https://www.googleapis.com/auth/photospicker.mediaitems.readonly";

const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_PICKER_BASE: &str = "https://photospicker.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Externally reachable base URL, used to derive the OAuth redirect URI.
    pub public_url: String,
    pub oauth: OAuthSettings,
    pub picker_api_base: String,
    pub tokens_path: PathBuf,
    pub selection_path: PathBuf,
    /// Lower bound applied on top of the server-advertised poll interval.
    /// Set via PICKER_POLL_INTERVAL_SECS. Unset = follow the server.
    pub poll_interval_override: Option<Duration>,
    /// How long a background watcher keeps polling one picker session.
    pub pick_flow_timeout: Duration,
    pub advance_seconds: u64,
    /// Slideshow page reload period; base URLs stay valid for about an hour.
    pub refresh_minutes: u64,
    /// Background music under the slideshow (YT_VIDEO_ID / YT_PLAYLIST_ID).
    pub music: Option<MusicSettings>,
    pub token_refresh_margin: Duration,
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 3,
        }
    }
}

impl Config {
    /// Configuration suitable for tests: every upstream endpoint rooted at `base`.
    pub fn for_upstream(base: &str, data_dir: &std::path::Path) -> Self {
        Config {
            bind: "127.0.0.1".into(),
            port: 0,
            public_url: "http://localhost:5000".into(),
            oauth: OAuthSettings {
                client_id: "client-id".into(),
                client_secret: "client-secret".into(),
                redirect_uri: "http://localhost:5000/auth/callback".into(),
                auth_url: format!("{}/o/oauth2/v2/auth", base),
                token_url: format!("{}/token", base),
            },
            picker_api_base: format!("{}/v1", base),
            tokens_path: data_dir.join("tokens.json"),
            selection_path: data_dir.join("selected_media.json"),
            poll_interval_override: None,
            pick_flow_timeout: Duration::from_secs(60),
            advance_seconds: 10,
            refresh_minutes: 60,
            music: None,
            token_refresh_margin: Duration::from_secs(60),
            upstream: UpstreamSettings {
                timeout: Duration::from_secs(5),
                max_retries: 2,
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Positive, finite seconds; anything past the poll ceiling is capped there.
fn poll_interval_override(secs: Option<f64>) -> Option<Duration> {
    secs.filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| Duration::try_from_secs_f64(s).unwrap_or(MAX_POLL_INTERVAL))
        .map(|d| d.min(MAX_POLL_INTERVAL))
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let client_id = std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default();
    let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default();
    if client_id.is_empty() || client_secret.is_empty() {
        let env_mode = std::env::var("PHOTOFRAME_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set before running in production."
            );
        }
        tracing::warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; authorization will fail");
    }

    let port = env_parse("PHOTOFRAME_PORT").unwrap_or(5000);
    let public_url = std::env::var("PHOTOFRAME_PUBLIC_URL")
        .unwrap_or_else(|_| format!("http://localhost:{}", port))
        .trim_end_matches('/')
        .to_string();

    let upstream_defaults = UpstreamSettings::default();

    Ok(Config {
        bind: std::env::var("PHOTOFRAME_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
        port,
        oauth: OAuthSettings {
            client_id,
            client_secret,
            redirect_uri: std::env::var("GOOGLE_REDIRECT_URI")
                .unwrap_or_else(|_| format!("{}/auth/callback", public_url)),
            auth_url: std::env::var("GOOGLE_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.into()),
            token_url: std::env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.into()),
        },
        public_url,
        picker_api_base: std::env::var("PICKER_API_BASE")
            .unwrap_or_else(|_| DEFAULT_PICKER_BASE.into())
            .trim_end_matches('/')
            .to_string(),
        tokens_path: std::env::var("TOKENS_STORE")
            .unwrap_or_else(|_| "tokens.json".into())
            .into(),
        selection_path: std::env::var("SELECTION_STORE")
            .unwrap_or_else(|_| "selected_media.json".into())
            .into(),
        poll_interval_override: poll_interval_override(env_parse("PICKER_POLL_INTERVAL_SECS")),
        pick_flow_timeout: Duration::from_secs(env_parse("PICK_FLOW_TIMEOUT_SECS").unwrap_or(1800)),
        advance_seconds: env_parse("ADVANCE_SECONDS").unwrap_or(10),
        refresh_minutes: env_parse("REFRESH_MINUTES").unwrap_or(60),
        music: MusicSettings::new(
            &std::env::var("YT_VIDEO_ID").unwrap_or_default(),
            &std::env::var("YT_PLAYLIST_ID").unwrap_or_default(),
            env_parse::<i64>("YT_VOLUME").map(|v| v.clamp(0, 100) as u8),
            std::env::var("YT_HIDE_VIDEO")
                .map(|v| !v.trim().eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        ),
        token_refresh_margin: Duration::from_secs(
            env_parse("TOKEN_REFRESH_MARGIN_SECS").unwrap_or(60),
        ),
        upstream: UpstreamSettings {
            timeout: env_parse("UPSTREAM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(upstream_defaults.timeout),
            max_retries: env_parse("UPSTREAM_MAX_RETRIES").unwrap_or(upstream_defaults.max_retries),
        },
    })
}
