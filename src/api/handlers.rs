use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::pages;
use super::session;
use crate::errors::AppError;
use crate::models::picker::MediaKind;
use crate::picker::FlowPhase;
use crate::slideshow::{SlideshowSettings, SlideshowView};
use crate::AppState;

const DEFAULT_MEDIA_WIDTH: u32 = 800;
const DEFAULT_MEDIA_HEIGHT: u32 = 480;
const MAX_MEDIA_EDGE: u32 = 8192;
/// Browser re-check period while no upstream interval is known.
const DEFAULT_RETRY_AFTER_SECS: u64 = 3;

fn secure_cookies(state: &AppState) -> bool {
    state.config.public_url.starts_with("https://")
}

// ── Health ───────────────────────────────────────────────────

pub async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn root() -> Redirect {
    Redirect::to("/pick")
}

// ── Home ─────────────────────────────────────────────────────

pub async fn home(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Html<String>) {
    let (jar, _) = session::ensure_session(jar, secure_cookies(&state));
    let (jar, flash) = session::take_flash(jar);
    let status = state.tokens.status().await;
    let selected = state.selection.load().await.len();
    (jar, Html(pages::home(&status, selected, flash.as_deref())))
}

// ── OAuth ────────────────────────────────────────────────────

pub async fn auth_start(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let url = state.oauth.authorization_url(&nonce)?;
    let jar = session::with_oauth_state(jar, &nonce, secure_cookies(&state));
    tracing::info!("Redirecting to Google consent");
    Ok((jar, Redirect::to(&url)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> (CookieJar, Redirect) {
    let secure = secure_cookies(&state);
    let (jar, state_ok) = session::take_oauth_state(jar, params.state.as_deref());

    if let Some(error) = params.error.as_deref() {
        tracing::warn!(error, "Authorization declined");
        let jar = session::flash(jar, &format!("Authorization was not granted ({}).", error), secure);
        return (jar, Redirect::to("/pick"));
    }
    if !state_ok {
        tracing::warn!("OAuth callback with missing or mismatched state");
        let jar = session::flash(jar, "Authorization failed: please start again.", secure);
        return (jar, Redirect::to("/pick"));
    }
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::error!("OAuth callback without a code");
        let jar = session::flash(jar, "Authorization failed: missing code.", secure);
        return (jar, Redirect::to("/pick"));
    };

    let stored = match state.oauth.exchange_code(&code).await {
        Ok(resp) => state.tokens.store_authorization(resp).await,
        Err(e) => Err(e),
    };
    match stored {
        Ok(()) => (jar, Redirect::to("/pick/start")),
        Err(e) => {
            tracing::error!("Authorization failed: {}", e);
            let message = match e {
                AppError::Auth(_) => {
                    "Authorization failed (token exchange). Check the client id, secret and redirect URI."
                }
                AppError::Storage(_) => "Authorized, but the credentials could not be saved.",
                _ => "Authorization failed due to a network error.",
            };
            (session::flash(jar, message, secure), Redirect::to("/pick"))
        }
    }
}

pub async fn auth_signout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(sid) = session::session_id(&jar) {
        if let Some(flow) = state.flows.remove(&sid) {
            tracing::info!(session_id = %flow.session.session_id, "Dropped pick flow on sign-out");
        }
    }
    let jar = session::end_session(jar);
    (session::flash(jar, "Signed out.", secure_cookies(&state)), Redirect::to("/pick"))
}

// ── Pick flow ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct BeginParams {
    pub direct: Option<String>,
}

/// Begin-pick: create a picker session for this browser and start watching it.
pub async fn begin_pick(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<BeginParams>,
) -> (CookieJar, Redirect) {
    let secure = secure_cookies(&state);
    let (jar, sid) = session::ensure_session(jar, secure);

    match state.flows.begin(&sid).await {
        Ok(session) => {
            let direct = matches!(params.direct.as_deref(), Some("1" | "true" | "yes"));
            if direct {
                (jar, Redirect::to(&session.autoclose_uri()))
            } else {
                (jar, Redirect::to("/pick/status"))
            }
        }
        Err(AppError::Auth(reason)) => {
            tracing::info!(reason = %reason, "Pick requested without usable credentials");
            let jar = session::flash(jar, "Not authorized. Please authorize first.", secure);
            (jar, Redirect::to("/auth/start"))
        }
        Err(e) => {
            tracing::error!("Could not start picker session: {}", e);
            let jar = session::flash(
                jar,
                "Failed to create a picker session. Is the Photos Picker API enabled for this client?",
                secure,
            );
            (jar, Redirect::to("/pick"))
        }
    }
}

pub async fn pick_status(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let flow = session::session_id(&jar).and_then(|sid| state.flows.get(&sid));
    match flow {
        Some(flow) if flow.phase == FlowPhase::Pending => {
            Html(pages::pick_status(&flow.session)).into_response()
        }
        Some(_) => Redirect::to("/pick/complete").into_response(),
        None => {
            let jar = session::flash(jar, "No pick in progress.", secure_cookies(&state));
            (jar, Redirect::to("/pick")).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PickStatus {
    pub state: &'static str,
    pub retry_after_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Flow state for the status page. Reads memory only; never calls upstream.
pub async fn api_pick(State(state): State<Arc<AppState>>, jar: CookieJar) -> Json<PickStatus> {
    let flow = session::session_id(&jar).and_then(|sid| state.flows.get(&sid));
    let Some(flow) = flow else {
        return Json(PickStatus {
            state: "none",
            retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            count: None,
            message: None,
        });
    };

    let retry_after_secs = flow.session.poll_interval.as_secs().max(1);
    let status = match flow.phase {
        FlowPhase::Pending => PickStatus {
            state: "pending",
            retry_after_secs,
            count: None,
            message: None,
        },
        FlowPhase::Completed { count } => PickStatus {
            state: "completed",
            retry_after_secs,
            count: Some(count),
            message: None,
        },
        FlowPhase::Expired => PickStatus {
            state: "expired",
            retry_after_secs,
            count: None,
            message: Some("The picker session expired.".into()),
        },
        FlowPhase::Failed { message } => PickStatus {
            state: "failed",
            retry_after_secs,
            count: None,
            message: Some(message),
        },
    };
    Json(status)
}

/// Await-completion: route the browser according to the flow's phase.
pub async fn pick_complete(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let secure = secure_cookies(&state);
    let Some(sid) = session::session_id(&jar) else {
        return (jar, Redirect::to("/pick/start"));
    };

    match state.flows.get(&sid).map(|f| f.phase) {
        Some(FlowPhase::Pending) => (jar, Redirect::to("/pick/status")),
        Some(FlowPhase::Completed { count }) => {
            state.flows.remove(&sid);
            tracing::info!(count, "Pick completed, starting slideshow");
            (jar, Redirect::to("/slideshow"))
        }
        Some(FlowPhase::Failed { message }) => {
            state.flows.remove(&sid);
            (session::flash(jar, &message, secure), Redirect::to("/pick"))
        }
        Some(FlowPhase::Expired) | None => {
            state.flows.remove(&sid);
            tracing::info!("No live picker session, starting a new one");
            (jar, Redirect::to("/pick/start"))
        }
    }
}

// ── Slideshow ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SlideshowParams {
    pub interval: Option<u64>,
    pub refresh: Option<u64>,
}

pub async fn slideshow(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SlideshowParams>,
) -> Html<String> {
    let settings = SlideshowSettings {
        interval_secs: state.config.advance_seconds,
        refresh_minutes: state.config.refresh_minutes,
        music: state.config.music.clone(),
    }
    .with_overrides(params.interval, params.refresh);

    let items = state.selection.load().await;
    tracing::debug!(count = items.len(), "Rendering slideshow");
    Html(SlideshowView::from_items(&items, settings).render())
}

#[derive(Debug, Serialize)]
pub struct SelectionEntry {
    pub index: usize,
    pub src: String,
    pub kind: &'static str,
    pub filename: String,
    pub mime_type: String,
    pub creation_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub saved_at: Option<DateTime<Utc>>,
    pub count: usize,
    pub items: Vec<SelectionEntry>,
}

/// Selection without base URLs; those stay server-side.
pub async fn api_selection(State(state): State<Arc<AppState>>) -> Result<Json<SelectionResponse>, AppError> {
    let selection = state.selection.try_load().await?.unwrap_or(crate::store::selection::Selection {
        saved_at: None,
        items: Vec::new(),
    });
    let items: Vec<SelectionEntry> = selection
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| SelectionEntry {
            index,
            src: format!("/content/{}", index),
            kind: item.kind().as_str(),
            filename: item.filename.clone(),
            mime_type: item.mime_type.clone(),
            creation_time: item.creation_time,
        })
        .collect();
    Ok(Json(SelectionResponse {
        saved_at: selection.saved_at,
        count: items.len(),
        items,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentParams {
    pub kind: Option<String>,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

/// Media proxy: fetch the item's bytes with the server-side token.
pub async fn content(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Query(params): Query<ContentParams>,
) -> Result<Response, AppError> {
    let items = state.selection.load().await;
    let item = items.get(index).ok_or(AppError::NotFound)?;

    let kind = params
        .kind
        .as_deref()
        .map(MediaKind::parse)
        .unwrap_or_else(|| item.kind());
    let width = params.w.unwrap_or(DEFAULT_MEDIA_WIDTH).clamp(1, MAX_MEDIA_EDGE);
    let height = params.h.unwrap_or(DEFAULT_MEDIA_HEIGHT).clamp(1, MAX_MEDIA_EDGE);

    let (content_type, bytes) = state
        .flows
        .picker()
        .fetch_media(item, kind, width, height)
        .await?;

    let content_type =
        HeaderValue::from_str(&content_type).unwrap_or(HeaderValue::from_static("application/octet-stream"));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=1800")),
        ],
        bytes,
    )
        .into_response())
}

// ── Diagnostics ──────────────────────────────────────────────

const DIAG_ITEMS: usize = 5;

pub async fn diag(State(state): State<Arc<AppState>>) -> Html<String> {
    let status = state.tokens.status().await;
    let items = state.selection.load().await;
    let shown = &items[..items.len().min(DIAG_ITEMS)];
    Html(pages::diag(&status, items.len(), shown))
}
