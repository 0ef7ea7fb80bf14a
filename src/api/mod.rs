use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;
pub mod pages;
pub mod session;

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::healthz))
        .route("/favicon.ico", get(handlers::favicon))
        .route("/pick", get(handlers::home))
        .route("/auth/start", get(handlers::auth_start))
        .route("/auth/callback", get(handlers::auth_callback))
        .route("/auth/signout", get(handlers::auth_signout))
        .route(
            "/pick/start",
            get(handlers::begin_pick).post(handlers::begin_pick),
        )
        .route("/pick/status", get(handlers::pick_status))
        .route("/pick/complete", get(handlers::pick_complete))
        .route("/api/pick", get(handlers::api_pick))
        .route("/api/selection", get(handlers::api_selection))
        .route("/slideshow", get(handlers::slideshow))
        .route("/screensaver", get(handlers::slideshow))
        .route("/content/:index", get(handlers::content))
        .route("/diag", get(handlers::diag))
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Tag every response with an `x-request-id` so browser reports can be matched to logs.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Browser hardening headers. Media comes from this origin only; the optional
/// music player is the one YouTube frame the slideshow may load.
async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; img-src 'self'; media-src 'self'; \
             script-src 'self' 'unsafe-inline' https://www.youtube.com https://s.ytimg.com; \
             frame-src https://www.youtube.com; style-src 'self' 'unsafe-inline'; \
             form-action 'self' https://accounts.google.com",
        ),
    );
    // Media responses set their own caching; everything else is per-request.
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
    headers.remove(header::SERVER);

    resp
}
