//! Router-level tests: the real axum app against wiremock'd Google endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use photoframe::config::Config;
use photoframe::models::picker::MediaItem;
use photoframe::{api, AppState};

struct TestApp {
    server: MockServer,
    state: Arc<AppState>,
    router: Router,
    dir: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Config::for_upstream(&server.uri(), dir.path())).unwrap();
        let router = api::router(state.clone());
        TestApp {
            server,
            state,
            router,
            dir,
        }
    }

    async fn authorized() -> Self {
        let app = Self::new().await;
        let expiry = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        std::fs::write(
            app.dir.path().join("tokens.json"),
            json!({
                "access_token": "at-kiosk",
                "refresh_token": "rt-kiosk",
                "token_type": "Bearer",
                "expiry": expiry,
                "scope": []
            })
            .to_string(),
        )
        .unwrap();
        app
    }

    async fn send(&self, req: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> axum::response::Response {
        let mut req = Request::builder().uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}

fn location(resp: &axum::response::Response) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// `name=value` of a cookie set by the response.
fn set_cookie(resp: &axum::response::Response, name: &str) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn item(name: &str, base: &str) -> MediaItem {
    MediaItem {
        id: name.into(),
        base_url: format!("{}/media/{}", base, name),
        mime_type: "image/jpeg".into(),
        filename: format!("{}.jpg", name),
        creation_time: None,
    }
}

#[tokio::test]
async fn test_healthz() {
    let app = TestApp::new().await;
    let resp = app.get("/healthz", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(
        resp.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(body_json(resp).await, json!({"ok": true}));
}

#[tokio::test]
async fn test_root_redirects_and_favicon_is_empty() {
    let app = TestApp::new().await;
    let resp = app.get("/", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/pick");

    assert_eq!(app.get("/favicon.ico", None).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.get("/nope", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_home_issues_browser_session() {
    let app = TestApp::new().await;
    let resp = app.get("/pick", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(set_cookie(&resp, "photoframe_sid").is_some());
    assert!(body_string(resp).await.contains("not authorized"));
}

#[tokio::test]
async fn test_empty_selection_shows_placeholder() {
    let app = TestApp::new().await;
    let resp = app.get("/slideshow", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_string(resp).await;
    assert!(html.contains("No photos selected"));

    let resp = app.get("/api/selection", None).await;
    assert_eq!(body_json(resp).await["count"], 0);
}

#[tokio::test]
async fn test_slideshow_plays_saved_selection_in_order() {
    let app = TestApp::new().await;
    let base = app.server.uri();
    app.state
        .selection
        .save(&[item("b", &base), item("a", &base)])
        .await
        .unwrap();

    let html = body_string(app.get("/screensaver?interval=3", None).await).await;
    let b = html.find("b.jpg").unwrap();
    let a = html.find("a.jpg").unwrap();
    assert!(b < a);
    assert!(html.contains("const INTERVAL_MS = 3 * 1000;"));
    assert!(!html.contains("/media/"), "base URLs must stay server-side");

    let listing = body_json(app.get("/api/selection", None).await).await;
    assert_eq!(listing["count"], 2);
    assert_eq!(listing["items"][0]["filename"], "b.jpg");
    assert_eq!(listing["items"][0]["src"], "/content/0");
    assert!(listing["items"][0].get("baseUrl").is_none());
}

#[tokio::test]
async fn test_content_proxy_uses_server_token() {
    let app = TestApp::authorized().await;
    let base = app.server.uri();
    app.state.selection.save(&[item("a", &base)]).await.unwrap();

    Mock::given(method("GET"))
        .and(path("/media/a=w640-h360"))
        .and(wiremock::matchers::header("authorization", "Bearer at-kiosk"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"jpeg-bytes".to_vec()),
        )
        .expect(1)
        .mount(&app.server)
        .await;

    let resp = app.get("/content/0?kind=image&w=640&h=360", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/jpeg");
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).unwrap(),
        "private, max-age=1800"
    );
    assert_eq!(body_string(resp).await, "jpeg-bytes");

    assert_eq!(app.get("/content/7", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_without_credentials_is_unauthorized() {
    let app = TestApp::new().await;
    let base = app.server.uri();
    app.state.selection.save(&[item("a", &base)]).await.unwrap();

    let resp = app.get("/content/0", None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], "authorization_required");
}

#[tokio::test]
async fn test_begin_pick_without_credentials_goes_to_consent() {
    let app = TestApp::new().await;
    let resp = app.get("/pick/start", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/start");
}

#[tokio::test]
async fn test_oauth_round_trip_stores_tokens() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-new",
            "refresh_token": "rt-new",
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": photoframe::config::PICKER_SCOPE
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let start = app.get("/auth/start", None).await;
    assert_eq!(start.status(), StatusCode::SEE_OTHER);
    let consent = url::Url::parse(&location(&start)).unwrap();
    let nonce = consent
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    let state_cookie = set_cookie(&start, "photoframe_oauth_state").unwrap();

    let resp = app
        .get(
            &format!("/auth/callback?code=auth-code&state={}", nonce),
            Some(&state_cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/pick/start");
    assert!(app.state.tokens.status().await.authorized);
}

#[tokio::test]
async fn test_callback_with_forged_state_is_rejected() {
    let app = TestApp::new().await;
    let resp = app
        .get(
            "/auth/callback?code=x&state=forged",
            Some("photoframe_oauth_state=expected"),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/pick");
    assert!(set_cookie(&resp, "photoframe_flash").is_some());
    assert!(!app.state.tokens.status().await.authorized);
}

#[tokio::test]
async fn test_complete_without_flow_restarts_pick() {
    let app = TestApp::new().await;
    let resp = app
        .get("/pick/complete", Some("photoframe_sid=6f1c1f9e-3c55-4d7e-9d1c-2b8f6a1e4c11"))
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/pick/start");

    let status = body_json(app.get("/api/pick", None).await).await;
    assert_eq!(status["state"], "none");
}

/// Begin-pick, two PENDING polls, MEDIA_ITEMS_SET, two items listed:
/// the browser lands on a slideshow of exactly those two items.
#[tokio::test]
async fn test_pick_flow_end_to_end() {
    let app = TestApp::authorized().await;
    let base = app.server.uri();
    let session = |done: bool| {
        json!({
            "id": "sess-1",
            "pickerUri": "https://photos.google.com/picker/sess-1",
            "pollingConfig": {"pollInterval": "0.05s", "timeoutIn": "1800s"},
            "mediaItemsSet": done
        })
    };

    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session(false)))
        .expect(1)
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sessions/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session(false)))
        .up_to_n_times(2)
        .expect(2)
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sessions/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session(true)))
        .with_priority(10)
        .expect(1)
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/mediaItems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mediaItems": [
                {"id": "p1", "mediaFile": {"baseUrl": format!("{}/media/p1", base), "mimeType": "image/jpeg", "filename": "first.jpg"}},
                {"id": "p2", "mediaFile": {"baseUrl": format!("{}/media/p2", base), "mimeType": "image/png", "filename": "second.png"}}
            ]
        })))
        .expect(1)
        .mount(&app.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sessions/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&app.server)
        .await;

    let begin = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/pick/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(begin.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&begin), "/pick/status");
    let sid = set_cookie(&begin, "photoframe_sid").unwrap();

    let status_page = body_string(app.get("/pick/status", Some(&sid)).await).await;
    assert!(status_page.contains("https://photos.google.com/picker/sess-1/autoclose"));

    let mut last = Value::Null;
    for _ in 0..200 {
        last = body_json(app.get("/api/pick", Some(&sid)).await).await;
        if last["state"] != "pending" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(last["state"], "completed", "flow ended as {}", last);
    assert_eq!(last["count"], 2);

    let done = app.get("/pick/complete", Some(&sid)).await;
    assert_eq!(location(&done), "/slideshow");

    let html = body_string(app.get("/slideshow", None).await).await;
    assert!(html.contains("first.jpg"));
    assert!(html.contains("second.png"));
    assert!(html.find("first.jpg").unwrap() < html.find("second.png").unwrap());
    assert!(!html.contains("No photos selected"));
}

#[tokio::test]
async fn test_direct_begin_redirects_to_picker() {
    let app = TestApp::authorized().await;
    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sess-d",
            "pickerUri": "https://photos.google.com/picker/sess-d",
            "pollingConfig": {"pollInterval": "5s"}
        })))
        .mount(&app.server)
        .await;

    let resp = app.get("/pick/start?direct=1", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&resp),
        "https://photos.google.com/picker/sess-d/autoclose"
    );
}

#[tokio::test]
async fn test_picker_api_failure_flashes_and_returns_home() {
    let app = TestApp::authorized().await;
    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
        .mount(&app.server)
        .await;

    let resp = app.get("/pick/start", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/pick");
    let flash = set_cookie(&resp, "photoframe_flash").unwrap();

    let home = body_string(app.get("/pick", Some(&flash)).await).await;
    assert!(home.contains("Failed to create a picker session"));
}

#[tokio::test]
async fn test_revoked_token_sends_begin_pick_to_consent() {
    let app = TestApp::authorized().await;
    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("UNAUTHENTICATED"))
        .expect(1)
        .mount(&app.server)
        .await;

    let resp = app.get("/pick/start", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/start");
    let flash = set_cookie(&resp, "photoframe_flash").unwrap();

    let home = body_string(app.get("/pick", Some(&flash)).await).await;
    assert!(home.contains("Not authorized"));
}
