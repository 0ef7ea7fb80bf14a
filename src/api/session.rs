//! Browser-side cookies: the per-browser session id that keys pick flows,
//! one-shot flash messages, and the OAuth `state` nonce.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const SESSION_COOKIE: &str = "photoframe_sid";
pub const FLASH_COOKIE: &str = "photoframe_flash";
const OAUTH_STATE_COOKIE: &str = "photoframe_oauth_state";

fn build(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

/// This browser's session id, if it already has one.
pub fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| uuid::Uuid::parse_str(v).is_ok())
}

/// Existing session id, or a freshly issued one added to the jar.
pub fn ensure_session(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    match session_id(&jar) {
        Some(sid) => (jar, sid),
        None => {
            let sid = uuid::Uuid::new_v4().to_string();
            let jar = jar.add(build(SESSION_COOKIE, sid.clone(), secure));
            (jar, sid)
        }
    }
}

pub fn end_session(jar: CookieJar) -> CookieJar {
    jar.remove(removal(SESSION_COOKIE))
        .remove(removal(OAUTH_STATE_COOKIE))
}

pub fn flash(jar: CookieJar, message: &str, secure: bool) -> CookieJar {
    jar.add(build(
        FLASH_COOKIE,
        urlencoding::encode(message).into_owned(),
        secure,
    ))
}

/// Read and clear the pending flash message.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<String>) {
    let message = jar
        .get(FLASH_COOKIE)
        .and_then(|c| urlencoding::decode(c.value()).ok().map(|m| m.into_owned()))
        .filter(|m| !m.is_empty());
    match message {
        Some(m) => (jar.remove(removal(FLASH_COOKIE)), Some(m)),
        None => (jar, None),
    }
}

pub fn with_oauth_state(jar: CookieJar, state: &str, secure: bool) -> CookieJar {
    jar.add(build(OAUTH_STATE_COOKIE, state.to_string(), secure))
}

/// Consume the stored OAuth state and compare it with the callback's.
pub fn take_oauth_state(jar: CookieJar, returned: Option<&str>) -> (CookieJar, bool) {
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let matches = matches!((expected.as_deref(), returned), (Some(e), Some(r)) if !e.is_empty() && e == r);
    (jar.remove(removal(OAUTH_STATE_COOKIE)), matches)
}
