//! Small server-rendered HTML pages around the pick flow.

use crate::models::picker::{MediaItem, PickerSession};
use crate::models::token::TokenStatus;
use crate::slideshow::escape_html;

const STYLE: &str = r#"<style>
body { font: 16px/1.5 system-ui, sans-serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; color: #222; }
a.button, button { display: inline-block; padding: .45rem .9rem; border-radius: 6px; background: #1a73e8; color: #fff; text-decoration: none; border: 0; font: inherit; cursor: pointer; }
.flash { background: #fff4e5; border: 1px solid #f0b35b; padding: .6rem .9rem; border-radius: 6px; }
.muted { color: #666; }
code { background: #f3f3f3; padding: 0 .25rem; }
table { border-collapse: collapse; } td, th { padding: .25rem .6rem; border-bottom: 1px solid #eee; text-align: left; }
</style>"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title}</title>{STYLE}</head><body>\n{body}\n</body></html>\n",
        title = escape_html(title),
        STYLE = STYLE,
        body = body,
    )
}

fn flash_block(flash: Option<&str>) -> String {
    flash
        .map(|m| format!("<p class=\"flash\">{}</p>", escape_html(m)))
        .unwrap_or_default()
}

pub fn home(status: &TokenStatus, selected: usize, flash: Option<&str>) -> String {
    let auth = if status.authorized {
        let expiry = status
            .expires_at
            .map(|t| format!(" (access token valid until {})", t.format("%Y-%m-%d %H:%M UTC")))
            .unwrap_or_default();
        format!("<p>Google Photos access: <strong>authorized</strong>{}</p>", expiry)
    } else {
        "<p>Google Photos access: <strong>not authorized</strong></p>".to_string()
    };

    let body = format!(
        r#"<h1>Photo frame</h1>
{flash}
{auth}
<p class="muted">{selected} item(s) currently selected.</p>
<ol>
<li><a class="button" href="/auth/start">Authorize with Google</a></li>
<li><form method="post" action="/pick/start"><button type="submit">Pick photos</button></form></li>
<li><a class="button" href="/slideshow">Launch slideshow</a></li>
</ol>
<p class="muted"><a href="/diag">Diagnostics</a> · <a href="/auth/signout">Sign out</a></p>"#,
        flash = flash_block(flash),
        auth = auth,
        selected = selected,
    );
    layout("Photo frame", &body)
}

pub fn pick_status(session: &PickerSession) -> String {
    let body = format!(
        r#"<h1>Pick your photos</h1>
<p><a class="button" href="{uri}" target="_blank" rel="noopener">Open Google Photos picker</a></p>
<p id="status" class="muted">Waiting for you to finish picking…</p>
<p class="muted">Session <code>{id}</code>. This page updates by itself.</p>
<script>
(() => {{
  const status = document.getElementById('status');
  async function check() {{
    let delay = 3;
    try {{
      const r = await fetch('/api/pick', {{ credentials: 'same-origin', cache: 'no-store' }});
      const s = await r.json();
      delay = Math.max(1, s.retry_after_secs || delay);
      if (s.state !== 'pending') {{ location.href = '/pick/complete'; return; }}
    }} catch (e) {{
      status.textContent = 'Lost contact with the frame, retrying…';
    }}
    setTimeout(check, delay * 1000);
  }}
  setTimeout(check, 1000);
}})();
</script>"#,
        uri = escape_html(&session.autoclose_uri()),
        id = escape_html(&session.session_id),
    );
    layout("Pick photos", &body)
}

pub fn diag(status: &TokenStatus, total: usize, items: &[MediaItem]) -> String {
    let rows: String = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "<tr><td>{i}</td><td>{name}</td><td>{mime}</td><td>{created}</td>\
                 <td><a href=\"/content/{i}?kind={kind}&w=400&h=300\">open</a></td></tr>",
                i = i,
                name = escape_html(&item.filename),
                mime = escape_html(&item.mime_type),
                created = item
                    .creation_time
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                kind = item.kind().as_str(),
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Diagnostics</h1>
<p>Authorized: <strong>{authorized}</strong>. Scopes: <code>{scopes}</code></p>
<p>Showing {shown} of {total} selected item(s).</p>
<table><tr><th>#</th><th>File</th><th>Type</th><th>Created</th><th></th></tr>
{rows}
</table>
<p><a href="/pick">Back</a></p>"#,
        authorized = status.authorized,
        scopes = escape_html(&status.scopes.join(" ")),
        shown = items.len(),
        total = total,
        rows = rows,
    );
    layout("Diagnostics", &body)
}
