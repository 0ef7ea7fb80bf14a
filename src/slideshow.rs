//! Full-screen slideshow page.
//!
//! The page embeds the ordered playlist as JSON. Each slide carries its
//! successor (`(index + 1) % len`) and the browser just follows it. Media never
//! leaves through a raw base URL: every slide points at `/content/{index}`,
//! which the server proxies with its own token. The page reloads itself every
//! `refresh_minutes` so a long-running kiosk picks up a new selection.
//!
//! A control bar offers a fullscreen toggle (also `F`) and, when configured,
//! a background YouTube music player with play/skip/mute/volume controls.

use serde::Serialize;

use crate::models::picker::{MediaItem, MediaKind};

pub const DEFAULT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_REFRESH_MINUTES: u64 = 60;
pub const DEFAULT_MUSIC_VOLUME: u8 = 60;

/// Background YouTube audio played under the slideshow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicSettings {
    /// Single video, looped when no playlist is set.
    pub video_id: String,
    /// Takes precedence over `video_id`.
    pub playlist_id: String,
    /// 0..=100
    pub volume: u8,
    /// Keep the player off-screen (audio only).
    pub hide_video: bool,
}

impl MusicSettings {
    /// `None` unless a video or playlist id is given. Ids keep only YouTube id characters.
    pub fn new(video_id: &str, playlist_id: &str, volume: Option<u8>, hide_video: bool) -> Option<Self> {
        let video_id = youtube_id(video_id);
        let playlist_id = youtube_id(playlist_id);
        if video_id.is_empty() && playlist_id.is_empty() {
            return None;
        }
        Some(Self {
            video_id,
            playlist_id,
            volume: volume.unwrap_or(DEFAULT_MUSIC_VOLUME).min(100),
            hide_video,
        })
    }
}

fn youtube_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideshowSettings {
    pub interval_secs: u64,
    /// 0 disables the periodic reload.
    pub refresh_minutes: u64,
    pub music: Option<MusicSettings>,
}

impl Default for SlideshowSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            refresh_minutes: DEFAULT_REFRESH_MINUTES,
            music: None,
        }
    }
}

impl SlideshowSettings {
    /// Apply per-request overrides; the advance interval never drops below 1s.
    pub fn with_overrides(self, interval: Option<u64>, refresh: Option<u64>) -> Self {
        Self {
            interval_secs: interval.unwrap_or(self.interval_secs).max(1),
            refresh_minutes: refresh.unwrap_or(self.refresh_minutes),
            music: self.music,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slide {
    pub index: usize,
    /// Slide shown after this one; the last wraps to the first.
    pub next: usize,
    pub src: String,
    pub kind: &'static str,
    pub filename: String,
}

/// Successor of `idx` in a playlist of `len` slides.
pub fn next_index(idx: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (idx + 1) % len
    }
}

#[derive(Debug, Clone)]
pub struct SlideshowView {
    pub slides: Vec<Slide>,
    pub settings: SlideshowSettings,
}

impl SlideshowView {
    pub fn from_items(items: &[MediaItem], settings: SlideshowSettings) -> Self {
        let len = items.len();
        let slides = items
            .iter()
            .enumerate()
            .map(|(index, item)| Slide {
                index,
                next: next_index(index, len),
                src: format!("/content/{}", index),
                kind: item.kind().as_str(),
                filename: item.filename.clone(),
            })
            .collect();
        Self { slides, settings }
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn render(&self) -> String {
        render(self)
    }
}

/// Serialize for embedding inside a `<script>` element.
fn script_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const CONTROLS_CSS: &str = r#"
#controls { position:fixed; left:12px; bottom:12px; display:flex; align-items:center; gap:8px;
  background:rgba(0,0,0,.55); border:1px solid rgba(255,255,255,.15); border-radius:10px;
  padding:8px 10px; color:#eee; font:13px system-ui, sans-serif; z-index:10000;
  transition:opacity .25s ease; cursor:default; }
#controls button { border:none; outline:none; padding:6px 8px; border-radius:6px;
  background:#1a1a1a; color:#fff; cursor:pointer; display:flex; align-items:center; }
#controls button:hover { background:#333; }
#controls .spacer { width:1px; height:22px; background:#555; opacity:.4; }
#controls input[type=range] { width:120px; accent-color:#08c; }
#controls .label { max-width:220px; white-space:nowrap; overflow:hidden; text-overflow:ellipsis; }
body.idle #controls { opacity:0; pointer-events:none; }
#music { position:fixed; right:12px; bottom:12px; width:200px; height:200px; z-index:9999; }
#music.hidden { left:-10000px; top:-10000px; opacity:0; pointer-events:none; }
"#;

const MUSIC_CONTROLS_HTML: &str = r#"<button id="music-prev" title="Previous (Shift+Left)">&#x23EE;</button>
<button id="music-play" title="Play/Pause (Space)">&#x23EF;</button>
<button id="music-next" title="Next (Shift+Right)">&#x23ED;</button>
<span class="spacer"></span>
<button id="music-mute" title="Mute/Unmute (M)">&#x1F508;</button>
<input id="music-volume" type="range" min="0" max="100" step="1" title="Volume">
<span class="spacer"></span>
<span id="music-label" class="label">Now playing&#x2026;</span>
<span class="spacer"></span>
"#;

const FULLSCREEN_BUTTON_HTML: &str = r#"<button id="fs-toggle" title="Fullscreen" aria-label="Toggle fullscreen">
<svg id="fs-enter" width="16" height="16" viewBox="0 0 24 24" fill="none" aria-hidden="true"><path stroke="currentColor" stroke-width="2" stroke-linecap="round" d="M3 10V3h7M21 14v7h-7M10 21H3v-7M21 3v7"/></svg>
<svg id="fs-exit" width="16" height="16" viewBox="0 0 24 24" fill="none" aria-hidden="true" style="display:none"><path stroke="currentColor" stroke-width="2" stroke-linecap="round" d="M7 7h4V3M17 17h-4v4M7 17h4v4M17 7h-4V3"/></svg>
</button>"#;

/// Fullscreen toggle (button and `F`), idle auto-hide of the control bar.
const CONTROLS_JS: &str = r#"
(() => {
  const btn = document.getElementById('fs-toggle');
  const enterIcon = document.getElementById('fs-enter');
  const exitIcon = document.getElementById('fs-exit');
  const isFullscreen = () => !!document.fullscreenElement;

  async function enter() {
    try { await document.documentElement.requestFullscreen({ navigationUI: 'hide' }); }
    catch (e) { console.warn('requestFullscreen failed:', e); }
  }
  async function exit() {
    try { await document.exitFullscreen(); }
    catch (e) { console.warn('exitFullscreen failed:', e); }
  }
  function update() {
    const on = isFullscreen();
    btn.title = on ? 'Minimize (exit fullscreen)' : 'Fullscreen';
    enterIcon.style.display = on ? 'none' : '';
    exitIcon.style.display = on ? '' : 'none';
  }

  btn.addEventListener('click', async () => {
    if (isFullscreen()) await exit(); else await enter();
    update();
  });
  document.addEventListener('fullscreenchange', update);
  document.addEventListener('keydown', (e) => {
    if (e.key.toLowerCase() === 'f' && !e.ctrlKey && !e.altKey && !e.metaKey) {
      e.preventDefault();
      btn.click();
    }
  });
  // Kiosk browsers may already be fullscreen; otherwise this needs a user gesture and may be refused.
  if (!isFullscreen() && document.documentElement.requestFullscreen) enter().then(update);
  update();

  let idleTimer = null;
  function bump() {
    document.body.classList.remove('idle');
    clearTimeout(idleTimer);
    idleTimer = setTimeout(() => document.body.classList.add('idle'), 3000);
  }
  ['mousemove', 'mousedown', 'keydown', 'touchstart'].forEach(ev =>
    document.addEventListener(ev, bump, { passive: true }));
  bump();
})();
"#;

/// YouTube IFrame player: controls, keyboard shortcuts, a watchdog that skips
/// tracks that never reach PLAYING, and a muted-start fallback for autoplay policies.
const MUSIC_JS: &str = r#"
(() => {
  const WATCHDOG_MS = 10000;
  const $ = (id) => document.getElementById(id);
  const play = $('music-play'), prev = $('music-prev'), next = $('music-next');
  const mute = $('music-mute'), vol = $('music-volume'), label = $('music-label');
  if (MUSIC.hideVideo) $('music').classList.add('hidden');

  let player = null;
  let watchdog = null;
  let labelTimer = null;

  function arm() {
    clearTimeout(watchdog);
    watchdog = setTimeout(() => {
      try {
        if (player.getPlayerState() !== YT.PlayerState.PLAYING) player.nextVideo();
      } catch (e) { console.warn('Music watchdog failed:', e); }
    }, WATCHDOG_MS);
  }
  function disarm() { clearTimeout(watchdog); watchdog = null; }

  const setPlaying = (on) => { play.textContent = on ? '⏸' : '⏯'; };
  const setMuted = (on) => { mute.textContent = on ? '\u{1F507}' : '\u{1F508}'; };

  function fallbackLabel() {
    try {
      const i = player.getPlaylistIndex();
      const list = player.getPlaylist() || [];
      if (i != null && i >= 0 && i < list.length) return 'Track ' + (i + 1);
      const m = /[?&]v=([^&]+)/.exec(player.getVideoUrl());
      return m ? 'Video ' + m[1] : 'Now playing…';
    } catch (e) { return 'Now playing…'; }
  }
  function updateLabel() {
    let title = '';
    try { const d = player.getVideoData(); title = d && d.title ? d.title.trim() : ''; } catch (e) {}
    label.textContent = title || fallbackLabel();
  }
  function pollLabel() {
    clearInterval(labelTimer);
    let tries = 0;
    labelTimer = setInterval(() => {
      updateLabel();
      if (++tries >= 10) clearInterval(labelTimer);
    }, 2000);
  }

  function onReady() {
    try {
      player.setVolume(MUSIC.volume);
      vol.value = player.getVolume();
      setMuted(player.isMuted());
      updateLabel();
      pollLabel();
      player.unMute();
      player.playVideo();
      arm();
      setTimeout(() => {
        if (player.getPlayerState() === YT.PlayerState.PLAYING) return;
        player.mute(); setMuted(true);
        player.playVideo();
        let tries = 0;
        const unmute = () => {
          try { player.unMute(); setMuted(false); } catch (e) {}
          if (++tries < 5) setTimeout(unmute, 3000);
        };
        setTimeout(unmute, 2000);
      }, 800);
    } catch (e) { console.warn('Music init failed:', e); }
  }

  function onState(e) {
    const st = e.data;
    setPlaying(st === YT.PlayerState.PLAYING);
    if (st === YT.PlayerState.PLAYING) { disarm(); updateLabel(); pollLabel(); }
    else if (st === YT.PlayerState.BUFFERING || st === YT.PlayerState.UNSTARTED) { arm(); updateLabel(); pollLabel(); }
    else if (st === YT.PlayerState.PAUSED) disarm();
    else arm();
  }

  function onError(e) {
    console.error('Music player error', e);
    try { player.nextVideo(); arm(); } catch (err) {}
  }

  window.onYouTubeIframeAPIReady = () => {
    const vars = { autoplay: 1, controls: 0, disablekb: 1, modestbranding: 1, rel: 0, fs: 0,
                   playsinline: 1, loop: 1, origin: location.origin };
    const events = { onReady, onStateChange: onState, onError };
    if (MUSIC.playlistId) {
      player = new YT.Player('music', { width: 200, height: 200,
        playerVars: { ...vars, listType: 'playlist', list: MUSIC.playlistId }, events });
    } else {
      player = new YT.Player('music', { width: 200, height: 200, videoId: MUSIC.videoId,
        playerVars: { ...vars, playlist: MUSIC.videoId }, events });
    }
  };

  play.addEventListener('click', () => {
    try {
      if (player.getPlayerState() === YT.PlayerState.PLAYING) player.pauseVideo();
      else player.playVideo();
    } catch (e) {}
  });
  prev.addEventListener('click', () => { try { player.previousVideo(); arm(); } catch (e) {} });
  next.addEventListener('click', () => { try { player.nextVideo(); arm(); } catch (e) {} });
  mute.addEventListener('click', () => {
    try {
      if (player.isMuted()) { player.unMute(); setMuted(false); }
      else { player.mute(); setMuted(true); }
    } catch (e) {}
  });
  vol.addEventListener('input', () => { try { player.setVolume(Number(vol.value)); } catch (e) {} });

  document.addEventListener('keydown', (ev) => {
    if (ev.code === 'Space') { ev.preventDefault(); play.click(); }
    else if (ev.key.toLowerCase() === 'm') mute.click();
    else if (ev.shiftKey && ev.code === 'ArrowLeft') prev.click();
    else if (ev.shiftKey && ev.code === 'ArrowRight') next.click();
  });
})();
"#;

pub fn render(view: &SlideshowView) -> String {
    let placeholder = if view.is_empty() {
        r#"<div class="empty">No photos selected<br><a href="/pick">Pick photos</a></div>"#
    } else {
        ""
    };

    let music = view.settings.music.as_ref();
    let (music_html, music_controls, music_script) = match music {
        Some(m) => (
            r#"<div id="music"></div>"#,
            MUSIC_CONTROLS_HTML,
            format!(
                "<script src=\"https://www.youtube.com/iframe_api\"></script>\n<script>\nconst MUSIC = {};\n{}</script>",
                script_json(m),
                MUSIC_JS
            ),
        ),
        None => ("", "", String::new()),
    };

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Photo frame</title>
<style>
html, body {{ margin:0; height:100%; background:#000; overflow:hidden; cursor:none; }}
.stage {{ position:fixed; inset:0; display:flex; align-items:center; justify-content:center; }}
.stage img, .stage video {{ max-width:100vw; max-height:100vh; width:100%; height:100%; object-fit:contain; }}
.fade {{ animation: fadein .8s ease-in; }}
@keyframes fadein {{ from {{ opacity:0 }} to {{ opacity:1 }} }}
.empty {{ color:#ccc; font:28px system-ui, sans-serif; text-align:center; cursor:default; }}
.empty a {{ color:#8ab4f8; font-size:18px; }}
{controls_css}</style>
</head>
<body>
<div class="stage">{placeholder}</div>
{music_html}
<div id="controls">
{music_controls}{fullscreen}
</div>
<script>
(() => {{
  const SLIDES = {slides};
  const INTERVAL_MS = {interval} * 1000;
  const REFRESH_MS = {refresh} * 60 * 1000;
  const stage = document.querySelector('.stage');

  if (REFRESH_MS > 0) setTimeout(() => location.reload(), REFRESH_MS);
  if (!SLIDES.length) return;

  function size() {{
    return {{
      w: Math.max(1, Math.round(window.innerWidth || 800)),
      h: Math.max(1, Math.round(window.innerHeight || 480)),
    }};
  }}

  function urlFor(slide, kind) {{
    const {{ w, h }} = size();
    return slide.src + '?' + new URLSearchParams({{ kind, w: String(w), h: String(h) }});
  }}

  let idx = 0;
  let timer = null;

  function schedule() {{
    clearTimeout(timer);
    timer = setTimeout(next, INTERVAL_MS);
  }}

  function next() {{
    idx = SLIDES[idx].next;
    show(idx);
  }}

  function skip(failedIdx) {{
    // Only move on if the failing slide is still the current one.
    if (failedIdx === idx && SLIDES.length > 1) next();
  }}

  function mount(el) {{
    el.className = 'fade';
    stage.innerHTML = '';
    stage.appendChild(el);
  }}

  function image(slide, i) {{
    const img = document.createElement('img');
    img.alt = slide.filename || '';
    img.addEventListener('error', () => skip(i));
    img.src = urlFor(slide, 'image');
    return img;
  }}

  function show(i) {{
    const slide = SLIDES[i];
    if (slide.kind === 'video') {{
      const video = document.createElement('video');
      video.autoplay = true;
      video.loop = true;
      video.muted = true;
      video.playsInline = true;
      // Videos fall back to their still frame once, then get skipped.
      video.addEventListener('error', () => {{ if (i === idx) mount(image(slide, i)); }});
      video.src = urlFor(slide, 'video');
      mount(video);
    }} else {{
      mount(image(slide, i));
    }}
    schedule();
  }}

  show(idx);
}})();
</script>
<script>{controls_js}</script>
{music_script}
</body>
</html>
"#,
        controls_css = CONTROLS_CSS,
        placeholder = placeholder,
        music_html = music_html,
        music_controls = music_controls,
        fullscreen = FULLSCREEN_BUTTON_HTML,
        slides = script_json(&view.slides),
        interval = view.settings.interval_secs,
        refresh = view.settings.refresh_minutes,
        controls_js = CONTROLS_JS,
        music_script = music_script,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, mime: &str) -> MediaItem {
        MediaItem {
            id: name.into(),
            base_url: format!("https://lh3.example/{}", name),
            mime_type: mime.into(),
            filename: name.into(),
            creation_time: None,
        }
    }

    #[test]
    fn test_slides_follow_selection_order() {
        let items = vec![
            item("c.jpg", "image/jpeg"),
            item("a.mp4", "video/mp4"),
            item("b.png", "image/png"),
        ];
        let view = SlideshowView::from_items(&items, SlideshowSettings::default());

        let names: Vec<_> = view.slides.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["c.jpg", "a.mp4", "b.png"]);
        assert_eq!(view.slides[1].src, "/content/1");
        assert_eq!(view.slides[1].kind, MediaKind::Video.as_str());
        assert_eq!(view.slides[2].kind, "image");
    }

    #[test]
    fn test_render_embeds_playlist_and_never_base_urls() {
        let items = vec![item("a.jpg", "image/jpeg"), item("b.jpg", "image/jpeg")];
        let html = SlideshowView::from_items(&items, SlideshowSettings::default()).render();

        assert!(html.contains(r#""src":"/content/0""#));
        assert!(html.contains(r#""src":"/content/1""#));
        assert!(html.contains("idx = SLIDES[idx].next"));
        assert!(!html.contains("lh3.example"));
        assert!(!html.contains("No photos selected"));
    }

    #[test]
    fn test_playback_wraps_to_first_slide() {
        let items = vec![item("a.jpg", "image/jpeg"), item("b.jpg", "image/jpeg")];
        let view = SlideshowView::from_items(&items, SlideshowSettings::default());

        let mut idx = 0;
        let mut order = Vec::new();
        for _ in 0..5 {
            order.push(view.slides[idx].filename.as_str());
            idx = view.slides[idx].next;
        }
        assert_eq!(order, vec!["a.jpg", "b.jpg", "a.jpg", "b.jpg", "a.jpg"]);

        let single = SlideshowView::from_items(&[item("only.jpg", "image/jpeg")], SlideshowSettings::default());
        assert_eq!(single.slides[0].next, 0);
        assert_eq!(next_index(3, 0), 0);
    }

    #[test]
    fn test_empty_selection_renders_placeholder() {
        let html = SlideshowView::from_items(&[], SlideshowSettings::default()).render();
        assert!(html.contains("No photos selected"));
        assert!(html.contains("const SLIDES = [];"));
    }

    #[test]
    fn test_settings_are_rendered() {
        let settings = SlideshowSettings::default().with_overrides(Some(4), Some(0));
        let html = SlideshowView::from_items(&[item("a.jpg", "image/jpeg")], settings).render();
        assert!(html.contains("const INTERVAL_MS = 4 * 1000;"));
        assert!(html.contains("const REFRESH_MS = 0 * 60 * 1000;"));
    }

    #[test]
    fn test_no_music_player_unless_configured() {
        let html = SlideshowView::from_items(&[item("a.jpg", "image/jpeg")], SlideshowSettings::default()).render();
        assert!(!html.contains("youtube.com/iframe_api"));
        assert!(!html.contains("music-play"));
        // The fullscreen toggle is always there.
        assert!(html.contains(r#"id="fs-toggle""#));
        assert!(html.contains("requestFullscreen"));
    }

    #[test]
    fn test_music_settings_are_rendered() {
        let settings = SlideshowSettings {
            music: MusicSettings::new("utbIKghScn8", "", Some(35), false),
            ..SlideshowSettings::default()
        };
        let html = SlideshowView::from_items(&[item("a.jpg", "image/jpeg")], settings).render();

        assert!(html.contains(r#"<script src="https://www.youtube.com/iframe_api"></script>"#));
        assert!(html.contains(
            r#"const MUSIC = {"videoId":"utbIKghScn8","playlistId":"","volume":35,"hideVideo":false};"#
        ));
        assert!(html.contains(r#"id="music-play""#));
        assert!(html.contains(r#"id="music-volume""#));
    }

    #[test]
    fn test_music_settings_validation() {
        assert_eq!(MusicSettings::new("", "  ", Some(50), true), None);

        let music = MusicSettings::new(" vid\"<x> ", "RDutbIKghScn8", Some(250), true).unwrap();
        assert_eq!(music.video_id, "vidx");
        assert_eq!(music.playlist_id, "RDutbIKghScn8");
        assert_eq!(music.volume, 100);
        assert!(music.hide_video);

        let music = MusicSettings::new("abc", "", None, true).unwrap();
        assert_eq!(music.volume, DEFAULT_MUSIC_VOLUME);
    }

    #[test]
    fn test_interval_floor() {
        let settings = SlideshowSettings::default().with_overrides(Some(0), None);
        assert_eq!(settings.interval_secs, 1);
        assert_eq!(settings.refresh_minutes, DEFAULT_REFRESH_MINUTES);
    }

    #[test]
    fn test_script_breakout_is_escaped() {
        let items = vec![item("</script><script>alert(1)</script>.jpg", "image/jpeg")];
        let html = SlideshowView::from_items(&items, SlideshowSettings::default()).render();
        assert!(!html.contains("</script><script>alert(1)"));
        assert!(html.contains(r"<\/script>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
