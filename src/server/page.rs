//! Viewer page served at `/timelapse` and `/webcam`.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::response::Html;

use crate::server::SharedContext;

/// Static facts about the negotiated stream shown on the page.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub stream_info: String,
    pub width: u32,
    pub height: u32,
}

const CONTROL_PATH: &str = "/control";
const FACE_PATH: &str = "/face";

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>lapse</title>
  <style>
    body { font-family: sans-serif; background: #111; color: #eee; }
    .controls label { display: inline-block; width: 6em; }
  </style>
</head>
<body>
  <h3>{{stream_info}}</h3>
  <img src="{{stream_path}}" width="{{width}}" height="{{height}}" alt="stream">
  <div class="controls">
    <div><label>brightness</label><input type="range" min="-64" max="64" value="0" oninput="control('brightness', this.value)"></div>
    <div><label>contrast</label><input type="range" min="0" max="95" value="32" oninput="control('contrast', this.value)"></div>
    <div><label>saturation</label><input type="range" min="0" max="100" value="50" oninput="control('saturation', this.value)"></div>
    <div {{face_hidden}}><label>faces</label><input type="checkbox" onchange="face(this.checked ? 'on' : 'off')"></div>
  </div>
  <script>
    function post(path, body) {
      fetch(path, { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body) });
    }
    function control(name, value) { post('{{control_path}}', { Name: name, Value: String(value) }); }
    function face(mode) { post('{{face_path}}', { Mode: mode }); }
  </script>
</body>
</html>
"#;

pub async fn serve_page(State(ctx): State<SharedContext>) -> Html<String> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    Html(render(&ctx.page, nanos, ctx.annotation.available()))
}

/// Fill the page template. `nanos` busts browser caching of the stream URL.
pub fn render(info: &PageInfo, nanos: u128, face_available: bool) -> String {
    PAGE_TEMPLATE
        .replace("{{stream_info}}", &escape(&info.stream_info))
        .replace("{{stream_path}}", &format!("/stream?{}", nanos))
        .replace("{{width}}", &info.width.to_string())
        .replace("{{height}}", &info.height.to_string())
        .replace("{{control_path}}", CONTROL_PATH)
        .replace("{{face_path}}", FACE_PATH)
        .replace("{{face_hidden}}", if face_available { "" } else { "hidden" })
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
