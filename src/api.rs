//! REST API Server for the Finance Assistant
//!
//! Serves the single-page UI and exposes the answer pipeline over HTTP

use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::assistant::FinanceAssistant;
use crate::models::ReplyStatus;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AskRequest {
    pub query: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<FinanceAssistant>,
}

/// =============================
/// UI
/// =============================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Finance Assistant</title>
<style>
  body { font-family: sans-serif; max-width: 860px; margin: 2rem auto; padding: 0 1rem; }
  textarea { width: 100%; height: 6rem; font-size: 1rem; }
  .notice { background: #fff4e5; padding: .5rem; margin: .5rem 0; }
  .error { background: #fdecea; padding: .5rem; margin: .5rem 0; }
  .markdown { margin: .5rem 0; }
  .markdown table { border-collapse: collapse; }
  .markdown th, .markdown td { border: 1px solid #ccc; padding: .25rem .5rem; }
  .markdown pre { background: #f5f5f5; padding: .5rem; overflow-x: auto; }
  img { max-width: 100%; }
</style>
</head>
<body>
<h1>Finance Assistant</h1>
<textarea id="query" placeholder="Enter your query:"></textarea>
<button id="submit">Submit</button>
<div id="output"></div>
<script>
const output = document.getElementById("output");
function add(cls, text) {
  const el = document.createElement("div");
  el.className = cls;
  el.textContent = text;
  output.appendChild(el);
}
function escapeHtml(text) {
  return text.replace(/&/g, "&amp;").replace(/</g, "&lt;").replace(/>/g, "&gt;");
}
function inline(text) {
  return escapeHtml(text)
    .replace(/`([^`]+)`/g, "<code>$1</code>")
    .replace(/\*\*([^*]+)\*\*/g, "<strong>$1</strong>")
    .replace(/\*([^*]+)\*/g, "<em>$1</em>");
}
function cells(row) {
  return row.trim().replace(/^\||\|$/g, "").split("|").map(c => c.trim());
}
// headings, lists, tables, fenced code, emphasis and paragraphs
function renderMarkdown(src) {
  const lines = src.split("\n");
  const html = [];
  let i = 0;
  while (i < lines.length) {
    const line = lines[i];
    let m;
    if (line.startsWith("```")) {
      const code = [];
      i++;
      while (i < lines.length && !lines[i].startsWith("```")) code.push(lines[i++]);
      i++;
      html.push("<pre><code>" + escapeHtml(code.join("\n")) + "</code></pre>");
    } else if ((m = line.match(/^(#{1,6})\s+(.*)$/))) {
      const level = m[1].length;
      html.push("<h" + level + ">" + inline(m[2]) + "</h" + level + ">");
      i++;
    } else if (line.trim().startsWith("|") && i + 1 < lines.length && /^\s*\|?\s*:?-+/.test(lines[i + 1])) {
      const head = cells(line);
      i += 2;
      const rows = [];
      while (i < lines.length && lines[i].trim().startsWith("|")) rows.push(cells(lines[i++]));
      html.push("<table><tr>" + head.map(c => "<th>" + inline(c) + "</th>").join("") + "</tr>" +
        rows.map(r => "<tr>" + r.map(c => "<td>" + inline(c) + "</td>").join("") + "</tr>").join("") +
        "</table>");
    } else if (/^\s*([-*]|\d+\.)\s+/.test(line)) {
      const ordered = /^\s*\d+\./.test(line);
      const items = [];
      while (i < lines.length && /^\s*([-*]|\d+\.)\s+/.test(lines[i])) {
        items.push("<li>" + inline(lines[i].replace(/^\s*([-*]|\d+\.)\s+/, "")) + "</li>");
        i++;
      }
      const tag = ordered ? "ol" : "ul";
      html.push("<" + tag + ">" + items.join("") + "</" + tag + ">");
    } else if (line.trim() === "") {
      i++;
    } else {
      const para = [];
      while (i < lines.length && lines[i].trim() !== "" && !/^(#{1,6}\s|```|\s*\||\s*([-*]|\d+\.)\s)/.test(lines[i])) {
        para.push(inline(lines[i++]));
      }
      html.push("<p>" + para.join("<br>") + "</p>");
    }
  }
  return html.join("\n");
}
function addMarkdown(content) {
  const el = document.createElement("div");
  el.className = "markdown";
  el.innerHTML = renderMarkdown(content);
  output.appendChild(el);
}
document.getElementById("submit").onclick = async () => {
  const query = document.getElementById("query").value;
  output.innerHTML = "";
  if (!query.trim()) { add("notice", "Please enter a query."); return; }
  add("notice", "Processing...");
  const res = await fetch("/api/ask", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ query })
  });
  const body = await res.json();
  output.innerHTML = "";
  if (!body.success) { add("error", body.error); return; }
  for (const notice of body.data.notices) add("notice", notice);
  for (const seg of body.data.segments) {
    if (seg.type === "markdown") addMarkdown(seg.content);
    else if (seg.type === "error") add("error", seg.message);
    else if (seg.type === "figure") {
      const img = document.createElement("img");
      img.src = "data:" + seg.mime_type + ";base64," + seg.data;
      output.appendChild(img);
    }
  }
};
</script>
</body>
</html>
"##;

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Tools Endpoint
/// =============================

async fn list_tools(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.assistant.tools()))
}

/// =============================
/// Ask Endpoint
/// =============================

async fn ask(
    State(state): State<ApiState>,
    Json(req): Json<AskRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let query = req.query.trim();
    if query.is_empty() {
        warn!("Rejected empty query");
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Query must not be empty".into())),
        );
    }

    let reply = state.assistant.answer(query).await;
    info!(
        query_id = %reply.query_id,
        status = ?reply.status,
        segments = reply.segments.len(),
        "Reply ready"
    );

    // pipeline failures are still a 200: the reply carries the message
    let mut response = ApiResponse::success(&reply);
    if reply.status == ReplyStatus::Error {
        response.error = Some("Error handling response".into());
    }

    (StatusCode::OK, Json(response))
}

/// =============================
/// Router
/// =============================

pub fn create_router(assistant: Arc<FinanceAssistant>) -> Router {
    let state = ApiState { assistant };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/ask", post(ask))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    assistant: Arc<FinanceAssistant>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(assistant);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
