//! HTTP route handlers: entry document, reload client and static fallback.

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{MethodRouter, get};
use tower_http::services::ServeDir;
use tracing::warn;

use crate::sse;
use crate::state::AppState;

/// Path prefix reserved for dev server internals.
pub const INTERNAL_PREFIX: &str = "/__devtask";

const RELOAD_SCRIPT_TAG: &str = "<script src=\"/__devtask/client.js\"></script>";

const CLIENT_JS: &str = r#"(function () {
  var source = new EventSource('/__devtask/events');
  source.addEventListener('change', function () {
    window.location.reload();
  });
})();
"#;

/// Build the full router.
///
/// Internal endpoints live at the server root. The entry document and static
/// files are mounted under the public path; with a non-root public path, `/`
/// redirects there.
pub fn router(state: AppState) -> Router {
    let internal = Router::new()
        .route(&format!("{INTERNAL_PREFIX}/health"), get(health))
        .route(&format!("{INTERNAL_PREFIX}/client.js"), get(client_js))
        .route(&format!("{INTERNAL_PREFIX}/events"), get(sse::events_handler))
        .with_state(state.clone());
    let app = app_router(&state);

    if state.public_url.is_empty() {
        return internal.merge(app);
    }
    let home = format!("{}/", state.public_url);
    internal
        .route(
            "/",
            get(move || {
                let home = home.clone();
                async move { Redirect::temporary(&home) }
            }),
        )
        .nest_service(&state.public_url, app)
}

/// Entry document plus the static fallback chain, rooted at `/`.
fn app_router(state: &AppState) -> Router {
    let spa: MethodRouter = get(spa_fallback).with_state(state.clone());
    let public = ServeDir::new(&state.public_dir);

    let app = Router::new()
        .route("/", get(serve_index))
        .route("/index.html", get(serve_index));
    let app = match &state.output_dir {
        Some(out) => app.fallback_service(public.fallback(ServeDir::new(out).fallback(spa))),
        None => app.fallback_service(public.fallback(spa)),
    };
    app.with_state(state.clone())
}

async fn health() -> &'static str {
    "ok"
}

async fn client_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CLIENT_JS,
    )
}

/// GET / - the HTML entry with `%PUBLIC_URL%` resolved and the reload client injected.
async fn serve_index(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(&state.index_html).await {
        Ok(raw) => Html(render_index(&raw, &state.public_url)).into_response(),
        Err(err) => {
            warn!(path = %state.index_html.display(), err = %err, "failed to read HTML entry");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not read {}: {err}", state.index_html.display()),
            )
                .into_response()
        }
    }
}

/// Unknown paths fall back to the entry document for navigations (client-side
/// routing); other requests get a 404.
async fn spa_fallback(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let wants_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    if wants_html {
        serve_index(State(state)).await
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Substitute `%PUBLIC_URL%` and insert the reload script before the last `</body>`.
pub fn render_index(raw: &str, public_url: &str) -> String {
    let html = raw.replace("%PUBLIC_URL%", public_url);
    match html.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], RELOAD_SCRIPT_TAG, &html[idx..]),
        None => format!("{html}{RELOAD_SCRIPT_TAG}"),
    }
}
