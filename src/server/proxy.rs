//! Intercepting HTTP front.
//!
//! Every request not addressed to a control route is converted into an
//! engine [`Request`] and resolved by the engine. Requests whose `Host` is
//! not the app origin get `421 Misdirected Request` and are never fetched.
//!
//! - POST /__sw/message   control messages (SKIP_WAITING, CACHE_URLS)
//! - GET  /__sw/events    lifecycle notifications (SSE)
//! - GET  /__sw/stats     entries per storage
//! - GET  /__sw/match     cross-tier lookup of a URL
//! - GET  /__sw/metrics   Prometheus metrics
//! - GET  /__sw/health

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::cache::entry::RequestKey;
use crate::cache::manager::TierManager;
use crate::config::Config;
use crate::engine::Engine;
use crate::intercept::request::{Destination, Request, RequestMode};
use crate::intercept::strategy::Resolved;
use crate::lifecycle::controller::LifecycleController;
use crate::lifecycle::messages::ControlMessage;
use crate::metrics::EngineMetrics;
use crate::server::streaming::notifications_to_sse_stream;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: Arc<Engine>,
    pub lifecycle: Arc<LifecycleController>,
    pub tiers: Arc<TierManager>,
    pub metrics: Arc<EngineMetrics>,
    pub config: Arc<Config>,
    pub app_origin: Url,
    pub start_time: Instant,
}

/// Build the axum router with the control routes and the intercepting fallback.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/__sw/message", post(control_message))
        .route("/__sw/events", get(events))
        .route("/__sw/stats", get(cache_stats))
        .route("/__sw/match", get(match_url))
        .route("/__sw/metrics", get(metrics))
        .route("/__sw/health", get(health))
        .fallback(intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request/Response Conversion ───────────────────────────────────────────

/// Build an engine request from an incoming HTTP request.
///
/// The origin is the app origin's scheme plus the `Host` header.
pub fn to_engine_request(app_origin: &Url, parts: &Parts, body: Bytes) -> Result<Request, url::ParseError> {
    let mut url = match parts.headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => Url::parse(&format!("{}://{host}", app_origin.scheme()))?,
        None => app_origin.clone(),
    };
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

    let method = parts.method.as_str();
    let mode = match header("sec-fetch-mode").and_then(RequestMode::from_header) {
        Some(mode) => mode,
        None if method == "GET" && header(ACCEPT.as_str()).is_some_and(|a| a.contains("text/html")) => {
            RequestMode::Navigate
        }
        None => RequestMode::default(),
    };
    let destination = match header("sec-fetch-dest") {
        Some(dest) => Destination::from_header(dest),
        None if mode == RequestMode::Navigate => Destination::Document,
        None => Destination::default(),
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Ok(Request {
        method: method.to_string(),
        url,
        mode,
        destination,
        headers,
        body,
    })
}

/// Convert a resolved response into an HTTP response tagged with its source.
pub fn into_http_response(resolved: Resolved) -> Response {
    let Resolved { response, source } = resolved;

    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = http.headers_mut();
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static("x-served-from"),
        HeaderValue::from_static(source.as_str()),
    );
    http
}

// ─── Response Types ────────────────────────────────────────────────────────

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub version: String,
    pub lifecycle: String,
}

/// Cache statistics response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub version: String,
    pub lifecycle: String,
    pub controlling: bool,
    pub tiers: Vec<TierStatsResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TierStatsResponse {
    pub name: String,
    pub kind: Option<String>,
    pub entries: usize,
    pub max_entries: Option<usize>,
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    pub url: String,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn intercept(State(state): State<Arc<AppState>>, req: axum::extract::Request) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let (parts, body) = req.into_parts();

    let body = match axum::body::to_bytes(body, state.config.server.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(request_id, error = %e, "Could not read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let request = match to_engine_request(&state.app_origin, &parts, body) {
        Ok(request) => request,
        Err(e) => {
            warn!(request_id, error = %e, "Unroutable request");
            return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
        }
    };

    if request.url.origin() != state.app_origin.origin() {
        warn!(request_id, url = %request.url, "Refusing request for another origin");
        return (StatusCode::MISDIRECTED_REQUEST, "Misdirected Request").into_response();
    }

    info!(
        request_id,
        method = request.method,
        url = %request.url,
        mode = ?request.mode,
        destination = ?request.destination,
        "Intercepted request"
    );

    match state.engine.handle(request).await {
        Ok(resolved) => into_http_response(resolved),
        Err(e) => {
            warn!(request_id, error = %e, "Request failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Network Error").into_response()
        }
    }
}

async fn control_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    let message = ControlMessage::from_value(payload);
    info!(message = ?message, "Control message received");
    state.lifecycle.handle_message(message).await;
    StatusCode::ACCEPTED
}

async fn events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stream = notifications_to_sse_stream(state.lifecycle.subscribe());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    let tiers = state
        .tiers
        .stats()
        .await
        .into_iter()
        .map(|stats| {
            let policy = stats.kind.map(|kind| state.tiers.tier(kind).policy.clone());
            TierStatsResponse {
                name: stats.name,
                kind: stats.kind.map(|kind| kind.to_string()),
                entries: stats.entries,
                max_entries: policy.as_ref().and_then(|p| p.max_entries),
                max_age_secs: policy.as_ref().and_then(|p| p.max_age_secs),
            }
        })
        .collect();

    Json(CacheStatsResponse {
        version: state.lifecycle.version().to_string(),
        lifecycle: state.lifecycle.state().await.to_string(),
        controlling: state.lifecycle.is_controlling(),
        tiers,
    })
}

async fn match_url(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MatchQuery>,
) -> Response {
    let url = match state.app_origin.join(&query.url) {
        Ok(url) => url,
        Err(_) => return (StatusCode::BAD_REQUEST, "Bad URL").into_response(),
    };

    match state.tiers.lookup(&RequestKey::get(url.as_str()), None).await {
        Some(entry) => into_http_response(Resolved::cache(entry.response)),
        None => (StatusCode::NOT_FOUND, "No cached entry").into_response(),
    }
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            warn!(error = %e, "Could not render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: state.lifecycle.version().to_string(),
        lifecycle: state.lifecycle.state().await.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::StoredResponse;
    use crate::intercept::strategy::ResponseSource;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = axum::http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_request_uses_host_header() {
        let origin = Url::parse("https://app.test").unwrap();
        let p = parts("/articles?page=2", &[("host", "other.test"), ("sec-fetch-mode", "cors")]);
        let req = to_engine_request(&origin, &p, Bytes::new()).unwrap();
        assert_eq!(req.url.as_str(), "https://other.test/articles?page=2");
        assert_eq!(req.mode, RequestMode::Cors);
    }

    #[test]
    fn test_accept_html_is_navigation() {
        let origin = Url::parse("https://app.test").unwrap();
        let p = parts("/", &[("accept", "text/html,application/xhtml+xml")]);
        let req = to_engine_request(&origin, &p, Bytes::new()).unwrap();
        assert_eq!(req.url.as_str(), "https://app.test/");
        assert!(req.is_navigation());
        assert_eq!(req.destination, Destination::Document);
    }

    #[test]
    fn test_sec_fetch_dest() {
        let origin = Url::parse("https://app.test").unwrap();
        let p = parts("/font.woff2", &[("sec-fetch-mode", "cors"), ("sec-fetch-dest", "font")]);
        let req = to_engine_request(&origin, &p, Bytes::new()).unwrap();
        assert_eq!(req.destination, Destination::Font);
    }

    #[test]
    fn test_into_http_response_marks_source() {
        let resolved = Resolved {
            response: StoredResponse::new(
                201,
                vec![("x-custom".to_string(), "1".to_string()), ("bad header".to_string(), "x".to_string())],
                "body",
            ),
            source: ResponseSource::Cache,
        };
        let http = into_http_response(resolved);
        assert_eq!(http.status(), StatusCode::CREATED);
        assert_eq!(http.headers()["x-custom"], "1");
        assert_eq!(http.headers()["x-served-from"], "cache");
    }
}
