//! HTTP surface.
//!
//! ```text
//! GET /health        store connectivity
//! GET /metrics       uptime, redirect counts, tap emission counters
//! GET /{tag}/{id}    302 to the card's destination
//! anything else      404 "not found"
//! ```

use crate::emitter::{EmitterSnapshot, TapEmitter};
use crate::policy::Destination;
use crate::router::{Outcome, RedirectRouter};
use crate::tap::RequestMeta;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info_span, warn, Instrument};

/// Bound on the store ping behind `/health`
const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// Redirect counters for `/metrics`
pub struct Metrics {
    onboarding: AtomicU64,
    profile: AtomicU64,
    blocked: AtomicU64,
    not_found: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            onboarding: AtomicU64::new(0),
            profile: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Redirect { destination, .. } => match destination {
                Destination::Onboarding { .. } => &self.onboarding,
                Destination::Profile { .. } => &self.profile,
                Destination::Blocked => &self.blocked,
            },
            Outcome::NotFound => &self.not_found,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppState {
    pub router: RedirectRouter,
    pub metrics: Metrics,
    /// Present when taps go through a background emitter
    pub emitter: Option<TapEmitter>,
}

impl AppState {
    pub fn new(router: RedirectRouter) -> Self {
        Self {
            router,
            metrics: Metrics::new(),
            emitter: None,
        }
    }

    pub fn with_emitter(mut self, emitter: TapEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }
}

/// Build the application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .fallback(redirect)
        .with_state(state)
}

async fn redirect(State(state): State<Arc<AppState>>, request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        debug!(method = %request.method(), "Unsupported method");
        state.metrics.record(&Outcome::NotFound);
        return not_found();
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let headers = request.headers();
    let meta = request_meta(headers, peer);

    let correlation_id = headers
        .get("X-Correlation-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let path = request.uri().path().to_string();
    let outcome = state
        .router
        .route(&path, meta)
        .instrument(info_span!("redirect", correlation_id = %correlation_id))
        .await;
    state.metrics.record(&outcome);

    match outcome {
        Outcome::Redirect { location, .. } => match HeaderValue::from_str(&location) {
            Ok(location) => (
                StatusCode::FOUND,
                [
                    (header::LOCATION, location),
                    (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
                ],
            )
                .into_response(),
            Err(e) => {
                error!(location = %location, error = %e, "Destination is not a valid header value");
                not_found()
            }
        },
        Outcome::NotFound => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Collect tap metadata from proxy headers, falling back to the peer address.
pub fn request_meta(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestMeta {
    let client_ip = header_str(headers, "cf-connecting-ip")
        .or_else(|| {
            header_str(headers, "x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()));

    RequestMeta {
        client_ip,
        user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
        referrer: header_str(headers, header::REFERER.as_str()).map(str::to_string),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let store = state.router.store();

    match tokio::time::timeout(HEALTH_TIMEOUT, store.ping()).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "store": store.name() })),
        ),
        Ok(Err(e)) => {
            warn!(error = %e, "Health check: store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "store": store.name(), "error": e.to_string() })),
            )
        }
        Err(_) => {
            warn!("Health check: store ping timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "store": store.name(), "error": "timeout" })),
            )
        }
    }
}

/// Get metrics endpoint - returns server metrics as JSON
async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = state.metrics.uptime_seconds();
    let metrics = &state.metrics;

    let uptime_str = if uptime < 60 {
        format!("{}s", uptime)
    } else if uptime < 3600 {
        format!("{}m {}s", uptime / 60, uptime % 60)
    } else {
        format!("{}h {}m {}s", uptime / 3600, (uptime % 3600) / 60, uptime % 60)
    };

    let taps: Option<EmitterSnapshot> = state.emitter.as_ref().map(TapEmitter::stats);

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "uptime": uptime_str,
        "redirects": {
            "onboarding": metrics.onboarding.load(Ordering::Relaxed),
            "profile": metrics.profile.load(Ordering::Relaxed),
            "blocked": metrics.blocked.load(Ordering::Relaxed),
            "not_found": metrics.not_found.load(Ordering::Relaxed),
        },
        "taps": taps,
        "status": "running"
    }))
}
