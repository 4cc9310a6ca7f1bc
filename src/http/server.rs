//! Publish HTTP server.
//!
//! # Responsibilities
//! - Serve each user's subscription payload as a downloadable document
//! - Serve generated client documents in encrypted mode
//! - Render a plain-text status page
//! - Wire up middleware (request ID, timeout, access log)
//!
//! # Routes
//! - `GET /` status page
//! - `GET /{user}/sub.yaml` payload, 503 until the first refresh lands
//! - `GET /{user}/clash.yaml` client config (encrypted mode only)

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::crypto::CipherKind;
use crate::http::clash::ClientEndpoint;
use crate::http::middleware::access_log;
use crate::http::request::SequentialRequestId;
use crate::net::SessionTracker;
use crate::subscription::{PublishEndpoint, PublishError, SubscriptionStore};

const YAML_CONTENT_TYPE: &str = "text/yaml; charset=utf-8";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct PublishState {
    publish: PublishEndpoint,
    advertise_host: Arc<str>,
    /// Set in encrypted mode; enables `/{user}/clash.yaml`.
    cipher: Option<CipherKind>,
    trackers: Arc<[SessionTracker]>,
}

impl PublishState {
    pub fn new(
        store: Arc<SubscriptionStore>,
        advertise_host: &str,
        cipher: Option<CipherKind>,
        trackers: Vec<SessionTracker>,
    ) -> Self {
        Self {
            publish: PublishEndpoint::new(store),
            advertise_host: advertise_host.into(),
            cipher,
            trackers: trackers.into(),
        }
    }
}

/// HTTP server for the publish surface.
pub struct PublishServer {
    router: Router,
}

impl PublishServer {
    pub fn new(state: PublishState, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    #[allow(deprecated)]
    fn build_router(state: PublishState, request_timeout: Duration) -> Router {
        let mut router: Router<PublishState> = Router::new()
            .route("/", get(status_page))
            .route("/{user}/sub.yaml", get(subscription));
        if state.cipher.is_some() {
            router = router.route("/{user}/clash.yaml", get(clash_config));
        }

        router
            .with_state(state)
            .layer(axum::middleware::from_fn(access_log))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(request_timeout))
            .layer(SetRequestIdLayer::x_request_id(SequentialRequestId::default()))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Publish server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Publish server stopped");
        Ok(())
    }
}

/// Map a 1-based user path segment to a slot index.
fn parse_user(raw: &str, slots: usize) -> Result<usize, Response> {
    let id: usize = raw
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "user must be a number").into_response())?;
    if id == 0 || id > slots {
        return Err((StatusCode::NOT_FOUND, "unknown user").into_response());
    }
    Ok(id - 1)
}

async fn subscription(State(state): State<PublishState>, Path(user): Path<String>) -> Response {
    let index = match parse_user(&user, state.publish.store().len()) {
        Ok(index) => index,
        Err(response) => return response,
    };

    match state.publish.read(index) {
        Ok(payload) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, YAML_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=user{}.yaml", index + 1),
                ),
            ],
            payload,
        )
            .into_response(),
        Err(e @ PublishError::NotReady) => {
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Err(e @ PublishError::UnknownUser) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

async fn clash_config(State(state): State<PublishState>, Path(user): Path<String>) -> Response {
    let store = state.publish.store();
    let index = match parse_user(&user, store.len()) {
        Ok(index) => index,
        Err(response) => return response,
    };
    let (Some(cipher), Some(slot)) = (state.cipher, store.slot(index)) else {
        return (StatusCode::NOT_FOUND, "unknown user").into_response();
    };

    let endpoint = ClientEndpoint {
        user_id: slot.user_id(),
        host: &state.advertise_host,
        port: slot.listen_port(),
        cipher,
        credential: slot.credential(),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, YAML_CONTENT_TYPE)],
        endpoint.clash_yaml(),
    )
        .into_response()
}

async fn status_page(State(state): State<PublishState>) -> impl IntoResponse {
    render_status(&state)
}

fn render_status(state: &PublishState) -> String {
    let store = state.publish.store();
    let mut out = String::from("relay-gateway\n");
    match state.cipher {
        Some(cipher) => {
            let _ = writeln!(out, "mode: encrypted ({})", cipher);
        }
        None => out.push_str("mode: socks5\n"),
    }

    for slot in store.slots() {
        let active = state
            .trackers
            .get(slot.index())
            .map(SessionTracker::active_count)
            .unwrap_or(0);
        let _ = writeln!(
            out,
            "\n{}  port {}  active sessions {}",
            slot.label(),
            slot.listen_port(),
            active
        );

        match slot.published() {
            Some(published) => {
                let refreshed: DateTime<Utc> = published.refreshed_at.into();
                let _ = writeln!(
                    out,
                    "  subscription: ready ({} bytes, refreshed {})",
                    published.payload.len(),
                    refreshed.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
            }
            None => out.push_str("  subscription: not ready\n"),
        }

        let _ = writeln!(out, "  GET /{}/sub.yaml", slot.user_id());
        if state.cipher.is_some() {
            let _ = writeln!(out, "  GET /{}/clash.yaml", slot.user_id());
        }
    }
    out
}
