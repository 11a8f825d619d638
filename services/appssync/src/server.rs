//! Local callback listener
//!
//! Two routes: `/start` begins a flow and redirects the browser to the
//! provider, `/a/1/auth` receives the provider's redirect back. The listener
//! lives only as long as one authorization: it stops a grace period after
//! the flow completes, immediately on timeout or Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use google_auth::Credential;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::coordinator::Coordinator;
use crate::error::{FlowError, Result};
use crate::shutdown::ScheduledShutdown;

pub const START_PATH: &str = "/start";
pub const CALLBACK_PATH: &str = "/a/1/auth";

/// Upper bound on waiting for open connections once the listener is told to stop
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Build the listener router.
///
/// A concurrency limit bounds simultaneous handler invocations.
pub fn build_router(coordinator: Arc<Coordinator>, max_connections: usize) -> Router {
    Router::new()
        .route(START_PATH, get(start_handler))
        .route(CALLBACK_PATH, get(callback_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(coordinator)
}

async fn start_handler(State(coordinator): State<Arc<Coordinator>>) -> Response {
    match coordinator.start().await {
        Ok(url) => {
            coordinator.mark_redirected().await;
            Redirect::temporary(&url).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn callback_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let result = coordinator
        .handle_callback(params.state.unwrap_or_default(), params.code, params.error)
        .await;
    match result {
        Ok(_) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "status": "authorized" }).to_string(),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Serve the flow on `listener` until it completes, times out or is interrupted.
///
/// On completion the listener keeps answering for `shutdown_grace` so the
/// browser receives the success response, then stops.
pub async fn serve_flow(
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    max_connections: usize,
    shutdown_grace: Duration,
) -> Result<Credential> {
    let app = build_router(coordinator.clone(), max_connections);
    let stop = CancellationToken::new();

    let server_handle = tokio::spawn({
        let stop = stop.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
        }
    });

    let outcome = tokio::select! {
        outcome = coordinator.wait_for_completion() => outcome,
        _ = interrupted() => Err(FlowError::Interrupted),
    };

    match &outcome {
        Ok(_) => {
            ScheduledShutdown::schedule(stop.clone(), shutdown_grace)
                .wait()
                .await;
        }
        Err(e) => {
            warn!(error = %e, "stopping listener without a token");
            stop.cancel();
        }
    }

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("listener stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "listener error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "listener task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    outcome
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("received SIGINT, stopping listener");
}
