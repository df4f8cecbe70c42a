//! Server initialization, routing and lifecycle
//!
//! This module handles the Axum server setup including:
//! - Router configuration for the root and upload endpoints
//! - Middleware stack (auth, negotiation, logging, CORS, timeouts)
//! - Background serving with graceful, time-bounded drain on shutdown

use crate::config::ServerConfig;
use crate::middleware::{api_key_auth, log_requests, negotiate, request_id};
use crate::routes::{health, not_found, upload};
use crate::state::ServerState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, request};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Where the server is in its life. Published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Listener bound, not yet accepting.
    Starting,
    Serving,
    /// Shutdown requested: no new connections, in-flight requests finishing.
    Draining,
    Stopped,
}

/// Build the Axum router with all routes and middleware
///
/// Every route, the fallback included, sits behind the API key check.
///
/// Middleware stack, outermost first:
/// 1. Tracing
/// 2. Request ID tracking
/// 3. Request logging
/// 4. CORS (answers preflights before auth)
/// 5. API key authentication
/// 6. Content negotiation
/// 7. Timeout handling
pub fn build_router(state: Arc<ServerState>) -> Router {
    let uploads = Router::new()
        .route("/save/{id}", post(upload::save_upload))
        .route("/upload/{id}", post(upload::save_upload))
        .layer(DefaultBodyLimit::max(state.config.max_upload_size()));

    let mut router = Router::new()
        .route("/", get(health::hello))
        .merge(uploads)
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(from_fn(negotiate))
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    if state.config.enable_cors {
        router = router.layer(cors_layer());
    }

    router
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Browser access is limited to local development origins.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _: &request::Parts| {
                let origin = origin.as_bytes();
                origin.starts_with(b"http://localhost") || origin.starts_with(b"http://127.0.0.1")
            },
        ))
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::OPTIONS,
        ])
        .allow_headers([
            ORIGIN,
            HeaderName::from_static("x-api-key"),
            CONTENT_TYPE,
            ACCEPT,
            REFERER,
            USER_AGENT,
        ])
        .expose_headers([CONTENT_LENGTH])
}

/// A bound, not yet serving, HTTP server.
pub struct Server {
    listener: TcpListener,
    app: Router,
    drain_timeout: Duration,
    cancel: CancellationToken,
    lifecycle: watch::Sender<Lifecycle>,
}

impl Server {
    /// Prepare the upload directory and bind the listener.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = config.socket_addr()?;
        let drain_timeout = config.drain_timeout();
        let state = Arc::new(ServerState::new(config));

        state.store.ensure_dir().await.map_err(|err| {
            anyhow::anyhow!(
                "upload directory {} is not usable: {err}",
                state.store.dir().display()
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        let (lifecycle, _) = watch::channel(Lifecycle::Starting);
        let cancel = state.shutdown.clone();

        Ok(Self {
            listener,
            app: build_router(state),
            drain_timeout,
            cancel,
            lifecycle,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    /// Serve on a background task until `shutdown` resolves, then drain.
    ///
    /// Draining stops accepting connections and gives in-flight requests up
    /// to the configured drain timeout. Uploads still streaming after that
    /// are cancelled and their partial files removed.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            app,
            drain_timeout,
            cancel,
            lifecycle,
        } = self;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let serving = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        });
        let mut task = tokio::spawn(async move { serving.await });
        transition(&lifecycle, Lifecycle::Serving);

        tokio::select! {
            joined = &mut task => {
                transition(&lifecycle, Lifecycle::Stopped);
                return flatten(joined);
            }
            _ = shutdown => {}
        }

        transition(&lifecycle, Lifecycle::Draining);
        let _ = stop_tx.send(true);

        let result = match tokio::time::timeout(drain_timeout, &mut task).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                tracing::warn!(
                    drain_timeout_secs = drain_timeout.as_secs(),
                    "Drain timed out, aborting in-flight requests"
                );
                cancel.cancel();
                task.abort();
                Ok(())
            }
        };

        transition(&lifecycle, Lifecycle::Stopped);
        result
    }
}

fn transition(lifecycle: &watch::Sender<Lifecycle>, next: Lifecycle) {
    let previous = lifecycle.send_replace(next);
    tracing::info!(from = ?previous, to = ?next, "Lifecycle transition");
}

fn flatten(joined: Result<std::io::Result<()>, JoinError>) -> anyhow::Result<()> {
    Ok(joined??)
}

/// Start the HTTP server
///
/// Sets up structured JSON logging, binds the configured address and serves
/// until SIGTERM or Ctrl+C, then drains in-flight requests.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    let timeout_secs = config.timeout_secs;
    let max_upload_mb = config.max_upload_mb;
    let upload_dir = config.upload_dir.clone();
    let enable_cors = config.enable_cors;

    let server = Server::bind(config).await?;

    tracing::info!("Listening on {}", server.local_addr()?);
    tracing::info!(
        "Timeout: {}s, Max upload: {}MB, Upload dir: {}",
        timeout_secs,
        max_upload_mb,
        upload_dir.display()
    );
    tracing::info!("CORS: {}", enable_cors);

    server.run(shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that fails to install is logged
/// and never fires.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
