//! `ParlorServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{CredentialVerifier, LoginRequest, LoginResponse};
use crate::config::ServerConfig;
use crate::dispatch::EventRegistry;
use crate::errors::AdmissionError;
use crate::health::{self, HealthResponse};
use crate::otp::RetentionMap;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::SessionManager;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions and admission.
    pub manager: Arc<SessionManager>,
    /// Login verification.
    pub credentials: Arc<dyn CredentialVerifier>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `GET /metrics`.
    pub metrics_handle: PrometheusHandle,
    /// Largest inbound WebSocket message.
    pub max_message_size: usize,
}

/// The gateway server.
pub struct ParlorServer {
    config: ServerConfig,
    manager: Arc<SessionManager>,
    credentials: Arc<dyn CredentialVerifier>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics_handle: PrometheusHandle,
    start_time: Instant,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl ParlorServer {
    /// Create a new server. `events` is frozen from here on.
    pub fn new(
        config: ServerConfig,
        events: EventRegistry,
        credentials: Arc<dyn CredentialVerifier>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let otps = Arc::new(RetentionMap::new(config.otp_ttl));
        let manager = Arc::new(SessionManager::new(
            config.session.clone(),
            events,
            otps,
            shutdown.tasks(),
        ));
        Self {
            config,
            manager,
            credentials,
            shutdown,
            metrics_handle,
            start_time: Instant::now(),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            manager: Arc::clone(&self.manager),
            credentials: Arc::clone(&self.credentials),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
            max_message_size: self.config.max_message_size,
        };

        let mut router = Router::new()
            .route("/ws", get(ws_handler))
            .route("/login", post(login_handler))
            .route("/debug", get(debug_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        if let Some(dir) = &self.config.static_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        router
            .layer(TraceLayer::new_for_http())
            .layer(self.cors_layer())
    }

    fn cors_layer(&self) -> CorsLayer {
        let origin = self
            .config
            .session
            .allowed_origin
            .as_deref()
            .and_then(|origin| HeaderValue::from_str(origin).ok());
        match origin {
            Some(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([CONTENT_TYPE]),
            None => CorsLayer::permissive(),
        }
    }

    /// Bind the listener, start the credential sweeper and serve until
    /// shutdown. Returns the bound address and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let sweeper = Arc::clone(self.manager.otps())
            .spawn_sweeper(self.config.otp_sweep_interval, self.shutdown.token().child_token());
        self.background.lock().push(sweeper);

        let router = self.router();
        let cancelled = self.shutdown.token().cancelled_owned();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(cancelled)
                .await
            {
                error!(error = %err, "server stopped with error");
            }
        });

        info!(addr = %local_addr, "parlor gateway listening");
        Ok((local_addr, handle))
    }

    /// Stop admitting, close every session with a Close frame, stop the
    /// listener and the sweeper, and wait up to `timeout` for all of it to
    /// finish.
    pub async fn shutdown_gracefully(&self, server: JoinHandle<()>, timeout: Option<Duration>) {
        let closed = self.manager.begin_shutdown().await;
        info!(sessions = closed, "shutting down");

        let mut handles = vec![server];
        handles.append(&mut self.background.lock());
        self.shutdown.graceful_shutdown(handles, timeout).await;
    }

    /// Get the session manager.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Query string of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct AdmissionQuery {
    /// One-time credential from `POST /login`.
    pub otp: Option<String>,
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<AdmissionQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());
    let ticket = match state.manager.authorize(query.otp.as_deref(), origin).await {
        Ok(ticket) => ticket,
        Err(err) => return err.into_response(),
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            let err = AdmissionError::UpgradeFailed(rejection.body_text());
            warn!(error = %err, "admission aborted");
            return err.into_response();
        }
    };

    let manager = Arc::clone(&state.manager);
    upgrade
        .max_message_size(state.max_message_size)
        .on_failed_upgrade(|err: axum::Error| warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            let _ = manager.attach(ticket, sink, stream).await;
        })
}

/// POST /login
async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    if !state.credentials.verify(&request.username, &request.password) {
        info!(username = %request.username, "login rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let otp = state.manager.otps().issue();
    info!(username = %request.username, "login accepted");
    (StatusCode::OK, Json(LoginResponse { otp: otp.key })).into_response()
}

/// GET /debug
async fn debug_handler(State(state): State<AppState>) -> String {
    state.manager.live_count().await.to_string()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.manager.live_count().await;
    let resp = health::health_check(state.start_time, connections, state.manager.otps().len());
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
