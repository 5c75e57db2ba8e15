//! HTTP transport server using Axum.
//!
//! Owns the listening socket and the session registry, and drives the
//! lifecycle `Created → Listening → ShuttingDown → Stopped`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    response::Response,
};
use secrecy::SecretString;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use validator_protocol::ApiError;

use crate::dispatcher::{dispatch, error_response};
use crate::registry::SessionRegistry;

/// Trait implemented by the router to handle authenticated requests.
/// The transport layer calls this once a request has passed session checks.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a request and return a JSON body or an error body.
    fn handle_request(
        &self,
        method: &Method,
        path: &str,
    ) -> impl std::future::Future<Output = validator_protocol::HandlerResult> + Send;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("required config value not set or bad value: {0}")]
    ConfigInvalid(String),
    #[error("api server already active")]
    AlreadyServing,
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned, otherwise at least 1024)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Shared secret every request must present
    pub api_key: SecretString,
    /// Enable CORS
    pub enable_cors: bool,
    /// Upper bound for a single request
    pub request_timeout: Duration,
    /// How long in-flight requests may drain after shutdown starts
    pub shutdown_grace: Duration,
    /// Idle sessions older than this are swept (None keeps them until shutdown)
    pub session_ttl: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: "0.0.0.0".into(),
            api_key: SecretString::from(""),
            enable_cors: true,
            request_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
            session_ttl: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port != 0 && self.port < 1024 {
            return Err(TransportError::ConfigInvalid("Port".into()));
        }
        if secrecy::ExposeSecret::expose_secret(&self.api_key).trim().is_empty() {
            return Err(TransportError::ConfigInvalid("DEFAULT_API_KEY".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(TransportError::ConfigInvalid("REQUEST_TIMEOUT".into()));
        }
        if self.session_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(TransportError::ConfigInvalid("SESSION_TTL".into()));
        }
        Ok(())
    }
}

/// Lifecycle of the transport server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Shared state for the transport server.
pub(crate) struct AppState<H: RequestHandler> {
    pub(crate) handler: Arc<H>,
    pub(crate) config: TransportConfig,
    pub(crate) registry: Arc<SessionRegistry>,
    /// Cancelled once shutdown starts
    pub(crate) shutdown: CancellationToken,
}

/// Cloneable trigger for graceful shutdown. Only the first trigger counts.
#[derive(Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start shutdown. Returns true only for the call that started it.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Shutdown requested");
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// The transport server. Owns the listener and the session registry.
pub struct TransportServer<H: RequestHandler> {
    state: Arc<AppState<H>>,
    shutdown: ShutdownHandle,
    lifecycle: LifecycleState,
    /// Server task handle
    handle: Option<JoinHandle<()>>,
    /// Idle session sweeper task
    sweeper: Option<JoinHandle<()>>,
    /// Actual bound address
    local_addr: Option<SocketAddr>,
}

impl<H: RequestHandler> TransportServer<H> {
    /// Validate the configuration and prepare the server. No socket is opened.
    pub fn new(config: TransportConfig, handler: Arc<H>) -> Result<Self, TransportError> {
        config.validate()?;

        let shutdown = ShutdownHandle::new();
        let state = Arc::new(AppState {
            handler,
            config,
            registry: Arc::new(SessionRegistry::new()),
            shutdown: shutdown.token(),
        });

        Ok(Self {
            state,
            shutdown,
            lifecycle: LifecycleState::Created,
            handle: None,
            sweeper: None,
            local_addr: None,
        })
    }

    /// Build the request pipeline. Exposed so tests can drive it in-process.
    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .fallback(dispatch::<H>)
            .with_state(self.state.clone());

        if self.state.config.enable_cors {
            app = app.layer(cors_layer());
        }

        app.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CatchPanicLayer::custom(panic_response)),
        )
    }

    /// Bind the socket and start serving.
    pub async fn open_comms(&mut self) -> Result<SocketAddr, TransportError> {
        if self.lifecycle != LifecycleState::Created {
            return Err(TransportError::AlreadyServing);
        }

        let config = self.state.config.clone();
        let addr = format!("{}:{}", config.hostname, config.port);
        let listener = tokio::net::TcpListener::bind((config.hostname.as_str(), config.port))
            .await
            .map_err(|source| TransportError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!("Starting API server on {local_addr}");

        let app = self.router();
        let token = self.shutdown.token();
        self.handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(token.cancelled_owned())
            .await
            {
                error!("failed to serve: {e}");
            }
        }));

        if let Some(ttl) = config.session_ttl {
            self.sweeper = Some(spawn_sweeper(self.state.registry.clone(), ttl, self.shutdown.token()));
        }

        self.local_addr = Some(local_addr);
        self.lifecycle = LifecycleState::Listening;
        Ok(local_addr)
    }

    /// Gracefully stop the server: refuse new work, let in-flight requests
    /// drain for at most the grace period, then drop every session.
    pub async fn stop(&mut self) {
        match self.lifecycle {
            LifecycleState::Stopped => return,
            LifecycleState::Created => {
                self.shutdown.trigger();
                self.lifecycle = LifecycleState::Stopped;
                return;
            }
            LifecycleState::Listening | LifecycleState::ShuttingDown => {}
        }

        self.shutdown.trigger();
        self.lifecycle = LifecycleState::ShuttingDown;
        warn!(
            "Gracefully shutting down API server ({} active session(s) marked for teardown)...",
            self.state.registry.len()
        );

        if let Some(mut handle) = self.handle.take() {
            let grace = self.state.config.shutdown_grace;
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(_) => info!("In-flight requests drained"),
                Err(_) => {
                    warn!("Grace period of {grace:?} elapsed; aborting remaining requests");
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.await;
        }

        let dropped = self.state.registry.clear();
        self.lifecycle = LifecycleState::Stopped;
        info!("Shutdown complete ({dropped} session(s) closed)");
    }

    /// Wait until shutdown is triggered (signal or handle), then stop.
    pub async fn run_until_shutdown(&mut self) {
        self.shutdown.triggered().await;
        self.stop().await;
    }

    pub fn lifecycle(&self) -> LifecycleState {
        if self.lifecycle == LifecycleState::Listening && self.shutdown.is_triggered() {
            return LifecycleState::ShuttingDown;
        }
        self.lifecycle
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.state.registry.clone()
    }

    /// Get the actual bound address (None until `open_comms`).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn port(&self) -> Option<u16> {
        self.local_addr.map(|addr| addr.port())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    ttl: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let interval = (ttl / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    registry.expire_idle(ttl);
                }
            }
        }
    })
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            let origin = origin.as_bytes();
            origin.starts_with(b"https://") || origin.starts_with(b"http://")
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-forwarded-for"),
            HeaderName::from_static("x-real-ip"),
            HeaderName::from_static("validator-api-key"),
            HeaderName::from_static("validator-session-id"),
        ])
        .expose_headers([header::LINK, HeaderName::from_static("validator-session-id")])
        .allow_credentials(false)
        .max_age(Duration::from_secs(300))
}

fn panic_response(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    error_response(ApiError::internal())
}

