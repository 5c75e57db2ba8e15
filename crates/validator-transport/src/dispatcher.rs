//! Request dispatcher: the single entry point for every inbound request.
//!
//! Flow for a request:
//!   1. Upgrade requests (WebSocket etc.) are refused
//!   2. `Validator-Session-Id` is looked up in the registry
//!   3. Without a live session the API key is checked and a session is
//!      created for the caller's remote address
//!   4. The API key and origin are re-validated against the session; only
//!      a request that passes refreshes the session's idle timer
//!   5. The session id is attached to the response
//!   6. The request is handed to the `RequestHandler`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, warn};
use validator_protocol::{ApiError, Headers};

use crate::server::{AppState, RequestHandler};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable session could be established for the caller
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// A session exists but the current request may not use it
    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),
}

pub(crate) async fn dispatch<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    request: Request,
) -> Response {
    if state.shutdown.is_cancelled() {
        debug!("Request refused: server is shutting down");
        return error_response(ApiError::shutting_down());
    }

    if is_upgrade_request(request.headers()) {
        warn!("websocket is currently not supported");
        return error_response(ApiError::websocket_not_supported());
    }

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    let api_key = header_str(request.headers(), Headers::API_KEY).to_string();

    // Resolve an existing session, or start a new one
    let existing = header_str(request.headers(), Headers::SESSION_ID);
    let session = match state.registry.get(existing) {
        Some(session) => session,
        None => match init_session(&state, &remote_addr, &api_key) {
            Ok(session) => session,
            Err(e) => {
                warn!(remote = %remote_addr, "failed to initialize session: {e}");
                return error_response(ApiError::init_session_failed());
            }
        },
    };

    if let Err(e) = validate_request(&state, &session, &remote_addr, &api_key) {
        warn!(session_id = %session.id(), remote = %remote_addr, "failed to validate session: {e}");
        return error_response(ApiError::handle_request_failed());
    }
    state.registry.touch(session.id());

    let session_header = HeaderValue::from_str(session.id()).ok();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = match tokio::time::timeout(
        state.config.request_timeout,
        state.handler.handle_request(&method, &path),
    )
    .await
    {
        Ok(Ok(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(_) => {
            error!(%method, %path, "request exceeded {:?}", state.config.request_timeout);
            error_response(ApiError::request_timeout())
        }
    };

    if let Some(value) = session_header {
        response.headers_mut().insert(Headers::SESSION_ID, value);
    }
    response
}

/// Authenticate a caller without a live session and register a new one.
fn init_session<H: RequestHandler>(
    state: &AppState<H>,
    remote_addr: &str,
    api_key: &str,
) -> Result<Arc<Session>, AuthError> {
    if remote_addr.is_empty() || api_key.is_empty() {
        return Err(AuthError::AuthenticationFailed("session init headers invalid".into()));
    }
    if !api_key_matches(api_key, &state.config.api_key) {
        return Err(AuthError::AuthenticationFailed("invalid api key".into()));
    }

    let session = Session::create(remote_addr)
        .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;
    let id = state.registry.add(session);
    state
        .registry
        .get(&id)
        .ok_or_else(|| AuthError::AuthenticationFailed("session vanished during creation".into()))
}

/// Check the current request against an established session.
fn validate_request<H: RequestHandler>(
    state: &AppState<H>,
    session: &Session,
    remote_addr: &str,
    api_key: &str,
) -> Result<(), AuthError> {
    if remote_addr.is_empty() || api_key.is_empty() {
        return Err(AuthError::AuthorizationFailed("session request headers invalid".into()));
    }
    if !api_key_matches(api_key, &state.config.api_key) {
        return Err(AuthError::AuthorizationFailed("invalid api key".into()));
    }
    session
        .validate_origin(remote_addr)
        .map_err(|e| AuthError::AuthorizationFailed(e.to_string()))
}

/// Compare API keys without leaking the position of the first difference.
/// Both sides are hashed first so the comparison length is fixed.
pub(crate) fn api_key_matches(provided: &str, expected: &SecretString) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.expose_secret().as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// True when the client asks to switch protocols on this connection.
pub(crate) fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let wants_upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty());
    let connection_upgrade = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade")));
    wants_upgrade && connection_upgrade
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

pub(crate) fn error_response(err: ApiError) -> Response {
    let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err)).into_response()
}
