//! Error codes and the JSON error body returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result codes carried in the `result` field of an error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection handling
    WebsocketNotSupported,
    InitSessionFailed,
    HandleRequestFailed,
    InvalidRoute,
    MethodNotAllowed,

    // Endpoint handling
    NotFound,
    InternalServerError,
    RequestTimeout,
    ServerShuttingDown,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::WebsocketNotSupported => "WEBSOCKET_NOT_SUPPORTED",
            Self::InitSessionFailed => "INIT_SESSION_FAILED",
            Self::HandleRequestFailed => "HANDLE_REQUEST_FAILED",
            Self::InvalidRoute => "INVALID_ROUTE",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::NotFound => "NOT_FOUND",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::ServerShuttingDown => "SERVER_SHUTTING_DOWN",
        }
    }

    /// HTTP status the code is surfaced with.
    pub fn status(&self) -> u16 {
        match self {
            Self::WebsocketNotSupported => 400,
            Self::InitSessionFailed => 400,
            Self::HandleRequestFailed => 401,
            Self::InvalidRoute => 400,
            Self::MethodNotAllowed => 405,
            Self::NotFound => 404,
            Self::InternalServerError => 500,
            Self::RequestTimeout => 504,
            Self::ServerShuttingDown => 503,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "WEBSOCKET_NOT_SUPPORTED" => Some(Self::WebsocketNotSupported),
            "INIT_SESSION_FAILED" => Some(Self::InitSessionFailed),
            "HANDLE_REQUEST_FAILED" => Some(Self::HandleRequestFailed),
            "INVALID_ROUTE" => Some(Self::InvalidRoute),
            "METHOD_NOT_ALLOWED" => Some(Self::MethodNotAllowed),
            "NOT_FOUND" => Some(Self::NotFound),
            "INTERNAL_SERVER_ERROR" => Some(Self::InternalServerError),
            "REQUEST_TIMEOUT" => Some(Self::RequestTimeout),
            "SERVER_SHUTTING_DOWN" => Some(Self::ServerShuttingDown),
            _ => None,
        }
    }
}

/// Error body: `{ "result": "<CODE>", "params": <opaque JSON> }`.
///
/// `status` travels with the error so the transport can pick the HTTP
/// status line, but it is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip)]
    pub status: u16,
}

impl ApiError {
    /// Build an error whose params are the given message. An empty message
    /// leaves `params` out of the body.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            result: code.code().to_string(),
            params: if message.is_empty() { None } else { Some(Value::String(message)) },
            status: code.status(),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn websocket_not_supported() -> Self {
        Self::new(ErrorCode::WebsocketNotSupported, "websocket is currently not supported")
    }

    pub fn init_session_failed() -> Self {
        Self::new(ErrorCode::InitSessionFailed, "failed to initialize session")
    }

    pub fn handle_request_failed() -> Self {
        Self::new(ErrorCode::HandleRequestFailed, "failed to validate session")
    }

    pub fn invalid_route() -> Self {
        Self::new(ErrorCode::InvalidRoute, "")
    }

    pub fn method_not_allowed() -> Self {
        Self::new(ErrorCode::MethodNotAllowed, "")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Generic 500. Never carries backend detail.
    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalServerError, "")
    }

    pub fn request_timeout() -> Self {
        Self::new(ErrorCode::RequestTimeout, "request timed out")
    }

    pub fn shutting_down() -> Self {
        Self::new(ErrorCode::ServerShuttingDown, "server is shutting down")
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(&self.result)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API Error [{} {}]", self.status, self.result)?;
        if let Some(Value::String(message)) = &self.params {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Result of an endpoint handler: a JSON body for 200, or an error body.
pub type HandlerResult = Result<Value, ApiError>;
