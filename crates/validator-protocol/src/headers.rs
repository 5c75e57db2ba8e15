//! HTTP header names used by the session handshake.

/// All custom header names, grouped in one place.
pub struct Headers;

impl Headers {
    /// Shared secret every request must present.
    pub const API_KEY: &str = "Validator-Api-Key";
    /// Session token issued by the server and echoed back by the client.
    pub const SESSION_ID: &str = "Validator-Session-Id";
}
