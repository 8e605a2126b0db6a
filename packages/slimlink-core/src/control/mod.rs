//! Secondary control channel: JSON-RPC requests to the server.
//!
//! SlimProto only lets the server drive the player. Anything the player
//! needs to ask for (play, seek, the authoritative position, metadata) goes
//! through the server's JSON-RPC endpoint instead.

mod jsonrpc;
mod retry;
mod traits;

use thiserror::Error;

pub use jsonrpc::JsonRpcControl;
pub use traits::ServerControl;

/// Errors from JSON-RPC control requests.
#[derive(Debug, Error)]
pub enum ControlError {
    /// HTTP request failed (connect, timeout, body).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP error {0}")]
    HttpStatus(u16),

    /// Server returned a JSON-RPC error object.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Response was well-formed JSON but not what the command returns.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Convenient Result alias for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

impl ControlError {
    /// Returns true if the request may succeed when repeated.
    ///
    /// Timeouts, connection failures and 5xx responses are transient; RPC
    /// errors and malformed responses are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ControlError::Http(e) => e.is_timeout() || e.is_connect(),
            ControlError::HttpStatus(status) => *status >= 500,
            ControlError::Rpc(_) | ControlError::UnexpectedResponse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(ControlError::HttpStatus(503).is_transient());
        assert!(!ControlError::HttpStatus(404).is_transient());
        assert!(!ControlError::Rpc("bad command".into()).is_transient());
    }
}
