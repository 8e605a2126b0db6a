//! Centralized error types for the SlimLink core library.
//!
//! Each concern defines its own `thiserror` enum next to the code that
//! produces it; this module gathers them into [`SlimError`] for callers that
//! only need one type, and gives every error a machine-readable code.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::connection::ConnectionError;
use crate::control::ControlError;
use crate::protocol::{FrameError, PayloadError};

/// Trait for error types that provide machine-readable error codes.
///
/// Codes are stable strings suitable for logs and host-side telemetry.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for FrameError {
    fn code(&self) -> &'static str {
        match self {
            Self::Oversized(_) => "frame_oversized",
            Self::InvalidTag(_) => "frame_invalid_tag",
        }
    }
}

impl ErrorCode for PayloadError {
    fn code(&self) -> &'static str {
        match self {
            Self::TooShort { .. } => "payload_too_short",
            Self::UnknownSubCommand(_) => "payload_unknown_sub_command",
            Self::InvalidUtf8 => "payload_invalid_utf8",
        }
    }
}

impl ErrorCode for ControlError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_) => "http_error_status",
            Self::Rpc(_) => "rpc_error",
            Self::UnexpectedResponse(_) => "rpc_unexpected_response",
        }
    }
}

impl ErrorCode for ConnectionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "connection_io",
            Self::Timeout => "connection_timeout",
            Self::Closed => "connection_closed",
        }
    }
}

/// Library-wide error type.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SlimError {
    /// Bytes on the wire could not be framed.
    #[error("Frame error: {0}")]
    Frame(String),

    /// A framed message carried a malformed payload.
    #[error("Malformed payload: {0}")]
    Payload(String),

    /// JSON-RPC control request failed.
    #[error("Control request failed: {0}")]
    Control(String),

    /// SlimProto socket error.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client has shut down and no longer accepts requests.
    #[error("Client stopped")]
    Stopped,
}

impl SlimError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame_error",
            Self::Payload(_) => "payload_error",
            Self::Control(_) => "control_error",
            Self::Connection(_) => "connection_error",
            Self::Configuration(_) => "configuration_error",
            Self::Stopped => "client_stopped",
        }
    }
}

impl ErrorCode for SlimError {
    fn code(&self) -> &'static str {
        SlimError::code(self)
    }
}

/// Convenient Result alias for library-wide operations.
pub type SlimResult<T> = Result<T, SlimError>;

impl From<FrameError> for SlimError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err.to_string())
    }
}

impl From<PayloadError> for SlimError {
    fn from(err: PayloadError) -> Self {
        Self::Payload(err.to_string())
    }
}

impl From<ControlError> for SlimError {
    fn from(err: ControlError) -> Self {
        Self::Control(err.to_string())
    }
}

impl From<ConnectionError> for SlimError {
    fn from(err: ConnectionError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<ConfigError> for SlimError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
