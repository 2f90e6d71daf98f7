// src/core/errors.rs

//! Defines the primary error type for the CFE client.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure an operation or a connection
/// can surface to a caller.
#[derive(Error, Debug)]
pub enum BifrostError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The inbound frame was not valid JSON.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The inbound frame was JSON but matched none of the known response shapes.
    #[error("Unrecognized message")]
    UnrecognizedMessage,

    /// The engine answered the request with an explicit error frame.
    #[error("{0}")]
    ServerReported(String),

    /// The connection was closed with the unauthorized close code.
    #[error("Unauthorized: the CFE rejected the session token")]
    Unauthorized,

    /// The idle timer expired and the connection was closed with the timeout code.
    #[error("Request {request_id} timed out")]
    Timeout { request_id: String },

    /// The connection closed for any other reason before a result arrived.
    #[error("Connection disconnected unexpectedly while waiting for request {request_id}")]
    Disconnected { request_id: String },

    #[error("Connection Error: {0}")]
    Connection(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// `std::io::Error` is not cloneable, so it is shared behind an Arc.
impl Clone for BifrostError {
    fn clone(&self) -> Self {
        match self {
            BifrostError::Io(e) => BifrostError::Io(Arc::clone(e)),
            BifrostError::MalformedMessage(s) => BifrostError::MalformedMessage(s.clone()),
            BifrostError::UnrecognizedMessage => BifrostError::UnrecognizedMessage,
            BifrostError::ServerReported(s) => BifrostError::ServerReported(s.clone()),
            BifrostError::Unauthorized => BifrostError::Unauthorized,
            BifrostError::Timeout { request_id } => BifrostError::Timeout {
                request_id: request_id.clone(),
            },
            BifrostError::Disconnected { request_id } => BifrostError::Disconnected {
                request_id: request_id.clone(),
            },
            BifrostError::Connection(s) => BifrostError::Connection(s.clone()),
            BifrostError::InvalidRequest(s) => BifrostError::InvalidRequest(s.clone()),
            BifrostError::Internal(s) => BifrostError::Internal(s.clone()),
        }
    }
}

impl PartialEq for BifrostError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BifrostError::Io(e1), BifrostError::Io(e2)) => e1.to_string() == e2.to_string(),
            (BifrostError::MalformedMessage(s1), BifrostError::MalformedMessage(s2)) => s1 == s2,
            (BifrostError::ServerReported(s1), BifrostError::ServerReported(s2)) => s1 == s2,
            (
                BifrostError::Timeout { request_id: r1 },
                BifrostError::Timeout { request_id: r2 },
            ) => r1 == r2,
            (
                BifrostError::Disconnected { request_id: r1 },
                BifrostError::Disconnected { request_id: r2 },
            ) => r1 == r2,
            (BifrostError::Connection(s1), BifrostError::Connection(s2)) => s1 == s2,
            (BifrostError::InvalidRequest(s1), BifrostError::InvalidRequest(s2)) => s1 == s2,
            (BifrostError::Internal(s1), BifrostError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for BifrostError {
    fn from(e: std::io::Error) -> Self {
        BifrostError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for BifrostError {
    fn from(e: serde_json::Error) -> Self {
        BifrostError::MalformedMessage(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BifrostError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BifrostError::Connection(e.to_string())
    }
}

impl From<url::ParseError> for BifrostError {
    fn from(e: url::ParseError) -> Self {
        BifrostError::Connection(format!("Invalid endpoint URL: {e}"))
    }
}
