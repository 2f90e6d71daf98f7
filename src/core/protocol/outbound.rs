// src/core/protocol/outbound.rs

//! The request envelope sent from the client to the CFE.

use crate::core::BifrostError;
use serde::Serialize;
use serde_json::Value;

/// A single request frame: `{"command": .., "requestId": .., "payload": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub command: String,
    pub request_id: String,
    pub payload: Value,
}

impl OutboundRequest {
    pub fn new(command: impl Into<String>, request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            command: command.into(),
            request_id: request_id.into(),
            payload,
        }
    }

    /// Serializes the request into the text frame sent over the socket.
    pub fn encode(&self) -> Result<String, BifrostError> {
        serde_json::to_string(self).map_err(|e| BifrostError::InvalidRequest(e.to_string()))
    }
}
