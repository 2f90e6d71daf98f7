// src/core/protocol/inbound.rs

//! Decoding and shape validation of the JSON frames the CFE pushes to the client.
//!
//! Every response frame is a JSON object carrying a `requestId`, a `responseType`
//! discriminator and a `payload`. Three shapes are recognised and checked in a
//! fixed order: progress, error, and result (which also covers intermediate
//! results). Result payloads are opaque at this layer.

use crate::core::BifrostError;
use serde_json::{Map, Value};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};

// Frames above this size are rejected before JSON parsing.
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const REQUEST_ID_FIELD: &str = "requestId";
const RESPONSE_TYPE_FIELD: &str = "responseType";
const PAYLOAD_FIELD: &str = "payload";

/// The `responseType` discriminator carried by every inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum ResponseType {
    #[strum(serialize = "progress")]
    Progress,
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "result")]
    Result,
    #[strum(serialize = "intermediateResult")]
    IntermediateResult,
}

/// The fixed set of error codes the CFE attaches to error entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    GenericError = 0,
    GenericBackendError = 1,
    NotAuthorizedError = 2,
    NoLicenseError = 3,
}

impl ErrorCode {
    /// The integer carried on the wire.
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for ErrorCode {
    type Error = BifrostError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ErrorCode::GenericError),
            1 => Ok(ErrorCode::GenericBackendError),
            2 => Ok(ErrorCode::NotAuthorizedError),
            3 => Ok(ErrorCode::NoLicenseError),
            _ => Err(BifrostError::UnrecognizedMessage),
        }
    }
}

/// One entry of an error frame's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub message: String,
    pub error_code: ErrorCode,
}

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Progress {
        request_id: String,
        value: f64,
    },
    Error {
        request_id: String,
        /// Never empty.
        errors: Vec<ErrorEntry>,
    },
    Result {
        request_id: String,
        payload: Value,
    },
    IntermediateResult {
        request_id: String,
        payload: Value,
    },
}

impl InboundMessage {
    /// The correlation id this frame belongs to.
    pub fn request_id(&self) -> &str {
        match self {
            InboundMessage::Progress { request_id, .. }
            | InboundMessage::Error { request_id, .. }
            | InboundMessage::Result { request_id, .. }
            | InboundMessage::IntermediateResult { request_id, .. } => request_id,
        }
    }

    pub fn response_type(&self) -> ResponseType {
        match self {
            InboundMessage::Progress { .. } => ResponseType::Progress,
            InboundMessage::Error { .. } => ResponseType::Error,
            InboundMessage::Result { .. } => ResponseType::Result,
            InboundMessage::IntermediateResult { .. } => ResponseType::IntermediateResult,
        }
    }

    /// Returns true for error frames that carry a not-authorized entry.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            InboundMessage::Error { errors, .. } => errors
                .iter()
                .any(|e| e.error_code == ErrorCode::NotAuthorizedError),
            _ => false,
        }
    }
}

/// Parses a raw text frame into a validated `InboundMessage`.
///
/// Fails with `MalformedMessage` if the text is not JSON and with
/// `UnrecognizedMessage` if it matches none of the known shapes.
pub fn decode(text: &str) -> Result<InboundMessage, BifrostError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(BifrostError::MalformedMessage(format!(
            "frame of {} bytes exceeds the {MAX_FRAME_SIZE} byte limit",
            text.len()
        )));
    }

    let value: Value = serde_json::from_str(text)?;
    let Value::Object(obj) = value else {
        return Err(BifrostError::UnrecognizedMessage);
    };

    as_progress(&obj)
        .or_else(|| as_error(&obj))
        .or_else(|| as_result(&obj))
        .ok_or(BifrostError::UnrecognizedMessage)
}

/// Extracts the string `requestId` and the `responseType` tag, if both are well-formed.
fn header(obj: &Map<String, Value>) -> Option<(String, ResponseType)> {
    let request_id = obj.get(REQUEST_ID_FIELD)?.as_str()?;
    let response_type = ResponseType::from_str(obj.get(RESPONSE_TYPE_FIELD)?.as_str()?).ok()?;
    Some((request_id.to_string(), response_type))
}

fn as_progress(obj: &Map<String, Value>) -> Option<InboundMessage> {
    let (request_id, response_type) = header(obj)?;
    if response_type != ResponseType::Progress {
        return None;
    }
    let value = obj.get(PAYLOAD_FIELD)?.get("value")?.as_f64()?;
    Some(InboundMessage::Progress { request_id, value })
}

fn as_error(obj: &Map<String, Value>) -> Option<InboundMessage> {
    let (request_id, response_type) = header(obj)?;
    if response_type != ResponseType::Error {
        return None;
    }
    let entries = obj.get(PAYLOAD_FIELD)?.as_array()?;
    if entries.is_empty() {
        return None;
    }
    let errors = entries
        .iter()
        .map(|entry| {
            let message = entry.get("message")?.as_str()?.to_string();
            let error_code = ErrorCode::try_from(entry.get("errorCode")?.as_i64()?).ok()?;
            Some(ErrorEntry {
                message,
                error_code,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(InboundMessage::Error { request_id, errors })
}

fn as_result(obj: &Map<String, Value>) -> Option<InboundMessage> {
    let (request_id, response_type) = header(obj)?;
    let payload = obj.get(PAYLOAD_FIELD).cloned().unwrap_or(Value::Null);
    match response_type {
        ResponseType::Result => Some(InboundMessage::Result {
            request_id,
            payload,
        }),
        ResponseType::IntermediateResult => Some(InboundMessage::IntermediateResult {
            request_id,
            payload,
        }),
        _ => None,
    }
}
