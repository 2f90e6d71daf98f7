// src/core/protocol/mod.rs

//! The CFE wire protocol: inbound response frames, outbound requests, and the
//! reserved close-reason codes.

pub mod close;
pub mod inbound;
pub mod outbound;

pub use close::CloseReason;
pub use inbound::{ErrorCode, ErrorEntry, InboundMessage, ResponseType, decode};
pub use outbound::OutboundRequest;
