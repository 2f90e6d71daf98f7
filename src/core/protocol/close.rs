// src/core/protocol/close.rs

//! Close-reason codes. The CFE reserves two codes in the private range (4000-4999).

use strum_macros::Display;

pub const CLOSE_NORMAL: u16 = 1000;
/// Used when the transport dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
pub const CLOSE_UNAUTHORIZED: u16 = 4001;
pub const CLOSE_TIMEOUT: u16 = 4002;

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CloseReason {
    Normal,
    Unauthorized,
    Timeout,
    /// Any other code, treated as an unexpected disconnect.
    Other(u16),
}

impl CloseReason {
    pub fn code(self) -> u16 {
        match self {
            CloseReason::Normal => CLOSE_NORMAL,
            CloseReason::Unauthorized => CLOSE_UNAUTHORIZED,
            CloseReason::Timeout => CLOSE_TIMEOUT,
            CloseReason::Other(code) => code,
        }
    }
}

impl From<u16> for CloseReason {
    fn from(code: u16) -> Self {
        match code {
            CLOSE_NORMAL => CloseReason::Normal,
            CLOSE_UNAUTHORIZED => CloseReason::Unauthorized,
            CLOSE_TIMEOUT => CloseReason::Timeout,
            other => CloseReason::Other(other),
        }
    }
}
