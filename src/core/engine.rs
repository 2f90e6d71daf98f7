// src/core/engine.rs

//! Engine types select which CFE endpoint/queue a connection targets.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A logical backend computation target. One pooled connection exists per engine type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EngineType {
    Formulation,
    Correction,
    Prediction,
    Calibration,
}

impl EngineType {
    /// The engine that serves a given domain command, if the command is one of
    /// the four domain operations.
    pub fn for_command(command: &str) -> Option<Self> {
        match command {
            FORMULATE => Some(EngineType::Formulation),
            CORRECT => Some(EngineType::Correction),
            PREDICT => Some(EngineType::Prediction),
            CALIBRATE => Some(EngineType::Calibration),
            _ => None,
        }
    }
}

// Command names understood by the CFE.
pub const FORMULATE: &str = "formulate";
pub const CORRECT: &str = "correct";
pub const PREDICT: &str = "predict";
pub const CALIBRATE: &str = "calibrate";
