// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;

// Re-export
pub use crate::core::{
    BifrostError, CfeClient, CfeClientManager, ClientOptions, EngineType, GetOptions, Handlers,
    OperationEvent, OperationStream,
};
