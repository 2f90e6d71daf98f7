// src/core/mod.rs

//! The central module containing the CFE client: wire protocol, operations,
//! the transport client and the per-engine connection pool.

pub mod client;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod operation;
pub mod pool;
pub mod protocol;

pub use client::{CfeClient, ClientOptions};
pub use engine::EngineType;
pub use errors::BifrostError;
pub use operation::{Handlers, OperationEvent, OperationStream};
pub use pool::{CfeClientManager, GetOptions};
