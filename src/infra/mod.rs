//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod memory;
pub mod object_store;
pub mod seed;
pub mod telemetry;
