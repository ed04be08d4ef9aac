//! AWS-oriented adapters and handlers for serverless recipe execution.
//!
//! This crate owns runtime integration details (Lambda handlers, queue
//! dispatch, S3 object access, and outcome records). Deterministic contract
//! and key-layout logic lives in `bakery_core`; array I/O in `bakery_array`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod telemetry;
