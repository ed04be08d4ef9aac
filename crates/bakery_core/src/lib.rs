//! Shared bakery pipeline primitives.
//!
//! This crate owns deterministic orchestration behavior: recipe request
//! contracts, batch partitioning, object key layout, and the typed
//! provisioning declaration for the agent stack. It excludes array I/O,
//! AWS SDK, and Lambda runtime concerns.

pub mod batching;
pub mod contract;
pub mod provisioning;
pub mod storage_keys;
