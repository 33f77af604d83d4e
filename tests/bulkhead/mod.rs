//! Bulkhead tests.
//!
//! Test organization:
//! - capacity.rs: concurrency caps and release
//! - isolation.rs: failure-rate auto-isolation and recovery

mod capacity;
mod isolation;
