//! Circuit breaker tests.
//!
//! Test organization:
//! - lifecycle.rs: full open/half-open/close recovery cycle
//! - boundaries.rs: exact threshold and reset behavior

mod boundaries;
mod lifecycle;
