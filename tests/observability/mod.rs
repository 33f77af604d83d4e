//! Observability tests.
//!
//! Test organization:
//! - correlation.rs: spans, correlation ids, component crossing
//! - endpoints.rs: health and metrics endpoints over HTTP

mod correlation;
mod endpoints;
