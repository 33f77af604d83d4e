//! Observability fabric end-to-end tests.

#[path = "observability/mod.rs"]
mod observability;
