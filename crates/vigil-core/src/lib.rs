//! Core infrastructure shared by the vigil crates.
//!
//! This crate carries the plumbing every other vigil component leans on:
//! - Event system used by the reliability patterns and the supervisor
//! - Correlation ids with ambient (task-local) propagation
//! - Typed configuration loaded from the environment or a key/value map

pub mod config;
pub mod correlation;
pub mod events;
pub mod memory;
pub mod protocol;

pub use config::{ConfigError, CoreConfig, DeploymentStrategy};
pub use correlation::{current_correlation, with_correlation, CorrelationId};
pub use events::{CoreEvent, EventListener, EventListeners, FnListener};
