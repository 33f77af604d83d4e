//! Reliability stack tests.
//!
//! Test organization:
//! - orchestrator.rs: composed circuit + bulkhead + gate behavior
//! - healing.rs: self-healing back-off, recovery and escalation

mod healing;
mod orchestrator;
