//! Daily maintenance for a real-time communication backend's Redis namespace.
//!
//! A run sweeps every ephemeral record family (deleting or bounding the
//! lifetime of expired records), captures a health snapshot, simulates the
//! weekly key rotation, and delivers a report to GitHub and email.

pub mod config;
pub mod health;
pub mod observability;
pub mod orchestrator;
pub mod report;
pub mod retention;
pub mod rotation;
pub mod sinks;
pub mod store;

#[cfg(test)]
mod tests;
