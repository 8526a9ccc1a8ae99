//! Consolidated test modules.
//!
//! End-to-end runs of the maintenance orchestrator against an in-memory
//! store with injected probes and sinks.

mod maintenance_e2e;
