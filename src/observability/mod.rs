//! Observability module providing structured logging.
//!
//! Initializes the `tracing` subscriber with a configurable format (pretty,
//! compact, JSON) and environment-based filtering.

mod tracing_init;

pub use tracing_init::*;
