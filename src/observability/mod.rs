//! Observability module providing structured logging.
//!
//! Initializes the global `tracing` subscriber with a configurable format
//! (pretty, compact or JSON) and environment-based filtering.

mod tracing_init;

pub use tracing_init::*;
