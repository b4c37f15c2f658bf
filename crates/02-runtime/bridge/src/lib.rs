#![deny(missing_docs)]
//! Execution-context bridge between the dispatch engine and its callers.
//!
//! * [`ContextThread`] – named worker thread running jobs in order; used both
//!   for the engine context and for the caller's callback context.
//! * [`LocalContext`] – caller-pumped context for event-loop style callers.
//! * [`JobPool`] – fixed-capacity limiter gating crossings into the engine.
//! * [`HandleRegistry`] – opaque integer handles for foreign-owned objects.

mod context;
mod handles;
mod limiter;
mod local;

pub use context::ContextThread;
pub use handles::{Handle, HandleRegistry};
pub use limiter::{JobPool, Permit, DEFAULT_POOL_SIZE};
pub use local::LocalContext;
