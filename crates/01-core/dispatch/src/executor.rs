//! Execution contexts that run continuations and message handlers.

use crate::error::DispatchResult;

/// Unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serial execution context.
///
/// Implementations run jobs one at a time in submission order and never run a
/// job inline from `execute`; continuations rely on both properties for
/// in-order, non-reentrant delivery.
pub trait Executor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Queues a job. Fails once the context has shut down.
    fn execute(&self, job: Job) -> DispatchResult<()>;

    /// True when called from a job running on this context.
    fn is_current(&self) -> bool {
        false
    }
}
