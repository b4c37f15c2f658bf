use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use dispatch::{DispatchError, DispatchResult, Executor, Job};
use parking_lot::Mutex;

/// Execution context driven by whoever calls [`pump`](Self::pump).
///
/// Jobs queue up until a thread pumps them. While pumping, that thread is the
/// context's current thread. Useful for foreign hosts that own their event
/// loop and for deterministic tests.
pub struct LocalContext {
    name: String,
    queue: Mutex<VecDeque<Job>>,
    pumping: Mutex<Option<ThreadId>>,
    closed: AtomicBool,
}

impl LocalContext {
    /// Creates an empty context.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            pumping: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Runs up to `max` queued jobs, including ones queued by the jobs
    /// themselves. Returns how many ran.
    ///
    /// A panicking job unwinds out of `pump`; the context stops being current
    /// and the remaining jobs stay queued.
    pub fn pump(&self, max: usize) -> usize {
        let _pumping = PumpGuard {
            pumping: &self.pumping,
            previous: self.pumping.lock().replace(thread::current().id()),
        };
        let mut ran = 0;
        while ran < max {
            let Some(job) = self.queue.lock().pop_front() else {
                break;
            };
            job();
            ran += 1;
        }
        ran
    }

    /// Runs jobs until the queue is empty.
    pub fn pump_all(&self) -> usize {
        self.pump(usize::MAX)
    }

    /// Number of queued jobs.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Rejects later jobs; already queued jobs can still be pumped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Restores the previous pumping thread, including on unwind.
struct PumpGuard<'a> {
    pumping: &'a Mutex<Option<ThreadId>>,
    previous: Option<ThreadId>,
}

impl Drop for PumpGuard<'_> {
    fn drop(&mut self) {
        *self.pumping.lock() = self.previous;
    }
}

impl Executor for LocalContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, job: Job) -> DispatchResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::dispatch_failure(format!(
                "context {} is closed",
                self.name
            )));
        }
        self.queue.lock().push_back(job);
        Ok(())
    }

    fn is_current(&self) -> bool {
        *self.pumping.lock() == Some(thread::current().id())
    }
}
