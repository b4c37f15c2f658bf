use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use dispatch::{DispatchError, DispatchResult, Executor, Job};
use parking_lot::Mutex;

/// Named worker thread that runs queued jobs one at a time, in order.
///
/// Shutting down stops intake, lets the thread finish what is already queued
/// and joins it. Dropping the last handle shuts the context down.
pub struct ContextThread {
    name: String,
    tx: Mutex<Option<Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    executed: AtomicU64,
    panicked: AtomicU64,
}

impl ContextThread {
    /// Spawns the worker thread.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Arc<Self>> {
        let name = name.into();
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let counters = Arc::new(Counters::default());
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn({
                let counters = Arc::clone(&counters);
                let name = name.clone();
                move || run_jobs(&name, rx, &counters)
            })?;
        let thread_id = thread.thread().id();
        tracing::debug!(context = %name, "context thread started");

        Ok(Arc::new(Self {
            name,
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
            thread_id,
            counters,
        }))
    }

    /// Waits until every job queued before this call has run.
    ///
    /// Fails with `InvalidState` when called from the context itself, where
    /// waiting would deadlock.
    pub fn flush(&self) -> DispatchResult<()> {
        self.flush_within(None).map(|_| ())
    }

    /// Like [`flush`](Self::flush) but gives up after `timeout`; returns
    /// `false` on timeout.
    pub fn flush_timeout(&self, timeout: Duration) -> DispatchResult<bool> {
        self.flush_within(Some(timeout))
    }

    fn flush_within(&self, timeout: Option<Duration>) -> DispatchResult<bool> {
        if self.is_current() {
            return Err(DispatchError::invalid_state(format!(
                "cannot flush {} from its own thread",
                self.name
            )));
        }
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        self.execute(Box::new(move || {
            let _ = done_tx.send(());
        }))?;
        match timeout {
            None => done_rx
                .recv()
                .map(|_| true)
                .map_err(|_| DispatchError::dispatch_failure("context stopped while flushing")),
            Some(timeout) => Ok(done_rx.recv_timeout(timeout).is_ok()),
        }
    }

    /// Stops accepting jobs, drains the queue and joins the thread.
    pub fn shutdown(&self) {
        if self.tx.lock().take().is_none() {
            return;
        }
        if self.is_current() {
            // The thread exits on its own once the running job returns.
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                tracing::error!(context = %self.name, "context thread panicked");
            }
        }
        tracing::debug!(context = %self.name, "context thread stopped");
    }

    /// True once [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shut_down(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Number of jobs that ran to completion or panicked.
    pub fn executed(&self) -> u64 {
        self.counters.executed.load(Ordering::Relaxed)
    }

    /// Number of jobs that panicked.
    pub fn panicked(&self) -> u64 {
        self.counters.panicked.load(Ordering::Relaxed)
    }
}

fn run_jobs(name: &str, rx: Receiver<Job>, counters: &Counters) {
    for job in rx.iter() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::error!(context = %name, "job panicked");
        }
        counters.executed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Executor for ContextThread {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, job: Job) -> DispatchResult<()> {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(DispatchError::dispatch_failure(format!(
                "context {} is shut down",
                self.name
            )));
        };
        tx.send(job).map_err(|_| {
            DispatchError::dispatch_failure(format!("context {} has exited", self.name))
        })
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for ContextThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
