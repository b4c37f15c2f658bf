use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use msg::{CmdResult, RequestId};
use parking_lot::Mutex;

use crate::error::DispatchError;
use crate::executor::Job;

/// What a continuation observes for one delivery.
pub type Outcome = Result<CmdResult, DispatchError>;

type Handler = Box<dyn FnMut(Outcome) + Send + 'static>;

/// Caller-side handler for a pending command.
///
/// The handler runs at most once per delivered result and is dropped right
/// after the terminal delivery, releasing whatever it captured.
pub struct Continuation {
    handler: Mutex<Option<Handler>>,
    finished: AtomicBool,
    deliveries: AtomicU32,
}

impl Continuation {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: FnMut(Outcome) + Send + 'static,
    {
        Arc::new(Self {
            handler: Mutex::new(Some(Box::new(handler))),
            finished: AtomicBool::new(false),
            deliveries: AtomicU32::new(0),
        })
    }

    /// Continuation for callers that did not supply a handler.
    pub fn noop() -> Arc<Self> {
        Self::new(|_| {})
    }

    /// True once the terminal delivery has run.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Number of deliveries that reached the handler.
    pub fn deliveries(&self) -> u32 {
        self.deliveries.load(Ordering::Relaxed)
    }

    fn resume(&self, id: RequestId, outcome: Outcome, terminal: bool) {
        // Taken out so the handler never runs under our own lock.
        let Some(mut handler) = self.handler.lock().take() else {
            tracing::debug!(%id, "continuation already finished; dropping delivery");
            return;
        };
        self.deliveries.fetch_add(1, Ordering::Relaxed);
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| handler(outcome)));
        // Restored even when the handler panicked.
        if terminal {
            self.finished.store(true, Ordering::Release);
        } else {
            *self.handler.lock() = Some(handler);
        }
        if let Err(payload) = delivered {
            tracing::warn!(%id, terminal, "continuation handler panicked");
            panic::resume_unwind(payload);
        }
    }
}

/// One result travelling from the table to the continuation's context.
pub(crate) struct Delivery {
    pub(crate) id: RequestId,
    pub(crate) continuation: Arc<Continuation>,
    pub(crate) outcome: Outcome,
    pub(crate) terminal: bool,
}

impl Delivery {
    pub(crate) fn into_job(self) -> Job {
        let Delivery {
            id,
            continuation,
            outcome,
            terminal,
        } = self;
        Box::new(move || continuation.resume(id, outcome, terminal))
    }
}
