#![allow(dead_code)]

//! Shared fixtures for dispatch integration tests.

use std::collections::VecDeque;
use std::sync::Arc;

use dispatch::{Continuation, DispatchError, DispatchResult, Endpoint, Executor, Job, Outcome};
use msg::{Loc, Message};
use parking_lot::Mutex;

/// Serial executor drained explicitly by the test.
#[derive(Default)]
pub struct QueueExecutor {
    jobs: Mutex<VecDeque<Job>>,
}

impl QueueExecutor {
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.jobs.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Executor for QueueExecutor {
    fn name(&self) -> &str {
        "test-queue"
    }

    fn execute(&self, job: Job) -> DispatchResult<()> {
        self.jobs.lock().push_back(job);
        Ok(())
    }
}

/// Endpoint that records what it receives.
pub struct InboxEndpoint {
    loc: Loc,
    inbox: Mutex<Vec<Message>>,
    refuse: bool,
}

impl InboxEndpoint {
    pub fn new(loc: Loc) -> Arc<Self> {
        Arc::new(Self {
            loc,
            inbox: Mutex::new(Vec::new()),
            refuse: false,
        })
    }

    pub fn refusing(loc: Loc) -> Arc<Self> {
        Arc::new(Self {
            loc,
            inbox: Mutex::new(Vec::new()),
            refuse: true,
        })
    }

    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.inbox.lock())
    }
}

impl Endpoint for InboxEndpoint {
    fn loc(&self) -> &Loc {
        &self.loc
    }

    fn deliver(&self, msg: Message) -> DispatchResult<()> {
        if self.refuse {
            return Err(DispatchError::dispatch_failure("endpoint is not accepting"));
        }
        self.inbox.lock().push(msg);
        Ok(())
    }
}

pub type OutcomeLog = Arc<Mutex<Vec<Outcome>>>;

/// Continuation that appends every outcome to a shared log.
pub fn recording() -> (Arc<Continuation>, OutcomeLog) {
    let log: OutcomeLog = Arc::default();
    let sink = Arc::clone(&log);
    let cont = Continuation::new(move |outcome| sink.lock().push(outcome));
    (cont, log)
}
