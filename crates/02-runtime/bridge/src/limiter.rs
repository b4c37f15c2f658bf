use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Default number of concurrent calls into the engine.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Counting gate bounding how many threads are inside the engine at once.
///
/// Callers block in [`acquire`](Self::acquire) until a slot frees up. The slot
/// is released when the returned [`Permit`] drops, including on unwind.
pub struct JobPool {
    capacity: usize,
    state: Mutex<PoolState>,
    freed: Condvar,
}

#[derive(Default)]
struct PoolState {
    in_flight: usize,
    peak: usize,
}

/// RAII slot in a [`JobPool`].
pub struct Permit {
    pool: Arc<JobPool>,
}

impl JobPool {
    /// Creates a pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            state: Mutex::new(PoolState::default()),
            freed: Condvar::new(),
        })
    }

    /// Blocks until a slot is free.
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut state = self.state.lock();
        while state.in_flight >= self.capacity {
            self.freed.wait(&mut state);
        }
        self.take_slot(&mut state)
    }

    /// Takes a slot if one is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut state = self.state.lock();
        (state.in_flight < self.capacity).then(|| self.take_slot(&mut state))
    }

    /// Waits at most `timeout` for a slot.
    pub fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Option<Permit> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.in_flight >= self.capacity {
            if self.freed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        (state.in_flight < self.capacity).then(|| self.take_slot(&mut state))
    }

    /// Runs `f` while holding a slot.
    pub fn run<R>(self: &Arc<Self>, f: impl FnOnce() -> R) -> R {
        let _permit = self.acquire();
        f()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Highest number of slots ever held at once.
    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn take_slot(self: &Arc<Self>, state: &mut PoolState) -> Permit {
        state.in_flight += 1;
        state.peak = state.peak.max(state.in_flight);
        Permit {
            pool: Arc::clone(self),
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut state = self.pool.state.lock();
        state.in_flight -= 1;
        drop(state);
        self.pool.freed.notify_one();
    }
}
