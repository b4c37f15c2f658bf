//! Pending-request table correlating command results with their continuations.
//!
//! The table is sharded by request id. Work on a single id is serialised by
//! its shard lock, and every delivery for that id is queued on the owning
//! executor while the lock is held, so streaming results keep their order.
//! `cancel_all` takes the table-wide gate exclusively, which fences it against
//! every in-flight `register`/`complete`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use msg::{CmdResult, RequestId};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::continuation::{Continuation, Delivery, Outcome};
use crate::error::{DispatchError, DispatchResult};
use crate::executor::Executor;

pub const DEFAULT_SHARDS: usize = 16;

#[derive(Clone)]
struct PendingRequest {
    continuation: Arc<Continuation>,
    executor: Arc<dyn Executor>,
    streaming: bool,
}

pub struct PendingTable {
    shards: Box<[Mutex<HashMap<RequestId, PendingRequest>>]>,
    gate: RwLock<()>,
    closed: AtomicBool,
    next_id: AtomicU64,
    stats: TableStats,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl PendingTable {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
            gate: RwLock::new(()),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            stats: TableStats::default(),
        }
    }

    /// Allocates a request id never handed out before by this table.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Inserts a continuation for `id`.
    ///
    /// Results for the request are run on `executor`. Fails if `id` is already
    /// pending or the table has been cancelled.
    pub fn register(
        &self,
        id: RequestId,
        continuation: Arc<Continuation>,
        streaming: bool,
        executor: Arc<dyn Executor>,
    ) -> DispatchResult<()> {
        let _gate = self.gate.read();
        if self.is_closed() {
            return Err(DispatchError::dispatch_failure("pending table is closed"));
        }

        let mut shard = self.shard(id).lock();
        if shard.contains_key(&id) {
            return Err(DispatchError::invalid_argument(format!(
                "{id} is already pending"
            )));
        }
        shard.insert(
            id,
            PendingRequest {
                continuation,
                executor,
                streaming,
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Routes a result to the continuation registered for `id`.
    ///
    /// Returns `false` when `id` is not pending; such late or duplicate
    /// results are dropped.
    pub fn complete(&self, id: RequestId, result: CmdResult) -> bool {
        let _gate = self.gate.read();
        let mut shard = self.shard(id).lock();
        let Some(streaming) = shard.get(&id).map(|entry| entry.streaming) else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%id, "dropping result for unknown request");
            return false;
        };

        if !result.is_final && !streaming {
            tracing::trace!(%id, "absorbing intermediate result for non-streaming command");
            return true;
        }

        let terminal = result.is_final;
        let entry = if terminal {
            shard.remove(&id)
        } else {
            shard.get(&id).cloned()
        };
        let Some(entry) = entry else {
            return false;
        };
        if terminal {
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
        }
        Self::deliver(id, entry, Ok(result), terminal);
        true
    }

    /// Delivers `err` as the terminal outcome for `id`.
    pub fn fail(&self, id: RequestId, err: DispatchError) -> bool {
        let _gate = self.gate.read();
        let mut shard = self.shard(id).lock();
        let Some(entry) = shard.remove(&id) else {
            tracing::debug!(%id, %err, "no pending request to fail");
            return false;
        };
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        Self::deliver(id, entry, Err(err), true);
        true
    }

    /// Cancels every pending request and closes the table.
    ///
    /// Each continuation receives exactly one `Cancelled` outcome. Returns the
    /// number of requests cancelled; a second call finds nothing to cancel.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let _gate = self.gate.write();
        self.closed.store(true, Ordering::Release);

        let mut drained: SmallVec<[(RequestId, PendingRequest); 8]> = SmallVec::new();
        for shard in self.shards.iter() {
            drained.extend(shard.lock().drain());
        }
        drained.sort_unstable_by_key(|(id, _)| *id);

        let count = drained.len();
        for (id, entry) in drained {
            Self::deliver(id, entry, Err(DispatchError::cancelled(reason)), true);
        }
        self.stats
            .cancelled
            .fetch_add(count as u64, Ordering::Relaxed);
        if count > 0 {
            tracing::info!(count, reason, "cancelled pending requests");
        }
        count
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.shard(id).lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        let _gate = self.gate.read();
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> TableStatsSnapshot {
        self.stats.snapshot()
    }

    fn shard(&self, id: RequestId) -> &Mutex<HashMap<RequestId, PendingRequest>> {
        &self.shards[(id.0 % self.shards.len() as u64) as usize]
    }

    fn deliver(id: RequestId, entry: PendingRequest, outcome: Outcome, terminal: bool) {
        let delivery = Delivery {
            id,
            continuation: entry.continuation,
            outcome,
            terminal,
        };
        if let Err(err) = entry.executor.execute(delivery.into_job()) {
            tracing::warn!(
                %id,
                executor = entry.executor.name(),
                %err,
                "could not schedule continuation"
            );
        }
    }
}

#[derive(Default)]
struct TableStats {
    registered: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    dropped: AtomicU64,
}

impl TableStats {
    fn snapshot(&self) -> TableStatsSnapshot {
        TableStatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Counters describing what happened to requests in a table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableStatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub dropped: u64,
}
