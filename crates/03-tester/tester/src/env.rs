//! The tester's view of a run: message injection, result handling and
//! lifecycle acknowledgements.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bridge::{ContextThread, JobPool};
use dispatch::{
    Continuation, DispatchError, DispatchResult, Executor, Outcome, SendPort, TableStatsSnapshot,
};
use futures::channel::oneshot;
use msg::{AudioFrame, Cmd, CmdResult, Data, Message, RequestId, VideoFrame};

use crate::lifecycle::{Lifecycle, State};
use crate::logging::{self, LogLevel, LogSite};

/// Completion callback for one-way sends and returned results.
///
/// Runs once on the tester context after the message was handed to its
/// destination.
pub type ErrorHandler = Box<dyn FnOnce(&TesterEnv, Option<DispatchError>) + Send + 'static>;

/// Reason attached to requests cancelled by [`TesterEnv::stop_test`].
pub const STOP_REASON: &str = "test stopped";

/// Handle through which tester code talks to the extension under test.
///
/// Cheap to clone; every clone drives the same run.
#[derive(Clone)]
pub struct TesterEnv {
    inner: Arc<EnvInner>,
}

struct EnvInner {
    port: SendPort,
    lifecycle: Arc<Lifecycle>,
    pool: Arc<JobPool>,
    context: Arc<ContextThread>,
    counters: EnvCounters,
}

impl TesterEnv {
    pub(crate) fn new(
        port: SendPort,
        lifecycle: Arc<Lifecycle>,
        pool: Arc<JobPool>,
        context: Arc<ContextThread>,
    ) -> Self {
        Self {
            inner: Arc::new(EnvInner {
                port,
                lifecycle,
                pool,
                context,
                counters: EnvCounters::default(),
            }),
        }
    }

    /// Sends `cmd` and calls `handler` once with its final result.
    ///
    /// Intermediate results are not observed. Validation and closed-router
    /// errors are returned here; everything after registration (routing
    /// failures, cancellation) reaches `handler` instead.
    pub fn send_cmd<F>(&self, cmd: Cmd, handler: F) -> DispatchResult<RequestId>
    where
        F: FnOnce(&TesterEnv, Outcome) + Send + 'static,
    {
        let mut handler = Some(handler);
        self.dispatch_cmd(cmd, false, move |env, outcome| {
            if let Some(handler) = handler.take() {
                handler(env, outcome);
            }
        })
    }

    /// Sends a streaming command; `handler` sees every intermediate result
    /// in order, then the final one.
    pub fn send_cmd_ex<F>(&self, cmd: Cmd, handler: F) -> DispatchResult<RequestId>
    where
        F: FnMut(&TesterEnv, Outcome) + Send + 'static,
    {
        self.dispatch_cmd(cmd, true, handler)
    }

    fn dispatch_cmd<F>(&self, cmd: Cmd, streaming: bool, mut handler: F) -> DispatchResult<RequestId>
    where
        F: FnMut(&TesterEnv, Outcome) + Send + 'static,
    {
        let env = self.clone();
        let continuation = Continuation::new(move |outcome: Outcome| {
            env.inner.counters.observe(&outcome);
            handler(&env, outcome);
        });
        let id = self
            .inner
            .pool
            .run(|| self.inner.port.send_cmd(cmd, continuation, streaming))?;
        self.inner.counters.cmds_sent.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    pub fn send_data(&self, data: Data, on_sent: Option<ErrorHandler>) -> DispatchResult<()> {
        self.dispatch_one_way(data.into(), on_sent)
    }

    pub fn send_audio_frame(
        &self,
        frame: AudioFrame,
        on_sent: Option<ErrorHandler>,
    ) -> DispatchResult<()> {
        self.dispatch_one_way(frame.into(), on_sent)
    }

    pub fn send_video_frame(
        &self,
        frame: VideoFrame,
        on_sent: Option<ErrorHandler>,
    ) -> DispatchResult<()> {
        self.dispatch_one_way(frame.into(), on_sent)
    }

    fn dispatch_one_way(&self, msg: Message, on_sent: Option<ErrorHandler>) -> DispatchResult<()> {
        self.inner.pool.run(|| self.inner.port.send(msg))?;
        self.inner.counters.one_way_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(handler) = on_sent {
            self.schedule_ack(handler);
        }
        Ok(())
    }

    /// Answers a command the extension sent to the tester.
    pub fn return_result(
        &self,
        result: CmdResult,
        on_done: Option<ErrorHandler>,
    ) -> DispatchResult<()> {
        self.inner.pool.run(|| self.inner.port.return_result(result))?;
        self.inner
            .counters
            .results_returned
            .fetch_add(1, Ordering::Relaxed);
        if let Some(handler) = on_done {
            self.schedule_ack(handler);
        }
        Ok(())
    }

    fn schedule_ack(&self, handler: ErrorHandler) {
        let env = self.clone();
        let scheduled = self
            .inner
            .context
            .execute(Box::new(move || handler(&env, None)));
        if let Err(err) = scheduled {
            log::warn!("dropping completion callback: {err}");
        }
    }

    /// Ends the test: closes the router and cancels every pending request.
    ///
    /// Only the first call does anything. Off the tester context this waits
    /// until the cancellations have been delivered, unless the context was
    /// already shut down.
    pub fn stop_test(&self) -> DispatchResult<()> {
        let router = self.inner.port.router();
        let stopped = self.inner.lifecycle.begin_stop(|| {
            router.close();
            let cancelled = router.table().cancel_all(STOP_REASON);
            log::info!("stop_test cancelled {cancelled} pending request(s)");
        })?;
        let context = &self.inner.context;
        if stopped && !context.is_current() {
            // A shut-down context has already run everything it accepted.
            match context.flush() {
                Err(_) if context.is_shut_down() => {}
                flushed => flushed?,
            }
        }
        Ok(())
    }

    pub fn on_start_done(&self) -> DispatchResult<()> {
        self.inner.lifecycle.start_done()
    }

    pub fn on_stop_done(&self) -> DispatchResult<()> {
        self.inner.lifecycle.stop_done()
    }

    pub fn on_deinit_done(&self) -> DispatchResult<()> {
        self.inner.lifecycle.deinit_done()
    }

    /// Writes a log line attributed to `site`; see [`tester_log!`](crate::tester_log).
    pub fn log(&self, level: LogLevel, site: LogSite<'_>, message: &str) -> DispatchResult<()> {
        logging::emit(level, site, message);
        Ok(())
    }

    pub fn state(&self) -> State {
        self.inner.lifecycle.state()
    }

    /// True while `id` still waits for its final result.
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.inner.port.router().table().contains(id)
    }

    /// Number of requests waiting for a result.
    pub fn pending_len(&self) -> usize {
        self.inner.port.router().table().len()
    }

    pub fn stats(&self) -> EnvStats {
        let pool = &self.inner.pool;
        EnvStats {
            pool_capacity: pool.capacity(),
            pool_peak: pool.peak(),
            ..self.inner.counters.snapshot()
        }
    }

    /// Counters of the shared pending-request table.
    pub fn table_stats(&self) -> TableStatsSnapshot {
        self.inner.port.router().table().stats()
    }

    /// Future form of [`send_cmd`](Self::send_cmd).
    ///
    /// Must not be awaited on the tester context itself: the result is
    /// delivered there.
    pub fn send_cmd_async(&self, cmd: Cmd) -> impl Future<Output = Outcome> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let sent = self.send_cmd(cmd, move |_, outcome| {
            let _ = tx.send(outcome);
        });
        async move {
            sent?;
            rx.await
                .unwrap_or_else(|_| Err(DispatchError::cancelled("result handler dropped")))
        }
    }

    /// Future form of [`send_data`](Self::send_data).
    pub fn send_data_async(&self, data: Data) -> impl Future<Output = DispatchResult<()>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let sent = self.send_data(
            data,
            Some(Box::new(move |_: &TesterEnv, err: Option<DispatchError>| {
                let _ = tx.send(err);
            })),
        );
        async move {
            sent?;
            match rx.await {
                Ok(None) => Ok(()),
                Ok(Some(err)) => Err(err),
                Err(_) => Err(DispatchError::cancelled("completion handler dropped")),
            }
        }
    }

    /// Closes the router, drops its routes and cancels whatever is pending.
    pub(crate) fn abort(&self, reason: &str) -> usize {
        let router = self.inner.port.router();
        router.clear_routes();
        router.table().cancel_all(reason)
    }

    pub(crate) fn context(&self) -> &Arc<ContextThread> {
        &self.inner.context
    }
}

#[derive(Default)]
struct EnvCounters {
    cmds_sent: AtomicU64,
    results: AtomicU64,
    intermediate: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    one_way_sent: AtomicU64,
    results_returned: AtomicU64,
}

impl EnvCounters {
    fn observe(&self, outcome: &Outcome) {
        let counter = match outcome {
            Ok(result) if result.is_final => &self.results,
            Ok(_) => &self.intermediate,
            Err(err) if err.is_cancelled() => &self.cancelled,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EnvStats {
        EnvStats {
            cmds_sent: self.cmds_sent.load(Ordering::Relaxed),
            results: self.results.load(Ordering::Relaxed),
            intermediate: self.intermediate.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            one_way_sent: self.one_way_sent.load(Ordering::Relaxed),
            results_returned: self.results_returned.load(Ordering::Relaxed),
            pool_capacity: 0,
            pool_peak: 0,
        }
    }
}

/// What the tester side of a run sent and observed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvStats {
    /// Commands accepted for dispatch.
    pub cmds_sent: u64,
    /// Final results delivered to handlers.
    pub results: u64,
    /// Intermediate results delivered to streaming handlers.
    pub intermediate: u64,
    /// Commands that ended in a dispatch failure.
    pub failed: u64,
    /// Commands cancelled before their result arrived.
    pub cancelled: u64,
    /// Data packets and frames forwarded.
    pub one_way_sent: u64,
    /// Results the tester returned to the extension.
    pub results_returned: u64,
    /// Sends allowed into the engine at once.
    pub pool_capacity: usize,
    /// Most sends observed in flight at once.
    pub pool_peak: usize,
}
