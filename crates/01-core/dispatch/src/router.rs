//! Destination resolution and forwarding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use msg::{Cmd, CmdResult, Loc, Message, RequestId};
use parking_lot::RwLock;

use crate::continuation::Continuation;
use crate::error::{DispatchError, DispatchResult};
use crate::executor::Executor;
use crate::pending::PendingTable;

/// A destination the router can forward messages to.
pub trait Endpoint: Send + Sync {
    /// Location this endpoint serves.
    fn loc(&self) -> &Loc;

    /// Hands a message to the destination's context without waiting for it
    /// to be processed.
    fn deliver(&self, msg: Message) -> DispatchResult<()>;
}

/// Resolves message destinations and owns the pending-request table.
pub struct Router {
    routes: RwLock<HashMap<Loc, Arc<dyn Endpoint>>>,
    table: Arc<PendingTable>,
    closed: AtomicBool,
}

impl Router {
    pub fn new(table: Arc<PendingTable>) -> Arc<Self> {
        Arc::new(Self {
            routes: RwLock::new(HashMap::new()),
            table,
            closed: AtomicBool::new(false),
        })
    }

    /// Registers an endpoint under its location.
    pub fn add_route(&self, endpoint: Arc<dyn Endpoint>) -> DispatchResult<()> {
        let loc = endpoint.loc().clone();
        let mut routes = self.routes.write();
        if routes.contains_key(&loc) {
            return Err(DispatchError::invalid_argument(format!(
                "route to {loc} already registered"
            )));
        }
        tracing::debug!(%loc, "route added");
        routes.insert(loc, endpoint);
        Ok(())
    }

    pub fn has_route(&self, loc: &Loc) -> bool {
        self.routes.read().contains_key(loc)
    }

    pub fn table(&self) -> &Arc<PendingTable> {
        &self.table
    }

    /// Rejects every later send. Pending requests are left to the caller.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("router closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the router and drops every endpoint it holds.
    ///
    /// Endpoints usually own ports back into this router, so teardown must
    /// come through here for the router to be freed.
    pub fn clear_routes(&self) {
        self.close();
        let routes = std::mem::take(&mut *self.routes.write());
        tracing::debug!(count = routes.len(), "routes cleared");
    }

    /// Creates a sending port for one side of the conversation.
    ///
    /// `src` is stamped on outgoing commands so results find their way back,
    /// `default_dest` is used for messages without an explicit destination
    /// and continuations registered through the port run on `executor`.
    pub fn port(
        self: &Arc<Self>,
        src: Loc,
        default_dest: Loc,
        executor: Arc<dyn Executor>,
    ) -> SendPort {
        SendPort {
            router: Arc::clone(self),
            src,
            default_dest,
            executor,
        }
    }

    fn resolve(&self, loc: &Loc) -> DispatchResult<Arc<dyn Endpoint>> {
        self.routes
            .read()
            .get(loc)
            .cloned()
            .ok_or_else(|| DispatchError::dispatch_failure(format!("no route to {loc}")))
    }

    fn ensure_open(&self) -> DispatchResult<()> {
        if self.is_closed() {
            return Err(DispatchError::dispatch_failure("router is closed"));
        }
        Ok(())
    }
}

/// Sending half bound to one side (tester or extension).
#[derive(Clone)]
pub struct SendPort {
    router: Arc<Router>,
    src: Loc,
    default_dest: Loc,
    executor: Arc<dyn Executor>,
}

impl SendPort {
    pub fn src(&self) -> &Loc {
        &self.src
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Registers `continuation` and forwards `cmd`.
    ///
    /// Validation problems are returned synchronously and leave the table
    /// untouched. Once the command is registered, forwarding failures reach
    /// the continuation instead of the caller.
    pub fn send_cmd(
        &self,
        mut cmd: Cmd,
        continuation: Arc<Continuation>,
        streaming: bool,
    ) -> DispatchResult<RequestId> {
        cmd.validate()?;
        self.router.ensure_open()?;

        let table = &self.router.table;
        let id = table.next_id();
        let dest = cmd.dest.clone().unwrap_or_else(|| self.default_dest.clone());
        cmd.request_id = Some(id);
        cmd.src = Some(self.src.clone());
        cmd.dest = Some(dest.clone());

        table.register(id, continuation, streaming, Arc::clone(&self.executor))?;
        tracing::trace!(%id, name = %cmd.name, %dest, streaming, "cmd registered");

        let forwarded = self
            .router
            .resolve(&dest)
            .and_then(|endpoint| endpoint.deliver(Message::Cmd(cmd)));
        if let Err(err) = forwarded {
            tracing::debug!(%id, %err, "cmd forwarding failed");
            table.fail(id, err);
        }
        Ok(id)
    }

    /// Forwards a data packet or audio/video frame.
    pub fn send(&self, msg: impl Into<Message>) -> DispatchResult<()> {
        let mut msg = msg.into();
        if !msg.kind().is_one_way() {
            return Err(DispatchError::invalid_argument(format!(
                "{} cannot be sent as a one-way message",
                msg.kind().as_str()
            )));
        }
        msg.validate()?;
        self.router.ensure_open()?;

        let dest = msg.dest().cloned().unwrap_or_else(|| self.default_dest.clone());
        msg.set_dest(dest.clone());
        let endpoint = self.router.resolve(&dest)?;
        tracing::trace!(kind = msg.kind().as_str(), name = msg.name(), %dest, "forwarding");
        endpoint.deliver(msg)
    }

    /// Sends a result back toward the command's sender.
    ///
    /// Results for requests that are no longer pending are dropped.
    pub fn return_result(&self, result: CmdResult) -> DispatchResult<()> {
        result.validate()?;
        let Some(id) = result.request_id else {
            return Err(DispatchError::invalid_argument(
                "result is not bound to a command",
            ));
        };

        if !self.router.table.complete(id, result) {
            tracing::debug!(%id, err = %DispatchError::UnknownRequest(id), "result dropped");
        }
        Ok(())
    }
}
