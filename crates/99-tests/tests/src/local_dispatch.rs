//! Router and pending table driven by caller-pumped contexts, so every step
//! of a round trip is observable.

use std::sync::Arc;

use bridge::LocalContext;
use dispatch::{Continuation, DispatchError, Endpoint, Executor, Outcome, PendingTable, Router};
use msg::{Cmd, CmdResult, Data, Loc, Message, StatusCode};
use parking_lot::Mutex;

type Inbox = Arc<Mutex<Vec<Message>>>;

/// Queues deliveries on a local context; pumping moves them to the inbox.
struct PumpedEndpoint {
    loc: Loc,
    context: Arc<LocalContext>,
    inbox: Inbox,
}

impl Endpoint for PumpedEndpoint {
    fn loc(&self) -> &Loc {
        &self.loc
    }

    fn deliver(&self, msg: Message) -> dispatch::DispatchResult<()> {
        let inbox = Arc::clone(&self.inbox);
        self.context.execute(Box::new(move || inbox.lock().push(msg)))
    }
}

struct Harness {
    router: Arc<Router>,
    tester: Arc<LocalContext>,
    engine: Arc<LocalContext>,
    inbox: Inbox,
}

impl Harness {
    fn new() -> Self {
        crate::init_logging();
        let router = Router::new(Arc::new(PendingTable::new(4)));
        let engine = Arc::new(LocalContext::new("engine"));
        let inbox = Inbox::default();
        router
            .add_route(Arc::new(PumpedEndpoint {
                loc: Loc::extension("ext"),
                context: Arc::clone(&engine),
                inbox: Arc::clone(&inbox),
            }))
            .expect("add route");
        Self {
            router,
            tester: Arc::new(LocalContext::new("tester")),
            engine,
            inbox,
        }
    }

    fn take_cmds(&self) -> Vec<Cmd> {
        self.engine.pump_all();
        self.inbox
            .lock()
            .drain(..)
            .filter_map(|msg| match msg {
                Message::Cmd(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }
}

fn recording(context: Arc<LocalContext>) -> (Arc<Continuation>, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let cont = Continuation::new(move |outcome: Outcome| {
        assert!(context.is_current(), "continuation ran off its context");
        sink.lock().push(match outcome {
            Ok(result) => result.detail.unwrap_or_default(),
            Err(err) => format!("error: {err}"),
        });
    });
    (cont, seen)
}

/// Nothing runs until the owning context is pumped, and results land on the
/// sender's context in production order.
#[test]
fn round_trip_steps_are_observable() {
    let h = Harness::new();
    let tester_port = h
        .router
        .port(Loc::Tester, Loc::extension("ext"), h.tester.clone());
    let ext_port = h
        .router
        .port(Loc::extension("ext"), Loc::Tester, h.engine.clone());

    let (single, single_seen) = recording(Arc::clone(&h.tester));
    let (stream, stream_seen) = recording(Arc::clone(&h.tester));
    let single_id = tester_port
        .send_cmd(Cmd::new("ping"), single, false)
        .expect("send ping");
    let stream_id = tester_port
        .send_cmd(Cmd::new("stream"), stream, true)
        .expect("send stream");
    assert_eq!(h.router.table().len(), 2);
    assert_eq!(h.engine.pending(), 2);

    let cmds = h.take_cmds();
    assert_eq!(cmds.len(), 2);
    assert_eq!(cmds[0].request_id, Some(single_id));
    assert_eq!(cmds[1].request_id, Some(stream_id));
    assert_eq!(cmds[0].src, Some(Loc::Tester));

    for (detail, is_final) in [("A", false), ("B", false), ("C", true)] {
        let result = CmdResult::for_cmd(StatusCode::Ok, &cmds[1])
            .with_detail(detail)
            .with_final(is_final);
        ext_port.return_result(result).expect("stream result");
    }
    ext_port
        .return_result(CmdResult::for_cmd(StatusCode::Ok, &cmds[0]).with_detail("pong"))
        .expect("ping result");

    assert!(h.router.table().is_empty());
    assert!(stream_seen.lock().is_empty());
    assert_eq!(h.tester.pending(), 4);

    h.tester.pump_all();
    assert_eq!(*stream_seen.lock(), ["A", "B", "C"]);
    assert_eq!(*single_seen.lock(), ["pong"]);

    // Late duplicates are dropped without reaching anyone.
    ext_port
        .return_result(CmdResult::for_cmd(StatusCode::Ok, &cmds[0]).with_detail("again"))
        .expect("late result is not an error");
    assert_eq!(h.tester.pending(), 0);
    assert_eq!(h.router.table().stats().dropped, 1);
}

/// Cancellation empties the table at once; continuations run when pumped.
#[test]
fn cancellation_waits_for_pump() {
    let h = Harness::new();
    let port = h
        .router
        .port(Loc::Tester, Loc::extension("ext"), h.tester.clone());

    let mut logs = Vec::new();
    for _ in 0..10 {
        let (cont, seen) = recording(Arc::clone(&h.tester));
        port.send_cmd(Cmd::new("hold"), cont, false).expect("send");
        logs.push(seen);
    }

    h.router.close();
    assert_eq!(h.router.table().cancel_all("test stopped"), 10);
    assert!(h.router.table().is_empty());
    assert!(logs.iter().all(|seen| seen.lock().is_empty()));

    assert_eq!(h.tester.pump_all(), 10);
    for seen in &logs {
        assert_eq!(*seen.lock(), ["error: cancelled: test stopped"]);
    }

    let err = port.send(Data::new("late")).unwrap_err();
    assert!(matches!(err, DispatchError::DispatchFailure(_)));
}

/// A closed destination context surfaces as a failure on the continuation.
#[test]
fn closed_destination_fails_command() {
    let h = Harness::new();
    let port = h
        .router
        .port(Loc::Tester, Loc::extension("ext"), h.tester.clone());
    h.engine.close();

    let (cont, seen) = recording(Arc::clone(&h.tester));
    port.send_cmd(Cmd::new("ping"), cont, false)
        .expect("registration succeeds");
    h.tester.pump_all();
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("error: dispatch failure"), "{}", seen[0]);
    assert!(h.router.table().is_empty());
}
