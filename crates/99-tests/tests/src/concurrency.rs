use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tester::{
    Cmd, DispatchError, ExtensionTester, RequestId, RunReport, State, TesterBuilder, TesterEnv,
};

use crate::fixtures::{scenario_config, DefaultExtension};

const THREADS: usize = 8;
const PER_THREAD: usize = 50;

type Senders = Arc<Mutex<Vec<JoinHandle<Vec<RequestId>>>>>;

fn run(tester: impl ExtensionTester) -> RunReport {
    crate::init_logging();
    TesterBuilder::new(scenario_config())
        .set_test_mode_single("default_extension", "{}")
        .build(DefaultExtension::default())
        .expect("build tester app")
        .run(tester)
        .expect("run completes")
}

fn join_all(senders: &Senders) -> Vec<Vec<RequestId>> {
    senders
        .lock()
        .drain(..)
        .map(|handle| handle.join().expect("sender thread"))
        .collect()
}

/// Fans pings out from several threads and stops once every one is answered.
struct FanOut {
    answered: Arc<AtomicUsize>,
    senders: Senders,
}

impl ExtensionTester for FanOut {
    fn on_start(&mut self, env: &TesterEnv) {
        env.on_start_done().expect("start done");
        for _ in 0..THREADS {
            let env = env.clone();
            let answered = Arc::clone(&self.answered);
            self.senders.lock().push(thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| {
                        let answered = Arc::clone(&answered);
                        env.send_cmd(Cmd::new("ping"), move |env, outcome| {
                            assert!(outcome.expect("ping result").is_ok());
                            if answered.fetch_add(1, Ordering::SeqCst) + 1 == THREADS * PER_THREAD {
                                env.stop_test().expect("stop test");
                            }
                        })
                        .expect("send ping")
                    })
                    .collect()
            }));
        }
    }
}

/// Every command sent from any thread gets a unique id and exactly one result.
#[test]
fn parallel_senders_each_get_one_result() {
    let answered = Arc::new(AtomicUsize::new(0));
    let senders = Senders::default();
    let report = run(FanOut {
        answered: Arc::clone(&answered),
        senders: Arc::clone(&senders),
    });

    let ids: Vec<RequestId> = join_all(&senders).into_iter().flatten().collect();
    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(ids.len(), THREADS * PER_THREAD);
    assert_eq!(unique.len(), ids.len());

    assert_eq!(answered.load(Ordering::SeqCst), THREADS * PER_THREAD);
    assert_eq!(report.final_state, State::Deinited);
    assert_eq!(report.env.cmds_sent as usize, THREADS * PER_THREAD);
    assert_eq!(report.env.results as usize, THREADS * PER_THREAD);
    assert_eq!(report.env.failed, 0);
    assert_eq!(report.panics, 0);

    // Eight threads share a pool sized by the config.
    let capacity = scenario_config().job_pool_size;
    assert_eq!(capacity, 5);
    assert_eq!(report.env.pool_capacity, capacity);
    assert!(report.env.pool_peak >= 1);
    assert!(report.env.pool_peak <= capacity, "peak {}", report.env.pool_peak);

    // The extension's pong commands share the table and are either answered
    // or cancelled by the stop.
    let table = report.table;
    assert_eq!(table.registered, table.completed + table.cancelled + table.failed);
}

/// Stops while other threads are still sending.
struct StopMidway {
    accepted: Arc<AtomicUsize>,
    handled: Arc<AtomicUsize>,
    rejected: Arc<AtomicUsize>,
    senders: Senders,
}

impl ExtensionTester for StopMidway {
    fn on_start(&mut self, env: &TesterEnv) {
        env.on_start_done().expect("start done");
        for _ in 0..THREADS {
            let env = env.clone();
            let accepted = Arc::clone(&self.accepted);
            let handled = Arc::clone(&self.handled);
            let rejected = Arc::clone(&self.rejected);
            self.senders.lock().push(thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..PER_THREAD * 4 {
                    let handled = Arc::clone(&handled);
                    let sent = env.send_cmd(Cmd::new("ping"), move |env, outcome| {
                        if let Err(err) = outcome {
                            assert!(err.is_cancelled(), "unexpected failure: {err}");
                        }
                        if handled.fetch_add(1, Ordering::SeqCst) + 1 == PER_THREAD {
                            env.stop_test().expect("stop test");
                        }
                    });
                    match sent {
                        Ok(id) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                            ids.push(id);
                        }
                        Err(err) => {
                            assert!(matches!(err, DispatchError::DispatchFailure(_)), "{err}");
                            rejected.fetch_add(1, Ordering::SeqCst);
                            break;
                        }
                    }
                }
                ids
            }));
        }
    }
}

/// A send racing the stop is either rejected up front or handled exactly once.
#[test]
fn stop_races_with_senders() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let senders = Senders::default();
    let report = run(StopMidway {
        accepted: Arc::clone(&accepted),
        handled: Arc::clone(&handled),
        rejected: Arc::clone(&rejected),
        senders: Arc::clone(&senders),
    });
    join_all(&senders);

    assert_eq!(report.final_state, State::Deinited);
    assert!(handled.load(Ordering::SeqCst) >= PER_THREAD);
    assert_eq!(handled.load(Ordering::SeqCst), accepted.load(Ordering::SeqCst));
    assert_eq!(
        report.env.results + report.env.cancelled,
        accepted.load(Ordering::SeqCst) as u64
    );
    assert_eq!(report.env.failed, 0);
}
