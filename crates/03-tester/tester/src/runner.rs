//! Assembly and execution of a single-extension test run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use bridge::{ContextThread, JobPool};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use dispatch::{
    DispatchError, DispatchResult, Endpoint, Executor, PendingTable, Router, TableStatsSnapshot,
};
use msg::{AudioFrame, Cmd, CmdResult, Data, Loc, Message, StatusCode, VideoFrame};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::TesterConfig;
use crate::env::{EnvStats, TesterEnv};
use crate::host::{Extension, ExtensionEndpoint, ExtensionEnv};
use crate::lifecycle::{Lifecycle, LifecycleEvent, State};

/// Test logic driving an extension.
///
/// Callbacks run on the tester context, one at a time. The phase callbacks
/// acknowledge immediately unless overridden; an override must eventually
/// call the matching `on_*_done`.
pub trait ExtensionTester: Send + 'static {
    fn on_start(&mut self, env: &TesterEnv) {
        ack("on_start_done", env.on_start_done());
    }

    fn on_stop(&mut self, env: &TesterEnv) {
        ack("on_stop_done", env.on_stop_done());
    }

    fn on_deinit(&mut self, env: &TesterEnv) {
        ack("on_deinit_done", env.on_deinit_done());
    }

    /// Handles a command sent by the extension. The default answers with an
    /// error result.
    fn on_cmd(&mut self, env: &TesterEnv, cmd: Cmd) {
        let result = CmdResult::for_cmd(StatusCode::Error, &cmd)
            .with_detail(format!("tester does not handle {}", cmd.name));
        ack("return_result", env.return_result(result, None));
    }

    fn on_data(&mut self, _env: &TesterEnv, _data: Data) {}

    fn on_audio_frame(&mut self, _env: &TesterEnv, _frame: AudioFrame) {}

    fn on_video_frame(&mut self, _env: &TesterEnv, _frame: VideoFrame) {}
}

fn ack(op: &str, outcome: DispatchResult<()>) {
    if let Err(err) = outcome {
        log::warn!("{op} failed: {err}");
    }
}

type TesterSlot = Arc<Mutex<Option<Box<dyn ExtensionTester>>>>;

/// Router endpoint delivering extension traffic to the installed tester.
struct TesterEndpoint {
    loc: Loc,
    tester: TesterSlot,
    env: TesterEnv,
}

impl TesterEndpoint {
    /// Runs `f` against the tester on the tester context.
    fn schedule<F>(tester: &TesterSlot, env: &TesterEnv, f: F) -> DispatchResult<()>
    where
        F: FnOnce(&mut dyn ExtensionTester, &TesterEnv) + Send + 'static,
    {
        let tester = Arc::clone(tester);
        let env = env.clone();
        env.context().clone().execute(Box::new(move || {
            let mut slot = tester.lock();
            match slot.as_deref_mut() {
                Some(tester) => f(tester, &env),
                None => log::debug!("no tester installed; dropping callback"),
            }
        }))
    }
}

impl Endpoint for TesterEndpoint {
    fn loc(&self) -> &Loc {
        &self.loc
    }

    fn deliver(&self, msg: Message) -> DispatchResult<()> {
        match msg {
            Message::Cmd(cmd) => Self::schedule(&self.tester, &self.env, move |t, env| {
                t.on_cmd(env, cmd)
            }),
            Message::Data(data) => Self::schedule(&self.tester, &self.env, move |t, env| {
                t.on_data(env, data)
            }),
            Message::AudioFrame(frame) => Self::schedule(&self.tester, &self.env, move |t, env| {
                t.on_audio_frame(env, frame)
            }),
            Message::VideoFrame(frame) => Self::schedule(&self.tester, &self.env, move |t, env| {
                t.on_video_frame(env, frame)
            }),
            Message::CmdResult(_) => Err(DispatchError::invalid_argument(
                "results travel through the pending table",
            )),
        }
    }
}

/// Builder for a [`TesterApp`] hosting one extension.
pub struct TesterBuilder {
    config: TesterConfig,
    extension_name: Option<String>,
    property_json: String,
}

impl TesterBuilder {
    pub fn new(config: TesterConfig) -> Self {
        Self {
            config,
            extension_name: None,
            property_json: String::new(),
        }
    }

    /// Tests the extension `name` alone, initialised with `property_json`
    /// (a JSON object; empty means no properties).
    pub fn set_test_mode_single(
        mut self,
        name: impl Into<String>,
        property_json: impl Into<String>,
    ) -> Self {
        self.extension_name = Some(name.into());
        self.property_json = property_json.into();
        self
    }

    /// Spawns the engine and tester contexts and wires `extension` in.
    pub fn build(self, extension: impl Extension) -> Result<TesterApp> {
        self.config.validate()?;
        let name = self
            .extension_name
            .ok_or_else(|| anyhow!("no extension under test; call set_test_mode_single"))?;
        if name.is_empty() {
            bail!("extension name must not be empty");
        }
        let properties = parse_properties(&self.property_json)
            .with_context(|| format!("properties for extension {name}"))?;

        let engine = ContextThread::spawn(format!("ext-{name}"))
            .context("spawn extension context")?;
        let context = ContextThread::spawn("tester").context("spawn tester context")?;

        let table = Arc::new(PendingTable::new(self.config.pending_shards));
        let router = Router::new(table);
        let (events_tx, events) = crossbeam_channel::unbounded();
        let lifecycle = Arc::new(Lifecycle::new(events_tx));
        let pool = JobPool::new(self.config.job_pool_size);
        let ext_loc = Loc::extension(name.as_str());

        let tester_port = router.port(Loc::Tester, ext_loc.clone(), context.clone());
        let env = TesterEnv::new(tester_port, lifecycle, pool, Arc::clone(&context));

        let ext_port = router.port(ext_loc.clone(), Loc::Tester, engine.clone());
        let ext_env = ExtensionEnv::new(&name, ext_port);
        let ext_endpoint =
            ExtensionEndpoint::new(ext_loc, Arc::clone(&engine), Box::new(extension), ext_env);

        let tester: TesterSlot = Arc::default();
        router.add_route(ext_endpoint.clone())?;
        router.add_route(Arc::new(TesterEndpoint {
            loc: Loc::Tester,
            tester: Arc::clone(&tester),
            env: env.clone(),
        }))?;
        ext_endpoint.init(properties)?;
        log::info!("tester app built for extension {name}");

        Ok(TesterApp {
            config: self.config,
            name,
            env,
            extension: ext_endpoint,
            engine,
            context,
            tester,
            events,
        })
    }
}

fn parse_properties(json: &str) -> Result<Value> {
    if json.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(json).context("property json is malformed")?;
    if !value.is_object() {
        bail!("property json must be an object");
    }
    Ok(value)
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub final_state: State,
    pub env: EnvStats,
    pub table: TableStatsSnapshot,
    pub elapsed: Duration,
    /// Callbacks that panicked on either context.
    pub panics: u64,
}

/// A built run. Dropping it tears everything down.
pub struct TesterApp {
    config: TesterConfig,
    name: String,
    env: TesterEnv,
    extension: Arc<ExtensionEndpoint>,
    engine: Arc<ContextThread>,
    context: Arc<ContextThread>,
    tester: TesterSlot,
    events: Receiver<LifecycleEvent>,
}

impl TesterApp {
    /// Environment handle, e.g. for driving sends from the calling thread.
    pub fn env(&self) -> &TesterEnv {
        &self.env
    }

    pub fn extension_name(&self) -> &str {
        &self.name
    }

    /// Runs `tester` until it acknowledges deinit or the run times out.
    pub fn run(self, tester: impl ExtensionTester) -> Result<RunReport> {
        let started = Instant::now();
        let deadline = started + self.config.run_timeout();
        *self.tester.lock() = Some(Box::new(tester));
        self.schedule("on_start", |t, env| t.on_start(env))?;
        self.extension
            .start()
            .context("schedule extension on_start")?;

        loop {
            match self.events.recv_deadline(deadline) {
                Ok(LifecycleEvent::Started) => log::debug!("{}: test started", self.name),
                Ok(LifecycleEvent::Stopping) => {
                    self.schedule("on_stop", |t, env| t.on_stop(env))?;
                }
                Ok(LifecycleEvent::Stopped) => {
                    self.schedule("on_deinit", |t, env| t.on_deinit(env))?;
                }
                Ok(LifecycleEvent::Deinited) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let state = self.env.state();
                    let cancelled = self.env.abort("run timed out");
                    bail!(
                        "{} did not finish within {:?} (state {state}, {cancelled} request(s) cancelled)",
                        self.name,
                        self.config.run_timeout()
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("lifecycle channel closed before deinit")
                }
            }
        }

        self.context
            .flush()
            .context("drain tester context after deinit")?;
        self.engine
            .flush()
            .context("drain extension context after deinit")?;
        let report = RunReport {
            final_state: self.env.state(),
            env: self.env.stats(),
            table: self.env.table_stats(),
            elapsed: started.elapsed(),
            panics: self.context.panicked() + self.engine.panicked(),
        };
        log::info!("{}: run finished in {:?}", self.name, report.elapsed);
        Ok(report)
    }

    fn schedule<F>(&self, phase: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn ExtensionTester, &TesterEnv) + Send + 'static,
    {
        TesterEndpoint::schedule(&self.tester, &self.env, f)
            .with_context(|| format!("schedule {phase}"))
    }
}

impl Drop for TesterApp {
    fn drop(&mut self) {
        let cancelled = self.env.abort("tester dropped");
        if cancelled > 0 {
            log::debug!("{}: teardown cancelled {cancelled} request(s)", self.name);
        }
        self.context.shutdown();
        self.engine.shutdown();
        self.tester.lock().take();
    }
}
