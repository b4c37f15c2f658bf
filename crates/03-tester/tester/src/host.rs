//! Hosting of the extension under test on the engine context.

use std::sync::Arc;

use bridge::ContextThread;
use dispatch::{Continuation, DispatchError, DispatchResult, Endpoint, Executor, Outcome, SendPort};
use msg::{AudioFrame, Cmd, CmdResult, Data, Loc, Message, RequestId, StatusCode, VideoFrame};
use parking_lot::Mutex;
use serde_json::Value;

/// Business logic exercised by a tester.
///
/// Every callback runs on the engine context, one at a time.
pub trait Extension: Send + 'static {
    /// Called once with the properties given to
    /// [`TesterBuilder::set_test_mode_single`](crate::TesterBuilder::set_test_mode_single),
    /// before any message is delivered.
    fn on_init(&mut self, _env: &ExtensionEnv, _properties: &Value) {}

    /// Called when the run starts. Anything sent from here reaches the
    /// tester after its own `on_start`.
    fn on_start(&mut self, _env: &ExtensionEnv) {}

    /// Handles a command. The default answers with an error result.
    fn on_cmd(&mut self, env: &ExtensionEnv, cmd: Cmd) {
        let result = CmdResult::for_cmd(StatusCode::Error, &cmd)
            .with_detail(format!("{} does not handle {}", env.name(), cmd.name));
        if let Err(err) = env.return_result(result) {
            log::warn!("{}: could not answer {}: {err}", env.name(), cmd.name);
        }
    }

    fn on_data(&mut self, _env: &ExtensionEnv, _data: Data) {}

    fn on_audio_frame(&mut self, _env: &ExtensionEnv, _frame: AudioFrame) {}

    fn on_video_frame(&mut self, _env: &ExtensionEnv, _frame: VideoFrame) {}
}

/// The extension's side of the router.
#[derive(Clone)]
pub struct ExtensionEnv {
    name: Arc<str>,
    port: SendPort,
}

impl ExtensionEnv {
    pub(crate) fn new(name: &str, port: SendPort) -> Self {
        Self {
            name: Arc::from(name),
            port,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Answers a command; results are matched to the sender by request id.
    pub fn return_result(&self, result: CmdResult) -> DispatchResult<()> {
        self.port.return_result(result)
    }

    /// Sends a command to the tester; `handler` runs on the engine context.
    pub fn send_cmd<F>(&self, cmd: Cmd, handler: F) -> DispatchResult<RequestId>
    where
        F: FnOnce(&ExtensionEnv, Outcome) + Send + 'static,
    {
        let mut handler = Some(handler);
        self.dispatch_cmd(cmd, false, move |env, outcome| {
            if let Some(handler) = handler.take() {
                handler(env, outcome);
            }
        })
    }

    /// Streaming variant of [`send_cmd`](Self::send_cmd).
    pub fn send_cmd_ex<F>(&self, cmd: Cmd, handler: F) -> DispatchResult<RequestId>
    where
        F: FnMut(&ExtensionEnv, Outcome) + Send + 'static,
    {
        self.dispatch_cmd(cmd, true, handler)
    }

    fn dispatch_cmd<F>(&self, cmd: Cmd, streaming: bool, mut handler: F) -> DispatchResult<RequestId>
    where
        F: FnMut(&ExtensionEnv, Outcome) + Send + 'static,
    {
        let env = self.clone();
        let continuation = Continuation::new(move |outcome: Outcome| handler(&env, outcome));
        self.port.send_cmd(cmd, continuation, streaming)
    }

    pub fn send_data(&self, data: Data) -> DispatchResult<()> {
        self.port.send(data)
    }

    pub fn send_audio_frame(&self, frame: AudioFrame) -> DispatchResult<()> {
        self.port.send(frame)
    }

    pub fn send_video_frame(&self, frame: VideoFrame) -> DispatchResult<()> {
        self.port.send(frame)
    }
}

/// Router endpoint that runs the hosted extension on its own context.
pub(crate) struct ExtensionEndpoint {
    loc: Loc,
    context: Arc<ContextThread>,
    extension: Arc<Mutex<Box<dyn Extension>>>,
    env: ExtensionEnv,
}

impl ExtensionEndpoint {
    pub(crate) fn new(
        loc: Loc,
        context: Arc<ContextThread>,
        extension: Box<dyn Extension>,
        env: ExtensionEnv,
    ) -> Arc<Self> {
        Arc::new(Self {
            loc,
            context,
            extension: Arc::new(Mutex::new(extension)),
            env,
        })
    }

    /// Queues `on_init` ahead of any message.
    pub(crate) fn init(&self, properties: Value) -> DispatchResult<()> {
        self.schedule("on_init", move |extension, env| {
            extension.on_init(env, &properties)
        })
    }

    pub(crate) fn start(&self) -> DispatchResult<()> {
        self.schedule("on_start", |extension, env| extension.on_start(env))
    }

    fn schedule<F>(&self, phase: &'static str, f: F) -> DispatchResult<()>
    where
        F: FnOnce(&mut dyn Extension, &ExtensionEnv) + Send + 'static,
    {
        let extension = Arc::clone(&self.extension);
        let env = self.env.clone();
        self.context.execute(Box::new(move || {
            log::debug!("{}: {phase}", env.name());
            let mut extension = extension.lock();
            f(&mut **extension, &env);
        }))
    }
}

impl Endpoint for ExtensionEndpoint {
    fn loc(&self) -> &Loc {
        &self.loc
    }

    fn deliver(&self, msg: Message) -> DispatchResult<()> {
        if let Message::CmdResult(_) = msg {
            return Err(DispatchError::invalid_argument(
                "results travel through the pending table",
            ));
        }
        let extension = Arc::clone(&self.extension);
        let env = self.env.clone();
        self.context.execute(Box::new(move || {
            let mut extension = extension.lock();
            match msg {
                Message::Cmd(cmd) => extension.on_cmd(&env, cmd),
                Message::Data(data) => extension.on_data(&env, data),
                Message::AudioFrame(frame) => extension.on_audio_frame(&env, frame),
                Message::VideoFrame(frame) => extension.on_video_frame(&env, frame),
                Message::CmdResult(_) => {}
            }
        }))
    }
}
