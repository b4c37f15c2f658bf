//! Handle-based surface for hosts that cannot hold Rust values.
//!
//! Messages and callbacks live in [`HandleRegistry`]s; the host only sees raw
//! handles and [`ForeignStatus`] codes. A send consumes its message handle.
//! Callback handles are released after their final delivery.

use std::fmt;
use std::sync::Arc;

use bridge::{Handle, HandleRegistry};
use dispatch::{DispatchError, DispatchResult, ErrorCode, Outcome};
use msg::{Message, MsgKind};

use crate::env::{ErrorHandler, TesterEnv};
use crate::logging::{LogLevel, LogSite};

/// Callback registered by the host.
///
/// Receives the status of the operation and, for command results, the handle
/// of the result message, which the host owns and must release.
pub type ForeignCallback = Arc<dyn Fn(ForeignStatus, Option<Handle>) + Send + Sync + 'static>;

/// Status returned across the boundary instead of a Rust error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignStatus {
    pub code: i32,
    pub message: String,
}

impl ForeignStatus {
    pub fn ok() -> Self {
        Self {
            code: ErrorCode::Ok as i32,
            message: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok as i32
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_i32(self.code)
    }
}

impl From<&DispatchError> for ForeignStatus {
    fn from(err: &DispatchError) -> Self {
        Self {
            code: err.code() as i32,
            message: err.to_string(),
        }
    }
}

impl<T> From<DispatchResult<T>> for ForeignStatus {
    fn from(result: DispatchResult<T>) -> Self {
        match result {
            Ok(_) => ForeignStatus::ok(),
            Err(err) => ForeignStatus::from(&err),
        }
    }
}

impl fmt::Display for ForeignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            f.write_str("ok")
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

struct Registries {
    messages: HandleRegistry<Message>,
    callbacks: HandleRegistry<ForeignCallback>,
}

/// Tester environment driven through raw handles.
pub struct ForeignTester {
    env: TesterEnv,
    registries: Arc<Registries>,
}

impl ForeignTester {
    pub fn new(env: TesterEnv) -> Self {
        Self {
            env,
            registries: Arc::new(Registries {
                messages: HandleRegistry::new(),
                callbacks: HandleRegistry::new(),
            }),
        }
    }

    /// Hands a message to the boundary and returns its raw handle.
    pub fn create_message(&self, msg: impl Into<Message>) -> u64 {
        self.registries.messages.insert(msg.into()).as_raw()
    }

    pub fn register_callback<F>(&self, callback: F) -> u64
    where
        F: Fn(ForeignStatus, Option<Handle>) + Send + Sync + 'static,
    {
        let callback: ForeignCallback = Arc::new(callback);
        self.registries.callbacks.insert(callback).as_raw()
    }

    /// Takes a message back out, e.g. to inspect a delivered result.
    pub fn take_message(&self, raw: u64) -> Option<Message> {
        Handle::from_raw(raw).and_then(|handle| self.registries.messages.take(handle))
    }

    pub fn release_message(&self, raw: u64) -> bool {
        Handle::from_raw(raw).is_some_and(|handle| self.registries.messages.release(handle))
    }

    pub fn release_callback(&self, raw: u64) -> bool {
        Handle::from_raw(raw).is_some_and(|handle| self.registries.callbacks.release(handle))
    }

    /// Live message and callback handles.
    pub fn live_handles(&self) -> (usize, usize) {
        (
            self.registries.messages.len(),
            self.registries.callbacks.len(),
        )
    }

    pub fn send_cmd(&self, cmd: u64, callback: u64) -> ForeignStatus {
        self.send_cmd_inner(cmd, callback, false).into()
    }

    pub fn send_cmd_ex(&self, cmd: u64, callback: u64) -> ForeignStatus {
        self.send_cmd_inner(cmd, callback, true).into()
    }

    fn send_cmd_inner(&self, raw: u64, callback: u64, streaming: bool) -> DispatchResult<()> {
        let callback = self.callback(callback)?;
        let Message::Cmd(cmd) = self.take_kind(raw, MsgKind::Cmd)? else {
            return Err(DispatchError::invalid_argument("cmd is required"));
        };
        let registries = Arc::clone(&self.registries);
        let deliver = move |_: &TesterEnv, outcome: Outcome| {
            let terminal = outcome.as_ref().map_or(true, |result| result.is_final);
            let (status, result) = match outcome {
                Ok(result) => (
                    ForeignStatus::ok(),
                    Some(registries.messages.insert(result.into())),
                ),
                Err(err) => (ForeignStatus::from(&err), None),
            };
            if let Some((handle, callback)) = &callback {
                if terminal {
                    registries.callbacks.release(*handle);
                }
                callback(status, result);
            } else if let Some(result) = result {
                registries.messages.release(result);
            }
        };
        if streaming {
            self.env.send_cmd_ex(cmd, deliver)?;
        } else {
            self.env.send_cmd(cmd, deliver)?;
        }
        Ok(())
    }

    pub fn send_data(&self, data: u64, callback: u64) -> ForeignStatus {
        self.send_one_way(data, MsgKind::Data, callback).into()
    }

    pub fn send_audio_frame(&self, frame: u64, callback: u64) -> ForeignStatus {
        self.send_one_way(frame, MsgKind::AudioFrame, callback).into()
    }

    pub fn send_video_frame(&self, frame: u64, callback: u64) -> ForeignStatus {
        self.send_one_way(frame, MsgKind::VideoFrame, callback).into()
    }

    fn send_one_way(&self, raw: u64, kind: MsgKind, callback: u64) -> DispatchResult<()> {
        let on_sent = self.completion(callback)?;
        let msg = self.take_kind(raw, kind)?;
        match msg {
            Message::Data(data) => self.env.send_data(data, on_sent),
            Message::AudioFrame(frame) => self.env.send_audio_frame(frame, on_sent),
            Message::VideoFrame(frame) => self.env.send_video_frame(frame, on_sent),
            other => Err(DispatchError::invalid_argument(format!(
                "{} is not a one-way message",
                other.kind().as_str()
            ))),
        }
    }

    pub fn return_result(&self, result: u64, callback: u64) -> ForeignStatus {
        self.return_result_inner(result, callback).into()
    }

    fn return_result_inner(&self, raw: u64, callback: u64) -> DispatchResult<()> {
        let on_done = self.completion(callback)?;
        let Message::CmdResult(result) = self.take_kind(raw, MsgKind::CmdResult)? else {
            return Err(DispatchError::invalid_argument("cmd_result is required"));
        };
        self.env.return_result(result, on_done)
    }

    pub fn stop_test(&self) -> ForeignStatus {
        self.env.stop_test().into()
    }

    pub fn on_start_done(&self) -> ForeignStatus {
        self.env.on_start_done().into()
    }

    pub fn on_stop_done(&self) -> ForeignStatus {
        self.env.on_stop_done().into()
    }

    pub fn on_deinit_done(&self) -> ForeignStatus {
        self.env.on_deinit_done().into()
    }

    pub fn log(
        &self,
        level: i32,
        function: &str,
        file: &str,
        line: u32,
        message: &str,
    ) -> ForeignStatus {
        LogLevel::from_i32(level)
            .and_then(|level| {
                let site = LogSite {
                    function,
                    file,
                    line,
                };
                self.env.log(level, site, message)
            })
            .into()
    }

    /// Removes the message behind `raw` if it has the expected kind.
    ///
    /// A null handle, an unknown handle or a kind mismatch leaves the
    /// registry untouched.
    fn take_kind(&self, raw: u64, kind: MsgKind) -> DispatchResult<Message> {
        let handle = Handle::from_raw(raw).ok_or_else(|| {
            DispatchError::invalid_argument(format!("{} is required", kind.as_str()))
        })?;
        let found = self.registries.messages.with(handle, |msg| msg.kind());
        match found {
            None => Err(DispatchError::invalid_argument(format!(
                "{handle} does not refer to a live message"
            ))),
            Some(actual) if actual != kind => Err(DispatchError::invalid_argument(format!(
                "{handle} is a {}, expected {}",
                actual.as_str(),
                kind.as_str()
            ))),
            Some(_) => self.registries.messages.take(handle).ok_or_else(|| {
                DispatchError::invalid_argument(format!("{handle} was consumed concurrently"))
            }),
        }
    }

    /// Resolves an optional callback handle; zero means no callback.
    fn callback(&self, raw: u64) -> DispatchResult<Option<(Handle, ForeignCallback)>> {
        let Some(handle) = Handle::from_raw(raw) else {
            return Ok(None);
        };
        self.registries
            .callbacks
            .get_cloned(handle)
            .map(|callback| Some((handle, callback)))
            .ok_or_else(|| {
                DispatchError::invalid_argument(format!("{handle} is not a live callback"))
            })
    }

    fn completion(&self, raw: u64) -> DispatchResult<Option<ErrorHandler>> {
        let Some((handle, callback)) = self.callback(raw)? else {
            return Ok(None);
        };
        let registries = Arc::clone(&self.registries);
        Ok(Some(Box::new(
            move |_: &TesterEnv, err: Option<DispatchError>| {
                let status = match &err {
                    Some(err) => ForeignStatus::from(err),
                    None => ForeignStatus::ok(),
                };
                registries.callbacks.release(handle);
                callback(status, None);
            },
        )))
    }
}

impl Drop for ForeignTester {
    fn drop(&mut self) {
        let (messages, callbacks) = self.live_handles();
        if messages + callbacks > 0 {
            log::debug!("releasing {messages} message and {callbacks} callback handle(s)");
        }
        self.registries.messages.clear();
        self.registries.callbacks.clear();
    }
}
