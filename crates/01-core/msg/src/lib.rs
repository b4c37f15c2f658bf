//! Message value types exchanged between a tester and the extension under test.
//!
//! Messages are plain values: every send operation takes them by value, so a
//! sender can never touch a message again once the dispatch core owns it.
//! Payloads are shared immutable buffers (`Arc<[u8]>`); the core never looks
//! inside them.

#![deny(missing_docs)]

mod frame;
mod message;

use std::fmt;
use std::sync::Arc;

pub use frame::{AudioFrame, VideoFrame};
pub use message::{InvalidMessage, Message};

/// Correlation token linking a command to its result(s).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Destination reference for a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Loc {
    /// The test harness side.
    Tester,
    /// A named extension hosted by the engine.
    Extension(String),
}

impl Loc {
    /// Shorthand for [`Loc::Extension`].
    pub fn extension(name: impl Into<String>) -> Self {
        Loc::Extension(name.into())
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loc::Tester => f.write_str("tester"),
            Loc::Extension(name) => write!(f, "extension:{name}"),
        }
    }
}

/// Kind tag carried by every [`Message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsgKind {
    /// Request expecting one (or, when streaming, many-then-one) result.
    Cmd,
    /// Result flowing back to a command's sender.
    CmdResult,
    /// One-way data packet.
    Data,
    /// One-way audio frame.
    AudioFrame,
    /// One-way video frame.
    VideoFrame,
}

impl MsgKind {
    /// Stable lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            MsgKind::Cmd => "cmd",
            MsgKind::CmdResult => "cmd_result",
            MsgKind::Data => "data",
            MsgKind::AudioFrame => "audio_frame",
            MsgKind::VideoFrame => "video_frame",
        }
    }

    /// True for kinds that never produce a result.
    pub fn is_one_way(self) -> bool {
        matches!(self, MsgKind::Data | MsgKind::AudioFrame | MsgKind::VideoFrame)
    }
}

/// Status attached to a [`CmdResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    /// The command succeeded.
    Ok,
    /// The command failed; see the result detail.
    Error,
}

fn empty_payload() -> Arc<[u8]> {
    Arc::from([])
}

/// Command sent to a destination that answers with a [`CmdResult`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cmd {
    /// Command name; must not be empty.
    pub name: String,
    /// Opaque payload.
    pub payload: Arc<[u8]>,
    /// Explicit destination; the router's default is used when absent.
    pub dest: Option<Loc>,
    /// Sender location, stamped by the router.
    pub src: Option<Loc>,
    /// Request id, assigned by the router at send time.
    pub request_id: Option<RequestId>,
}

impl Cmd {
    /// Creates a command with an empty payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: empty_payload(),
            dest: None,
            src: None,
            request_id: None,
        }
    }

    /// Replaces the payload.
    pub fn with_payload(mut self, payload: impl Into<Arc<[u8]>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets an explicit destination.
    pub fn with_dest(mut self, dest: Loc) -> Self {
        self.dest = Some(dest);
        self
    }
}

/// Result produced for a [`Cmd`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CmdResult {
    /// Outcome status.
    pub status: StatusCode,
    /// Request id of the originating command.
    pub request_id: Option<RequestId>,
    /// Name of the originating command, for diagnostics.
    pub cmd_name: String,
    /// Where the result is headed (the original command's sender).
    pub dest: Option<Loc>,
    /// Opaque payload.
    pub payload: Arc<[u8]>,
    /// Optional human readable detail.
    pub detail: Option<String>,
    /// False for intermediate results of a streaming command.
    pub is_final: bool,
}

impl CmdResult {
    /// Creates a result answering `cmd`.
    pub fn for_cmd(status: StatusCode, cmd: &Cmd) -> Self {
        Self {
            status,
            request_id: cmd.request_id,
            cmd_name: cmd.name.clone(),
            dest: cmd.src.clone(),
            payload: empty_payload(),
            detail: None,
            is_final: true,
        }
    }

    /// Creates a result that is not yet bound to a command.
    pub fn detached(status: StatusCode) -> Self {
        Self {
            status,
            request_id: None,
            cmd_name: String::new(),
            dest: None,
            payload: empty_payload(),
            detail: None,
            is_final: true,
        }
    }

    /// Replaces the payload.
    pub fn with_payload(mut self, payload: impl Into<Arc<[u8]>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Attaches detail text.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Marks the result as intermediate (`false`) or terminal (`true`).
    pub fn with_final(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    /// True when the status is [`StatusCode::Ok`].
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }
}

/// One-way data packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Data {
    /// Packet name; must not be empty.
    pub name: String,
    /// Opaque payload.
    pub payload: Arc<[u8]>,
    /// Explicit destination; the router's default is used when absent.
    pub dest: Option<Loc>,
}

impl Data {
    /// Creates a data packet with an empty payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: empty_payload(),
            dest: None,
        }
    }

    /// Replaces the payload.
    pub fn with_payload(mut self, payload: impl Into<Arc<[u8]>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets an explicit destination.
    pub fn with_dest(mut self, dest: Loc) -> Self {
        self.dest = Some(dest);
        self
    }
}
