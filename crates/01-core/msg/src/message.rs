use thiserror::Error;

use crate::{AudioFrame, Cmd, CmdResult, Data, Loc, MsgKind, RequestId, VideoFrame};

/// Reason a message was rejected before dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid {kind}: {reason}")]
pub struct InvalidMessage {
    /// Kind name of the rejected message.
    pub kind: &'static str,
    /// What was wrong with it.
    pub reason: &'static str,
}

/// Any message the dispatch core can route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A command.
    Cmd(Cmd),
    /// A command result.
    CmdResult(CmdResult),
    /// A data packet.
    Data(Data),
    /// An audio frame.
    AudioFrame(AudioFrame),
    /// A video frame.
    VideoFrame(VideoFrame),
}

impl Message {
    /// Returns the kind tag.
    pub fn kind(&self) -> MsgKind {
        match self {
            Message::Cmd(_) => MsgKind::Cmd,
            Message::CmdResult(_) => MsgKind::CmdResult,
            Message::Data(_) => MsgKind::Data,
            Message::AudioFrame(_) => MsgKind::AudioFrame,
            Message::VideoFrame(_) => MsgKind::VideoFrame,
        }
    }

    /// Returns the message name (the command name for results).
    pub fn name(&self) -> &str {
        match self {
            Message::Cmd(cmd) => &cmd.name,
            Message::CmdResult(result) => &result.cmd_name,
            Message::Data(data) => &data.name,
            Message::AudioFrame(frame) => &frame.name,
            Message::VideoFrame(frame) => &frame.name,
        }
    }

    /// Returns the explicit destination, if any.
    pub fn dest(&self) -> Option<&Loc> {
        match self {
            Message::Cmd(cmd) => cmd.dest.as_ref(),
            Message::CmdResult(result) => result.dest.as_ref(),
            Message::Data(data) => data.dest.as_ref(),
            Message::AudioFrame(frame) => frame.dest.as_ref(),
            Message::VideoFrame(frame) => frame.dest.as_ref(),
        }
    }

    /// Overwrites the destination.
    pub fn set_dest(&mut self, dest: Loc) {
        let slot = match self {
            Message::Cmd(cmd) => &mut cmd.dest,
            Message::CmdResult(result) => &mut result.dest,
            Message::Data(data) => &mut data.dest,
            Message::AudioFrame(frame) => &mut frame.dest,
            Message::VideoFrame(frame) => &mut frame.dest,
        };
        *slot = Some(dest);
    }

    /// Request id for commands and results; `None` for one-way kinds.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Message::Cmd(cmd) => cmd.request_id,
            Message::CmdResult(result) => result.request_id,
            _ => None,
        }
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Cmd(cmd) => &cmd.payload,
            Message::CmdResult(result) => &result.payload,
            Message::Data(data) => &data.payload,
            Message::AudioFrame(frame) => &frame.buf,
            Message::VideoFrame(frame) => &frame.buf,
        }
    }

    /// Checks the fields every message of this kind must carry.
    pub fn validate(&self) -> Result<(), InvalidMessage> {
        match self {
            Message::Cmd(cmd) => cmd.validate(),
            Message::CmdResult(result) => result.validate(),
            _ => require_name(self.kind(), self.name()),
        }
    }
}

fn require_name(kind: MsgKind, name: &str) -> Result<(), InvalidMessage> {
    if name.is_empty() {
        return Err(InvalidMessage {
            kind: kind.as_str(),
            reason: "name is required",
        });
    }
    Ok(())
}

impl Cmd {
    /// A command needs a name to be routable.
    pub fn validate(&self) -> Result<(), InvalidMessage> {
        require_name(MsgKind::Cmd, &self.name)
    }
}

impl CmdResult {
    /// A result must answer a specific command.
    pub fn validate(&self) -> Result<(), InvalidMessage> {
        if self.request_id.is_none() {
            return Err(InvalidMessage {
                kind: MsgKind::CmdResult.as_str(),
                reason: "result is not bound to a command",
            });
        }
        Ok(())
    }
}

impl From<Cmd> for Message {
    fn from(cmd: Cmd) -> Self {
        Message::Cmd(cmd)
    }
}

impl From<CmdResult> for Message {
    fn from(result: CmdResult) -> Self {
        Message::CmdResult(result)
    }
}

impl From<Data> for Message {
    fn from(data: Data) -> Self {
        Message::Data(data)
    }
}

impl From<AudioFrame> for Message {
    fn from(frame: AudioFrame) -> Self {
        Message::AudioFrame(frame)
    }
}

impl From<VideoFrame> for Message {
    fn from(frame: VideoFrame) -> Self {
        Message::VideoFrame(frame)
    }
}
