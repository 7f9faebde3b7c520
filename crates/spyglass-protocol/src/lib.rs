//! Debugger backend protocol façade for spyglass.
//!
//! The debugger model never talks to a socket directly. It hands
//! [`Outgoing`] commands, each tagged with a [`RequestId`], to a
//! [`DebuggerTransport`] and is fed back [`Incoming`] responses and events.
//! How those messages are encoded on the wire is up to the transport.

mod channel;
mod mock;

use serde::{Deserialize, Serialize};
use spyglass_core::{BackendId, RawLocation, RequestId, ScriptId};
use thiserror::Error;

pub use channel::ChannelTransport;
pub use mock::MockTransport;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("not connected to a debugger backend")]
    NotConnected,
    #[error("debugger backend disconnected")]
    Disconnected,
    #[error("command failed with code {code}: {message}")]
    CommandFailed { code: i64, message: String },
    #[error("{0}")]
    Other(String),
}

/// Requests understood by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Command {
    Enable,
    Disable,
    #[serde(rename_all = "camelCase")]
    SetBreakpointByUrl {
        url: String,
        line_number: u32,
        column_number: u32,
        condition: String,
    },
    #[serde(rename_all = "camelCase")]
    SetBreakpoint {
        location: RawLocation,
        condition: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoveBreakpoint { breakpoint_id: BackendId },
    SetBreakpointsActive { active: bool },
    #[serde(rename_all = "camelCase")]
    GetScriptSource { script_id: ScriptId },
    ContinueToLocation { location: RawLocation },
    Pause,
    Resume,
    StepOver,
    StepInto,
    StepOut,
}

/// Successful command results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The command has no payload.
    Ack,
    /// Reply to [`Command::SetBreakpointByUrl`]. An absent id means the
    /// backend refused the breakpoint.
    BreakpointByUrl {
        breakpoint_id: Option<BackendId>,
        locations: Vec<RawLocation>,
    },
    /// Reply to [`Command::SetBreakpoint`].
    Breakpoint {
        breakpoint_id: Option<BackendId>,
        actual_location: Option<RawLocation>,
    },
    ScriptSource { source: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsed {
    pub script_id: ScriptId,
    #[serde(default)]
    pub url: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    #[serde(default)]
    pub is_content_script: bool,
    #[serde(default, rename = "sourceMapURL")]
    pub source_map_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptFailedToParse {
    #[serde(flatten)]
    pub script: ScriptParsed,
    pub error_line: u32,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: String,
    pub function_name: String,
    pub location: RawLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedDetails {
    pub call_frames: Vec<CallFrame>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Log,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessage {
    pub url: String,
    pub line: u32,
    pub level: MessageLevel,
    pub text: String,
}

/// Notifications pushed by the backend without a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Event {
    DebuggerWasEnabled,
    DebuggerWasDisabled,
    ScriptParsed(ScriptParsed),
    ScriptFailedToParse(ScriptFailedToParse),
    #[serde(rename_all = "camelCase")]
    BreakpointResolved {
        breakpoint_id: BackendId,
        location: RawLocation,
    },
    Paused(PausedDetails),
    Resumed,
    /// The backend runtime was torn down (navigation, reload).
    GlobalObjectCleared,
    ConsoleMessageAdded(ConsoleMessage),
}

/// A command on its way to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub id: RequestId,
    pub command: Command,
}

/// A message coming back from the backend.
#[derive(Debug)]
pub enum Incoming {
    Response {
        id: RequestId,
        result: Result<Response, ProtocolError>,
    },
    Event(Event),
}

/// Abstraction over the debugger backend connection.
pub trait DebuggerTransport: Send {
    /// Queue `request` for delivery. Replies arrive later as
    /// [`Incoming::Response`] carrying the same id.
    fn send(&mut self, request: Outgoing) -> Result<(), ProtocolError>;
}

impl<T: DebuggerTransport + ?Sized> DebuggerTransport for Box<T> {
    fn send(&mut self, request: Outgoing) -> Result<(), ProtocolError> {
        (**self).send(request)
    }
}
