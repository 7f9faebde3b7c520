//! Volatile state of the live backend connection.
//!
//! The model is sans-IO: commands leave through a [`DebuggerTransport`] tagged
//! with a fresh [`RequestId`], and [`DebuggerModel::handle_message`] turns
//! whatever comes back into [`ModelEvent`]s.

use std::collections::{HashMap, HashSet};

use spyglass_core::{BackendId, Epoch, Position, RawLocation, RequestId, ScriptId};
use spyglass_protocol::{
    Command, ConsoleMessage, DebuggerTransport, Event, Incoming, Outgoing, PausedDetails, Response,
    ScriptFailedToParse, ScriptParsed,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    Disabled,
    Enabled,
    Running,
    Paused,
}

/// A script currently loaded in the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub id: ScriptId,
    pub url: String,
    pub start: Position,
    pub end: Position,
    pub is_content_script: bool,
    pub source_map_url: Option<String>,
}

impl Script {
    fn from_parsed(parsed: &ScriptParsed) -> Self {
        Self {
            id: parsed.script_id.clone(),
            url: parsed.url.clone(),
            start: Position::new(parsed.start_line, parsed.start_column),
            end: Position::new(parsed.end_line, parsed.end_column),
            is_content_script: parsed.is_content_script,
            source_map_url: parsed.source_map_url.clone(),
        }
    }

    pub fn has_url(&self) -> bool {
        !self.url.is_empty()
    }
}

/// A backend breakpoint that was installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetBreakpointResult {
    pub breakpoint_id: BackendId,
    pub locations: Vec<RawLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    DebuggerWasEnabled,
    DebuggerWasDisabled,
    ScriptParsed(ScriptParsed),
    ScriptFailedToParse(ScriptFailedToParse),
    /// Reply to a set-breakpoint request. `None` means the backend refused.
    BreakpointSet {
        request: RequestId,
        result: Option<SetBreakpointResult>,
    },
    BreakpointResolved {
        breakpoint_id: BackendId,
        location: RawLocation,
    },
    ScriptSource {
        script_id: ScriptId,
        source: String,
    },
    Paused,
    Resumed,
    ConsoleMessage(ConsoleMessage),
    /// The backend runtime was torn down; every script and breakpoint id from
    /// before is gone.
    Reset,
}

#[derive(Debug, Clone)]
enum PendingKind {
    SetBreakpoint,
    RemoveBreakpoint(BackendId),
    ScriptSource(ScriptId),
    Other,
}

#[derive(Debug, Clone)]
struct Pending {
    kind: PendingKind,
    epoch: Epoch,
}

pub struct DebuggerModel<T: DebuggerTransport> {
    transport: T,
    state: DebuggerState,
    scripts: HashMap<ScriptId, Script>,
    next_request: u64,
    epoch: Epoch,
    pending: HashMap<RequestId, Pending>,
    live_breakpoints: HashSet<BackendId>,
    paused: Option<PausedDetails>,
    breakpoints_active: bool,
}

impl<T: DebuggerTransport> DebuggerModel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: DebuggerState::Disabled,
            scripts: HashMap::new(),
            next_request: 1,
            epoch: Epoch::default(),
            pending: HashMap::new(),
            live_breakpoints: HashSet::new(),
            paused: None,
            breakpoints_active: true,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn state(&self) -> DebuggerState {
        self.state
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_paused(&self) -> bool {
        self.state == DebuggerState::Paused
    }

    pub fn paused_details(&self) -> Option<&PausedDetails> {
        self.paused.as_ref()
    }

    pub fn breakpoints_active(&self) -> bool {
        self.breakpoints_active
    }

    pub fn script(&self, id: &ScriptId) -> Option<&Script> {
        self.scripts.get(id)
    }

    pub fn scripts(&self) -> impl Iterator<Item = &Script> {
        self.scripts.values()
    }

    pub fn scripts_for_url<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Script> + 'a {
        self.scripts.values().filter(move |script| script.url == url)
    }

    pub fn is_live_breakpoint(&self, id: &BackendId) -> bool {
        self.live_breakpoints.contains(id)
    }

    fn send(&mut self, command: Command, kind: PendingKind) -> Option<RequestId> {
        let id = RequestId::from_raw(self.next_request);
        self.next_request += 1;
        match self.transport.send(Outgoing { id, command }) {
            Ok(()) => {
                self.pending.insert(
                    id,
                    Pending {
                        kind,
                        epoch: self.epoch,
                    },
                );
                Some(id)
            }
            Err(err) => {
                tracing::warn!(target: "spyglass.debugger", request = %id, error = %err, "failed to send command");
                None
            }
        }
    }

    pub fn enable(&mut self) -> Option<RequestId> {
        self.send(Command::Enable, PendingKind::Other)
    }

    pub fn disable(&mut self) -> Option<RequestId> {
        self.send(Command::Disable, PendingKind::Other)
    }

    /// Requests a breakpoint in every loaded script with `url`.
    ///
    /// The column is raised to the start column of any script with that URL
    /// beginning exactly on `line`, so the breakpoint cannot land before the
    /// script itself.
    pub fn set_breakpoint_by_url(
        &mut self,
        url: &str,
        line: u32,
        column: u32,
        condition: &str,
    ) -> Option<RequestId> {
        let min_column = self
            .scripts_for_url(url)
            .filter(|script| script.start.line == line)
            .map(|script| script.start.column)
            .min();
        let column = min_column.map_or(column, |min| column.max(min));

        self.send(
            Command::SetBreakpointByUrl {
                url: url.to_owned(),
                line_number: line,
                column_number: column,
                condition: condition.to_owned(),
            },
            PendingKind::SetBreakpoint,
        )
    }

    /// Requests a breakpoint in one specific script.
    pub fn set_breakpoint_by_source_id(
        &mut self,
        location: &RawLocation,
        condition: &str,
    ) -> Option<RequestId> {
        self.send(
            Command::SetBreakpoint {
                location: location.clone(),
                condition: condition.to_owned(),
            },
            PendingKind::SetBreakpoint,
        )
    }

    /// URL-based when the script has a URL (so the breakpoint also applies to
    /// later reloads of it), script-based otherwise. `None` when the script
    /// is unknown or the command could not be sent.
    pub fn set_breakpoint_by_script_location(
        &mut self,
        location: &RawLocation,
        condition: &str,
    ) -> Option<RequestId> {
        let script = self.scripts.get(&location.script_id)?;
        if script.has_url() {
            let url = script.url.clone();
            self.set_breakpoint_by_url(&url, location.line, location.column, condition)
        } else {
            self.set_breakpoint_by_source_id(location, condition)
        }
    }

    /// Removes a backend breakpoint. Unknown or already removed ids are a no-op.
    pub fn remove_breakpoint(&mut self, id: &BackendId) {
        if !self.live_breakpoints.remove(id) {
            return;
        }
        if self.state == DebuggerState::Disabled {
            // The backend dropped its breakpoints when it was disabled.
            return;
        }
        self.send(
            Command::RemoveBreakpoint {
                breakpoint_id: id.clone(),
            },
            PendingKind::RemoveBreakpoint(id.clone()),
        );
    }

    pub fn set_breakpoints_active(&mut self, active: bool) -> Option<RequestId> {
        self.breakpoints_active = active;
        self.send(Command::SetBreakpointsActive { active }, PendingKind::Other)
    }

    pub fn request_script_source(&mut self, script_id: &ScriptId) -> Option<RequestId> {
        if !self.scripts.contains_key(script_id) {
            return None;
        }
        self.send(
            Command::GetScriptSource {
                script_id: script_id.clone(),
            },
            PendingKind::ScriptSource(script_id.clone()),
        )
    }

    pub fn pause(&mut self) -> Option<RequestId> {
        self.send(Command::Pause, PendingKind::Other)
    }

    pub fn resume(&mut self) -> Option<RequestId> {
        self.send(Command::Resume, PendingKind::Other)
    }

    pub fn step_over(&mut self) -> Option<RequestId> {
        self.send(Command::StepOver, PendingKind::Other)
    }

    pub fn step_into(&mut self) -> Option<RequestId> {
        self.send(Command::StepInto, PendingKind::Other)
    }

    pub fn step_out(&mut self) -> Option<RequestId> {
        self.send(Command::StepOut, PendingKind::Other)
    }

    pub fn continue_to_location(&mut self, location: &RawLocation) -> Option<RequestId> {
        self.send(
            Command::ContinueToLocation {
                location: location.clone(),
            },
            PendingKind::Other,
        )
    }

    /// Drops all script and pause state and starts a new epoch. Responses to
    /// requests issued before this are ignored when they arrive.
    pub fn reset(&mut self) {
        self.epoch = self.epoch.next();
        self.scripts.clear();
        self.live_breakpoints.clear();
        self.paused = None;
        if self.state != DebuggerState::Disabled {
            self.state = DebuggerState::Enabled;
        }
        tracing::debug!(target: "spyglass.debugger", epoch = %self.epoch, "debugger reset");
    }

    pub fn handle_message(&mut self, message: Incoming) -> Vec<ModelEvent> {
        match message {
            Incoming::Response { id, result } => {
                self.handle_response(id, result).into_iter().collect()
            }
            Incoming::Event(event) => self.handle_event(event),
        }
    }

    fn handle_response(
        &mut self,
        id: RequestId,
        result: Result<Response, spyglass_protocol::ProtocolError>,
    ) -> Option<ModelEvent> {
        let Some(pending) = self.pending.remove(&id) else {
            tracing::debug!(target: "spyglass.debugger", request = %id, "response to unknown request");
            return None;
        };
        if pending.epoch != self.epoch {
            tracing::debug!(
                target: "spyglass.debugger",
                request = %id,
                issued = %pending.epoch,
                current = %self.epoch,
                "dropping response from before reset"
            );
            return None;
        }

        match pending.kind {
            PendingKind::SetBreakpoint => {
                let result = match result {
                    Ok(Response::BreakpointByUrl {
                        breakpoint_id,
                        locations,
                    }) => breakpoint_id.map(|breakpoint_id| SetBreakpointResult {
                        breakpoint_id,
                        locations,
                    }),
                    Ok(Response::Breakpoint {
                        breakpoint_id,
                        actual_location,
                    }) => breakpoint_id.map(|breakpoint_id| SetBreakpointResult {
                        breakpoint_id,
                        locations: actual_location.into_iter().collect(),
                    }),
                    Ok(other) => {
                        tracing::warn!(target: "spyglass.debugger", request = %id, response = ?other, "unexpected reply to set breakpoint");
                        None
                    }
                    Err(err) => {
                        tracing::debug!(target: "spyglass.debugger", request = %id, error = %err, "backend refused breakpoint");
                        None
                    }
                };
                if let Some(result) = &result {
                    self.live_breakpoints.insert(result.breakpoint_id.clone());
                }
                Some(ModelEvent::BreakpointSet {
                    request: id,
                    result,
                })
            }
            PendingKind::ScriptSource(script_id) => match result {
                Ok(Response::ScriptSource { source }) => {
                    Some(ModelEvent::ScriptSource { script_id, source })
                }
                Ok(_) => None,
                Err(err) => {
                    tracing::debug!(target: "spyglass.debugger", script_id = %script_id, error = %err, "failed to fetch script source");
                    None
                }
            },
            PendingKind::RemoveBreakpoint(breakpoint_id) => {
                if let Err(err) = result {
                    tracing::debug!(target: "spyglass.debugger", breakpoint_id = %breakpoint_id, error = %err, "failed to remove breakpoint");
                }
                None
            }
            PendingKind::Other => {
                if let Err(err) = result {
                    tracing::debug!(target: "spyglass.debugger", request = %id, error = %err, "command failed");
                }
                None
            }
        }
    }

    fn handle_event(&mut self, event: Event) -> Vec<ModelEvent> {
        let event = match event {
            Event::DebuggerWasEnabled => {
                self.state = DebuggerState::Enabled;
                ModelEvent::DebuggerWasEnabled
            }
            Event::DebuggerWasDisabled => {
                self.state = DebuggerState::Disabled;
                self.paused = None;
                ModelEvent::DebuggerWasDisabled
            }
            Event::ScriptParsed(parsed) => {
                self.scripts
                    .insert(parsed.script_id.clone(), Script::from_parsed(&parsed));
                ModelEvent::ScriptParsed(parsed)
            }
            Event::ScriptFailedToParse(failed) => {
                self.scripts.insert(
                    failed.script.script_id.clone(),
                    Script::from_parsed(&failed.script),
                );
                ModelEvent::ScriptFailedToParse(failed)
            }
            Event::BreakpointResolved {
                breakpoint_id,
                location,
            } => {
                if !self.live_breakpoints.contains(&breakpoint_id) {
                    tracing::debug!(target: "spyglass.debugger", breakpoint_id = %breakpoint_id, "resolution for unknown breakpoint");
                    return Vec::new();
                }
                ModelEvent::BreakpointResolved {
                    breakpoint_id,
                    location,
                }
            }
            Event::Paused(details) => {
                self.state = DebuggerState::Paused;
                self.paused = Some(details);
                ModelEvent::Paused
            }
            Event::Resumed => {
                self.state = DebuggerState::Running;
                self.paused = None;
                ModelEvent::Resumed
            }
            Event::GlobalObjectCleared => {
                self.reset();
                ModelEvent::Reset
            }
            Event::ConsoleMessageAdded(message) => ModelEvent::ConsoleMessage(message),
        };
        vec![event]
    }
}
