//! The explicit context object tying the backend model, the source bindings
//! and the breakpoint manager together.

use std::path::Path;

use spyglass_config::SpyglassConfig;
use spyglass_core::{BackendId, Epoch, LogicalFile, LogicalFileId, RawLocation, RequestId, UiLocation};
use spyglass_protocol::{ConsoleMessage, DebuggerTransport, Incoming, MessageLevel, ProtocolError, ScriptParsed};
use spyglass_sourcemap::FetchError;
use tokio::sync::broadcast;
use url::Url;

use crate::bindings::{SourceBindings, SourceMapFetch};
use crate::breakpoints::{
    Breakpoint, BreakpointBackend, BreakpointEvent, BreakpointKey, BreakpointManager,
    BreakpointStorage, ConfiguredStorage, DEFAULT_EVENT_CAPACITY,
};
use crate::error::DebugResult;
use crate::mapping::{FormattedContent, ScriptFormatter, ScriptSourceMapping};
use crate::model::{DebuggerModel, ModelEvent};
use crate::raw_source::{RawSourceId, SourceMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub source_maps_enabled: bool,
    /// Base for completing relative script URLs before resolving their
    /// source map URLs.
    pub inspected_url: Option<Url>,
    pub format_source: bool,
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            source_maps_enabled: true,
            inspected_url: None,
            format_source: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &SpyglassConfig) -> Self {
        Self {
            source_maps_enabled: config.source_maps.enabled,
            inspected_url: config.source_maps.inspected_url.clone(),
            format_source: config.formatting.format_source,
            event_capacity: config.breakpoints.event_capacity,
        }
    }
}

/// Lets the breakpoint manager reach the model and the location mapping
/// without owning either.
struct SessionBackend<'a, T: DebuggerTransport> {
    model: &'a mut DebuggerModel<T>,
    bindings: &'a SourceBindings,
}

impl<T: DebuggerTransport> BreakpointBackend for SessionBackend<'_, T> {
    fn ui_to_raw(&self, location: &UiLocation) -> Option<RawLocation> {
        self.bindings.ui_to_raw(location)
    }

    fn raw_to_ui(&self, location: &RawLocation) -> Option<UiLocation> {
        self.bindings.raw_to_ui(location)
    }

    fn set_breakpoint(&mut self, location: &RawLocation, condition: &str) -> Option<RequestId> {
        self.model
            .set_breakpoint_by_script_location(location, condition)
    }

    fn remove_breakpoint(&mut self, id: &BackendId) {
        self.model.remove_breakpoint(id);
    }

    fn set_breakpoints_active(&mut self, active: bool) {
        self.model.set_breakpoints_active(active);
    }

    fn epoch(&self) -> Epoch {
        self.model.epoch()
    }
}

pub struct DebugSession<T: DebuggerTransport, S: BreakpointStorage> {
    model: DebuggerModel<T>,
    bindings: SourceBindings,
    breakpoints: BreakpointManager<S>,
    format_source: bool,
    formatter: Option<Box<dyn ScriptFormatter + Send>>,
}

impl<T: DebuggerTransport> DebugSession<T, ConfiguredStorage> {
    /// Builds a session from configuration and restores its stored
    /// breakpoints.
    pub fn from_config(transport: T, config: &SpyglassConfig) -> DebugResult<Self> {
        let storage = ConfiguredStorage::from_config(&config.breakpoints);
        let mut session = Self::new(transport, storage, SessionOptions::from_config(config));
        session.restore_breakpoints()?;
        Ok(session)
    }

    /// Like [`DebugSession::from_config`], with the configuration discovered
    /// in `workspace_root` (defaults when there is none).
    pub fn from_workspace(transport: T, workspace_root: &Path) -> DebugResult<Self> {
        let (config, path) = spyglass_config::load_for_workspace(workspace_root)?;
        if let Some(path) = &path {
            tracing::debug!(target: "spyglass.debugger", path = %path.display(), "session config loaded");
        }
        Self::from_config(transport, &config)
    }
}

impl<T: DebuggerTransport, S: BreakpointStorage> DebugSession<T, S> {
    pub fn new(transport: T, storage: S, options: SessionOptions) -> Self {
        Self {
            model: DebuggerModel::new(transport),
            bindings: SourceBindings::new(options.source_maps_enabled, options.inspected_url),
            breakpoints: BreakpointManager::with_event_capacity(storage, options.event_capacity),
            format_source: options.format_source,
            formatter: None,
        }
    }

    /// Formatter used to pretty-print sources while format-source is on.
    pub fn with_formatter(mut self, formatter: impl ScriptFormatter + Send + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    pub fn restore_breakpoints(&mut self) -> DebugResult<usize> {
        let (manager, mut backend) = self.parts();
        Ok(manager.restore(&mut backend)?)
    }

    pub fn model(&self) -> &DebuggerModel<T> {
        &self.model
    }

    pub fn bindings(&self) -> &SourceBindings {
        &self.bindings
    }

    pub fn breakpoint_manager(&self) -> &BreakpointManager<S> {
        &self.breakpoints
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.model.transport_mut()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakpointEvent> {
        self.breakpoints.subscribe()
    }

    fn parts(&mut self) -> (&mut BreakpointManager<S>, SessionBackend<'_, T>) {
        (
            &mut self.breakpoints,
            SessionBackend {
                model: &mut self.model,
                bindings: &self.bindings,
            },
        )
    }

    pub fn enable(&mut self) -> DebugResult<RequestId> {
        Ok(self.model.enable().ok_or(ProtocolError::NotConnected)?)
    }

    pub fn disable(&mut self) -> DebugResult<RequestId> {
        Ok(self.model.disable().ok_or(ProtocolError::NotConnected)?)
    }

    /// Feeds one backend message through the model and reacts to what it
    /// reports.
    pub fn handle_message(&mut self, message: Incoming) {
        for event in self.model.handle_message(message) {
            self.handle_model_event(event);
        }
    }

    fn handle_model_event(&mut self, event: ModelEvent) {
        match event {
            ModelEvent::DebuggerWasEnabled => {
                let (manager, mut backend) = self.parts();
                manager.materialize_all(&mut backend);
            }
            ModelEvent::DebuggerWasDisabled => {
                let (manager, mut backend) = self.parts();
                manager.reset(&mut backend);
            }
            ModelEvent::ScriptParsed(script) => self.script_added(&script),
            ModelEvent::ScriptFailedToParse(failed) => {
                self.script_added(&failed.script);
                self.bindings.add_message(
                    &failed.script.script_id,
                    SourceMessage {
                        line: failed.error_line,
                        level: MessageLevel::Error,
                        text: failed.error_message,
                    },
                );
            }
            ModelEvent::BreakpointSet { request, result } => {
                let (manager, mut backend) = self.parts();
                manager.breakpoint_set(&mut backend, request, result);
            }
            ModelEvent::BreakpointResolved {
                breakpoint_id,
                location,
            } => {
                let (manager, mut backend) = self.parts();
                manager.breakpoint_resolved(&mut backend, &breakpoint_id, location);
            }
            ModelEvent::ScriptSource { script_id, source } => {
                if self.bindings.set_script_source(&script_id, source) {
                    if let Some(raw) = self.bindings.raw_source_for_script(&script_id) {
                        let raw_id = raw.id().clone();
                        self.format_if_requested(&raw_id);
                    }
                }
            }
            ModelEvent::ConsoleMessage(message) => {
                self.add_console_message(&message);
            }
            ModelEvent::Paused | ModelEvent::Resumed => {}
            ModelEvent::Reset => {
                self.bindings.reset();
                self.breakpoints.debugger_reset();
            }
        }
    }

    fn script_added(&mut self, script: &ScriptParsed) {
        let files = self.bindings.add_script(script);
        self.files_available(&files);
        if self.format_source && self.formatter.is_some() {
            self.model.request_script_source(&script.script_id);
        }
    }

    fn files_available(&mut self, files: &[LogicalFile]) {
        let (manager, mut backend) = self.parts();
        for file in files {
            manager.logical_file_available(&mut backend, file);
        }
    }

    pub fn set_breakpoint(
        &mut self,
        file: &LogicalFile,
        line: u32,
        condition: &str,
        enabled: bool,
    ) -> Option<BreakpointKey> {
        let (manager, mut backend) = self.parts();
        manager.set_breakpoint(&mut backend, file, line, condition, enabled)
    }

    pub fn remove_breakpoint(&mut self, file: &LogicalFileId, line: u32) -> bool {
        let (manager, mut backend) = self.parts();
        manager.remove_breakpoint(&mut backend, file, line)
    }

    pub fn set_breakpoint_enabled(&mut self, file: &LogicalFileId, line: u32, enabled: bool) -> bool {
        let (manager, mut backend) = self.parts();
        manager.set_enabled(&mut backend, file, line, enabled)
    }

    pub fn set_breakpoint_condition(&mut self, file: &LogicalFileId, line: u32, condition: &str) -> bool {
        let (manager, mut backend) = self.parts();
        manager.set_condition(&mut backend, file, line, condition)
    }

    pub fn remove_all_breakpoints(&mut self) {
        let (manager, mut backend) = self.parts();
        manager.remove_all(&mut backend);
    }

    pub fn toggle_all_breakpoints(&mut self, enabled: bool) {
        let (manager, mut backend) = self.parts();
        manager.toggle_all(&mut backend, enabled);
    }

    pub fn set_breakpoints_active(&mut self, active: bool) {
        let (manager, mut backend) = self.parts();
        manager.set_breakpoints_active(&mut backend, active);
    }

    pub fn breakpoints_for_file(&self, file: &LogicalFileId) -> Vec<&Breakpoint> {
        self.breakpoints.breakpoints_for_file(file)
    }

    pub fn find_breakpoint(&self, file: &LogicalFileId, line: u32) -> Option<&Breakpoint> {
        self.breakpoints.find_breakpoint(file, line)
    }

    pub fn raw_to_ui(&self, location: &RawLocation) -> Option<UiLocation> {
        self.bindings.raw_to_ui(location)
    }

    pub fn ui_to_raw(&self, location: &UiLocation) -> Option<RawLocation> {
        self.bindings.ui_to_raw(location)
    }

    pub fn logical_file_for_url(&self, url: &str) -> Option<&LogicalFile> {
        self.bindings.file_for_url(url)
    }

    pub fn content(&self, file: &LogicalFileId) -> Option<String> {
        self.bindings.content(file)
    }

    /// Requests the source of every fragment of `file` not fetched yet.
    /// Returns the number of requests sent.
    pub fn request_content(&mut self, file: &LogicalFileId) -> usize {
        let Some(raw) = self.bindings.raw_source_for_file(file) else {
            return 0;
        };
        let missing: Vec<_> = raw.missing_sources().cloned().collect();
        missing
            .iter()
            .filter(|script_id| self.model.request_script_source(script_id).is_some())
            .count()
    }

    /// Switches a raw source between formatted and plain display. The
    /// breakpoints of the old logical file are unbound (not dropped) and
    /// those of the new one bound.
    pub fn set_formatted(&mut self, raw_id: &RawSourceId, formatted: Option<FormattedContent>) -> bool {
        let Some(swap) = self.bindings.set_formatted(raw_id, formatted) else {
            return false;
        };
        let (manager, mut backend) = self.parts();
        manager.unbind_file(&mut backend, &swap.removed.id);
        manager.logical_file_available(&mut backend, &swap.added);
        true
    }

    /// Turns pretty-printing on or off for every source. Sources whose
    /// content is not known yet are formatted once it arrives.
    pub fn set_format_source(&mut self, enabled: bool) -> usize {
        self.format_source = enabled;
        let ids: Vec<RawSourceId> = self.bindings.raw_sources().map(|raw| raw.id().clone()).collect();
        let mut changed = 0;
        for raw_id in ids {
            let switched = if enabled {
                self.format_if_requested(&raw_id)
            } else {
                self.set_formatted(&raw_id, None)
            };
            if switched {
                changed += 1;
            }
        }
        changed
    }

    fn format_if_requested(&mut self, raw_id: &RawSourceId) -> bool {
        if !self.format_source {
            return false;
        }
        let Some(formatter) = self.formatter.as_ref() else {
            return false;
        };
        let Some(raw) = self.bindings.raw_source(raw_id) else {
            return false;
        };
        if raw.is_formatted() {
            return false;
        }
        let Some(formatted) = raw.content().and_then(|content| formatter.format(&content)) else {
            return false;
        };
        self.set_formatted(raw_id, Some(formatted))
    }

    /// UI locations of the current call frames, innermost first. Frames in
    /// code with no mapping are `None`.
    pub fn call_frame_locations(&self) -> Vec<Option<UiLocation>> {
        self.model
            .paused_details()
            .map(|details| {
                details
                    .call_frames
                    .iter()
                    .map(|frame| self.bindings.raw_to_ui(&frame.location))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn continue_to_location(&mut self, location: &UiLocation) -> Option<RequestId> {
        let raw = self.bindings.ui_to_raw(location)?;
        self.model.continue_to_location(&raw)
    }

    pub fn add_console_message(&mut self, message: &ConsoleMessage) -> bool {
        self.bindings.add_message_for_url(
            &message.url,
            SourceMessage {
                line: message.line,
                level: message.level,
                text: message.text.clone(),
            },
        )
    }

    pub fn take_source_map_fetches(&mut self) -> Vec<SourceMapFetch> {
        self.bindings.take_fetches()
    }

    /// Settles a source map load and binds breakpoints waiting on the
    /// original files it introduced.
    pub fn source_map_loaded(&mut self, fetch: &SourceMapFetch, text: Result<String, FetchError>) {
        let files = self.bindings.source_map_loaded(fetch, text);
        self.files_available(&files);
    }
}
