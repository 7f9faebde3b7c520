//! The durable, user-facing breakpoint set.
//!
//! A [`Breakpoint`] is keyed by `(logical file, line)`. Whether it currently
//! exists in the backend is tracked by its [`Materialization`]; every backend
//! round trip is correlated through the request id and the epoch it was issued
//! in, so a reply that arrives after the breakpoint was removed, replaced or
//! reset is discarded and any backend id it carries is released.

mod storage;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use spyglass_core::{BackendId, Epoch, LogicalFile, LogicalFileId, RawLocation, RequestId, UiLocation};
use tokio::sync::broadcast;

use crate::model::SetBreakpointResult;

pub use storage::{
    BreakpointStorage, ConfiguredStorage, JsonFileStorage, MemoryStorage, SerializedBreakpoint,
    StorageError,
};

/// What the manager needs from the rest of the session.
pub trait BreakpointBackend {
    fn ui_to_raw(&self, location: &UiLocation) -> Option<RawLocation>;
    fn raw_to_ui(&self, location: &RawLocation) -> Option<UiLocation>;
    /// Issues a set-breakpoint request; the reply is delivered through
    /// [`BreakpointManager::breakpoint_set`].
    fn set_breakpoint(&mut self, location: &RawLocation, condition: &str) -> Option<RequestId>;
    fn remove_breakpoint(&mut self, id: &BackendId);
    fn set_breakpoints_active(&mut self, active: bool);
    fn epoch(&self) -> Epoch;
}

/// Identity of one breakpoint instance. Never reused, so a breakpoint removed
/// and recreated on the same line is a different breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointKey(u64);

impl fmt::Display for BreakpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bp{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialization {
    Unmaterialized,
    /// A set-breakpoint request is in flight.
    Pending { request: RequestId },
    Materialized {
        backend_id: BackendId,
        locations: Vec<RawLocation>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    key: BreakpointKey,
    file: LogicalFileId,
    line: u32,
    condition: String,
    enabled: bool,
    persistent: bool,
    bound: bool,
    materialization: Materialization,
}

impl Breakpoint {
    pub fn key(&self) -> BreakpointKey {
        self.key
    }

    pub fn file(&self) -> &LogicalFileId {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    /// Whether the breakpoint's logical file is currently available.
    pub fn bound(&self) -> bool {
        self.bound
    }

    pub fn materialization(&self) -> &Materialization {
        &self.materialization
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.materialization, Materialization::Materialized { .. })
    }

    pub fn backend_id(&self) -> Option<&BackendId> {
        match &self.materialization {
            Materialization::Materialized { backend_id, .. } => Some(backend_id),
            _ => None,
        }
    }

    pub fn backend_locations(&self) -> &[RawLocation] {
        match &self.materialization {
            Materialization::Materialized { locations, .. } => locations,
            _ => &[],
        }
    }

    fn serialized(&self) -> SerializedBreakpoint {
        SerializedBreakpoint {
            source_file_id: self.file.to_string(),
            line_number: self.line,
            condition: self.condition.clone(),
            enabled: self.enabled,
        }
    }
}

/// Change notifications. Each carries a snapshot taken after the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointEvent {
    Added(Breakpoint),
    Removed(Breakpoint),
    Moved {
        breakpoint: Breakpoint,
        from: u32,
        to: u32,
    },
    Updated(Breakpoint),
    ActiveChanged(bool),
}

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

type Slot = (LogicalFileId, u32);

pub struct BreakpointManager<S: BreakpointStorage> {
    breakpoints: HashMap<BreakpointKey, Breakpoint>,
    by_location: HashMap<LogicalFileId, BTreeMap<u32, BreakpointKey>>,
    by_backend_id: HashMap<BackendId, BreakpointKey>,
    pending: HashMap<RequestId, (BreakpointKey, Epoch)>,
    available: HashMap<LogicalFileId, LogicalFile>,
    /// Persistent breakpoints the backend refused this session. They are out
    /// of the index but stay in storage.
    refused: BTreeMap<Slot, SerializedBreakpoint>,
    next_key: u64,
    active: bool,
    storage: S,
    muted: bool,
    events: broadcast::Sender<BreakpointEvent>,
}

impl<S: BreakpointStorage> BreakpointManager<S> {
    pub fn new(storage: S) -> Self {
        Self::with_event_capacity(storage, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(storage: S, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            breakpoints: HashMap::new(),
            by_location: HashMap::new(),
            by_backend_id: HashMap::new(),
            pending: HashMap::new(),
            available: HashMap::new(),
            refused: BTreeMap::new(),
            next_key: 0,
            active: true,
            storage,
            muted: false,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakpointEvent> {
        self.events.subscribe()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Loads the stored breakpoints. Those whose file is already available
    /// are materialized; the rest stay unbound until it is.
    pub fn restore(&mut self, backend: &mut dyn BreakpointBackend) -> Result<usize, StorageError> {
        let records = self.storage.load()?;
        self.muted = true;
        let mut restored = Vec::new();
        for record in records {
            let file = LogicalFileId::new(record.source_file_id);
            if self.slot(&file, record.line_number).is_some() {
                continue;
            }
            let bound = self.available.contains_key(&file);
            let key = self.insert(
                file,
                record.line_number,
                record.condition,
                record.enabled,
                true,
                bound,
            );
            restored.push(key);
        }
        self.muted = false;
        tracing::debug!(target: "spyglass.breakpoints", restored = restored.len(), "restored breakpoints");
        for &key in &restored {
            self.materialize(backend, key);
        }
        Ok(restored.len())
    }

    /// Creates a breakpoint. Returns `None` if one already exists at that line.
    pub fn set_breakpoint(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        file: &LogicalFile,
        line: u32,
        condition: &str,
        enabled: bool,
    ) -> Option<BreakpointKey> {
        if self.slot(&file.id, line).is_some() {
            return None;
        }
        self.refused.remove(&(file.id.clone(), line));
        let bound = self.available.contains_key(&file.id);
        let key = self.insert(
            file.id.clone(),
            line,
            condition.to_owned(),
            enabled,
            file.is_persistent(),
            bound,
        );
        if file.is_persistent() {
            self.persist();
        }
        self.materialize(backend, key);
        Some(key)
    }

    /// Removes the breakpoint at `(file, line)`. Absent breakpoints are a
    /// no-op that never reaches the backend.
    pub fn remove_breakpoint(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        file: &LogicalFileId,
        line: u32,
    ) -> bool {
        let Some(key) = self.slot(file, line) else {
            if self.refused.remove(&(file.clone(), line)).is_some() {
                self.persist();
            }
            return false;
        };
        self.dematerialize(backend, key);
        if let Some(breakpoint) = self.detach(key) {
            if breakpoint.persistent {
                self.persist();
            }
            self.emit(BreakpointEvent::Removed(breakpoint));
        }
        true
    }

    pub fn remove_all(&mut self, backend: &mut dyn BreakpointBackend) {
        let keys: Vec<BreakpointKey> = self.breakpoints.keys().copied().collect();
        for key in keys {
            self.dematerialize(backend, key);
            if let Some(breakpoint) = self.detach(key) {
                self.emit(BreakpointEvent::Removed(breakpoint));
            }
        }
        self.refused.clear();
        self.persist();
    }

    pub fn set_enabled(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        file: &LogicalFileId,
        line: u32,
        enabled: bool,
    ) -> bool {
        let Some(key) = self.slot(file, line) else {
            return false;
        };
        if self.update(backend, key, |breakpoint| {
            std::mem::replace(&mut breakpoint.enabled, enabled) != enabled
        }) {
            self.persist_if_persistent(key);
        }
        true
    }

    pub fn set_condition(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        file: &LogicalFileId,
        line: u32,
        condition: &str,
    ) -> bool {
        let Some(key) = self.slot(file, line) else {
            return false;
        };
        if self.update(backend, key, |breakpoint| {
            if breakpoint.condition == condition {
                return false;
            }
            breakpoint.condition = condition.to_owned();
            true
        }) {
            self.persist_if_persistent(key);
        }
        true
    }

    /// Enables or disables every breakpoint.
    pub fn toggle_all(&mut self, backend: &mut dyn BreakpointBackend, enabled: bool) {
        let keys: Vec<BreakpointKey> = self.breakpoints.keys().copied().collect();
        let mut changed = false;
        for key in keys {
            changed |= self.update(backend, key, |breakpoint| {
                std::mem::replace(&mut breakpoint.enabled, enabled) != enabled
            });
        }
        for record in self.refused.values_mut() {
            changed |= std::mem::replace(&mut record.enabled, enabled) != enabled;
        }
        if changed {
            self.persist();
        }
    }

    pub fn set_breakpoints_active(&mut self, backend: &mut dyn BreakpointBackend, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        backend.set_breakpoints_active(active);
        self.emit(BreakpointEvent::ActiveChanged(active));
    }

    pub fn breakpoints_active(&self) -> bool {
        self.active
    }

    /// Binds `file` and materializes every breakpoint recorded against it.
    pub fn logical_file_available(&mut self, backend: &mut dyn BreakpointBackend, file: &LogicalFile) {
        self.available.insert(file.id.clone(), file.clone());
        for key in self.keys_for_file(&file.id) {
            if let Some(breakpoint) = self.breakpoints.get_mut(&key) {
                breakpoint.bound = true;
            }
            self.materialize(backend, key);
        }
    }

    /// Unbinds `file` for good. Persistent breakpoints wait for it to come
    /// back; the others are dropped.
    pub fn logical_file_removed(&mut self, backend: &mut dyn BreakpointBackend, file: &LogicalFileId) {
        for key in self.unbind_file(backend, file) {
            let persistent = self.breakpoints.get(&key).is_some_and(|b| b.persistent);
            if !persistent {
                if let Some(breakpoint) = self.detach(key) {
                    self.emit(BreakpointEvent::Removed(breakpoint));
                }
            }
        }
    }

    /// Unbinds `file` while it is shown under another id, e.g. while
    /// pretty-printed. Every breakpoint is kept and rebinds when `file` is
    /// available again. Returns the affected breakpoints.
    pub fn unbind_file(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        file: &LogicalFileId,
    ) -> Vec<BreakpointKey> {
        self.available.remove(file);
        let keys = self.keys_for_file(file);
        for &key in &keys {
            self.dematerialize(backend, key);
            if let Some(breakpoint) = self.breakpoints.get_mut(&key) {
                breakpoint.bound = false;
            }
        }
        keys
    }

    /// Session cut: removes every breakpoint from the backend but keeps the
    /// index intact.
    pub fn reset(&mut self, backend: &mut dyn BreakpointBackend) {
        let keys: Vec<BreakpointKey> = self.breakpoints.keys().copied().collect();
        for key in keys {
            self.dematerialize(backend, key);
        }
        self.pending.clear();
    }

    /// Backend runtime torn down: every backend id is already invalid.
    /// Persistent breakpoints survive unbound; the others are dropped.
    pub fn debugger_reset(&mut self) {
        self.pending.clear();
        self.by_backend_id.clear();
        self.available.clear();

        let mut dropped = Vec::new();
        for (key, breakpoint) in &mut self.breakpoints {
            breakpoint.materialization = Materialization::Unmaterialized;
            breakpoint.bound = false;
            if !breakpoint.persistent {
                dropped.push(*key);
            }
        }
        for key in dropped {
            if let Some(breakpoint) = self.detach(key) {
                self.emit(BreakpointEvent::Removed(breakpoint));
            }
        }
    }

    /// Materializes every bound, enabled breakpoint that is not in the backend.
    pub fn materialize_all(&mut self, backend: &mut dyn BreakpointBackend) {
        let mut keys: Vec<BreakpointKey> = self.breakpoints.keys().copied().collect();
        keys.sort();
        for key in keys {
            self.materialize(backend, key);
        }
    }

    /// Applies the reply to a set-breakpoint request.
    pub fn breakpoint_set(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        request: RequestId,
        result: Option<SetBreakpointResult>,
    ) {
        let current = self.pending.remove(&request).and_then(|(key, epoch)| {
            let breakpoint = self.breakpoints.get(&key)?;
            let still_pending =
                breakpoint.materialization == Materialization::Pending { request };
            (still_pending && epoch == backend.epoch()).then_some(key)
        });
        let Some(key) = current else {
            tracing::debug!(target: "spyglass.breakpoints", request = %request, "discarding stale breakpoint response");
            if let Some(result) = result {
                backend.remove_breakpoint(&result.breakpoint_id);
            }
            return;
        };

        let Some(result) = result else {
            self.refuse(key);
            return;
        };

        self.by_backend_id.insert(result.breakpoint_id.clone(), key);
        if let Some(breakpoint) = self.breakpoints.get_mut(&key) {
            breakpoint.materialization = Materialization::Materialized {
                backend_id: result.breakpoint_id,
                locations: Vec::new(),
            };
        }
        if result.locations.is_empty() {
            self.emit_updated(key);
        }
        for location in result.locations {
            if !self.add_resolved_location(backend, key, location) {
                break;
            }
        }
    }

    /// A backend breakpoint gained a location after the fact.
    pub fn breakpoint_resolved(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        backend_id: &BackendId,
        location: RawLocation,
    ) {
        let Some(&key) = self.by_backend_id.get(backend_id) else {
            tracing::debug!(target: "spyglass.breakpoints", backend_id = %backend_id, "resolution for unknown breakpoint");
            return;
        };
        self.add_resolved_location(backend, key, location);
    }

    pub fn find_breakpoint(&self, file: &LogicalFileId, line: u32) -> Option<&Breakpoint> {
        self.slot(file, line)
            .and_then(|key| self.breakpoints.get(&key))
    }

    /// Breakpoints of `file`, ordered by line.
    pub fn breakpoints_for_file(&self, file: &LogicalFileId) -> Vec<&Breakpoint> {
        self.by_location
            .get(file)
            .into_iter()
            .flat_map(|lines| lines.values())
            .filter_map(|key| self.breakpoints.get(key))
            .collect()
    }

    pub fn all_breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// The persistent subset in stored form, ordered by file and line.
    pub fn serialized(&self) -> Vec<SerializedBreakpoint> {
        let mut records = self.refused.clone();
        for breakpoint in self.breakpoints.values().filter(|b| b.persistent) {
            records.insert(
                (breakpoint.file.clone(), breakpoint.line),
                breakpoint.serialized(),
            );
        }
        records.into_values().collect()
    }

    fn slot(&self, file: &LogicalFileId, line: u32) -> Option<BreakpointKey> {
        self.by_location.get(file)?.get(&line).copied()
    }

    fn keys_for_file(&self, file: &LogicalFileId) -> Vec<BreakpointKey> {
        self.by_location
            .get(file)
            .map(|lines| lines.values().copied().collect())
            .unwrap_or_default()
    }

    fn insert(
        &mut self,
        file: LogicalFileId,
        line: u32,
        condition: String,
        enabled: bool,
        persistent: bool,
        bound: bool,
    ) -> BreakpointKey {
        let key = BreakpointKey(self.next_key);
        self.next_key += 1;
        let breakpoint = Breakpoint {
            key,
            file: file.clone(),
            line,
            condition,
            enabled,
            persistent,
            bound,
            materialization: Materialization::Unmaterialized,
        };
        self.by_location.entry(file).or_default().insert(line, key);
        self.emit(BreakpointEvent::Added(breakpoint.clone()));
        self.breakpoints.insert(key, breakpoint);
        key
    }

    /// Drops `key` from the index. The caller handles the backend side.
    fn detach(&mut self, key: BreakpointKey) -> Option<Breakpoint> {
        let breakpoint = self.breakpoints.remove(&key)?;
        if let Some(lines) = self.by_location.get_mut(&breakpoint.file) {
            if lines.get(&breakpoint.line) == Some(&key) {
                lines.remove(&breakpoint.line);
            }
            if lines.is_empty() {
                self.by_location.remove(&breakpoint.file);
            }
        }
        if let Some(backend_id) = breakpoint.backend_id() {
            self.by_backend_id.remove(backend_id);
        }
        Some(breakpoint)
    }

    fn materialize(&mut self, backend: &mut dyn BreakpointBackend, key: BreakpointKey) {
        let Some(breakpoint) = self.breakpoints.get(&key) else {
            return;
        };
        if !breakpoint.enabled
            || !breakpoint.bound
            || breakpoint.materialization != Materialization::Unmaterialized
        {
            return;
        }
        let location = UiLocation::new(breakpoint.file.clone(), breakpoint.line, 0);
        let Some(raw) = backend.ui_to_raw(&location) else {
            tracing::debug!(
                target: "spyglass.breakpoints",
                file = %location.file,
                line = location.line,
                "no raw location for breakpoint"
            );
            return;
        };
        let Some(request) = backend.set_breakpoint(&raw, &breakpoint.condition) else {
            return;
        };
        self.pending.insert(request, (key, backend.epoch()));
        if let Some(breakpoint) = self.breakpoints.get_mut(&key) {
            breakpoint.materialization = Materialization::Pending { request };
        }
    }

    fn dematerialize(&mut self, backend: &mut dyn BreakpointBackend, key: BreakpointKey) {
        let Some(breakpoint) = self.breakpoints.get_mut(&key) else {
            return;
        };
        match std::mem::replace(
            &mut breakpoint.materialization,
            Materialization::Unmaterialized,
        ) {
            Materialization::Unmaterialized => {}
            Materialization::Pending { request } => {
                self.pending.remove(&request);
            }
            Materialization::Materialized { backend_id, .. } => {
                self.by_backend_id.remove(&backend_id);
                backend.remove_breakpoint(&backend_id);
            }
        }
    }

    /// Applies `change`; when it reports a change the breakpoint is
    /// re-materialized with its new settings.
    fn update(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        key: BreakpointKey,
        change: impl FnOnce(&mut Breakpoint) -> bool,
    ) -> bool {
        let changed = self.breakpoints.get_mut(&key).is_some_and(change);
        if changed {
            self.dematerialize(backend, key);
            self.materialize(backend, key);
            self.emit_updated(key);
        }
        changed
    }

    fn refuse(&mut self, key: BreakpointKey) {
        let Some(breakpoint) = self.detach(key) else {
            return;
        };
        tracing::debug!(
            target: "spyglass.breakpoints",
            file = %breakpoint.file,
            line = breakpoint.line,
            "backend refused breakpoint"
        );
        if breakpoint.persistent {
            self.refused.insert(
                (breakpoint.file.clone(), breakpoint.line),
                breakpoint.serialized(),
            );
        }
        self.emit(BreakpointEvent::Removed(breakpoint));
    }

    /// Records a backend location and moves the breakpoint if it lands on a
    /// different line of its file. Returns `false` if the breakpoint is gone.
    fn add_resolved_location(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        key: BreakpointKey,
        location: RawLocation,
    ) -> bool {
        let ui = backend.raw_to_ui(&location);
        let Some(breakpoint) = self.breakpoints.get_mut(&key) else {
            return false;
        };
        if let Materialization::Materialized { locations, .. } = &mut breakpoint.materialization {
            locations.push(location);
        }

        let target = match ui {
            Some(ui) if ui.file == breakpoint.file => ui.line,
            _ => {
                self.emit_updated(key);
                return true;
            }
        };
        if target == breakpoint.line {
            self.emit_updated(key);
            return true;
        }
        self.move_breakpoint(backend, key, target)
    }

    fn move_breakpoint(
        &mut self,
        backend: &mut dyn BreakpointBackend,
        key: BreakpointKey,
        to: u32,
    ) -> bool {
        let Some(breakpoint) = self.breakpoints.get(&key) else {
            return false;
        };
        let file = breakpoint.file.clone();
        let from = breakpoint.line;

        if self.slot(&file, to).is_some() {
            tracing::debug!(
                target: "spyglass.breakpoints",
                file = %file,
                from,
                to,
                "resolved line already has a breakpoint; removing the moved one"
            );
            self.dematerialize(backend, key);
            if let Some(breakpoint) = self.detach(key) {
                if breakpoint.persistent {
                    self.persist();
                }
                self.emit(BreakpointEvent::Removed(breakpoint));
            }
            return false;
        }

        if let Some(lines) = self.by_location.get_mut(&file) {
            lines.remove(&from);
            lines.insert(to, key);
        }
        let Some(breakpoint) = self.breakpoints.get_mut(&key) else {
            return false;
        };
        breakpoint.line = to;
        let snapshot = breakpoint.clone();
        if snapshot.persistent {
            self.persist();
        }
        self.emit(BreakpointEvent::Moved {
            breakpoint: snapshot,
            from,
            to,
        });
        true
    }

    fn persist_if_persistent(&mut self, key: BreakpointKey) {
        if self.breakpoints.get(&key).is_some_and(|b| b.persistent) {
            self.persist();
        }
    }

    fn persist(&mut self) {
        if self.muted {
            return;
        }
        let records = self.serialized();
        if let Err(err) = self.storage.save(&records) {
            tracing::warn!(target: "spyglass.breakpoints", error = %err, "failed to save breakpoints");
        }
    }

    fn emit_updated(&self, key: BreakpointKey) {
        if let Some(breakpoint) = self.breakpoints.get(&key) {
            self.emit(BreakpointEvent::Updated(breakpoint.clone()));
        }
    }

    fn emit(&self, event: BreakpointEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
