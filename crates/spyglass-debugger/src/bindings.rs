//! Which logical file each backend script is shown as, and how locations
//! translate between the two.

use std::collections::HashMap;
use std::sync::Arc;

use spyglass_core::{LogicalFile, LogicalFileId, Position, RawLocation, ScriptId, UiLocation};
use spyglass_protocol::ScriptParsed;
use spyglass_sourcemap::{complete_url, CacheLookup, FetchError, SourceMap, SourceMapCache};
use url::Url;

use crate::mapping::{FormattedContent, ScriptSourceMapping, SourceMapMapping};
use crate::raw_source::{RawSource, RawSourceId, ScriptFragment, SourceMessage};

/// A source map load the session wants performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapFetch {
    pub map_url: Url,
    /// URL of the compiled script; the base for inline maps.
    pub compiled_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileOrigin {
    RawSource(RawSourceId),
    Original { map_url: String },
}

/// Old and new logical file of a raw source whose display changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSwap {
    pub removed: LogicalFile,
    pub added: LogicalFile,
}

#[derive(Debug, Default)]
pub struct SourceBindings {
    raw_sources: HashMap<RawSourceId, RawSource>,
    script_sources: HashMap<ScriptId, RawSourceId>,
    files: HashMap<LogicalFileId, (LogicalFile, FileOrigin)>,
    urls: HashMap<String, LogicalFileId>,
    compiled: HashMap<ScriptId, SourceMapMapping>,
    map_scripts: HashMap<String, ScriptId>,
    original_owners: HashMap<String, String>,
    cache: SourceMapCache<ScriptId>,
    fetches: Vec<SourceMapFetch>,
    source_maps_enabled: bool,
    inspected_url: Option<Url>,
}

impl SourceBindings {
    pub fn new(source_maps_enabled: bool, inspected_url: Option<Url>) -> Self {
        Self {
            source_maps_enabled,
            inspected_url,
            ..Self::default()
        }
    }

    /// Registers a parsed script. Returns the logical files that became
    /// available because of it.
    pub fn add_script(&mut self, script: &ScriptParsed) -> Vec<LogicalFile> {
        let url = (!script.url.is_empty()).then(|| script.url.clone());
        let raw_id = RawSourceId::new(url.clone().unwrap_or_else(|| script.script_id.to_string()));
        let fragment = ScriptFragment::new(
            script.script_id.clone(),
            Position::new(script.start_line, script.start_column),
            Position::new(script.end_line, script.end_column),
        );

        let mut available = Vec::new();
        match self.raw_sources.get_mut(&raw_id) {
            Some(existing) => existing.add_fragment(fragment),
            None => {
                let source = RawSource::new(raw_id.clone(), url, script.is_content_script, fragment);
                let file = source.logical_file();
                self.register_file(file.clone(), FileOrigin::RawSource(raw_id.clone()));
                self.raw_sources.insert(raw_id.clone(), source);
                available.push(file);
            }
        }
        self.script_sources
            .insert(script.script_id.clone(), raw_id);

        if let Some(source_map_url) = script.source_map_url.as_deref() {
            if self.source_maps_enabled && !source_map_url.is_empty() {
                available.extend(self.request_source_map(script, source_map_url));
            }
        }
        available
    }

    fn request_source_map(&mut self, script: &ScriptParsed, source_map_url: &str) -> Vec<LogicalFile> {
        let compiled_url = match &self.inspected_url {
            Some(base) => complete_url(base.as_str(), &script.url),
            None => script.url.clone(),
        };
        let Ok(map_url) = Url::parse(&complete_url(&compiled_url, source_map_url)) else {
            tracing::debug!(
                target: "spyglass.debugger",
                script_id = %script.script_id,
                source_map_url,
                "ignoring source map with unresolvable url"
            );
            return Vec::new();
        };

        match self.cache.request(map_url.as_str(), script.script_id.clone()) {
            CacheLookup::Loaded(map) => self.bind_source_map(&script.script_id, map_url.as_str(), map),
            CacheLookup::Joined => Vec::new(),
            CacheLookup::Fetch => {
                self.fetches.push(SourceMapFetch {
                    map_url,
                    compiled_url,
                });
                Vec::new()
            }
        }
    }

    /// Source map loads requested since the last call.
    pub fn take_fetches(&mut self) -> Vec<SourceMapFetch> {
        std::mem::take(&mut self.fetches)
    }

    /// Settles a source map load. Every script waiting on `map_url` is bound
    /// to the parsed map; a failed load leaves them on generated coordinates.
    pub fn source_map_loaded(
        &mut self,
        fetch: &SourceMapFetch,
        text: Result<String, FetchError>,
    ) -> Vec<LogicalFile> {
        let map_url = fetch.map_url.as_str();
        let map = match text {
            Ok(text) => match SourceMap::parse(map_url, &fetch.compiled_url, &text) {
                Ok(map) => Some(map),
                Err(err) => {
                    tracing::warn!(target: "spyglass.debugger", map_url, error = %err, "failed to parse source map");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(target: "spyglass.debugger", map_url, error = %err, "failed to load source map");
                None
            }
        };

        let (map, waiters) = self.cache.complete(map_url, map);
        let Some(map) = map else {
            return Vec::new();
        };
        let mut available = Vec::new();
        for script_id in waiters {
            if self.script_sources.contains_key(&script_id) {
                available.extend(self.bind_source_map(&script_id, map_url, map.clone()));
            }
        }
        available
    }

    fn bind_source_map(
        &mut self,
        script_id: &ScriptId,
        map_url: &str,
        map: Arc<SourceMap>,
    ) -> Vec<LogicalFile> {
        let bound_script = self
            .map_scripts
            .entry(map_url.to_owned())
            .or_insert_with(|| script_id.clone())
            .clone();
        let mapping = SourceMapMapping::new(bound_script, map);
        let originals: Vec<LogicalFile> = mapping.original_files().collect();
        self.compiled.insert(script_id.clone(), mapping);

        let mut available = Vec::new();
        for file in originals {
            let url = file.id.to_string();
            match self.original_owners.get(&url) {
                Some(owner) if owner == map_url => continue,
                Some(owner) => {
                    tracing::debug!(
                        target: "spyglass.debugger",
                        url = %url,
                        owner = %owner,
                        map_url,
                        "original source already claimed by another source map"
                    );
                    continue;
                }
                None => {}
            }
            self.original_owners.insert(url, map_url.to_owned());
            self.register_file(
                file.clone(),
                FileOrigin::Original {
                    map_url: map_url.to_owned(),
                },
            );
            available.push(file);
        }
        available
    }

    fn register_file(&mut self, file: LogicalFile, origin: FileOrigin) {
        if let Some(url) = &file.url {
            self.urls.insert(url.clone(), file.id.clone());
        }
        self.files.insert(file.id.clone(), (file, origin));
    }

    fn unregister_file(&mut self, id: &LogicalFileId) -> Option<LogicalFile> {
        let (file, _) = self.files.remove(id)?;
        if let Some(url) = &file.url {
            if self.urls.get(url) == Some(id) {
                self.urls.remove(url);
            }
        }
        Some(file)
    }

    pub fn set_script_source(&mut self, script_id: &ScriptId, source: String) -> bool {
        let Some(raw_id) = self.script_sources.get(script_id) else {
            return false;
        };
        self.raw_sources
            .get_mut(raw_id)
            .is_some_and(|raw| raw.set_fragment_source(script_id, source))
    }

    /// Switches a raw source between formatted and plain display. Returns the
    /// logical files swapped out and in, or `None` if nothing changed.
    pub fn set_formatted(
        &mut self,
        raw_id: &RawSourceId,
        formatted: Option<FormattedContent>,
    ) -> Option<FileSwap> {
        let raw = self.raw_sources.get_mut(raw_id)?;
        if formatted.is_none() && !raw.is_formatted() {
            return None;
        }
        let before = raw.logical_file();
        if !raw.set_formatted(formatted) {
            return None;
        }
        let after = raw.logical_file();

        self.unregister_file(&before.id);
        self.register_file(after.clone(), FileOrigin::RawSource(raw_id.clone()));
        Some(FileSwap {
            removed: before,
            added: after,
        })
    }

    pub fn add_message(&mut self, script_id: &ScriptId, message: SourceMessage) -> bool {
        let Some(raw_id) = self.script_sources.get(script_id) else {
            return false;
        };
        match self.raw_sources.get_mut(raw_id) {
            Some(raw) => {
                raw.add_message(message);
                true
            }
            None => false,
        }
    }

    pub fn add_message_for_url(&mut self, url: &str, message: SourceMessage) -> bool {
        match self.raw_sources.get_mut(&RawSourceId::new(url)) {
            Some(raw) => {
                raw.add_message(message);
                true
            }
            None => false,
        }
    }

    pub fn clear_messages(&mut self) {
        for raw in self.raw_sources.values_mut() {
            raw.clear_messages();
        }
    }

    pub fn file(&self, id: &LogicalFileId) -> Option<&LogicalFile> {
        self.files.get(id).map(|(file, _)| file)
    }

    pub fn file_for_url(&self, url: &str) -> Option<&LogicalFile> {
        self.urls.get(url).and_then(|id| self.file(id))
    }

    pub fn files(&self) -> impl Iterator<Item = &LogicalFile> {
        self.files.values().map(|(file, _)| file)
    }

    pub fn raw_source(&self, id: &RawSourceId) -> Option<&RawSource> {
        self.raw_sources.get(id)
    }

    pub fn raw_sources(&self) -> impl Iterator<Item = &RawSource> {
        self.raw_sources.values()
    }

    pub fn raw_source_for_script(&self, script_id: &ScriptId) -> Option<&RawSource> {
        self.script_sources
            .get(script_id)
            .and_then(|id| self.raw_sources.get(id))
    }

    pub fn raw_source_for_file(&self, file: &LogicalFileId) -> Option<&RawSource> {
        match self.files.get(file) {
            Some((_, FileOrigin::RawSource(id))) => self.raw_sources.get(id),
            _ => None,
        }
    }

    /// Text of a logical file: the displayed raw source content, or the
    /// embedded `sourcesContent` of an original source.
    pub fn content(&self, file: &LogicalFileId) -> Option<String> {
        match self.files.get(file)? {
            (_, FileOrigin::RawSource(id)) => self.raw_sources.get(id)?.display_content(),
            (_, FileOrigin::Original { map_url }) => {
                let script = self.map_scripts.get(map_url)?;
                let mapping = self.compiled.get(script)?;
                mapping.map().source_content(file.as_str()).map(str::to_owned)
            }
        }
    }

    pub fn has_source_map(&self, script_id: &ScriptId) -> bool {
        self.compiled.contains_key(script_id)
    }

    /// Forgets every script, source and source map.
    pub fn reset(&mut self) {
        let source_maps_enabled = self.source_maps_enabled;
        let inspected_url = self.inspected_url.take();
        *self = Self::new(source_maps_enabled, inspected_url);
    }
}

impl ScriptSourceMapping for SourceBindings {
    fn raw_to_ui(&self, location: &RawLocation) -> Option<UiLocation> {
        if let Some(mapping) = self.compiled.get(&location.script_id) {
            return mapping.raw_to_ui(location);
        }
        self.raw_source_for_script(&location.script_id)?
            .raw_to_ui(location)
    }

    fn ui_to_raw(&self, location: &UiLocation) -> Option<RawLocation> {
        match self.files.get(&location.file)? {
            (_, FileOrigin::RawSource(id)) => self.raw_sources.get(id)?.ui_to_raw(location),
            (_, FileOrigin::Original { map_url }) => {
                let script = self.map_scripts.get(map_url)?;
                self.compiled.get(script)?.ui_to_raw(location)
            }
        }
    }
}
