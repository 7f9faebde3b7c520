//! Aggregation of backend script fragments into logical sources.
//!
//! A document with several inline `<script>` blocks reaches the debugger as
//! several scripts sharing one URL. A [`RawSource`] groups them so the UI sees
//! one file with one coordinate space.

use std::fmt;

use spyglass_core::{LogicalFile, Position, RawLocation, ScriptId, UiLocation};
use spyglass_protocol::MessageLevel;

use crate::mapping::{FormattedContent, FormattedMapping, MappingStrategy, ScriptSourceMapping};

const SCRIPT_OPEN_TAG: &str = "<script>";
const SCRIPT_CLOSE_TAG: &str = "</script>";
const FORMATTED_PREFIX: &str = "deobfuscated:";

/// Key of a raw source: the script URL, or the script id for anonymous code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawSourceId(String);

impl RawSourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One backend script inside a raw source. Positions are document-absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFragment {
    pub script_id: ScriptId,
    pub start: Position,
    pub end: Position,
    source: Option<String>,
}

impl ScriptFragment {
    pub fn new(script_id: ScriptId, start: Position, end: Position) -> Self {
        Self {
            script_id,
            start,
            end,
            source: None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// A diagnostic attached to a raw source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub line: u32,
    pub level: MessageLevel,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RawSource {
    id: RawSourceId,
    url: Option<String>,
    is_content_script: bool,
    fragments: Vec<ScriptFragment>,
    messages: Vec<SourceMessage>,
    strategy: MappingStrategy,
    formatted_content: Option<String>,
}

impl RawSource {
    pub fn new(
        id: RawSourceId,
        url: Option<String>,
        is_content_script: bool,
        fragment: ScriptFragment,
    ) -> Self {
        Self {
            id,
            url: url.filter(|url| !url.is_empty()),
            is_content_script,
            fragments: vec![fragment],
            messages: Vec::new(),
            strategy: MappingStrategy::Identity,
            formatted_content: None,
        }
    }

    pub fn id(&self) -> &RawSourceId {
        &self.id
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_content_script(&self) -> bool {
        self.is_content_script
    }

    pub fn fragments(&self) -> &[ScriptFragment] {
        &self.fragments
    }

    pub fn contains_script(&self, script_id: &ScriptId) -> bool {
        self.fragments.iter().any(|f| &f.script_id == script_id)
    }

    pub fn add_fragment(&mut self, fragment: ScriptFragment) {
        self.fragments.push(fragment);
    }

    pub fn messages(&self) -> &[SourceMessage] {
        &self.messages
    }

    pub fn add_message(&mut self, message: SourceMessage) {
        self.messages.push(message);
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    pub fn is_formatted(&self) -> bool {
        self.strategy.is_formatted()
    }

    pub fn strategy(&self) -> &MappingStrategy {
        &self.strategy
    }

    /// The logical file this source is displayed as.
    pub fn logical_file(&self) -> LogicalFile {
        let id = if self.is_formatted() {
            format!("{FORMATTED_PREFIX}{}", self.id)
        } else {
            self.id.as_str().to_owned()
        };
        LogicalFile::new(id, self.url.clone())
    }

    /// Switches to pretty-printed display, or back to identity with `None`.
    ///
    /// Returns `false` when formatting was requested before the content is
    /// known.
    pub fn set_formatted(&mut self, formatted: Option<FormattedContent>) -> bool {
        match formatted {
            Some(formatted) => {
                let Some(content) = self.content() else {
                    return false;
                };
                self.strategy =
                    MappingStrategy::PrettyPrint(FormattedMapping::new(&content, &formatted));
                self.formatted_content = Some(formatted.content);
            }
            None => {
                self.strategy = MappingStrategy::Identity;
                self.formatted_content = None;
            }
        }
        true
    }

    /// Records the source text of one fragment. Returns `false` for scripts
    /// that are not part of this source.
    pub fn set_fragment_source(&mut self, script_id: &ScriptId, source: String) -> bool {
        match self.fragments.iter_mut().find(|f| &f.script_id == script_id) {
            Some(fragment) => {
                fragment.source = Some(source);
                true
            }
            None => false,
        }
    }

    /// Fragments whose source text has not been fetched yet.
    pub fn missing_sources(&self) -> impl Iterator<Item = &ScriptId> {
        self.fragments
            .iter()
            .filter(|f| f.source.is_none())
            .map(|f| &f.script_id)
    }

    /// The nearest fragment starting at or before `position`, or the first
    /// fragment when none does.
    pub fn fragment_for(&self, position: Position) -> Option<&ScriptFragment> {
        self.fragments
            .iter()
            .filter(|f| f.start <= position)
            .max_by_key(|f| f.start)
            .or_else(|| self.fragments.first())
    }

    /// Document text in backend coordinates, once every fragment's source is
    /// known.
    pub fn content(&self) -> Option<String> {
        if let [single] = self.fragments.as_slice() {
            if single.start == Position::default() {
                return single.source.clone();
            }
        }

        let mut ordered: Vec<&ScriptFragment> = self.fragments.iter().collect();
        ordered.sort_by_key(|f| f.start);
        let sources = ordered
            .iter()
            .map(|f| f.source.as_deref())
            .collect::<Option<Vec<_>>>()?;

        let mut builder = ContentBuilder::default();
        for (fragment, source) in ordered.iter().zip(sources) {
            while builder.line < fragment.start.line {
                builder.push("\n");
            }
            let tag_start = fragment
                .start
                .column
                .saturating_sub(SCRIPT_OPEN_TAG.len() as u32);
            while builder.column < tag_start {
                builder.push(" ");
            }
            builder.push(SCRIPT_OPEN_TAG);
            builder.push(source);
            builder.push(SCRIPT_CLOSE_TAG);
        }
        Some(builder.text)
    }

    /// What the UI shows: the formatted text while formatted, the document
    /// text otherwise.
    pub fn display_content(&self) -> Option<String> {
        match &self.formatted_content {
            Some(content) => Some(content.clone()),
            None => self.content(),
        }
    }
}

impl ScriptSourceMapping for RawSource {
    fn raw_to_ui(&self, location: &RawLocation) -> Option<UiLocation> {
        if !self.contains_script(&location.script_id) {
            return None;
        }
        let position = self.strategy.raw_to_ui(location.position())?;
        Some(UiLocation::new(
            self.logical_file().id,
            position.line,
            position.column,
        ))
    }

    fn ui_to_raw(&self, location: &UiLocation) -> Option<RawLocation> {
        if location.file != self.logical_file().id {
            return None;
        }
        let position = self.strategy.ui_to_raw(location.position())?;
        let fragment = self.fragment_for(position)?;
        Some(RawLocation::new(
            fragment.script_id.clone(),
            position.line,
            position.column,
        ))
    }
}

#[derive(Default)]
struct ContentBuilder {
    text: String,
    line: u32,
    column: u32,
}

impl ContentBuilder {
    fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        match chunk.rfind('\n') {
            Some(last) => {
                self.line += chunk.matches('\n').count() as u32;
                self.column = (chunk.len() - last - 1) as u32;
            }
            None => self.column += chunk.len() as u32,
        }
    }
}
