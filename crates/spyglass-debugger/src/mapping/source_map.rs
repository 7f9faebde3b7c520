use std::sync::Arc;

use spyglass_core::{LogicalFile, LogicalFileId, RawLocation, ScriptId, UiLocation};
use spyglass_sourcemap::SourceMap;

use super::ScriptSourceMapping;

/// Maps a compiled script onto the original sources listed in its source map.
///
/// Original sources are addressed by their completed URL, which doubles as
/// their logical file id.
#[derive(Debug, Clone)]
pub struct SourceMapMapping {
    script_id: ScriptId,
    map: Arc<SourceMap>,
}

impl SourceMapMapping {
    pub fn new(script_id: ScriptId, map: Arc<SourceMap>) -> Self {
        Self { script_id, map }
    }

    pub fn script_id(&self) -> &ScriptId {
        &self.script_id
    }

    pub fn map(&self) -> &Arc<SourceMap> {
        &self.map
    }

    pub fn original_files(&self) -> impl Iterator<Item = LogicalFile> + '_ {
        self.map
            .sources()
            .map(|url| LogicalFile::new(url, Some(url.to_owned())))
    }
}

impl ScriptSourceMapping for SourceMapMapping {
    fn raw_to_ui(&self, location: &RawLocation) -> Option<UiLocation> {
        let entry = self.map.find_entry(location.line, location.column)?;
        let original = entry.original.as_ref()?;
        Some(UiLocation::new(
            LogicalFileId::new(&*original.url),
            original.line,
            original.column,
        ))
    }

    fn ui_to_raw(&self, location: &UiLocation) -> Option<RawLocation> {
        let generated = self
            .map
            .find_entry_reversed(location.file.as_str(), location.line, None)?;
        Some(RawLocation::new(
            self.script_id.clone(),
            generated.line,
            generated.column,
        ))
    }
}
