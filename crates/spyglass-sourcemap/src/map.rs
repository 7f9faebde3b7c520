use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use spyglass_core::Position;
use url::Url;

use crate::vlq::SegmentReader;
use crate::SourceMapError;

const XSSI_PREFIX: &str = ")]}";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: Option<u32>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    sources_content: Vec<Option<String>>,
    #[serde(default)]
    source_root: Option<String>,
    #[serde(default)]
    mappings: String,
    #[serde(default)]
    sections: Option<Vec<RawSection>>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    offset: RawOffset,
    map: RawSourceMap,
}

#[derive(Debug, Deserialize)]
struct RawOffset {
    line: u32,
    column: u32,
}

/// Original-source side of a mapping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalLocation {
    pub url: Arc<str>,
    pub line: u32,
    pub column: u32,
}

/// One decoded segment. Entries without an original location are
/// "no mapping" markers: generated code that has no source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original: Option<OriginalLocation>,
}

impl MappingEntry {
    fn generated(&self) -> Position {
        Position::new(self.generated_line, self.generated_column)
    }
}

/// A parsed source map v3.
#[derive(Debug, Clone)]
pub struct SourceMap {
    url: String,
    mappings: Vec<MappingEntry>,
    sources: Vec<Arc<str>>,
    source_content: HashMap<Arc<str>, String>,
    /// First generated position per original line, keyed sparsely by line.
    reverse: HashMap<Arc<str>, BTreeMap<u32, Position>>,
}

impl SourceMap {
    /// Parses `text` fetched from `map_url`.
    ///
    /// Source URLs are completed against the map URL, except for inline
    /// `data:` maps which resolve against `compiled_url`.
    pub fn parse(map_url: &str, compiled_url: &str, text: &str) -> Result<Self, SourceMapError> {
        let text = strip_xssi_prefix(text);
        let payload: RawSourceMap = serde_json::from_str(text)?;
        let base_url = if map_url.starts_with("data:") {
            compiled_url
        } else {
            map_url
        };
        Self::from_payload(base_url, payload)
    }

    fn from_payload(base_url: &str, payload: RawSourceMap) -> Result<Self, SourceMapError> {
        if let Some(version) = payload.version {
            if version != 3 {
                return Err(SourceMapError::UnsupportedVersion(version));
            }
        }

        let mut map = Self {
            url: base_url.to_owned(),
            mappings: Vec::new(),
            sources: Vec::new(),
            source_content: HashMap::new(),
            reverse: HashMap::new(),
        };

        match payload.sections {
            Some(sections) => {
                for section in sections {
                    map.parse_map(section.map, section.offset.line, section.offset.column)?;
                }
            }
            None => map.parse_map(payload, 0, 0)?,
        }

        map.mappings
            .sort_by_key(|entry| (entry.generated_line, entry.generated_column));
        map.build_reverse_index();
        Ok(map)
    }

    fn parse_map(
        &mut self,
        payload: RawSourceMap,
        line_offset: u32,
        column_offset: u32,
    ) -> Result<(), SourceMapError> {
        let mut source_root = payload.source_root.unwrap_or_default();
        if !source_root.is_empty() && !source_root.ends_with('/') {
            source_root.push('/');
        }

        let mut sources: Vec<Arc<str>> = Vec::with_capacity(payload.sources.len());
        for (idx, source) in payload.sources.iter().enumerate() {
            let href = format!("{source_root}{source}");
            let url: Arc<str> = Arc::from(complete_url(&self.url, &href));
            if !self.sources.contains(&url) {
                self.sources.push(url.clone());
            }
            if let Some(Some(content)) = payload.sources_content.get(idx) {
                self.source_content.insert(url.clone(), content.clone());
            }
            sources.push(url);
        }

        let mut reader = SegmentReader::new(&payload.mappings);
        let mut line = i64::from(line_offset);
        let mut column = i64::from(column_offset);
        let mut source_index: i64 = 0;
        let mut source_line: i64 = 0;
        let mut source_column: i64 = 0;

        loop {
            if reader.peek() == Some(b',') {
                reader.bump();
            } else {
                while reader.peek() == Some(b';') {
                    line += 1;
                    column = 0;
                    reader.bump();
                }
                if !reader.has_next() {
                    break;
                }
            }

            let segment_start = reader.offset();
            column += reader.decode()?;
            let generated_line = to_u32(line, segment_start)?;
            let generated_column = to_u32(column, segment_start)?;

            if reader.at_segment_end() {
                self.mappings.push(MappingEntry {
                    generated_line,
                    generated_column,
                    original: None,
                });
                continue;
            }

            source_index += reader.decode()?;
            source_line += reader.decode()?;
            source_column += reader.decode()?;
            if !reader.at_segment_end() {
                // Name index; names are not used for location mapping.
                reader.decode()?;
            }

            let url = usize::try_from(source_index)
                .ok()
                .and_then(|idx| sources.get(idx))
                .cloned()
                .ok_or(SourceMapError::InvalidMapping {
                    offset: segment_start,
                })?;
            self.mappings.push(MappingEntry {
                generated_line,
                generated_column,
                original: Some(OriginalLocation {
                    url,
                    line: to_u32(source_line, segment_start)?,
                    column: to_u32(source_column, segment_start)?,
                }),
            });
        }

        Ok(())
    }

    fn build_reverse_index(&mut self) {
        for entry in &self.mappings {
            let Some(original) = &entry.original else {
                continue;
            };
            self.reverse
                .entry(original.url.clone())
                .or_default()
                .entry(original.line)
                .or_insert_with(|| entry.generated());
        }
    }

    /// URL the map was loaded from (or the compiled script URL for inline maps).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Completed URLs of every original source, in first-seen order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|url| &**url)
    }

    pub fn source_content(&self, source_url: &str) -> Option<&str> {
        self.source_content.get(source_url).map(String::as_str)
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.mappings
    }

    /// Last entry at or before the generated position, or `None` when the
    /// position precedes every entry.
    pub fn find_entry(&self, line: u32, column: u32) -> Option<&MappingEntry> {
        let query = Position::new(line, column);
        let idx = self
            .mappings
            .partition_point(|entry| entry.generated() <= query);
        idx.checked_sub(1).map(|idx| &self.mappings[idx])
    }

    /// First generated position recorded for `source_url` at or after
    /// `line`, looking at no more than `span + 1` original lines when a span
    /// is given.
    pub fn find_entry_reversed(
        &self,
        source_url: &str,
        line: u32,
        span: Option<u32>,
    ) -> Option<Position> {
        let lines = self.reverse.get(source_url)?;
        let mut candidates = match span {
            Some(span) => lines.range(line..=line.saturating_add(span)),
            None => lines.range(line..),
        };
        candidates.next().map(|(_, position)| *position)
    }
}

fn strip_xssi_prefix(text: &str) -> &str {
    if text.starts_with(XSSI_PREFIX) {
        match text.find('\n') {
            Some(newline) => &text[newline..],
            None => "",
        }
    } else {
        text
    }
}

fn to_u32(value: i64, offset: usize) -> Result<u32, SourceMapError> {
    u32::try_from(value).map_err(|_| SourceMapError::InvalidMapping { offset })
}

/// Resolves `href` against `base`, returning `href` unchanged when either
/// side is not a usable URL.
pub fn complete_url(base: &str, href: &str) -> String {
    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }
    match Url::parse(base).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_owned(),
    }
}
