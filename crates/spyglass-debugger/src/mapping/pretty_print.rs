use serde::{Deserialize, Serialize};
use spyglass_core::text::LineEndings;
use spyglass_core::Position;

/// Pairs of offsets recorded by a formatter: `original[i]` in the source text
/// corresponds to `formatted[i]` in the pretty-printed text. Both arrays are
/// monotonically increasing and of equal length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatterMapping {
    pub original: Vec<usize>,
    pub formatted: Vec<usize>,
}

/// Output of a [`ScriptFormatter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedContent {
    pub content: String,
    pub mapping: FormatterMapping,
}

/// Pretty-prints script text. Formatting is best effort; `None` leaves the
/// source as is.
pub trait ScriptFormatter {
    fn format(&self, content: &str) -> Option<FormattedContent>;
}

/// Approximate translation between original and pretty-printed coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMapping {
    original_endings: LineEndings,
    formatted_endings: LineEndings,
    mapping: FormatterMapping,
}

impl FormattedMapping {
    pub fn new(original: &str, formatted: &FormattedContent) -> Self {
        Self {
            original_endings: LineEndings::new(original),
            formatted_endings: LineEndings::new(&formatted.content),
            mapping: formatted.mapping.clone(),
        }
    }

    pub fn original_to_formatted(&self, position: Position) -> Option<Position> {
        let offset = self.original_endings.offset(position)?;
        let converted = convert_offset(&self.mapping.original, &self.mapping.formatted, offset)?;
        Some(self.formatted_endings.position(converted))
    }

    pub fn formatted_to_original(&self, position: Position) -> Option<Position> {
        let offset = self.formatted_endings.offset(position)?;
        let converted = convert_offset(&self.mapping.formatted, &self.mapping.original, offset)?;
        Some(self.original_endings.position(converted))
    }
}

/// Maps `offset` from the `from` space to the `to` space using the closest
/// recorded pair at or before it, clamped so it never passes the next pair.
fn convert_offset(from: &[usize], to: &[usize], offset: usize) -> Option<usize> {
    let pairs = from.len().min(to.len());
    if pairs == 0 {
        return None;
    }
    let idx = from[..pairs]
        .partition_point(|&p| p <= offset)
        .saturating_sub(1);
    let converted = (to[idx] + offset).saturating_sub(from[idx]);
    match to.get(idx + 1) {
        Some(&next) if idx + 1 < pairs && converted > next => Some(next),
        _ => Some(converted),
    }
}
