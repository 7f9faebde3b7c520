//! Offset <-> (line, column) conversion over a fixed text.

use crate::Position;

/// Byte offsets of every `\n` in a text, followed by the text length.
///
/// The trailing length entry makes the last line addressable even when the
/// text does not end with a newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEndings {
    ends: Vec<usize>,
}

impl LineEndings {
    pub fn new(text: &str) -> Self {
        let mut ends: Vec<usize> = text
            .bytes()
            .enumerate()
            .filter_map(|(idx, byte)| (byte == b'\n').then_some(idx))
            .collect();
        ends.push(text.len());
        Self { ends }
    }

    /// Number of lines, counting a final line without a trailing newline.
    pub fn line_count(&self) -> usize {
        self.ends.len()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.ends
    }

    /// Offset of `position`, or `None` when its line is past the end of the text.
    pub fn offset(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;
        if line >= self.ends.len() {
            return None;
        }
        let line_start = if line == 0 { 0 } else { self.ends[line - 1] + 1 };
        Some(line_start + position.column as usize)
    }

    /// Location of `offset`. Offsets past the end land on the last line.
    pub fn position(&self, offset: usize) -> Position {
        let line = self.ends.partition_point(|&end| end < offset);
        let line = line.min(self.ends.len() - 1);
        let column = if line == 0 {
            offset
        } else {
            offset - self.ends[line - 1] - 1
        };
        Position::new(to_u32(line), to_u32(column))
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
