use crate::SourceMapError;

const BASE_SHIFT: u32 = 5;
const BASE_MASK: u32 = (1 << BASE_SHIFT) - 1;
const CONTINUATION_BIT: u32 = 1 << BASE_SHIFT;

fn base64_digit(byte: u8) -> Option<u32> {
    let digit = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(u32::from(digit))
}

/// Cursor over the `mappings` string of a source map.
pub(crate) struct SegmentReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SegmentReader<'a> {
    pub(crate) fn new(mappings: &'a str) -> Self {
        Self {
            bytes: mappings.as_bytes(),
            pos: 0,
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.pos
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub(crate) fn bump(&mut self) {
        self.pos += 1;
    }

    pub(crate) fn has_next(&self) -> bool {
        self.pos < self.bytes.len()
    }

    /// True at end of input or at a `,`/`;` separator.
    pub(crate) fn at_segment_end(&self) -> bool {
        matches!(self.peek(), None | Some(b',' | b';'))
    }

    /// Decodes one signed base64 VLQ value.
    pub(crate) fn decode(&mut self) -> Result<i64, SourceMapError> {
        let start = self.pos;
        let mut result: i64 = 0;
        let mut shift = 0u32;
        loop {
            let digit = self
                .peek()
                .and_then(base64_digit)
                .ok_or(SourceMapError::InvalidVlq { offset: self.pos })?;
            self.pos += 1;
            if shift > 60 {
                return Err(SourceMapError::InvalidVlq { offset: start });
            }
            result += i64::from(digit & BASE_MASK) << shift;
            shift += BASE_SHIFT;
            if digit & CONTINUATION_BIT == 0 {
                break;
            }
        }

        let negative = result & 1 == 1;
        result >>= 1;
        Ok(if negative { -result } else { result })
    }
}
