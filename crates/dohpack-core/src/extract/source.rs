//! Span-to-text and span-to-line mapping for one parsed file.

use swc_common::{BytePos, Span};

/// Source text of a parsed file with a line index.
#[derive(Debug)]
pub struct SourceText<'a> {
    text: &'a str,
    /// Position of the first byte in the source map.
    base: u32,
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    #[must_use]
    pub fn new(text: &'a str, base: BytePos) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            text,
            base: base.0,
            line_starts,
        }
    }

    fn offset(&self, pos: BytePos) -> usize {
        let off = pos.0.saturating_sub(self.base) as usize;
        off.min(self.text.len())
    }

    /// The text covered by a span.
    #[must_use]
    pub fn slice(&self, span: Span) -> Option<&'a str> {
        self.text.get(self.offset(span.lo)..self.offset(span.hi))
    }

    /// 1-based line and column of a position.
    #[must_use]
    pub fn line_col(&self, pos: BytePos) -> (usize, usize) {
        let off = self.offset(pos);
        let line_idx = match self.line_starts.binary_search(&off) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let start = self.line_starts[line_idx];
        let column = self
            .text
            .get(start..off)
            .map_or(off - start, |s| s.chars().count());
        (line_idx + 1, column + 1)
    }
}
