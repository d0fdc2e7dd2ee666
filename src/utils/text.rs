//! Text editing helpers shared by the reference scanners and the
//! versioning rewrite pass.

use std::ops::Range;

/// A batch of non-overlapping byte-range replacements over one string.
///
/// Edits are collected in any order and applied back-to-front so earlier
/// ranges stay valid.
#[derive(Debug, Default)]
pub struct TextEdits {
    edits: Vec<(Range<usize>, String)>,
}

impl TextEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `range` with `replacement`.
    pub fn replace(&mut self, range: Range<usize>, replacement: impl Into<String>) {
        self.edits.push((range, replacement.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply all edits to `source`.
    ///
    /// Overlapping edits keep the first one (by start offset) and drop the rest.
    pub fn apply(mut self, source: &str) -> String {
        self.edits.sort_by_key(|(range, _)| range.start);

        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        for (range, replacement) in self.edits {
            if range.start < cursor || range.end > source.len() {
                continue;
            }
            out.push_str(&source[cursor..range.start]);
            out.push_str(&replacement);
            cursor = range.end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

/// 1-based line and column of a byte offset.
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    let column = source[line_start..offset].chars().count() + 1;
    (line as u32, column as u32)
}
