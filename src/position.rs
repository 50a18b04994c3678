//! Offset and line/column helpers.
//!
//! Every position handled here is a byte offset into the *original*
//! source text. Lines and columns are 1-based; columns count characters.

use crate::error::{PreprocessError, Result};
use crate::scanner::DelimiterMatch;
use serde::{Deserialize, Serialize};

/// Half-open byte range `start..end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 1-based line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

/// Returns the byte range covered by a delimiter sub-match.
///
/// # Errors
///
/// Returns `PreprocessError::MissingOffset` if the match carries no index.
/// That only happens when the scanner that produced it is broken.
pub fn offset_range(delimiter: &DelimiterMatch) -> Result<Span> {
    let start = delimiter
        .index
        .ok_or_else(|| PreprocessError::missing_offset("expected delimiter match to have an index"))?;

    Ok(Span {
        start,
        end: start + delimiter.text.len(),
    })
}

/// Start offsets of every line in a text, for repeated lookups.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { text, line_starts }
    }

    /// Maps a byte offset to its line and column.
    ///
    /// An offset equal to the text length is valid and points just past
    /// the last character.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessError::MissingOffset` if the offset lies beyond
    /// the text or inside a multi-byte character.
    pub fn locate(&self, offset: usize) -> Result<Location> {
        if offset > self.text.len() || !self.text.is_char_boundary(offset) {
            return Err(PreprocessError::missing_offset(format!(
                "expected to find a line/column for offset {offset}"
            )));
        }

        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert_at) => insert_at - 1,
        };
        let col = self.text[self.line_starts[line]..offset].chars().count() + 1;

        Ok(Location {
            line: line + 1,
            col,
        })
    }
}

/// Maps a byte offset in `text` to a 1-based line and column.
///
/// # Errors
///
/// See [`LineIndex::locate`].
pub fn line_column(text: &str, offset: usize) -> Result<Location> {
    LineIndex::new(text).locate(offset)
}
