//! Position-preserving text buffer.
//!
//! Edits are addressed against the original text and kept as an ordered
//! list of non-overlapping ranges. Nothing is spliced until [`render`],
//! so offsets computed against the original stay valid no matter how many
//! edits came before.
//!
//! [`render`]: OverwriteBuffer::render

use crate::error::{PreprocessError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sourcemap::{SourceMap, SourceMapBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Options for [`OverwriteBuffer::generate_map`]
#[derive(Debug, Clone, Default)]
pub struct SourceMapOptions {
    /// Name of the generated file
    pub file: Option<String>,
    /// Name of the original source
    pub source: String,
    /// Embed the original text as `sourcesContent`
    pub include_content: bool,
    /// Map every character of unchanged text instead of one token per line
    pub hires: bool,
}

/// Ordered overwrites over an immutable source string
#[derive(Debug, Clone)]
pub struct OverwriteBuffer<'a> {
    original: &'a str,
    edits: Vec<Edit>,
}

impl<'a> OverwriteBuffer<'a> {
    #[must_use]
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            edits: Vec::new(),
        }
    }

    /// Replaces `original[start..end]` with `text` in the rendered output.
    ///
    /// # Errors
    ///
    /// - `PreprocessError::InvalidRange` if the range is empty, out of
    ///   bounds or splits a character.
    /// - `PreprocessError::OverlappingEdit` if the range overlaps an
    ///   earlier overwrite.
    pub fn overwrite(&mut self, start: usize, end: usize, text: impl Into<String>) -> Result<()> {
        let len = self.original.len();
        if start >= end
            || end > len
            || !self.original.is_char_boundary(start)
            || !self.original.is_char_boundary(end)
        {
            return Err(PreprocessError::InvalidRange { start, end, len });
        }

        let at = self.edits.partition_point(|edit| edit.start < start);
        let overlaps_previous = at > 0 && self.edits[at - 1].end > start;
        let overlaps_next = self.edits.get(at).is_some_and(|edit| edit.start < end);
        if overlaps_previous || overlaps_next {
            return Err(PreprocessError::OverlappingEdit { start, end });
        }

        self.edits.insert(
            at,
            Edit {
                start,
                end,
                text: text.into(),
            },
        );
        Ok(())
    }

    /// Stitches unchanged text and overwrites together, left to right
    #[must_use]
    pub fn render(&self) -> String {
        let replaced: usize = self.edits.iter().map(|e| e.end - e.start).sum();
        let added: usize = self.edits.iter().map(|e| e.text.len()).sum();
        let mut output = String::with_capacity(self.original.len() - replaced + added);

        let mut pos = 0;
        for edit in &self.edits {
            output.push_str(&self.original[pos..edit.start]);
            output.push_str(&edit.text);
            pos = edit.end;
        }
        output.push_str(&self.original[pos..]);
        output
    }

    /// Builds a source map from the rendered output back to the original.
    ///
    /// Unchanged text maps to where it came from; each overwrite maps its
    /// first character to the start of the range it replaced. Columns are
    /// counted in UTF-16 code units as JavaScript tooling expects.
    #[must_use]
    pub fn generate_map(&self, options: &SourceMapOptions) -> SourceMap {
        let mut builder = SourceMapBuilder::new(options.file.as_deref());
        let source_id = builder.add_source(&options.source);
        if options.include_content {
            builder.set_source_contents(source_id, Some(self.original));
        }

        let mut mapper = Mapper {
            builder,
            source: &options.source,
            hires: options.hires,
            generated: Cursor::default(),
            original: Cursor::default(),
        };

        let mut pos = 0;
        for edit in &self.edits {
            mapper.unchanged(&self.original[pos..edit.start]);
            mapper.replaced(&self.original[edit.start..edit.end], &edit.text);
            pos = edit.end;
        }
        mapper.unchanged(&self.original[pos..]);

        mapper.builder.into_sourcemap()
    }
}

/// Encodes a source map as a base64 `data:` URL
///
/// # Errors
///
/// Returns `PreprocessError::SourceMap` if serialization fails.
pub fn map_to_url(map: &SourceMap) -> Result<String> {
    let mut json = Vec::new();
    map.to_writer(&mut json)?;
    Ok(format!(
        "data:application/json;charset=utf-8;base64,{}",
        STANDARD.encode(json)
    ))
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    line: u32,
    col: u32,
}

impl Cursor {
    fn advance(&mut self, c: char) {
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += u32::try_from(c.len_utf16()).unwrap_or(1);
        }
    }

    fn advance_str(&mut self, text: &str) {
        text.chars().for_each(|c| self.advance(c));
    }
}

struct Mapper<'s> {
    builder: SourceMapBuilder,
    source: &'s str,
    hires: bool,
    generated: Cursor,
    original: Cursor,
}

impl Mapper<'_> {
    fn token(&mut self) {
        self.builder.add(
            self.generated.line,
            self.generated.col,
            self.original.line,
            self.original.col,
            Some(self.source),
            None,
        );
    }

    fn unchanged(&mut self, segment: &str) {
        let mut line_start = true;
        for c in segment.chars() {
            if c != '\n' && (self.hires || line_start) {
                self.token();
            }
            line_start = c == '\n';
            self.generated.advance(c);
            self.original.advance(c);
        }
    }

    fn replaced(&mut self, old: &str, new: &str) {
        self.token();
        self.generated.advance_str(new);
        self.original.advance_str(old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_edits() {
        let buffer = OverwriteBuffer::new("const a = 1;");
        assert_eq!(buffer.render(), "const a = 1;");
    }

    #[test]
    fn test_render_uses_original_offsets() {
        let source = "ab<template>x</template>c";
        let mut buffer = OverwriteBuffer::new(source);
        // Later range first; offsets still refer to the original text
        buffer.overwrite(13, 24, "`)]").unwrap();
        buffer.overwrite(2, 12, "[G(`").unwrap();
        assert_eq!(buffer.render(), "ab[G(`x`)]c");
    }

    #[test]
    fn test_overlapping_edits_rejected() {
        let mut buffer = OverwriteBuffer::new("0123456789");
        buffer.overwrite(2, 5, "x").unwrap();
        assert!(matches!(
            buffer.overwrite(4, 7, "y"),
            Err(PreprocessError::OverlappingEdit { start: 4, end: 7 })
        ));
        assert!(matches!(
            buffer.overwrite(0, 3, "y"),
            Err(PreprocessError::OverlappingEdit { .. })
        ));
        assert!(matches!(
            buffer.overwrite(2, 5, "y"),
            Err(PreprocessError::OverlappingEdit { .. })
        ));
        // Touching ranges are fine
        buffer.overwrite(5, 6, "z").unwrap();
        buffer.overwrite(1, 2, "w").unwrap();
        assert_eq!(buffer.render(), "0wxz6789");
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let mut buffer = OverwriteBuffer::new("aé");
        assert!(matches!(
            buffer.overwrite(1, 1, "x"),
            Err(PreprocessError::InvalidRange { .. })
        ));
        assert!(matches!(
            buffer.overwrite(1, 2, "x"),
            Err(PreprocessError::InvalidRange { .. })
        ));
        assert!(matches!(
            buffer.overwrite(0, 9, "x"),
            Err(PreprocessError::InvalidRange { len: 3, .. })
        ));
    }

    #[test]
    fn test_generate_map_hires() {
        let source = "ab<template>x</template>c";
        let mut buffer = OverwriteBuffer::new(source);
        buffer.overwrite(2, 12, "[G(`").unwrap();
        buffer.overwrite(13, 24, "`)]").unwrap();

        let map = buffer.generate_map(&SourceMapOptions {
            file: Some("foo.js".to_string()),
            source: "foo.gjs".to_string(),
            include_content: true,
            hires: true,
        });

        assert_eq!(map.get_file(), Some("foo.js"));
        assert_eq!(map.get_source(0), Some("foo.gjs"));
        assert_eq!(map.get_source_contents(0), Some(source));

        let x = map.lookup_token(0, 6).unwrap();
        assert_eq!((x.get_src_line(), x.get_src_col()), (0, 12));

        let c = map.lookup_token(0, 10).unwrap();
        assert_eq!((c.get_src_line(), c.get_src_col()), (0, 24));

        let open = map.lookup_token(0, 2).unwrap();
        assert_eq!(open.get_src_col(), 2);
    }

    #[test]
    fn test_generate_map_tracks_lines() {
        let source = "a\n<template>\nb\n</template>\nc";
        let mut buffer = OverwriteBuffer::new(source);
        buffer.overwrite(2, 12, "[G(`").unwrap();
        buffer.overwrite(15, 26, "`)]").unwrap();
        assert_eq!(buffer.render(), "a\n[G(`\nb\n`)]\nc");

        let map = buffer.generate_map(&SourceMapOptions {
            source: "x.gjs".to_string(),
            ..SourceMapOptions::default()
        });
        assert_eq!(map.get_source_contents(0), None);

        let c = map.lookup_token(4, 0).unwrap();
        assert_eq!((c.get_src_line(), c.get_src_col()), (4, 0));
        let b = map.lookup_token(2, 0).unwrap();
        assert_eq!((b.get_src_line(), b.get_src_col()), (2, 0));
    }

    #[test]
    fn test_map_to_url() {
        let buffer = OverwriteBuffer::new("x");
        let map = buffer.generate_map(&SourceMapOptions::default());
        let url = map_to_url(&map).unwrap();
        let encoded = url
            .strip_prefix("data:application/json;charset=utf-8;base64,")
            .unwrap();
        let json = STANDARD.decode(encoded).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["version"], 3);
    }
}
