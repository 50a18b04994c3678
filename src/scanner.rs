//! Locates embedded templates in JavaScript/TypeScript source.
//!
//! Two kinds of region are reported:
//!
//! - tagged template literals, e.g. `` hbs`<Foo/>` ``
//! - custom tag blocks, e.g. `<template><Foo/></template>`
//!
//! The scan is a single left-to-right pass that understands just enough
//! JavaScript to not be fooled by comments, quoted strings and untagged
//! template literals. Regular expression literals are not recognised.

use crate::error::{PreprocessError, Result};
use crate::position::line_column;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tag name looked for when no filter is configured
pub const DEFAULT_TEMPLATE_TAG: &str = "template";

/// Words that can directly precede a backtick without being a tag
const NON_TAG_KEYWORDS: &[&str] = &[
    "await", "case", "default", "delete", "do", "else", "extends", "in", "instanceof", "new", "of",
    "return", "throw", "typeof", "void", "yield",
];

/// A located delimiter: its byte offset and the exact text it spans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimiterMatch {
    /// Byte offset of the first character; `None` means the producer is broken
    #[serde(default)]
    pub index: Option<usize>,
    pub text: String,
}

impl DelimiterMatch {
    fn at(source: &str, start: usize, end: usize) -> Self {
        Self {
            index: Some(start),
            text: source[start..end].to_string(),
        }
    }
}

/// A located embedded template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TemplateMatch {
    /// `` tag`...` ``; `start` spans the tag and the opening backtick
    TemplateLiteral {
        #[serde(rename = "tagName")]
        tag_name: String,
        contents: String,
        start: DelimiterMatch,
        end: DelimiterMatch,
    },
    /// `<tag ...>...</tag>`; `start` and `end` span the opening and closing tags
    TemplateTag {
        contents: String,
        start: DelimiterMatch,
        end: DelimiterMatch,
    },
}

impl TemplateMatch {
    #[must_use]
    pub fn start(&self) -> &DelimiterMatch {
        match self {
            Self::TemplateLiteral { start, .. } | Self::TemplateTag { start, .. } => start,
        }
    }

    #[must_use]
    pub fn end(&self) -> &DelimiterMatch {
        match self {
            Self::TemplateLiteral { end, .. } | Self::TemplateTag { end, .. } => end,
        }
    }

    #[must_use]
    pub fn contents(&self) -> &str {
        match self {
            Self::TemplateLiteral { contents, .. } | Self::TemplateTag { contents, .. } => contents,
        }
    }

    /// Serialized discriminant: `template-literal` or `template-tag`
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TemplateLiteral { .. } => "template-literal",
            Self::TemplateTag { .. } => "template-tag",
        }
    }
}

/// Produces the ordered, non-overlapping template regions of a source file
pub trait TemplateScanner {
    /// # Errors
    ///
    /// Implementations fail when the source contains an unterminated region.
    fn scan(
        &self,
        source: &str,
        relative_path: &str,
        template_tag: Option<&str>,
    ) -> Result<Vec<TemplateMatch>>;
}

/// The built-in scanner
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScanner;

impl TemplateScanner for DefaultScanner {
    fn scan(
        &self,
        source: &str,
        relative_path: &str,
        template_tag: Option<&str>,
    ) -> Result<Vec<TemplateMatch>> {
        scan_templates(source, relative_path, template_tag)
    }
}

/// Finds all embedded templates, earliest opening delimiter first.
///
/// # Errors
///
/// - `PreprocessError::TemplateParse` for an unterminated template literal,
///   `${` substitution or tag block.
/// - `PreprocessError::Regex` if the tag pattern fails to compile.
pub fn scan_templates(
    source: &str,
    relative_path: &str,
    template_tag: Option<&str>,
) -> Result<Vec<TemplateMatch>> {
    let tag = template_tag.unwrap_or(DEFAULT_TEMPLATE_TAG);
    let mut scanner = Scanner {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        relative_path,
        open_tag: Regex::new(&format!(r"^<{}(?:\s[^>]*)?>", regex::escape(tag)))?,
        close_tag: format!("</{tag}>"),
        matches: Vec::new(),
    };

    scanner.code(false)?;

    let mut matches = scanner.matches;
    // Literals nested in `${}` are closed before their parent
    matches.sort_by_key(|m| m.start().index);
    Ok(matches)
}

struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    relative_path: &'a str,
    open_tag: Regex,
    close_tag: String,
    matches: Vec<TemplateMatch>,
}

impl Scanner<'_> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, at: usize, message: &str) -> PreprocessError {
        let (line, column) = line_column(self.source, at).map_or((0, 0), |l| (l.line, l.col));
        PreprocessError::TemplateParse {
            path: self.relative_path.to_string(),
            line,
            column,
            message: message.to_string(),
        }
    }

    /// Scans JavaScript code. With `in_substitution`, stops after the `}`
    /// closing a `${` and fails at end of input.
    fn code(&mut self, in_substitution: bool) -> Result<()> {
        let entered_at = self.pos;
        let mut depth = 0usize;

        while let Some(b) = self.peek(0) {
            match b {
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                b'\'' | b'"' => self.skip_quoted(b),
                b'`' => self.template_literal()?,
                b'<' => {
                    if let Some(open) = self.open_tag.find(&self.source[self.pos..]) {
                        let open_end = self.pos + open.end();
                        self.template_tag(open_end)?;
                    } else {
                        self.pos += 1;
                    }
                }
                b'{' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' => {
                    self.pos += 1;
                    if depth == 0 {
                        if in_substitution {
                            return Ok(());
                        }
                    } else {
                        depth -= 1;
                    }
                }
                _ => self.pos += 1,
            }
        }

        if in_substitution {
            return Err(self.error(entered_at, "unterminated `${` substitution"));
        }
        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while let Some(b) = self.peek(0) {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.bytes.len() {
            if self.peek(0) == Some(b'*') && self.peek(1) == Some(b'/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    fn skip_quoted(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            self.pos += 1;
            match b {
                b'\\' => self.pos += 1,
                b'\n' => return,
                _ if b == quote => return,
                _ => {}
            }
        }
    }

    /// Byte range of the identifier tagging the backtick at `self.pos`.
    /// Spaces and tabs may separate the two, line breaks may not.
    fn tag_before_backtick(&self) -> Option<(usize, usize)> {
        let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$';

        let mut end = self.pos;
        while end > 0 && matches!(self.bytes[end - 1], b' ' | b'\t') {
            end -= 1;
        }
        let mut start = end;
        while start > 0 && is_ident(self.bytes[start - 1]) {
            start -= 1;
        }
        if start == end || self.bytes[start].is_ascii_digit() {
            return None;
        }
        if NON_TAG_KEYWORDS.contains(&&self.source[start..end]) {
            return None;
        }
        Some((start, end))
    }

    fn template_literal(&mut self) -> Result<()> {
        let backtick = self.pos;
        let tag = self.tag_before_backtick();
        self.pos += 1;

        loop {
            match self.peek(0) {
                None => return Err(self.error(backtick, "unterminated template literal")),
                Some(b'\\') => self.pos += 2,
                Some(b'`') => break,
                Some(b'$') if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.code(true)?;
                }
                Some(_) => self.pos += 1,
            }
        }

        let close = self.pos;
        self.pos += 1;

        if let Some((tag_start, tag_end)) = tag {
            self.matches.push(TemplateMatch::TemplateLiteral {
                tag_name: self.source[tag_start..tag_end].to_string(),
                contents: self.source[backtick + 1..close].to_string(),
                start: DelimiterMatch::at(self.source, tag_start, backtick + 1),
                end: DelimiterMatch::at(self.source, close, close + 1),
            });
        }
        Ok(())
    }

    /// `self.pos` is at the `<` of an opening tag ending at `open_end`
    fn template_tag(&mut self, open_end: usize) -> Result<()> {
        let open_start = self.pos;
        self.pos = open_end;
        let mut depth = 0usize;

        loop {
            let Some(next) = self.source[self.pos..].find('<') else {
                let message = format!("unclosed {}", self.close_tag.replace('/', ""));
                return Err(self.error(open_start, &message));
            };
            self.pos += next;
            let rest = &self.source[self.pos..];

            if rest.starts_with(&self.close_tag) {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                self.pos += self.close_tag.len();
            } else if let Some(nested) = self.open_tag.find(rest) {
                depth += 1;
                self.pos += nested.end();
            } else {
                self.pos += 1;
            }
        }

        let close_start = self.pos;
        let close_end = close_start + self.close_tag.len();
        self.pos = close_end;

        self.matches.push(TemplateMatch::TemplateTag {
            contents: self.source[open_end..close_start].to_string(),
            start: DelimiterMatch::at(self.source, open_start, open_end),
            end: DelimiterMatch::at(self.source, close_start, close_end),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<TemplateMatch> {
        scan_templates(source, "foo.gjs", None).unwrap()
    }

    #[test]
    fn test_scan_template_tag() {
        let source = "<template><MyComponent/></template>";
        let matches = scan(source);
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0],
            TemplateMatch::TemplateTag {
                contents: "<MyComponent/>".to_string(),
                start: DelimiterMatch {
                    index: Some(0),
                    text: "<template>".to_string(),
                },
                end: DelimiterMatch {
                    index: Some(24),
                    text: "</template>".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_scan_tag_with_attributes_and_nesting() {
        let source = "const x = <template signature=\"x\"><template>a</template>b</template>;";
        let matches = scan(source);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start().text, "<template signature=\"x\">");
        assert_eq!(matches[0].contents(), "<template>a</template>b");
    }

    #[test]
    fn test_scan_tagged_literal() {
        let source = "const t = hbs`<Foo @x={{y}} />`;";
        let matches = scan(source);
        assert_eq!(matches.len(), 1);
        let TemplateMatch::TemplateLiteral {
            tag_name,
            contents,
            start,
            end,
        } = &matches[0]
        else {
            panic!("expected a template literal");
        };
        assert_eq!(tag_name, "hbs");
        assert_eq!(contents, "<Foo @x={{y}} />");
        assert_eq!(start.index, Some(10));
        assert_eq!(start.text, "hbs`");
        assert_eq!(end.text, "`");
        assert_eq!(&source[end.index.unwrap()..], "`;");
    }

    #[test]
    fn test_scan_tag_separated_by_whitespace() {
        let source = "const t = hbs \t`<Foo/>`;";
        let matches = scan(source);
        assert_eq!(matches.len(), 1);
        let TemplateMatch::TemplateLiteral { tag_name, start, .. } = &matches[0] else {
            panic!("expected a template literal");
        };
        assert_eq!(tag_name, "hbs");
        assert_eq!(start.index, Some(10));
        assert_eq!(start.text, "hbs \t`");
    }

    #[test]
    fn test_scan_skips_untagged_and_keywords() {
        let matches = scan("const a = `plain`; function f() { return`x`; }");
        assert!(matches.is_empty());

        let matches = scan("function g() { return `y`; }\nexport default `z`;\nconst b = a\n`w`;");
        assert!(matches.is_empty());
    }

    #[test]
    fn test_scan_skips_comments_and_strings() {
        let source = "// <template>x</template>\n/* hbs`y` */\nconst s = '<template>';\nconst d = \"hbs`\";";
        assert!(scan(source).is_empty());
    }

    #[test]
    fn test_scan_nested_substitution_order() {
        let source = "outer`a ${inner`b`} c`";
        let matches = scan(source);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].start().text, "outer`");
        assert_eq!(matches[1].start().text, "inner`");
        assert!(matches[0].start().index < matches[1].start().index);
    }

    #[test]
    fn test_scan_braces_in_substitution() {
        let source = "hbs`${ {a: 1}.a }`; <template>x</template>";
        let matches = scan(source);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].kind(), "template-tag");
    }

    #[test]
    fn test_scan_custom_tag_name() {
        let source = "<template>a</template><hbs>b</hbs>";
        let matches = scan_templates(source, "foo.gjs", Some("hbs")).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].contents(), "b");
    }

    #[test]
    fn test_scan_does_not_match_longer_tag_names() {
        assert!(scan("<templates>x</templates>").is_empty());
    }

    #[test]
    fn test_scan_unclosed_tag() {
        let err = scan_templates("a\n  <template>oops", "foo.gjs", None).unwrap_err();
        match err {
            PreprocessError::TemplateParse {
                path, line, column, ..
            } => {
                assert_eq!(path, "foo.gjs");
                assert_eq!(line, 2);
                assert_eq!(column, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scan_unterminated_literal() {
        assert!(matches!(
            scan_templates("hbs`abc", "foo.js", None),
            Err(PreprocessError::TemplateParse { .. })
        ));
        assert!(matches!(
            scan_templates("`${ a", "foo.js", None),
            Err(PreprocessError::TemplateParse { .. })
        ));
    }

    #[test]
    fn test_template_match_json_shape() {
        let json = r#"{"type":"template-literal","tagName":"hbs","contents":"x","start":{"index":0,"text":"hbs`"},"end":{"index":5,"text":"`"}}"#;
        let parsed: TemplateMatch = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.kind(), "template-literal");

        let json = r#"{"type":"template-tag","contents":"x","start":{"text":"<template>"},"end":{"index":11,"text":"</template>"}}"#;
        let parsed: TemplateMatch = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.start().index, None);
    }
}
