//! Rewrites the delimiters of one template match into a call expression.

use crate::buffer::OverwriteBuffer;
use crate::error::{PreprocessError, Result};
use crate::locals::ExtractorFn;
use crate::position::{LineIndex, Span, offset_range};
use crate::scanner::TemplateMatch;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::trace;

static JS_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[$A-Za-z_][0-9A-Za-z_$]*$")
        .unwrap_or_else(|e| panic!("identifier pattern: {e}"))
});

/// Which delimiter of a match a [`Replacement`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementKind {
    Start,
    End,
}

/// One rewritten delimiter, located in the original source.
///
/// `index`, `old_length`, `original_line` and `original_col` describe the
/// original text; `new_length` is the byte length of what replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replacement {
    #[serde(rename = "type")]
    pub kind: ReplacementKind,
    pub index: usize,
    pub old_length: usize,
    pub new_length: usize,
    pub original_line: usize,
    pub original_col: usize,
}

impl Replacement {
    fn new(
        lines: &LineIndex<'_>,
        kind: ReplacementKind,
        span: Span,
        new_length: usize,
    ) -> Result<Self> {
        let location = lines.locate(span.start)?;
        Ok(Self {
            kind,
            index: span.start,
            old_length: span.len(),
            new_length,
            original_line: location.line,
            original_col: location.col,
        })
    }
}

/// Builds the `, { scope() { return {...}; } }` suffix from extracted
/// locals, keeping only valid JavaScript identifiers in their original
/// order. Returns an empty string when nothing survives the filter.
#[must_use]
pub fn scope_suffix(locals: &[String]) -> String {
    let tokens = locals
        .iter()
        .map(String::as_str)
        .filter(|local| JS_IDENTIFIER.is_match(local))
        .collect::<Vec<_>>()
        .join(",");

    if tokens.is_empty() {
        String::new()
    } else {
        format!(", {{ scope() {{ return {{{tokens}}}; }} }}")
    }
}

/// Everything [`rewrite_match`] needs besides the match itself
pub struct RewriteContext<'a, 'b> {
    pub buffer: &'b mut OverwriteBuffer<'a>,
    /// Pristine source text that all offsets refer to
    pub source: &'a str,
    pub lines: &'b LineIndex<'a>,
    pub extractor: &'b ExtractorFn,
    pub inject_scope: bool,
}

/// Overwrites the opening delimiter of `template` with
/// `` {open_prefix}` `` and the closing one with
/// `` `{scope}{close_suffix} ``, returning the start and end replacement
/// records.
///
/// # Errors
///
/// - `PreprocessError::MissingOffset` if a delimiter has no index.
/// - `PreprocessError::InvalidRange` if the closing delimiter does not come
///   after the opening one.
/// - `PreprocessError::OverlappingEdit` or `PreprocessError::InvalidRange`
///   if the delimiters collide with each other or an earlier match.
pub fn rewrite_match(
    ctx: &mut RewriteContext<'_, '_>,
    template: &TemplateMatch,
    open_prefix: &str,
    close_suffix: &str,
) -> Result<[Replacement; 2]> {
    let open = offset_range(template.start())?;
    let close = offset_range(template.end())?;

    let body = ctx
        .source
        .get(open.end..close.start)
        .ok_or(PreprocessError::InvalidRange {
            start: open.end,
            end: close.start,
            len: ctx.source.len(),
        })?;

    let scope = if ctx.inject_scope {
        scope_suffix(&(ctx.extractor)(body))
    } else {
        String::new()
    };

    let new_start = format!("{open_prefix}`");
    let new_end = format!("`{scope}{close_suffix}");

    ctx.buffer.overwrite(open.start, open.end, new_start.as_str())?;
    ctx.buffer.overwrite(close.start, close.end, new_end.as_str())?;

    trace!(
        kind = template.kind(),
        open = ?open,
        close = ?close,
        scoped = !scope.is_empty(),
        "rewrote template"
    );

    Ok([
        Replacement::new(ctx.lines, ReplacementKind::Start, open, new_start.len())?,
        Replacement::new(ctx.lines, ReplacementKind::End, close, new_end.len())?,
    ])
}
