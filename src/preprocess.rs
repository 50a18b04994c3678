//! Entry point: rewrites every qualifying embedded template in a file.

use crate::buffer::{OverwriteBuffer, SourceMapOptions, map_to_url};
use crate::error::Result;
use crate::imports::find_imported_name;
use crate::locals::{ExtractorFn, ExtractorRegistry, load_extractor, template_locals};
use crate::position::LineIndex;
use crate::rewrite::{Replacement, RewriteContext, rewrite_match};
use crate::scanner::{DefaultScanner, TemplateMatch, TemplateScanner};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Call name used for `<template>` blocks unless configured otherwise
pub const DEFAULT_TEMPLATE_TAG_REPLACEMENT: &str = "GLIMMER_TEMPLATE";

/// Where the free-variable extractor comes from
#[derive(Clone)]
pub enum LocalsSource {
    /// The extractor itself
    Eager(ExtractorFn),
    /// A module path and dotted export path resolved through an
    /// [`ExtractorRegistry`] at the start of each call
    Lazy {
        require_path: String,
        export_path: String,
    },
}

impl fmt::Debug for LocalsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager(_) => f.write_str("Eager(..)"),
            Self::Lazy {
                require_path,
                export_path,
            } => f
                .debug_struct("Lazy")
                .field("require_path", require_path)
                .field("export_path", export_path)
                .finish(),
        }
    }
}

/// Configuration for [`preprocess`]
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub locals: LocalsSource,
    /// Module the tagged-literal identifier must be imported from
    pub import_path: Option<String>,
    /// Exported name of the template tag function, e.g. `hbs`
    pub import_identifier: Option<String>,
    /// Custom tag name to look for, `template` when unset
    pub template_tag: Option<String>,
    /// Call wrapped around `<template>` blocks, e.g. `GLIMMER_TEMPLATE`
    pub template_tag_replacement: String,
    pub include_source_maps: bool,
    /// Inject `scope()` with the template's free identifiers
    pub include_template_tokens: bool,
    /// Path of the source relative to its project, used for error
    /// messages and source map naming
    pub relative_path: String,
}

impl PreprocessOptions {
    /// Options using the built-in extractor, no import filter, no source
    /// maps and no scope injection
    #[must_use]
    pub fn new(
        relative_path: impl Into<String>,
        template_tag_replacement: impl Into<String>,
    ) -> Self {
        Self {
            locals: LocalsSource::Eager(Arc::new(template_locals)),
            import_path: None,
            import_identifier: None,
            template_tag: None,
            template_tag_replacement: template_tag_replacement.into(),
            include_source_maps: false,
            include_template_tokens: false,
            relative_path: relative_path.into(),
        }
    }

    #[must_use]
    pub fn with_locals(mut self, locals: LocalsSource) -> Self {
        self.locals = locals;
        self
    }

    #[must_use]
    pub fn with_import(mut self, path: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.import_path = Some(path.into());
        self.import_identifier = Some(identifier.into());
        self
    }

    #[must_use]
    pub fn with_template_tag(mut self, tag: impl Into<String>) -> Self {
        self.template_tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn with_source_maps(mut self, enabled: bool) -> Self {
        self.include_source_maps = enabled;
        self
    }

    #[must_use]
    pub fn with_template_tokens(mut self, enabled: bool) -> Self {
        self.include_template_tokens = enabled;
        self
    }
}

/// Rewritten text and where it was edited
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreprocessResult {
    pub output: String,
    pub replacements: Vec<Replacement>,
}

/// Preprocesses all embedded templates in a JavaScript or TypeScript file
/// with the built-in scanner and extractor registry.
///
/// ```text
/// <template><MyComponent/></template>
///   => [GLIMMER_TEMPLATE(`<MyComponent/>`, { scope() { return {MyComponent}; } })]
///
/// hbs`<MyComponent/>`
///   => hbs(`<MyComponent/>`, { scope() { return {MyComponent}; } })
/// ```
///
/// # Errors
///
/// See [`preprocess_with`].
pub fn preprocess(source: &str, options: &PreprocessOptions) -> Result<PreprocessResult> {
    preprocess_with(
        source,
        options,
        &DefaultScanner,
        &ExtractorRegistry::with_defaults(),
    )
}

/// Preprocesses a file with an explicit scanner and extractor registry.
///
/// When both `import_path` and `import_identifier` are configured and the
/// file does not import that identifier, the source is returned untouched.
///
/// # Errors
///
/// - `PreprocessError::Configuration` if a lazy extractor cannot be resolved.
/// - `PreprocessError::TemplateParse` from the scanner.
/// - `PreprocessError::MissingOffset`, `PreprocessError::OverlappingEdit`
///   or `PreprocessError::InvalidRange` if the scanner produced bad matches.
/// - `PreprocessError::SourceMap` if the source map cannot be serialized.
pub fn preprocess_with(
    source: &str,
    options: &PreprocessOptions,
    scanner: &dyn TemplateScanner,
    registry: &ExtractorRegistry,
) -> Result<PreprocessResult> {
    let extractor = match &options.locals {
        LocalsSource::Eager(extractor) => extractor.clone(),
        LocalsSource::Lazy {
            require_path,
            export_path,
        } => load_extractor(registry, require_path, export_path)?,
    };

    let mut identifier = options.import_identifier.clone();
    if let (Some(import_path), Some(import_identifier)) =
        (&options.import_path, &options.import_identifier)
    {
        identifier = find_imported_name(source, import_path, import_identifier);
        if identifier.is_none() {
            debug!(
                path = %options.relative_path,
                import_path = %import_path,
                import_identifier = %import_identifier,
                "identifier not imported, leaving file untouched"
            );
            return Ok(PreprocessResult {
                output: source.to_string(),
                replacements: Vec::new(),
            });
        }
    }

    let matches = scanner.scan(
        source,
        &options.relative_path,
        options.template_tag.as_deref(),
    )?;
    debug!(path = %options.relative_path, matches = matches.len(), "scanned templates");

    let lines = LineIndex::new(source);
    let mut buffer = OverwriteBuffer::new(source);
    let mut replacements = Vec::new();
    let tag_open = format!("[{}(", options.template_tag_replacement);
    {
        let mut ctx = RewriteContext {
            buffer: &mut buffer,
            source,
            lines: &lines,
            extractor: &extractor,
            inject_scope: options.include_template_tokens,
        };

        for template in &matches {
            match template {
                TemplateMatch::TemplateLiteral { tag_name, .. }
                    if identifier.as_deref() == Some(tag_name.as_str()) =>
                {
                    let open = format!("{tag_name}(");
                    replacements.extend(rewrite_match(&mut ctx, template, &open, ")")?);
                }
                TemplateMatch::TemplateTag { .. } => {
                    replacements.extend(rewrite_match(&mut ctx, template, &tag_open, ")]")?);
                }
                TemplateMatch::TemplateLiteral { .. } => {}
            }
        }
    }

    let mut output = buffer.render();

    if options.include_source_maps {
        let map = buffer.generate_map(&SourceMapOptions {
            file: Some(generated_file_name(&options.relative_path)),
            source: options.relative_path.clone(),
            include_content: true,
            hires: true,
        });
        output.push_str("\n//# sourceMappingURL=");
        output.push_str(&map_to_url(&map)?);
    }

    debug!(
        path = %options.relative_path,
        replacements = replacements.len(),
        "preprocessed"
    );

    Ok(PreprocessResult {
        output,
        replacements,
    })
}

/// `dir/name.gts` becomes `dir/name.js`; a bare `name.gts` becomes `/name.js`
fn generated_file_name(relative_path: &str) -> String {
    let path = Path::new(relative_path);
    let dir = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{dir}/{name}.js")
}
