//! # embedded-templates
//!
//! Rewrites templates embedded in JavaScript and TypeScript sources into
//! plain call expressions that regular JS tooling can parse, and reports
//! where every edit happened so diagnostics can be mapped back.
//!
//! ## Features
//!
//! - `<template>...</template>` blocks become `` [GLIMMER_TEMPLATE(`...`)] ``
//! - tagged literals such as `` hbs`...` `` become `` hbs(`...`) ``, honouring
//!   aliased imports (`import { hbs as h } from 'ember-cli-htmlbars'`)
//! - optional `scope()` injection with the template's free identifiers
//! - optional inline source map
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```no_run
//! use embedded_templates::{PreprocessOptions, preprocess};
//!
//! let source = "export default <template><Greeting @name={{name}} /></template>;";
//! let options = PreprocessOptions::new("app/components/hello.gjs", "GLIMMER_TEMPLATE")
//!     .with_template_tokens(true);
//!
//! match preprocess(source, &options) {
//!     Ok(result) => println!("{}", result.output),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Rewrite one file to stdout
//! embedded-templates app/components/hello.gjs --template-tokens
//!
//! # Rewrite a whole tree into another directory
//! embedded-templates app --out-dir tmp/preprocessed --source-maps
//!
//! # Show replacement records as JSON
//! embedded-templates hello.gjs --replacements=json
//! ```

pub mod buffer;
pub mod error;
pub mod fs_utils;
pub mod imports;
pub mod locals;
pub mod position;
pub mod preprocess;
pub mod rewrite;
pub mod scanner;

// Re-export main types and functions for convenience
pub use error::{PreprocessError, Result};
pub use locals::{ExtractorFn, ExtractorRegistry, load_extractor, template_locals};
pub use preprocess::{
    DEFAULT_TEMPLATE_TAG_REPLACEMENT, LocalsSource, PreprocessOptions, PreprocessResult,
    preprocess, preprocess_with,
};
pub use rewrite::{Replacement, ReplacementKind};
pub use scanner::{DefaultScanner, DelimiterMatch, TemplateMatch, TemplateScanner, scan_templates};
