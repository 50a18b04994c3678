//! Static `import` declaration scanning and local binding resolution.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static IMPORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\bimport(?:\s+(?P<type>type)\b)?\s*(?:(?P<clause>[\w$*{},\s]+?)\s*\bfrom\s*)?["'](?P<module>[^"'\n]+)["']"#,
    )
    .unwrap_or_else(|e| panic!("import pattern: {e}"))
});

/// One named specifier inside `import { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedImport {
    /// Exported name as declared by the module
    pub name: String,
    /// Local alias from `name as alias`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// `{ type Foo }` binds no runtime value
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub type_only: bool,
}

impl NamedImport {
    /// The identifier this specifier binds in the importing file
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A static import declaration, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDeclaration {
    pub module_name: String,
    pub named_imports: Vec<NamedImport>,
    /// `import type ...` declarations bind no runtime values
    pub type_only: bool,
}

/// Scans all static import declarations in source order.
///
/// Comments, string bodies and template literal bodies are ignored, so
/// text that merely looks like an import inside them is not reported.
#[must_use]
pub fn scan_imports(source: &str) -> Vec<ImportDeclaration> {
    let masked = mask_non_code(source);
    let mut imports = Vec::new();

    for capture in IMPORT_PATTERN.captures_iter(&masked) {
        let (Some(full), Some(module)) = (capture.get(0), capture.name("module")) else {
            continue;
        };

        // `foo.import '...'` or `$import` are not declarations
        if let Some(prev) = masked[..full.start()].chars().next_back()
            && (prev == '.' || prev == '$' || prev.is_alphanumeric() || prev == '_')
        {
            continue;
        }

        // The specifier body is masked; its text comes from the source
        let mut declaration = ImportDeclaration {
            module_name: source[module.range()].to_string(),
            type_only: capture.name("type").is_some(),
            ..ImportDeclaration::default()
        };

        if let Some(clause) = capture.name("clause") {
            parse_named_imports(clause.as_str(), &mut declaration);
        }

        imports.push(declaration);
    }

    imports
}

/// Returns the local identifier bound to `identifier` imported from
/// `module_path`, honouring `as` aliases.
///
/// Only the first runtime declaration importing `module_path` is
/// consulted; `import type` declarations and later duplicate imports of
/// the same module are ignored.
#[must_use]
pub fn find_imported_name(source: &str, module_path: &str, identifier: &str) -> Option<String> {
    scan_imports(source)
        .into_iter()
        .find(|decl| !decl.type_only && decl.module_name == module_path)?
        .named_imports
        .into_iter()
        .find(|named| !named.type_only && named.name == identifier)
        .map(|named| named.local_name().to_string())
}

/// Fills `named_imports` from the `{ ... }` part of an import clause.
/// Default and namespace bindings never name a tag export, so they are
/// skipped.
fn parse_named_imports(clause: &str, declaration: &mut ImportDeclaration) {
    let (Some(open), Some(close)) = (clause.find('{'), clause.rfind('}')) else {
        return;
    };
    if open >= close {
        return;
    }

    for specifier in clause[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let (specifier, type_only) = match specifier.strip_prefix("type ") {
            Some(rest) => (rest.trim_start(), true),
            None => (specifier, false),
        };
        let mut words = specifier.split_whitespace();
        let Some(name) = words.next() else {
            continue;
        };
        let alias = match (words.next(), words.next()) {
            (Some("as"), Some(alias)) => Some(alias.to_string()),
            _ => None,
        };
        declaration.named_imports.push(NamedImport {
            name: name.to_string(),
            alias,
            type_only,
        });
    }
}

/// Replaces comments, string bodies and template literal bodies with
/// spaces, keeping byte offsets intact. String quotes stay in place so a
/// module specifier can still be located and read back from the source.
fn mask_non_code(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Quoted(u8),
        Backtick,
    }

    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut state = State::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = State::LineComment;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                }
                (b'/', Some(b'*')) => {
                    state = State::BlockComment;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                }
                (b'\'' | b'"', _) => state = State::Quoted(b),
                (b'`', _) => state = State::Backtick,
                _ => {}
            },
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                } else {
                    out[i] = b' ';
                }
            }
            State::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                    state = State::Code;
                } else if b != b'\n' {
                    out[i] = b' ';
                }
            }
            State::Quoted(quote) => {
                if b == b'\\' {
                    out[i] = b' ';
                    if next.is_some_and(|n| n != b'\n') {
                        out[i + 1] = b' ';
                    }
                    i += 1;
                } else if b == quote || b == b'\n' {
                    state = State::Code;
                } else {
                    out[i] = b' ';
                }
            }
            State::Backtick => {
                if b == b'\\' {
                    out[i] = b' ';
                    if next.is_some_and(|n| n != b'\n') {
                        out[i + 1] = b' ';
                    }
                    i += 1;
                } else if b == b'`' {
                    state = State::Code;
                } else if b != b'\n' {
                    out[i] = b' ';
                }
            }
        }
        i += 1;
    }

    // Masking always covers whole characters, so this stays valid UTF-8
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
