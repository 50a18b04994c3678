//! Free-variable extraction for template bodies, and the registry used to
//! resolve an extractor by module path and export path.

use crate::error::{PreprocessError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Returns the identifiers a template body references from its
/// surrounding JavaScript scope
pub type ExtractorFn = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Module path under which the built-in extractor is registered
pub const GLIMMER_SYNTAX_MODULE: &str = "@glimmer/syntax";

/// Export path of the built-in extractor inside [`GLIMMER_SYNTAX_MODULE`]
pub const GLIMMER_SYNTAX_EXPORT: &str = "getTemplateLocals";

/// Built-in keywords never reported as locals
const KEYWORDS: &[&str] = &[
    "action",
    "array",
    "component",
    "concat",
    "debugger",
    "each",
    "each-in",
    "else",
    "fn",
    "get",
    "has-block",
    "has-block-params",
    "hash",
    "helper",
    "if",
    "in-element",
    "let",
    "log",
    "modifier",
    "mount",
    "mut",
    "on",
    "outlet",
    "readonly",
    "unbound",
    "unique-id",
    "unless",
    "with",
    "yield",
];

const LITERALS: &[&str] = &["true", "false", "null", "undefined"];

/// The built-in extractor: head identifiers of mustache paths and
/// component tags that are not bound inside the template itself.
///
/// Results are in document order without duplicates. `this`, `@args`,
/// keywords, literals, hash keys, plain HTML elements and block params in
/// scope are excluded. Tokens such as `my-helper` are returned as is;
/// callers decide which of them are valid JavaScript identifiers.
#[must_use]
pub fn template_locals(body: &str) -> Vec<String> {
    let mut walker = LocalsWalker {
        src: body,
        pos: 0,
        scopes: Vec::new(),
        locals: Vec::new(),
    };
    walker.walk();
    walker.locals
}

#[derive(Debug)]
struct Frame {
    /// `Some(tag)` for an element with block params, `None` for `{{#block}}`
    element: Option<String>,
    params: Vec<String>,
}

struct LocalsWalker<'a> {
    src: &'a str,
    pos: usize,
    scopes: Vec<Frame>,
    locals: Vec<String>,
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Literal,
    Equals,
    Pipe,
}

impl<'a> LocalsWalker<'a> {
    fn rest(&self) -> &'a str {
        let src: &'a str = self.src;
        &src[self.pos..]
    }

    fn walk(&mut self) {
        while self.pos < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("{{!--") {
                self.skip_past("--}}");
            } else if rest.starts_with("{{!") {
                self.skip_past("}}");
            } else if rest.starts_with("{{") {
                self.mustache();
            } else if rest.starts_with("<!--") {
                self.skip_past("-->");
            } else if rest.starts_with("</") {
                self.close_element();
            } else if rest.starts_with('<') {
                self.open_element();
            } else {
                self.pos += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
    }

    fn skip_past(&mut self, terminator: &str) {
        self.pos = self
            .rest()
            .find(terminator)
            .map_or(self.src.len(), |i| self.pos + i + terminator.len());
    }

    /// Reads `{{ ... }}` starting at `self.pos` and returns its inner text
    fn take_mustache(&mut self) -> &'a str {
        let rest = self.rest();
        let inner_start = rest.len() - rest.trim_start_matches('{').len();
        let (inner, consumed) = match rest[inner_start..].find("}}") {
            Some(close) => {
                let after = &rest[inner_start + close..];
                let braces = after.len() - after.trim_start_matches('}').len();
                (&rest[inner_start..inner_start + close], inner_start + close + braces)
            }
            None => (&rest[inner_start..], rest.len()),
        };
        self.pos += consumed;
        inner.trim_matches('~').trim()
    }

    fn mustache(&mut self) {
        let inner = self.take_mustache();

        if inner.starts_with('/') {
            if let Some(at) = self.scopes.iter().rposition(|f| f.element.is_none()) {
                self.scopes.truncate(at);
            }
            return;
        }

        let (opens_block, expression) =
            match inner.strip_prefix('#').or_else(|| inner.strip_prefix('^')) {
                Some(expression) => (true, expression),
                None => (false, inner),
            };

        let params = self.expression(expression);

        if opens_block {
            self.scopes.push(Frame {
                element: None,
                params,
            });
        }
    }

    /// Records the free heads of an expression; returns its block params
    fn expression(&mut self, expression: &str) -> Vec<String> {
        let tokens = tokenize(expression);
        let mut params = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            match tokens[i] {
                Token::Word("as") if tokens.get(i + 1) == Some(&Token::Pipe) => {
                    i += 2;
                    while let Some(Token::Word(param)) = tokens.get(i) {
                        params.push((*param).to_string());
                        i += 1;
                    }
                }
                Token::Word(_) if tokens.get(i + 1) == Some(&Token::Equals) => i += 1,
                Token::Word(path) => self.reference(path, false),
                _ => {}
            }
            i += 1;
        }

        params
    }

    fn in_scope(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|frame| frame.params.iter().any(|p| p == name))
    }

    fn reference(&mut self, path: &str, is_tag: bool) {
        let head = path.split('.').next().unwrap_or(path);

        if head.is_empty()
            || head == "this"
            || head.starts_with('@')
            || head.starts_with(':')
            || head.starts_with(|c: char| c.is_ascii_digit() || c == '-')
            || LITERALS.contains(&head)
            || self.in_scope(head)
        {
            return;
        }

        if is_tag {
            let is_component =
                path.contains('.') || head.starts_with(|c: char| c.is_uppercase());
            if !is_component {
                return;
            }
        } else if KEYWORDS.contains(&head) {
            return;
        }

        if !self.locals.iter().any(|l| l == head) {
            self.locals.push(head.to_string());
        }
    }

    fn open_element(&mut self) {
        self.pos += 1;
        let rest = self.rest();
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        self.pos += name_len;

        if name.is_empty() {
            return;
        }
        self.reference(name, true);

        let mut params = Vec::new();
        let mut quote: Option<char> = None;

        while self.pos < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("{{") {
                let inner = self.take_mustache();
                self.expression(inner);
                continue;
            }

            let Some(c) = rest.chars().next() else {
                break;
            };
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '"' || c == '\'' => quote = Some(c),
                None if rest.starts_with("/>") => {
                    self.pos += 2;
                    return;
                }
                None if c == '>' => {
                    self.pos += 1;
                    break;
                }
                None if rest.starts_with("as |") => {
                    let list = &rest[4..];
                    let close = list.find('|').unwrap_or(list.len());
                    params.extend(list[..close].split_whitespace().map(str::to_string));
                    self.pos += 4 + (close + 1).min(list.len());
                    continue;
                }
                None => {}
            }
            self.pos += c.len_utf8();
        }

        if !params.is_empty() {
            self.scopes.push(Frame {
                element: Some(name.to_string()),
                params,
            });
        }
    }

    fn close_element(&mut self) {
        self.pos += 2;
        let rest = self.rest();
        let name_len = rest.find('>').unwrap_or(rest.len());
        let name = rest[..name_len].trim();
        self.pos += (name_len + 1).min(rest.len());

        if let Some(frame) = self.scopes.last()
            && frame.element.as_deref() == Some(name)
        {
            self.scopes.pop();
        }
    }
}

fn tokenize(expression: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '"' | '\'' => {
                for (_, next) in chars.by_ref() {
                    if next == c {
                        break;
                    }
                }
                tokens.push(Token::Literal);
            }
            '=' => tokens.push(Token::Equals),
            '|' => tokens.push(Token::Pipe),
            '(' | ')' => {}
            c if c.is_whitespace() => {}
            _ => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '=' | '|' | '(' | ')' | '"' | '\'') {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                let word = &expression[start..end];
                if word.starts_with(|c: char| c.is_ascii_digit()) {
                    tokens.push(Token::Literal);
                } else {
                    tokens.push(Token::Word(word));
                }
            }
        }
    }

    tokens
}

/// A value exported by a registered module: a function or a namespace
#[derive(Clone)]
pub enum Export {
    Function(ExtractorFn),
    Namespace(BTreeMap<String, Export>),
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Namespace(members) => f.debug_map().entries(members.iter()).finish(),
        }
    }
}

/// Extractors addressable by module path and dotted export path
#[derive(Debug, Clone, Default)]
pub struct ExtractorRegistry {
    modules: HashMap<String, Export>,
}

impl ExtractorRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in extractor as
    /// `@glimmer/syntax` / `getTemplateLocals` and as
    /// `embedded-templates` / `locals.templateLocals`
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtin: ExtractorFn = Arc::new(template_locals);
        registry.register(GLIMMER_SYNTAX_MODULE, GLIMMER_SYNTAX_EXPORT, builtin.clone());
        registry.register(env!("CARGO_PKG_NAME"), "locals.templateLocals", builtin);
        registry
    }

    /// Registers `extractor` at `export_path` (split on `.`) inside
    /// `module_path`, creating namespaces along the way
    pub fn register(&mut self, module_path: &str, export_path: &str, extractor: ExtractorFn) {
        let mut node = self
            .modules
            .entry(module_path.to_string())
            .or_insert_with(|| Export::Namespace(BTreeMap::new()));

        for segment in export_path.split('.') {
            if matches!(node, Export::Function(_)) {
                *node = Export::Namespace(BTreeMap::new());
            }
            let Export::Namespace(members) = node else {
                unreachable!("node was just made a namespace");
            };
            node = members
                .entry(segment.to_string())
                .or_insert_with(|| Export::Namespace(BTreeMap::new()));
        }

        *node = Export::Function(extractor);
    }

    #[must_use]
    pub fn module(&self, module_path: &str) -> Option<&Export> {
        self.modules.get(module_path)
    }
}

/// Resolves `export_path` inside the module registered as `module_path`.
///
/// # Errors
///
/// Returns `PreprocessError::Configuration` if the module is unknown, a
/// segment of the export path does not exist, or the value found is not a
/// function.
pub fn load_extractor(
    registry: &ExtractorRegistry,
    module_path: &str,
    export_path: &str,
) -> Result<ExtractorFn> {
    let mut node = registry.module(module_path).ok_or_else(|| {
        PreprocessError::configuration(format!("Cannot find module '{module_path}'"))
    })?;

    for segment in export_path.split('.') {
        node = match node {
            Export::Namespace(members) => members.get(segment),
            Export::Function(_) => None,
        }
        .ok_or_else(|| {
            PreprocessError::configuration(format!(
                "'{export_path}' is not exported by '{module_path}' (missing '{segment}')"
            ))
        })?;
    }

    match node {
        Export::Function(extractor) => Ok(Arc::clone(extractor)),
        Export::Namespace(_) => Err(PreprocessError::configuration(format!(
            "'{export_path}' exported by '{module_path}' is not a function"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_tags() {
        assert_eq!(template_locals("<MyComponent/>"), vec!["MyComponent"]);
        assert_eq!(
            template_locals("<div><ui.Button @onClick={{save}} /></div>"),
            vec!["ui", "save"]
        );
    }

    #[test]
    fn test_mustache_paths() {
        let body = r#"{{format-date this.date}} {{t "greeting" name=user.name}} {{@arg}} {{count}}"#;
        assert_eq!(template_locals(body), vec!["format-date", "t", "user", "count"]);
    }

    #[test]
    fn test_keywords_and_literals_skipped() {
        let body = "{{#if true}}{{yield (hash a=1)}}{{else}}{{outlet}}{{/if}}<button {{on 'click' handler}}></button>";
        assert_eq!(template_locals(body), vec!["handler"]);
    }

    #[test]
    fn test_block_params_scoped() {
        let body = "{{#each items as |item index|}}{{item.name}}{{index}}{{/each}}{{item}}";
        assert_eq!(template_locals(body), vec!["items", "item"]);
    }

    #[test]
    fn test_element_block_params_scoped() {
        let body = "<Form as |f|><f.Input /></Form><f.Input />";
        assert_eq!(template_locals(body), vec!["Form", "f"]);
    }

    #[test]
    fn test_comments_ignored() {
        let body = "{{!-- {{hidden}} --}}{{! <Hidden/> }}<!-- <AlsoHidden/> -->{{shown}}";
        assert_eq!(template_locals(body), vec!["shown"]);
    }

    #[test]
    fn test_deduplicated_in_order() {
        let body = "<Foo/>{{bar}}<Foo/>{{bar}}{{baz}}";
        assert_eq!(template_locals(body), vec!["Foo", "bar", "baz"]);
    }

    #[test]
    fn test_load_builtin_extractor() {
        let registry = ExtractorRegistry::with_defaults();
        let extractor =
            load_extractor(&registry, GLIMMER_SYNTAX_MODULE, GLIMMER_SYNTAX_EXPORT).unwrap();
        assert_eq!(extractor("<Foo/>"), vec!["Foo"]);

        let nested =
            load_extractor(&registry, "embedded-templates", "locals.templateLocals").unwrap();
        assert_eq!(nested("{{x}}"), vec!["x"]);
    }

    fn load_error(
        registry: &ExtractorRegistry,
        module: &str,
        export_path: &str,
    ) -> PreprocessError {
        match load_extractor(registry, module, export_path) {
            Ok(_) => panic!("expected {module}:{export_path} to fail"),
            Err(err) => err,
        }
    }

    #[test]
    fn test_load_extractor_errors() {
        let registry = ExtractorRegistry::with_defaults();

        let err = load_error(&registry, "missing-module", "x");
        assert!(matches!(err, PreprocessError::Configuration { .. }));
        assert!(err.to_string().contains("missing-module"));

        let err = load_error(&registry, GLIMMER_SYNTAX_MODULE, "nope.deeper");
        assert!(err.to_string().contains("missing 'nope'"));

        let err = load_error(&registry, GLIMMER_SYNTAX_MODULE, "getTemplateLocals.call");
        assert!(matches!(err, PreprocessError::Configuration { .. }));

        let err = load_error(&registry, "embedded-templates", "locals");
        assert!(err.to_string().contains("not a function"));
    }

    #[test]
    fn test_register_custom_extractor() {
        let mut registry = ExtractorRegistry::new();
        registry.register("my-tools", "a.b.c", Arc::new(|_: &str| vec!["fixed".to_string()]));
        let extractor = load_extractor(&registry, "my-tools", "a.b.c").unwrap();
        assert_eq!(extractor("anything"), vec!["fixed"]);
    }
}
