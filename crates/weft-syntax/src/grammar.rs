//! Grammars, their compiled queries, and the registry that finds them.
//!
//! A [`Grammar`] pairs a Tree-sitter language with up to four queries and a
//! set of injection points. Queries are compiled once, when the grammar is
//! built, and each pattern's `#set!`/`#is?` settings are normalised at the
//! same time so the resolvers never look at raw property strings on the hot
//! path.
//!
//! Compilation failures do not prevent a grammar from being built. They are
//! logged, kept in [`Grammar::load_errors`], and the affected capability is
//! switched off: without a highlights query the grammar only contributes its
//! base scope; without a folds query nothing folds.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator};

use crate::error::SyntaxError;
use crate::injection::InjectionPoint;
use crate::language::SupportedLanguage;
use crate::range::BufferRange;
use crate::scope::{Capture, EMPTY_SETTINGS, PatternSettings, settings_for_pattern};

const LOG_TARGET: &str = "weft_syntax::grammar";

/// The queries a grammar may supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Syntax highlighting captures. Required for highlighting.
    Highlights,
    /// `@fold`, `@fold.start`, and `@fold.end` captures.
    Folds,
    /// Indentation hints.
    Indents,
    /// Local scopes, definitions, and references.
    Locals,
}

impl QueryKind {
    /// Returns the conventional file stem for the query.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Highlights => "highlights",
            Self::Folds => "folds",
            Self::Indents => "indents",
            Self::Locals => "locals",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled query with its per-pattern settings.
#[derive(Debug)]
pub struct CompiledQuery {
    kind: QueryKind,
    query: Query,
    patterns: Vec<PatternSettings>,
}

impl CompiledQuery {
    /// Compiles `source` for `language`.
    ///
    /// # Errors
    ///
    /// Returns [`SyntaxError::QueryCompileError`] if Tree-sitter rejects the
    /// query.
    pub fn new(
        language: SupportedLanguage,
        kind: QueryKind,
        source: &str,
    ) -> Result<Self, SyntaxError> {
        let query = Query::new(&language.tree_sitter_language(), source)
            .map_err(|e| SyntaxError::query_compile(language, kind, e.to_string()))?;
        let patterns = (0..query.pattern_count())
            .map(|index| settings_for_pattern(&query, index))
            .collect();
        Ok(Self {
            kind,
            query,
            patterns,
        })
    }

    /// Which query this is.
    #[must_use]
    pub const fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Number of patterns in the query.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub(crate) fn settings(&self, pattern_index: usize) -> &PatternSettings {
        self.patterns.get(pattern_index).unwrap_or(&EMPTY_SETTINGS)
    }

    /// Runs the query under `node`, returning captures in buffer order.
    ///
    /// `range`, when given, limits matches to nodes intersecting it.
    pub(crate) fn captures<'tree>(
        &self,
        node: Node<'tree>,
        text: &str,
        range: Option<BufferRange>,
    ) -> Vec<Capture<'tree, '_>> {
        let mut cursor = QueryCursor::new();
        if let Some(window) = range {
            cursor.set_point_range(window.start..window.end);
        }
        let names = self.query.capture_names();
        let mut captures = Vec::new();
        let mut matches = cursor.captures(&self.query, node, text.as_bytes());
        while let Some((found, index)) = matches.next() {
            let Some(capture) = found.captures.get(*index) else {
                continue;
            };
            let Some(name) = usize::try_from(capture.index)
                .ok()
                .and_then(|i| names.get(i))
            else {
                continue;
            };
            captures.push(Capture {
                node: capture.node,
                name,
                settings: self.settings(found.pattern_index),
            });
        }
        captures
    }
}

/// A language together with its queries and injection points.
pub struct Grammar {
    language: SupportedLanguage,
    scope_name: String,
    injection_regex: Option<Regex>,
    highlights: Option<CompiledQuery>,
    folds: Option<CompiledQuery>,
    indents: Option<CompiledQuery>,
    locals: Option<CompiledQuery>,
    injection_points: Vec<Arc<InjectionPoint>>,
    load_errors: Vec<SyntaxError>,
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("language", &self.language)
            .field("scope_name", &self.scope_name)
            .field("injection_points", &self.injection_points.len())
            .field("load_errors", &self.load_errors)
            .finish_non_exhaustive()
    }
}

impl Grammar {
    /// Starts building a grammar for `language`.
    #[must_use]
    pub fn builder(language: SupportedLanguage) -> GrammarBuilder {
        GrammarBuilder::new(language)
    }

    /// The Tree-sitter language this grammar parses.
    #[must_use]
    pub const fn language(&self) -> SupportedLanguage {
        self.language
    }

    /// The base scope name, for example `source.js`.
    #[must_use]
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Returns the compiled query of `kind`, if it exists and compiled.
    #[must_use]
    pub const fn query(&self, kind: QueryKind) -> Option<&CompiledQuery> {
        match kind {
            QueryKind::Highlights => self.highlights.as_ref(),
            QueryKind::Folds => self.folds.as_ref(),
            QueryKind::Indents => self.indents.as_ref(),
            QueryKind::Locals => self.locals.as_ref(),
        }
    }

    /// Errors encountered while compiling the grammar's queries.
    #[must_use]
    pub fn load_errors(&self) -> &[SyntaxError] {
        &self.load_errors
    }

    /// Whether any injection point is registered.
    #[must_use]
    pub fn has_injection_points(&self) -> bool {
        !self.injection_points.is_empty()
    }

    /// Injection points registered for nodes of `kind`.
    pub(crate) fn injection_points_for<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a Arc<InjectionPoint>> + 'a {
        self.injection_points
            .iter()
            .filter(move |point| point.node_type() == kind)
    }

    /// Length of the injection regex match against `language`, if any.
    fn injection_match_len(&self, language: &str) -> Option<usize> {
        self.injection_regex
            .as_ref()?
            .find(language)
            .map(|found| found.len())
    }

    /// Whether `language` names this grammar without a regex.
    fn names_language(&self, language: &str) -> bool {
        language.eq_ignore_ascii_case(self.language.as_str()) || language == self.scope_name
    }
}

/// Builder for [`Grammar`].
#[derive(Debug)]
pub struct GrammarBuilder {
    language: SupportedLanguage,
    scope_name: String,
    injection_regex: Option<String>,
    sources: Vec<(QueryKind, String)>,
    injection_points: Vec<InjectionPoint>,
}

impl GrammarBuilder {
    /// Creates a builder with the language's default scope name.
    #[must_use]
    pub fn new(language: SupportedLanguage) -> Self {
        Self {
            language,
            scope_name: language.default_scope_name().to_owned(),
            injection_regex: None,
            sources: Vec::new(),
            injection_points: Vec::new(),
        }
    }

    /// Overrides the base scope name.
    #[must_use]
    pub fn scope_name(mut self, scope_name: impl Into<String>) -> Self {
        self.scope_name = scope_name.into();
        self
    }

    /// Sets the regex that language strings of injections are matched
    /// against.
    #[must_use]
    pub fn injection_regex(mut self, pattern: impl Into<String>) -> Self {
        self.injection_regex = Some(pattern.into());
        self
    }

    /// Supplies the source of one of the grammar's queries.
    #[must_use]
    pub fn query(mut self, kind: QueryKind, source: impl Into<String>) -> Self {
        self.sources.retain(|(existing, _)| *existing != kind);
        self.sources.push((kind, source.into()));
        self
    }

    /// Shorthand for `query(QueryKind::Highlights, source)`.
    #[must_use]
    pub fn highlights_query(self, source: impl Into<String>) -> Self {
        self.query(QueryKind::Highlights, source)
    }

    /// Shorthand for `query(QueryKind::Folds, source)`.
    #[must_use]
    pub fn folds_query(self, source: impl Into<String>) -> Self {
        self.query(QueryKind::Folds, source)
    }

    /// Shorthand for `query(QueryKind::Indents, source)`.
    #[must_use]
    pub fn indents_query(self, source: impl Into<String>) -> Self {
        self.query(QueryKind::Indents, source)
    }

    /// Shorthand for `query(QueryKind::Locals, source)`.
    #[must_use]
    pub fn locals_query(self, source: impl Into<String>) -> Self {
        self.query(QueryKind::Locals, source)
    }

    /// Registers an injection point.
    #[must_use]
    pub fn injection_point(mut self, point: InjectionPoint) -> Self {
        self.injection_points.push(point);
        self
    }

    /// Compiles every query and produces the grammar.
    #[must_use]
    pub fn build(self) -> Grammar {
        let mut grammar = Grammar {
            language: self.language,
            scope_name: self.scope_name,
            injection_regex: None,
            highlights: None,
            folds: None,
            indents: None,
            locals: None,
            injection_points: self.injection_points.into_iter().map(Arc::new).collect(),
            load_errors: Vec::new(),
        };

        if let Some(pattern) = self.injection_regex {
            match Regex::new(&pattern) {
                Ok(regex) => grammar.injection_regex = Some(regex),
                Err(e) => {
                    let error = SyntaxError::injection_regex(&grammar.scope_name, e.to_string());
                    tracing::warn!(target: LOG_TARGET, %error, "ignoring injection regex");
                    grammar.load_errors.push(error);
                }
            }
        }

        for (kind, source) in self.sources {
            match CompiledQuery::new(self.language, kind, &source) {
                Ok(query) => match kind {
                    QueryKind::Highlights => grammar.highlights = Some(query),
                    QueryKind::Folds => grammar.folds = Some(query),
                    QueryKind::Indents => grammar.indents = Some(query),
                    QueryKind::Locals => grammar.locals = Some(query),
                },
                Err(error) => {
                    if kind == QueryKind::Highlights {
                        tracing::error!(
                            target: LOG_TARGET,
                            scope = %grammar.scope_name,
                            %error,
                            "highlights query failed to compile; grammar will be plain text"
                        );
                    } else {
                        tracing::warn!(
                            target: LOG_TARGET,
                            scope = %grammar.scope_name,
                            %error,
                            "optional query failed to compile"
                        );
                    }
                    grammar.load_errors.push(error);
                }
            }
        }

        tracing::debug!(
            target: LOG_TARGET,
            scope = %grammar.scope_name,
            errors = grammar.load_errors.len(),
            "built grammar"
        );
        grammar
    }
}

/// The set of grammars available to a language mode.
#[derive(Debug, Clone, Default)]
pub struct GrammarRegistry {
    grammars: Vec<Arc<Grammar>>,
}

impl GrammarRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            grammars: Vec::new(),
        }
    }

    /// Adds `grammar`, replacing any grammar with the same scope name.
    pub fn add_grammar(&mut self, grammar: Grammar) -> Arc<Grammar> {
        let shared = Arc::new(grammar);
        self.grammars
            .retain(|existing| existing.scope_name() != shared.scope_name());
        self.grammars.push(Arc::clone(&shared));
        shared
    }

    /// Looks a grammar up by its base scope name.
    #[must_use]
    pub fn grammar_for_scope_name(&self, scope_name: &str) -> Option<Arc<Grammar>> {
        self.grammars
            .iter()
            .find(|grammar| grammar.scope_name() == scope_name)
            .cloned()
    }

    /// Resolves the language string an injection point produced.
    ///
    /// The grammar whose injection regex matches the longest part of the
    /// string wins. Without any regex match, the string is compared with
    /// each grammar's language name and scope name.
    #[must_use]
    pub fn grammar_for_language_string(&self, language: &str) -> Option<Arc<Grammar>> {
        let mut best: Option<(usize, &Arc<Grammar>)> = None;
        for grammar in &self.grammars {
            if let Some(len) = grammar.injection_match_len(language)
                && best.is_none_or(|(longest, _)| len > longest)
            {
                best = Some((len, grammar));
            }
        }
        best.map(|(_, grammar)| grammar)
            .or_else(|| self.grammars.iter().find(|g| g.names_language(language)))
            .cloned()
    }

    /// Iterates over the registered grammars.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Grammar>> {
        self.grammars.iter()
    }

    /// Number of registered grammars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn compiles_settings_once_per_pattern() {
        let query = CompiledQuery::new(
            SupportedLanguage::JavaScript,
            QueryKind::Highlights,
            "(identifier) @variable\n((comment) @comment (#set! capture.final))",
        )
        .expect("query");

        assert_eq!(query.pattern_count(), 2);
        assert!(!query.settings(0).is_final);
        assert!(query.settings(1).is_final);
        assert_eq!(query.settings(99), &EMPTY_SETTINGS);
    }

    #[test]
    fn broken_highlights_query_leaves_plain_grammar() {
        let grammar = Grammar::builder(SupportedLanguage::JavaScript)
            .highlights_query("(not_a_node) @x")
            .folds_query("(statement_block) @fold")
            .build();

        assert!(grammar.query(QueryKind::Highlights).is_none());
        assert!(grammar.query(QueryKind::Folds).is_some());
        assert!(matches!(
            grammar.load_errors(),
            [SyntaxError::QueryCompileError {
                kind: QueryKind::Highlights,
                ..
            }]
        ));
    }

    #[test]
    fn invalid_injection_regex_is_recorded() {
        let grammar = Grammar::builder(SupportedLanguage::Html)
            .injection_regex("(")
            .build();

        assert!(matches!(
            grammar.load_errors(),
            [SyntaxError::InjectionRegexError { .. }]
        ));
    }

    fn registry() -> GrammarRegistry {
        let mut registry = GrammarRegistry::new();
        registry.add_grammar(
            Grammar::builder(SupportedLanguage::JavaScript)
                .injection_regex("^(js|javascript)$")
                .build(),
        );
        registry.add_grammar(
            Grammar::builder(SupportedLanguage::TypeScript)
                .injection_regex("^(ts|typescript)")
                .build(),
        );
        registry.add_grammar(Grammar::builder(SupportedLanguage::Html).build());
        registry
    }

    #[rstest]
    #[case("js", Some("source.js"))]
    #[case("javascript", Some("source.js"))]
    #[case("typescript", Some("source.ts"))]
    #[case("html", Some("text.html.basic"))]
    #[case("text.html.basic", Some("text.html.basic"))]
    #[case("cobol", None)]
    fn resolves_language_strings(#[case] language: &str, #[case] expected: Option<&str>) {
        let registry = registry();
        let found = registry.grammar_for_language_string(language);
        assert_eq!(found.as_deref().map(Grammar::scope_name), expected);
    }

    #[test]
    fn add_grammar_replaces_same_scope() {
        let mut registry = registry();
        registry.add_grammar(
            Grammar::builder(SupportedLanguage::JavaScript)
                .highlights_query("(identifier) @variable")
                .build(),
        );

        assert_eq!(registry.len(), 3);
        let js = registry
            .grammar_for_scope_name("source.js")
            .expect("javascript grammar");
        assert!(js.query(QueryKind::Highlights).is_some());
    }
}
