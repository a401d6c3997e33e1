//! The per-layer scope resolver.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use tree_sitter::{Node, Point, Range};
use weft_config::ConfigValues;

use super::adjust::{self, PatternCache};
use super::predicates::{self, PredicateInput};
use super::settings::{Capture, PatternSettings};
use super::{ScopeId, ScopeRegistry};
use crate::buffer::TextBuffer;
use crate::error::SyntaxError;
use crate::position::describe_point;

const LOG_TARGET: &str = "weft_syntax::scope";

/// Capture name that claims a range without producing a scope.
pub(crate) const IGNORE_NAME: &str = "_IGNORE_";

/// Read-only inputs to a resolution pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolveContext<'a> {
    pub(crate) buffer: &'a TextBuffer,
    pub(crate) depth: usize,
    pub(crate) config: &'a ConfigValues,
    pub(crate) dev_mode: bool,
}

/// Settings recorded against one exact range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ClaimData {
    is_final: bool,
    properties: BTreeMap<String, Option<String>>,
}

impl ClaimData {
    fn merge(&mut self, settings: &PatternSettings) {
        self.is_final |= settings.is_final;
        for (key, value) in &settings.properties {
            self.properties.insert(key.clone(), value.clone());
        }
    }

    /// Whether `key` was recorded, with `expected` as its value if given.
    pub(crate) fn matches(&self, key: &str, expected: Option<&str>) -> bool {
        match (self.properties.get(key), expected) {
            (Some(_), None) => true,
            (Some(stored), Some(wanted)) => stored.as_deref().unwrap_or("true") == wanted,
            (None, _) => false,
        }
    }
}

/// Scope ids opening and closing at one position.
///
/// Root entries belong to the layer's own base scope: they open before and
/// close after everything else at the same position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BoundaryEntry {
    root_opens: Vec<ScopeId>,
    opens: Vec<ScopeId>,
    closes: Vec<ScopeId>,
    root_closes: Vec<ScopeId>,
}

impl BoundaryEntry {
    pub(crate) fn open_ids(&self) -> Vec<ScopeId> {
        self.root_opens.iter().chain(&self.opens).copied().collect()
    }

    pub(crate) fn close_ids(&self) -> Vec<ScopeId> {
        self.closes.iter().chain(&self.root_closes).copied().collect()
    }
}

/// Turns captures into boundaries and arbitrates claims on ranges.
///
/// Boundaries and claims live for one resolution pass and are dropped by
/// [`ScopeResolver::reset`]. The regex and config caches survive resets:
/// the former is cleared only with the resolver, the latter only when the
/// configuration reports a change.
#[derive(Debug, Default)]
pub(crate) struct ScopeResolver {
    boundaries: BTreeMap<Point, BoundaryEntry>,
    claims: HashMap<(usize, usize), ClaimData>,
    patterns: PatternCache,
    config_cache: HashMap<String, bool>,
    diagnostics: Vec<SyntaxError>,
}

impl ScopeResolver {
    /// Forgets boundaries and claims from the previous pass.
    pub(crate) fn reset(&mut self) {
        self.boundaries.clear();
        self.claims.clear();
    }

    /// Drops every cache along with the pass state.
    pub(crate) fn destroy(&mut self) {
        self.reset();
        self.patterns.clear();
        self.config_cache.clear();
    }

    pub(crate) fn clear_config_cache(&mut self) {
        self.config_cache.clear();
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<SyntaxError> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Boundaries in ascending position order.
    pub(crate) fn boundaries(&self) -> impl Iterator<Item = (&Point, &BoundaryEntry)> {
        self.boundaries.iter()
    }

    #[cfg(test)]
    pub(crate) fn claim_data(&self, range: &Range) -> Option<&ClaimData> {
        self.claims.get(&(range.start_byte, range.end_byte))
    }

    /// Computes the range a capture applies to, after adjustments.
    ///
    /// `Ok(None)` means an adjustment could not be satisfied or produced an
    /// empty or inverted range.
    pub(crate) fn determine_range(
        &mut self,
        capture: &Capture<'_, '_>,
        context: &ResolveContext<'_>,
    ) -> Result<Option<Range>, SyntaxError> {
        let node = capture.node;
        let adjustments = &capture.settings.adjustments;
        if adjustments.is_empty() {
            return Ok(Some(node.range()));
        }
        let mut range = node.range();
        for adjustment in adjustments {
            match adjust::apply(adjustment, node, range, context.buffer, &mut self.patterns) {
                Some(adjusted) => range = adjusted,
                None => return Ok(None),
            }
        }
        if range.start_byte < node.start_byte() || range.end_byte > node.end_byte() {
            return Err(SyntaxError::adjustment_out_of_bounds(
                capture.name,
                format!(
                    "{}..{} lies outside {} node {}..{}",
                    describe_point(range.start_point),
                    describe_point(range.end_point),
                    node.kind(),
                    describe_point(node.start_position()),
                    describe_point(node.end_position()),
                ),
            ));
        }
        if range.start_byte > range.end_byte || range.start_point >= range.end_point {
            return Ok(None);
        }
        Ok(Some(range))
    }

    fn test(
        &mut self,
        capture: &Capture<'_, '_>,
        existing: Option<&ClaimData>,
        context: &ResolveContext<'_>,
    ) -> bool {
        if existing.is_some_and(|data| data.is_final) {
            return false;
        }
        if capture.settings.is_shy && existing.is_some() {
            return false;
        }
        let input = PredicateInput {
            node: capture.node,
            existing,
            claims: &self.claims,
            context,
        };
        capture
            .settings
            .tests
            .iter()
            .all(|test| predicates::passes(test, &input, &mut self.config_cache))
    }

    /// Determines the range, runs the tests, and records claim data.
    ///
    /// Does not add boundaries, so fold and indent resolution can reuse
    /// the predicate vocabulary. Returns the accepted range.
    pub(crate) fn accept(
        &mut self,
        capture: &Capture<'_, '_>,
        context: &ResolveContext<'_>,
    ) -> Option<Range> {
        let range = match self.determine_range(capture, context) {
            Ok(range) => range?,
            Err(error) => {
                if context.dev_mode {
                    tracing::error!(target: LOG_TARGET, %error, "rejecting capture");
                    self.diagnostics.push(error);
                } else {
                    tracing::debug!(target: LOG_TARGET, %error, "rejecting capture");
                }
                return None;
            }
        };
        let key = (range.start_byte, range.end_byte);
        let existing = self.claims.get(&key).cloned();
        if !self.test(capture, existing.as_ref(), context) {
            return None;
        }
        self.claims.entry(key).or_default().merge(capture.settings);
        Some(range)
    }

    /// Resolves a highlighting capture into an open/close boundary pair.
    pub(crate) fn store(
        &mut self,
        capture: &Capture<'_, '_>,
        context: &ResolveContext<'_>,
        scopes: &mut ScopeRegistry,
    ) -> Option<Range> {
        let range = self.accept(capture, context)?;
        let name = interpolate_name(capture.name, capture.node, context.buffer);
        if name == IGNORE_NAME {
            return None;
        }
        let id = scopes.id_for_scope(&name);
        self.boundaries
            .entry(range.start_point)
            .or_default()
            .opens
            .push(id);
        self.boundaries
            .entry(range.end_point)
            .or_default()
            .closes
            .insert(0, id);
        Some(range)
    }

    /// Adds the layer's base scopes over `[start, end]`.
    pub(crate) fn open_root(&mut self, point: Point, ids: &[ScopeId]) {
        self.boundaries
            .entry(point)
            .or_default()
            .root_opens
            .extend_from_slice(ids);
    }

    pub(crate) fn close_root(&mut self, point: Point, ids: &[ScopeId]) {
        self.boundaries
            .entry(point)
            .or_default()
            .root_closes
            .extend(ids.iter().rev());
    }
}

/// Expands `_TEXT_` and `_TYPE_` in a capture name.
fn interpolate_name<'n>(name: &'n str, node: Node<'_>, buffer: &TextBuffer) -> Cow<'n, str> {
    if !name.contains("_TEXT_") && !name.contains("_TYPE_") {
        return Cow::Borrowed(name);
    }
    let mut expanded = name.to_owned();
    let text = buffer.text_between(node.start_byte(), node.end_byte());
    if !text.contains(char::is_whitespace) {
        expanded = expanded.replace("_TEXT_", text);
    }
    Cow::Owned(expanded.replace("_TYPE_", node.kind()))
}

#[cfg(test)]
mod tests {
    use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator, Tree};

    use super::*;
    use crate::scope::settings::settings_for_pattern;

    struct Fixture {
        buffer: TextBuffer,
        tree: Tree,
        query: Query,
        settings: Vec<PatternSettings>,
        config: ConfigValues,
    }

    impl Fixture {
        fn new(source: &str, query_source: &str) -> Self {
            let buffer = TextBuffer::new(source);
            let language: tree_sitter::Language = tree_sitter_javascript::LANGUAGE.into();
            let mut parser = Parser::new();
            parser.set_language(&language).expect("language");
            let tree = parser.parse(buffer.text(), None).expect("tree");
            let query = Query::new(&language, query_source).expect("query");
            let settings = (0..query.pattern_count())
                .map(|index| settings_for_pattern(&query, index))
                .collect();
            Self {
                buffer,
                tree,
                query,
                settings,
                config: ConfigValues::new(),
            }
        }

        fn context(&self) -> ResolveContext<'_> {
            ResolveContext {
                buffer: &self.buffer,
                depth: 0,
                config: &self.config,
                dev_mode: true,
            }
        }

        /// Stores every capture, returning (name, accepted range).
        fn run(&self, resolver: &mut ScopeResolver) -> Vec<(String, Option<(usize, usize)>)> {
            let mut scopes = ScopeRegistry::new();
            let mut cursor = QueryCursor::new();
            let names = self.query.capture_names();
            let mut captures = cursor.captures(
                &self.query,
                self.tree.root_node(),
                self.buffer.text().as_bytes(),
            );
            let mut results = Vec::new();
            while let Some((found, index)) = captures.next() {
                let Some(raw) = found.captures.get(*index) else {
                    continue;
                };
                let name = names
                    .get(usize::try_from(raw.index).expect("index"))
                    .copied()
                    .expect("name");
                let capture = Capture {
                    node: raw.node,
                    name,
                    settings: self.settings.get(found.pattern_index).expect("settings"),
                };
                let stored = resolver
                    .store(&capture, &self.context(), &mut scopes)
                    .map(|range| (range.start_byte, range.end_byte));
                results.push((name.to_owned(), stored));
            }
            results
        }
    }

    #[test]
    fn unadjusted_capture_keeps_native_range() {
        let fixture = Fixture::new("let answer = 42;", "(identifier) @variable");
        let mut resolver = ScopeResolver::default();
        assert_eq!(
            fixture.run(&mut resolver),
            vec![("variable".to_owned(), Some((4, 10)))]
        );
    }

    #[test]
    fn final_claim_rejects_later_rivals() {
        let fixture = Fixture::new(
            "a;",
            r#"
            ((identifier) @first (#set! capture.final))
            ((identifier) @second)
            ((identifier) @third (#set! capture.final))
            "#,
        );
        let mut resolver = ScopeResolver::default();
        let results = fixture.run(&mut resolver);
        assert_eq!(
            results,
            vec![
                ("first".to_owned(), Some((0, 1))),
                ("second".to_owned(), None),
                ("third".to_owned(), None),
            ]
        );
    }

    #[test]
    fn shy_capture_yields_to_earlier_claim() {
        let fixture = Fixture::new(
            "a;",
            r#"
            ((identifier) @first (#set! capture.shy))
            ((identifier) @second (#set! capture.shy))
            ((identifier) @third)
            "#,
        );
        let mut resolver = ScopeResolver::default();
        let results = fixture.run(&mut resolver);
        assert_eq!(
            results,
            vec![
                ("first".to_owned(), Some((0, 1))),
                ("second".to_owned(), None),
                ("third".to_owned(), Some((0, 1))),
            ]
        );
    }

    #[test]
    fn ignored_capture_claims_without_boundary() {
        let fixture = Fixture::new(
            "a;",
            r#"
            ((identifier) @_IGNORE_ (#set! capture.final))
            ((identifier) @variable)
            "#,
        );
        let mut resolver = ScopeResolver::default();
        let results = fixture.run(&mut resolver);
        assert_eq!(results, vec![("_IGNORE_".to_owned(), None), ("variable".to_owned(), None)]);
        assert_eq!(resolver.boundaries().count(), 0);
        let claimed = resolver.claim_data(&Range {
            start_byte: 0,
            end_byte: 1,
            start_point: Point::new(0, 0),
            end_point: Point::new(0, 1),
        });
        assert!(claimed.is_some_and(|data| data.matches("capture.final", None)));
    }

    #[test]
    fn adjustment_escaping_node_is_diagnosed() {
        let fixture = Fixture::new(
            "ab;",
            r#"((identifier) @wide (#set! adjust.offsetEnd "2"))"#,
        );
        let mut resolver = ScopeResolver::default();
        assert_eq!(fixture.run(&mut resolver), vec![("wide".to_owned(), None)]);
        let diagnostics = resolver.take_diagnostics();
        assert!(matches!(
            diagnostics.as_slice(),
            [SyntaxError::AdjustmentOutOfBounds { capture, .. }] if capture == "wide"
        ));
    }

    #[test]
    fn name_placeholders_expand() {
        let fixture = Fixture::new("a + b;", "(identifier) @v");
        let operator = fixture
            .tree
            .root_node()
            .descendant_for_byte_range(2, 3)
            .expect("operator");
        assert_eq!(
            interpolate_name("keyword._TEXT_._TYPE_", operator, &fixture.buffer),
            "keyword.+.+"
        );
        assert!(matches!(
            interpolate_name("plain", operator, &fixture.buffer),
            Cow::Borrowed("plain")
        ));
    }

    #[test]
    fn text_placeholder_skipped_for_whitespace() {
        let fixture = Fixture::new("'a b';", "(string) @s");
        let node = fixture
            .tree
            .root_node()
            .descendant_for_byte_range(0, 5)
            .expect("string");
        assert_eq!(
            interpolate_name("string._TEXT_", node, &fixture.buffer),
            "string._TEXT_"
        );
    }

    #[test]
    fn boundaries_nest_inner_closes_first() {
        let fixture = Fixture::new(
            "f(x);",
            "(call_expression) @call (arguments) @args (identifier) @id",
        );
        let mut resolver = ScopeResolver::default();
        let stored = fixture.run(&mut resolver);
        assert_eq!(stored.len(), 4);
        let table: Vec<_> = resolver
            .boundaries()
            .map(|(point, entry)| (point.column, entry.open_ids().len(), entry.close_ids().len()))
            .collect();
        assert_eq!(table, vec![(0, 2, 0), (1, 1, 1), (2, 1, 0), (3, 0, 1), (4, 0, 2)]);
    }

    #[test]
    fn root_boundaries_wrap_capture_boundaries() {
        let mut resolver = ScopeResolver::default();
        let mut scopes = ScopeRegistry::new();
        let base = scopes.id_for_scope("source.js");
        let inner = scopes.id_for_scope("comment");
        resolver
            .boundaries
            .entry(Point::new(0, 0))
            .or_default()
            .opens
            .push(inner);
        resolver
            .boundaries
            .entry(Point::new(0, 4))
            .or_default()
            .closes
            .push(inner);
        resolver.open_root(Point::new(0, 0), &[base]);
        resolver.close_root(Point::new(0, 4), &[base]);

        let entries: Vec<_> = resolver.boundaries().map(|(_, entry)| entry.clone()).collect();
        assert_eq!(entries.first().map(BoundaryEntry::open_ids), Some(vec![base, inner]));
        assert_eq!(entries.last().map(BoundaryEntry::close_ids), Some(vec![inner, base]));
    }
}
