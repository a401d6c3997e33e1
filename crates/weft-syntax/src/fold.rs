//! Fold range resolution for one layer.
//!
//! A folds query marks foldable regions in one of two ways:
//!
//! - `@fold` captures a node that folds on its own. The fold runs from the
//!   end of the node's first row to `fold.endAt` (a node path, by default
//!   `lastChild.startPosition`), optionally moved by `fold.offsetEnd`,
//!   `fold.adjustEndColumn`, or `fold.adjustToEndOfPreviousRow`.
//! - `@fold.start` and `@fold.end` mark the two halves of a fold that has no
//!   single enclosing node. The end is the nearest balanced `@fold.end`
//!   after the start, anywhere before the end of the layer.
//!
//! A fold is only reported when it spans more than one row, and never when
//! the node its end is anchored to is missing from the source (a deleted
//! closing delimiter).

use std::cmp::Reverse;
use std::collections::HashSet;

use tree_sitter::{Node, Point};

use crate::buffer::TextBuffer;
use crate::grammar::CompiledQuery;
use crate::range::BufferRange;
use crate::scope::{PatternSettings, ResolveContext, ScopeResolver, resolve_anchor};

const LOG_TARGET: &str = "weft_syntax::fold";

const DEFAULT_END_AT: &str = "lastChild.startPosition";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Edge {
    End,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FoldMark {
    /// A self-contained fold, already resolved.
    Simple(Option<BufferRange>),
    Start { node_id: usize },
    End { node_id: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FoldBoundary {
    position: Point,
    edge: Edge,
    mark: FoldMark,
}

impl FoldBoundary {
    fn simple_end(&self) -> Option<Point> {
        match self.mark {
            FoldMark::Simple(range) => range.map(|range| range.end),
            FoldMark::Start { .. } | FoldMark::End { .. } => None,
        }
    }

    /// Whether `other` marks the same fold edge at the same position.
    fn duplicates(&self, other: &Self) -> bool {
        self.position == other.position
            && match (self.mark, other.mark) {
                (FoldMark::Simple(_), FoldMark::Simple(_)) => true,
                (FoldMark::Start { node_id: a }, FoldMark::Start { node_id: b })
                | (FoldMark::End { node_id: a }, FoldMark::End { node_id: b }) => a == b,
                _ => false,
            }
    }
}

/// What a fold lookup needs from its layer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FoldInput<'a, 'tree> {
    pub(crate) root: Node<'tree>,
    pub(crate) query: &'a CompiledQuery,
    pub(crate) context: ResolveContext<'a>,
    pub(crate) extent: BufferRange,
}

/// Caches fold boundaries for the region last asked about.
#[derive(Debug, Default)]
pub(crate) struct FoldResolver {
    resolver: ScopeResolver,
    boundaries: Vec<FoldBoundary>,
    covered: Option<BufferRange>,
    watched: HashSet<usize>,
}

impl FoldResolver {
    /// Drops cached boundaries; called whenever the tree changes.
    pub(crate) fn reset(&mut self) {
        self.boundaries.clear();
        self.covered = None;
    }

    pub(crate) fn clear_config_cache(&mut self) {
        self.resolver.clear_config_cache();
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<crate::error::SyntaxError> {
        self.resolver.take_diagnostics()
    }

    /// Ids of nodes carrying `fold.invalidateOnChange`.
    pub(crate) const fn watched(&self) -> &HashSet<usize> {
        &self.watched
    }

    pub(crate) fn clear_watched(&mut self) {
        self.watched.clear();
    }

    /// The first valid fold starting on `row`.
    pub(crate) fn fold_range_for_row(
        &mut self,
        input: &FoldInput<'_, '_>,
        row: usize,
    ) -> Option<BufferRange> {
        let start = Point::new(row, 0);
        let end = Point::new(row.saturating_add(1), 0);
        self.ensure_boundaries(input, start, end);
        let candidates: Vec<FoldBoundary> = self
            .boundaries
            .iter()
            .filter(|boundary| boundary.position >= start && boundary.position < end)
            .copied()
            .collect();
        candidates
            .iter()
            .find_map(|boundary| self.resolve(input, boundary))
    }

    /// Every valid fold in the layer, in buffer order.
    pub(crate) fn all_fold_ranges(&mut self, input: &FoldInput<'_, '_>) -> Vec<BufferRange> {
        self.ensure_boundaries(input, input.extent.start, input.extent.end);
        let all = self.boundaries.clone();
        all.iter()
            .filter_map(|boundary| self.resolve(input, boundary))
            .collect()
    }

    fn resolve(&mut self, input: &FoldInput<'_, '_>, boundary: &FoldBoundary) -> Option<BufferRange> {
        let range = match boundary.mark {
            FoldMark::Simple(range) => range,
            FoldMark::Start { node_id } => self.divided_fold(input, boundary.position, node_id),
            FoldMark::End { .. } => None,
        }?;
        (range.end.row > range.start.row).then_some(range)
    }

    fn divided_fold(
        &mut self,
        input: &FoldInput<'_, '_>,
        position: Point,
        start_id: usize,
    ) -> Option<BufferRange> {
        self.ensure_boundaries(input, position, input.extent.end);
        let mut depth = 0_usize;
        let mut matched = None;
        for boundary in self
            .boundaries
            .iter()
            .filter(|boundary| boundary.position >= position && boundary.position <= input.extent.end)
        {
            match boundary.mark {
                FoldMark::End { node_id } if node_id != start_id => {
                    if depth == 0 {
                        matched = Some(boundary.position);
                        break;
                    }
                    depth = depth.saturating_sub(1);
                }
                FoldMark::Start { node_id } if node_id != start_id => {
                    depth = depth.saturating_add(1);
                }
                _ => {}
            }
        }
        let buffer = input.context.buffer;
        let end = divided_end(buffer, matched?)?;
        Some(BufferRange {
            start: end_of_row(buffer, position.row),
            end,
        })
    }

    fn ensure_boundaries(&mut self, input: &FoldInput<'_, '_>, start: Point, end: Point) {
        let window = BufferRange { start, end };
        if self
            .covered
            .is_some_and(|covered| covered.contains_range(&window))
        {
            return;
        }

        let buffer = input.context.buffer;
        self.resolver.reset();
        self.boundaries.clear();
        for capture in input.query.captures(input.root, buffer.text(), Some(window)) {
            let node = capture.node;
            // Deleted delimiters linger as zero-width MISSING nodes.
            if node.start_byte() == node.end_byte() {
                continue;
            }
            if self.resolver.accept(&capture, &input.context).is_none() {
                continue;
            }
            if capture.settings.has_property("fold.invalidateOnChange") {
                self.watched.insert(node.id());
            }
            if node.start_position().row < start.row {
                continue;
            }
            let (edge, mark) = match capture.name {
                "fold" => {
                    let Some(range) = simple_fold(node, capture.settings, buffer) else {
                        continue;
                    };
                    (Edge::Start, FoldMark::Simple(Some(range)))
                }
                "fold.start" => (Edge::Start, FoldMark::Start { node_id: node.id() }),
                "fold.end" => (Edge::End, FoldMark::End { node_id: node.id() }),
                _ => continue,
            };
            self.boundaries.push(FoldBoundary {
                position: node.start_position(),
                edge,
                mark,
            });
        }
        self.resolver.reset();
        // Of several folds starting at one point, the outermost is kept.
        self.boundaries.sort_by_key(|boundary| {
            (boundary.position, boundary.edge, Reverse(boundary.simple_end()))
        });
        self.boundaries.dedup_by(|later, kept| kept.duplicates(later));
        self.covered = Some(window);
    }
}

fn end_of_row(buffer: &TextBuffer, row: usize) -> Point {
    Point::new(row, buffer.line_length_for_row(row))
}

/// A `@fold.end` that only has whitespace before it on its row ends the
/// fold on the previous row.
fn divided_end(buffer: &TextBuffer, position: Point) -> Option<Point> {
    let preceding = buffer
        .line_for_row(position.row)
        .and_then(|line| line.get(..position.column))
        .unwrap_or_default();
    if preceding.chars().all(char::is_whitespace) {
        let row = position.row.checked_sub(1)?;
        Some(end_of_row(buffer, row))
    } else {
        Some(position)
    }
}

fn simple_fold(
    node: Node<'_>,
    settings: &PatternSettings,
    buffer: &TextBuffer,
) -> Option<BufferRange> {
    if node.is_error() {
        return None;
    }
    let start = end_of_row(buffer, node.start_position().row);
    let end_at = settings.property("fold.endAt").unwrap_or(DEFAULT_END_AT);
    let Some((anchor, mut end, _)) = resolve_anchor(node, end_at) else {
        tracing::debug!(
            target: LOG_TARGET,
            path = end_at,
            kind = node.kind(),
            "fold end path did not resolve; folding to node end"
        );
        return Some(BufferRange {
            start,
            end: node.end_position(),
        });
    };
    if anchor.is_missing() || anchor.start_byte() == anchor.end_byte() {
        tracing::debug!(
            target: LOG_TARGET,
            path = end_at,
            kind = node.kind(),
            "fold end anchor is missing; not folding"
        );
        return None;
    }

    for (key, value) in settings.properties_with_prefix("fold.") {
        match key {
            "offsetEnd" => {
                if let Some(delta) = value.and_then(|text| text.parse::<isize>().ok()) {
                    let index = buffer.index_for_position(end);
                    end = buffer.position_for_index(buffer.offset_index_by_chars(index, delta));
                }
            }
            "adjustEndColumn" => {
                if let Some(column) = value.and_then(|text| text.parse::<usize>().ok()) {
                    end = buffer.clip_position(Point::new(end.row, column));
                }
            }
            "adjustToEndOfPreviousRow" => {
                end = end_of_row(buffer, end.row.checked_sub(1)?);
            }
            _ => {}
        }
    }

    let clipped = buffer.clip_position(end);
    (clipped.row > start.row).then_some(BufferRange {
        start,
        end: clipped,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tree_sitter::{Parser, Tree};
    use weft_config::ConfigValues;

    use super::*;
    use crate::grammar::QueryKind;
    use crate::language::SupportedLanguage;

    struct Fixture {
        buffer: TextBuffer,
        tree: Tree,
        query: CompiledQuery,
        config: ConfigValues,
    }

    impl Fixture {
        fn new(source: &str, query: &str) -> Self {
            let buffer = TextBuffer::new(source);
            let mut parser = Parser::new();
            parser
                .set_language(&tree_sitter_javascript::LANGUAGE.into())
                .expect("language");
            let tree = parser.parse(source, None).expect("tree");
            let query = CompiledQuery::new(SupportedLanguage::JavaScript, QueryKind::Folds, query)
                .expect("folds query");
            Self {
                buffer,
                tree,
                query,
                config: ConfigValues::new(),
            }
        }

        fn input(&self) -> FoldInput<'_, '_> {
            FoldInput {
                root: self.tree.root_node(),
                query: &self.query,
                context: ResolveContext {
                    buffer: &self.buffer,
                    depth: 0,
                    config: &self.config,
                    dev_mode: false,
                },
                extent: self.buffer.extent(),
            }
        }
    }

    const BLOCKS: &str = "if (a) {\n  b();\n}\nif (c) {\n  if (d) {\n    e();\n  }\n}\n";

    #[rstest]
    #[case(0, Some(((0, 8), (2, 0))))]
    #[case(1, None)]
    #[case(3, Some(((3, 8), (7, 0))))]
    #[case(4, Some(((4, 10), (6, 2))))]
    fn simple_folds_end_before_last_child(
        #[case] row: usize,
        #[case] expected: Option<((usize, usize), (usize, usize))>,
    ) {
        let fixture = Fixture::new(BLOCKS, "(statement_block) @fold");
        let mut resolver = FoldResolver::default();

        let fold = resolver.fold_range_for_row(&fixture.input(), row);

        assert_eq!(
            fold,
            expected.map(|(start, end)| BufferRange::from_rows(start, end))
        );
    }

    #[test]
    fn end_adjustments_apply_in_order() {
        let fixture = Fixture::new(
            BLOCKS,
            r#"((statement_block) @fold (#set! fold.adjustToEndOfPreviousRow true))"#,
        );
        let mut resolver = FoldResolver::default();

        let fold = resolver.fold_range_for_row(&fixture.input(), 3);

        assert_eq!(fold, Some(BufferRange::from_rows((3, 8), (6, 3))));
    }

    #[test]
    fn divided_folds_balance_nested_starts() {
        let fixture = Fixture::new(BLOCKS, r#""{" @fold.start "}" @fold.end"#);
        let mut resolver = FoldResolver::default();
        let input = fixture.input();

        assert_eq!(
            resolver.fold_range_for_row(&input, 3),
            Some(BufferRange::from_rows((3, 8), (6, 3)))
        );
        assert_eq!(
            resolver.fold_range_for_row(&input, 4),
            Some(BufferRange::from_rows((4, 10), (5, 8)))
        );
    }

    #[test]
    fn single_row_regions_do_not_fold() {
        let fixture = Fixture::new("if (a) { b(); }\n", "(statement_block) @fold");
        let mut resolver = FoldResolver::default();

        assert_eq!(resolver.fold_range_for_row(&fixture.input(), 0), None);
        assert!(resolver.all_fold_ranges(&fixture.input()).is_empty());
    }

    #[test]
    fn all_folds_are_listed_in_order() {
        let fixture = Fixture::new(BLOCKS, "(statement_block) @fold");
        let mut resolver = FoldResolver::default();

        let folds = resolver.all_fold_ranges(&fixture.input());

        assert_eq!(
            folds,
            vec![
                BufferRange::from_rows((0, 8), (2, 0)),
                BufferRange::from_rows((3, 8), (7, 0)),
                BufferRange::from_rows((4, 10), (6, 2)),
            ]
        );
    }

    #[test]
    fn missing_closing_delimiter_does_not_fold() {
        let fixture = Fixture::new("if (a) {\n  b();\n", "(statement_block) @fold");
        let mut resolver = FoldResolver::default();

        assert_eq!(resolver.fold_range_for_row(&fixture.input(), 0), None);
        assert!(resolver.all_fold_ranges(&fixture.input()).is_empty());
    }

    #[rstest]
    #[case("(statement_block) @fold ((statement_block) @fold (#set! fold.adjustToEndOfPreviousRow true))")]
    #[case("((statement_block) @fold (#set! fold.adjustToEndOfPreviousRow true)) (statement_block) @fold")]
    fn outermost_fold_wins_at_a_shared_start(#[case] query: &str) {
        let fixture = Fixture::new("if (a) {\n  b();\n}\n", query);
        let mut resolver = FoldResolver::default();
        let input = fixture.input();

        assert_eq!(
            resolver.fold_range_for_row(&input, 0),
            Some(BufferRange::from_rows((0, 8), (2, 0)))
        );
        assert_eq!(
            resolver.all_fold_ranges(&input),
            vec![BufferRange::from_rows((0, 8), (2, 0))]
        );
    }

    #[test]
    fn invalidate_on_change_nodes_are_watched() {
        let fixture = Fixture::new(
            BLOCKS,
            "((statement_block) @fold (#set! fold.invalidateOnChange true))",
        );
        let mut resolver = FoldResolver::default();

        let _folds = resolver.all_fold_ranges(&fixture.input());

        assert_eq!(resolver.watched().len(), 3);
    }
}
