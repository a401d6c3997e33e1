//! The language mode: a buffer, its layer tree and every query against it.
//!
//! [`LanguageMode`] owns the text and the root language layer. Edits are
//! applied with [`LanguageMode::edit`] (or reported through
//! [`LanguageMode::buffer_did_change`] when the caller edits the buffer
//! itself) and folded into the syntax trees by
//! [`LanguageMode::finish_transaction`]. Invalidation is reported as
//! [`ChangeNotice`] values drained with [`LanguageMode::take_notices`].
//!
//! Everything runs on the caller's thread; a transaction completes before
//! `finish_transaction` returns.

use std::cmp::Ordering;
use std::mem;
use std::sync::Arc;

use serde_json::Value;
use tree_sitter::{Node, Point, Tree};
use weft_config::Config;

use crate::buffer::{EditDescriptor, TextBuffer};
use crate::error::SyntaxError;
use crate::grammar::{Grammar, GrammarRegistry, QueryKind};
use crate::indent::{IndentInput, RowIndent, indent_delta, indent_level_for_line, row_indent};
use crate::iterator::{HighlightIterator, LayerHighlightIterator, OpenScopes};
use crate::layer::{Environment, LanguageLayer, UpdateContext, extend_edited_range};
use crate::locals::{definition_for, references_at};
use crate::parser::has_error_nodes;
use crate::range::BufferRange;
use crate::scope::{ScopeId, ScopeRegistry};

const LOG_TARGET: &str = "weft_syntax::mode";

/// Something consumers may need to redraw or recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeNotice {
    /// Highlighting changed inside the range.
    Highlighting(BufferRange),
    /// Fold ranges changed inside the range.
    Folds(BufferRange),
}

/// A snapshot of one language layer, as seen from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    /// Scope name of the layer's grammar.
    pub scope_name: String,
    /// Nesting depth; the root layer is 0.
    pub depth: usize,
    /// Extent of the layer's content.
    pub extent: BufferRange,
    /// Whether the layer's tree contains error or missing nodes.
    pub has_errors: bool,
}

/// What a finished transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSummary {
    /// Edits folded into the transaction.
    pub change_count: usize,
    /// The post-edit region touched by those edits.
    pub edited_range: Option<BufferRange>,
}

/// Identifies a layer across borrows: its depth and injection marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayerKey {
    depth: usize,
    marker: Option<BufferRange>,
}

impl LayerKey {
    const fn of(layer: &LanguageLayer) -> Self {
        Self {
            depth: layer.depth(),
            marker: layer.marker(),
        }
    }
}

/// Multi-layer syntax state for one buffer.
#[derive(Debug)]
pub struct LanguageMode {
    buffer: TextBuffer,
    grammars: GrammarRegistry,
    scopes: ScopeRegistry,
    config: Config,
    root: LanguageLayer,
    notices: Vec<ChangeNotice>,
    change_count: usize,
    edited_range: Option<BufferRange>,
    foldable_rows: Vec<Option<bool>>,
}

impl LanguageMode {
    /// Parses `buffer` with the grammar registered under `root_scope` and
    /// populates its injections.
    ///
    /// # Errors
    ///
    /// Returns [`SyntaxError::UnknownGrammar`] when no grammar carries
    /// `root_scope`, or a parser error when the root cannot be parsed.
    pub fn new(
        buffer: TextBuffer,
        grammars: GrammarRegistry,
        root_scope: &str,
        config: Config,
    ) -> Result<Self, SyntaxError> {
        let grammar = grammars
            .grammar_for_scope_name(root_scope)
            .ok_or_else(|| SyntaxError::unknown_grammar(root_scope))?;
        let root = LanguageLayer::root(grammar)?;
        let mut mode = Self {
            buffer,
            grammars,
            scopes: ScopeRegistry::new(),
            config,
            root,
            notices: Vec::new(),
            change_count: 0,
            edited_range: None,
            foldable_rows: Vec::new(),
        };
        let mut cx = UpdateContext {
            buffer: &mode.buffer,
            grammars: &mode.grammars,
            notices: &mut mode.notices,
        };
        mode.root.update(&mut cx, None)?;
        tracing::debug!(
            target: LOG_TARGET,
            scope = root_scope,
            rows = mode.buffer.line_count(),
            "language mode ready"
        );
        Ok(mode)
    }

    /// The buffer being highlighted.
    #[must_use]
    pub const fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    /// Grammars available for injections.
    #[must_use]
    pub const fn grammars(&self) -> &GrammarRegistry {
        &self.grammars
    }

    /// Names behind the [`ScopeId`] values handed out by highlighting.
    #[must_use]
    pub const fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Scope name of the root grammar.
    #[must_use]
    pub fn root_scope_name(&self) -> &str {
        self.root.grammar().scope_name()
    }

    /// Replaces `range` with `text` and records the edit.
    ///
    /// The trees are not re-parsed until [`Self::finish_transaction`].
    pub fn edit(&mut self, range: BufferRange, text: &str) -> EditDescriptor {
        let edit = self.buffer.set_text_in_range(range, text);
        self.buffer_did_change(&edit);
        edit
    }

    /// Records an edit already applied to the buffer.
    pub fn buffer_did_change(&mut self, edit: &EditDescriptor) {
        self.root.handle_edit(edit);
        self.change_count = self.change_count.saturating_add(1);
        self.edited_range = Some(extend_edited_range(self.edited_range, &edit.input_edit()));
        self.splice_foldable_rows(edit);
    }

    /// Re-parses dirty layers and refreshes injections.
    ///
    /// A failing root parse is logged and leaves the old trees in place.
    pub fn finish_transaction(&mut self) -> TransactionSummary {
        let mut cx = UpdateContext {
            buffer: &self.buffer,
            grammars: &self.grammars,
            notices: &mut self.notices,
        };
        if let Err(error) = self.root.update(&mut cx, None) {
            tracing::error!(target: LOG_TARGET, %error, "root layer update failed");
        }
        self.foldable_rows.clear();
        let summary = TransactionSummary {
            change_count: mem::take(&mut self.change_count),
            edited_range: self.edited_range.take(),
        };
        tracing::debug!(
            target: LOG_TARGET,
            changes = summary.change_count,
            notices = self.notices.len(),
            "transaction finished"
        );
        summary
    }

    /// Drains pending change notices, oldest first.
    pub fn take_notices(&mut self) -> Vec<ChangeNotice> {
        mem::take(&mut self.notices)
    }

    /// Registers `grammar` and re-runs injection population everywhere, so
    /// injections waiting on it come alive.
    pub fn add_grammar(&mut self, grammar: Grammar) -> Arc<Grammar> {
        let shared = self.grammars.add_grammar(grammar);
        let mut cx = UpdateContext {
            buffer: &self.buffer,
            grammars: &self.grammars,
            notices: &mut self.notices,
        };
        self.root.repopulate_all(&mut cx);
        shared
    }

    /// Sets a `test.config` value and drops every cached predicate result.
    pub fn set_config_value(&mut self, key: &str, value: Value) {
        self.config.values_mut().set(key, value);
        self.root.visit_mut(&mut LanguageLayer::clear_config_caches);
        self.foldable_rows.clear();
        self.notices
            .push(ChangeNotice::Highlighting(self.buffer.extent()));
    }

    /// Drains grammar authoring problems found while resolving captures.
    pub fn take_diagnostics(&mut self) -> Vec<SyntaxError> {
        let mut diagnostics = Vec::new();
        self.root
            .visit_mut(&mut |layer| diagnostics.extend(layer.take_diagnostics()));
        diagnostics
    }

    /// A fresh iterator; call [`HighlightIterator::seek`] before reading it.
    #[must_use]
    pub const fn build_highlight_iterator(&self) -> HighlightIterator {
        HighlightIterator::new()
    }

    /// Per-layer iterators and already-open scopes for a seek, shallowest
    /// layer first.
    pub(crate) fn seek_layers(
        &mut self,
        start: Point,
        end_row: usize,
    ) -> Vec<(LayerHighlightIterator, OpenScopes)> {
        let limit = self.config.line_length_limit();
        if start.column > limit || self.buffer.line_length_for_row(end_row) > limit {
            return Vec::new();
        }
        let region = BufferRange::new(start, Point::new(end_row.saturating_add(1), 0));
        if self.root.is_dirty() {
            self.notices.push(ChangeNotice::Highlighting(region));
        }

        let env = Environment {
            buffer: &self.buffer,
            config: &self.config,
        };
        let scopes = &mut self.scopes;
        let mut layers = Vec::new();
        self.root.visit_mut(&mut |layer| {
            let extent = layer.extent(env.buffer);
            if !extent.intersects(&region) {
                return;
            }
            let row_end = Point::new(end_row, env.buffer.line_length_for_row(end_row));
            let end = extent.end.min(row_end);
            let base = layer.base_scope_ids(env.buffer, scopes).first().copied();
            let (boundaries, open) = layer.syntax_boundaries(&env, scopes, start, end);
            let iterator = LayerHighlightIterator::new(
                layer.depth(),
                layer.covers_shallower_scopes(),
                base,
                layer.content_ranges(),
                boundaries,
            );
            layers.push((iterator, open));
        });
        layers.sort_by_key(|(iterator, _)| iterator.depth());
        layers
    }

    /// Scope names applying at `point`, outermost first, always starting
    /// with the root grammar's scope.
    pub fn scope_descriptor_for_position(&mut self, point: Point) -> Vec<String> {
        let at = self.normalize_point(point);
        let ids = self.scope_ids_at(at);
        let mut names = self.scopes.names_for(&ids);
        self.prepend_root_scope(&mut names);
        names
    }

    fn scope_ids_at(&mut self, point: Point) -> Vec<ScopeId> {
        let mut iterator = self.build_highlight_iterator();
        let mut ids = iterator.seek(self, point, point.row.saturating_add(1));
        while iterator.position() == Some(point) {
            ids.extend(iterator.open_scope_ids());
            for id in iterator.close_scope_ids() {
                if let Some(index) = ids.iter().rposition(|open| *open == id) {
                    ids.remove(index);
                }
            }
            iterator.move_to_successor();
        }
        ids
    }

    /// Node types enclosing `point`, across layers, outermost first.
    ///
    /// Anonymous nodes are quoted.
    pub fn syntax_tree_scope_descriptor_for_position(&mut self, point: Point) -> Vec<String> {
        let at = self.normalize_point(point);
        self.refresh_trees();
        let index = self.buffer.index_for_position(at);
        let mut found: Vec<(usize, usize, usize, String)> = Vec::new();
        for layer in self.layers_at_point(at, false) {
            let Some(tree) = layer.tree() else {
                continue;
            };
            let mut node = tree.root_node().descendant_for_byte_range(index, index);
            while let Some(current) = node {
                let kind = if current.is_named() {
                    current.kind().to_owned()
                } else {
                    format!("\"{}\"", current.kind())
                };
                found.push((current.start_byte(), current.end_byte(), layer.depth(), kind));
                node = current.parent();
            }
        }
        found.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        let mut names: Vec<String> = found.into_iter().map(|(_, _, _, kind)| kind).collect();
        self.prepend_root_scope(&mut names);
        names
    }

    /// The smallest range around `point` carrying a scope that matches
    /// `selector`.
    ///
    /// A selector equal to a layer's grammar scope yields that layer's
    /// extent. Otherwise `selector` is a dotted list of parts that must all
    /// appear in the scope name, so `string` matches `string.quoted`.
    pub fn buffer_range_for_scope_at_position(
        &mut self,
        selector: &str,
        point: Point,
    ) -> Option<BufferRange> {
        let at = self.normalize_point(point);
        let descriptor = self.scope_descriptor_for_position(at);
        let env = Environment {
            buffer: &self.buffer,
            config: &self.config,
        };
        let scopes = &mut self.scopes;
        let mut layer_extent = None;
        let mut candidates: Vec<(usize, String, BufferRange)> = Vec::new();
        self.root.visit_mut(&mut |layer| {
            if layer_extent.is_some() || !layer.marker().is_none_or(|m| m.contains_point(at)) {
                return;
            }
            if layer.grammar().scope_name() == selector {
                layer_extent = Some(layer.extent(env.buffer));
                return;
            }
            for (name, range) in layer.scope_map_at(&env, scopes, at) {
                if descriptor.contains(&name) {
                    let size = env
                        .buffer
                        .index_for_position(range.end)
                        .saturating_sub(env.buffer.index_for_position(range.start));
                    candidates.push((size, name, range));
                }
            }
        });
        if layer_extent.is_some() {
            return layer_extent;
        }
        candidates.sort_by_key(|(size, _, _)| *size);
        candidates
            .into_iter()
            .find(|(_, name, _)| selector_matches(selector, name))
            .map(|(_, _, range)| range)
    }

    /// The smallest node at `point` accepted by `predicate`, across layers.
    pub fn syntax_node_at_position(
        &mut self,
        point: Point,
        predicate: impl Fn(Node<'_>, &Grammar) -> bool,
    ) -> Option<Node<'_>> {
        self.syntax_node_containing_range(BufferRange::new(point, point), predicate)
    }

    /// The smallest node containing `range` accepted by `predicate`.
    ///
    /// Each layer whose extent holds the range is searched upwards from its
    /// deepest node covering the range; on a tie in size the shallower
    /// layer's node wins.
    pub fn syntax_node_containing_range(
        &mut self,
        range: BufferRange,
        predicate: impl Fn(Node<'_>, &Grammar) -> bool,
    ) -> Option<Node<'_>> {
        self.refresh_trees();
        let buffer = &self.buffer;
        let start = buffer.index_for_position(range.start);
        let end = buffer.index_for_position(range.end);
        let search_end = end.saturating_sub(1).max(start);
        let mut smallest: Option<Node<'_>> = None;
        self.root.visit(&mut |layer| {
            if layer.depth() > 0 && !layer.extent(buffer).contains_range(&range) {
                return;
            }
            let Some(tree) = layer.tree() else {
                return;
            };
            let mut node = tree.root_node().descendant_for_byte_range(start, search_end);
            while let Some(current) = node {
                if current.start_byte() <= start
                    && current.end_byte() >= end
                    && predicate(current, layer.grammar())
                {
                    let size = current.end_byte().saturating_sub(current.start_byte());
                    if smallest.is_none_or(|best| {
                        size < best.end_byte().saturating_sub(best.start_byte())
                    }) {
                        smallest = Some(current);
                    }
                    break;
                }
                node = current.parent();
            }
        });
        smallest
    }

    /// Layers whose marker holds `point`, root first, then by position and
    /// depth.
    ///
    /// With `exact`, a layer must also hold `point` in one of its included
    /// ranges.
    #[must_use]
    pub fn language_layers_at_point(&self, point: Point, exact: bool) -> Vec<LayerSummary> {
        self.layers_at_point(point, exact)
            .into_iter()
            .map(|layer| self.summarize(layer))
            .collect()
    }

    /// The deepest layer at `point` accepted by `predicate`.
    #[must_use]
    pub fn controlling_layer_at_point(
        &self,
        point: Point,
        predicate: impl Fn(&LayerSummary) -> bool,
    ) -> Option<LayerSummary> {
        self.language_layers_at_point(point, true)
            .into_iter()
            .filter(|summary| predicate(summary))
            .rev()
            .max_by_key(|summary| summary.depth)
    }

    /// The fold starting on `row`, taken from the deepest layer that has
    /// one.
    pub fn fold_range_for_row(&mut self, row: usize) -> Option<BufferRange> {
        let point = Point::new(row, self.buffer.line_length_for_row(row));
        let env = Environment {
            buffer: &self.buffer,
            config: &self.config,
        };
        let mut best: Option<(usize, BufferRange)> = None;
        self.root.visit_mut(&mut |layer| {
            if !layer.marker().is_none_or(|m| m.contains_point(point)) {
                return;
            }
            if let Some(fold) = layer.fold_range_for_row(&env, row)
                && best.is_none_or(|(depth, _)| layer.depth() > depth)
            {
                best = Some((layer.depth(), fold));
            }
        });
        best.map(|(_, fold)| fold)
    }

    /// Every fold in every layer, in buffer order without duplicates.
    pub fn all_fold_ranges(&mut self) -> Vec<BufferRange> {
        let env = Environment {
            buffer: &self.buffer,
            config: &self.config,
        };
        let mut folds = Vec::new();
        self.root
            .visit_mut(&mut |layer| folds.extend(layer.all_fold_ranges(&env)));
        folds.sort_by(BufferRange::compare);
        folds.dedup();
        folds
    }

    /// The innermost fold containing `point`.
    ///
    /// A point at or past the end of its line first tries the fold starting
    /// on that row.
    pub fn foldable_range_containing_point(&mut self, point: Point) -> Option<BufferRange> {
        if point.column >= self.buffer.line_length_for_row(point.row)
            && let Some(fold) = self.fold_range_for_row(point.row)
        {
            return Some(fold);
        }
        let mut row = point.row;
        while let Some(previous) = row.checked_sub(1) {
            row = previous;
            if let Some(fold) = self.fold_range_for_row(row)
                && fold.end >= point
            {
                return Some(fold);
            }
        }
        None
    }

    /// Folds nested exactly `level` folds deep, in buffer order.
    pub fn foldable_ranges_at_indent_level(&mut self, level: usize) -> Vec<BufferRange> {
        let mut events: Vec<(Point, bool, BufferRange)> = Vec::new();
        for fold in self.all_fold_ranges() {
            events.push((fold.start, true, fold));
            events.push((fold.end, false, fold));
        }
        events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut depth: usize = 0;
        let mut result = Vec::new();
        for (_, opens, fold) in events {
            if opens {
                if depth == level {
                    result.push(fold);
                }
                depth = depth.saturating_add(1);
            } else {
                depth = depth.saturating_sub(1);
            }
        }
        result
    }

    /// Whether a fold starts on `row`. Answers are cached until the next
    /// transaction.
    pub fn is_foldable_at_row(&mut self, row: usize) -> bool {
        if let Some(Some(cached)) = self.foldable_rows.get(row) {
            return *cached;
        }
        let foldable = self.fold_range_for_row(row).is_some();
        if self.foldable_rows.len() <= row {
            self.foldable_rows.resize(row.saturating_add(1), None);
        }
        if let Some(slot) = self.foldable_rows.get_mut(row) {
            *slot = Some(foldable);
        }
        foldable
    }

    /// Indentation level of `line`, in whole tab stops.
    #[must_use]
    pub fn indent_level_for_line(line: &str, tab_length: usize) -> usize {
        indent_level_for_line(line, tab_length)
    }

    /// The indentation level `row` should have.
    ///
    /// Starts from the nearest non-blank row above and applies the indents
    /// query of the layer controlling that row's end. Without such a layer
    /// the row keeps the level of the row above.
    pub fn suggested_indent_for_row(&mut self, row: usize, tab_length: usize) -> usize {
        if row == 0 {
            return 0;
        }
        let mut comparison_row = row.saturating_sub(1);
        while comparison_row > 0 && self.buffer.is_row_blank(comparison_row) {
            comparison_row = comparison_row.saturating_sub(1);
        }
        let comparison_indent = indent_level_for_line(
            self.buffer.line_for_row(comparison_row).unwrap_or_default(),
            tab_length,
        );
        let comparison_end = Point::new(
            comparison_row,
            self.buffer.line_length_for_row(comparison_row),
        );
        let Some(key) = self.controlling_layer_key(comparison_end, |layer| {
            layer.grammar().query(QueryKind::Indents).is_some()
                && (layer.contains_point_strictly(comparison_end)
                    || layer.has_range_ending_at(comparison_end))
        }) else {
            return comparison_indent;
        };
        let Some((grammar, tree, depth)) = self.layer_tree(key, QueryKind::Indents) else {
            return comparison_indent;
        };

        let row_start = Point::new(row, 0);
        let row_layer = self
            .controlling_layer_key(row_start, |layer| {
                layer.grammar().query(QueryKind::Indents).is_some()
                    && (layer.contains_point_strictly(row_start)
                        || layer.has_range_starting_at(row_start))
            })
            .filter(|row_key| *row_key != key)
            .and_then(|row_key| self.layer_tree(row_key, QueryKind::Indents));

        let env = Environment {
            buffer: &self.buffer,
            config: &self.config,
        };
        let Some(query) = grammar.query(QueryKind::Indents) else {
            return comparison_indent;
        };
        let input = IndentInput {
            root: tree.root_node(),
            query,
            context: env.resolve_context(depth),
        };
        let delta = indent_delta(&input, comparison_row, row);

        let row_input = row_layer.as_ref().and_then(|(row_grammar, row_tree, row_depth)| {
            Some(IndentInput {
                root: row_tree.root_node(),
                query: row_grammar.query(QueryKind::Indents)?,
                context: env.resolve_context(*row_depth),
            })
        });
        match row_indent(row_input.as_ref().unwrap_or(&input), row, tab_length) {
            RowIndent::Exact(level) => level,
            RowIndent::Delta(dedent) => {
                comparison_indent.saturating_add_signed(delta.saturating_add(dedent))
            }
        }
    }

    /// Ranges of the local references at `point`, innermost first.
    pub fn local_references_at_point(&mut self, point: Point) -> Vec<BufferRange> {
        let Some((grammar, tree)) = self.locals_tree(point) else {
            return Vec::new();
        };
        let Some(query) = grammar.query(QueryKind::Locals) else {
            return Vec::new();
        };
        references_at(tree.root_node(), query, &self.buffer, point)
            .iter()
            .map(BufferRange::from)
            .collect()
    }

    /// Range of the definition the reference at `point` resolves to.
    pub fn definition_for_local_reference(&mut self, point: Point) -> Option<BufferRange> {
        let (grammar, tree) = self.locals_tree(point)?;
        let query = grammar.query(QueryKind::Locals)?;
        let root = tree.root_node();
        let reference = *references_at(root, query, &self.buffer, point).first()?;
        definition_for(root, query, &self.buffer, reference).map(|node| BufferRange::from(&node))
    }

    fn locals_tree(&mut self, point: Point) -> Option<(Arc<Grammar>, Tree)> {
        let key = self.controlling_layer_key(point, |layer| {
            layer.grammar().query(QueryKind::Locals).is_some()
        })?;
        self.layer_tree(key, QueryKind::Locals)
            .map(|(grammar, tree, _)| (grammar, tree))
    }

    fn layers_at_point(&self, point: Point, exact: bool) -> Vec<&LanguageLayer> {
        let mut layers: Vec<&LanguageLayer> = Vec::new();
        self.root.visit(&mut |layer| {
            let inside = layer.marker().is_none_or(|marker| marker.contains_point(point));
            if inside && (!exact || layer.contains_point(point)) {
                layers.push(layer);
            }
        });
        layers.sort_by(|a, b| match (a.marker(), b.marker()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(left), Some(right)) => left
                .compare(&right)
                .then_with(|| a.depth().cmp(&b.depth())),
        });
        layers
    }

    fn controlling_layer_key(
        &self,
        point: Point,
        predicate: impl Fn(&LanguageLayer) -> bool,
    ) -> Option<LayerKey> {
        self.layers_at_point(point, true)
            .into_iter()
            .filter(|layer| predicate(layer))
            .rev()
            .max_by_key(|layer| layer.depth())
            .map(LayerKey::of)
    }

    /// A fresh tree for the layer identified by `key`, with its depth.
    fn layer_tree(&mut self, key: LayerKey, kind: QueryKind) -> Option<(Arc<Grammar>, Tree, usize)> {
        let buffer = &self.buffer;
        let mut found = None;
        self.root.visit_mut(&mut |layer| {
            if found.is_none() && LayerKey::of(layer) == key {
                found = layer
                    .query_tree(buffer, kind)
                    .map(|(grammar, tree)| (grammar, tree, layer.depth()));
            }
        });
        found
    }

    fn summarize(&self, layer: &LanguageLayer) -> LayerSummary {
        LayerSummary {
            scope_name: layer.grammar().scope_name().to_owned(),
            depth: layer.depth(),
            extent: layer.extent(&self.buffer),
            has_errors: layer
                .tree()
                .is_some_and(|tree| has_error_nodes(tree.root_node())),
        }
    }

    fn refresh_trees(&mut self) {
        let buffer = &self.buffer;
        self.root.visit_mut(&mut |layer| {
            layer.get_or_parse_tree(buffer);
        });
    }

    /// Clips `point` and steps back from the end of a non-empty line, so
    /// the position describes the character before the cursor.
    fn normalize_point(&self, point: Point) -> Point {
        let clipped = self.buffer.clip_position(point);
        if clipped.column > 0 && clipped.column == self.buffer.line_length_for_row(clipped.row) {
            Point::new(clipped.row, clipped.column.saturating_sub(1))
        } else {
            clipped
        }
    }

    fn prepend_root_scope(&self, names: &mut Vec<String>) {
        let root = self.root_scope_name();
        if names.first().map(String::as_str) != Some(root) {
            names.insert(0, root.to_owned());
        }
    }

    fn splice_foldable_rows(&mut self, edit: &EditDescriptor) {
        let start = edit.old_range.start.row;
        let len = self.foldable_rows.len();
        if start >= len {
            return;
        }
        let old_end = edit.old_range.end.row.saturating_add(1).min(len);
        let inserted = edit
            .new_range
            .end
            .row
            .saturating_sub(start)
            .saturating_add(1);
        self.foldable_rows
            .splice(start..old_end, std::iter::repeat_n(None, inserted));
    }
}

/// Whether every dotted part of `selector` appears in `scope`.
fn selector_matches(selector: &str, scope: &str) -> bool {
    let parts: Vec<&str> = scope.split('.').collect();
    selector
        .split('.')
        .filter(|part| !part.is_empty())
        .all(|part| parts.contains(&part))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("string", "string.quoted.double", true)]
    #[case(".string.quoted", "string.quoted.double", true)]
    #[case("string.single", "string.quoted.double", false)]
    #[case("comment", "comment.block", true)]
    #[case("", "anything", true)]
    fn selectors_match_dotted_parts(
        #[case] selector: &str,
        #[case] scope: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(selector_matches(selector, scope), expected);
    }
}
