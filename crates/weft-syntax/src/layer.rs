//! One parser, tree, and resolver pair per language region.
//!
//! The root layer covers the whole buffer. Every other layer is an injection
//! owned by exactly one parent through its `injections` list, bound to a
//! marker range that follows buffer edits. Destroying a layer drops its
//! children with it.
//!
//! A layer keeps two trees. `tree` is the one queries read; it is patched on
//! every edit and may be re-parsed on demand while a transaction is open.
//! `last_syntax_tree` is the tree the previous update produced, patched with
//! the same edits, and is the only base used to compute changed ranges.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use tree_sitter::{InputEdit, Node, Point, Tree};
use weft_config::Config;

use crate::buffer::{EditDescriptor, TextBuffer};
use crate::error::SyntaxError;
use crate::fold::{FoldInput, FoldResolver};
use crate::grammar::{Grammar, GrammarRegistry, QueryKind};
use crate::injection::{InjectionPoint, LanguageScope, NodeRangeSet};
use crate::iterator::{Boundary, BoundaryKind, OpenScopes};
use crate::mode::ChangeNotice;
use crate::parser::LayerParser;
use crate::range::{BufferRange, RangeList};
use crate::scope::{ResolveContext, ScopeId, ScopeRegistry, ScopeResolver};

const LOG_TARGET: &str = "weft_syntax::layer";

const INVALIDATE_HIGHLIGHT: &str = "highlight.invalidateOnChange";

/// Outcome of updating a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LayerStatus {
    Alive,
    /// The layer has nothing left to parse and should be destroyed.
    Empty,
}

/// Shared inputs and outputs of an update cycle.
#[derive(Debug)]
pub(crate) struct UpdateContext<'a> {
    pub(crate) buffer: &'a TextBuffer,
    pub(crate) grammars: &'a GrammarRegistry,
    pub(crate) notices: &'a mut Vec<ChangeNotice>,
}

/// Read-only inputs for queries against a layer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Environment<'a> {
    pub(crate) buffer: &'a TextBuffer,
    pub(crate) config: &'a Config,
}

impl<'a> Environment<'a> {
    pub(crate) const fn resolve_context(&self, depth: usize) -> ResolveContext<'a> {
        ResolveContext {
            buffer: self.buffer,
            depth,
            config: self.config.values(),
            dev_mode: self.config.dev_mode(),
        }
    }
}

/// A content node found during injection population.
struct Candidate {
    marker: BufferRange,
    grammar: Arc<Grammar>,
    point: Arc<InjectionPoint>,
    nodes: NodeRangeSet,
}

#[derive(Debug)]
pub(crate) struct LanguageLayer {
    grammar: Arc<Grammar>,
    depth: usize,
    injection_point: Option<Arc<InjectionPoint>>,
    marker: Option<BufferRange>,
    parser: LayerParser,
    tree: Option<Tree>,
    last_syntax_tree: Option<Tree>,
    /// Query-only parse of a dirty layer; dropped on the next edit or update.
    off_cycle_tree: Option<Tree>,
    tree_is_dirty: bool,
    edited_range: Option<BufferRange>,
    current_ranges: Option<Vec<tree_sitter::Range>>,
    scope_resolver: ScopeResolver,
    fold_resolver: FoldResolver,
    highlight_watch: HashSet<usize>,
    injections: Vec<LanguageLayer>,
}

impl LanguageLayer {
    /// Creates the root layer for `grammar`.
    pub(crate) fn root(grammar: Arc<Grammar>) -> Result<Self, SyntaxError> {
        Self::new(grammar, 0, None, None)
    }

    fn new(
        grammar: Arc<Grammar>,
        depth: usize,
        injection_point: Option<Arc<InjectionPoint>>,
        marker: Option<BufferRange>,
    ) -> Result<Self, SyntaxError> {
        let parser = LayerParser::new(grammar.language())?;
        Ok(Self {
            grammar,
            depth,
            injection_point,
            marker,
            parser,
            tree: None,
            last_syntax_tree: None,
            off_cycle_tree: None,
            tree_is_dirty: false,
            edited_range: None,
            current_ranges: None,
            scope_resolver: ScopeResolver::default(),
            fold_resolver: FoldResolver::default(),
            highlight_watch: HashSet::new(),
            injections: Vec::new(),
        })
    }

    pub(crate) const fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    pub(crate) const fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) const fn marker(&self) -> Option<BufferRange> {
        self.marker
    }

    /// The tree queries read: an off-cycle parse when one is pending,
    /// otherwise the authoritative tree.
    pub(crate) fn tree(&self) -> Option<&Tree> {
        self.off_cycle_tree.as_ref().or(self.tree.as_ref())
    }

    pub(crate) const fn is_dirty(&self) -> bool {
        self.tree_is_dirty
    }

    pub(crate) fn covers_shallower_scopes(&self) -> bool {
        self.injection_point
            .as_deref()
            .is_some_and(InjectionPoint::covers_shallower_scopes)
    }

    /// Calls `f` on this layer and every descendant, parents first.
    pub(crate) fn visit<'s>(&'s self, f: &mut impl FnMut(&'s Self)) {
        f(self);
        for child in &self.injections {
            child.visit(f);
        }
    }

    pub(crate) fn visit_mut(&mut self, f: &mut impl FnMut(&mut Self)) {
        f(self);
        for child in &mut self.injections {
            child.visit_mut(f);
        }
    }

    /// The buffer region this layer is responsible for.
    pub(crate) fn extent(&self, buffer: &TextBuffer) -> BufferRange {
        self.marker.unwrap_or_else(|| buffer.extent())
    }

    /// Included ranges of an injection; `None` for the root layer.
    pub(crate) fn content_ranges(&self) -> Option<Vec<BufferRange>> {
        self.current_ranges
            .as_ref()
            .map(|ranges| ranges.iter().copied().map(BufferRange::from).collect())
    }

    /// Whether `point` lies in the text this layer parses.
    pub(crate) fn contains_point(&self, point: Point) -> bool {
        match &self.current_ranges {
            None => self.depth == 0,
            Some(ranges) => ranges
                .iter()
                .any(|range| BufferRange::from(*range).contains_point(point)),
        }
    }

    /// Like [`Self::contains_point`], but excluding range endpoints.
    pub(crate) fn contains_point_strictly(&self, point: Point) -> bool {
        match &self.current_ranges {
            None => self.depth == 0,
            Some(ranges) => ranges
                .iter()
                .any(|range| BufferRange::from(*range).contains_point_exclusive(point)),
        }
    }

    pub(crate) fn has_range_starting_at(&self, point: Point) -> bool {
        self.current_ranges
            .as_ref()
            .is_some_and(|ranges| ranges.iter().any(|range| range.start_point == point))
    }

    pub(crate) fn has_range_ending_at(&self, point: Point) -> bool {
        self.current_ranges
            .as_ref()
            .is_some_and(|ranges| ranges.iter().any(|range| range.end_point == point))
    }

    /// The ids of the scope wrapping this layer's content.
    pub(crate) fn base_scope_ids(
        &self,
        buffer: &TextBuffer,
        scopes: &mut ScopeRegistry,
    ) -> Vec<ScopeId> {
        let name = match self.injection_point.as_deref().map(InjectionPoint::scope) {
            None | Some(LanguageScope::Grammar) => Some(self.grammar.scope_name().to_owned()),
            Some(LanguageScope::None) => None,
            Some(LanguageScope::Fixed(fixed)) => Some(fixed.clone()),
            Some(LanguageScope::PerRange(selector)) => selector(buffer, self.extent(buffer)),
        };
        name.map(|scope| scopes.id_for_scope(&scope))
            .into_iter()
            .collect()
    }

    /// Patches both trees with `edit` and shifts the marker.
    ///
    /// Does not parse. Layers the edit does not touch keep a clean tree;
    /// their positions are shifted all the same.
    pub(crate) fn handle_edit(&mut self, edit: &EditDescriptor) {
        let input = edit.input_edit();
        self.off_cycle_tree = None;
        let touched = self.depth == 0
            || self
                .marker
                .is_some_and(|marker| marker.intersects(&edit.old_range));
        self.fold_resolver.reset();
        if let Some(tree) = &mut self.tree {
            tree.edit(&input);
            if touched {
                self.tree_is_dirty = true;
            }
        }
        if let Some(tree) = &mut self.last_syntax_tree {
            tree.edit(&input);
        }
        if touched {
            self.edited_range = Some(extend_edited_range(self.edited_range, &input));
        }
        self.marker = self.marker.map(|marker| shift_range(marker, &input));
        if let Some(ranges) = &mut self.current_ranges {
            for range in ranges.iter_mut() {
                shift_included_range(range, &input);
            }
        }
        for child in &mut self.injections {
            child.handle_edit(edit);
        }
    }

    /// Re-parses, reports what changed, and refreshes injections.
    ///
    /// `node_ranges` is `None` for the root layer. An injection whose
    /// content resolves to no ranges reports [`LayerStatus::Empty`].
    ///
    /// # Errors
    ///
    /// Returns an error when the parser rejects the included ranges.
    pub(crate) fn update(
        &mut self,
        cx: &mut UpdateContext<'_>,
        node_ranges: Option<&NodeRangeSet>,
    ) -> Result<LayerStatus, SyntaxError> {
        let ranges = match node_ranges {
            Some(set) => {
                let computed = set.ranges(cx.buffer);
                if computed.is_empty() {
                    return Ok(LayerStatus::Empty);
                }
                Some(computed)
            }
            None => None,
        };
        let tree = self
            .parser
            .parse(cx.buffer.text(), self.tree.as_ref(), ranges.as_deref())?;
        self.current_ranges = ranges;
        self.off_cycle_tree = None;
        self.fold_resolver.reset();
        self.scope_resolver.reset();

        let mut affected = RangeList::default();
        let previous = self.last_syntax_tree.take();
        if let Some(old) = &previous {
            for changed in old.changed_ranges(&tree) {
                affected.add(BufferRange::from(changed));
            }
            if let Some(edited) = self.edited_range.take() {
                affected.add(edited);
                self.collect_watched_notices(old, edited, cx.notices);
            }
        }
        let populate = if previous.is_some() {
            affected.combined()
        } else {
            affected.add(BufferRange::from(&tree.root_node()));
            Some(self.extent(cx.buffer))
        };
        cx.notices
            .extend(affected.iter().copied().map(ChangeNotice::Highlighting));

        tracing::debug!(
            target: LOG_TARGET,
            scope = self.grammar.scope_name(),
            depth = self.depth,
            changed = affected.iter().count(),
            "layer updated"
        );

        self.tree = Some(tree.clone());
        self.last_syntax_tree = Some(tree);
        self.tree_is_dirty = false;
        if let Some(range) = populate {
            self.populate_injections(cx, range);
        }
        Ok(LayerStatus::Alive)
    }

    /// Re-runs injection population over the whole layer, recursively.
    pub(crate) fn repopulate_all(&mut self, cx: &mut UpdateContext<'_>) {
        let extent = self.extent(cx.buffer);
        self.populate_injections(cx, extent);
        for child in &mut self.injections {
            child.repopulate_all(cx);
        }
    }

    /// Queues notices for watched nodes the edit landed in.
    ///
    /// For each watch set, the outermost watched ancestor of the edited
    /// region is invalidated as a whole.
    fn collect_watched_notices(
        &mut self,
        old: &Tree,
        edited: BufferRange,
        notices: &mut Vec<ChangeNotice>,
    ) {
        let Some(node) = old
            .root_node()
            .descendant_for_point_range(edited.start, edited.end)
        else {
            return;
        };
        if let Some(range) = outermost_watched(node, &self.highlight_watch) {
            notices.push(ChangeNotice::Highlighting(range));
        }
        if let Some(range) = outermost_watched(node, self.fold_resolver.watched()) {
            notices.push(ChangeNotice::Folds(range));
        }
        self.highlight_watch.clear();
        self.fold_resolver.clear_watched();
    }

    /// Creates, reuses, or destroys child layers for injections in `range`.
    fn populate_injections(&mut self, cx: &mut UpdateContext<'_>, range: BufferRange) {
        let Some(tree) = self.tree.clone() else {
            return;
        };
        let window = self
            .injections
            .iter()
            .filter_map(|child| child.marker)
            .filter(|marker| marker.intersects(&range))
            .fold(range, |acc, marker| acc.union(&marker));

        let candidates = self.injection_candidates(tree.root_node(), cx, window);
        let (matched, kept): (Vec<Self>, Vec<Self>) = mem::take(&mut self.injections)
            .into_iter()
            .partition(|child| {
                child
                    .marker
                    .is_some_and(|marker| marker.intersects(&window))
            });
        let mut existing = matched.into_iter().peekable();
        let mut layers = kept;

        for candidate in candidates {
            while let Some(stale) =
                existing.next_if(|child| child.compare_marker(&candidate.marker) == Ordering::Less)
            {
                retire(stale, cx.notices);
            }
            let reused = existing.next_if(|child| {
                child.marker == Some(candidate.marker)
                    && Arc::ptr_eq(&child.grammar, &candidate.grammar)
            });
            let Some(child) = reused.or_else(|| self.spawn(&candidate)) else {
                continue;
            };
            if let Some(settled) = settle(child, cx, &candidate.nodes) {
                layers.push(settled);
            }
        }
        for stale in existing {
            retire(stale, cx.notices);
        }
        layers.sort_by(|a, b| a.compare_marker_of(b));
        self.injections = layers;
    }

    fn spawn(&self, candidate: &Candidate) -> Option<Self> {
        match Self::new(
            Arc::clone(&candidate.grammar),
            self.depth.saturating_add(1),
            Some(Arc::clone(&candidate.point)),
            Some(candidate.marker),
        ) {
            Ok(child) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    scope = candidate.grammar.scope_name(),
                    depth = child.depth,
                    row = candidate.marker.start.row,
                    "creating injection layer"
                );
                Some(child)
            }
            Err(error) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    %error,
                    scope = candidate.grammar.scope_name(),
                    "cannot create injection layer"
                );
                None
            }
        }
    }

    fn injection_candidates(
        &self,
        root: Node<'_>,
        cx: &UpdateContext<'_>,
        window: BufferRange,
    ) -> Vec<Candidate> {
        if !self.grammar.has_injection_points() {
            return Vec::new();
        }
        let text = cx.buffer.text();
        let mut candidates = Vec::new();
        for node in nodes_intersecting(root, window, |kind| {
            self.grammar.injection_points_for(kind).next().is_some()
        }) {
            for point in self.grammar.injection_points_for(node.kind()) {
                let Some(language) = point.language_for(node, text) else {
                    continue;
                };
                let Some(grammar) = cx.grammars.grammar_for_language_string(&language) else {
                    tracing::debug!(target: LOG_TARGET, %language, "no grammar for injection");
                    continue;
                };
                let content = point.content_for(node, text);
                if content.is_empty() {
                    continue;
                }
                candidates.push(Candidate {
                    marker: BufferRange::from(&node),
                    grammar,
                    point: Arc::clone(point),
                    nodes: NodeRangeSet::new(self.current_ranges.clone(), &content, point),
                });
            }
        }
        candidates.sort_by(|a, b| a.marker.compare(&b.marker));
        candidates
    }

    fn compare_marker(&self, other: &BufferRange) -> Ordering {
        self.marker
            .map_or(Ordering::Less, |marker| marker.compare(other))
    }

    fn compare_marker_of(&self, other: &Self) -> Ordering {
        match (self.marker, other.marker) {
            (Some(a), Some(b)) => a.compare(&b),
            (a, b) => a.is_some().cmp(&b.is_some()),
        }
    }

    /// Drops trees, resolver state, and every descendant.
    pub(crate) fn destroy(&mut self) {
        self.tree = None;
        self.last_syntax_tree = None;
        self.off_cycle_tree = None;
        self.current_ranges = None;
        self.scope_resolver.destroy();
        self.fold_resolver.reset();
        self.highlight_watch.clear();
        for mut child in mem::take(&mut self.injections) {
            child.destroy();
        }
    }

    /// Returns a tree reflecting every edit so far.
    ///
    /// A dirty layer parses into a separate query-only tree. The
    /// authoritative tree stays dirty until the next update, and it remains
    /// the base of that update's parse; the last syntax tree remains the base
    /// of its change diff.
    pub(crate) fn get_or_parse_tree(&mut self, buffer: &TextBuffer) -> Option<Tree> {
        if !self.tree_is_dirty {
            return self.tree.clone();
        }
        if let Some(pending) = &self.off_cycle_tree {
            return Some(pending.clone());
        }
        let parsed = self.parser.parse(
            buffer.text(),
            self.tree.as_ref(),
            self.current_ranges.as_deref(),
        );
        let tree = match parsed {
            Ok(tree) => tree,
            Err(error) => {
                tracing::warn!(target: LOG_TARGET, %error, "off-cycle parse failed");
                return self.tree.clone();
            }
        };
        self.off_cycle_tree = Some(tree.clone());
        Some(tree)
    }

    /// The grammar and a fresh tree, when the grammar has a `kind` query.
    pub(crate) fn query_tree(
        &mut self,
        buffer: &TextBuffer,
        kind: QueryKind,
    ) -> Option<(Arc<Grammar>, Tree)> {
        self.grammar.query(kind)?;
        let tree = self.get_or_parse_tree(buffer)?;
        Some((Arc::clone(&self.grammar), tree))
    }

    /// Resolves highlighting boundaries between `from` and `to`.
    ///
    /// Boundaries before `from` are folded into the returned open scopes
    /// instead of being emitted.
    pub(crate) fn syntax_boundaries(
        &mut self,
        env: &Environment<'_>,
        scopes: &mut ScopeRegistry,
        from: Point,
        to: Point,
    ) -> (Vec<Boundary>, OpenScopes) {
        let buffer = env.buffer;
        let start = buffer.clip_position(from);
        let end = buffer.clip_position(to);
        let mut open = OpenScopes::default();
        let Some(tree) = self.get_or_parse_tree(buffer) else {
            return (Vec::new(), open);
        };
        self.scope_resolver.reset();
        self.store_highlights(env, scopes, tree.root_node(), BufferRange::new(start, end));

        let base = self.base_scope_ids(buffer, scopes);
        if !base.is_empty() {
            for range in self.root_ranges(buffer) {
                if range.end <= start || range.start >= end {
                    continue;
                }
                self.scope_resolver.open_root(range.start, &base);
                if range.end <= end {
                    self.scope_resolver.close_root(range.end, &base);
                }
            }
        }

        let mut boundaries = Vec::new();
        for (point, entry) in self.scope_resolver.boundaries() {
            if *point < start {
                open.close(&entry.close_ids());
                open.open(*point, entry.open_ids());
                continue;
            }
            if *point > end {
                break;
            }
            let closes = entry.close_ids();
            if !closes.is_empty() {
                boundaries.push(Boundary {
                    position: *point,
                    kind: BoundaryKind::Close,
                    ids: closes,
                });
            }
            let opens = entry.open_ids();
            if !opens.is_empty() {
                boundaries.push(Boundary {
                    position: *point,
                    kind: BoundaryKind::Open,
                    ids: opens,
                });
            }
        }
        (boundaries, open)
    }

    fn store_highlights(
        &mut self,
        env: &Environment<'_>,
        scopes: &mut ScopeRegistry,
        root: Node<'_>,
        window: BufferRange,
    ) {
        let grammar = Arc::clone(&self.grammar);
        let Some(query) = grammar.query(QueryKind::Highlights) else {
            return;
        };
        let context = env.resolve_context(self.depth);
        for capture in query.captures(root, env.buffer.text(), Some(window)) {
            if capture.settings.has_property(INVALIDATE_HIGHLIGHT) {
                self.highlight_watch.insert(capture.node.id());
            }
            if capture.node.start_byte() == capture.node.end_byte()
                && capture.node.child_count() == 0
            {
                continue;
            }
            self.scope_resolver.store(&capture, &context, scopes);
        }
    }

    /// Ranges the base scope wraps: the included ranges of an injection,
    /// the whole buffer for the root.
    fn root_ranges(&self, buffer: &TextBuffer) -> Vec<BufferRange> {
        self.content_ranges()
            .unwrap_or_else(|| vec![buffer.extent()])
    }

    /// Captures covering `point`, as `(name, range)`, smallest first.
    ///
    /// Ranges ending exactly at `point` are left out.
    pub(crate) fn scope_map_at(
        &mut self,
        env: &Environment<'_>,
        scopes: &mut ScopeRegistry,
        point: Point,
    ) -> Vec<(String, BufferRange)> {
        let buffer = env.buffer;
        let grammar = Arc::clone(&self.grammar);
        let (Some(tree), Some(query)) = (
            self.get_or_parse_tree(buffer),
            grammar.query(QueryKind::Highlights),
        ) else {
            return Vec::new();
        };
        let context = env.resolve_context(self.depth);
        let window = BufferRange::new(point, Point::new(point.row, point.column.saturating_add(1)));
        self.scope_resolver.reset();
        let mut found = Vec::new();
        for capture in query.captures(tree.root_node(), buffer.text(), Some(window)) {
            let Some(stored) = self.scope_resolver.store(&capture, &context, scopes) else {
                continue;
            };
            let range = BufferRange::from(stored);
            if range.end != point && range.contains_point(point) {
                found.push((capture.name.to_owned(), range));
            }
        }
        self.scope_resolver.reset();
        found.sort_by_key(|(_, range)| {
            buffer
                .index_for_position(range.end)
                .saturating_sub(buffer.index_for_position(range.start))
        });
        found
    }

    pub(crate) fn fold_range_for_row(
        &mut self,
        env: &Environment<'_>,
        row: usize,
    ) -> Option<BufferRange> {
        let (grammar, tree) = self.query_tree(env.buffer, QueryKind::Folds)?;
        let input = FoldInput {
            root: tree.root_node(),
            query: grammar.query(QueryKind::Folds)?,
            context: env.resolve_context(self.depth),
            extent: self.extent(env.buffer),
        };
        self.fold_resolver.fold_range_for_row(&input, row)
    }

    pub(crate) fn all_fold_ranges(&mut self, env: &Environment<'_>) -> Vec<BufferRange> {
        let Some((grammar, tree)) = self.query_tree(env.buffer, QueryKind::Folds) else {
            return Vec::new();
        };
        let Some(query) = grammar.query(QueryKind::Folds) else {
            return Vec::new();
        };
        let input = FoldInput {
            root: tree.root_node(),
            query,
            context: env.resolve_context(self.depth),
            extent: self.extent(env.buffer),
        };
        self.fold_resolver.all_fold_ranges(&input)
    }

    pub(crate) fn clear_config_caches(&mut self) {
        self.scope_resolver.clear_config_cache();
        self.fold_resolver.clear_config_cache();
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<SyntaxError> {
        let mut diagnostics = self.scope_resolver.take_diagnostics();
        diagnostics.extend(self.fold_resolver.take_diagnostics());
        diagnostics
    }
}

/// Updates `child` with its new content, dropping it when nothing remains.
fn settle(
    mut child: LanguageLayer,
    cx: &mut UpdateContext<'_>,
    nodes: &NodeRangeSet,
) -> Option<LanguageLayer> {
    match child.update(cx, Some(nodes)) {
        Ok(LayerStatus::Alive) => Some(child),
        Ok(LayerStatus::Empty) => {
            tracing::debug!(
                target: LOG_TARGET,
                scope = child.grammar.scope_name(),
                "injection has no content"
            );
            retire(child, cx.notices);
            None
        }
        Err(error) => {
            tracing::warn!(target: LOG_TARGET, %error, "dropping injection layer");
            retire(child, cx.notices);
            None
        }
    }
}

fn retire(mut layer: LanguageLayer, notices: &mut Vec<ChangeNotice>) {
    tracing::debug!(
        target: LOG_TARGET,
        scope = layer.grammar.scope_name(),
        depth = layer.depth,
        "destroying injection layer"
    );
    if let Some(marker) = layer.marker {
        notices.push(ChangeNotice::Highlighting(marker));
    }
    layer.destroy();
}

/// Nodes intersecting `window` whose kind passes `wanted`, in preorder.
fn nodes_intersecting<'tree>(
    root: Node<'tree>,
    window: BufferRange,
    wanted: impl Fn(&str) -> bool,
) -> Vec<Node<'tree>> {
    let mut found = Vec::new();
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if BufferRange::from(&node).intersects(&window) {
            if wanted(node.kind()) {
                found.push(node);
            }
            if cursor.goto_first_child() {
                continue;
            }
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return found;
            }
        }
    }
}

/// Range of the outermost ancestor of `node` (itself included) in `watched`.
fn outermost_watched(node: Node<'_>, watched: &HashSet<usize>) -> Option<BufferRange> {
    if watched.is_empty() {
        return None;
    }
    let mut outermost = None;
    let mut current = Some(node);
    while let Some(candidate) = current {
        if watched.contains(&candidate.id()) {
            outermost = Some(BufferRange::from(&candidate));
        }
        current = candidate.parent();
    }
    outermost
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Start,
    End,
}

/// Maps a pre-edit position to its post-edit equivalent.
///
/// Positions inside the replaced text collapse to the edit start (for range
/// starts) or to the end of the inserted text (for range ends).
fn shift_point(point: Point, edit: &InputEdit, side: Side) -> Point {
    if point < edit.start_position {
        return point;
    }
    if point < edit.old_end_position {
        return match side {
            Side::Start => edit.start_position,
            Side::End => edit.new_end_position,
        };
    }
    let old_end = edit.old_end_position;
    let new_end = edit.new_end_position;
    if point.row == old_end.row {
        Point::new(
            new_end.row,
            new_end
                .column
                .saturating_add(point.column.saturating_sub(old_end.column)),
        )
    } else {
        Point::new(
            point
                .row
                .saturating_sub(old_end.row)
                .saturating_add(new_end.row),
            point.column,
        )
    }
}

fn shift_byte(byte: usize, edit: &InputEdit, side: Side) -> usize {
    if byte < edit.start_byte {
        return byte;
    }
    if byte < edit.old_end_byte {
        return match side {
            Side::Start => edit.start_byte,
            Side::End => edit.new_end_byte,
        };
    }
    byte.saturating_sub(edit.old_end_byte)
        .saturating_add(edit.new_end_byte)
}

fn shift_range(range: BufferRange, edit: &InputEdit) -> BufferRange {
    BufferRange::new(
        shift_point(range.start, edit, Side::Start),
        shift_point(range.end, edit, Side::End),
    )
}

fn shift_included_range(range: &mut tree_sitter::Range, edit: &InputEdit) {
    range.start_byte = shift_byte(range.start_byte, edit, Side::Start);
    range.end_byte = shift_byte(range.end_byte, edit, Side::End);
    range.start_point = shift_point(range.start_point, edit, Side::Start);
    range.end_point = shift_point(range.end_point, edit, Side::End);
}

/// Grows the pending edited range to cover `edit`, in post-edit positions.
pub(crate) fn extend_edited_range(previous: Option<BufferRange>, edit: &InputEdit) -> BufferRange {
    let touched = BufferRange::new(edit.start_position, edit.new_end_position);
    previous.map_or(touched, |range| shift_range(range, edit).union(&touched))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::language::SupportedLanguage;

    const PAGE: &str = "<p>hi</p>\n<script>let a = 1;</script>\n";

    fn registry() -> GrammarRegistry {
        let mut registry = GrammarRegistry::new();
        registry.add_grammar(
            Grammar::builder(SupportedLanguage::JavaScript)
                .highlights_query("(identifier) @variable")
                .build(),
        );
        registry.add_grammar(
            Grammar::builder(SupportedLanguage::Html)
                .highlights_query("(tag_name) @tag")
                .injection_point(InjectionPoint::new(
                    "script_element",
                    |_, _| Some("javascript".to_owned()),
                    |node, _| {
                        let mut cursor = node.walk();
                        let content: Vec<_> = node
                            .children(&mut cursor)
                            .filter(|child| child.kind() == "raw_text")
                            .collect();
                        content
                    },
                ))
                .build(),
        );
        registry
    }

    fn root_layer(registry: &GrammarRegistry, buffer: &TextBuffer) -> (LanguageLayer, Vec<ChangeNotice>) {
        let grammar = registry
            .grammar_for_scope_name("text.html.basic")
            .expect("html grammar");
        let mut layer = LanguageLayer::root(grammar).expect("root layer");
        let mut notices = Vec::new();
        let mut cx = UpdateContext {
            buffer,
            grammars: registry,
            notices: &mut notices,
        };
        let status = layer.update(&mut cx, None).expect("update");
        assert_eq!(status, LayerStatus::Alive);
        (layer, notices)
    }

    fn depths(layer: &LanguageLayer) -> Vec<(usize, String)> {
        let mut found = Vec::new();
        layer.visit(&mut |each| {
            found.push((each.depth(), each.grammar().scope_name().to_owned()));
        });
        found
    }

    #[test]
    fn first_update_creates_injection() {
        let registry = registry();
        let buffer = TextBuffer::new(PAGE);
        let (layer, notices) = root_layer(&registry, &buffer);

        assert_eq!(
            depths(&layer),
            vec![(0, "text.html.basic".to_owned()), (1, "source.js".to_owned())]
        );
        assert!(notices
            .iter()
            .any(|notice| matches!(notice, ChangeNotice::Highlighting(range) if range.start == Point::new(0, 0))));
        let child = layer.injections.first().expect("child");
        assert_eq!(
            child.content_ranges(),
            Some(vec![BufferRange::from_rows((1, 8), (1, 18))])
        );
    }

    #[test]
    fn removing_script_destroys_injection() {
        let registry = registry();
        let mut buffer = TextBuffer::new(PAGE);
        let (mut layer, _) = root_layer(&registry, &buffer);
        let edit = buffer.set_text_in_range(BufferRange::from_rows((1, 0), (1, 27)), "");
        layer.handle_edit(&edit);

        let mut notices = Vec::new();
        let mut cx = UpdateContext {
            buffer: &buffer,
            grammars: &registry,
            notices: &mut notices,
        };
        layer.update(&mut cx, None).expect("update");

        assert_eq!(depths(&layer), vec![(0, "text.html.basic".to_owned())]);
        assert!(notices.contains(&ChangeNotice::Highlighting(BufferRange::from_rows((1, 0), (1, 0)))));
    }

    #[test]
    fn edits_inside_injection_reuse_the_layer() {
        let registry = registry();
        let mut buffer = TextBuffer::new(PAGE);
        let (mut layer, _) = root_layer(&registry, &buffer);
        let edit = buffer.set_text_in_range(BufferRange::from_rows((1, 12), (1, 13)), "bb");
        layer.handle_edit(&edit);
        assert!(layer.is_dirty());

        let mut notices = Vec::new();
        let mut cx = UpdateContext {
            buffer: &buffer,
            grammars: &registry,
            notices: &mut notices,
        };
        layer.update(&mut cx, None).expect("update");

        let child = layer.injections.first().expect("child");
        assert_eq!(child.marker(), Some(BufferRange::from_rows((1, 0), (1, 28))));
        assert_eq!(
            child.content_ranges(),
            Some(vec![BufferRange::from_rows((1, 8), (1, 19))])
        );
        assert!(!layer.is_dirty());
    }

    #[test]
    fn dirty_injection_queries_do_not_replace_its_tree() {
        let registry = registry();
        let mut buffer = TextBuffer::new(PAGE);
        let (mut layer, _) = root_layer(&registry, &buffer);
        let edit = buffer.set_text_in_range(BufferRange::from_rows((1, 12), (1, 13)), "bb");
        layer.handle_edit(&edit);

        let root_tree = layer.get_or_parse_tree(&buffer).expect("root tree");
        assert!(layer.is_dirty());
        assert_eq!(root_tree.root_node().end_byte(), buffer.len());

        let child = layer.injections.first_mut().expect("child");
        let fresh = child.get_or_parse_tree(&buffer).expect("child tree");
        let identifier = fresh
            .root_node()
            .descendant_for_point_range(Point::new(1, 12), Point::new(1, 13))
            .expect("identifier");
        assert_eq!(identifier.end_position(), Point::new(1, 14));
        assert!(child.is_dirty());
        assert!(child.off_cycle_tree.is_some());

        let mut notices = Vec::new();
        let mut cx = UpdateContext {
            buffer: &buffer,
            grammars: &registry,
            notices: &mut notices,
        };
        layer.update(&mut cx, None).expect("update");

        assert!(!layer.is_dirty());
        let child = layer.injections.first().expect("child");
        assert!(!child.is_dirty());
        assert!(child.off_cycle_tree.is_none());
        assert!(notices.iter().any(|notice| matches!(
            notice,
            ChangeNotice::Highlighting(range) if range.contains_point(Point::new(1, 13))
        )));
    }

    #[test]
    fn missing_grammar_skips_injection() {
        let mut registry = GrammarRegistry::new();
        registry.add_grammar(
            Grammar::builder(SupportedLanguage::Html)
                .injection_point(InjectionPoint::new(
                    "script_element",
                    |_, _| Some("coffee".to_owned()),
                    |node, _| vec![node],
                ))
                .build(),
        );
        let buffer = TextBuffer::new(PAGE);
        let (layer, _) = root_layer(&registry, &buffer);

        assert_eq!(depths(&layer).len(), 1);
    }

    #[rstest]
    #[case::before((0, 2), (0, 2))]
    #[case::same_row_after((0, 9), (0, 11))]
    #[case::later_row((2, 4), (2, 4))]
    fn points_shift_through_insertions(#[case] point: (usize, usize), #[case] expected: (usize, usize)) {
        // "ab" inserted at (0, 5)
        let edit = InputEdit {
            start_byte: 5,
            old_end_byte: 5,
            new_end_byte: 7,
            start_position: Point::new(0, 5),
            old_end_position: Point::new(0, 5),
            new_end_position: Point::new(0, 7),
        };

        assert_eq!(
            shift_point(Point::new(point.0, point.1), &edit, Side::Start),
            Point::new(expected.0, expected.1)
        );
    }

    #[test]
    fn interior_points_collapse_by_side() {
        // (0, 2)..(1, 3) replaced by "x"
        let edit = InputEdit {
            start_byte: 2,
            old_end_byte: 10,
            new_end_byte: 3,
            start_position: Point::new(0, 2),
            old_end_position: Point::new(1, 3),
            new_end_position: Point::new(0, 3),
        };
        let range = shift_range(BufferRange::from_rows((0, 4), (1, 1)), &edit);

        assert_eq!(range, BufferRange::from_rows((0, 2), (0, 3)));
        assert_eq!(shift_point(Point::new(1, 7), &edit, Side::End), Point::new(0, 7));
        assert_eq!(shift_byte(12, &edit, Side::End), 5);
    }

    #[test]
    fn edited_range_accumulates() {
        let first = InputEdit {
            start_byte: 2,
            old_end_byte: 2,
            new_end_byte: 3,
            start_position: Point::new(0, 2),
            old_end_position: Point::new(0, 2),
            new_end_position: Point::new(0, 3),
        };
        let second = InputEdit {
            start_byte: 0,
            old_end_byte: 0,
            new_end_byte: 1,
            start_position: Point::new(0, 0),
            old_end_position: Point::new(0, 0),
            new_end_position: Point::new(0, 1),
        };

        let range = extend_edited_range(Some(extend_edited_range(None, &first)), &second);

        assert_eq!(range, BufferRange::from_rows((0, 0), (0, 4)));
    }
}
