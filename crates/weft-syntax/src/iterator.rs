//! Merging scope boundaries from every layer into one stream.
//!
//! Each language layer produces its own boundary list for a region. A
//! [`HighlightIterator`] walks all of them in lock-step, always exposing the
//! boundary that comes first in buffer order. At equal positions, closes come
//! before opens; among closes the deeper layer goes first, among opens the
//! shallower one does, so scopes from different layers nest properly.
//!
//! A layer whose injection sets `cover_shallower_scopes` hides shallower
//! layers' scopes inside its content ranges. Only the shallower layer's own
//! base scope may still open there. A hidden open hides the close that
//! balances it, wherever that close lands, and no other close is hidden.

use std::cmp::Ordering;

use tree_sitter::Point;

use crate::mode::LanguageMode;
use crate::position::INFINITY;
use crate::range::BufferRange;
use crate::scope::ScopeId;

/// Whether a boundary closes or opens scopes. Closes sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum BoundaryKind {
    Close,
    Open,
}

/// Scope ids opening or closing at one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Boundary {
    pub(crate) position: Point,
    pub(crate) kind: BoundaryKind,
    pub(crate) ids: Vec<ScopeId>,
}

/// Scopes opened before the start of a seek, keyed by where they opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct OpenScopes {
    entries: Vec<(Point, Vec<ScopeId>)>,
}

impl OpenScopes {
    pub(crate) fn open(&mut self, point: Point, ids: Vec<ScopeId>) {
        if ids.is_empty() {
            return;
        }
        match self.entries.last_mut() {
            Some((last, existing)) if *last == point => existing.extend(ids),
            _ => self.entries.push((point, ids)),
        }
    }

    /// Removes the most recently opened occurrence of each id.
    pub(crate) fn close(&mut self, ids: &[ScopeId]) {
        for id in ids {
            self.remove_last_occurrence(*id);
        }
    }

    fn remove_last_occurrence(&mut self, id: ScopeId) -> bool {
        for (_, ids) in self.entries.iter_mut().rev() {
            if let Some(index) = ids.iter().rposition(|candidate| *candidate == id) {
                ids.remove(index);
                return true;
            }
        }
        false
    }

    /// Strips every scope but `keep` from entries opened at covered points,
    /// returning the stripped ids.
    fn prune(&mut self, covered: &[BufferRange], keep: Option<ScopeId>) -> Vec<ScopeId> {
        let mut stripped = Vec::new();
        for (point, ids) in &mut self.entries {
            if covered.iter().any(|range| range.contains_point(*point)) {
                stripped.extend(ids.iter().copied().filter(|id| Some(*id) != keep));
                ids.retain(|id| Some(*id) == keep);
            }
        }
        stripped
    }

    pub(crate) fn into_entries(self) -> Vec<(Point, Vec<ScopeId>)> {
        self.entries
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<ScopeId> {
        self.entries
            .iter()
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}

/// Where the current leader's boundary sits relative to a covering range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Covered {
    #[default]
    No,
    /// Strictly inside.
    All,
    /// On the start edge.
    Open,
    /// On the end edge.
    Close,
}

/// One layer's boundaries for the region being highlighted.
#[derive(Debug, Clone)]
pub(crate) struct LayerHighlightIterator {
    depth: usize,
    cover_shallower_scopes: bool,
    base_scope: Option<ScopeId>,
    content_ranges: Option<Vec<BufferRange>>,
    boundaries: Vec<Boundary>,
    index: usize,
}

impl LayerHighlightIterator {
    pub(crate) const fn new(
        depth: usize,
        cover_shallower_scopes: bool,
        base_scope: Option<ScopeId>,
        content_ranges: Option<Vec<BufferRange>>,
        boundaries: Vec<Boundary>,
    ) -> Self {
        Self {
            depth,
            cover_shallower_scopes,
            base_scope,
            content_ranges,
            boundaries,
            index: 0,
        }
    }

    pub(crate) const fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn has_boundaries(&self) -> bool {
        !self.boundaries.is_empty()
    }

    fn current(&self) -> Option<&Boundary> {
        self.boundaries.get(self.index)
    }

    fn position(&self) -> Point {
        self.current().map_or(INFINITY, |boundary| boundary.position)
    }

    fn kind(&self) -> Option<BoundaryKind> {
        self.current().map(|boundary| boundary.kind)
    }

    fn ids_of(&self, kind: BoundaryKind) -> &[ScopeId] {
        match self.current() {
            Some(boundary) if boundary.kind == kind => &boundary.ids,
            _ => &[],
        }
    }

    fn move_to_successor(&mut self) -> bool {
        if self.index.saturating_add(1) < self.boundaries.len() {
            self.index = self.index.saturating_add(1);
            true
        } else {
            false
        }
    }

    /// Orders iterators by their upcoming boundary.
    fn compare(&self, other: &Self) -> Ordering {
        self.position()
            .cmp(&other.position())
            .then_with(|| match (self.kind(), other.kind()) {
                (Some(BoundaryKind::Close), Some(BoundaryKind::Close)) => {
                    other.depth.cmp(&self.depth)
                }
                (Some(BoundaryKind::Close), _) => Ordering::Less,
                (_, Some(BoundaryKind::Close)) => Ordering::Greater,
                _ => self.depth.cmp(&other.depth),
            })
    }

    /// Whether this layer covers `other`'s boundary at `position`.
    fn covers(&self, other: &Self, position: Point) -> Covered {
        if !self.cover_shallower_scopes || other.depth >= self.depth {
            return Covered::No;
        }
        let Some(ranges) = &self.content_ranges else {
            return Covered::No;
        };
        let Some(range) = ranges.iter().find(|range| range.contains_point(position)) else {
            return Covered::No;
        };
        if range.end == position {
            Covered::Close
        } else if range.start == position {
            Covered::Open
        } else {
            Covered::All
        }
    }
}

/// Walks every active layer's boundaries in buffer order.
///
/// Obtain one from [`LanguageMode::build_highlight_iterator`], call
/// [`HighlightIterator::seek`], then read scopes and advance with
/// [`HighlightIterator::move_to_successor`] until
/// [`HighlightIterator::position`] passes the region of interest.
#[derive(Debug, Clone, Default)]
pub struct HighlightIterator {
    /// Sorted so the leader (next boundary) is last.
    iterators: Vec<LayerHighlightIterator>,
    /// Hidden opens, by layer depth, still waiting for their close.
    suppressed: Vec<(usize, ScopeId)>,
    opens: Vec<ScopeId>,
    closes: Vec<ScopeId>,
}

impl HighlightIterator {
    /// Creates an iterator with nothing to walk.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            iterators: Vec::new(),
            suppressed: Vec::new(),
            opens: Vec::new(),
            closes: Vec::new(),
        }
    }

    /// Positions the iterator at `start`, covering rows up to `end_row`.
    ///
    /// Returns the scopes already open at `start`, outermost first. Nothing
    /// is returned, and nothing iterated, when either endpoint's column
    /// exceeds the configured line length limit.
    pub fn seek(&mut self, mode: &mut LanguageMode, start: Point, end_row: usize) -> Vec<ScopeId> {
        self.iterators.clear();
        self.suppressed.clear();
        let layers = mode.seek_layers(start, end_row);
        self.merge(layers)
    }

    pub(crate) fn merge(&mut self, layers: Vec<(LayerHighlightIterator, OpenScopes)>) -> Vec<ScopeId> {
        let mut seen: Vec<(LayerHighlightIterator, OpenScopes)> = Vec::with_capacity(layers.len());
        for (layer, open) in layers {
            if layer.cover_shallower_scopes
                && let Some(ranges) = &layer.content_ranges
            {
                for (earlier, earlier_open) in &mut seen {
                    if earlier.depth < layer.depth {
                        let stripped = earlier_open.prune(ranges, earlier.base_scope);
                        self.suppressed
                            .extend(stripped.into_iter().map(|id| (earlier.depth, id)));
                    }
                }
            }
            seen.push((layer, open));
        }

        let mut bundles: Vec<(Point, usize, Vec<ScopeId>)> = Vec::new();
        for (layer, open) in seen {
            let depth = layer.depth;
            bundles.extend(
                open.into_entries()
                    .into_iter()
                    .map(|(point, ids)| (point, depth, ids)),
            );
            if layer.has_boundaries() {
                self.iterators.push(layer);
            }
        }
        bundles.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        self.iterators.sort_by(|a, b| b.compare(a));
        self.expose_leader();
        bundles.into_iter().flat_map(|(_, _, ids)| ids).collect()
    }

    /// Advances past the current boundary.
    pub fn move_to_successor(&mut self) {
        let Some(leader) = self.iterators.last_mut() else {
            return;
        };
        if leader.move_to_successor() {
            if let Some(moved) = self.iterators.pop() {
                let mut index = self.iterators.len();
                while let Some(previous) = index.checked_sub(1).and_then(|i| self.iterators.get(i)) {
                    if previous.compare(&moved) != Ordering::Less {
                        break;
                    }
                    index = index.saturating_sub(1);
                }
                self.iterators.insert(index, moved);
            }
        } else {
            self.iterators.pop();
        }
        self.expose_leader();
    }

    /// Position of the current boundary, or `None` once exhausted.
    #[must_use]
    pub fn position(&self) -> Option<Point> {
        self.iterators.last().map(LayerHighlightIterator::position)
    }

    /// Scopes opening at the current boundary.
    #[must_use]
    pub fn open_scope_ids(&self) -> Vec<ScopeId> {
        self.opens.clone()
    }

    /// Scopes closing at the current boundary.
    #[must_use]
    pub fn close_scope_ids(&self) -> Vec<ScopeId> {
        self.closes.clone()
    }

    /// Decides which of the leader's scopes are exposed at its position.
    fn expose_leader(&mut self) {
        self.opens.clear();
        self.closes.clear();
        let Some((leader, rest)) = self.iterators.split_last() else {
            return;
        };
        let position = leader.position();
        let covered = rest
            .iter()
            .map(|iterator| iterator.covers(leader, position))
            .find(|covered| *covered != Covered::No)
            .unwrap_or_default();
        let depth = leader.depth;

        for id in leader.ids_of(BoundaryKind::Close) {
            let hidden = self
                .suppressed
                .iter()
                .rposition(|entry| *entry == (depth, *id))
                .map(|index| self.suppressed.remove(index));
            if hidden.is_none() {
                self.closes.push(*id);
            }
        }

        let hides_opens = matches!(covered, Covered::All | Covered::Open);
        for id in leader.ids_of(BoundaryKind::Open) {
            if hides_opens && Some(*id) != leader.base_scope {
                self.suppressed.push((depth, *id));
            } else {
                self.opens.push(*id);
            }
        }
    }
}
