//! Injection points and the ranges an injected layer parses.
//!
//! An [`InjectionPoint`] is registered on a host grammar for one node type.
//! When a node of that type appears in a host tree, the point's language
//! selector names the embedded language and its content selector names the
//! nodes holding the embedded text. A [`NodeRangeSet`] then turns those
//! nodes into the disjoint byte ranges handed to Tree-sitter as included
//! ranges for the child layer.

use std::fmt;
use std::sync::Arc;

use tree_sitter::{Node, Range};

use crate::buffer::TextBuffer;
use crate::position::ts_range;
use crate::range::BufferRange;

/// Selects the embedded language name for a host node.
pub type LanguageSelector = dyn for<'tree> Fn(Node<'tree>, &str) -> Option<String> + Send + Sync;

/// Selects the nodes whose text forms the embedded document.
pub type ContentSelector = dyn for<'tree> Fn(Node<'tree>, &str) -> Vec<Node<'tree>> + Send + Sync;

/// Computes a per-range base scope for an injected layer.
pub type ScopeSelector = dyn Fn(&TextBuffer, BufferRange) -> Option<String> + Send + Sync;

/// The base scope an injected layer wraps its content in.
#[derive(Clone, Default)]
pub enum LanguageScope {
    /// The injected grammar's own scope name.
    #[default]
    Grammar,
    /// No base scope at all.
    None,
    /// A fixed scope name.
    Fixed(String),
    /// A scope name computed from the layer's content range.
    PerRange(Arc<ScopeSelector>),
}

impl fmt::Debug for LanguageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grammar => f.write_str("Grammar"),
            Self::None => f.write_str("None"),
            Self::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            Self::PerRange(_) => f.write_str("PerRange(..)"),
        }
    }
}

/// A rule that embeds one language inside nodes of another.
pub struct InjectionPoint {
    node_type: String,
    language: Box<LanguageSelector>,
    content: Box<ContentSelector>,
    include_children: bool,
    newlines_between: bool,
    include_adjacent_whitespace: bool,
    language_scope: LanguageScope,
    cover_shallower_scopes: bool,
}

impl fmt::Debug for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionPoint")
            .field("node_type", &self.node_type)
            .field("include_children", &self.include_children)
            .field("newlines_between", &self.newlines_between)
            .field("include_adjacent_whitespace", &self.include_adjacent_whitespace)
            .field("language_scope", &self.language_scope)
            .field("cover_shallower_scopes", &self.cover_shallower_scopes)
            .finish_non_exhaustive()
    }
}

impl InjectionPoint {
    /// Creates an injection point for nodes of `node_type`.
    ///
    /// Both selectors receive the host node and the full buffer text.
    /// Returning `None` from `language` or an empty list from `content`
    /// means the node embeds nothing.
    #[must_use]
    pub fn new(
        node_type: impl Into<String>,
        language: impl for<'tree> Fn(Node<'tree>, &str) -> Option<String> + Send + Sync + 'static,
        content: impl for<'tree> Fn(Node<'tree>, &str) -> Vec<Node<'tree>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            language: Box::new(language),
            content: Box::new(content),
            include_children: false,
            newlines_between: false,
            include_adjacent_whitespace: false,
            language_scope: LanguageScope::Grammar,
            cover_shallower_scopes: false,
        }
    }

    /// Parses content nodes whole instead of only their direct text.
    #[must_use]
    pub const fn include_children(mut self, value: bool) -> Self {
        self.include_children = value;
        self
    }

    /// Keeps a newline between content ranges on different rows.
    #[must_use]
    pub const fn newlines_between(mut self, value: bool) -> Self {
        self.newlines_between = value;
        self
    }

    /// Absorbs whitespace-only gaps between content ranges.
    #[must_use]
    pub const fn include_adjacent_whitespace(mut self, value: bool) -> Self {
        self.include_adjacent_whitespace = value;
        self
    }

    /// Chooses the base scope of the injected layer.
    #[must_use]
    pub fn language_scope(mut self, scope: LanguageScope) -> Self {
        self.language_scope = scope;
        self
    }

    /// Lets the injected layer hide shallower scopes inside its content.
    #[must_use]
    pub const fn cover_shallower_scopes(mut self, value: bool) -> Self {
        self.cover_shallower_scopes = value;
        self
    }

    /// The host node type this point applies to.
    #[must_use]
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub(crate) fn language_for<'tree>(&self, node: Node<'tree>, text: &str) -> Option<String> {
        (self.language)(node, text)
    }

    pub(crate) fn content_for<'tree>(&self, node: Node<'tree>, text: &str) -> Vec<Node<'tree>> {
        (self.content)(node, text)
    }

    pub(crate) const fn scope(&self) -> &LanguageScope {
        &self.language_scope
    }

    pub(crate) const fn covers_shallower_scopes(&self) -> bool {
        self.cover_shallower_scopes
    }
}

/// Snapshot of a content node and, when needed, its direct children.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeSpec {
    range: Range,
    children: Vec<Range>,
}

impl NodeSpec {
    fn capture(node: Node<'_>, with_children: bool) -> Self {
        let children = if with_children {
            let mut cursor = node.walk();
            node.children(&mut cursor).map(|child| child.range()).collect()
        } else {
            Vec::new()
        };
        Self {
            range: node.range(),
            children,
        }
    }
}

/// The content nodes of one injection, resolved into parse ranges.
///
/// Nodes are snapshotted on construction because the host tree is replaced
/// on the next update. `previous` holds the host layer's own included
/// ranges (for nested injections), which every computed range is clipped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeRangeSet {
    previous: Option<Vec<Range>>,
    nodes: Vec<NodeSpec>,
    include_children: bool,
    newlines_between: bool,
    include_adjacent_whitespace: bool,
}

impl NodeRangeSet {
    pub(crate) fn new(
        previous: Option<Vec<Range>>,
        nodes: &[Node<'_>],
        point: &InjectionPoint,
    ) -> Self {
        Self {
            previous,
            nodes: nodes
                .iter()
                .map(|node| NodeSpec::capture(*node, !point.include_children))
                .collect(),
            include_children: point.include_children,
            newlines_between: point.newlines_between,
            include_adjacent_whitespace: point.include_adjacent_whitespace,
        }
    }

    /// Computes the ordered, non-overlapping ranges to parse.
    pub(crate) fn ranges(&self, buffer: &TextBuffer) -> Vec<Range> {
        let mut result = Vec::new();
        for node in &self.nodes {
            let mut start_byte = node.range.start_byte;
            let mut start_point = node.range.start_point;
            if !self.include_children {
                for child in &node.children {
                    if child.start_byte > start_byte {
                        let gap =
                            ts_range(start_byte, child.start_byte, start_point, child.start_point);
                        self.push(buffer, &mut result, gap);
                    }
                    start_byte = child.end_byte;
                    start_point = child.end_point;
                }
            }
            if node.range.end_byte > start_byte {
                let tail = ts_range(
                    start_byte,
                    node.range.end_byte,
                    start_point,
                    node.range.end_point,
                );
                self.push(buffer, &mut result, tail);
            }
        }

        if self.include_adjacent_whitespace && result.len() > 1 {
            let gaps: Vec<Range> = result
                .windows(2)
                .filter_map(|pair| match pair {
                    [before, after] if after.start_byte > before.end_byte => Some(ts_range(
                        before.end_byte,
                        after.start_byte,
                        before.end_point,
                        after.start_point,
                    )),
                    _ => None,
                })
                .filter(|gap| {
                    buffer
                        .text_between(gap.start_byte, gap.end_byte)
                        .chars()
                        .all(char::is_whitespace)
                })
                .collect();
            result.extend(gaps);
            result.sort_by_key(|range| (range.start_byte, range.end_byte));
        }

        consolidate(result)
    }

    fn push(&self, buffer: &TextBuffer, result: &mut Vec<Range>, range: Range) {
        let Some(previous) = &self.previous else {
            if self.newlines_between {
                ensure_newline(buffer, result, &range);
            }
            result.push(range);
            return;
        };
        for outer in previous {
            if outer.end_byte <= range.start_byte {
                continue;
            }
            if outer.start_byte >= range.end_byte {
                break;
            }
            let clipped = ts_range(
                outer.start_byte.max(range.start_byte),
                outer.end_byte.min(range.end_byte),
                outer.start_point.max(range.start_point),
                outer.end_point.min(range.end_point),
            );
            if self.newlines_between {
                ensure_newline(buffer, result, &clipped);
            }
            result.push(clipped);
        }
    }
}

/// Inserts the newline that precedes `next` when the last range ended on
/// an earlier row.
fn ensure_newline(buffer: &TextBuffer, result: &mut Vec<Range>, next: &Range) {
    let Some(last) = result.last() else {
        return;
    };
    let row = next.start_point.row;
    if last.end_point.row >= row {
        return;
    }
    let Some(line_start) = next.start_byte.checked_sub(next.start_point.column) else {
        return;
    };
    let Some(newline) = line_start.checked_sub(1) else {
        return;
    };
    if newline < last.end_byte {
        return;
    }
    let previous_row = row.saturating_sub(1);
    result.push(ts_range(
        newline,
        line_start,
        tree_sitter::Point::new(previous_row, buffer.line_length_for_row(previous_row)),
        tree_sitter::Point::new(row, 0),
    ));
}

/// Merges touching or overlapping ranges, preserving order.
fn consolidate(ranges: Vec<Range>) -> Vec<Range> {
    let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start_byte <= last.end_byte => {
                if range.end_byte > last.end_byte {
                    last.end_byte = range.end_byte;
                    last.end_point = range.end_point;
                }
            }
            _ => merged.push(range),
        }
    }
    merged
}
