//! Local variable lookups through a `locals` query.
//!
//! The query marks `@local.scope`, `@local.definition` and
//! `@local.reference` nodes. A reference resolves to the definition with the
//! same text in the innermost scope that holds one, preferring the nearest
//! definition before the reference and falling back to the nearest after.

use tree_sitter::Node;

use crate::buffer::TextBuffer;
use crate::grammar::CompiledQuery;
use crate::range::BufferRange;

const SCOPE: &str = "local.scope";
const DEFINITION: &str = "local.definition";
const REFERENCE: &str = "local.reference";

/// Reference nodes covering `point`, innermost first.
pub(crate) fn references_at<'tree>(
    root: Node<'tree>,
    query: &CompiledQuery,
    buffer: &TextBuffer,
    point: tree_sitter::Point,
) -> Vec<Node<'tree>> {
    let window = BufferRange::new(
        point,
        tree_sitter::Point::new(point.row, point.column.saturating_add(1)),
    );
    let mut nodes: Vec<Node<'tree>> = query
        .captures(root, buffer.text(), Some(window))
        .into_iter()
        .filter(|capture| capture.name == REFERENCE)
        .map(|capture| capture.node)
        .filter(|node| BufferRange::from(node).contains_point(point))
        .collect();
    nodes.sort_by(|a, b| BufferRange::from(b).compare(&BufferRange::from(a)));
    nodes.dedup_by_key(|node| node.id());
    nodes
}

/// The definition `reference` most plausibly names.
pub(crate) fn definition_for<'tree>(
    root: Node<'tree>,
    query: &CompiledQuery,
    buffer: &TextBuffer,
    reference: Node<'tree>,
) -> Option<Node<'tree>> {
    let name = node_text(buffer, reference);
    if name.is_empty() {
        return None;
    }
    let mut scopes = Vec::new();
    let mut definitions = Vec::new();
    for capture in query.captures(root, buffer.text(), None) {
        match capture.name {
            SCOPE => scopes.push(capture.node),
            DEFINITION if node_text(buffer, capture.node) == name => {
                definitions.push(capture.node);
            }
            _ => {}
        }
    }
    if definitions.is_empty() {
        return None;
    }

    let target = BufferRange::from(&reference);
    let mut relevant: Vec<Node<'tree>> = scopes
        .iter()
        .copied()
        .filter(|scope| BufferRange::from(scope).contains_range(&target))
        .collect();
    relevant.sort_by(|a, b| BufferRange::from(b).compare(&BufferRange::from(a)));
    relevant.push(root);

    relevant.into_iter().find_map(|scope| {
        let owned: Vec<Node<'tree>> = definitions
            .iter()
            .copied()
            .filter(|definition| base_scope(&scopes, *definition, root).id() == scope.id())
            .collect();
        nearest(&owned, target)
    })
}

/// The innermost scope containing the start of `definition`.
fn base_scope<'tree>(scopes: &[Node<'tree>], definition: Node<'tree>, root: Node<'tree>) -> Node<'tree> {
    let start = definition.start_position();
    scopes
        .iter()
        .copied()
        .filter(|scope| scope.start_position() <= start && start <= scope.end_position())
        .max_by(|a, b| BufferRange::from(a).compare(&BufferRange::from(b)))
        .unwrap_or(root)
}

fn nearest<'tree>(definitions: &[Node<'tree>], target: BufferRange) -> Option<Node<'tree>> {
    let before = definitions
        .iter()
        .copied()
        .filter(|definition| definition.start_position() < target.start)
        .max_by_key(Node::start_position);
    before.or_else(|| {
        definitions
            .iter()
            .copied()
            .min_by_key(Node::start_position)
    })
}

fn node_text<'b>(buffer: &'b TextBuffer, node: Node<'_>) -> &'b str {
    buffer.text_between(node.start_byte(), node.end_byte())
}
