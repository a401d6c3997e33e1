//! Dotted node paths such as `firstChild.nextSibling.endPosition`.

use tree_sitter::{Node, Point};

fn step<'tree>(node: Node<'tree>, segment: &str) -> Option<Node<'tree>> {
    match segment {
        "parent" => node.parent(),
        "firstChild" => node.child(0),
        "lastChild" => node.child(node.child_count().checked_sub(1)?),
        "firstNamedChild" => node.named_child(0),
        "lastNamedChild" => node.named_child(node.named_child_count().checked_sub(1)?),
        "nextSibling" => node.next_sibling(),
        "previousSibling" => node.prev_sibling(),
        "nextNamedSibling" => node.next_named_sibling(),
        "previousNamedSibling" => node.prev_named_sibling(),
        _ => None,
    }
}

/// Follows a dotted path of node relations from `node`.
///
/// An empty path names the node itself. Any unknown segment or missing
/// relative yields `None`.
pub(crate) fn resolve_node<'tree>(node: Node<'tree>, path: &str) -> Option<Node<'tree>> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(node, step)
}

/// Resolves a path ending in `startPosition` or `endPosition` to a
/// position and byte index.
pub(crate) fn resolve_position(node: Node<'_>, path: &str) -> Option<(Point, usize)> {
    resolve_anchor(node, path).map(|(_, point, byte)| (point, byte))
}

/// Like [`resolve_position`], also returning the node the path landed on.
pub(crate) fn resolve_anchor<'tree>(
    node: Node<'tree>,
    path: &str,
) -> Option<(Node<'tree>, Point, usize)> {
    let (relations, edge) = match path.rsplit_once('.') {
        Some((relations, edge)) => (relations, edge),
        None => ("", path),
    };
    let target = resolve_node(node, relations)?;
    match edge {
        "startPosition" => Some((target, target.start_position(), target.start_byte())),
        "endPosition" => Some((target, target.end_position(), target.end_byte())),
        _ => None,
    }
}
