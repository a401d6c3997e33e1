//! Accept/reject predicates for captures.
//!
//! Each [`TestKind`] is a pure function of the captured node, the claim data
//! recorded so far in this resolution pass, and the configuration values.

use std::collections::HashMap;

use tree_sitter::Node;

use super::node_path::resolve_position;
use super::resolver::{ClaimData, ResolveContext};
use super::settings::{Test, TestKind};

/// Everything a predicate may look at.
pub(crate) struct PredicateInput<'a, 'tree> {
    pub(crate) node: Node<'tree>,
    pub(crate) existing: Option<&'a ClaimData>,
    pub(crate) claims: &'a HashMap<(usize, usize), ClaimData>,
    pub(crate) context: &'a ResolveContext<'a>,
}

/// Evaluates `test`, honouring its polarity.
pub(crate) fn passes(
    test: &Test,
    input: &PredicateInput<'_, '_>,
    config_cache: &mut HashMap<String, bool>,
) -> bool {
    let value = test.value.as_deref().unwrap_or_default();
    let outcome = evaluate(test.kind, value, input, config_cache);
    outcome != test.negated
}

fn evaluate(
    kind: TestKind,
    value: &str,
    input: &PredicateInput<'_, '_>,
    config_cache: &mut HashMap<String, bool>,
) -> bool {
    let node = input.node;
    match kind {
        TestKind::Type => type_list(value).any(|kind_name| kind_name == node.kind()),
        TestKind::HasError => node.has_error(),
        TestKind::IsError => node.is_error(),
        TestKind::Root => node.parent().is_none(),
        TestKind::First => node.prev_sibling().is_none(),
        TestKind::Last => node.next_sibling().is_none(),
        TestKind::FirstOfType => {
            siblings(node, Node::prev_sibling).all(|sibling| sibling.kind() != node.kind())
        }
        TestKind::LastOfType => {
            siblings(node, Node::next_sibling).all(|sibling| sibling.kind() != node.kind())
        }
        TestKind::FirstTextOnRow => {
            let start = node.start_position();
            input
                .context
                .buffer
                .line_for_row(start.row)
                .and_then(|line| line.get(..start.column))
                .is_some_and(|before| before.trim().is_empty())
        }
        TestKind::LastTextOnRow => {
            let end = node.end_position();
            input
                .context
                .buffer
                .line_for_row(end.row)
                .and_then(|line| line.get(end.column..))
                .is_some_and(|after| after.trim().is_empty())
        }
        TestKind::ChildOfType => node
            .parent()
            .is_some_and(|parent| type_list(value).any(|kind_name| kind_name == parent.kind())),
        TestKind::DescendantOfType => {
            ancestors(node).any(|ancestor| type_list(value).any(|t| t == ancestor.kind()))
        }
        TestKind::AncestorOfType => {
            descendants(node).any(|descendant| type_list(value).any(|t| t == descendant.kind()))
        }
        TestKind::AncestorTypeNearerThan => nearer_than(ancestors(node), value),
        TestKind::DescendantTypeNearerThan => nearer_than(descendants(node), value),
        TestKind::DescendantOfNodeWithData => {
            let (key, expected) = split_key_value(value);
            ancestors(node).any(|ancestor| {
                input
                    .claims
                    .get(&(ancestor.start_byte(), ancestor.end_byte()))
                    .is_some_and(|data| data.matches(key, expected))
            })
        }
        TestKind::RangeWithData => {
            let (key, expected) = split_key_value(value);
            input
                .existing
                .is_some_and(|data| data.matches(key, expected))
        }
        TestKind::StartsOnSameRowAs => resolve_position(node, value)
            .is_some_and(|(point, _)| point.row == node.start_position().row),
        TestKind::EndsOnSameRowAs => resolve_position(node, value)
            .is_some_and(|(point, _)| point.row == node.end_position().row),
        TestKind::TextStartsWith => node_text(node, input).starts_with(value),
        TestKind::TextEndsWith => node_text(node, input).ends_with(value),
        TestKind::Config => {
            if let Some(cached) = config_cache.get(value) {
                return *cached;
            }
            let (key, expected) = split_key_value(value);
            let values = input.context.config;
            let result = expected.map_or_else(
                || values.is_truthy(key),
                |wanted| values.matches(key, wanted),
            );
            config_cache.insert(value.to_owned(), result);
            result
        }
        TestKind::Injection => input.context.depth > 0,
    }
}

fn type_list(value: &str) -> impl Iterator<Item = &str> {
    value.split_whitespace()
}

fn split_key_value(value: &str) -> (&str, Option<&str>) {
    match value.trim().split_once(char::is_whitespace) {
        Some((key, expected)) => (key, Some(expected.trim())),
        None => (value.trim(), None),
    }
}

fn node_text<'a>(node: Node<'_>, input: &PredicateInput<'a, '_>) -> &'a str {
    input
        .context
        .buffer
        .text_between(node.start_byte(), node.end_byte())
}

fn siblings<'tree>(
    node: Node<'tree>,
    next: fn(&Node<'tree>) -> Option<Node<'tree>>,
) -> impl Iterator<Item = Node<'tree>> {
    std::iter::successors(next(&node), move |current| next(current))
}

fn ancestors(node: Node<'_>) -> impl Iterator<Item = Node<'_>> {
    std::iter::successors(node.parent(), Node::parent)
}

/// Strict descendants of `node` in document order.
fn descendants(node: Node<'_>) -> impl Iterator<Item = Node<'_>> {
    let mut cursor = node.walk();
    let mut finished = !cursor.goto_first_child();
    std::iter::from_fn(move || {
        if finished {
            return None;
        }
        let current = cursor.node();
        if cursor.goto_first_child() || cursor.goto_next_sibling() {
            return Some(current);
        }
        loop {
            if !cursor.goto_parent() || cursor.node() == node {
                finished = true;
                return Some(current);
            }
            if cursor.goto_next_sibling() {
                return Some(current);
            }
        }
    })
}

/// `"target stop..."`: passes when a `target` node is met before any `stop`.
fn nearer_than<'tree>(mut nodes: impl Iterator<Item = Node<'tree>>, value: &str) -> bool {
    let mut types = type_list(value);
    let Some(target) = types.next() else {
        return false;
    };
    let stops: Vec<&str> = types.collect();
    nodes
        .find(|candidate| candidate.kind() == target || stops.contains(&candidate.kind()))
        .is_some_and(|found| found.kind() == target)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tree_sitter::Parser;

    use super::*;

    #[test]
    fn descendants_walk_in_document_order() {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .expect("language");
        let tree = parser.parse("f(a, [b]);", None).expect("tree");
        let call = tree
            .root_node()
            .named_child(0)
            .and_then(|statement| statement.named_child(0))
            .expect("call");
        let named: Vec<_> = descendants(call)
            .filter(Node::is_named)
            .map(|n| n.kind())
            .collect();
        assert_eq!(
            named,
            vec!["identifier", "arguments", "identifier", "array", "identifier"]
        );
    }

    #[rstest]
    #[case("editor.softTabs", ("editor.softTabs", None))]
    #[case(" key  value ", ("key", Some("value")))]
    #[case("key two words", ("key", Some("two words")))]
    fn key_value_arguments(#[case] value: &str, #[case] expected: (&str, Option<&str>)) {
        assert_eq!(split_key_value(value), expected);
    }
}
