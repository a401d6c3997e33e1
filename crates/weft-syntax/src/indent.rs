//! Indentation hints from an `indents` query.
//!
//! Two passes decide a row's level. The first reads the comparison row (the
//! nearest non-blank row above) for `@indent`, `@dedent` and `@dedent.next`
//! captures; the second reads the row itself for `@dedent`, `@match` and
//! `@none`. Levels are whole tab stops.

use std::collections::HashSet;

use tree_sitter::{Node, Point};

use crate::grammar::CompiledQuery;
use crate::range::BufferRange;
use crate::scope::{Capture, ResolveContext, ScopeResolver, resolve_position};

const ALLOW_EMPTY: &str = "indent.allowEmpty";
const FORCE: &str = "indent.force";
const MATCH_INDENT_OF: &str = "indent.matchIndentOf";
const OFFSET_INDENT: &str = "indent.offsetIndent";

/// Indentation level of `line`, in whole tab stops.
///
/// Leading spaces count one column each; a tab advances to the next tab
/// stop. Partial levels round down. A `tab_length` of zero yields zero.
#[must_use]
pub fn indent_level_for_line(line: &str, tab_length: usize) -> usize {
    let mut indent_length: usize = 0;
    for ch in line.chars() {
        match ch {
            '\t' => {
                let into_stop = indent_length.checked_rem(tab_length).unwrap_or(0);
                indent_length = indent_length.saturating_add(tab_length.saturating_sub(into_stop));
            }
            ' ' => indent_length = indent_length.saturating_add(1),
            _ => break,
        }
    }
    indent_length.checked_div(tab_length).unwrap_or(0)
}

/// What an indents lookup needs from its layer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndentInput<'a, 'tree> {
    pub(crate) root: Node<'tree>,
    pub(crate) query: &'a CompiledQuery,
    pub(crate) context: ResolveContext<'a>,
}

impl<'a, 'tree> IndentInput<'a, 'tree> {
    /// Captures on `row` that pass their tests, between `from` and `to`.
    fn captures_on_row(&self, row: usize, from: Point, to: Point) -> Vec<Capture<'tree, 'a>> {
        let mut resolver = ScopeResolver::default();
        self.query
            .captures(
                self.root,
                self.context.buffer.text(),
                Some(BufferRange::new(from, to)),
            )
            .into_iter()
            .filter(|capture| {
                let node = capture.node;
                if node.start_byte() == node.end_byte()
                    && !capture.settings.has_property(ALLOW_EMPTY)
                {
                    return false;
                }
                node.end_position().row >= row && node.start_position().row <= row
            })
            .filter(|capture| resolver.accept(capture, &self.context).is_some())
            .collect()
    }
}

/// Net level change the comparison row asks of the row below it.
///
/// An `@indent` adds one level; a `@dedent` that comes after the first
/// indent on the row cancels one. The result is clamped to `0..=1` before
/// a `@dedent.next` takes one level away.
pub(crate) fn indent_delta(input: &IndentInput<'_, '_>, comparison_row: usize, row: usize) -> isize {
    let captures = input.captures_on_row(
        comparison_row,
        Point::new(comparison_row, 0),
        Point::new(row, 0),
    );
    let mut seen = HashSet::new();
    let mut indent_position: Option<Point> = None;
    let mut delta: isize = 0;
    let mut dedent_next: isize = 0;
    for capture in captures {
        let node = capture.node;
        if !seen.insert((capture.name, node.start_byte(), node.end_byte())) {
            continue;
        }
        match capture.name {
            "indent" => {
                indent_position.get_or_insert(node.end_position());
                delta = delta.saturating_add(1);
            }
            "dedent.next" => dedent_next = dedent_next.saturating_add(1),
            "dedent" => {
                if indent_position.is_none_or(|position| node.start_position() < position) {
                    continue;
                }
                delta = delta.saturating_sub(1).max(0);
            }
            _ => {}
        }
    }
    delta.clamp(0, 1).saturating_sub(dedent_next.clamp(0, 1))
}

/// Outcome of examining the row being indented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowIndent {
    /// Adjust the level by this much (`-1..=0`).
    Delta(isize),
    /// Use this exact level.
    Exact(usize),
}

/// Reads `@dedent`, `@match` and `@none` captures on `row` itself.
///
/// Captures only count when their text starts the row, unless they carry
/// `indent.force`.
pub(crate) fn row_indent(input: &IndentInput<'_, '_>, row: usize, tab_length: usize) -> RowIndent {
    let buffer = input.context.buffer;
    let row_text = buffer.line_for_row(row).unwrap_or_default().trim();
    let captures = input.captures_on_row(
        row,
        Point::new(row, 0),
        Point::new(row.saturating_add(1), 0),
    );
    let mut seen = HashSet::new();
    let mut delta: isize = 0;
    for capture in captures {
        let node = capture.node;
        let text = buffer.text_between(node.start_byte(), node.end_byte());
        if !capture.settings.has_property(FORCE) && !row_text.starts_with(text) {
            continue;
        }
        match capture.name {
            "match" => {
                if let Some(level) = match_level(&capture, input, row, tab_length) {
                    return RowIndent::Exact(level);
                }
            }
            "none" => return RowIndent::Exact(0),
            "dedent" => {
                if seen.insert((node.start_byte(), node.end_byte())) {
                    delta = delta.saturating_sub(1);
                }
            }
            _ => {}
        }
    }
    RowIndent::Delta(delta.clamp(-1, 0))
}

/// Level of the row a `@match` capture points at, plus its offset.
fn match_level(
    capture: &Capture<'_, '_>,
    input: &IndentInput<'_, '_>,
    row: usize,
    tab_length: usize,
) -> Option<usize> {
    let path = capture.settings.property(MATCH_INDENT_OF)?;
    let offset = capture
        .settings
        .property(OFFSET_INDENT)
        .and_then(|value| value.trim().parse::<isize>().ok())
        .unwrap_or(0);
    let (target, _) = resolve_position(capture.node, path)?;
    if target.row >= row {
        return None;
    }
    let line = input.context.buffer.line_for_row(target.row).unwrap_or_default();
    Some(indent_level_for_line(line, tab_length).saturating_add_signed(offset))
}
