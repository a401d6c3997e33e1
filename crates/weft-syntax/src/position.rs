//! Shared position helpers.
//!
//! Tree-sitter positions are zero-based with byte columns. For user-facing
//! messages we prefer one-based line and column numbers.

use tree_sitter::Point;

/// Converts a Tree-sitter position (0-based) to one-based display coordinates.
#[must_use]
pub(crate) fn point_to_one_based(pos: Point) -> (u32, u32) {
    // Line/column numbers will realistically never exceed u32::MAX.
    let line = u32::try_from(pos.row.saturating_add(1)).unwrap_or(u32::MAX);
    let column = u32::try_from(pos.column.saturating_add(1)).unwrap_or(u32::MAX);
    (line, column)
}

/// Formats a position as `line:column`, one-based.
pub(crate) fn describe_point(pos: Point) -> String {
    let (line, column) = point_to_one_based(pos);
    format!("{line}:{column}")
}

/// Returns the position reached by inserting `text` at `start`.
#[must_use]
pub(crate) fn traverse(start: Point, text: &str) -> Point {
    match text.rfind('\n') {
        Some(last_newline) => Point::new(
            start.row.saturating_add(text.matches('\n').count()),
            text.len().saturating_sub(last_newline.saturating_add(1)),
        ),
        None => Point::new(start.row, start.column.saturating_add(text.len())),
    }
}

/// Position that sorts after every real buffer position.
pub(crate) const INFINITY: Point = Point {
    row: usize::MAX,
    column: usize::MAX,
};

/// Builds a Tree-sitter range from its four components.
#[must_use]
pub(crate) const fn ts_range(
    start_byte: usize,
    end_byte: usize,
    start_point: Point,
    end_point: Point,
) -> tree_sitter::Range {
    tree_sitter::Range {
        start_byte,
        end_byte,
        start_point,
        end_point,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Point::new(0, 0), (1, 1))]
    #[case(Point::new(4, 9), (5, 10))]
    fn converts_to_one_based(#[case] point: Point, #[case] expected: (u32, u32)) {
        assert_eq!(point_to_one_based(point), expected);
    }

    #[rstest]
    #[case(Point::new(2, 3), "ab", Point::new(2, 5))]
    #[case(Point::new(2, 3), "a\nbc", Point::new(3, 2))]
    #[case(Point::new(0, 7), "\n\n", Point::new(2, 0))]
    #[case(Point::new(1, 1), "", Point::new(1, 1))]
    fn traverse_follows_newlines(#[case] start: Point, #[case] text: &str, #[case] end: Point) {
        assert_eq!(traverse(start, text), end);
    }
}
