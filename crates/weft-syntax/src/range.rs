//! Point-based buffer ranges and range accumulation.

use std::cmp::Ordering;

use tree_sitter::Point;

/// A half-open span of buffer positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    /// First position in the range.
    pub start: Point,
    /// Position just past the range.
    pub end: Point,
}

impl BufferRange {
    /// Creates a range, swapping the endpoints if they are reversed.
    #[must_use]
    pub fn new(start: Point, end: Point) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// Shorthand for a range given as `(row, column)` pairs.
    #[must_use]
    pub fn from_rows(start: (usize, usize), end: (usize, usize)) -> Self {
        Self::new(Point::new(start.0, start.1), Point::new(end.0, end.1))
    }

    /// An empty range at `point`.
    #[must_use]
    pub const fn empty_at(point: Point) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    /// Whether the range covers no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `point` lies in the range, endpoints included.
    #[must_use]
    pub fn contains_point(&self, point: Point) -> bool {
        self.start <= point && point <= self.end
    }

    /// Whether `point` lies strictly inside the range.
    #[must_use]
    pub fn contains_point_exclusive(&self, point: Point) -> bool {
        self.start < point && point < self.end
    }

    /// Whether `other` lies entirely within this range.
    #[must_use]
    pub fn contains_range(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the ranges touch or overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !(other.end < self.start || self.end < other.start)
    }

    /// Whether the ranges share at least one interior position.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !(other.end <= self.start || self.end <= other.start)
    }

    /// Smallest range covering both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Number of rows the range ends below its start.
    #[must_use]
    pub const fn row_span(&self) -> usize {
        self.end.row.saturating_sub(self.start.row)
    }

    /// Ordering used for injection markers: start ascending, then the
    /// larger range first.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| other.end.cmp(&self.end))
    }
}

impl From<tree_sitter::Range> for BufferRange {
    fn from(range: tree_sitter::Range) -> Self {
        Self {
            start: range.start_point,
            end: range.end_point,
        }
    }
}

impl From<&tree_sitter::Node<'_>> for BufferRange {
    fn from(node: &tree_sitter::Node<'_>) -> Self {
        Self {
            start: node.start_position(),
            end: node.end_position(),
        }
    }
}

/// An ordered set of ranges where touching ranges are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RangeList {
    ranges: Vec<BufferRange>,
}

impl RangeList {
    pub(crate) fn add(&mut self, range: BufferRange) {
        let mut merged = range;
        self.ranges.retain(|existing| {
            if existing.intersects(&merged) {
                merged = merged.union(existing);
                false
            } else {
                true
            }
        });
        let index = self.ranges.partition_point(|existing| existing.start < merged.start);
        self.ranges.insert(index, merged);
    }

    pub(crate) fn clear(&mut self) {
        self.ranges.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &BufferRange> {
        self.ranges.iter()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The span from the first range's start to the last range's end.
    pub(crate) fn combined(&self) -> Option<BufferRange> {
        let first = self.ranges.first()?;
        let last = self.ranges.last()?;
        Some(BufferRange {
            start: first.start,
            end: last.end,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn r(start: (usize, usize), end: (usize, usize)) -> BufferRange {
        BufferRange::from_rows(start, end)
    }

    #[test]
    fn new_orders_endpoints() {
        let range = r((3, 0), (1, 2));
        assert_eq!(range.start, Point::new(1, 2));
        assert_eq!(range.end, Point::new(3, 0));
    }

    #[rstest]
    #[case(r((0, 0), (0, 5)), r((0, 5), (0, 9)), true, false)]
    #[case(r((0, 0), (0, 5)), r((0, 4), (0, 9)), true, true)]
    #[case(r((0, 0), (0, 5)), r((1, 0), (1, 9)), false, false)]
    fn intersection_flavours(
        #[case] a: BufferRange,
        #[case] b: BufferRange,
        #[case] intersects: bool,
        #[case] overlaps: bool,
    ) {
        assert_eq!(a.intersects(&b), intersects);
        assert_eq!(a.overlaps(&b), overlaps);
    }

    #[test]
    fn compare_puts_larger_range_first_on_equal_start() {
        let outer = r((0, 0), (2, 0));
        let inner = r((0, 0), (1, 0));
        assert_eq!(outer.compare(&inner), Ordering::Less);
        assert_eq!(inner.compare(&outer), Ordering::Greater);
    }

    #[test]
    fn range_list_merges_touching_ranges() {
        let mut list = RangeList::default();
        list.add(r((4, 0), (5, 0)));
        list.add(r((0, 0), (1, 0)));
        list.add(r((1, 0), (2, 0)));
        let ranges: Vec<_> = list.iter().copied().collect();
        assert_eq!(ranges, vec![r((0, 0), (2, 0)), r((4, 0), (5, 0))]);
        assert_eq!(list.combined(), Some(r((0, 0), (5, 0))));
    }
}
