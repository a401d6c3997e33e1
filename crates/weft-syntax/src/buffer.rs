//! In-memory text buffer and edit descriptors.
//!
//! The engine needs random access to the current text and conversions between
//! `(row, column)` positions and byte indices. [`TextBuffer`] provides exactly
//! that and nothing more; undo, markers, and display concerns live with the
//! host editor. Columns are byte offsets within a row and rows are separated
//! by `\n`.

use tree_sitter::{InputEdit, Point};

use crate::position::traverse;
use crate::range::BufferRange;

/// Text plus a table of line start offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    line_starts: Vec<usize>,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new("")
    }
}

impl TextBuffer {
    /// Creates a buffer holding `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let owned: String = text.into();
        Self {
            line_starts: compute_line_starts(&owned),
            text: owned,
        }
    }

    /// The complete buffer contents.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the buffer in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the buffer holds no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of rows; an empty buffer has one.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Index of the last row.
    #[must_use]
    pub fn last_row(&self) -> usize {
        self.line_count().saturating_sub(1)
    }

    fn line_bounds(&self, row: usize) -> Option<(usize, usize)> {
        let start = *self.line_starts.get(row)?;
        let end = self
            .line_starts
            .get(row.saturating_add(1))
            .map_or(self.text.len(), |next| next.saturating_sub(1));
        Some((start, end))
    }

    /// Text of `row` without its line terminator.
    #[must_use]
    pub fn line_for_row(&self, row: usize) -> Option<&str> {
        let (start, end) = self.line_bounds(row)?;
        self.text.get(start..end)
    }

    /// Length of `row` in bytes, or zero past the end of the buffer.
    #[must_use]
    pub fn line_length_for_row(&self, row: usize) -> usize {
        self.line_bounds(row)
            .map_or(0, |(start, end)| end.saturating_sub(start))
    }

    /// Whether `row` holds only whitespace.
    #[must_use]
    pub fn is_row_blank(&self, row: usize) -> bool {
        self.line_for_row(row)
            .is_none_or(|line| line.trim().is_empty())
    }

    /// Position just past the last character.
    #[must_use]
    pub fn end_position(&self) -> Point {
        let row = self.last_row();
        Point::new(row, self.line_length_for_row(row))
    }

    /// The whole buffer as a range.
    #[must_use]
    pub fn extent(&self) -> BufferRange {
        BufferRange::new(Point::new(0, 0), self.end_position())
    }

    /// Moves `point` onto the nearest valid position at or before it.
    #[must_use]
    pub fn clip_position(&self, point: Point) -> Point {
        if point.row > self.last_row() {
            return self.end_position();
        }
        let Some((start, end)) = self.line_bounds(point.row) else {
            return self.end_position();
        };
        let mut index = start
            .saturating_add(point.column)
            .min(end);
        while index > start && !self.text.is_char_boundary(index) {
            index = index.saturating_sub(1);
        }
        Point::new(point.row, index.saturating_sub(start))
    }

    /// Clips both ends of a range.
    #[must_use]
    pub fn clip_range(&self, range: BufferRange) -> BufferRange {
        BufferRange::new(self.clip_position(range.start), self.clip_position(range.end))
    }

    /// Byte index of `point` after clipping.
    #[must_use]
    pub fn index_for_position(&self, point: Point) -> usize {
        let clipped = self.clip_position(point);
        self.line_starts
            .get(clipped.row)
            .map_or(self.text.len(), |start| start.saturating_add(clipped.column))
    }

    /// Position of byte `index`, clipped to the buffer.
    #[must_use]
    pub fn position_for_index(&self, index: usize) -> Point {
        let mut clipped = index.min(self.text.len());
        while clipped > 0 && !self.text.is_char_boundary(clipped) {
            clipped = clipped.saturating_sub(1);
        }
        let row = self
            .line_starts
            .partition_point(|start| *start <= clipped)
            .saturating_sub(1);
        let start = self.line_starts.get(row).copied().unwrap_or(0);
        Point::new(row, clipped.saturating_sub(start))
    }

    /// Text covered by `range`.
    #[must_use]
    pub fn text_in_range(&self, range: BufferRange) -> &str {
        let start = self.index_for_position(range.start);
        let end = self.index_for_position(range.end);
        self.text.get(start..end).unwrap_or_default()
    }

    /// Text between two byte indices, empty when they are not char aligned.
    #[must_use]
    pub fn text_between(&self, start: usize, end: usize) -> &str {
        self.text.get(start..end).unwrap_or_default()
    }

    /// Moves `index` by `delta` characters, stopping at either end.
    #[must_use]
    pub fn offset_index_by_chars(&self, index: usize, delta: isize) -> usize {
        let origin = self.index_for_position(self.position_for_index(index));
        let steps = delta.unsigned_abs();
        if delta >= 0 {
            self.text
                .get(origin..)
                .and_then(|tail| tail.char_indices().nth(steps).map(|(offset, _)| offset))
                .map_or(self.text.len(), |offset| origin.saturating_add(offset))
        } else {
            self.text
                .get(..origin)
                .and_then(|head| head.char_indices().rev().nth(steps.saturating_sub(1)))
                .map_or(0, |(offset, _)| offset)
        }
    }

    /// Moves `point` by `delta` characters, crossing rows as needed.
    #[must_use]
    pub fn offset_position_by_chars(&self, point: Point, delta: isize) -> Point {
        self.position_for_index(self.offset_index_by_chars(self.index_for_position(point), delta))
    }

    /// Replaces the text in `range` and describes the change.
    pub fn set_text_in_range(&mut self, range: BufferRange, new_text: &str) -> EditDescriptor {
        let clipped = self.clip_range(range);
        let start_index = self.index_for_position(clipped.start);
        let end_index = self.index_for_position(clipped.end);
        let old_text = self.text_between(start_index, end_index).to_owned();
        self.text.replace_range(start_index..end_index, new_text);
        self.line_starts = compute_line_starts(&self.text);
        EditDescriptor {
            old_range: clipped,
            new_range: BufferRange::new(clipped.start, traverse(clipped.start, new_text)),
            old_text,
            new_text: new_text.to_owned(),
            start_index,
        }
    }
}

fn compute_line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(
            text.match_indices('\n')
                .map(|(offset, _)| offset.saturating_add(1)),
        )
        .collect()
}

/// One buffer change as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDescriptor {
    /// Range replaced, in pre-edit coordinates.
    pub old_range: BufferRange,
    /// Range of the inserted text, in post-edit coordinates.
    pub new_range: BufferRange,
    /// Text that was removed.
    pub old_text: String,
    /// Text that was inserted.
    pub new_text: String,
    /// Byte index of the change start.
    pub start_index: usize,
}

impl EditDescriptor {
    /// The equivalent Tree-sitter edit.
    #[must_use]
    pub fn input_edit(&self) -> InputEdit {
        InputEdit {
            start_byte: self.start_index,
            old_end_byte: self.start_index.saturating_add(self.old_text.len()),
            new_end_byte: self.start_index.saturating_add(self.new_text.len()),
            start_position: self.old_range.start,
            old_end_position: self.old_range.end,
            new_end_position: self.new_range.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn buffer() -> TextBuffer {
        TextBuffer::new("fn a() {\n  é\n}")
    }

    #[rstest]
    fn rows_and_lengths(buffer: TextBuffer) {
        assert_eq!(buffer.line_count(), 3);
        assert_eq!(buffer.line_for_row(1), Some("  é"));
        assert_eq!(buffer.line_length_for_row(1), 4);
        assert_eq!(buffer.line_length_for_row(9), 0);
        assert_eq!(buffer.end_position(), Point::new(2, 1));
    }

    #[rstest]
    #[case(Point::new(0, 3), 3)]
    #[case(Point::new(1, 0), 9)]
    #[case(Point::new(1, 99), 13)]
    #[case(Point::new(7, 0), 15)]
    fn index_for_position_clips(buffer: TextBuffer, #[case] point: Point, #[case] index: usize) {
        assert_eq!(buffer.index_for_position(point), index);
    }

    #[rstest]
    fn clip_backs_off_inside_multibyte_char(buffer: TextBuffer) {
        assert_eq!(buffer.clip_position(Point::new(1, 3)), Point::new(1, 2));
    }

    #[rstest]
    #[case(9, Point::new(1, 0))]
    #[case(8, Point::new(0, 8))]
    #[case(400, Point::new(2, 1))]
    fn position_for_index_round_trips_lines(
        buffer: TextBuffer,
        #[case] index: usize,
        #[case] point: Point,
    ) {
        assert_eq!(buffer.position_for_index(index), point);
    }

    #[rstest]
    #[case(9, 3, 13)]
    #[case(13, -1, 11)]
    #[case(0, -4, 0)]
    #[case(11, 40, 15)]
    fn offsets_count_characters(
        buffer: TextBuffer,
        #[case] index: usize,
        #[case] delta: isize,
        #[case] expected: usize,
    ) {
        assert_eq!(buffer.offset_index_by_chars(index, delta), expected);
    }

    #[rstest]
    fn positions_move_across_multibyte_chars(buffer: TextBuffer) {
        assert_eq!(buffer.offset_position_by_chars(Point::new(1, 2), 1), Point::new(1, 4));
        assert_eq!(buffer.offset_position_by_chars(Point::new(1, 0), -1), Point::new(0, 8));
    }

    #[test]
    fn set_text_in_range_describes_edit() {
        let mut buffer = TextBuffer::new("let x = 1;\nx");
        let edit = buffer.set_text_in_range(BufferRange::from_rows((0, 4), (0, 5)), "long\nname");
        assert_eq!(buffer.text(), "let long\nname = 1;\nx");
        assert_eq!(edit.old_text, "x");
        assert_eq!(edit.new_range, BufferRange::from_rows((0, 4), (1, 4)));

        let input = edit.input_edit();
        assert_eq!(input.start_byte, 4);
        assert_eq!(input.old_end_byte, 5);
        assert_eq!(input.new_end_byte, 13);
        assert_eq!(input.new_end_position, Point::new(1, 4));
        assert_eq!(buffer.line_count(), 3);
    }
}
