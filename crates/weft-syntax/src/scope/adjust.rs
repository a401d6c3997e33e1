//! Range adjustments applied to captures before they are stored.

use std::collections::HashMap;

use regex::Regex;
use tree_sitter::{Node, Range};

use super::node_path::resolve_position;
use super::settings::{Adjustment, AdjustmentKind};
use crate::buffer::TextBuffer;

/// Compiled regular expressions keyed by their source.
///
/// Sources that fail to compile are remembered too, so the warning is
/// logged once per resolver.
#[derive(Debug, Default)]
pub(crate) struct PatternCache {
    compiled: HashMap<String, Option<Regex>>,
}

impl PatternCache {
    pub(crate) fn get(&mut self, source: &str) -> Option<&Regex> {
        self.compiled
            .entry(source.to_owned())
            .or_insert_with(|| match Regex::new(source) {
                Ok(regex) => Some(regex),
                Err(error) => {
                    tracing::warn!(
                        target: "weft_syntax::scope",
                        pattern = source,
                        %error,
                        "adjustment pattern does not compile"
                    );
                    None
                }
            })
            .as_ref()
    }

    pub(crate) fn clear(&mut self) {
        self.compiled.clear();
    }
}

/// Applies one adjustment to `range`.
///
/// Returns `None` when the adjustment cannot be satisfied, which rejects
/// the capture outright.
pub(crate) fn apply(
    adjustment: &Adjustment,
    node: Node<'_>,
    range: Range,
    buffer: &TextBuffer,
    patterns: &mut PatternCache,
) -> Option<Range> {
    let value = adjustment.value.as_str();
    let mut adjusted = range;
    match adjustment.kind {
        AdjustmentKind::StartAt => {
            let (point, index) = resolve_position(node, value)?;
            adjusted.start_point = point;
            adjusted.start_byte = index;
        }
        AdjustmentKind::EndAt => {
            let (point, index) = resolve_position(node, value)?;
            adjusted.end_point = point;
            adjusted.end_byte = index;
        }
        AdjustmentKind::OffsetStart => {
            let delta = value.trim().parse::<isize>().ok()?;
            adjusted.start_byte = buffer.offset_index_by_chars(range.start_byte, delta);
            adjusted.start_point = buffer.position_for_index(adjusted.start_byte);
        }
        AdjustmentKind::OffsetEnd => {
            let delta = value.trim().parse::<isize>().ok()?;
            adjusted.end_byte = buffer.offset_index_by_chars(range.end_byte, delta);
            adjusted.end_point = buffer.position_for_index(adjusted.end_byte);
        }
        AdjustmentKind::StartAndEndAroundFirstMatchOf
        | AdjustmentKind::StartBeforeFirstMatchOf
        | AdjustmentKind::StartAfterFirstMatchOf
        | AdjustmentKind::EndBeforeFirstMatchOf
        | AdjustmentKind::EndAfterFirstMatchOf => {
            let regex = patterns.get(value)?;
            let text = buffer.text_between(node.start_byte(), node.end_byte());
            let found = regex.find(text)?;
            let match_start = node.start_byte().saturating_add(found.start());
            let match_end = node.start_byte().saturating_add(found.end());
            let (new_start, new_end) = match adjustment.kind {
                AdjustmentKind::StartAndEndAroundFirstMatchOf => {
                    (Some(match_start), Some(match_end))
                }
                AdjustmentKind::StartBeforeFirstMatchOf => (Some(match_start), None),
                AdjustmentKind::StartAfterFirstMatchOf => (Some(match_end), None),
                AdjustmentKind::EndBeforeFirstMatchOf => (None, Some(match_start)),
                _ => (None, Some(match_end)),
            };
            if let Some(index) = new_start {
                adjusted.start_byte = index;
                adjusted.start_point = buffer.position_for_index(index);
            }
            if let Some(index) = new_end {
                adjusted.end_byte = index;
                adjusted.end_point = buffer.position_for_index(index);
            }
        }
    }
    Some(adjusted)
}
