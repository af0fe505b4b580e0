//! Chunk ordering primitives
//!
//! Pure helpers behind the transactional chunk operations in
//! [`crate::db::chunks`]: move direction, merge/split text handling and the
//! contiguity check for order values.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Separator placed between two chunk texts when they are merged
pub const MERGE_SEPARATOR: &str = "\n\n";

/// Direction for a single-step reorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward order 0
    Up,
    /// Toward the end of the manuscript
    Down,
}

impl Direction {
    /// Order of the neighbor to swap with, or `None` at the sequence boundary
    pub fn neighbor_order(self, order: i64, chunk_count: i64) -> Option<i64> {
        let target = match self {
            Direction::Up => order - 1,
            Direction::Down => order + 1,
        };
        (0..chunk_count).contains(&target).then_some(target)
    }
}

impl std::str::FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(Error::InvalidInput(format!(
                "Unknown direction '{}' (expected 'up' or 'down')",
                other
            ))),
        }
    }
}

/// Text of two merged chunks
pub fn merge_text(first: &str, second: &str) -> String {
    format!("{}{}{}", first, MERGE_SEPARATOR, second)
}

/// Split chunk text at a character offset
///
/// Requires `0 < split_point < char count`. A [`MERGE_SEPARATOR`] touching
/// or straddling the cut is dropped, so splitting a merged chunk anywhere in
/// its merge boundary restores both texts. Everything else is kept:
/// `"Hello world"` at 5 gives `"Hello"` and `" world"`, and `"Line\nnext"`
/// at 4 gives `"Line"` and `"\nnext"`.
pub fn split_text(text: &str, split_point: usize) -> Result<(String, String)> {
    let char_count = text.chars().count();
    if split_point == 0 || split_point >= char_count {
        return Err(Error::InvalidInput(format!(
            "Split point {} must be between 1 and {} for a chunk of {} characters",
            split_point,
            char_count.saturating_sub(1),
            char_count
        )));
    }

    let byte_index = text
        .char_indices()
        .nth(split_point)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    let (head, tail) = text.split_at(byte_index);

    let (head, tail) = strip_separator_at_cut(head, tail);

    if head.trim().is_empty() || tail.trim().is_empty() {
        return Err(Error::InvalidInput(format!(
            "Split point {} would leave an empty chunk",
            split_point
        )));
    }

    Ok((head.to_string(), tail.to_string()))
}

/// Remove one merge separator lying across the boundary of `head` and `tail`
fn strip_separator_at_cut<'t>(head: &'t str, tail: &'t str) -> (&'t str, &'t str) {
    for at in 0..=MERGE_SEPARATOR.len() {
        let (before, after) = MERGE_SEPARATOR.split_at(at);
        if let (Some(h), Some(t)) = (head.strip_suffix(before), tail.strip_prefix(after)) {
            return (h, t);
        }
    }
    (head, tail)
}

/// Check that order values are exactly `0..N` with no gaps or duplicates
pub fn is_contiguous(orders: &[i64]) -> bool {
    let mut sorted = orders.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(index, order)| *order == index as i64)
}
