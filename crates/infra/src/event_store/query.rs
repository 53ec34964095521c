//! Cursor pagination for read-only stream inspection.
//!
//! Cursors are stream sequence numbers, so a page boundary stays stable while new events
//! are appended behind it.

use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;

/// Pagination parameters for stream queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Return items strictly after this sequence number (0 = from the start).
    pub after: u64,
    /// Maximum number of items to return.
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            after: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    pub fn new(after: Option<u64>, limit: Option<u32>) -> Self {
        Self {
            after: after.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }
}

/// One page of results plus the cursor to continue from, if more remain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<u64>,
}

impl<T> Page<T> {
    /// Build a page from `(sequence, item)` pairs already filtered and ordered by sequence.
    pub fn collect(iter: impl IntoIterator<Item = (u64, T)>, pagination: Pagination) -> Self {
        let limit = pagination.limit as usize;
        let mut iter = iter
            .into_iter()
            .skip_while(|(seq, _)| *seq <= pagination.after)
            .peekable();

        let mut items = Vec::new();
        let mut last_seq = pagination.after;
        while items.len() < limit {
            match iter.next() {
                Some((seq, item)) => {
                    last_seq = seq;
                    items.push(item);
                }
                None => break,
            }
        }

        let next = iter.peek().map(|_| last_seq);
        Self { items, next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(Pagination::new(None, Some(0)).limit, 1);
        assert_eq!(Pagination::new(None, Some(50_000)).limit, MAX_LIMIT);
        assert_eq!(Pagination::new(None, None).limit, DEFAULT_LIMIT);
    }

    #[test]
    fn pages_resume_from_cursor() {
        let rows: Vec<(u64, char)> = vec![(1, 'a'), (2, 'b'), (4, 'c'), (7, 'd')];

        let first = Page::collect(rows.clone(), Pagination::new(None, Some(2)));
        assert_eq!(first.items, vec!['a', 'b']);
        assert_eq!(first.next, Some(2));

        let second = Page::collect(rows.clone(), Pagination::new(first.next, Some(2)));
        assert_eq!(second.items, vec!['c', 'd']);
        assert_eq!(second.next, None);
    }
}
