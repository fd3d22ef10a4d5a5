//! Page descriptors for ordered collections
//!
//! Page indices are zero-based and never clamped here: an out-of-range
//! page yields an empty item list with consistent navigation flags.

use serde::{Deserialize, Serialize};

/// Items per page for every list the bot renders
pub const PAGE_SIZE: usize = 5;

/// One page of an ordered collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: usize,
    /// `max(1, ceil(total / size))`; callers detect emptiness via `total_items`
    pub total_pages: usize,
    pub total_items: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    /// Build a descriptor from a pre-fetched slice and the collection total
    pub fn new(items: Vec<T>, page: usize, size: usize, total_items: usize) -> Self {
        let total_pages = total_pages(total_items, size);
        Self {
            items,
            current_page: page,
            total_pages,
            total_items,
            has_previous: page > 0,
            has_next: page.saturating_add(1) < total_pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_items == 0
    }

    /// 1-based page number for headers ("page 2 of 3")
    pub fn display_page(&self) -> usize {
        self.current_page.saturating_add(1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            total_pages: self.total_pages,
            total_items: self.total_items,
            has_previous: self.has_previous,
            has_next: self.has_next,
        }
    }
}

/// Number of pages for `total` items; zero items still report one page
pub fn total_pages(total: usize, size: usize) -> usize {
    if size == 0 {
        return 1;
    }
    total.div_ceil(size).max(1)
}

/// SQL `LIMIT`/`OFFSET` pair for a page, saturating instead of overflowing
pub fn limit_offset(page: usize, size: usize) -> (i64, i64) {
    let limit = i64::try_from(size).unwrap_or(i64::MAX);
    let offset = i64::try_from(page.saturating_mul(size)).unwrap_or(i64::MAX);
    (limit, offset)
}

/// Paginate an in-memory ordered collection
pub fn paginate<T: Clone>(all: &[T], page: usize, size: usize) -> Page<T> {
    let start = page.saturating_mul(size);
    let items = if size == 0 || start >= all.len() {
        Vec::new()
    } else {
        all.iter().skip(start).take(size).cloned().collect()
    };
    Page::new(items, page, size, all.len())
}
