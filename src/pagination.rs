//! Offset pagination over `skip`/`limit`/`total` list endpoints.

use serde::{Deserialize, Serialize};

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
}

impl<T> Page<T> {
    /// Offset of the page after this one, or `None` at the end.
    ///
    /// A zero `limit` never advances.
    #[must_use]
    pub fn next_skip(&self) -> Option<u64> {
        if self.limit == 0 {
            return None;
        }
        let next = self.skip.saturating_add(self.limit);
        (next < self.total).then_some(next)
    }
}

/// Pages fetched so far for one list, in fetch order.
#[derive(Debug, Clone)]
pub struct PageSet<T> {
    pages: Vec<Page<T>>,
    page_size: u64,
}

impl<T> PageSet<T> {
    #[must_use]
    pub fn new(page_size: u64) -> Self {
        Self { pages: Vec::new(), page_size }
    }

    #[must_use]
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn push(&mut self, page: Page<T>) {
        self.pages.push(page);
    }

    #[must_use]
    pub fn pages(&self) -> &[Page<T>] {
        &self.pages
    }

    /// Offset to request next. Starts at 0 before any page is loaded.
    #[must_use]
    pub fn next_skip(&self) -> Option<u64> {
        match self.pages.last() {
            None => Some(0),
            Some(last) => last.next_skip(),
        }
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.next_skip().is_some()
    }

    /// Items of every loaded page, flattened in order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items().next().is_none()
    }
}

#[cfg(test)]
#[path = "pagination_test.rs"]
mod tests;
