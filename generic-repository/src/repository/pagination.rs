//! Ordering and paging types for repository queries
//!
//! # Example
//!
//! ```rust
//! use generic_repository::repository::{OrderDirection, PagedList, Pagination};
//!
//! let window = Pagination::page(3, 10);
//! assert_eq!(window.offset, 20);
//!
//! let page = PagedList::new(vec!["u", "v", "w", "x", "y"], 25, 3, 10);
//! assert_eq!(page.total_pages(), 3);
//! assert!(page.has_previous_page());
//! assert!(!page.has_next_page());
//!
//! assert_eq!(format!("{}", OrderDirection::Descending), "desc");
//! ```

use std::fmt;

use serde::Serialize;

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Offset/limit window over a result sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Window for a 1-based page number
    ///
    /// Page 0 is treated as page 1.
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// One page of a larger result set
///
/// Navigation metadata is derived from the page number, the page size and
/// the total number of matching items counted before the page was cut.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedList<T> {
    items: Vec<T>,
    total_item_count: u64,
    page_number: u64,
    page_size: u64,
}

impl<T> PagedList<T> {
    /// Assemble a page
    ///
    /// `page_number` is 1-based.
    #[must_use]
    pub fn new(items: Vec<T>, total_item_count: u64, page_number: u64, page_size: u64) -> Self {
        Self {
            items,
            total_item_count,
            page_number,
            page_size,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn total_item_count(&self) -> u64 {
        self.total_item_count
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Number of pages needed for every item, 0 when `page_size` is 0
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_item_count.div_ceil(self.page_size)
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next_page(&self) -> bool {
        self.page_number < self.total_pages()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Convert the items, keeping the page metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedList<U> {
        PagedList {
            items: self.items.into_iter().map(f).collect(),
            total_item_count: self.total_item_count,
            page_number: self.page_number,
            page_size: self.page_size,
        }
    }
}

impl<T> IntoIterator for PagedList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_direction_display() {
        assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
        assert_eq!(format!("{}", OrderDirection::Descending), "desc");
        assert_eq!(OrderDirection::default(), OrderDirection::Ascending);
    }

    #[test]
    fn test_pagination_page() {
        let page1 = Pagination::page(1, 20);
        assert_eq!(page1.offset, 0);
        assert_eq!(page1.limit, 20);

        let page3 = Pagination::page(3, 20);
        assert_eq!(page3.offset, 40);

        let page0 = Pagination::page(0, 20);
        assert_eq!(page0.offset, 0);
    }

    #[test]
    fn test_last_partial_page() {
        let page = PagedList::new(vec![21, 22, 23, 24, 25], 25, 3, 10);
        assert_eq!(page.total_pages(), 3);
        assert!(!page.has_next_page());
        assert!(page.has_previous_page());
        assert_eq!(page.len(), 5);
    }

    #[test]
    fn test_first_page_of_many() {
        let page = PagedList::new(vec![1, 2], 5, 1, 2);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next_page());
        assert!(!page.has_previous_page());
    }

    #[test]
    fn test_exact_multiple_and_empty_sets() {
        let page = PagedList::new(vec![0; 10], 20, 2, 10);
        assert_eq!(page.total_pages(), 2);
        assert!(!page.has_next_page());

        let empty: PagedList<u8> = PagedList::new(Vec::new(), 0, 1, 10);
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next_page());
        assert!(!empty.has_previous_page());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_zero_page_size_has_no_pages() {
        let page: PagedList<u8> = PagedList::new(Vec::new(), 12, 1, 0);
        assert_eq!(page.total_pages(), 0);
        assert!(!page.has_next_page());
    }

    #[test]
    fn test_navigation_matches_ceiling_division() {
        for total in 0..40_u64 {
            for size in 1..7_u64 {
                let expected = (total + size - 1) / size;
                for number in 1..=expected.max(1) {
                    let page: PagedList<u8> = PagedList::new(Vec::new(), total, number, size);
                    assert_eq!(page.total_pages(), expected);
                    assert_eq!(page.has_next_page(), number < expected);
                    assert_eq!(page.has_previous_page(), number > 1);
                }
            }
        }
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = PagedList::new(vec![1, 2, 3], 9, 2, 3);
        let mapped = page.map(|n| n.to_string());
        assert_eq!(mapped.items(), ["1", "2", "3"]);
        assert_eq!(mapped.total_item_count(), 9);
        assert_eq!(mapped.page_number(), 2);
        assert_eq!(mapped.page_size(), 3);
    }
}
