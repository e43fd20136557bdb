//! Paginated result type.

use serde::{Deserialize, Serialize};

/// One page of records together with the size of the full matching set.
///
/// `total` counts every record matching the filter, independent of skip and limit,
/// so `data.len() <= total` holds whenever the store is not modified between the
/// data and count round-trips.
///
/// # Example
///
/// ```ignore
/// use docmap::page::Page;
///
/// let page = Page::new(vec!["a", "b"], 12);
/// assert_eq!(page.len(), 2);
/// assert_eq!(page.total, 12);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The records on this page, in query order.
    pub data: Vec<T>,
    /// Number of records matching the filter across all pages.
    pub total: u64,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(data: Vec<T>, total: u64) -> Self {
        Self { data, total }
    }

    /// Creates a page with no records and a zero total.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    /// Transforms every record, keeping the total.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
        }
    }

    /// Number of records on this page.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if this page holds no records.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_total() {
        let page = Page::new(vec![1, 2, 3], 30).map(|n| n * 10);

        assert_eq!(page.data, vec![10, 20, 30]);
        assert_eq!(page.total, 30);
    }

    #[test]
    fn test_empty_page() {
        let page: Page<String> = Page::default();

        assert!(page.is_empty());
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_serializes_data_and_total() {
        let value = serde_json::to_value(Page::new(vec!["a"], 1)).unwrap();

        assert_eq!(value, serde_json::json!({ "data": ["a"], "total": 1 }));
    }
}
