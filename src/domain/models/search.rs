//! Search request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Platform reported on result sets and assigned to results lacking a provider.
pub const DEFAULT_PLATFORM: &str = "aws";

/// Filter key that constrains the provider structurally rather than by field.
pub const CLOUD_PROVIDER_FILTER: &str = "cloudProvider";

/// One search result: a flat field map, optionally carrying a `url`.
pub type SearchResult = Map<String, Value>;

/// Search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default = "default_page_number")]
    pub page_number: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

const fn default_page_number() -> usize {
    1
}

const fn default_page_size() -> usize {
    10
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            types: Vec::new(),
            filters: BTreeMap::new(),
            page_number: default_page_number(),
            page_size: default_page_size(),
        }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn page(mut self, page_number: usize, page_size: usize) -> Self {
        self.page_number = page_number;
        self.page_size = page_size;
        self
    }

    /// `[start, end)` slice of `total` ranked matches for the requested page.
    pub fn page_bounds(&self, total: usize) -> (usize, usize) {
        let size = self.page_size;
        let page = self.page_number.max(1);
        let start = size.saturating_mul(page - 1).min(total);
        let end = size.saturating_mul(page).min(total);
        (start, end)
    }
}

/// Search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultSet {
    pub total_matches: usize,
    pub platform: String,
    pub query: String,
    pub page_number: usize,
    pub page_size: usize,
    pub results: Vec<SearchResult>,
}

impl SearchResultSet {
    pub fn empty(query: &SearchQuery) -> Self {
        Self {
            total_matches: 0,
            platform: DEFAULT_PLATFORM.to_string(),
            query: query.query.clone(),
            page_number: query.page_number,
            page_size: query.page_size,
            results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_over_25_matches() {
        let q = |page| SearchQuery::new("x").page(page, 10);
        assert_eq!(q(1).page_bounds(25), (0, 10));
        assert_eq!(q(2).page_bounds(25), (10, 20));
        assert_eq!(q(3).page_bounds(25), (20, 25));
        assert_eq!(q(4).page_bounds(25), (25, 25));
    }

    #[test]
    fn test_page_zero_is_treated_as_first_page() {
        assert_eq!(SearchQuery::new("x").page(0, 5).page_bounds(12), (0, 5));
    }

    #[test]
    fn test_query_defaults_from_json() {
        let q: SearchQuery = serde_json::from_str(r#"{"query":"web"}"#).unwrap();
        assert_eq!(q.page_number, 1);
        assert_eq!(q.page_size, 10);
        assert!(q.types.is_empty());
    }
}
