//! Shared response models.

use serde::{Deserialize, Deserializer, Serialize};

/// Model for endpoints that return nothing useful.
///
/// Decodes from any JSON object, `null`, or (through the dispatcher) an
/// empty body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmptyModel;

impl<'de> Deserialize<'de> for EmptyModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(Self)
    }
}

/// Pagination metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Items per page.
    pub items_per_page: Option<u32>,
    /// Total number of items.
    pub total_items: Option<u64>,
    /// Current page.
    pub current_page: Option<u32>,
    /// Total number of pages.
    pub total_pages: Option<u32>,
    /// Sort criteria as `[field, direction]` pairs.
    pub sort_by: Option<Vec<Option<Vec<String>>>>,
}

/// Navigation links between pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    /// First page.
    pub first: Option<String>,
    /// Previous page.
    pub previous: Option<String>,
    /// Current page.
    pub current: Option<String>,
    /// Next page.
    pub next: Option<String>,
    /// Last page.
    pub last: Option<String>,
}

/// Paginated list envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Pagination<T> {
    /// Items of this page.
    #[serde(default)]
    pub data: Option<Vec<T>>,
    /// Page metadata.
    #[serde(default)]
    pub meta: Option<Metadata>,
    /// Navigation links.
    #[serde(default)]
    pub links: Option<Links>,
}

impl<T> Pagination<T> {
    /// Items of this page, empty when absent.
    pub fn items(&self) -> &[T] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Returns true if there is a next page.
    pub fn has_next(&self) -> bool {
        self.links.as_ref().is_some_and(|l| l.next.is_some())
    }
}
