// Pagination and find options shared by every Collection

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Parses "-hour componentId" or "-hour,componentId": a leading '-' sorts descending.
pub fn parse_sort(spec: &str) -> Vec<SortKey> {
    spec.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('-') {
            Some(field) => SortKey::desc(field),
            None => SortKey::asc(s.strip_prefix('+').unwrap_or(s)),
        })
        .collect()
}

/// Parses a comma/space separated field list ("hour aggregates,componentId").
pub fn parse_fields(spec: &str) -> Vec<String> {
    spec.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Caller-facing pagination options. `page` is 1-indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOptions {
    pub page: u64,
    pub limit: u64,
    /// None uses the collection's default ordering.
    pub sort: Option<Vec<SortKey>>,
    pub select: Option<Vec<String>>,
    pub populate: Option<Vec<String>>,
    pub max_time: Option<Duration>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_PAGE_LIMIT,
            sort: None,
            select: None,
            populate: None,
            max_time: None,
        }
    }
}

impl PageOptions {
    pub fn page(page: u64, limit: u64) -> Self {
        Self {
            page,
            limit,
            ..Self::default()
        }
    }
}

/// What a Collection receives for a single find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
    pub select: Option<Vec<String>>,
    pub populate: Option<Vec<String>>,
    pub max_time: Option<Duration>,
}

/// One page of results plus navigation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub pages: u64,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// `limit` must be non-zero (checked by the query engine before it gets here).
    pub fn new(data: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        Self {
            data,
            total,
            page,
            pages: total.div_ceil(limit),
            has_more: page.saturating_mul(limit) < total,
        }
    }
}
