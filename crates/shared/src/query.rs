//! Filter state for the returns listing and the in-memory evaluation of it.
//!
//! The storage crate runs the same predicates in SQL; both paths must return
//! the same rows in the same order.

use serde::{Deserialize, Serialize};

use crate::domain::ReturnRecord;

pub const DEFAULT_PER_PAGE: u32 = 20;

/// Immutable snapshot of the three listing filters. Empty strings impose no
/// restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnFilter {
    pub search: String,
    pub return_type: String,
    pub status: String,
}

impl ReturnFilter {
    pub fn new(
        search: impl Into<String>,
        return_type: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            search: search.into(),
            return_type: return_type.into(),
            status: status.into(),
        }
    }

    pub fn search_text(&self) -> Option<&str> {
        non_empty(&self.search)
    }

    pub fn type_value(&self) -> Option<&str> {
        non_empty(&self.return_type)
    }

    pub fn status_value(&self) -> Option<&str> {
        non_empty(&self.status)
    }

    pub fn is_empty(&self) -> bool {
        self.search_text().is_none() && self.type_value().is_none() && self.status_value().is_none()
    }

    pub fn matches(&self, record: &ReturnRecord) -> bool {
        if let Some(needle) = self.search_text() {
            let needle = needle.to_ascii_lowercase();
            let in_code = record.return_code.to_ascii_lowercase().contains(&needle);
            let in_trace = record
                .original_trace_number
                .to_ascii_lowercase()
                .contains(&needle);
            if !in_code && !in_trace {
                return false;
            }
        }
        if let Some(kind) = self.type_value() {
            if record.return_type.as_str() != kind {
                return false;
            }
        }
        if let Some(status) = self.status_value() {
            if record.status.as_str() != status {
                return false;
            }
        }
        true
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn last_page(&self) -> u32 {
        if self.per_page == 0 || self.total == 0 {
            return 1;
        }
        let pages = self.total.div_ceil(u64::from(self.per_page));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn has_more(&self) -> bool {
        self.page < self.last_page()
    }
}

/// Row offset for a one-based page number. Page 0 is treated as page 1.
pub fn page_offset(page: u32, per_page: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(per_page)
}

/// Filters, orders newest-first and slices one page out of `records`.
pub fn apply(
    filter: &ReturnFilter,
    page: u32,
    per_page: u32,
    records: &[ReturnRecord],
) -> Page<ReturnRecord> {
    let mut matching: Vec<&ReturnRecord> = records.iter().filter(|r| filter.matches(r)).collect();
    matching.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.0.cmp(&a.id.0))
    });

    let page = page.max(1);
    let offset = usize::try_from(page_offset(page, per_page)).unwrap_or(usize::MAX);
    let items = matching
        .iter()
        .skip(offset)
        .take(per_page as usize)
        .map(|r| (*r).clone())
        .collect();

    Page {
        items,
        page,
        per_page,
        total: matching.len() as u64,
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
