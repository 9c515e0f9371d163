//! URL-bound state of the returns listing and the component that drives it.

use std::sync::Arc;

use shared::{
    domain::{ReturnId, UserId},
    error::ApiError,
    protocol::{ReturnRow, ReturnsPage},
    query::ReturnFilter,
};
use url::form_urlencoded;

use crate::{list_returns, mark_reviewed, ApiContext, NotificationSink, ReviewReceipt};

/// Filter fields plus the current page. Lives in the query string so a view
/// can be bookmarked and survives a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnsView {
    search: String,
    type_filter: String,
    status_filter: String,
    page: u32,
}

impl Default for ReturnsView {
    fn default() -> Self {
        Self {
            search: String::new(),
            type_filter: String::new(),
            status_filter: String::new(),
            page: 1,
        }
    }
}

impl ReturnsView {
    /// Reads `search`, `type`, `status` and `page` from a query string.
    /// Unknown keys are ignored; a missing, zero or unparsable page is page 1.
    pub fn from_query(query: &str) -> Self {
        let mut view = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "search" => view.search = value.into_owned(),
                "type" => view.type_filter = value.into_owned(),
                "status" => view.status_filter = value.into_owned(),
                "page" => {
                    view.page = value
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .filter(|page| *page > 0)
                        .unwrap_or(1)
                }
                _ => {}
            }
        }
        view
    }

    /// Canonical query string; empty fields and page 1 are left out.
    pub fn to_query(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        if !self.search.is_empty() {
            out.append_pair("search", &self.search);
        }
        if !self.type_filter.is_empty() {
            out.append_pair("type", &self.type_filter);
        }
        if !self.status_filter.is_empty() {
            out.append_pair("status", &self.status_filter);
        }
        if self.page > 1 {
            out.append_pair("page", &self.page.to_string());
        }
        out.finish()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn type_filter(&self) -> &str {
        &self.type_filter
    }

    pub fn status_filter(&self) -> &str {
        &self.status_filter
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.search = text.into();
        self.page = 1;
    }

    pub fn set_type_filter(&mut self, value: impl Into<String>) {
        self.type_filter = value.into();
        self.page = 1;
    }

    pub fn set_status_filter(&mut self, value: impl Into<String>) {
        self.status_filter = value.into();
        self.page = 1;
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
    }

    pub fn filter(&self) -> ReturnFilter {
        ReturnFilter::new(
            self.search.clone(),
            self.type_filter.clone(),
            self.status_filter.clone(),
        )
    }
}

/// Long-lived binding between a [`ReturnsView`], the query layer and the
/// review action.
pub struct ReturnsComponent {
    ctx: ApiContext,
    sink: Arc<dyn NotificationSink>,
    view: ReturnsView,
}

impl ReturnsComponent {
    pub fn new(ctx: ApiContext, sink: Arc<dyn NotificationSink>, view: ReturnsView) -> Self {
        Self { ctx, sink, view }
    }

    pub fn mount(ctx: ApiContext, sink: Arc<dyn NotificationSink>, query: &str) -> Self {
        Self::new(ctx, sink, ReturnsView::from_query(query))
    }

    pub fn view(&self) -> &ReturnsView {
        &self.view
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.view.set_search(text);
    }

    pub fn set_type_filter(&mut self, value: impl Into<String>) {
        self.view.set_type_filter(value);
    }

    pub fn set_status_filter(&mut self, value: impl Into<String>) {
        self.view.set_status_filter(value);
    }

    pub fn set_page(&mut self, page: u32) {
        self.view.set_page(page);
    }

    pub async fn render(&self) -> Result<ReturnsPage, ApiError> {
        let page = list_returns(&self.ctx, &self.view.filter(), self.view.page).await?;
        let last_page = page.last_page();
        Ok(ReturnsPage {
            query: self.view.to_query(),
            search: self.view.search.clone(),
            type_filter: self.view.type_filter.clone(),
            status_filter: self.view.status_filter.clone(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            last_page,
            rows: page.items.into_iter().map(ReturnRow::from).collect(),
        })
    }

    /// Runs the review transition. Filters and page are left untouched so
    /// the next render shows the same slice of the listing.
    pub async fn mark_reviewed(
        &self,
        return_id: ReturnId,
        reviewer: UserId,
    ) -> Result<ReviewReceipt, ApiError> {
        mark_reviewed(&self.ctx, self.sink.as_ref(), return_id, reviewer).await
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
