use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    format_amount, EntryRef, FileRef, NotificationId, ReturnId, ReturnListing, ReturnRecord,
    ReturnStatus, ReturnType, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastVariant {
    Success,
    Info,
    Warning,
    Danger,
}

impl ToastVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            ToastVariant::Success => "success",
            ToastVariant::Info => "info",
            ToastVariant::Warning => "warning",
            ToastVariant::Danger => "danger",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(ToastVariant::Success),
            "info" => Some(ToastVariant::Info),
            "warning" => Some(ToastVariant::Warning),
            "danger" => Some(ToastVariant::Danger),
            _ => None,
        }
    }
}

/// A user-facing message with a severity tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub variant: ToastVariant,
    pub message: String,
}

impl Toast {
    pub fn new(variant: ToastVariant, message: impl Into<String>) -> Self {
        Self {
            variant,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastVariant::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastVariant::Info, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new(ToastVariant::Danger, message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub notification_id: NotificationId,
    pub toast: Toast,
    pub created_at: DateTime<Utc>,
}

/// One rendered row of the returns listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRow {
    pub id: ReturnId,
    pub return_code: String,
    pub return_type: ReturnType,
    pub status: ReturnStatus,
    pub original_trace_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_amount_cents: Option<i64>,
    pub amount_display: String,
    pub individual_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub eligible_for_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    pub created_at: DateTime<Utc>,
}

impl From<ReturnListing> for ReturnRow {
    fn from(listing: ReturnListing) -> Self {
        let ReturnListing {
            record,
            entry,
            file,
        } = listing;
        Self {
            id: record.id,
            amount_display: format_amount(record.original_amount_cents),
            eligible_for_review: record.status.is_reviewable(),
            return_code: record.return_code,
            return_type: record.return_type,
            status: record.status,
            original_trace_number: record.original_trace_number,
            original_amount_cents: record.original_amount_cents,
            individual_name: record.individual_name,
            return_date: record.return_date,
            reviewed_by: record.reviewed_by,
            reviewed_at: record.reviewed_at,
            entry,
            file,
            created_at: record.created_at,
        }
    }
}

/// A rendered listing page plus the canonical query string of the view
/// that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsPage {
    pub query: String,
    pub search: String,
    pub type_filter: String,
    pub status_filter: String,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
    pub rows: Vec<ReturnRow>,
}

impl ReturnsPage {
    pub fn row_ids(&self) -> Vec<ReturnId> {
        self.rows.iter().map(|row| row.id).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub record: ReturnRecord,
    pub toast: Toast,
    pub view: ReturnsPage,
}
