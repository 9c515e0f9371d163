use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ReturnId);
id_newtype!(AchFileId);
id_newtype!(BatchId);
id_newtype!(EntryId);
id_newtype!(NotificationId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Distinguishes a failed transaction from an informational change notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Return,
    Noc,
}

impl ReturnType {
    pub const ALL: [ReturnType; 2] = [ReturnType::Return, ReturnType::Noc];

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnType::Return => "return",
            ReturnType::Noc => "noc",
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "return type",
                value: s.to_string(),
            })
    }
}

/// Lifecycle of a return or NOC. Statuses only move forward, see
/// [`ReturnStatus::allowed_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Received,
    Processing,
    Applied,
    Reviewed,
    Resolved,
}

impl ReturnStatus {
    pub const ALL: [ReturnStatus; 5] = [
        ReturnStatus::Received,
        ReturnStatus::Processing,
        ReturnStatus::Applied,
        ReturnStatus::Reviewed,
        ReturnStatus::Resolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnStatus::Received => "received",
            ReturnStatus::Processing => "processing",
            ReturnStatus::Applied => "applied",
            ReturnStatus::Reviewed => "reviewed",
            ReturnStatus::Resolved => "resolved",
        }
    }

    /// The allowed-transition table.
    pub fn allowed_next(self) -> &'static [ReturnStatus] {
        match self {
            ReturnStatus::Received => &[ReturnStatus::Processing, ReturnStatus::Reviewed],
            ReturnStatus::Processing => &[ReturnStatus::Applied, ReturnStatus::Reviewed],
            ReturnStatus::Applied => &[ReturnStatus::Resolved],
            ReturnStatus::Reviewed => &[ReturnStatus::Resolved],
            ReturnStatus::Resolved => &[],
        }
    }

    pub fn can_transition_to(self, next: ReturnStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn transition_to(self, next: ReturnStatus) -> Result<ReturnStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_reviewable(self) -> bool {
        self.can_transition_to(ReturnStatus::Reviewed)
    }

    /// Statuses from which "mark reviewed" is allowed.
    pub fn reviewable() -> Vec<ReturnStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.is_reviewable())
            .collect()
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "return status",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move return from {from} to {to}")]
pub struct TransitionError {
    pub from: ReturnStatus,
    pub to: ReturnStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub id: ReturnId,
    pub return_code: String,
    pub return_type: ReturnType,
    pub status: ReturnStatus,
    pub original_trace_number: String,
    /// Absent for NOCs. Never collapse `None` into zero.
    pub original_amount_cents: Option<i64>,
    pub individual_name: String,
    pub return_date: Option<NaiveDate>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub entry_id: Option<EntryId>,
    pub file_id: Option<AchFileId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReturn {
    #[error("return code cannot be empty")]
    EmptyCode,
    #[error("trace number cannot be empty")]
    EmptyTraceNumber,
    #[error("notification of change {code} cannot carry an amount")]
    NocWithAmount { code: String },
}

/// A record as handed over by the ingestion side. New records always start
/// out `received`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReturn {
    pub return_code: String,
    pub return_type: ReturnType,
    pub original_trace_number: String,
    pub original_amount_cents: Option<i64>,
    pub individual_name: String,
    pub return_date: Option<NaiveDate>,
    pub entry_id: Option<EntryId>,
    pub file_id: Option<AchFileId>,
    pub created_at: DateTime<Utc>,
}

impl NewReturn {
    pub fn validate(&self) -> Result<(), InvalidReturn> {
        if self.return_code.trim().is_empty() {
            return Err(InvalidReturn::EmptyCode);
        }
        if self.original_trace_number.trim().is_empty() {
            return Err(InvalidReturn::EmptyTraceNumber);
        }
        if self.return_type == ReturnType::Noc && self.original_amount_cents.is_some() {
            return Err(InvalidReturn::NocWithAmount {
                code: self.return_code.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub entry_id: EntryId,
    pub trace_number: String,
    pub batch_id: BatchId,
    pub batch_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: AchFileId,
    pub filename: String,
}

/// A record together with the read-only references resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnListing {
    pub record: ReturnRecord,
    pub entry: Option<EntryRef>,
    pub file: Option<FileRef>,
}

/// Formats an amount for display. A missing amount reads as `n/a`, which is
/// what NOCs show; a real zero stays `$0.00`.
pub fn format_amount(amount_cents: Option<i64>) -> String {
    let Some(cents) = amount_cents else {
        return "n/a".to_string();
    };
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let dollars = (abs / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (idx, ch) in dollars.chars().enumerate() {
        if idx > 0 && (dollars.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{:02}", abs % 100)
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
