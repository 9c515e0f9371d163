use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{
        AchFileId, BatchId, EntryId, EntryRef, FileRef, NewReturn, NotificationId, ReturnId,
        ReturnListing, ReturnRecord, ReturnStatus, ReturnType, TransitionError, UserId,
    },
    protocol::{NotificationEntry, Toast, ToastVariant},
    query::{page_offset, Page, ReturnFilter},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Result of a status change attempt against a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(ReturnRecord),
    /// The record already sits in the requested status; nothing was written.
    Unchanged(ReturnRecord),
    Rejected {
        record: ReturnRecord,
        error: TransitionError,
    },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCount {
    pub status: ReturnStatus,
    pub count: i64,
}

const RETURN_COLUMNS: &str = "r.id AS id, r.return_code AS return_code, r.return_type AS return_type, \
     r.status AS status, r.original_trace_number AS original_trace_number, \
     r.original_amount_cents AS original_amount_cents, r.individual_name AS individual_name, \
     r.return_date AS return_date, r.reviewed_by AS reviewed_by, r.reviewed_at AS reviewed_at, \
     r.entry_id AS entry_id, r.file_id AS file_id, r.created_at AS created_at";

const LISTING_JOINS: &str = " FROM ach_returns r
     LEFT JOIN ach_entries e ON e.id = r.entry_id
     LEFT JOIN ach_batches b ON b.id = e.batch_id
     LEFT JOIN ach_files f ON f.id = r.file_id";

const REF_COLUMNS: &str = "e.trace_number AS entry_trace_number, e.batch_id AS entry_batch_id, \
     b.batch_number AS batch_number, f.id AS ref_file_id, f.filename AS filename";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_ach_file(
        &self,
        filename: &str,
        received_at: DateTime<Utc>,
    ) -> Result<AchFileId> {
        let rec =
            sqlx::query("INSERT INTO ach_files (filename, received_at) VALUES (?, ?) RETURNING id")
                .bind(filename)
                .bind(received_at)
                .fetch_one(&self.pool)
                .await?;
        Ok(AchFileId(rec.get::<i64, _>(0)))
    }

    pub async fn create_batch(
        &self,
        file_id: AchFileId,
        batch_number: &str,
        company_name: &str,
    ) -> Result<BatchId> {
        let rec = sqlx::query(
            "INSERT INTO ach_batches (file_id, batch_number, company_name) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(file_id.0)
        .bind(batch_number)
        .bind(company_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(BatchId(rec.get::<i64, _>(0)))
    }

    pub async fn create_entry(
        &self,
        batch_id: BatchId,
        trace_number: &str,
        amount_cents: i64,
    ) -> Result<EntryId> {
        let rec = sqlx::query(
            "INSERT INTO ach_entries (batch_id, trace_number, amount_cents) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(batch_id.0)
        .bind(trace_number)
        .bind(amount_cents)
        .fetch_one(&self.pool)
        .await?;
        Ok(EntryId(rec.get::<i64, _>(0)))
    }

    /// Stores a freshly ingested return or NOC in `received` status.
    pub async fn insert_return(&self, new: &NewReturn) -> Result<ReturnRecord> {
        new.validate()?;

        let rec = sqlx::query(
            "INSERT INTO ach_returns (
                return_code, return_type, status, original_trace_number, original_amount_cents,
                individual_name, return_date, entry_id, file_id, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(new.return_code.trim())
        .bind(new.return_type.as_str())
        .bind(ReturnStatus::Received.as_str())
        .bind(new.original_trace_number.trim())
        .bind(new.original_amount_cents)
        .bind(&new.individual_name)
        .bind(new.return_date)
        .bind(new.entry_id.map(|id| id.0))
        .bind(new.file_id.map(|id| id.0))
        .bind(new.created_at)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert return {}", new.return_code))?;

        let id = ReturnId(rec.get::<i64, _>(0));
        self.load_return(id)
            .await?
            .ok_or_else(|| anyhow!("return {id} vanished after insert"))
    }

    pub async fn load_return(&self, id: ReturnId) -> Result<Option<ReturnRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RETURN_COLUMNS} FROM ach_returns r WHERE r.id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(return_from_row).transpose()
    }

    pub async fn load_listing(&self, id: ReturnId) -> Result<Option<ReturnListing>> {
        let row = sqlx::query(&format!(
            "SELECT {RETURN_COLUMNS}, {REF_COLUMNS}{LISTING_JOINS} WHERE r.id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(listing_from_row).transpose()
    }

    /// Runs the listing filters in SQL, newest first, one page at a time.
    pub async fn search_returns(
        &self,
        filter: &ReturnFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<ReturnListing>> {
        let page = page.max(1);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ach_returns r");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("failed to count returns")?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {RETURN_COLUMNS}, {REF_COLUMNS}{LISTING_JOINS}"
        ));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
            .push_bind(i64::from(per_page))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page_offset(page, per_page)).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .context("failed to query returns")?;
        let items = rows
            .iter()
            .map(listing_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            page,
            per_page,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    /// Moves an eligible record to `reviewed`. The update is conditional on the
    /// record still being reviewable, so of two concurrent reviewers only the
    /// first one writes; the second sees `Unchanged`.
    pub async fn mark_reviewed(
        &self,
        id: ReturnId,
        reviewer: UserId,
        reviewed_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let mut update = QueryBuilder::<Sqlite>::new("UPDATE ach_returns SET status = ");
        update
            .push_bind(ReturnStatus::Reviewed.as_str())
            .push(", reviewed_by = ")
            .push_bind(reviewer.0)
            .push(", reviewed_at = ")
            .push_bind(reviewed_at)
            .push(", updated_at = ")
            .push_bind(reviewed_at)
            .push(" WHERE id = ")
            .push_bind(id.0)
            .push(" AND status IN (");
        let mut statuses = update.separated(", ");
        for status in ReturnStatus::reviewable() {
            statuses.push_bind(status.as_str());
        }
        statuses.push_unseparated(")");

        let updated = update
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to mark return {id} reviewed"))?
            .rows_affected();

        let Some(record) = self.load_return(id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if updated == 1 {
            return Ok(TransitionOutcome::Applied(record));
        }
        if record.status == ReturnStatus::Reviewed {
            return Ok(TransitionOutcome::Unchanged(record));
        }
        let error = TransitionError {
            from: record.status,
            to: ReturnStatus::Reviewed,
        };
        Ok(TransitionOutcome::Rejected { record, error })
    }

    /// Applies a status change coming from the ingestion/application side.
    /// Anything outside the transition table is rejected without a write.
    /// `reviewed` is only reachable through [`Storage::mark_reviewed`], which
    /// stamps the reviewer.
    pub async fn advance_status(&self, id: ReturnId, to: ReturnStatus) -> Result<TransitionOutcome> {
        let Some(record) = self.load_return(id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if to == ReturnStatus::Reviewed {
            let error = TransitionError {
                from: record.status,
                to,
            };
            return Ok(TransitionOutcome::Rejected { record, error });
        }
        if let Err(error) = record.status.transition_to(to) {
            return Ok(TransitionOutcome::Rejected { record, error });
        }

        let updated = sqlx::query(
            "UPDATE ach_returns SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id.0)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to move return {id} to {to}"))?
        .rows_affected();

        if updated == 0 {
            return Err(anyhow!(
                "return {id} changed status concurrently, expected {}",
                record.status
            ));
        }

        self.load_return(id)
            .await?
            .map(TransitionOutcome::Applied)
            .ok_or_else(|| anyhow!("return {id} vanished after status change"))
    }

    pub async fn count_returns_by_status(&self) -> Result<Vec<StatusCount>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) FROM ach_returns GROUP BY status ORDER BY status ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let status = r
                    .get::<String, _>(0)
                    .parse::<ReturnStatus>()
                    .map_err(anyhow::Error::from)?;
                Ok(StatusCount {
                    status,
                    count: r.get::<i64, _>(1),
                })
            })
            .collect()
    }

    pub async fn insert_notification(
        &self,
        toast: &Toast,
        created_at: DateTime<Utc>,
    ) -> Result<NotificationId> {
        let rec = sqlx::query(
            "INSERT INTO notifications (variant, message, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(toast.variant.as_str())
        .bind(&toast.message)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(NotificationId(rec.get::<i64, _>(0)))
    }

    pub async fn list_recent_notifications(&self, limit: u32) -> Result<Vec<NotificationEntry>> {
        let rows = sqlx::query(
            "SELECT id, variant, message, created_at
             FROM notifications
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let id = r.get::<i64, _>(0);
                let raw_variant = r.get::<String, _>(1);
                let variant = ToastVariant::parse(&raw_variant).ok_or_else(|| {
                    anyhow!("notification {id} has unknown variant '{raw_variant}'")
                })?;
                Ok(NotificationEntry {
                    notification_id: NotificationId(id),
                    toast: Toast {
                        variant,
                        message: r.get::<String, _>(2),
                    },
                    created_at: r.get::<DateTime<Utc>, _>(3),
                })
            })
            .collect()
    }

    /// Deletes notifications created strictly before `cutoff`.
    pub async fn prune_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to prune notifications")?;
        Ok(result.rows_affected())
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ReturnFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(search) = filter.search_text() {
        builder
            .push(" AND (instr(lower(r.return_code), lower(")
            .push_bind(search.to_string())
            .push(")) > 0 OR instr(lower(r.original_trace_number), lower(")
            .push_bind(search.to_string())
            .push(")) > 0)");
    }
    if let Some(kind) = filter.type_value() {
        builder
            .push(" AND r.return_type = ")
            .push_bind(kind.to_string());
    }
    if let Some(status) = filter.status_value() {
        builder
            .push(" AND r.status = ")
            .push_bind(status.to_string());
    }
}

fn return_from_row(row: &SqliteRow) -> Result<ReturnRecord> {
    let return_type = row
        .try_get::<String, _>("return_type")?
        .parse::<ReturnType>()?;
    let status = row.try_get::<String, _>("status")?.parse::<ReturnStatus>()?;

    Ok(ReturnRecord {
        id: ReturnId(row.try_get("id")?),
        return_code: row.try_get("return_code")?,
        return_type,
        status,
        original_trace_number: row.try_get("original_trace_number")?,
        original_amount_cents: row.try_get("original_amount_cents")?,
        individual_name: row.try_get("individual_name")?,
        return_date: row.try_get::<Option<NaiveDate>, _>("return_date")?,
        reviewed_by: row.try_get::<Option<i64>, _>("reviewed_by")?.map(UserId),
        reviewed_at: row.try_get("reviewed_at")?,
        entry_id: row.try_get::<Option<i64>, _>("entry_id")?.map(EntryId),
        file_id: row.try_get::<Option<i64>, _>("file_id")?.map(AchFileId),
        created_at: row.try_get("created_at")?,
    })
}

fn listing_from_row(row: &SqliteRow) -> Result<ReturnListing> {
    let record = return_from_row(row)?;

    let entry = match (
        record.entry_id,
        row.try_get::<Option<String>, _>("entry_trace_number")?,
        row.try_get::<Option<i64>, _>("entry_batch_id")?,
    ) {
        (Some(entry_id), Some(trace_number), Some(batch_id)) => Some(EntryRef {
            entry_id,
            trace_number,
            batch_id: BatchId(batch_id),
            batch_number: row
                .try_get::<Option<String>, _>("batch_number")?
                .unwrap_or_default(),
        }),
        _ => None,
    };

    let file = match (
        row.try_get::<Option<i64>, _>("ref_file_id")?,
        row.try_get::<Option<String>, _>("filename")?,
    ) {
        (Some(file_id), Some(filename)) => Some(FileRef {
            file_id: AchFileId(file_id),
            filename,
        }),
        _ => None,
    };

    Ok(ReturnListing {
        record,
        entry,
        file,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
