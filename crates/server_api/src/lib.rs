use chrono::Utc;
use shared::{
    domain::{ReturnId, ReturnListing, ReturnRecord, UserId},
    error::{ApiError, ErrorCode},
    protocol::{NotificationEntry, ReturnRow, Toast},
    query::{Page, ReturnFilter, DEFAULT_PER_PAGE},
};
use storage::{Storage, TransitionOutcome};
use tracing::{error, info, warn};

pub mod notify;
pub mod view;

pub use notify::{BroadcastSink, CollectingSink, NotificationSink};
pub use view::{ReturnsComponent, ReturnsView};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub per_page: u32,
}

impl ApiContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Outcome of a review request: the record as it now stands and the toast
/// that was sent for it.
#[derive(Debug, Clone)]
pub struct ReviewReceipt {
    pub record: ReturnRecord,
    pub toast: Toast,
}

pub async fn list_returns(
    ctx: &ApiContext,
    filter: &ReturnFilter,
    page: u32,
) -> Result<Page<ReturnListing>, ApiError> {
    ctx.storage
        .search_returns(filter, page, ctx.per_page)
        .await
        .map_err(internal)
}

pub async fn get_return(ctx: &ApiContext, return_id: ReturnId) -> Result<ReturnRow, ApiError> {
    ctx.storage
        .load_listing(return_id)
        .await
        .map_err(internal)?
        .map(ReturnRow::from)
        .ok_or_else(|| ApiError::not_found(format!("return {return_id} not found")))
}

/// Marks a return reviewed on behalf of `reviewer`.
///
/// Records in `received` or `processing` move to `reviewed`. A record that is
/// already reviewed is left as it is and reported with an info toast. Every
/// failure is surfaced as a danger toast before the error is returned.
pub async fn mark_reviewed(
    ctx: &ApiContext,
    sink: &dyn NotificationSink,
    return_id: ReturnId,
    reviewer: UserId,
) -> Result<ReviewReceipt, ApiError> {
    match review(ctx, return_id, reviewer).await {
        Ok(receipt) => {
            sink.notify(receipt.toast.clone()).await;
            Ok(receipt)
        }
        Err(err) => {
            sink.notify(Toast::danger(err.message.clone())).await;
            Err(err)
        }
    }
}

async fn review(
    ctx: &ApiContext,
    return_id: ReturnId,
    reviewer: UserId,
) -> Result<ReviewReceipt, ApiError> {
    let outcome = ctx
        .storage
        .mark_reviewed(return_id, reviewer, Utc::now())
        .await
        .map_err(|err| {
            error!(%return_id, %reviewer, error = %err, "failed to mark return reviewed");
            ApiError::internal(format!("could not mark return {return_id} reviewed"))
        })?;

    match outcome {
        TransitionOutcome::Applied(record) => {
            info!(%return_id, %reviewer, code = %record.return_code, "return marked reviewed");
            let toast = Toast::success(format!("Return {} marked as reviewed.", record.return_code));
            Ok(ReviewReceipt { record, toast })
        }
        TransitionOutcome::Unchanged(record) => {
            info!(%return_id, %reviewer, "return already reviewed");
            let toast = Toast::info(format!("Return {} was already reviewed.", record.return_code));
            Ok(ReviewReceipt { record, toast })
        }
        TransitionOutcome::Rejected { record, error } => {
            warn!(%return_id, %reviewer, status = %record.status, "return not eligible for review");
            Err(ApiError::new(
                ErrorCode::Conflict,
                format!("Return {} cannot be reviewed: {error}.", record.return_code),
            ))
        }
        TransitionOutcome::NotFound => {
            warn!(%return_id, %reviewer, "review requested for unknown return");
            Err(ApiError::not_found(format!("return {return_id} not found")))
        }
    }
}

pub async fn list_notifications(
    ctx: &ApiContext,
    limit: u32,
) -> Result<Vec<NotificationEntry>, ApiError> {
    ctx.storage
        .list_recent_notifications(limit)
        .await
        .map_err(internal)
}

/// Storage details stay in the log; clients only see a generic message.
fn internal(err: anyhow::Error) -> ApiError {
    error!(error = %format!("{err:#}"), "storage failure");
    ApiError::internal("internal storage error")
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
