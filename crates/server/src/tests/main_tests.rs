use super::*;
use axum::{body, body::Body, http::Request};
use chrono::{Duration, Utc};
use shared::{
    domain::{NewReturn, ReturnRecord, ReturnStatus, ReturnType},
    protocol::ToastVariant,
};
use tower::ServiceExt;

async fn test_app() -> (Router, Storage, ReturnRecord, ReturnRecord) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let now = Utc::now();
    let r01 = storage
        .insert_return(&NewReturn {
            return_code: "R01".into(),
            return_type: ReturnType::Return,
            original_trace_number: "031000050000001".into(),
            original_amount_cents: Some(25_000),
            individual_name: "Alex Kim".into(),
            return_date: None,
            entry_id: None,
            file_id: None,
            created_at: now - Duration::minutes(2),
        })
        .await
        .expect("R01");
    let c02 = storage
        .insert_return(&NewReturn {
            return_code: "C02".into(),
            return_type: ReturnType::Noc,
            original_trace_number: "031000050000002".into(),
            original_amount_cents: None,
            individual_name: "Jo Park".into(),
            return_date: None,
            entry_id: None,
            file_id: None,
            created_at: now - Duration::minutes(1),
        })
        .await
        .expect("C02");
    for status in [ReturnStatus::Processing, ReturnStatus::Applied] {
        storage
            .advance_status(c02.id, status)
            .await
            .expect("advance");
    }

    let state = AppState::new(ApiContext::new(storage.clone()), 32);
    let app = build_router(Arc::new(state));
    (app, storage, r01, c02)
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn review_request(uri: String, reviewer: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri);
    if let Some(reviewer) = reviewer {
        builder = builder.header(REVIEWER_HEADER, reviewer);
    }
    builder.body(Body::empty()).expect("request")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage, _r01, _c02) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn list_route_applies_filters_from_query_string() {
    let (app, _storage, r01, _c02) = test_app().await;

    let request = Request::get("/returns?status=received&page=1")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let page: ReturnsPage = json_body(response).await;
    assert_eq!(page.row_ids(), vec![r01.id]);
    assert_eq!(page.query, "status=received");
    assert_eq!(page.rows[0].amount_display, "$250.00");

    let request = Request::get("/returns?search=c0")
        .body(Body::empty())
        .expect("request");
    let page: ReturnsPage = json_body(app.oneshot(request).await.expect("response")).await;
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.rows[0].return_code, "C02");
    assert_eq!(page.rows[0].amount_display, "n/a");
    assert!(!page.rows[0].eligible_for_review);
}

#[tokio::test]
async fn get_route_returns_404_for_unknown_record() {
    let (app, _storage, r01, _c02) = test_app().await;

    let found = Request::get(format!("/returns/{}", r01.id.0))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(found).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let missing = Request::get("/returns/9999")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(missing).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn review_requires_reviewer_identity() {
    let (app, storage, r01, _c02) = test_app().await;

    let response = app
        .oneshot(review_request(format!("/returns/{}/review", r01.id.0), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let record = storage.load_return(r01.id).await.expect("load").expect("some");
    assert_eq!(record.status, ReturnStatus::Received);
}

#[tokio::test]
async fn review_route_updates_record_and_rerenders_view() {
    let (app, _storage, r01, _c02) = test_app().await;

    let response = app
        .clone()
        .oneshot(review_request(
            format!("/returns/{}/review?status=received", r01.id.0),
            Some("42"),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let review: ReviewResponse = json_body(response).await;
    assert_eq!(review.record.status, ReturnStatus::Reviewed);
    assert_eq!(review.record.reviewed_by, Some(UserId(42)));
    assert_eq!(review.toast.variant, ToastVariant::Success);
    assert!(review.toast.message.contains("R01"));
    assert_eq!(review.view.query, "status=received");
    assert_eq!(review.view.total, 0);

    let request = Request::get("/notifications")
        .body(Body::empty())
        .expect("request");
    let entries: Vec<NotificationEntry> =
        json_body(app.oneshot(request).await.expect("response")).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].toast, review.toast);
}

#[tokio::test]
async fn review_route_maps_failures_to_status_codes() {
    let (app, _storage, _r01, c02) = test_app().await;

    let conflict = app
        .clone()
        .oneshot(review_request(
            format!("/returns/{}/review", c02.id.0),
            Some("42"),
        ))
        .await
        .expect("response");
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    let missing = app
        .clone()
        .oneshot(review_request("/returns/9999/review".to_string(), Some("42")))
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let request = Request::get("/notifications?limit=10")
        .body(Body::empty())
        .expect("request");
    let entries: Vec<NotificationEntry> =
        json_body(app.oneshot(request).await.expect("response")).await;
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .all(|entry| entry.toast.variant == ToastVariant::Danger));
}

#[tokio::test]
async fn malformed_return_id_is_a_json_validation_error() {
    let (app, _storage, _r01, _c02) = test_app().await;

    let request = Request::get("/returns/abc")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::Validation);

    let response = app
        .oneshot(review_request("/returns/abc/review".to_string(), Some("42")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::Validation);
}
