use chrono::{Duration, Utc};
use shared::{
    domain::{NewReturn, ReturnStatus, ReturnType, UserId},
    query::{ReturnFilter, DEFAULT_PER_PAGE},
};
use storage::{Storage, TransitionOutcome};

fn seed(code: &str, trace: &str, kind: ReturnType, age_minutes: i64) -> NewReturn {
    NewReturn {
        return_code: code.to_string(),
        return_type: kind,
        original_trace_number: trace.to_string(),
        original_amount_cents: (kind == ReturnType::Return).then_some(4_200),
        individual_name: "Pat Doe".to_string(),
        return_date: None,
        entry_id: None,
        file_id: None,
        created_at: Utc::now() - Duration::minutes(age_minutes),
    }
}

#[tokio::test]
async fn review_moves_record_out_of_received_filter_acceptance() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let r01 = storage
        .insert_return(&seed("R01", "021000020000001", ReturnType::Return, 10))
        .await
        .expect("R01");
    let c02 = storage
        .insert_return(&seed("C02", "021000020000002", ReturnType::Noc, 5))
        .await
        .expect("C02");
    for status in [ReturnStatus::Processing, ReturnStatus::Applied] {
        let outcome = storage.advance_status(c02.id, status).await.expect("advance");
        assert!(matches!(outcome, TransitionOutcome::Applied(_)));
    }

    let received = ReturnFilter::new("", "", "received");
    let page = storage
        .search_returns(&received, 1, DEFAULT_PER_PAGE)
        .await
        .expect("received");
    let codes: Vec<_> = page.items.iter().map(|l| l.record.return_code.as_str()).collect();
    assert_eq!(codes, vec!["R01"]);

    let page = storage
        .search_returns(&ReturnFilter::new("R0", "", ""), 1, DEFAULT_PER_PAGE)
        .await
        .expect("search");
    let codes: Vec<_> = page.items.iter().map(|l| l.record.return_code.as_str()).collect();
    assert_eq!(codes, vec!["R01"]);

    let outcome = storage
        .mark_reviewed(r01.id, UserId(42), Utc::now())
        .await
        .expect("review");
    let TransitionOutcome::Applied(reviewed) = outcome else {
        panic!("expected applied, got {outcome:?}");
    };
    assert_eq!(reviewed.status, ReturnStatus::Reviewed);
    assert_eq!(reviewed.reviewed_by, Some(UserId(42)));
    assert!(reviewed.reviewed_at.is_some());

    let page = storage
        .search_returns(&received, 1, DEFAULT_PER_PAGE)
        .await
        .expect("received");
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());
}
