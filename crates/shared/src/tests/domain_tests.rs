use super::*;

#[test]
fn transition_table_only_moves_forward() {
    use ReturnStatus::*;

    assert!(Received.can_transition_to(Processing));
    assert!(Received.can_transition_to(Reviewed));
    assert!(Processing.can_transition_to(Applied));
    assert!(Processing.can_transition_to(Reviewed));
    assert!(Applied.can_transition_to(Resolved));
    assert!(Reviewed.can_transition_to(Resolved));

    assert!(!Processing.can_transition_to(Received));
    assert!(!Applied.can_transition_to(Reviewed));
    assert!(!Reviewed.can_transition_to(Reviewed));
    assert!(Resolved.allowed_next().is_empty());
}

#[test]
fn rejected_transition_names_both_ends() {
    let err = ReturnStatus::Applied
        .transition_to(ReturnStatus::Received)
        .expect_err("backwards move");
    assert_eq!(err.from, ReturnStatus::Applied);
    assert_eq!(err.to, ReturnStatus::Received);
    assert_eq!(err.to_string(), "cannot move return from applied to received");
}

#[test]
fn only_received_and_processing_are_reviewable() {
    assert_eq!(
        ReturnStatus::reviewable(),
        vec![ReturnStatus::Received, ReturnStatus::Processing]
    );
}

#[test]
fn statuses_and_types_parse_from_their_wire_names() {
    for status in ReturnStatus::ALL {
        assert_eq!(status.as_str().parse::<ReturnStatus>(), Ok(status));
    }
    assert_eq!("noc".parse::<ReturnType>(), Ok(ReturnType::Noc));
    let err = "NOC".parse::<ReturnType>().expect_err("case sensitive");
    assert_eq!(err.value, "NOC");
}

#[test]
fn absent_amount_is_not_zero() {
    assert_eq!(format_amount(None), "n/a");
    assert_eq!(format_amount(Some(0)), "$0.00");
    assert_eq!(format_amount(Some(5)), "$0.05");
    assert_eq!(format_amount(Some(123_456_789)), "$1,234,567.89");
    assert_eq!(format_amount(Some(-1_050)), "-$10.50");
}

fn new_return(kind: ReturnType, amount: Option<i64>) -> NewReturn {
    NewReturn {
        return_code: "C01".into(),
        return_type: kind,
        original_trace_number: "091000019000001".into(),
        original_amount_cents: amount,
        individual_name: "Jane Roe".into(),
        return_date: None,
        entry_id: None,
        file_id: None,
        created_at: Utc::now(),
    }
}

#[test]
fn noc_with_amount_is_rejected() {
    let err = new_return(ReturnType::Noc, Some(0))
        .validate()
        .expect_err("noc amount");
    assert!(matches!(err, InvalidReturn::NocWithAmount { .. }));

    new_return(ReturnType::Noc, None).validate().expect("noc");
    new_return(ReturnType::Return, Some(0)).validate().expect("zero return");
}

#[test]
fn blank_code_is_rejected() {
    let mut record = new_return(ReturnType::Return, Some(100));
    record.return_code = "  ".into();
    assert_eq!(record.validate(), Err(InvalidReturn::EmptyCode));
}
