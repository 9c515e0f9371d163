use super::*;

#[tokio::test]
async fn broadcast_sink_persists_and_fans_out() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let sink = BroadcastSink::new(storage.clone(), 8);
    let mut listener = sink.subscribe();

    sink.notify(Toast::success("Return R01 marked as reviewed."))
        .await;

    let received = listener.recv().await.expect("toast");
    assert_eq!(received, Toast::success("Return R01 marked as reviewed."));

    let stored = storage
        .list_recent_notifications(10)
        .await
        .expect("notifications");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].toast, received);
}

#[tokio::test]
async fn broadcast_sink_without_listeners_still_persists() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let sink = BroadcastSink::new(storage.clone(), 8);

    sink.notify(Toast::info("nobody listening")).await;

    let stored = storage
        .list_recent_notifications(10)
        .await
        .expect("notifications");
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn collecting_sink_keeps_order() {
    let sink = CollectingSink::default();
    sink.notify(Toast::info("first")).await;
    sink.notify(Toast::danger("second")).await;
    assert_eq!(
        sink.toasts(),
        vec![Toast::info("first"), Toast::danger("second")]
    );
}
