//! Async transactions and after-change scheduling.

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tirea_history::{Draft, History, HistoryError, Store, StoreOptions, Value};
use tokio::sync::{mpsc, Notify};

// ============================================================================
// wrap_async
// ============================================================================

#[tokio::test]
async fn test_wrap_async_publishes_after_await() {
    let s = Store::create(json!({"n": 1})).unwrap();
    let add = s.wrap_async(|mut draft: Draft, by: i64| async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        draft.update("state.n", |n| Value::from(n.as_i64().unwrap_or(0) + by))?;
        Ok::<_, HistoryError>(draft)
    });

    let record = add(4).await.unwrap();
    assert_eq!(record.state(), &json!({"n": 5}));
    assert!(Arc::ptr_eq(&record, &s.get()));
    assert_eq!(record.prev().unwrap(), &json!({"n": 1}));
}

#[tokio::test]
async fn test_pending_async_wrap_holds_transaction() {
    let s = Store::create(json!({"n": 0})).unwrap();
    let gate = Arc::new(Notify::new());
    let wait = Arc::clone(&gate);
    let op = s.wrap_async(move |mut draft: Draft, value: i64| {
        let wait = Arc::clone(&wait);
        async move {
            wait.notified().await;
            draft.set("state.n", value)?;
            Ok::<_, HistoryError>(draft)
        }
    });

    let pending = op(7);
    assert!(matches!(s.set("state.n", 1), Err(HistoryError::TransactionInProgress)));
    assert!(matches!(op(8).await, Err(HistoryError::TransactionInProgress)));

    gate.notify_one();
    let record = pending.await.unwrap();
    assert_eq!(record.state()["n"], json!(7));

    s.set("state.n", 1).unwrap();
    assert_eq!(s.get().state()["n"], json!(1));
}

#[tokio::test]
async fn test_dropped_async_wrap_abandons_transaction() {
    let s = Store::create(json!({"n": 0})).unwrap();
    let before = s.get();
    let op = s.wrap_async(|mut draft: Draft, value: i64| async move {
        draft.set("state.n", value)?;
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok::<_, HistoryError>(draft)
    });

    drop(op(9));
    assert!(Arc::ptr_eq(&before, &s.get()));
    s.set("state.n", 2).unwrap();
    assert_eq!(s.get().state()["n"], json!(2));
}

#[tokio::test]
async fn test_async_wrap_error_publishes_nothing() {
    let s = Store::create(json!({"n": 0})).unwrap();
    let before = s.get();
    let op = s.wrap_async(|mut draft: Draft, _: ()| async move {
        draft.set("state.n", 3)?;
        Err::<Draft, _>(HistoryError::invalid_operation("remote call failed"))
    });

    assert!(op(()).await.is_err());
    assert!(Arc::ptr_eq(&before, &s.get()));
    s.set("state.n", 4).unwrap();
}

// ============================================================================
// after_change
// ============================================================================

#[tokio::test]
async fn test_after_change_scheduled_on_runtime() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let s = Store::create_with(
        json!({"n": 0}),
        StoreOptions::new().with_after_change(move |history: Arc<History>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(history.state()["n"].as_i64());
            }
        }),
    )
    .unwrap();

    s.set("state.n", 1).unwrap();
    s.set("state.n", 1).unwrap();
    s.set("state.n", 2).unwrap();

    assert_eq!(rx.recv().await, Some(Some(1)));
    assert_eq!(rx.recv().await, Some(Some(2)));
    drop(s);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_after_change_runs_inline_without_runtime() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let s = Store::create_with(
        json!({"n": 0}),
        StoreOptions::new().with_after_change(move |history: Arc<History>| {
            sink.lock().unwrap().push(history.state()["n"].as_i64());
            async {}
        }),
    )
    .unwrap();

    s.set("state.n", 5).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Some(5)]);

    s.set("state.n", 5).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}
