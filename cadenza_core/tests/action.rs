use cadenza_core::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};

fn ok_action(value: u32) -> Action<u32> {
    Action::new(move || async move { Ok(value) })
}

fn failing_action() -> Action<u32> {
    Action::new(|| async { Err(Error::Pagination("scripted failure".into())) })
}

#[tokio::test(flavor = "current_thread")]
async fn run_async__success_callback_fires_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel::<u32>();

    let action = ok_action(5);
    let calls2 = calls.clone();
    let handle = action.run_async(
        move |v| {
            calls2.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(v);
        },
        |e| panic!("unexpected failure: {e:?}"),
    );

    assert_eq!(rx.await.unwrap(), 5);
    handle.wait().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(action.has_run());
    assert!(action.has_completed());
}

#[tokio::test(flavor = "current_thread")]
async fn run_async__failure_callback_carries_the_error() {
    let (tx, rx) = oneshot::channel::<Error>();

    let action = failing_action();
    let handle = action.run_async(
        |_| panic!("unexpected success"),
        move |e| {
            let _ = tx.send(e);
        },
    );

    let err = rx.await.unwrap();
    assert!(matches!(err, Error::Pagination(_)));
    handle.wait().await;
    assert!(action.has_run());
    assert!(!action.has_completed());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn run_after__delay_is_measured_from_invocation() {
    let (tx, rx) = oneshot::channel::<u32>();

    let action = ok_action(9);
    let _handle = action.run_after(
        Duration::from_secs(5),
        move |v| {
            let _ = tx.send(v);
        },
        |e| panic!("unexpected failure: {e:?}"),
    );

    // Nothing runs before the delay elapses.
    tokio::task::yield_now().await;
    assert!(!action.has_run());

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(rx.await.unwrap(), 9);
    assert!(action.has_run());
    assert!(action.has_completed());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cancel__before_execution_suppresses_both_callbacks() {
    let calls = Arc::new(AtomicUsize::new(0));

    let action = ok_action(1);
    let s = calls.clone();
    let f = calls.clone();
    let handle = action.run_after(
        Duration::from_secs(5),
        move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        },
        move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        },
    );

    handle.cancel();
    tokio::time::advance(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!action.has_run());
}

#[tokio::test(flavor = "current_thread")]
async fn cancel__during_execution_suppresses_both_callbacks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Notify::new());

    let started_tx = started.clone();
    let action: Action<()> = Action::new(move || {
        let started_tx = started_tx.clone();
        async move {
            started_tx.notify_one();
            // Parked until aborted.
            std::future::pending::<()>().await;
            Ok(())
        }
    });

    let s = calls.clone();
    let f = calls.clone();
    let handle = action.run_async(
        move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        },
        move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        },
    );

    started.notified().await;
    assert!(action.has_run());

    handle.cancel();
    handle.wait().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!action.has_completed());
}

#[test]
fn run_sync__blocks_and_returns_the_result() {
    let action = ok_action(11);
    assert!(!action.has_run());
    assert_eq!(action.run_sync().unwrap(), 11);
    assert!(action.has_run());
    assert!(action.has_completed());
}

#[test]
fn run_sync__propagates_errors_and_skips_completed() {
    let action = failing_action();
    let err = action.run_sync().unwrap_err();
    assert!(matches!(err, Error::Pagination(_)));
    assert!(action.has_run());
    assert!(!action.has_completed());
}
