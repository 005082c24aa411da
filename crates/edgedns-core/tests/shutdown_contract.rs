//! Contract Test: Run Loop and Shutdown
//!
//! Constraints verified:
//! - The loop ticks immediately on start and drains pending tasks
//! - The executor terminates promptly on the shutdown signal
//! - A panicking handler loses only its tick; the loop keeps running
//! - Started and Stopped events bracket the run
//!
//! If this test fails, someone has added detached background work, a
//! blocking shutdown path, or let a handler panic escape the tick.

mod common;

use common::*;
use edgedns_core::ExecutorEvent;
use edgedns_core::traits::TaskStore;
use std::time::Duration;
use tokio::sync::oneshot;

async fn wait_until_drained(h: &Harness) {
    for _ in 0..100 {
        if h.store.find_pending_tasks().await.unwrap().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("tasks were not drained");
}

#[tokio::test]
async fn shutdown_signal_terminates_executor() {
    let mut h = Harness::new().await;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(h.executor.clone().run_with_shutdown(Some(shutdown_rx)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(shutdown_tx.send(()).is_ok(), "shutdown signal send succeeds");

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "Executor should terminate within 5 seconds");
    tokio_test::assert_ok!(result.unwrap().unwrap());

    let events = h.drain_events();
    assert_eq!(
        events.first(),
        Some(&ExecutorEvent::Started {
            poll_interval_secs: 10
        })
    );
    assert_eq!(
        events.last(),
        Some(&ExecutorEvent::Stopped {
            reason: "Shutdown signal".to_string()
        })
    );
}

#[tokio::test]
async fn first_tick_runs_immediately() {
    let h = Harness::new().await;
    h.store.create_server_task(SERVER_ID).await.unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(h.executor.clone().run_with_shutdown(Some(shutdown_rx)));

    // the cascaded DomainChange waits for the next period, so only check
    // that the server task itself went away
    for _ in 0..100 {
        let pending = h.store.find_pending_tasks().await.unwrap();
        if pending.iter().all(|t| t.kind.type_name() != "serverChange") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.backend.keys(DOMAIN, "edge1").len(), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn panicking_tick_does_not_stop_the_loop() {
    let h = Harness::new().await;
    h.backend.fail(DOMAIN, Failure::Panic);
    h.store.create_domain_task(DOMAIN_ID).await.unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(h.executor.clone().run_with_shutdown(Some(shutdown_rx)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished(), "loop survives the panic");

    // the task was never settled, so it is still pending
    assert_eq!(h.store.find_pending_tasks().await.unwrap().len(), 1);

    shutdown_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("executor stops after a panicked tick");
    assert!(result.unwrap().is_ok());
}

#[tokio::test]
async fn healthy_ticks_follow_a_panicked_one() {
    let h = Harness::new().await;
    h.backend.fail(DOMAIN, Failure::Panic);
    h.store.create_domain_task(DOMAIN_ID).await.unwrap();

    // a panicking tick, isolated the same way the loop isolates it
    let executor = h.executor.clone();
    let joined = tokio::spawn(async move { executor.run_once().await }).await;
    assert!(joined.unwrap_err().is_panic());

    h.backend.heal(DOMAIN);
    h.executor.run_once().await.unwrap();
    wait_until_drained(&h).await;
}
