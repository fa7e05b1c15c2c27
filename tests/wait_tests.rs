//! Tests for condition polling.
//!
//! All tests run on tokio's paused clock, so elapsed times are exact and the
//! suite finishes instantly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kubesniff::run_while_false;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const SECOND: Duration = Duration::from_secs(1);

#[tokio::test(start_paused = true)]
async fn test_timeout_returns_false_within_window() {
    let token = CancellationToken::new();
    let start = Instant::now();

    let ok = run_while_false(|| async { false }, SECOND, SECOND, &token).await;

    let elapsed = start.elapsed();
    assert!(!ok);
    assert!(elapsed >= SECOND, "returned early: {elapsed:?}");
    assert!(elapsed < 2 * SECOND, "returned late: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_never_gives_up() {
    let token = CancellationToken::new();
    let polls = AtomicUsize::new(0);

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        run_while_false(
            || {
                polls.fetch_add(1, Ordering::SeqCst);
                async { false }
            },
            Duration::ZERO,
            SECOND,
            &token,
        ),
    )
    .await;

    assert!(outcome.is_err(), "unbounded wait must not return");
    assert!(polls.load(Ordering::SeqCst) > 3000);
}

#[tokio::test(start_paused = true)]
async fn test_returns_as_soon_as_predicate_holds() {
    let token = CancellationToken::new();
    let start = Instant::now();
    let ready_at = start + SECOND;

    let ok = run_while_false(
        || async move { Instant::now() >= ready_at },
        Duration::from_secs(5),
        SECOND,
        &token,
    )
    .await;

    assert!(ok);
    assert_eq!(start.elapsed(), SECOND);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_prompt() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let ok = run_while_false(|| async { false }, Duration::ZERO, Duration::from_secs(10), &token).await;

    assert!(!ok);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_polls_once_per_interval() {
    let token = CancellationToken::new();
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = polls.clone();

    let ok = run_while_false(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { n == 4 }
        },
        Duration::from_secs(10),
        SECOND,
        &token,
    )
    .await;

    assert!(ok);
    // immediate check plus three ticks
    assert_eq!(polls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_huge_timeout_waits_without_bound() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7200)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let timeout = Duration::from_secs(u64::MAX);
    let ok = run_while_false(|| async { false }, timeout, SECOND, &token).await;

    assert!(!ok);
    assert_eq!(start.elapsed(), Duration::from_secs(7200));
}
