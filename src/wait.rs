//! Bounded and unbounded condition polling.
//!
//! ```text
//!   predicate() ──true──▶ return true
//!       │ false
//!       ▼
//!   ┌──────── select ────────┐
//!   │ cancel    → false      │
//!   │ deadline  → false      │  (no deadline when timeout == 0)
//!   │ tick      → predicate()│──true──▶ return true
//!   └────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Polls `predicate` until it returns true.
///
/// The predicate is evaluated immediately, then once per `interval`.
/// A zero `timeout` never times out, and neither does one too large to
/// represent as a deadline; the call then ends only when the predicate
/// succeeds or `cancel` fires. Cancellation returns false without
/// waiting out the current interval.
pub async fn run_while_false<F, Fut>(
    mut predicate: F,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if predicate().await {
        return true;
    }

    let start = Instant::now();
    // A timeout past the clock's range behaves like no timeout.
    let deadline = if timeout.is_zero() {
        None
    } else {
        start.checked_add(timeout)
    };

    let first_tick = start.checked_add(interval).unwrap_or(start);
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            _ = deadline_reached(deadline) => return false,
            _ = ticker.tick() => {
                if predicate().await {
                    return true;
                }
            }
        }
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
