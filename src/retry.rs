//! Bounded polling with cancellation.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Failure;

/// Fixed-interval retry bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub interval: Duration,
  pub max_attempts: u32,
}

impl RetryPolicy {
  pub const fn new(interval: Duration, max_attempts: u32) -> Self {
    Self {
      interval,
      max_attempts,
    }
  }
}

impl Default for RetryPolicy {
  /// 100ms apart, for at most 5 seconds.
  fn default() -> Self {
    Self::new(Duration::from_millis(100), 50)
  }
}

/// Poll `condition` until it holds.
///
/// Checks immediately, then once per interval. Fails with
/// [`Failure::RetryExhausted`] after `max_attempts` checks (at least one) and
/// with [`Failure::Cancelled`] as soon as `cancel` fires.
pub async fn wait_until<F>(
  policy: RetryPolicy,
  cancel: &CancellationToken,
  mut condition: F,
) -> Result<u32, Failure>
where
  F: FnMut() -> bool,
{
  let max_attempts = policy.max_attempts.max(1);
  for attempt in 1..=max_attempts {
    if cancel.is_cancelled() {
      return Err(Failure::Cancelled);
    }
    if condition() {
      return Ok(attempt);
    }
    if attempt == max_attempts {
      break;
    }

    debug!(attempt, "condition not met, waiting");
    tokio::select! {
      _ = cancel.cancelled() => return Err(Failure::Cancelled),
      _ = tokio::time::sleep(policy.interval) => {}
    }
  }

  Err(Failure::RetryExhausted(max_attempts))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
  use std::sync::Arc;

  #[tokio::test(start_paused = true)]
  async fn test_immediate_success() {
    let cancel = CancellationToken::new();
    assert_eq!(wait_until(RetryPolicy::default(), &cancel, || true).await, Ok(1));
  }

  #[tokio::test(start_paused = true)]
  async fn test_succeeds_after_polling() {
    let cancel = CancellationToken::new();
    let checks = AtomicU32::new(0);
    let result = wait_until(RetryPolicy::default(), &cancel, || {
      checks.fetch_add(1, Ordering::SeqCst) >= 3
    })
    .await;
    assert_eq!(result, Ok(4));
  }

  #[tokio::test(start_paused = true)]
  async fn test_exhausts() {
    let cancel = CancellationToken::new();
    let policy = RetryPolicy::new(Duration::from_millis(10), 3);
    let start = tokio::time::Instant::now();

    assert_eq!(wait_until(policy, &cancel, || false).await, Err(Failure::RetryExhausted(3)));
    assert_eq!(start.elapsed(), Duration::from_millis(20));
  }

  #[tokio::test(start_paused = true)]
  async fn test_zero_attempts_still_checks_once() {
    let cancel = CancellationToken::new();
    let policy = RetryPolicy::new(Duration::from_millis(10), 0);

    assert_eq!(wait_until(policy, &cancel, || true).await, Ok(1));
    assert_eq!(wait_until(policy, &cancel, || false).await, Err(Failure::RetryExhausted(1)));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancelled_while_waiting() {
    let cancel = CancellationToken::new();
    let flag = Arc::new(AtomicBool::new(false));

    let waiter = {
      let cancel = cancel.clone();
      let flag = flag.clone();
      tokio::spawn(async move {
        wait_until(RetryPolicy::default(), &cancel, || flag.load(Ordering::SeqCst)).await
      })
    };
    tokio::time::sleep(Duration::from_millis(250)).await;
    cancel.cancel();

    assert_eq!(waiter.await.unwrap(), Err(Failure::Cancelled));
  }
}
