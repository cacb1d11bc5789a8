use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::routes::{NavigationIntent, Params, Screen};
use crate::error::Failure;
use crate::platform::NavigationSurface;
use crate::retry::{wait_until, RetryPolicy};

/// What happened to an enqueued intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
  /// Held until the surface is ready
  Queued,
  Delivered,
  Failed(Failure),
}

/// Result of draining the backlog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub delivered: usize,
  /// Intents the surface rejected; later intents were still delivered
  pub failures: Vec<(NavigationIntent, Failure)>,
}

#[derive(Debug, Default)]
struct QueueState {
  ready: bool,
  draining: bool,
  pending: VecDeque<NavigationIntent>,
}

struct QueueInner {
  surface: Arc<dyn NavigationSurface>,
  policy: RetryPolicy,
  shutdown: CancellationToken,
  state: Mutex<QueueState>,
}

/// FIFO buffer between intent producers and a navigation surface that may
/// not exist yet.
///
/// Every intent is delivered at most once and in enqueue order, including
/// intents enqueued while the backlog drains.
#[derive(Clone)]
pub struct NavigationQueue {
  inner: Arc<QueueInner>,
}

impl NavigationQueue {
  pub fn new(surface: Arc<dyn NavigationSurface>) -> Self {
    Self::with_policy(surface, RetryPolicy::default())
  }

  /// `policy` bounds the wait for the surface to attach after `set_ready`.
  pub fn with_policy(surface: Arc<dyn NavigationSurface>, policy: RetryPolicy) -> Self {
    Self {
      inner: Arc::new(QueueInner {
        surface,
        policy,
        shutdown: CancellationToken::new(),
        state: Mutex::new(QueueState::default()),
      }),
    }
  }

  fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
    self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn enqueue(&self, screen: Screen, params: Params) -> Dispatch {
    self.enqueue_intent(NavigationIntent { screen, params })
  }

  pub fn enqueue_intent(&self, intent: NavigationIntent) -> Dispatch {
    {
      let mut state = self.state();
      if !state.ready || state.draining || !state.pending.is_empty() {
        debug!(screen = ?intent.screen, queued = state.pending.len() + 1, "navigation queued");
        state.pending.push_back(intent);
        return Dispatch::Queued;
      }
    }

    match self.deliver(&intent) {
      Ok(()) => Dispatch::Delivered,
      Err(e) => Dispatch::Failed(e),
    }
  }

  fn deliver(&self, intent: &NavigationIntent) -> Result<(), Failure> {
    let route = intent.route();
    self.inner.surface.navigate(&route).map_err(|e| {
      warn!(screen = ?intent.screen, error = %e, "navigation failed");
      e
    })
  }

  /// Mark the surface ready and drain the backlog in order.
  ///
  /// Waits for the surface to attach first. If it never does, the backlog is
  /// kept and the queue stays not-ready.
  pub async fn set_ready(&self) -> Result<DrainReport, Failure> {
    {
      let mut state = self.state();
      if state.draining {
        debug!("drain already in progress");
        return Ok(DrainReport::default());
      }
      state.ready = true;
      state.draining = true;
    }

    let surface = Arc::clone(&self.inner.surface);
    if let Err(e) = wait_until(self.inner.policy, &self.inner.shutdown, || surface.is_attached()).await {
      warn!(error = %e, "navigation surface never attached");
      let mut state = self.state();
      state.ready = false;
      state.draining = false;
      return Err(e);
    }

    let mut report = DrainReport::default();
    loop {
      let next = {
        let mut state = self.state();
        match state.pending.pop_front() {
          Some(intent) => intent,
          None => {
            state.draining = false;
            break;
          }
        }
      };

      match self.deliver(&next) {
        Ok(()) => report.delivered += 1,
        Err(e) => report.failures.push((next, e)),
      }
    }

    info!(
      delivered = report.delivered,
      failed = report.failures.len(),
      "navigation queue drained"
    );
    Ok(report)
  }

  /// Drop every queued intent. Returns how many were dropped.
  pub fn clear(&self) -> usize {
    let mut state = self.state();
    let dropped = state.pending.len();
    state.pending.clear();
    dropped
  }

  pub fn pending(&self) -> Vec<NavigationIntent> {
    self.state().pending.iter().cloned().collect()
  }

  pub fn is_ready(&self) -> bool {
    self.state().ready
  }

  /// Abort any wait for the surface to attach.
  pub fn shutdown(&self) {
    self.inner.shutdown.cancel();
  }
}
