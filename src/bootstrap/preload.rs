//! Concurrent fetch-and-cache of every content type.

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::content::ContentKind;
use crate::error::Failure;
use crate::platform::ContentFetcher;

/// Snapshot of preload progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreloadProgress {
  pub completed: usize,
  pub total: usize,
}

/// Aggregate result of one preload pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
  pub succeeded: Vec<ContentKind>,
  /// Failed content types; the others were unaffected
  pub errors: Vec<(ContentKind, Failure)>,
}

impl PreloadReport {
  pub fn is_complete(&self) -> bool {
    self.errors.is_empty() && !self.succeeded.is_empty()
  }
}

/// Fans out one fetch+cache-write task per content type.
#[derive(Clone)]
pub struct Preloader {
  fetcher: Arc<dyn ContentFetcher>,
  cache: CacheStore,
  completed: Arc<AtomicUsize>,
  total: Arc<AtomicUsize>,
}

impl Preloader {
  pub fn new(fetcher: Arc<dyn ContentFetcher>, cache: CacheStore) -> Self {
    Self {
      fetcher,
      cache,
      completed: Arc::new(AtomicUsize::new(0)),
      total: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn progress(&self) -> PreloadProgress {
    PreloadProgress {
      completed: self.completed.load(Ordering::SeqCst),
      total: self.total.load(Ordering::SeqCst),
    }
  }

  /// Fetch and cache every kind concurrently.
  ///
  /// One kind failing never cancels or fails the others. Both a rejected and
  /// a timed-out fetch count as a failure for that kind.
  pub async fn preload(&self, kinds: &[ContentKind]) -> PreloadReport {
    self.completed.store(0, Ordering::SeqCst);
    self.total.store(kinds.len(), Ordering::SeqCst);

    let tasks = kinds.iter().map(|&kind| async move {
      let result = self.load_one(kind).await;
      let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
      debug!(%kind, done, total = kinds.len(), ok = result.is_ok(), "preload progress");
      (kind, result)
    });

    let mut report = PreloadReport::default();
    for (kind, result) in join_all(tasks).await {
      match result {
        Ok(()) => report.succeeded.push(kind),
        Err(e) => {
          warn!(%kind, error = %e, "preload failed");
          report.errors.push((kind, e));
        }
      }
    }

    info!(
      succeeded = report.succeeded.len(),
      failed = report.errors.len(),
      "preload finished"
    );
    report
  }

  async fn load_one(&self, kind: ContentKind) -> Result<(), Failure> {
    let payload = self.fetcher.fetch(kind).await?;
    if payload.is_null() {
      return Err(Failure::InvalidPayload(format!("{} payload is empty", kind)));
    }
    self.cache.save(kind.cache_key(), &payload)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::clock::SystemClock;
  use crate::platform::StaticContentFetcher;
  use serde_json::json;

  fn preloader(fetcher: Arc<StaticContentFetcher>) -> (Preloader, CacheStore) {
    let cache = CacheStore::new(Arc::new(MemoryStorage::new()), Arc::new(SystemClock));
    (Preloader::new(fetcher, cache.clone()), cache)
  }

  #[tokio::test]
  async fn test_partial_failure_is_isolated() {
    let fetcher = Arc::new(StaticContentFetcher::default());
    fetcher.set(ContentKind::Artists, json!([{"id": 1, "name": "A"}]));
    fetcher.set(ContentKind::News, json!([]));
    let (preloader, cache) = preloader(fetcher.clone());

    let report = preloader.preload(&ContentKind::ALL).await;

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.errors.len(), 4);
    assert!(!report.is_complete());
    assert!(cache.has_valid("artists"));
    assert!(cache.has_valid("news"));
    assert!(!cache.has_valid("faq"));
    assert_eq!(fetcher.calls(), 6);
    assert_eq!(preloader.progress(), PreloadProgress { completed: 6, total: 6 });
  }

  #[tokio::test]
  async fn test_complete_preload() {
    let fetcher = Arc::new(StaticContentFetcher::default());
    for kind in ContentKind::ALL {
      fetcher.set(kind, json!([]));
    }
    let (preloader, _) = preloader(fetcher);

    let report = preloader.preload(&ContentKind::ALL).await;
    assert!(report.is_complete());
  }

  #[tokio::test]
  async fn test_null_payload_counts_as_failure() {
    let fetcher = Arc::new(StaticContentFetcher::default());
    fetcher.set(ContentKind::Faq, serde_json::Value::Null);
    let (preloader, cache) = preloader(fetcher);

    let report = preloader.preload(&[ContentKind::Faq]).await;
    assert!(matches!(report.errors[0].1, Failure::InvalidPayload(_)));
    assert!(!cache.has_valid("faq"));
  }
}
