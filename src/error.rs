//! Failure taxonomy shared by the startup core.
//!
//! None of these ever crash the app: callers degrade to a best-effort state.
//! They exist so each failure path can be asserted on instead of only logged.

use thiserror::Error;

/// A recoverable failure reported by a core operation or a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
  /// Local key-value storage could not be read or written.
  #[error("storage error: {0}")]
  Storage(String),

  /// The device has no connectivity.
  #[error("network unavailable")]
  Offline,

  /// A collaborator rejected the call or timed out. Both are the same signal.
  #[error("request failed: {0}")]
  Request(String),

  /// A payload did not have the expected shape.
  #[error("invalid payload: {0}")]
  InvalidPayload(String),

  /// The notification primitive failed.
  #[error("notification error: {0}")]
  Notification(String),

  /// The navigation surface failed to navigate.
  #[error("navigation error: {0}")]
  Navigation(String),

  /// The operation belonged to an attempt that has been superseded.
  #[error("operation cancelled")]
  Cancelled,

  /// A bounded retry gave up.
  #[error("gave up after {0} attempts")]
  RetryExhausted(u32),
}

impl Failure {
  pub fn storage(e: impl std::fmt::Display) -> Self {
    Failure::Storage(e.to_string())
  }

  pub fn request(e: impl std::fmt::Display) -> Self {
    Failure::Request(e.to_string())
  }
}

impl From<serde_json::Error> for Failure {
  fn from(e: serde_json::Error) -> Self {
    Failure::InvalidPayload(e.to_string())
  }
}
