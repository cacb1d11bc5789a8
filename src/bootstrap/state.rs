use serde::Serialize;

use crate::update::UpdateInfo;

/// The startup decision the presentation layer renders.
///
/// Exactly one is active at a time. Every attempt starts in `Loading` and ends
/// in one of the other variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum BootstrapState {
  Loading,
  /// Blocks; only the store flow gets out of it
  UpdateRequired { update: UpdateInfo },
  /// Blocks until the user updates or skips
  UpdateOptional { update: UpdateInfo },
  ReadyOnline,
  /// Running on cached data
  ReadyOffline,
  /// Offline with no usable cache; retry or regained connectivity gets out
  OfflineBlocked,
}

/// How a completed attempt settled when no update gate stopped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  ReadyOnline,
  ReadyOffline,
  OfflineBlocked,
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapEvent {
  /// A new attempt starts (launch, retry or regained connectivity)
  Begin,
  /// The user postponed the optional update
  SkipUpdate,
  UpdateForced(UpdateInfo),
  UpdateAvailable(UpdateInfo),
  Settled(Outcome),
}

impl BootstrapState {
  /// The single transition function. `None` marks an illegal transition.
  pub fn apply(&self, event: BootstrapEvent) -> Option<BootstrapState> {
    use BootstrapEvent as E;
    use BootstrapState as S;

    match (self, event) {
      (_, E::Begin) => Some(S::Loading),
      (S::UpdateOptional { .. }, E::SkipUpdate) => Some(S::Loading),
      (S::Loading, E::UpdateForced(update)) => Some(S::UpdateRequired { update }),
      (S::Loading, E::UpdateAvailable(update)) => Some(S::UpdateOptional { update }),
      (S::Loading, E::Settled(outcome)) => Some(outcome.into()),
      (_, E::SkipUpdate | E::UpdateForced(_) | E::UpdateAvailable(_) | E::Settled(_)) => None,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, BootstrapState::Loading)
  }

  /// Whether the app may proceed past the startup gate.
  pub fn is_ready(&self) -> bool {
    matches!(self, BootstrapState::ReadyOnline | BootstrapState::ReadyOffline)
  }

  pub fn name(&self) -> &'static str {
    match self {
      BootstrapState::Loading => "loading",
      BootstrapState::UpdateRequired { .. } => "update-required",
      BootstrapState::UpdateOptional { .. } => "update-optional",
      BootstrapState::ReadyOnline => "ready-online",
      BootstrapState::ReadyOffline => "ready-offline",
      BootstrapState::OfflineBlocked => "offline-blocked",
    }
  }
}

impl From<Outcome> for BootstrapState {
  fn from(outcome: Outcome) -> Self {
    match outcome {
      Outcome::ReadyOnline => BootstrapState::ReadyOnline,
      Outcome::ReadyOffline => BootstrapState::ReadyOffline,
      Outcome::OfflineBlocked => BootstrapState::OfflineBlocked,
    }
  }
}

impl std::fmt::Display for BootstrapState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// Decide where an attempt lands once connectivity and preload are known.
///
/// - online, preload complete and cache valid: ready-online
/// - any usable cache otherwise (stale-but-usable): ready-offline
/// - nothing cached: offline-blocked
pub fn decide_outcome(
  online: bool,
  preload_complete: bool,
  had_cache: bool,
  has_cache_now: bool,
) -> Outcome {
  if online && preload_complete && has_cache_now {
    Outcome::ReadyOnline
  } else if had_cache || has_cache_now {
    Outcome::ReadyOffline
  } else {
    Outcome::OfflineBlocked
  }
}
