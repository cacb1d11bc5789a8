//! Offline-first startup orchestration.

mod coordinator;
mod preload;
mod state;

pub use coordinator::{BootstrapCoordinator, BootstrapDeps, SKIPPED_VERSION_KEY};
pub use preload::{PreloadProgress, PreloadReport, Preloader};
pub use state::{decide_outcome, BootstrapEvent, BootstrapState, Outcome};
