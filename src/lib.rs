//! Offline-first startup orchestration for a festival guide.
//!
//! On every launch the [`bootstrap`] coordinator decides whether the app may
//! run and in which mode, keeping the [`cache`] consistent with the remote
//! source and the app's own version. Once ready, favorites become local
//! [`notifications`] and every navigation intent flows through the
//! [`navigation`] queue.

pub mod app;
pub mod bootstrap;
pub mod cache;
pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod navigation;
pub mod notifications;
pub mod platform;
pub mod retry;
pub mod update;

pub use error::Failure;
