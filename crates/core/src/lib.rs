//! issuehub core - shared types for the issue model
//!
//! This crate provides the ambient pieces every issuehub component uses:
//! error types, configuration, the event bus and notification dispatchers.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;

pub use config::{DispatcherKind, IssuesConfig, DEFAULT_ISSUE_CAP};
pub use dispatch::{Dispatcher, ImmediateDispatcher, ThreadDispatcher, TokioDispatcher};
pub use error::{IssueError, Result};
pub use events::{EventBus, EventSubscription, IssueEvent};

/// issuehub version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
