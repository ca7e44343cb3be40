//! Diagnostic sources
//!
//! A [`DiagnosticSource`] enumerates its current problems on demand and
//! announces when they change. Sources are owned by whoever produces the
//! problems (lint, rendering, sync); the aggregator only polls them.

use std::fmt;
use std::sync::Arc;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::diagnostic::Diagnostic;

/// Callback invoked when a source's state changes
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Token returned by [`DiagnosticSource::on_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A collect call that could not produce diagnostics
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct SourceError {
    pub reason: String,
}

impl SourceError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Supplies a changing set of diagnostics.
///
/// `collect` must not touch aggregator state and should return promptly.
/// Failures are better reported as diagnostics (see
/// [`FallibleSource`](crate::FallibleSource)); an `Err` aborts the whole
/// recompute pass.
pub trait DiagnosticSource: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Append the current diagnostics to `out`
    fn collect(&self, out: &mut Vec<Diagnostic>) -> Result<(), SourceError>;

    /// Register a change callback. It may fire on any thread.
    fn on_change(&self, callback: ChangeCallback) -> ListenerId;

    /// Deregister a change callback; unknown ids are ignored
    fn off_change(&self, id: ListenerId);
}

/// Change-callback registry for source implementations
#[derive(Default)]
pub struct ChangeListeners {
    listeners: RwLock<Vec<(ListenerId, ChangeCallback)>>,
}

impl ChangeListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: ChangeCallback) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.write().push((id, callback));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        self.listeners.write().retain(|(existing, _)| *existing != id);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback. The lock is released first so callbacks may
    /// register or deregister listeners.
    pub fn fire(&self) {
        let snapshot: Vec<ChangeCallback> = self
            .listeners
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback();
        }
    }
}

impl fmt::Debug for ChangeListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeListeners")
            .field("len", &self.len())
            .finish()
    }
}
