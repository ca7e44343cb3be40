//! In-memory diagnostic source
//!
//! Producers push their findings into a [`ManualSource`]; every mutation
//! announces a change so registered aggregators recompute.

use parking_lot::RwLock;

use crate::diagnostic::{Diagnostic, SourceRef};
use crate::source::{ChangeCallback, ChangeListeners, DiagnosticSource, ListenerId, SourceError};

pub struct ManualSource {
    name: String,
    diagnostics: RwLock<Vec<Diagnostic>>,
    listeners: ChangeListeners,
}

impl ManualSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_diagnostics(name, Vec::new())
    }

    pub fn with_diagnostics(name: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            name: name.into(),
            diagnostics: RwLock::new(diagnostics),
            listeners: ChangeListeners::new(),
        }
    }

    /// Replace all diagnostics
    pub fn set(&self, diagnostics: Vec<Diagnostic>) {
        *self.diagnostics.write() = diagnostics;
        self.listeners.fire();
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        self.diagnostics.write().push(diagnostic);
        self.listeners.fire();
    }

    /// Drop every diagnostic pointing at `source`
    pub fn remove_for(&self, source: &SourceRef) {
        let changed = {
            let mut diagnostics = self.diagnostics.write();
            let before = diagnostics.len();
            diagnostics.retain(|d| d.source() != source);
            diagnostics.len() != before
        };
        if changed {
            self.listeners.fire();
        }
    }

    pub fn clear(&self) {
        let changed = {
            let mut diagnostics = self.diagnostics.write();
            let had_any = !diagnostics.is_empty();
            diagnostics.clear();
            had_any
        };
        if changed {
            self.listeners.fire();
        }
    }

    pub fn len(&self) -> usize {
        self.diagnostics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscribed change callbacks
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl DiagnosticSource for ManualSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, out: &mut Vec<Diagnostic>) -> Result<(), SourceError> {
        out.extend(self.diagnostics.read().iter().cloned());
        Ok(())
    }

    fn on_change(&self, callback: ChangeCallback) -> ListenerId {
        self.listeners.add(callback)
    }

    fn off_change(&self, id: ListenerId) {
        self.listeners.remove(id)
    }
}
