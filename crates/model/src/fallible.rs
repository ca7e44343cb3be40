//! Failure-reifying source adapter
//!
//! The aggregator has no per-source error channel, so a collector that can
//! fail is wrapped here: an `Err` becomes one Error diagnostic instead of
//! aborting the pass for every other source.

use std::fmt::Display;

use crate::diagnostic::Diagnostic;
use crate::source::{ChangeCallback, ChangeListeners, DiagnosticSource, ListenerId, SourceError};

/// Summary of the diagnostic reported when the wrapped collector fails
pub const SOURCE_UNAVAILABLE: &str = "source unavailable";

pub struct FallibleSource<F> {
    name: String,
    category: String,
    collector: F,
    listeners: ChangeListeners,
}

impl<F, E> FallibleSource<F>
where
    F: Fn() -> Result<Vec<Diagnostic>, E> + Send + Sync,
    E: Display,
{
    pub fn new(name: impl Into<String>, collector: F) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            collector,
            listeners: ChangeListeners::new(),
        }
    }

    /// Category given to the failure diagnostic
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Announce that the collector would now return something different
    pub fn notify_changed(&self) {
        self.listeners.fire();
    }
}

impl<F, E> DiagnosticSource for FallibleSource<F>
where
    F: Fn() -> Result<Vec<Diagnostic>, E> + Send + Sync,
    E: Display,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, out: &mut Vec<Diagnostic>) -> Result<(), SourceError> {
        match (self.collector)() {
            Ok(diagnostics) => out.extend(diagnostics),
            Err(e) => {
                tracing::debug!("Issue source '{}' unavailable: {}", self.name, e);
                out.push(
                    Diagnostic::error(SOURCE_UNAVAILABLE)
                        .with_description(format!("{}: {}", self.name, e))
                        .with_category(self.category.clone()),
                );
            }
        }
        Ok(())
    }

    fn on_change(&self, callback: ChangeCallback) -> ListenerId {
        self.listeners.add(callback)
    }

    fn off_change(&self, id: ListenerId) {
        self.listeners.remove(id)
    }
}
