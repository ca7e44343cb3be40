//! File-backed diagnostic source
//!
//! Reads a JSON dump of diagnostics produced by an external tool (a lint
//! run, a sync report). Loading is async and explicit; `collect` only
//! reads what the last `reload` cached.

use std::path::{Path, PathBuf};
use parking_lot::RwLock;
use tracing::{debug, warn};

use issuehub_core::{IssueError, Result};

use crate::diagnostic::Diagnostic;
use crate::fallible::SOURCE_UNAVAILABLE;
use crate::source::{ChangeCallback, ChangeListeners, DiagnosticSource, ListenerId, SourceError};

enum LoadState {
    NotLoaded,
    Loaded(Vec<Diagnostic>),
    Failed(String),
}

pub struct FileSource {
    name: String,
    path: PathBuf,
    state: RwLock<LoadState>,
    listeners: ChangeListeners,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            state: RwLock::new(LoadState::NotLoaded),
            listeners: ChangeListeners::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a dump: a JSON array of diagnostics
    pub fn parse(contents: &str) -> Result<Vec<Diagnostic>> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Re-read the file and announce the change.
    ///
    /// A failed read is kept and reported through `collect`; the error is
    /// also returned so callers can log it.
    pub async fn reload(&self) -> Result<usize> {
        let outcome = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Self::parse(&contents),
            Err(e) => Err(IssueError::Io(e)),
        };

        let result = match outcome {
            Ok(diagnostics) => {
                let loaded = diagnostics.len();
                debug!("Loaded {} issues from {:?}", loaded, self.path);
                *self.state.write() = LoadState::Loaded(diagnostics);
                Ok(loaded)
            }
            Err(e) => {
                warn!("Could not load issues from {:?}: {}", self.path, e);
                *self.state.write() = LoadState::Failed(e.to_string());
                Err(e)
            }
        };

        self.listeners.fire();
        result
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.read(), LoadState::Loaded(_))
    }
}

impl DiagnosticSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, out: &mut Vec<Diagnostic>) -> std::result::Result<(), SourceError> {
        match &*self.state.read() {
            LoadState::NotLoaded => {}
            LoadState::Loaded(diagnostics) => out.extend(diagnostics.iter().cloned()),
            LoadState::Failed(reason) => out.push(
                Diagnostic::error(SOURCE_UNAVAILABLE)
                    .with_description(format!("{}: {}", self.name, reason)),
            ),
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
