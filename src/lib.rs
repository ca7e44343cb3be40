//! issuehub - diagnostics aggregation for IDE issue panels
//!
//! Problems reported by independent producers (lint, rendering, build sync)
//! are merged into one capped, counted list that views can re-render from.
//!
//! ## Architecture
//!
//! - `issuehub-core`: errors, configuration, events and notification dispatchers
//! - `issuehub-model`: diagnostics, sources and the aggregator

#![warn(clippy::all)]

pub mod commands;

// Re-export main components for library usage
pub use issuehub_core as core;
pub use issuehub_model as model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use issuehub_core::{IssueError, IssuesConfig, EventBus, IssueEvent};
    pub use issuehub_model::{
        Diagnostic, DiagnosticAggregator, DiagnosticSource, FallibleSource, FileSource, Fix,
        ManualSource, Severity, SourceRef,
    };
}
