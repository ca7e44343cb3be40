//! issuehub model - diagnostics aggregation
//!
//! Sources report problems, the [`DiagnosticAggregator`] merges them into
//! one capped and counted list, and observers re-render when it changes.

pub mod aggregator;
pub mod diagnostic;
pub mod fallible;
pub mod file_source;
pub mod manual;
pub mod observers;
pub mod source;

pub use aggregator::{
    overflow_marker, AggregatorBuilder, DiagnosticAggregator, IssueSnapshot, OVERFLOW_CATEGORY,
};
pub use diagnostic::{Diagnostic, FileLocation, Fix, Severity, SeverityCounts, SourceRef};
pub use fallible::{FallibleSource, SOURCE_UNAVAILABLE};
pub use file_source::FileSource;
pub use manual::ManualSource;
pub use observers::{Observer, ObserverId};
pub use source::{ChangeCallback, ChangeListeners, DiagnosticSource, ListenerId, SourceError};
