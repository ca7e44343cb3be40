//! Diagnostic Aggregator
//!
//! Merges the diagnostics of every registered source into one capped,
//! counted snapshot and tells observers when it changes.
//!
//! - Sources are polled in registration order; their order is kept.
//! - Past the cap the tail is replaced by a single overflow marker.
//! - Counts always describe the full merged set, not the truncated one.
//! - Passes are serialized by a writer lock; readers only ever see whole
//!   snapshots.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use issuehub_core::{
    dispatch, Dispatcher, EventBus, ImmediateDispatcher, IssueError, IssueEvent, IssuesConfig,
    Result, DEFAULT_ISSUE_CAP,
};

use crate::diagnostic::{Diagnostic, SeverityCounts, Severity, SourceRef};
use crate::observers::{panic_message, Observer, ObserverId, ObserverList};
use crate::source::{DiagnosticSource, ListenerId};

/// Category of the synthetic "N more issues" diagnostic
pub const OVERFLOW_CATEGORY: &str = "Overflow";

/// Build the marker that stands in for `hidden` truncated diagnostics
pub fn overflow_marker(hidden: usize) -> Diagnostic {
    Diagnostic::info("Too many issues")
        .with_description(format!("{} more issues", hidden))
        .with_category(OVERFLOW_CATEGORY)
}

/// Result of one recompute pass
#[derive(Debug, Clone)]
pub struct IssueSnapshot {
    diagnostics: Arc<[Diagnostic]>,
    counts: SeverityCounts,
    total: usize,
    truncated: bool,
    generation: u64,
}

impl IssueSnapshot {
    fn empty() -> Self {
        Self {
            diagnostics: Arc::from(Vec::new()),
            counts: SeverityCounts::default(),
            total: 0,
            truncated: false,
            generation: 0,
        }
    }

    /// Diagnostics in merge order, overflow marker last if truncated
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Severity tally of the full merged set
    pub fn counts(&self) -> SeverityCounts {
        self.counts
    }

    /// Number of merged diagnostics before truncation
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of successful passes that led to this snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// The overflow marker has no source of its own and never answers lookups.
fn reported_for(diagnostic: &Diagnostic, source: &SourceRef) -> bool {
    diagnostic.source() == source && diagnostic.category() != OVERFLOW_CATEGORY
}

struct Registration {
    source: Arc<dyn DiagnosticSource>,
    listener: ListenerId,
}

fn same_source<S>(registered: &Arc<dyn DiagnosticSource>, source: &Arc<S>) -> bool
where
    S: DiagnosticSource + ?Sized,
{
    Arc::as_ptr(registered).cast::<()>() == Arc::as_ptr(source).cast::<()>()
}

struct Inner {
    sources: RwLock<Vec<Registration>>,
    snapshot: RwLock<Arc<IssueSnapshot>>,
    writer: Mutex<()>,
    dirty: AtomicBool,
    active: AtomicBool,
    disposed: AtomicBool,
    cap: AtomicUsize,
    slow_source_threshold: Option<Duration>,
    observers: ObserverList,
    dispatcher: Arc<dyn Dispatcher>,
    events: Option<Arc<EventBus>>,
}

impl Inner {
    fn recompute(self: &Arc<Self>) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(IssueError::Disposed);
        }

        let outcome = {
            let _writer = self.writer.lock();
            self.dirty.store(false, Ordering::SeqCst);
            self.run_pass()
        };

        let result = match outcome {
            Ok(snapshot) => {
                self.publish(&snapshot);
                Ok(())
            }
            Err(e) => {
                self.report_failure(&e);
                Err(e)
            }
        };

        self.drain_pending();
        result
    }

    /// Change-triggered entry point. Coalesces with any pass in flight.
    fn request_recompute(self: &Arc<Self>) {
        self.dirty.store(true, Ordering::SeqCst);
        if !self.active.load(Ordering::SeqCst) {
            debug!("Issue model inactive, deferring recompute");
            return;
        }

        let weak = Arc::downgrade(self);
        let task = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.drain_pending();
            }
        });
        if let Err(e) = self.dispatcher.dispatch(task) {
            error!("Failed to schedule issue recompute: {}", e);
        }
    }

    /// Run passes while changes are pending. If another thread holds the
    /// writer lock it will pick the pending flag up once it is done.
    fn drain_pending(self: &Arc<Self>) {
        loop {
            if self.disposed.load(Ordering::SeqCst)
                || !self.active.load(Ordering::SeqCst)
                || !self.dirty.load(Ordering::SeqCst)
            {
                return;
            }

            let Some(writer) = self.writer.try_lock() else {
                return;
            };
            if !self.dirty.swap(false, Ordering::SeqCst) {
                return;
            }
            let outcome = self.run_pass();
            drop(writer);

            match outcome {
                Ok(snapshot) => self.publish(&snapshot),
                Err(e) => self.report_failure(&e),
            }
        }
    }

    /// Collect, cap, count and swap. Caller holds the writer lock.
    fn run_pass(&self) -> Result<Arc<IssueSnapshot>> {
        let sources: Vec<Arc<dyn DiagnosticSource>> = self
            .sources
            .read()
            .iter()
            .map(|registration| Arc::clone(&registration.source))
            .collect();

        let mut merged = Vec::new();
        for source in &sources {
            let started = Instant::now();
            match panic::catch_unwind(AssertUnwindSafe(|| source.collect(&mut merged))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(IssueError::source_failed(source.name(), e.reason)),
                Err(payload) => {
                    return Err(IssueError::source_failed(
                        source.name(),
                        format!("panicked: {}", panic_message(&payload)),
                    ))
                }
            }

            if let Some(threshold) = self.slow_source_threshold {
                let elapsed = started.elapsed();
                if elapsed > threshold {
                    warn!("Issue source '{}' took {:?} to collect", source.name(), elapsed);
                    if let Some(events) = &self.events {
                        events.emit(IssueEvent::SlowSource {
                            name: source.name().to_string(),
                            elapsed_ms: elapsed.as_millis() as u64,
                        });
                    }
                }
            }
        }

        let counts = SeverityCounts::tally(&merged);
        let total = merged.len();
        let cap = self.cap.load(Ordering::SeqCst);
        let truncated = total > cap;
        if truncated {
            merged.truncate(cap);
            merged.push(overflow_marker(total - cap));
        }

        let mut current = self.snapshot.write();
        let snapshot = Arc::new(IssueSnapshot {
            diagnostics: Arc::from(merged),
            counts,
            total,
            truncated,
            generation: current.generation + 1,
        });
        *current = Arc::clone(&snapshot);

        debug!(
            "Issue pass {}: {} issues from {} sources ({} errors, {} warnings)",
            snapshot.generation,
            total,
            sources.len(),
            counts.errors(),
            counts.warnings()
        );
        Ok(snapshot)
    }

    fn publish(self: &Arc<Self>, snapshot: &IssueSnapshot) {
        if let Some(events) = &self.events {
            events.emit(IssueEvent::Updated {
                generation: snapshot.generation,
                errors: snapshot.counts.errors(),
                warnings: snapshot.counts.warnings(),
                total: snapshot.total,
                truncated: snapshot.truncated,
            });
        }

        let weak: Weak<Inner> = Arc::downgrade(self);
        let task = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.notify();
            }
        });
        if let Err(e) = self.dispatcher.dispatch(task) {
            error!("Failed to notify issue observers: {}", e);
        }
    }

    fn report_failure(&self, e: &IssueError) {
        let recoverable = e.is_recoverable();
        if recoverable {
            warn!("Issue recompute failed, keeping previous issues: {}", e);
        } else {
            error!("Issue recompute failed: {}", e);
        }
        if let Some(events) = &self.events {
            events.emit(IssueEvent::RecomputeFailed {
                message: e.to_string(),
                recoverable,
            });
        }
    }
}

/// Builder for [`DiagnosticAggregator`]
pub struct AggregatorBuilder {
    cap: usize,
    slow_source_threshold: Option<Duration>,
    dispatcher: Arc<dyn Dispatcher>,
    events: Option<Arc<EventBus>>,
    active: bool,
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self {
            cap: DEFAULT_ISSUE_CAP,
            slow_source_threshold: None,
            dispatcher: Arc::new(ImmediateDispatcher),
            events: None,
            active: true,
        }
    }
}

impl AggregatorBuilder {
    pub fn cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    pub fn slow_source_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_source_threshold = threshold;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Start deactivated; change notifications are deferred until `activate`
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn build(self) -> Result<DiagnosticAggregator> {
        if self.cap == 0 {
            return Err(IssueError::Config("cap must be at least 1".into()));
        }

        Ok(DiagnosticAggregator {
            inner: Arc::new(self.into_inner()),
        })
    }

    fn into_inner(self) -> Inner {
        Inner {
            sources: RwLock::new(Vec::new()),
            snapshot: RwLock::new(Arc::new(IssueSnapshot::empty())),
            writer: Mutex::new(()),
            dirty: AtomicBool::new(false),
            active: AtomicBool::new(self.active),
            disposed: AtomicBool::new(false),
            cap: AtomicUsize::new(self.cap),
            slow_source_threshold: self.slow_source_threshold,
            observers: ObserverList::default(),
            dispatcher: self.dispatcher,
            events: self.events,
        }
    }
}

/// Merges, caps, counts and republishes diagnostics from registered sources.
///
/// Create one per owning context and share it by `Arc`. Dropping it
/// deregisters from every remaining source.
pub struct DiagnosticAggregator {
    inner: Arc<Inner>,
}

impl DiagnosticAggregator {
    /// Aggregator with the default cap, notifying inline
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AggregatorBuilder::default().into_inner()),
        }
    }

    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::default()
    }

    /// Aggregator configured from settings, including its dispatcher
    pub fn from_config(config: &IssuesConfig) -> Result<Self> {
        config.validate()?;
        Self::builder()
            .cap(config.cap)
            .slow_source_threshold(config.slow_source_threshold())
            .dispatcher(dispatch::from_kind(config.dispatcher)?)
            .build()
    }

    /// Register `source`, subscribe to its changes and recompute.
    ///
    /// The source stays registered even if the recompute fails.
    pub fn add_source(&self, source: Arc<dyn DiagnosticSource>) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(IssueError::Disposed);
        }

        let weak = Arc::downgrade(&self.inner);
        let listener = source.on_change(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.request_recompute();
            }
        }));

        let name = source.name().to_string();
        self.inner.sources.write().push(Registration { source, listener });
        info!("Registered issue source '{}'", name);
        if let Some(events) = &self.inner.events {
            events.emit(IssueEvent::SourceAdded { name });
        }

        self.inner.recompute()
    }

    /// Deregister the first registration of `source` and recompute.
    ///
    /// Returns `Ok(false)` without recomputing if it was never added.
    pub fn remove_source<S: DiagnosticSource + ?Sized>(&self, source: &Arc<S>) -> Result<bool> {
        let removed = {
            let mut sources = self.inner.sources.write();
            let index = sources
                .iter()
                .position(|registration| same_source(&registration.source, source));
            index.map(|index| sources.remove(index))
        };

        let Some(registration) = removed else {
            return Ok(false);
        };
        registration.source.off_change(registration.listener);

        let name = registration.source.name().to_string();
        info!("Removed issue source '{}'", name);
        if let Some(events) = &self.inner.events {
            events.emit(IssueEvent::SourceRemoved { name });
        }

        self.inner.recompute()?;
        Ok(true)
    }

    /// Rebuild the snapshot from all sources, synchronously.
    ///
    /// On error the previous snapshot stays current and no observer runs.
    pub fn recompute(&self) -> Result<()> {
        self.inner.recompute()
    }

    /// Schedule a recompute on the notification context, coalescing with
    /// other pending requests. Deferred while inactive.
    pub fn request_recompute(&self) {
        self.inner.request_recompute()
    }

    /// Diagnostics of the last successful pass
    pub fn current(&self) -> Arc<[Diagnostic]> {
        Arc::clone(&self.inner.snapshot.read().diagnostics)
    }

    /// Last snapshot, with counts that belong to the same pass
    pub fn snapshot(&self) -> Arc<IssueSnapshot> {
        Arc::clone(&self.inner.snapshot.read())
    }

    /// Errors in the last pass. Each accessor reads its own snapshot; use
    /// `snapshot().counts()` when several counts must come from one pass.
    pub fn error_count(&self) -> usize {
        self.snapshot().counts.errors()
    }

    /// Warnings in the last pass; see [`error_count`](Self::error_count)
    pub fn warning_count(&self) -> usize {
        self.snapshot().counts.warnings()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.snapshot().counts.get(severity)
    }

    /// Merged issue count before truncation
    pub fn issue_count(&self) -> usize {
        self.snapshot().total
    }

    pub fn has_issues(&self) -> bool {
        self.issue_count() > 0
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_truncated(&self) -> bool {
        self.snapshot().truncated
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// First diagnostic pointing at `source`, never the overflow marker
    pub fn find_by_source(&self, source: &SourceRef) -> Option<Diagnostic> {
        self.snapshot()
            .diagnostics
            .iter()
            .find(|d| reported_for(d, source))
            .cloned()
    }

    /// Most severe diagnostic pointing at `source`; the first one wins ties.
    /// The overflow marker is never returned.
    pub fn highest_severity_for(&self, source: &SourceRef) -> Option<Diagnostic> {
        let snapshot = self.snapshot();
        let mut best: Option<&Diagnostic> = None;
        for diagnostic in snapshot.diagnostics.iter().filter(|d| reported_for(d, source)) {
            if best.map_or(true, |b| diagnostic.severity() > b.severity()) {
                best = Some(diagnostic);
            }
        }
        best.cloned()
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.snapshot()
            .diagnostics
            .iter()
            .any(|d| d.category() == category)
    }

    pub fn by_category(&self, category: &str) -> Vec<Diagnostic> {
        self.snapshot()
            .diagnostics
            .iter()
            .filter(|d| d.category() == category)
            .cloned()
            .collect()
    }

    pub fn add_observer(&self, observer: Observer) -> ObserverId {
        self.inner.observers.add(observer)
    }

    /// Returns whether the observer was registered
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    pub fn source_count(&self) -> usize {
        self.inner.sources.read().len()
    }

    pub fn cap(&self) -> usize {
        self.inner.cap.load(Ordering::SeqCst)
    }

    /// Change the cap and recompute
    pub fn set_cap(&self, cap: usize) -> Result<()> {
        if cap == 0 {
            return Err(IssueError::Config("cap must be at least 1".into()));
        }
        self.inner.cap.store(cap, Ordering::SeqCst);
        self.inner.recompute()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Resume change tracking, running any recompute deferred meanwhile
    pub fn activate(&self) {
        if !self.inner.active.swap(true, Ordering::SeqCst) {
            debug!("Issue model activated");
            self.inner.drain_pending();
        }
    }

    /// Stop reacting to source changes until `activate`
    pub fn deactivate(&self) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            debug!("Issue model deactivated");
        }
    }

    /// Deregister from every source and drop all observers
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let registrations: Vec<Registration> = self.inner.sources.write().drain(..).collect();
        for registration in &registrations {
            registration.source.off_change(registration.listener);
        }
        self.inner.observers.clear();

        debug!("Issue model disposed, released {} sources", registrations.len());
        if let Some(events) = &self.inner.events {
            events.emit(IssueEvent::Disposed);
        }
    }
}

impl Default for DiagnosticAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiagnosticAggregator {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manual::ManualSource;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_empty_aggregator() {
        let aggregator = DiagnosticAggregator::new();
        assert!(aggregator.current().is_empty());
        assert_eq!(aggregator.generation(), 0);
        assert_eq!(aggregator.cap(), DEFAULT_ISSUE_CAP);
        assert!(!aggregator.has_issues());
    }

    #[test]
    fn test_zero_cap_rejected() {
        assert!(DiagnosticAggregator::builder().cap(0).build().is_err());
        let aggregator = DiagnosticAggregator::new();
        assert!(aggregator.set_cap(0).is_err());
        assert_eq!(aggregator.cap(), DEFAULT_ISSUE_CAP);
    }

    #[test]
    fn test_set_cap_recomputes() {
        let aggregator = DiagnosticAggregator::new();
        let source = Arc::new(ManualSource::with_diagnostics(
            "lint",
            (0..5).map(|i| Diagnostic::warning(format!("w{}", i))).collect(),
        ));
        aggregator.add_source(source).unwrap();
        assert!(!aggregator.is_truncated());

        aggregator.set_cap(3).unwrap();
        assert!(aggregator.is_truncated());
        assert_eq!(aggregator.current().len(), 4);
        assert_eq!(aggregator.current()[3].description(), "2 more issues");
    }

    #[test]
    fn test_change_triggers_recompute() {
        let aggregator = DiagnosticAggregator::new();
        let source = Arc::new(ManualSource::new("render"));
        aggregator.add_source(source.clone()).unwrap();
        assert_eq!(aggregator.generation(), 1);

        source.set(vec![Diagnostic::error("Render failed").with_category("Rendering")]);
        assert_eq!(aggregator.generation(), 2);
        assert!(aggregator.has_category("Rendering"));
        assert_eq!(aggregator.by_category("Rendering").len(), 1);
    }

    #[test]
    fn test_inactive_defers_until_activate() {
        let aggregator = DiagnosticAggregator::new();
        let source = Arc::new(ManualSource::new("lint"));
        aggregator.add_source(source.clone()).unwrap();

        aggregator.deactivate();
        source.push(Diagnostic::warning("Unused resource"));
        source.push(Diagnostic::warning("Unused id"));
        assert_eq!(aggregator.issue_count(), 0);

        aggregator.activate();
        assert_eq!(aggregator.issue_count(), 2);
        assert_eq!(aggregator.generation(), 2);
    }

    #[test]
    fn test_failed_source_keeps_previous_snapshot() {
        struct Broken(AtomicBool, crate::source::ChangeListeners);

        impl DiagnosticSource for Broken {
            fn name(&self) -> &str {
                "broken"
            }

            fn collect(&self, out: &mut Vec<Diagnostic>) -> std::result::Result<(), crate::SourceError> {
                if self.0.load(Ordering::SeqCst) {
                    return Err(crate::SourceError::new("index corrupted"));
                }
                out.push(Diagnostic::warning("fine so far"));
                Ok(())
            }

            fn on_change(&self, callback: crate::ChangeCallback) -> ListenerId {
                self.1.add(callback)
            }

            fn off_change(&self, id: ListenerId) {
                self.1.remove(id)
            }
        }

        let aggregator = DiagnosticAggregator::new();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        aggregator.add_observer(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let source = Arc::new(Broken(AtomicBool::new(false), Default::default()));
        aggregator.add_source(source.clone()).unwrap();
        let before = aggregator.current();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        source.0.store(true, Ordering::SeqCst);
        let err = aggregator.recompute().unwrap_err();
        assert!(matches!(err, IssueError::SourceFailed { .. }));
        assert_eq!(aggregator.current(), before);
        assert_eq!(aggregator.generation(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_source_is_a_failed_pass() {
        let aggregator = DiagnosticAggregator::new();
        let source = Arc::new(crate::FallibleSource::new("panics", || -> std::result::Result<Vec<Diagnostic>, String> {
            panic!("collector bug")
        }));
        let err = aggregator.add_source(source).unwrap_err();
        assert!(err.to_string().contains("collector bug"));
        assert_eq!(aggregator.source_count(), 1);
        assert!(aggregator.current().is_empty());
    }

    #[test]
    fn test_dispose_releases_sources() {
        let source = Arc::new(ManualSource::new("lint"));
        {
            let aggregator = DiagnosticAggregator::new();
            aggregator.add_source(source.clone()).unwrap();
            aggregator.add_source(source.clone()).unwrap();
            assert_eq!(source.listener_count(), 2);
        }
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn test_disposed_aggregator_rejects_work() {
        let aggregator = DiagnosticAggregator::new();
        aggregator.dispose();
        assert!(matches!(aggregator.recompute(), Err(IssueError::Disposed)));
        assert!(matches!(
            aggregator.add_source(Arc::new(ManualSource::new("late"))),
            Err(IssueError::Disposed)
        ));
    }

    #[test]
    fn test_events_published() {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        let aggregator = DiagnosticAggregator::builder()
            .cap(1)
            .event_bus(Arc::clone(&bus))
            .build()
            .unwrap();

        let source = Arc::new(ManualSource::with_diagnostics(
            "lint",
            vec![Diagnostic::error("a"), Diagnostic::warning("b")],
        ));
        aggregator.add_source(source).unwrap();

        assert_eq!(
            events.drain(),
            vec![
                IssueEvent::SourceAdded { name: "lint".into() },
                IssueEvent::Updated {
                    generation: 1,
                    errors: 1,
                    warnings: 1,
                    total: 2,
                    truncated: true,
                },
            ]
        );
    }

    #[test]
    fn test_observer_may_recompute() {
        let aggregator = Arc::new(DiagnosticAggregator::new());
        let reentered = Arc::new(AtomicBool::new(false));

        let weak = Arc::downgrade(&aggregator);
        let flag = Arc::clone(&reentered);
        aggregator.add_observer(Arc::new(move || {
            if !flag.swap(true, Ordering::SeqCst) {
                if let Some(aggregator) = weak.upgrade() {
                    aggregator.recompute().unwrap();
                }
            }
        }));

        aggregator.recompute().unwrap();
        assert_eq!(aggregator.generation(), 2);
    }
}
