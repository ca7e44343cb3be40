//! Diagnostic entity
//!
//! A [`Diagnostic`] is one reported problem. It is built by a source at
//! collection time and never changed afterwards.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    WeakWarning,
    Warning,
    Error,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::WeakWarning => "Weak Warning",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        }
    }

    /// All severities, most severe first
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Error,
            Severity::Warning,
            Severity::WeakWarning,
            Severity::Info,
        ]
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A position inside a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileLocation {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// What a diagnostic points at.
///
/// Only used for equality and lookup; it never grants access to the entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    #[default]
    None,
    /// A component of the design surface, by id
    Component { id: String },
    /// A location in a file
    File(FileLocation),
}

impl SourceRef {
    pub fn component(id: impl Into<String>) -> Self {
        SourceRef::Component { id: id.into() }
    }

    pub fn file(path: impl Into<PathBuf>, line: Option<u32>, column: Option<u32>) -> Self {
        SourceRef::File(FileLocation {
            path: path.into(),
            line,
            column,
        })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SourceRef::None)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::None => f.write_str("-"),
            SourceRef::Component { id } => write!(f, "<{}>", id),
            SourceRef::File(loc) => {
                write!(f, "{}", loc.path.display())?;
                if let Some(line) = loc.line {
                    write!(f, ":{}", line)?;
                    if let Some(column) = loc.column {
                        write!(f, ":{}", column)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// A quick fix attached to a diagnostic
#[derive(Clone)]
pub struct Fix {
    description: String,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl Fix {
    pub fn new(description: impl Into<String>, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            description: description.into(),
            action: Arc::new(action),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run the fix
    pub fn apply(&self) {
        (self.action)()
    }
}

impl fmt::Debug for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fix")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// One reported problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    summary: String,
    #[serde(default)]
    description: String,
    severity: Severity,
    #[serde(default)]
    source: SourceRef,
    #[serde(default)]
    category: String,
    #[serde(skip)]
    fixes: Vec<Fix>,
}

impl Diagnostic {
    pub fn new(severity: Severity, summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            description: String::new(),
            severity,
            source: SourceRef::None,
            category: String::new(),
            fixes: Vec::new(),
        }
    }

    pub fn error(summary: impl Into<String>) -> Self {
        Self::new(Severity::Error, summary)
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self::new(Severity::Warning, summary)
    }

    pub fn weak_warning(summary: impl Into<String>) -> Self {
        Self::new(Severity::WeakWarning, summary)
    }

    pub fn info(summary: impl Into<String>) -> Self {
        Self::new(Severity::Info, summary)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.source = source;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_fix(mut self, fix: Fix) -> Self {
        self.fixes.push(fix);
        self
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn fixes(&self) -> &[Fix] {
        &self.fixes
    }
}

// Fixes carry closures and are not part of a diagnostic's identity.
impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.severity == other.severity
            && self.summary == other.summary
            && self.description == other.description
            && self.category == other.category
            && self.source == other.source
    }
}

impl Eq for Diagnostic {}

impl Hash for Diagnostic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.severity.hash(state);
        self.summary.hash(state);
        self.description.hash(state);
        self.category.hash(state);
        self.source.hash(state);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.summary)?;
        if !self.source.is_none() {
            write!(f, " ({})", self.source)?;
        }
        Ok(())
    }
}

/// Per-severity tally of a diagnostic list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    counts: [usize; 4],
}

impl SeverityCounts {
    pub fn tally<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) -> Self {
        let mut counts = Self::default();
        for diagnostic in diagnostics {
            counts.counts[diagnostic.severity.index()] += 1;
        }
        counts
    }

    pub fn get(&self, severity: Severity) -> usize {
        self.counts[severity.index()]
    }

    pub fn errors(&self) -> usize {
        self.get(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.get(Severity::Warning)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::WeakWarning);
        assert!(Severity::WeakWarning > Severity::Info);
        assert_eq!(Severity::all().iter().max(), Some(&Severity::Error));
    }

    #[test]
    fn test_equality_ignores_fixes() {
        let plain = Diagnostic::warning("Hardcoded text")
            .with_category("Internationalization")
            .with_source(SourceRef::component("button1"));
        let with_fix = plain.clone().with_fix(Fix::new("Extract string resource", || {}));

        assert_eq!(plain, with_fix);

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(set.contains(&with_fix));
    }

    #[test]
    fn test_equality_uses_source_identity() {
        let a = Diagnostic::error("Missing constraints").with_source(SourceRef::component("a"));
        let b = Diagnostic::error("Missing constraints").with_source(SourceRef::component("b"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fix_apply() {
        let applied = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&applied);
        let diagnostic = Diagnostic::error("Unknown attribute")
            .with_fix(Fix::new("Remove attribute", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        assert_eq!(diagnostic.fixes()[0].description(), "Remove attribute");
        diagnostic.fixes()[0].apply();
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "summary": "Overlapping views",
            "severity": "weak_warning",
            "source": {"kind": "file", "path": "res/layout/main.xml", "line": 12}
        }"#;
        let diagnostic: Diagnostic = serde_json::from_str(json).unwrap();

        assert_eq!(diagnostic.severity(), Severity::WeakWarning);
        assert_eq!(diagnostic.category(), "");
        assert_eq!(diagnostic.source().to_string(), "res/layout/main.xml:12");
        assert!(diagnostic.fixes().is_empty());
    }

    #[test]
    fn test_counts() {
        let list = vec![
            Diagnostic::error("a"),
            Diagnostic::error("b"),
            Diagnostic::warning("c"),
            Diagnostic::info("d"),
        ];
        let counts = SeverityCounts::tally(&list);
        assert_eq!(counts.errors(), 2);
        assert_eq!(counts.warnings(), 1);
        assert_eq!(counts.get(Severity::WeakWarning), 0);
        assert_eq!(counts.total(), 4);
    }
}
