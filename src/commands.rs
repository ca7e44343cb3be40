//! CLI commands for issuehub
//!
//! Provides command-line access to the issue model for automation and scripting.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use issuehub_core::IssuesConfig;
use issuehub_model::{Diagnostic, DiagnosticAggregator, FileSource, Severity};

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Aggregated issues, ready to print
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub issues: Vec<Diagnostic>,
    pub errors: usize,
    pub warnings: usize,
    pub total: usize,
    pub truncated: bool,
}

impl Report {
    fn from_aggregator(aggregator: &DiagnosticAggregator) -> Self {
        let snapshot = aggregator.snapshot();
        Self {
            issues: snapshot.diagnostics().to_vec(),
            errors: snapshot.counts().errors(),
            warnings: snapshot.counts().warnings(),
            total: snapshot.total(),
            truncated: snapshot.is_truncated(),
        }
    }

    /// Render as plain text, one issue per line followed by a summary line
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for issue in &self.issues {
            let _ = writeln!(out, "{}", issue);
            if !issue.description().is_empty() {
                let _ = writeln!(out, "    {}", issue.description());
            }
        }
        let _ = write!(
            out,
            "{} issues: {} {}, {} {}",
            self.total,
            self.errors,
            plural(Severity::Error, self.errors),
            self.warnings,
            plural(Severity::Warning, self.warnings),
        );
        out
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Text => self.render_text(),
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
        })
    }
}

fn plural(severity: Severity, count: usize) -> String {
    let name = severity.name().to_lowercase();
    if count == 1 {
        name
    } else {
        format!("{}s", name)
    }
}

/// Report command options
pub struct ReportCommand {
    pub files: Vec<PathBuf>,
    pub cap: Option<usize>,
}

impl ReportCommand {
    /// Load every dump as a source and aggregate them
    pub async fn execute(&self, config: &IssuesConfig) -> Result<Report> {
        let config = IssuesConfig {
            cap: self.cap.unwrap_or(config.cap),
            ..config.clone()
        };
        let aggregator = DiagnosticAggregator::from_config(&config)?;

        for path in &self.files {
            let source = Arc::new(FileSource::new(path));
            match source.reload().await {
                Ok(_) => {}
                // Unreadable dumps still show up, as "source unavailable" issues
                Err(e) if e.is_recoverable() => warn!("{}", e.user_message()),
                Err(e) => return Err(e.into()),
            }
            if let Err(e) = aggregator.add_source(source) {
                if !e.is_recoverable() {
                    return Err(e.into());
                }
                warn!("{}", e.user_message());
            }
        }

        let report = Report::from_aggregator(&aggregator);
        info!(
            "Aggregated {} issues from {} files",
            report.total,
            self.files.len()
        );
        Ok(report)
    }
}

/// Config command: print the effective configuration
pub struct ConfigCommand;

impl ConfigCommand {
    pub fn execute(&self, config: &IssuesConfig) -> Result<String> {
        Ok(toml::to_string_pretty(config)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_merges_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let lint = dir.path().join("lint.json");
        let sync = dir.path().join("sync.json");
        tokio::fs::write(
            &lint,
            r#"[{"summary": "Hardcoded text", "severity": "warning"},
                {"summary": "Missing id", "severity": "error"}]"#,
        )
        .await
        .unwrap();
        tokio::fs::write(&sync, r#"[{"summary": "Gradle sync failed", "severity": "error"}]"#)
            .await
            .unwrap();

        let command = ReportCommand {
            files: vec![lint, sync],
            cap: Some(2),
        };
        let report = command.execute(&IssuesConfig::default()).await.unwrap();

        assert_eq!(report.errors, 2);
        assert_eq!(report.warnings, 1);
        assert!(report.truncated);
        assert_eq!(report.issues.len(), 3);
        assert_eq!(report.issues[0].summary(), "Hardcoded text");
        assert_eq!(report.issues[2].description(), "1 more issues");
        assert!(report.render_text().ends_with("3 issues: 2 errors, 1 warning"));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_reported_as_issue() {
        let dir = tempfile::tempdir().unwrap();
        let command = ReportCommand {
            files: vec![dir.path().join("missing.json")],
            cap: None,
        };
        let report = command.execute(&IssuesConfig::default()).await.unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.issues[0].summary(), issuehub_model::SOURCE_UNAVAILABLE);

        let json = report.render(OutputFormat::Json).unwrap();
        assert!(json.contains("\"errors\": 1"));
    }

    #[tokio::test]
    async fn test_malformed_dump_does_not_stop_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        let lint = dir.path().join("lint.json");
        tokio::fs::write(&broken, "{ not a dump").await.unwrap();
        tokio::fs::write(&lint, r#"[{"summary": "Unused resource", "severity": "warning"}]"#)
            .await
            .unwrap();

        let command = ReportCommand {
            files: vec![broken, lint],
            cap: None,
        };
        let report = command.execute(&IssuesConfig::default()).await.unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.issues[0].summary(), issuehub_model::SOURCE_UNAVAILABLE);
        assert_eq!(report.issues[1].summary(), "Unused resource");
    }

    #[test]
    fn test_config_command() {
        let text = ConfigCommand.execute(&IssuesConfig::default()).unwrap();
        assert!(text.contains("cap = 200"));
        assert!(text.contains("dispatcher = \"immediate\""));
    }
}
