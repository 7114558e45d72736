//! JSON event interface for serverless-style invocation
//!
//! Accepts `{"filter_docs_only": bool, "filter_mode": "include"|"exclude",
//! "dry_run": bool}` and answers with a
//! `{"migrated_count", "skipped_count", "error_count", "details"}` body.
//! Objects rejected by the document filter stay in the `RunReport` but are
//! left out of the body; `skipped` lists only objects already present.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::FilterMode;
use crate::report::{MigrationOutcome, RunReport, SkipReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFilterMode {
    #[default]
    Include,
    Exclude,
}

/// Invocation event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationEvent {
    #[serde(default = "default_filter_docs_only")]
    pub filter_docs_only: bool,

    #[serde(default)]
    pub filter_mode: EventFilterMode,

    #[serde(default)]
    pub dry_run: bool,
}

fn default_filter_docs_only() -> bool {
    true
}

impl Default for MigrationEvent {
    fn default() -> Self {
        Self {
            filter_docs_only: default_filter_docs_only(),
            filter_mode: EventFilterMode::default(),
            dry_run: false,
        }
    }
}

impl MigrationEvent {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The engine filter this event asks for
    pub fn filter(&self) -> FilterMode {
        match (self.filter_docs_only, self.filter_mode) {
            (false, _) => FilterMode::None,
            (true, EventFilterMode::Include) => FilterMode::IncludeDocuments,
            (true, EventFilterMode::Exclude) => FilterMode::ExcludeDocuments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryDetails {
    pub migrated: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<ErrorDetail>,
}

/// Response body summarising a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub migrated_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub details: SummaryDetails,
}

impl From<&RunReport> for MigrationSummary {
    fn from(report: &RunReport) -> Self {
        let mut details = SummaryDetails::default();
        for outcome in &report.outcomes {
            match outcome {
                MigrationOutcome::Migrated {
                    key, dry_run: true, ..
                } => details.migrated.push(format!("[DRY-RUN] {key}")),
                MigrationOutcome::Migrated { key, .. } => details.migrated.push(key.clone()),
                MigrationOutcome::Skipped {
                    reason: SkipReason::FilteredOut,
                    ..
                } => {}
                MigrationOutcome::Skipped { key, .. } => details.skipped.push(key.clone()),
                MigrationOutcome::Errored { key, error } => details.errors.push(ErrorDetail {
                    key: key.clone(),
                    error: error.clone(),
                }),
            }
        }

        Self {
            migrated_count: details.migrated.len(),
            skipped_count: details.skipped.len(),
            error_count: details.errors.len(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_event_uses_defaults() {
        let event = MigrationEvent::from_json("{}").unwrap();
        assert_eq!(event, MigrationEvent::default());
        assert_eq!(event.filter(), FilterMode::IncludeDocuments);
        assert!(!event.dry_run);
    }

    #[test]
    fn test_event_filter_modes() {
        let event =
            MigrationEvent::from_json(r#"{"filter_mode": "exclude", "dry_run": true}"#).unwrap();
        assert_eq!(event.filter(), FilterMode::ExcludeDocuments);
        assert!(event.dry_run);

        let event = MigrationEvent::from_json(r#"{"filter_docs_only": false}"#).unwrap();
        assert_eq!(event.filter(), FilterMode::None);
    }

    #[test]
    fn test_invalid_filter_mode_rejected() {
        assert!(MigrationEvent::from_json(r#"{"filter_mode": "sometimes"}"#).is_err());
    }

    #[test]
    fn test_summary_from_report() {
        let mut report = RunReport::new(true);
        report.record(MigrationOutcome::Migrated {
            key: "a.pdf".to_string(),
            bucket: "docs".to_string(),
            bytes: 0,
            dry_run: true,
        });
        report.record(MigrationOutcome::Skipped {
            key: "b.pdf".to_string(),
            reason: SkipReason::AlreadyPresent,
        });
        report.record(MigrationOutcome::Errored {
            key: "c.doc".to_string(),
            error: "timeout".to_string(),
        });

        let summary = MigrationSummary::from(&report);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["migrated_count"], 1);
        assert_eq!(json["skipped_count"], 1);
        assert_eq!(json["error_count"], 1);
        assert_eq!(json["details"]["migrated"][0], "[DRY-RUN] a.pdf");
        assert_eq!(json["details"]["skipped"][0], "b.pdf");
        assert_eq!(json["details"]["errors"][0]["key"], "c.doc");
        assert_eq!(json["details"]["errors"][0]["error"], "timeout");
    }

    #[test]
    fn test_summary_leaves_out_filtered_objects() {
        let mut report = RunReport::new(false);
        report.record(MigrationOutcome::Migrated {
            key: "contract.pdf".to_string(),
            bucket: "docs".to_string(),
            bytes: 12,
            dry_run: false,
        });
        for i in 0..3 {
            report.record(MigrationOutcome::Skipped {
                key: format!("img{i}.jpg"),
                reason: SkipReason::FilteredOut,
            });
        }
        report.record(MigrationOutcome::Skipped {
            key: "old.pdf".to_string(),
            reason: SkipReason::AlreadyPresent,
        });

        let summary = MigrationSummary::from(&report);
        assert_eq!(summary.migrated_count, 1);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.details.skipped, vec!["old.pdf"]);
        assert_eq!(summary.error_count, 0);

        // The run report itself still accounts for every listed object
        assert_eq!(report.skipped, 4);
        assert!(report.is_consistent());
    }
}
