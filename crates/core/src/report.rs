//! Per-object outcomes and the run report that aggregates them

use serde::Serialize;

/// Why an object was not transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Rejected by the document filter
    FilteredOut,
    /// Destination already holds an object of identical size
    AlreadyPresent,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::FilteredOut => write!(f, "filtered out"),
            SkipReason::AlreadyPresent => write!(f, "already present, identical size"),
        }
    }
}

/// What happened to one examined object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum MigrationOutcome {
    Migrated {
        key: String,
        bucket: String,
        bytes: u64,
        /// Planned only; no data moved
        dry_run: bool,
    },
    Skipped {
        key: String,
        reason: SkipReason,
    },
    Errored {
        key: String,
        error: String,
    },
}

impl MigrationOutcome {
    pub fn key(&self) -> &str {
        match self {
            MigrationOutcome::Migrated { key, .. }
            | MigrationOutcome::Skipped { key, .. }
            | MigrationOutcome::Errored { key, .. } => key,
        }
    }

    /// A one-line, human readable description
    pub fn describe(&self) -> String {
        match self {
            MigrationOutcome::Migrated {
                key,
                bucket,
                dry_run: true,
                ..
            } => format!("[DRY-RUN] {key} -> {bucket}"),
            MigrationOutcome::Migrated {
                key, bucket, bytes, ..
            } => format!(
                "{key} -> {bucket} ({})",
                humansize::format_size(*bytes, humansize::BINARY)
            ),
            MigrationOutcome::Skipped { key, reason } => format!("{key} skipped: {reason}"),
            MigrationOutcome::Errored { key, error } => format!("{key} failed: {error}"),
        }
    }
}

/// Aggregated result of one migration run
///
/// Counts are maintained by `record`, so
/// `migrated + skipped + errored == total_scanned` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub total_scanned: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Bytes actually transferred (dry-run markers count zero)
    pub total_bytes: u64,
    pub outcomes: Vec<MigrationOutcome>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Append an outcome and update the counters
    pub fn record(&mut self, outcome: MigrationOutcome) {
        self.total_scanned += 1;
        match &outcome {
            MigrationOutcome::Migrated { bytes, .. } => {
                self.migrated += 1;
                self.total_bytes += bytes;
            }
            MigrationOutcome::Skipped { .. } => self.skipped += 1,
            MigrationOutcome::Errored { .. } => self.errored += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn is_consistent(&self) -> bool {
        self.migrated + self.skipped + self.errored == self.total_scanned
            && self.outcomes.len() == self.total_scanned
    }

    pub fn has_errors(&self) -> bool {
        self.errored > 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &MigrationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MigrationOutcome::Errored { .. }))
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = if self.dry_run { "Migration plan" } else { "Migration complete" };
        writeln!(f, "{label}")?;
        writeln!(f, "  Scanned:  {}", self.total_scanned)?;
        writeln!(f, "  Migrated: {}", self.migrated)?;
        writeln!(f, "  Skipped:  {}", self.skipped)?;
        writeln!(f, "  Errors:   {}", self.errored)?;
        write!(
            f,
            "  Transferred: {}",
            humansize::format_size(self.total_bytes, humansize::BINARY)
        )
    }
}
