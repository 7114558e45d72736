//! Migration engine: list -> filter -> route -> compare -> copy
//!
//! Source buckets are listed one after another, in declared order, into a
//! single report. Every object returned by a listing produces exactly one
//! outcome. A failing object is recorded as `Errored` and the run moves
//! on; only a failing listing aborts the run. Re-running after a partial
//! failure is safe: objects already present with an identical size are
//! skipped.

use futures::{FutureExt, TryStreamExt};

use crate::error::{Error, Result};
use crate::filter::FilterMode;
use crate::listing::list_objects;
use crate::report::{MigrationOutcome, RunReport, SkipReason};
use crate::routing::BucketMapping;
use crate::traits::{DEFAULT_CONTENT_TYPE, ObjectDescriptor, ObjectStore, PutOptions};

/// Per-run options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Listed in this order; must not be empty
    pub source_buckets: Vec<String>,
    pub filter: FilterMode,
    pub dry_run: bool,
    /// Objects processed concurrently; 1 is strictly sequential
    pub parallel: usize,
}

impl MigrationOptions {
    /// Options for a single source bucket
    pub fn new(source_bucket: impl Into<String>) -> Self {
        Self::from_buckets([source_bucket])
    }

    pub fn from_buckets<I, S>(source_buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_buckets: source_buckets.into_iter().map(Into::into).collect(),
            filter: FilterMode::None,
            dry_run: false,
            parallel: 1,
        }
    }

    pub fn filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.source_buckets.is_empty()
            || self.source_buckets.iter().any(|b| b.trim().is_empty())
        {
            return Err(Error::Config("source bucket is not configured".to_string()));
        }
        Ok(())
    }
}

/// Copies objects from a source store into routed destination buckets
pub struct Migrator<'a> {
    source: &'a dyn ObjectStore,
    destination: &'a dyn ObjectStore,
    mapping: &'a BucketMapping,
    options: MigrationOptions,
}

impl<'a> Migrator<'a> {
    pub fn new(
        source: &'a dyn ObjectStore,
        destination: &'a dyn ObjectStore,
        mapping: &'a BucketMapping,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source,
            destination,
            mapping,
            options,
        }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Run to completion and return the report
    pub async fn run(&self) -> Result<RunReport> {
        self.run_with(|_| {}).await
    }

    /// Run to completion, calling `on_outcome` for every object in listing order
    pub async fn run_with<F>(&self, mut on_outcome: F) -> Result<RunReport>
    where
        F: FnMut(&MigrationOutcome),
    {
        self.options.validate()?;

        tracing::info!(
            source_buckets = ?self.options.source_buckets,
            filter = %self.options.filter,
            dry_run = self.options.dry_run,
            parallel = self.options.parallel,
            "Starting migration"
        );

        let mut report = RunReport::new(self.options.dry_run);

        for source_bucket in &self.options.source_buckets {
            tracing::info!(source_bucket = %source_bucket, "Listing source bucket");

            // One bucket at a time: keys are unique within a listing, so concurrent
            // workers never share one. `try_buffered` yields in listing order.
            let mut outcomes = list_objects(self.source, source_bucket)
                .map_ok(|object| self.process(source_bucket, object).map(Ok::<_, Error>))
                .try_buffered(self.options.parallel.max(1));

            while let Some(outcome) = outcomes.try_next().await? {
                on_outcome(&outcome);
                report.record(outcome);
            }
        }

        tracing::info!(
            scanned = report.total_scanned,
            migrated = report.migrated,
            skipped = report.skipped,
            errored = report.errored,
            "Migration finished"
        );

        Ok(report)
    }

    async fn process(&self, source_bucket: &str, object: ObjectDescriptor) -> MigrationOutcome {
        if !self.options.filter.admits(&object.key) {
            tracing::debug!(key = %object.key, "Filtered out");
            return MigrationOutcome::Skipped {
                key: object.key,
                reason: SkipReason::FilteredOut,
            };
        }

        let bucket = self.mapping.resolve(&object.key).to_string();

        // Only a definitive not-found means "absent"; probe failures are errors
        match self.destination.head_object(&bucket, &object.key).await {
            Ok(Some(existing)) if existing.size == object.size => {
                tracing::debug!(key = %object.key, bucket = %bucket, "Already present");
                return MigrationOutcome::Skipped {
                    key: object.key,
                    reason: SkipReason::AlreadyPresent,
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(key = %object.key, error = %e, "Destination probe failed");
                return MigrationOutcome::Errored {
                    key: object.key,
                    error: e.to_string(),
                };
            }
        }

        if self.options.dry_run {
            return MigrationOutcome::Migrated {
                key: object.key,
                bucket,
                bytes: 0,
                dry_run: true,
            };
        }

        match self.transfer(source_bucket, &object, &bucket).await {
            Ok(()) => {
                tracing::debug!(
                    key = %object.key,
                    source_bucket,
                    bucket = %bucket,
                    size = object.size,
                    "Migrated"
                );
                MigrationOutcome::Migrated {
                    key: object.key,
                    bucket,
                    bytes: object.size,
                    dry_run: false,
                }
            }
            Err(e) => {
                tracing::warn!(key = %object.key, source_bucket, error = %e, "Transfer failed");
                MigrationOutcome::Errored {
                    key: object.key,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn transfer(
        &self,
        source_bucket: &str,
        object: &ObjectDescriptor,
        bucket: &str,
    ) -> Result<()> {
        let body = self
            .source
            .get_object_stream(source_bucket, &object.key)
            .await?;

        let content_type = body
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let options = PutOptions {
            content_type: Some(content_type),
            content_length: body.content_length,
            ..Default::default()
        };

        self.destination
            .put_object_stream(bucket, &object.key, body.stream, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::traits::MockObjectStore;

    fn mapping() -> BucketMapping {
        BucketMapping::new("documents")
            .with_rule("signatures/", "signatures")
            .with_rule("company_logos/", "assets")
    }

    fn destination() -> MemoryStore {
        let store = MemoryStore::new();
        for bucket in ["documents", "signatures", "assets"] {
            store.create_bucket_sync(bucket);
        }
        store
    }

    fn source(keys: &[(&str, &[u8])]) -> MemoryStore {
        let store = MemoryStore::new().with_page_size(2);
        store.create_bucket_sync("legacy");
        for (key, data) in keys {
            store.insert("legacy", key, data.to_vec(), Some("application/pdf"));
        }
        store
    }

    #[tokio::test]
    async fn test_copies_and_routes() {
        let src = source(&[
            ("signatures/s1.png", b"sig"),
            ("company_logos/logo.svg", b"<svg/>"),
            ("misc/notes.txt", b"notes"),
        ]);
        let dst = destination();
        let mapping = mapping();

        let report = Migrator::new(&src, &dst, &mapping, MigrationOptions::new("legacy"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.migrated, 3);
        assert_eq!(report.total_bytes, 3 + 6 + 5);
        assert!(report.is_consistent());
        assert_eq!(
            dst.object("signatures", "signatures/s1.png").unwrap().data,
            &b"sig"[..]
        );
        assert!(dst.object("assets", "company_logos/logo.svg").is_some());
        assert!(dst.object("documents", "misc/notes.txt").is_some());
    }

    #[tokio::test]
    async fn test_preserves_content_type_or_defaults() {
        let src = MemoryStore::new();
        src.insert("legacy", "typed.pdf", b"pdf".to_vec(), Some("application/pdf"));
        src.insert("legacy", "untyped.bin", b"bin".to_vec(), None);
        let dst = destination();
        let mapping = mapping();

        Migrator::new(&src, &dst, &mapping, MigrationOptions::new("legacy"))
            .run()
            .await
            .unwrap();

        assert_eq!(
            dst.object("documents", "typed.pdf").unwrap().content_type.as_deref(),
            Some("application/pdf")
        );
        assert_eq!(
            dst.object("documents", "untyped.bin").unwrap().content_type.as_deref(),
            Some(DEFAULT_CONTENT_TYPE)
        );
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let src = source(&[("a.pdf", b"aaaa"), ("b.jpg", b"bb"), ("c/d.txt", b"c")]);
        let dst = destination();
        let mapping = mapping();
        let migrator = Migrator::new(&src, &dst, &mapping, MigrationOptions::new("legacy"));

        let first = migrator.run().await.unwrap();
        assert_eq!(first.migrated, 3);

        let second = migrator.run().await.unwrap();
        assert_eq!(second.migrated, 0);
        assert_eq!(second.skipped, 3);
        assert!(second.outcomes.iter().all(|o| matches!(
            o,
            MigrationOutcome::Skipped {
                reason: SkipReason::AlreadyPresent,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_size_mismatch_is_recopied() {
        let src = source(&[("a.pdf", b"new content")]);
        let dst = destination();
        dst.insert("documents", "a.pdf", b"old".to_vec(), None);
        let mapping = mapping();

        let report = Migrator::new(&src, &dst, &mapping, MigrationOptions::new("legacy"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(dst.object("documents", "a.pdf").unwrap().data, &b"new content"[..]);
    }

    #[tokio::test]
    async fn test_filter_modes() {
        let src = source(&[("a.pdf", b"a"), ("b.jpg", b"b"), ("c.DOCX", b"c")]);
        let mapping = mapping();

        let dst = destination();
        let report = Migrator::new(
            &src,
            &dst,
            &mapping,
            MigrationOptions::new("legacy").filter(FilterMode::IncludeDocuments),
        )
        .run()
        .await
        .unwrap();
        assert_eq!(report.migrated, 2);
        assert_eq!(dst.keys("documents"), vec!["a.pdf", "c.DOCX"]);
        assert!(report.outcomes.contains(&MigrationOutcome::Skipped {
            key: "b.jpg".to_string(),
            reason: SkipReason::FilteredOut,
        }));

        let dst = destination();
        let report = Migrator::new(
            &src,
            &dst,
            &mapping,
            MigrationOptions::new("legacy").filter(FilterMode::ExcludeDocuments),
        )
        .run()
        .await
        .unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(dst.keys("documents"), vec!["b.jpg"]);
    }

    #[tokio::test]
    async fn test_dry_run_transfers_nothing() {
        let src = source(&[("a.pdf", b"a"), ("b.pdf", b"b")]);
        let dst = destination();
        let mapping = mapping();

        let report = Migrator::new(
            &src,
            &dst,
            &mapping,
            MigrationOptions::new("legacy").dry_run(true),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.migrated, 2);
        assert_eq!(report.total_bytes, 0);
        assert!(report.dry_run);
        assert_eq!(dst.put_calls(), 0);
        assert!(dst.keys("documents").is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_run() {
        let src = source(&[
            ("1.pdf", b"one"),
            ("2.pdf", b"two"),
            ("3.pdf", b"three"),
            ("4.pdf", b"four"),
            ("5.pdf", b"five"),
        ]);
        src.fail_reads_for("2.pdf");
        let dst = destination();
        let mapping = mapping();

        let report = Migrator::new(&src, &dst, &mapping, MigrationOptions::new("legacy"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_scanned, 5);
        assert_eq!(report.migrated, 4);
        assert_eq!(report.errored, 1);
        assert!(report.is_consistent());
        assert_eq!(report.outcomes[1].key(), "2.pdf");
        assert!(matches!(report.outcomes[1], MigrationOutcome::Errored { .. }));
        // A failed stream must not leave a partial object behind
        assert!(dst.object("documents", "2.pdf").is_none());
        assert_eq!(dst.keys("documents"), vec!["1.pdf", "3.pdf", "4.pdf", "5.pdf"]);
    }

    #[tokio::test]
    async fn test_probe_failure_is_error_not_copy() {
        let src = source(&[("a.pdf", b"a"), ("b.pdf", b"b")]);
        let dst = destination();
        dst.fail_heads_for("a.pdf");
        let mapping = mapping();

        let report = Migrator::new(&src, &dst, &mapping, MigrationOptions::new("legacy"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.errored, 1);
        assert_eq!(report.migrated, 1);
        assert!(dst.object("documents", "a.pdf").is_none());
    }

    #[tokio::test]
    async fn test_parallel_run_keeps_listing_order() {
        let keys: Vec<(String, Vec<u8>)> = (0..20)
            .map(|i| (format!("obj{i:02}.bin"), vec![i as u8; i + 1]))
            .collect();
        let src = MemoryStore::new().with_page_size(3);
        for (key, data) in &keys {
            src.insert("legacy", key, data.clone(), None);
        }
        let dst = destination();
        let mapping = mapping();

        let mut seen = Vec::new();
        let report = Migrator::new(
            &src,
            &dst,
            &mapping,
            MigrationOptions::new("legacy").parallel(4),
        )
        .run_with(|o| seen.push(o.key().to_string()))
        .await
        .unwrap();

        assert_eq!(report.migrated, 20);
        let expected: Vec<String> = keys.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts() {
        let src = MemoryStore::new();
        let dst = destination();
        let mapping = mapping();

        let result = Migrator::new(&src, &dst, &mapping, MigrationOptions::new("missing"))
            .run()
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_source_bucket_is_config_error() {
        let src = MemoryStore::new();
        let dst = destination();
        let mapping = mapping();

        let result = Migrator::new(&src, &dst, &mapping, MigrationOptions::new(""))
            .run()
            .await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(src.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_on_probe_is_recorded() {
        let src = source(&[("a.pdf", b"a")]);
        let mut dst = MockObjectStore::new();
        dst.expect_head_object()
            .times(1)
            .returning(|_, _| Err(Error::Auth("AccessDenied".to_string())));
        dst.expect_put_object_stream().never();
        let mapping = mapping();

        let report = Migrator::new(&src, &dst, &mapping, MigrationOptions::new("legacy"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.errored, 1);
        match &report.outcomes[0] {
            MigrationOutcome::Errored { error, .. } => assert!(error.contains("AccessDenied")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiple_source_buckets_share_one_report() {
        let src = MemoryStore::new().with_page_size(2);
        src.insert("legacy", "signatures/s1.png", b"sig".to_vec(), None);
        src.insert("legacy", "a.pdf", b"aaaa".to_vec(), Some("application/pdf"));
        src.insert("legacy", "broken.pdf", b"xx".to_vec(), None);
        src.insert("archive", "old/report.pdf", b"archived".to_vec(), None);
        src.insert("archive", "kept.txt", b"kept".to_vec(), None);
        src.fail_reads_for("broken.pdf");
        let dst = destination();
        dst.insert("documents", "kept.txt", b"KEPT".to_vec(), None);
        let mapping = mapping();

        let options = MigrationOptions::from_buckets(["legacy", "archive"]);
        let report = Migrator::new(&src, &dst, &mapping, options)
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_scanned, 5);
        assert_eq!(report.migrated, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errored, 1);
        assert_eq!(
            report.migrated + report.skipped + report.errored,
            report.total_scanned
        );
        assert!(report.is_consistent());

        // Declared bucket order, each listing in its own order
        let keys: Vec<&str> = report.outcomes.iter().map(|o| o.key()).collect();
        assert_eq!(
            keys,
            vec!["a.pdf", "broken.pdf", "signatures/s1.png", "kept.txt", "old/report.pdf"]
        );

        // Each object is read from the bucket it was listed in
        assert_eq!(
            dst.object("documents", "old/report.pdf").unwrap().data,
            &b"archived"[..]
        );
        assert_eq!(dst.object("signatures", "signatures/s1.png").unwrap().data, &b"sig"[..]);
    }

    #[tokio::test]
    async fn test_empty_bucket_list_is_config_error() {
        let src = MemoryStore::new();
        let dst = destination();
        let mapping = mapping();

        let options = MigrationOptions::from_buckets(Vec::<String>::new());
        let result = Migrator::new(&src, &dst, &mapping, options).run().await;
        assert!(matches!(result, Err(Error::Config(_))));

        let options = MigrationOptions::from_buckets(["legacy", " "]);
        let result = Migrator::new(&src, &dst, &mapping, options).run().await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(src.list_calls(), 0);
    }
}
