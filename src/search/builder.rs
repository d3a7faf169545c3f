use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{info, warn};

use super::indexer::IndexedDocument;
use super::store::{OpenOutcome, PublicationStore};
use crate::config::Config;
use crate::publication::{PublicationRecord, read_feed};

/// Summary of one build run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub records_indexed: usize,
    pub lines_skipped: usize,
    pub outcome: OpenOutcome,
    /// Live documents after the commit
    pub doc_count: u64,
}

/// Read the configured feed and upsert every record into the store.
///
/// An unreadable feed fails before the store is touched.
pub fn build_from_feed(config: &Config) -> Result<BuildReport> {
    let batch = read_feed(&config.feed_path)?;
    build_from_records(config, &batch.records, batch.skipped)
}

/// Upsert `records` into the configured store and commit once.
///
/// Any failure rolls back the whole batch, so readers keep seeing the
/// previous commit.
pub fn build_from_records(
    config: &Config,
    records: &[PublicationRecord],
    lines_skipped: usize,
) -> Result<BuildReport> {
    let start = Instant::now();
    let store = PublicationStore::open_or_create(&config.index_dir)?;
    let mut indexer = store.indexer(config.writer_heap_size)?;

    for record in records {
        let doc = IndexedDocument::from_record(record);
        if let Err(e) = indexer.upsert(&doc) {
            warn!("Indexing failed at record {}, rolling back: {:#}", record.id, e);
            indexer.rollback()?;
            return Err(e.context(format!("Failed to index record {}", record.id)));
        }
    }

    indexer.commit().context("Failed to commit build")?;

    let info = store.write_info(records.len(), lines_skipped)?;
    info!(
        "Indexed {} records into {:?} in {:?} ({} documents, {} lines skipped)",
        records.len(),
        store.path(),
        start.elapsed(),
        info.document_count,
        lines_skipped
    );

    Ok(BuildReport {
        records_indexed: records.len(),
        lines_skipped,
        outcome: store.outcome(),
        doc_count: info.document_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::Author;
    use tempfile::TempDir;

    fn record(id: &str, title: &str) -> PublicationRecord {
        PublicationRecord {
            id: id.to_string(),
            title: title.to_string(),
            year: Some(2021),
            url: format!("https://example.org/{id}"),
            authors: vec![Author::new("B. Jones", "")],
            publication_type: None,
            crawled_at: None,
        }
    }

    #[test]
    fn test_build_from_records() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_base_dir(temp_dir.path());

        let report =
            build_from_records(&config, &[record("a", "One"), record("b", "Two")], 0).unwrap();
        assert_eq!(report.records_indexed, 2);
        assert_eq!(report.doc_count, 2);
        assert_eq!(report.outcome, OpenOutcome::Created);

        let again = build_from_records(&config, &[record("a", "One again")], 0).unwrap();
        assert_eq!(again.outcome, OpenOutcome::Opened);
        assert_eq!(again.doc_count, 2);
    }

    #[test]
    fn test_missing_feed_leaves_store_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_base_dir(temp_dir.path());

        assert!(build_from_feed(&config).is_err());
        assert!(!PublicationStore::exists(&config.index_dir));
    }

    #[test]
    fn test_build_from_feed_counts_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_base_dir(temp_dir.path());
        std::fs::create_dir_all(config.feed_path.parent().unwrap()).unwrap();
        std::fs::write(
            &config.feed_path,
            "{\"id\":\"x\",\"title\":\"Fiscal Policy\",\"url\":\"u\"}\nnot json\n\n",
        )
        .unwrap();

        let report = build_from_feed(&config).unwrap();
        assert_eq!(report.records_indexed, 1);
        assert_eq!(report.lines_skipped, 1);
        assert_eq!(
            PublicationStore::read_info(&config.index_dir).unwrap().lines_skipped,
            1
        );
    }
}
