use anyhow::Result;
use pub_search::config::Config;
use pub_search::publication::{parse_feed, read_feed, seed_demo_if_missing};
use pub_search::search::schema::{DOC_ID, PublicationSchema, TITLE, field_names};
use pub_search::search::{
    IndexStats, OpenOutcome, PublicationStore, SearchRequest, build_from_feed, index_stats,
    search,
};
use std::fs;
use tantivy::schema::{STORED, STRING, Schema, TEXT};
use tantivy::{Index, TantivyDocument};
use tempfile::TempDir;

const FEED: &str = r#"{"id":"a","title":"Fiscal Policy and Inflation","year":2022,"url":"https://example.org/a","authors":[{"name":"A. Smith","profile_url":"u1"},{"name":"B. Lee","profile_url":"u2"}],"publication_type":"Journal Article","crawled_at":"2024-03-01T12:00:00Z"}
{"id":"b","title":"Machine Learning for Vision","year":"2024","url":"https://example.org/b","authors":[],"publication_type":null}

{"id":"c","title":"Housing Markets","year":"unknown","url":"https://example.org/c"}
{"title":"no id here"}
{"id":"","title":"Empty id"}
this line is not json
"#;

fn setup(feed: &str) -> Result<(TempDir, Config)> {
    let temp_dir = TempDir::new()?;
    let config = Config::with_base_dir(temp_dir.path());
    fs::write(&config.feed_path, feed)?;
    Ok((temp_dir, config))
}

#[test]
fn test_build_skips_bad_lines() -> Result<()> {
    let (_temp, config) = setup(FEED)?;

    let report = build_from_feed(&config)?;
    assert_eq!(report.records_indexed, 3);
    assert_eq!(report.lines_skipped, 3);
    assert_eq!(report.doc_count, 3);
    assert_eq!(report.outcome, OpenOutcome::Created);

    let info = PublicationStore::read_info(&config.index_dir).expect("index info written");
    assert_eq!(info.document_count, 3);
    assert_eq!(info.lines_skipped, 3);
    Ok(())
}

#[test]
fn test_lenient_fields_survive_indexing() -> Result<()> {
    let (_temp, config) = setup(FEED)?;
    build_from_feed(&config)?;

    let store = PublicationStore::open_existing(&config.index_dir)?;
    let documents = store.export_documents()?;
    let ids: Vec<_> = documents.iter().map(|d| d.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    assert_eq!(documents[0].crawled_at.as_deref(), Some("2024-03-01T12:00:00+00:00"));
    assert_eq!(documents[1].year, Some(2024));
    assert_eq!(documents[1].publication_type, "");
    assert_eq!(documents[2].year, None);
    assert!(documents[2].authors.is_empty());
    Ok(())
}

#[test]
fn test_rebuild_is_idempotent() -> Result<()> {
    let (_temp, config) = setup(FEED)?;

    build_from_feed(&config)?;
    let first = PublicationStore::open_existing(&config.index_dir)?.export_documents()?;

    let report = build_from_feed(&config)?;
    assert_eq!(report.outcome, OpenOutcome::Opened);
    let second = PublicationStore::open_existing(&config.index_dir)?.export_documents()?;

    assert_eq!(first, second);
    assert_eq!(index_stats(&config.index_dir).docs, 3);
    Ok(())
}

#[test]
fn test_upsert_replaces_changed_title() -> Result<()> {
    let (_temp, config) = setup(FEED)?;
    build_from_feed(&config)?;

    fs::write(
        &config.feed_path,
        r#"{"id":"a","title":"Monetary Policy and Deflation","year":2022,"url":"https://example.org/a"}"#,
    )?;
    let report = build_from_feed(&config)?;
    assert_eq!(report.records_indexed, 1);
    assert_eq!(report.doc_count, 3);

    let inflation = search(&config, &SearchRequest::new("inflation"))?;
    assert!(inflation.results.is_empty());

    let deflation = search(&config, &SearchRequest::new("deflation"))?;
    assert_eq!(deflation.results.len(), 1);
    assert_eq!(deflation.results[0].title, "Monetary Policy and Deflation");
    assert!(deflation.results[0].authors.is_empty());
    Ok(())
}

#[test]
fn test_schema_drift_rebuilds_empty_store() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let index_path = temp_dir.path().join("index");
    fs::create_dir_all(&index_path)?;

    // A store from an older layout with only two fields
    let mut builder = Schema::builder();
    let old_id = builder.add_text_field(DOC_ID, STRING | STORED);
    let old_title = builder.add_text_field(TITLE, TEXT | STORED);
    let old_index = Index::create_in_dir(&index_path, builder.build())?;
    let mut writer = old_index.writer(15_000_000)?;
    let mut doc = TantivyDocument::new();
    doc.add_text(old_id, "legacy");
    doc.add_text(old_title, "Legacy Publication");
    writer.add_document(doc)?;
    writer.commit()?;
    drop(writer);
    drop(old_index);

    let store = PublicationStore::open_or_create(&index_path)?;
    assert_eq!(store.outcome(), OpenOutcome::Rebuilt);
    assert_eq!(store.doc_count()?, 0);
    assert_eq!(
        field_names(&store.index().schema()),
        PublicationSchema::new().field_names()
    );
    Ok(())
}

#[test]
fn test_extra_persisted_field_is_drift() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let index_path = temp_dir.path().join("index");
    fs::create_dir_all(&index_path)?;

    let mut builder = Schema::builder();
    for spec in pub_search::search::schema::PUBLICATION_FIELDS.iter() {
        builder.add_text_field(spec.name, STRING | STORED);
    }
    builder.add_text_field("abstract", TEXT);
    Index::create_in_dir(&index_path, builder.build())?;

    let store = PublicationStore::open_or_create(&index_path)?;
    assert_eq!(store.outcome(), OpenOutcome::Rebuilt);
    assert!(!field_names(&store.index().schema()).contains("abstract"));
    Ok(())
}

#[test]
fn test_missing_feed_is_an_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = Config::with_base_dir(temp_dir.path());

    assert!(read_feed(&config.feed_path).is_err());
    assert!(build_from_feed(&config).is_err());
    assert!(!index_stats(&config.index_dir).ready);
    Ok(())
}

#[test]
fn test_seed_demo_then_build() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = Config::with_base_dir(temp_dir.path().join("nested"));

    assert!(seed_demo_if_missing(&config.feed_path)?);
    assert!(!seed_demo_if_missing(&config.feed_path)?);

    let report = build_from_feed(&config)?;
    assert_eq!(report.doc_count, 1);
    let response = search(&config, &SearchRequest::new("volatility"))?;
    assert_eq!(response.results.len(), 1);
    Ok(())
}

#[test]
fn test_parse_feed_from_memory() -> Result<()> {
    let batch = parse_feed(FEED.as_bytes())?;
    assert_eq!(batch.records.len(), 3);
    assert_eq!(batch.skipped, 3);
    Ok(())
}

#[test]
fn test_null_fields_are_indexed_as_empty() -> Result<()> {
    let feed = concat!(
        r#"{"id":"a","title":null,"url":"https://example.org/a","year":2021}"#,
        "\n",
        r#"{"id":"b","title":"Fiscal Policy","url":null}"#,
        "\n",
        r#"{"id":"c","title":"Trade Policy","url":"https://example.org/c","authors":[{"name":"A. Smith","profile_url":null},{"name":"B. Lee","profile_url":"u2"}]}"#,
        "\n",
    );
    let (_temp, config) = setup(feed)?;

    let report = build_from_feed(&config)?;
    assert_eq!(report.records_indexed, 3);
    assert_eq!(report.lines_skipped, 0);

    let documents = PublicationStore::open_existing(&config.index_dir)?.export_documents()?;
    assert_eq!(documents[0].title, "");
    assert_eq!(documents[1].url, "");

    let hits = search(&config, &SearchRequest::new("trade"))?.results;
    assert_eq!(hits[0].authors, vec!["A. Smith", "B. Lee"]);
    assert_eq!(hits[0].author_links, vec!["", "u2"]);
    Ok(())
}

#[test]
fn test_store_with_missing_segment_files_is_rebuilt() -> Result<()> {
    let (_temp, config) = setup(FEED)?;
    build_from_feed(&config)?;

    for entry in fs::read_dir(&config.index_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "store" || ext == "idx") {
            fs::remove_file(path)?;
        }
    }

    let report = build_from_feed(&config)?;
    assert_eq!(report.outcome, OpenOutcome::Rebuilt);
    assert_eq!(report.doc_count, 3);
    assert_eq!(search(&config, &SearchRequest::new("housing"))?.results.len(), 1);
    Ok(())
}

#[test]
fn test_stats_report_drifted_store() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let index_path = temp_dir.path().join("index");
    fs::create_dir_all(&index_path)?;

    let mut builder = Schema::builder();
    let old_title = builder.add_text_field(TITLE, TEXT | STORED);
    let old_index = Index::create_in_dir(&index_path, builder.build())?;
    let mut writer = old_index.writer(15_000_000)?;
    for title in ["Legacy One", "Legacy Two"] {
        let mut doc = TantivyDocument::new();
        doc.add_text(old_title, title);
        writer.add_document(doc)?;
    }
    writer.commit()?;

    assert_eq!(index_stats(&index_path), IndexStats { ready: true, docs: 2 });
    Ok(())
}
