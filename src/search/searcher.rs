use std::cmp::Reverse;
use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::fastfield::Column;
use tantivy::query::Query;
use tantivy::{DocAddress, DocId, IndexReader, Score, SegmentReader, TantivyDocument};
use tracing::debug;

use super::common::{IndexStats, PublicationHit, SearchRequest, SearchResponse, SortOrder, doc_to_result};
use super::error::SearchResult;
use super::query::MultiFieldQueryBuilder;
use super::schema::{CRAWLED_AT, INSERT_SEQ, PublicationSchema, YEAR};
use super::store::PublicationStore;
use crate::config::Config;

/// Answers queries against the last committed state of a store.
///
/// Cheap to share between threads; each query takes its own snapshot.
pub struct PublicationSearcher {
    schema: PublicationSchema,
    reader: IndexReader,
    query_builder: MultiFieldQueryBuilder,
    limit: usize,
}

impl std::fmt::Debug for PublicationSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicationSearcher")
            .field("limit", &self.limit)
            .finish()
    }
}

impl PublicationSearcher {
    /// Create a searcher over an open store
    pub fn new(store: &PublicationStore, config: &Config) -> SearchResult<Self> {
        let schema = store.schema().clone();
        let query_builder =
            MultiFieldQueryBuilder::new(&schema, &config.weights, config.min_match_fraction);

        Ok(Self {
            reader: store.reader()?,
            schema,
            query_builder,
            limit: config.result_limit(),
        })
    }

    /// Open the store named by `config` read-only.
    ///
    /// Fails with `StoreMissing` when no index has been built yet.
    pub fn open(config: &Config) -> SearchResult<Self> {
        Self::open_at(&config.index_dir, config)
    }

    /// Open the store at `path` with ranking settings from `config`
    pub fn open_at<P: AsRef<Path>>(path: P, config: &Config) -> SearchResult<Self> {
        let store = PublicationStore::open_existing(path)?;
        Self::new(&store, config)
    }

    /// Pick up commits made since the last reload
    pub fn reload(&self) -> SearchResult<()> {
        self.reader.reload()?;
        Ok(())
    }

    /// Main search entry point
    pub fn search(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
        let query_text = request.query_text();
        if query_text.is_empty() {
            return Ok(SearchResponse::empty(query_text));
        }

        debug!(
            "PublicationSearcher::search called with query: '{}', sort: {}",
            query_text, request.sort
        );

        let Some(compiled) = self.query_builder.build(query_text) else {
            return Ok(SearchResponse::empty(query_text));
        };

        let results = match request.sort {
            SortOrder::Relevance => self.search_relevance(compiled.query.as_ref())?,
            sort => self.search_sorted(compiled.query.as_ref(), sort)?,
        };

        debug!("Search executed, got {} results", results.len());

        Ok(SearchResponse {
            query: query_text.to_string(),
            results,
        })
    }

    /// Weighted BM25 order, best first; equal scores keep insertion order
    fn search_relevance(&self, query: &dyn Query) -> SearchResult<Vec<PublicationHit>> {
        let searcher = self.reader.searcher();
        let collector = TopDocs::with_limit(self.limit).tweak_score(|segment_reader: &SegmentReader| {
            let sequence = sequence_column(segment_reader);
            move |doc: DocId, score: Score| (score, earlier_first(sequence.as_ref(), doc))
        });
        let top_docs: Vec<((Score, Reverse<i64>), DocAddress)> = searcher.search(query, &collector)?;

        let mut results = Vec::with_capacity(top_docs.len());
        for ((score, _order), doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            results.push(doc_to_result(&doc, &self.schema, score));
        }
        Ok(results)
    }

    /// Stored-value order, newest first, documents without the value last.
    /// Equal keys keep insertion order.
    fn search_sorted(&self, query: &dyn Query, sort: SortOrder) -> SearchResult<Vec<PublicationHit>> {
        let searcher = self.reader.searcher();
        let limit = TopDocs::with_limit(self.limit);

        // `None` orders below every key, so missing values land at the end
        let top_docs: Vec<((Option<i64>, Reverse<i64>), DocAddress)> = match sort {
            SortOrder::Recent => {
                let collector = limit.custom_score(|segment_reader: &SegmentReader| {
                    let crawled = segment_reader.fast_fields().date(CRAWLED_AT).ok();
                    let sequence = sequence_column(segment_reader);
                    move |doc: DocId| {
                        let key = crawled
                            .as_ref()
                            .and_then(|column| column.first(doc))
                            .map(|dt| dt.into_timestamp_micros());
                        (key, earlier_first(sequence.as_ref(), doc))
                    }
                });
                searcher.search(query, &collector)?
            }
            _ => {
                let collector = limit.custom_score(|segment_reader: &SegmentReader| {
                    let years = segment_reader.fast_fields().i64(YEAR).ok();
                    let sequence = sequence_column(segment_reader);
                    move |doc: DocId| {
                        let key = years.as_ref().and_then(|column| column.first(doc));
                        (key, earlier_first(sequence.as_ref(), doc))
                    }
                });
                searcher.search(query, &collector)?
            }
        };

        let mut results = Vec::with_capacity(top_docs.len());
        for (_key, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            results.push(doc_to_result(&doc, &self.schema, 0.0));
        }
        Ok(results)
    }

    /// Get index statistics
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            ready: true,
            docs: self.reader.searcher().num_docs(),
        }
    }
}

fn sequence_column(segment_reader: &SegmentReader) -> Option<Column<i64>> {
    segment_reader.fast_fields().i64(INSERT_SEQ).ok()
}

/// Tie-break key that ranks lower insertion sequences higher
fn earlier_first(sequence: Option<&Column<i64>>, doc: DocId) -> Reverse<i64> {
    Reverse(
        sequence
            .and_then(|column| column.first(doc))
            .unwrap_or(i64::MAX),
    )
}

/// Search the store named by `config`.
///
/// A blank query returns an empty response without touching the store, so
/// it succeeds even before the first build.
pub fn search(config: &Config, request: &SearchRequest) -> SearchResult<SearchResponse> {
    let query_text = request.query_text();
    if query_text.is_empty() {
        return Ok(SearchResponse::empty(query_text));
    }
    PublicationSearcher::open(config)?.search(request)
}
