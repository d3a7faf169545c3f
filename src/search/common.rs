use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tantivy::{TantivyDocument, schema::Value};

use super::schema::PublicationSchema;
use crate::publication::Author;

// ============================================================================
// Constants
// ============================================================================

/// Default heap size for index writer (50MB)
pub const DEFAULT_WRITER_HEAP_SIZE: usize = 50_000_000;

/// Minimum heap size accepted by tantivy (15MB)
pub const MIN_WRITER_HEAP_SIZE: usize = 15_000_000;

/// Result cap shared by every sort mode
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Fraction of distinct query terms a candidate must match
pub const DEFAULT_MIN_MATCH_FRACTION: f64 = 0.9;

/// tantivy's own metadata file; its presence means the store exists
pub const INDEX_METADATA_FILE: &str = "meta.json";

/// Build summary written next to the index
pub const INDEX_INFO_FILE: &str = "index_info.json";

// ============================================================================
// Query contract
// ============================================================================

/// Result ordering requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Weighted BM25 score, best first
    #[default]
    Relevance,
    /// Publication year, newest first
    Year,
    /// Crawl timestamp, newest first
    Recent,
}

impl SortOrder {
    /// Parse a user supplied value; unknown or missing values mean relevance
    pub fn parse_lenient(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relevance" => Ok(SortOrder::Relevance),
            "year" => Ok(SortOrder::Year),
            "recent" => Ok(SortOrder::Recent),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortOrder::Relevance => "relevance",
            SortOrder::Year => "year",
            SortOrder::Recent => "recent",
        };
        f.write_str(name)
    }
}

/// Search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
}

impl SearchRequest {
    /// Create a relevance-ordered request
    pub fn new(query: &str) -> Self {
        Self {
            q: Some(query.to_string()),
            sort: SortOrder::Relevance,
        }
    }

    /// Set sort order
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Trimmed query text, empty when absent
    pub fn query_text(&self) -> &str {
        self.q.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Search response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<PublicationHit>,
}

impl SearchResponse {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
        }
    }
}

/// One ranked publication in external shape
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PublicationHit {
    pub title: String,
    pub year: Option<i64>,
    pub url: String,
    pub authors: Vec<String>,
    pub author_links: Vec<String>,
    pub publication_type: String,
    pub crawled_at: Option<String>,
    pub score: f32,
}

/// Store health
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub ready: bool,
    pub docs: u64,
}

/// Every stored value of a document, keyed by its id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredPublication {
    pub doc_id: String,
    pub title: String,
    pub year: Option<i64>,
    pub url: String,
    pub authors: Vec<Author>,
    pub publication_type: String,
    pub crawled_at: Option<String>,
}

// ============================================================================
// Result formatting
// ============================================================================

fn first_text(doc: &TantivyDocument, field: tantivy::schema::Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Ordered author entries; names are trimmed and empty names dropped with their link
pub fn stored_authors(doc: &TantivyDocument, schema: &PublicationSchema) -> Vec<Author> {
    let mut links = doc
        .get_all(schema.author_links)
        .map(|v| v.as_str().unwrap_or("").trim().to_string());

    doc.get_all(schema.authors)
        .filter_map(|v| {
            let name = v.as_str().unwrap_or("").trim().to_string();
            let link = links.next().unwrap_or_default();
            (!name.is_empty()).then(|| Author::new(name, link))
        })
        .collect()
}

fn stored_crawled_at(doc: &TantivyDocument, schema: &PublicationSchema) -> Option<String> {
    let micros = doc
        .get_first(schema.crawled_at)
        .and_then(|v| v.as_datetime())?
        .into_timestamp_micros();
    chrono::DateTime::from_timestamp_micros(micros).map(|dt| dt.to_rfc3339())
}

/// Map stored fields back to the external record shape.
///
/// Missing values become empty strings, empty lists or `None`.
pub fn doc_to_result(doc: &TantivyDocument, schema: &PublicationSchema, score: f32) -> PublicationHit {
    let (authors, author_links) = stored_authors(doc, schema)
        .into_iter()
        .map(|author| (author.name, author.profile_url))
        .unzip();

    PublicationHit {
        title: first_text(doc, schema.title),
        year: doc.get_first(schema.year).and_then(|v| v.as_i64()),
        url: first_text(doc, schema.url),
        authors,
        author_links,
        publication_type: first_text(doc, schema.publication_type),
        crawled_at: stored_crawled_at(doc, schema),
        score,
    }
}

/// Full stored view of a document
pub fn doc_to_stored(doc: &TantivyDocument, schema: &PublicationSchema) -> StoredPublication {
    StoredPublication {
        doc_id: first_text(doc, schema.doc_id),
        title: first_text(doc, schema.title),
        year: doc.get_first(schema.year).and_then(|v| v.as_i64()),
        url: first_text(doc, schema.url),
        authors: stored_authors(doc, schema),
        publication_type: first_text(doc, schema.publication_type),
        crawled_at: stored_crawled_at(doc, schema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!(SortOrder::parse_lenient(Some("YEAR")), SortOrder::Year);
        assert_eq!(SortOrder::parse_lenient(Some("recent")), SortOrder::Recent);
        assert_eq!(SortOrder::parse_lenient(Some("oldest")), SortOrder::Relevance);
        assert_eq!(SortOrder::parse_lenient(None), SortOrder::Relevance);
        assert!("bogus".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_query_text() {
        assert_eq!(SearchRequest::new("  policy ").query_text(), "policy");
        assert_eq!(SearchRequest::default().query_text(), "");
    }

    #[test]
    fn test_doc_to_result_with_missing_fields() {
        let schema = PublicationSchema::new();
        let mut doc = TantivyDocument::new();
        doc.add_text(schema.doc_id, "x");

        let hit = doc_to_result(&doc, &schema, 0.0);
        assert_eq!(hit.title, "");
        assert_eq!(hit.year, None);
        assert!(hit.authors.is_empty());
        assert!(hit.author_links.is_empty());
        assert_eq!(hit.crawled_at, None);
    }

    #[test]
    fn test_doc_to_result_authors_parallel() {
        let schema = PublicationSchema::new();
        let mut doc = TantivyDocument::new();
        doc.add_text(schema.authors, "A. Smith");
        doc.add_text(schema.author_links, "u1");
        doc.add_text(schema.authors, "  ");
        doc.add_text(schema.author_links, "orphan");
        doc.add_text(schema.authors, "Lee, B.");
        doc.add_text(schema.author_links, "");

        let hit = doc_to_result(&doc, &schema, 1.5);
        assert_eq!(hit.authors, vec!["A. Smith", "Lee, B."]);
        assert_eq!(hit.author_links, vec!["u1", ""]);
        assert_eq!(hit.score, 1.5);
    }

    #[test]
    fn test_response_serialization() {
        let response = SearchResponse::empty("");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"query":"","results":[]}"#);
    }
}
