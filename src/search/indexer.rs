use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tantivy::{IndexWriter, Opstamp, TantivyDocument, Term};
use tracing::debug;

use super::schema::PublicationSchema;
use super::tokenizer::parse_timestamp;
use crate::publication::{Author, PublicationRecord};

/// Normalized form of a feed record, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub doc_id: String,
    pub title: String,
    pub authors: Vec<Author>,
    pub publication_type: String,
    pub year: Option<i64>,
    pub crawled_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl IndexedDocument {
    /// Derive the document for a record; never fails
    pub fn from_record(record: &PublicationRecord) -> Self {
        let authors = record
            .authors
            .iter()
            .filter(|a| !a.name.trim().is_empty())
            .map(|a| Author::new(a.name.trim(), a.profile_url.trim()))
            .collect();

        let crawled_at = record.crawled_at.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                debug!("Unparseable crawled_at '{}' for {}", raw, record.id);
            }
            parsed
        });

        Self {
            doc_id: record.id.clone(),
            title: record.title.clone(),
            authors,
            publication_type: record.publication_type.clone().unwrap_or_default(),
            year: record.year,
            crawled_at,
            url: record.url.clone(),
        }
    }

    /// Comma-joined author names, the legacy display encoding
    pub fn authors_display(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl From<&PublicationRecord> for IndexedDocument {
    fn from(record: &PublicationRecord) -> Self {
        Self::from_record(record)
    }
}

/// Buffered writer over the publication store.
///
/// Upserts are invisible to readers until [`PublicationIndexer::commit`].
pub struct PublicationIndexer {
    writer: IndexWriter,
    schema: PublicationSchema,
    pending: usize,
    next_sequence: i64,
}

impl std::fmt::Debug for PublicationIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicationIndexer")
            .field("pending", &self.pending)
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}

impl PublicationIndexer {
    pub fn new(writer: IndexWriter, schema: PublicationSchema) -> Self {
        Self {
            writer,
            schema,
            pending: 0,
            next_sequence: 0,
        }
    }

    /// Continue numbering after documents already in the store
    pub fn with_next_sequence(mut self, next_sequence: i64) -> Self {
        self.next_sequence = next_sequence;
        self
    }

    /// Insertion sequence the next upsert will receive
    pub fn next_sequence(&self) -> i64 {
        self.next_sequence
    }

    /// Create a tantivy document from an indexed document
    pub fn create_document(&self, doc: &IndexedDocument) -> TantivyDocument {
        let schema = &self.schema;
        let mut tantivy_doc = TantivyDocument::new();

        tantivy_doc.add_text(schema.doc_id, &doc.doc_id);
        tantivy_doc.add_text(schema.title, &doc.title);
        tantivy_doc.add_text(schema.title_ngram, &doc.title);

        // One value per author keeps names with commas intact
        for author in &doc.authors {
            tantivy_doc.add_text(schema.authors, &author.name);
            tantivy_doc.add_text(schema.author_links, &author.profile_url);
        }

        tantivy_doc.add_text(schema.publication_type, &doc.publication_type);
        tantivy_doc.add_text(schema.url, &doc.url);

        if let Some(year) = doc.year {
            tantivy_doc.add_i64(schema.year, year);
        }
        if let Some(crawled_at) = doc.crawled_at {
            tantivy_doc.add_date(
                schema.crawled_at,
                tantivy::DateTime::from_timestamp_micros(crawled_at.timestamp_micros()),
            );
        }

        tantivy_doc
    }

    /// Insert or fully replace the document with the same `doc_id`.
    ///
    /// A replaced document takes a fresh sequence number, as if newly inserted.
    pub fn upsert(&mut self, doc: &IndexedDocument) -> Result<()> {
        let id_term = Term::from_field_text(self.schema.doc_id, &doc.doc_id);
        let mut tantivy_doc = self.create_document(doc);
        tantivy_doc.add_i64(self.schema.insert_seq, self.next_sequence);

        self.writer.delete_term(id_term);
        self.writer
            .add_document(tantivy_doc)
            .with_context(|| format!("Failed to add document {}", doc.doc_id))?;
        self.next_sequence += 1;
        self.pending += 1;
        Ok(())
    }

    /// Number of upserts since the last commit
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Persist every buffered upsert as one unit
    pub fn commit(&mut self) -> Result<Opstamp> {
        let opstamp = self.writer.commit().context("Failed to commit index")?;
        debug!("Committed {} upserts (opstamp {})", self.pending, opstamp);
        self.pending = 0;
        Ok(opstamp)
    }

    /// Drop every buffered upsert
    pub fn rollback(&mut self) -> Result<()> {
        self.writer.rollback().context("Failed to roll back index writer")?;
        self.pending = 0;
        Ok(())
    }
}
