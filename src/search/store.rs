use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::AllQuery;
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument};
use tracing::{debug, info, warn};

use super::common::{
    INDEX_INFO_FILE, INDEX_METADATA_FILE, IndexStats, MIN_WRITER_HEAP_SIZE, StoredPublication,
    doc_to_stored,
};
use super::error::{SearchError, SearchResult};
use super::indexer::PublicationIndexer;
use super::schema::{INSERT_SEQ, PublicationSchema, field_names};
use super::tokenizer::register_analyzers;

/// How the store came to be open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Existing store with the declared schema
    Opened,
    /// No store existed; a new empty one was created
    Created,
    /// Existing store had a different schema or was unreadable; wiped and recreated
    Rebuilt,
}

/// Build summary persisted next to the index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexInfo {
    pub version: String,
    pub fields: Vec<String>,
    pub document_count: u64,
    pub records_indexed: usize,
    pub lines_skipped: usize,
    pub last_updated: String,
}

/// On-disk publication index
pub struct PublicationStore {
    index: Index,
    schema: PublicationSchema,
    index_path: PathBuf,
    outcome: OpenOutcome,
}

impl std::fmt::Debug for PublicationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicationStore")
            .field("index_path", &self.index_path)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl PublicationStore {
    /// Check if a store exists at `path`
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().join(INDEX_METADATA_FILE).exists()
    }

    /// Open the store at `path`, creating it when absent.
    ///
    /// A store whose schema differs from the declared one, or that cannot be
    /// opened at all, is deleted and recreated empty. Its documents are lost;
    /// the next build repopulates it from the feed.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let index_path = path.as_ref().to_path_buf();
        let schema = PublicationSchema::new();

        let (index, outcome) = if Self::exists(&index_path) {
            match Self::open_matching(&index_path, &schema) {
                Ok(index) => {
                    info!("Using existing index: {:?}", index_path);
                    (index, OpenOutcome::Opened)
                }
                Err(reason) => {
                    warn!(
                        "Rebuilding index at {:?}: {:#}",
                        index_path, reason
                    );
                    std::fs::remove_dir_all(&index_path)
                        .with_context(|| format!("Failed to delete index {:?}", index_path))?;
                    (Self::create(&index_path, &schema)?, OpenOutcome::Rebuilt)
                }
            }
        } else {
            info!("Creating new index: {:?}", index_path);
            (Self::create(&index_path, &schema)?, OpenOutcome::Created)
        };

        register_analyzers(&index, &schema.analyzers());

        Ok(Self {
            index,
            schema,
            index_path,
            outcome,
        })
    }

    /// Open an existing store for querying; never creates or rebuilds
    pub fn open_existing<P: AsRef<Path>>(path: P) -> SearchResult<Self> {
        let index_path = path.as_ref().to_path_buf();
        if !Self::exists(&index_path) {
            return Err(SearchError::StoreMissing { path: index_path });
        }

        let schema = PublicationSchema::new();
        let index = Self::open_matching(&index_path, &schema)?;
        register_analyzers(&index, &schema.analyzers());

        Ok(Self {
            index,
            schema,
            index_path,
            outcome: OpenOutcome::Opened,
        })
    }

    fn create(index_path: &Path, schema: &PublicationSchema) -> Result<Index> {
        std::fs::create_dir_all(index_path).context("Failed to create index directory")?;
        let mmap_directory =
            MmapDirectory::open(index_path).context("Failed to open index directory")?;
        Index::create(mmap_directory, schema.schema.clone(), Default::default())
            .context("Failed to create new index")
    }

    /// Open the index and verify its schema equals the declared one
    fn open_matching(index_path: &Path, schema: &PublicationSchema) -> Result<Index> {
        let index = Index::open_in_dir(index_path).context("Failed to open existing index")?;
        let persisted = index.schema();

        let declared_names = schema.field_names();
        let persisted_names = field_names(&persisted);
        if declared_names != persisted_names {
            let added: Vec<_> = declared_names.difference(&persisted_names).collect();
            let removed: Vec<_> = persisted_names.difference(&declared_names).collect();
            anyhow::bail!(
                "schema mismatch (missing fields: {:?}, unexpected fields: {:?})",
                added,
                removed
            );
        }

        let declared_json = serde_json::to_value(&schema.schema)?;
        let persisted_json = serde_json::to_value(&persisted)?;
        if declared_json != persisted_json {
            anyhow::bail!("schema mismatch (field options changed)");
        }

        // Opening every segment catches deleted or truncated segment files
        let _reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to load index segments")?;

        Ok(index)
    }

    /// Schema handles bound to this store
    pub fn schema(&self) -> &PublicationSchema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.index_path
    }

    pub fn outcome(&self) -> OpenOutcome {
        self.outcome
    }

    /// Create the single writer for this store
    pub fn indexer(&self, heap_size: usize) -> Result<PublicationIndexer> {
        let next_sequence = self.next_sequence()?;
        let writer = self
            .index
            .writer(heap_size.max(MIN_WRITER_HEAP_SIZE))
            .context("Failed to create index writer")?;
        debug!("Index writer starts at sequence {}", next_sequence);
        Ok(PublicationIndexer::new(writer, self.schema.clone()).with_next_sequence(next_sequence))
    }

    /// One past the highest insertion sequence in any committed segment
    fn next_sequence(&self) -> Result<i64> {
        let reader: IndexReader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to open index reader")?;
        let searcher = reader.searcher();

        let mut next = 0;
        for segment_reader in searcher.segment_readers() {
            if segment_reader.max_doc() == 0 {
                continue;
            }
            let column = segment_reader
                .fast_fields()
                .i64(INSERT_SEQ)
                .context("Failed to read insertion sequence")?;
            next = next.max(column.max_value() + 1);
        }
        Ok(next)
    }

    /// Reader that follows commits
    pub fn reader(&self) -> SearchResult<IndexReader> {
        Ok(self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?)
    }

    /// Number of live documents as of the last commit
    pub fn doc_count(&self) -> SearchResult<u64> {
        Ok(self.reader()?.searcher().num_docs())
    }

    /// Every stored document ordered by `doc_id`
    pub fn export_documents(&self) -> SearchResult<Vec<StoredPublication>> {
        let reader = self.reader()?;
        let searcher = reader.searcher();
        let total = searcher.num_docs() as usize;
        if total == 0 {
            return Ok(Vec::new());
        }

        let top_docs = searcher.search(&AllQuery, &TopDocs::with_limit(total))?;
        let mut documents = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            documents.push(doc_to_stored(&doc, &self.schema));
        }
        documents.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        Ok(documents)
    }

    /// Persist the build summary
    pub fn write_info(&self, records_indexed: usize, lines_skipped: usize) -> Result<IndexInfo> {
        let info = IndexInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            fields: self.schema.field_names().into_iter().collect(),
            document_count: self.doc_count()?,
            records_indexed,
            lines_skipped,
            last_updated: chrono::Utc::now().to_rfc3339(),
        };

        let info_path = self.index_path.join(INDEX_INFO_FILE);
        let content = serde_json::to_string_pretty(&info)?;
        std::fs::write(&info_path, content)
            .with_context(|| format!("Failed to write {:?}", info_path))?;
        debug!("Wrote index info to {:?}", info_path);
        Ok(info)
    }

    /// Read the build summary, if one was written
    pub fn read_info<P: AsRef<Path>>(path: P) -> Option<IndexInfo> {
        let content = std::fs::read_to_string(path.as_ref().join(INDEX_INFO_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// Health check.
///
/// Only needs an openable index: a missing store is not ready, and a store
/// with an outdated schema still reports its documents until the next build
/// replaces it.
pub fn index_stats<P: AsRef<Path>>(path: P) -> IndexStats {
    let path = path.as_ref();
    if !PublicationStore::exists(path) {
        return IndexStats::default();
    }

    let docs = Index::open_in_dir(path).and_then(|index| {
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(reader.searcher().num_docs())
    });

    match docs {
        Ok(docs) => IndexStats { ready: true, docs },
        Err(e) => {
            warn!("Index at {:?} is unreadable: {}", path, e);
            IndexStats::default()
        }
    }
}
