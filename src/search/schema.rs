use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tantivy::schema::{
    DateOptions, Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions,
};

use super::tokenizer::Analyzer;

/// Whether a field's original value is kept in the document store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Stored,
    Unstored,
}

/// Declaration of a single indexed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub storage: Storage,
    pub analyzer: Analyzer,
}

impl FieldSpec {
    const fn new(name: &'static str, storage: Storage, analyzer: Analyzer) -> Self {
        Self {
            name,
            storage,
            analyzer,
        }
    }

    fn is_stored(&self) -> bool {
        self.storage == Storage::Stored
    }
}

pub const DOC_ID: &str = "doc_id";
pub const TITLE: &str = "title";
pub const TITLE_NGRAM: &str = "title_ngram";
pub const AUTHORS: &str = "authors";
pub const AUTHOR_LINKS: &str = "author_links";
pub const PUBLICATION_TYPE: &str = "publication_type";
pub const YEAR: &str = "year";
pub const CRAWLED_AT: &str = "crawled_at";
pub const URL: &str = "url";
pub const INSERT_SEQ: &str = "insert_seq";

/// The publication document model
pub const PUBLICATION_FIELDS: [FieldSpec; 10] = [
    FieldSpec::new(DOC_ID, Storage::Stored, Analyzer::Identifier),
    FieldSpec::new(TITLE, Storage::Stored, Analyzer::Stemmed),
    FieldSpec::new(TITLE_NGRAM, Storage::Unstored, Analyzer::Ngram { min: 3, max: 6 }),
    FieldSpec::new(AUTHORS, Storage::Stored, Analyzer::Keyword),
    FieldSpec::new(AUTHOR_LINKS, Storage::Stored, Analyzer::Opaque),
    FieldSpec::new(PUBLICATION_TYPE, Storage::Stored, Analyzer::Stemmed),
    FieldSpec::new(YEAR, Storage::Stored, Analyzer::Numeric),
    FieldSpec::new(CRAWLED_AT, Storage::Stored, Analyzer::DateTime),
    FieldSpec::new(URL, Storage::Stored, Analyzer::Opaque),
    // Write order across commits; breaks ranking ties
    FieldSpec::new(INSERT_SEQ, Storage::Unstored, Analyzer::Numeric),
];

/// Publication index schema definition
#[derive(Clone, Debug)]
pub struct PublicationSchema {
    pub schema: Schema,
    pub doc_id: Field,
    pub title: Field,
    pub title_ngram: Field,
    pub authors: Field,
    pub author_links: Field,
    pub publication_type: Field,
    pub year: Field,
    pub crawled_at: Field,
    pub url: Field,
    pub insert_seq: Field,
}

impl PublicationSchema {
    /// Create the declared publication schema
    pub fn new() -> Self {
        let schema = build_tantivy_schema(&PUBLICATION_FIELDS);
        Self::bind(schema).expect("PUBLICATION_FIELDS declares every publication field")
    }

    /// Resolve field handles against an existing tantivy schema
    pub fn bind(schema: Schema) -> Result<Self> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .with_context(|| format!("Index schema has no field '{name}'"))
        };

        Ok(Self {
            doc_id: field(DOC_ID)?,
            title: field(TITLE)?,
            title_ngram: field(TITLE_NGRAM)?,
            authors: field(AUTHORS)?,
            author_links: field(AUTHOR_LINKS)?,
            publication_type: field(PUBLICATION_TYPE)?,
            year: field(YEAR)?,
            crawled_at: field(CRAWLED_AT)?,
            url: field(URL)?,
            insert_seq: field(INSERT_SEQ)?,
            schema,
        })
    }

    /// Analyzers the schema needs registered on an index
    pub fn analyzers(&self) -> Vec<Analyzer> {
        PUBLICATION_FIELDS.iter().map(|spec| spec.analyzer).collect()
    }

    /// Declared analyzer for a field handle
    pub fn analyzer_for(&self, field: Field) -> Analyzer {
        let name = self.schema.get_field_name(field);
        PUBLICATION_FIELDS
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.analyzer)
            .unwrap_or(Analyzer::Opaque)
    }

    /// Field names of this schema
    pub fn field_names(&self) -> BTreeSet<String> {
        field_names(&self.schema)
    }
}

impl Default for PublicationSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Field names of any tantivy schema
pub fn field_names(schema: &Schema) -> BTreeSet<String> {
    schema
        .fields()
        .map(|(_, entry)| entry.name().to_string())
        .collect()
}

/// Translate a field table into tantivy field options
pub fn build_tantivy_schema(specs: &[FieldSpec]) -> Schema {
    let mut builder = Schema::builder();

    for spec in specs {
        match spec.analyzer {
            Analyzer::Numeric => {
                let mut options = NumericOptions::default().set_indexed().set_fast();
                if spec.is_stored() {
                    options = options.set_stored();
                }
                builder.add_i64_field(spec.name, options);
            }
            Analyzer::DateTime => {
                let mut options = DateOptions::default().set_indexed().set_fast();
                if spec.is_stored() {
                    options = options.set_stored();
                }
                builder.add_date_field(spec.name, options);
            }
            Analyzer::Opaque => {
                let mut options = TextOptions::default();
                if spec.is_stored() {
                    options = options.set_stored();
                }
                builder.add_text_field(spec.name, options);
            }
            analyzer => {
                let record_option = match analyzer {
                    // Positions allow quoted phrase queries
                    Analyzer::Stemmed => IndexRecordOption::WithFreqsAndPositions,
                    Analyzer::Identifier => IndexRecordOption::Basic,
                    _ => IndexRecordOption::WithFreqs,
                };
                let tokenizer = analyzer.tokenizer_name().unwrap_or("default");
                let indexing = TextFieldIndexing::default()
                    .set_tokenizer(tokenizer)
                    .set_index_option(record_option);
                let mut options = TextOptions::default().set_indexing_options(indexing);
                if spec.is_stored() {
                    options = options.set_stored();
                }
                builder.add_text_field(spec.name, options);
            }
        }
    }

    builder.build()
}
