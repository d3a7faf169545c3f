//! Multi-field query construction.
//!
//! Each distinct query term becomes one clause that matches when the term is
//! found in any target field; per-field sub-queries carry the field's weight
//! as a boost so BM25 scores add up as a weighted sum. A candidate must
//! satisfy a minimum number of term clauses.

use std::collections::HashSet;

use tantivy::Term;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tracing::debug;

use super::query_parser::{QueryParser, QueryTerm};
use super::schema::PublicationSchema;
use super::tokenizer::{AnalysisMode, Analyzer};
use crate::config::FieldWeights;

/// A searchable field and its ranking weight
#[derive(Debug, Clone, Copy)]
pub struct TargetField {
    pub field: Field,
    pub analyzer: Analyzer,
    pub weight: f32,
}

/// Query compiled against the publication schema
pub struct CompiledQuery {
    pub query: Box<dyn Query>,
    /// Term clauses that had at least one analyzable field
    pub clause_count: usize,
    pub min_should_match: usize,
}

impl std::fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("clause_count", &self.clause_count)
            .field("min_should_match", &self.min_should_match)
            .finish()
    }
}

/// Number of term clauses a document must match.
///
/// `term_count` counts distinct terms after stemming. Fewer than two terms
/// require all of them; otherwise the fraction is rounded up, so two terms
/// at 0.9 still require both.
pub fn required_matches(term_count: usize, fraction: f64) -> usize {
    if term_count < 2 {
        return term_count;
    }
    // Guard against 0.9 * 10 landing a hair above 9
    let required = (term_count as f64 * fraction - 1e-9).ceil() as usize;
    required.clamp(1, term_count)
}

/// Builds weighted multi-field queries
#[derive(Debug, Clone)]
pub struct MultiFieldQueryBuilder {
    targets: Vec<TargetField>,
    min_match_fraction: f64,
}

impl MultiFieldQueryBuilder {
    /// Targets `title`, `title_ngram`, `authors`, `publication_type` in that order
    pub fn new(schema: &PublicationSchema, weights: &FieldWeights, min_match_fraction: f64) -> Self {
        let target = |field: Field, weight: f32| TargetField {
            field,
            analyzer: schema.analyzer_for(field),
            weight,
        };

        Self {
            targets: vec![
                target(schema.title, weights.title),
                target(schema.title_ngram, weights.title_ngram),
                target(schema.authors, weights.authors),
                target(schema.publication_type, weights.publication_type),
            ],
            min_match_fraction,
        }
    }

    pub fn targets(&self) -> &[TargetField] {
        &self.targets
    }

    /// Compile free text; `None` when nothing in it can match any field
    pub fn build(&self, query: &str) -> Option<CompiledQuery> {
        let terms = distinct_by_stem(QueryParser::parse_distinct(query));

        let clauses: Vec<Box<dyn Query>> = terms
            .iter()
            .filter_map(|term| {
                let clause = self.term_clause(term);
                if clause.is_none() {
                    debug!("Query term {} has no analyzable tokens", term);
                }
                clause
            })
            .collect();

        if clauses.is_empty() {
            return None;
        }

        let clause_count = clauses.len();
        let min_should_match = required_matches(clause_count, self.min_match_fraction);

        let subqueries = clauses
            .into_iter()
            .map(|clause| (Occur::Should, clause))
            .collect();
        let mut combined = BooleanQuery::new(subqueries);
        combined.set_minimum_number_should_match(min_should_match);

        debug!(
            "Compiled query '{}': {} clauses, {} required",
            query_preview(query),
            clause_count,
            min_should_match
        );

        Some(CompiledQuery {
            query: Box::new(combined),
            clause_count,
            min_should_match,
        })
    }

    /// One term matched in any field, each field boosted by its weight
    fn term_clause(&self, term: &QueryTerm) -> Option<Box<dyn Query>> {
        let field_queries: Vec<(Occur, Box<dyn Query>)> = self
            .targets
            .iter()
            .filter_map(|target| {
                let query = field_query(target, term)?;
                let boosted: Box<dyn Query> = Box::new(BoostQuery::new(query, target.weight));
                Some((Occur::Should, boosted))
            })
            .collect();

        if field_queries.is_empty() {
            None
        } else {
            Some(Box::new(BooleanQuery::new(field_queries)))
        }
    }
}

/// Sub-query for one term in one field, analyzed as the field was at index time
fn field_query(target: &TargetField, term: &QueryTerm) -> Option<Box<dyn Query>> {
    let tokens = target.analyzer.analyze(term.text(), AnalysisMode::Query);
    if tokens.is_empty() {
        return None;
    }

    let mut terms: Vec<Term> = tokens
        .iter()
        .map(|token| Term::from_field_text(target.field, token))
        .collect();

    match target.analyzer {
        // Multi-token words ("covid-19") and phrases must appear in order
        Analyzer::Stemmed if terms.len() > 1 => Some(Box::new(PhraseQuery::new(terms))),
        // Every query gram must be present in the title's grams
        Analyzer::Ngram { .. } if terms.len() > 1 => {
            let grams = terms
                .into_iter()
                .map(|term| {
                    let q: Box<dyn Query> =
                        Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                    (Occur::Must, q)
                })
                .collect();
            Some(Box::new(BooleanQuery::new(grams)))
        }
        _ => {
            let term = terms.swap_remove(0);
            Some(Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)))
        }
    }
}

/// Keep the first of several terms with the same stemmed form, so
/// "policy policies" counts as one term. Unstemmable terms compare by text.
fn distinct_by_stem(terms: Vec<QueryTerm>) -> Vec<QueryTerm> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .filter(|term| {
            let stems = Analyzer::Stemmed.analyze(term.text(), AnalysisMode::Query);
            let key = if stems.is_empty() {
                term.text().to_lowercase()
            } else {
                stems.join(" ")
            };
            seen.insert((matches!(term, QueryTerm::Phrase(_)), key))
        })
        .collect()
}

fn query_preview(text: &str) -> String {
    const MAX_PREVIEW: usize = 80;
    if text.chars().count() <= MAX_PREVIEW {
        text.to_string()
    } else {
        let mut preview: String = text.chars().take(MAX_PREVIEW).collect();
        preview.push('…');
        preview
    }
}
