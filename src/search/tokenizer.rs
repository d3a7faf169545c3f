use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tantivy::Index;
use tantivy::tokenizer::{
    Language, LowerCaser, RawTokenizer, SimpleTokenizer, Stemmer, TextAnalyzer, Token,
    TokenFilter, TokenStream, Tokenizer,
};
use tracing::debug;

/// Tokenizer name for stemmed English text
pub const STEM_TOKENIZER_NAME: &str = "pub_stem";

/// Tokenizer name for per-word character n-grams
pub const NGRAM_TOKENIZER_NAME: &str = "pub_ngram";

/// Tokenizer name for case-folded whole-value keywords
pub const KEYWORD_TOKENIZER_NAME: &str = "pub_keyword";

/// Tokenizer name for verbatim identifiers (tantivy built-in)
pub const RAW_TOKENIZER_NAME: &str = "raw";

/// Whether terms are produced for indexing or for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Index,
    Query,
}

/// Closed set of per-field analysis strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    /// Lowercase, split on word boundaries, English stemming
    Stemmed,
    /// Lowercase words expanded to character shingles of `min..=max` chars
    Ngram { min: usize, max: usize },
    /// Whole value, trimmed and case-folded, as one atomic term
    Keyword,
    /// Whole value verbatim
    Identifier,
    /// Integer value
    Numeric,
    /// Timestamp value
    DateTime,
    /// Stored only, never searchable
    Opaque,
}

impl Analyzer {
    /// Name of the tantivy tokenizer backing a text analyzer
    pub fn tokenizer_name(&self) -> Option<&'static str> {
        match self {
            Analyzer::Stemmed => Some(STEM_TOKENIZER_NAME),
            Analyzer::Ngram { .. } => Some(NGRAM_TOKENIZER_NAME),
            Analyzer::Keyword => Some(KEYWORD_TOKENIZER_NAME),
            Analyzer::Identifier => Some(RAW_TOKENIZER_NAME),
            Analyzer::Numeric | Analyzer::DateTime | Analyzer::Opaque => None,
        }
    }

    /// Build the tantivy analyzer used at index time
    pub fn text_analyzer(&self) -> Option<TextAnalyzer> {
        match *self {
            Analyzer::Stemmed => Some(
                TextAnalyzer::builder(SimpleTokenizer::default())
                    .filter(LowerCaser)
                    .filter(Stemmer::new(Language::English))
                    .build(),
            ),
            Analyzer::Ngram { min, max } => Some(
                TextAnalyzer::builder(SimpleTokenizer::default())
                    .filter(LowerCaser)
                    .filter(WordNgramFilter::new(min, max))
                    .build(),
            ),
            Analyzer::Keyword => Some(
                TextAnalyzer::builder(RawTokenizer::default())
                    .filter(LowerCaser)
                    .build(),
            ),
            Analyzer::Identifier => Some(TextAnalyzer::from(RawTokenizer::default())),
            Analyzer::Numeric | Analyzer::DateTime | Analyzer::Opaque => None,
        }
    }

    /// Turn raw text into the ordered terms this analyzer produces.
    ///
    /// Deterministic and side-effect free. Index and query share the same
    /// code; only n-grams differ by mode (queries use the longest grams only).
    pub fn analyze(&self, text: &str, mode: AnalysisMode) -> Vec<String> {
        match (*self, mode) {
            (Analyzer::Ngram { min, max }, AnalysisMode::Query) => word_tokens(text)
                .iter()
                .flat_map(|word| query_ngrams(word, min, max))
                .collect(),
            (Analyzer::Keyword, _) => {
                // RawTokenizer keeps surrounding whitespace, so trim first
                let value = text.trim();
                let searchable = match mode {
                    AnalysisMode::Index => !value.is_empty(),
                    // Bare punctuation is never a name
                    AnalysisMode::Query => value.chars().any(char::is_alphanumeric),
                };
                if searchable {
                    run_analyzer(self, value)
                } else {
                    Vec::new()
                }
            }
            (Analyzer::Identifier, _) => {
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text.to_string()]
                }
            }
            (Analyzer::Numeric, _) => text
                .trim()
                .parse::<i64>()
                .map(|n| vec![n.to_string()])
                .unwrap_or_default(),
            (Analyzer::DateTime, _) => parse_timestamp(text)
                .map(|dt| vec![dt.to_rfc3339()])
                .unwrap_or_default(),
            (Analyzer::Opaque, _) => Vec::new(),
            (Analyzer::Stemmed, _) | (Analyzer::Ngram { .. }, AnalysisMode::Index) => {
                run_analyzer(self, text)
            }
        }
    }
}

fn run_analyzer(analyzer: &Analyzer, text: &str) -> Vec<String> {
    let Some(mut text_analyzer) = analyzer.text_analyzer() else {
        return Vec::new();
    };
    let mut stream = text_analyzer.token_stream(text);
    let mut terms = Vec::new();
    while let Some(token) = stream.next() {
        terms.push(token.text.clone());
    }
    terms
}

/// Lowercased words, split the same way the n-gram tokenizer splits them
fn word_tokens(text: &str) -> Vec<String> {
    let mut analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build();
    let mut stream = analyzer.token_stream(text);
    let mut words = Vec::new();
    while let Some(token) = stream.next() {
        words.push(token.text.clone());
    }
    words
}

/// All shingles of `min..=max` chars, ordered by start then length
pub fn word_ngrams(word: &str, min: usize, max: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut grams = Vec::new();
    if min == 0 || chars.len() < min {
        return grams;
    }
    for start in 0..chars.len() {
        for size in min..=max {
            if start + size > chars.len() {
                break;
            }
            grams.push(chars[start..start + size].iter().collect());
        }
    }
    grams
}

/// Shingles of length `min(max, len)` only; a word matches when all are present
pub fn query_ngrams(word: &str, min: usize, max: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    if min == 0 || chars.len() < min {
        return Vec::new();
    }
    let size = chars.len().min(max);
    chars
        .windows(size)
        .map(|window| window.iter().collect())
        .collect()
}

/// Parse a crawler timestamp.
///
/// Accepts RFC 3339, a naive ISO-8601 date-time (taken as UTC) or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

/// Register every text analyzer the schema refers to
pub fn register_analyzers(index: &Index, analyzers: &[Analyzer]) {
    for analyzer in analyzers {
        let (Some(name), Some(text_analyzer)) = (analyzer.tokenizer_name(), analyzer.text_analyzer())
        else {
            continue;
        };
        // "raw" ships with tantivy
        if name == RAW_TOKENIZER_NAME {
            continue;
        }
        index.tokenizers().register(name, text_analyzer);
        debug!("Registered tokenizer {}", name);
    }
}

/// Token filter expanding each word into character n-grams
#[derive(Clone, Debug)]
pub struct WordNgramFilter {
    min_gram: usize,
    max_gram: usize,
}

impl WordNgramFilter {
    pub fn new(min_gram: usize, max_gram: usize) -> Self {
        Self { min_gram, max_gram }
    }
}

impl TokenFilter for WordNgramFilter {
    type Tokenizer<T: Tokenizer> = WordNgramFilterWrapper<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> Self::Tokenizer<T> {
        WordNgramFilterWrapper {
            inner: tokenizer,
            min_gram: self.min_gram,
            max_gram: self.max_gram,
        }
    }
}

#[derive(Clone)]
pub struct WordNgramFilterWrapper<T> {
    inner: T,
    min_gram: usize,
    max_gram: usize,
}

impl<T: Tokenizer> Tokenizer for WordNgramFilterWrapper<T> {
    type TokenStream<'a> = WordNgramTokenStream<T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        WordNgramTokenStream {
            tail: self.inner.token_stream(text),
            min_gram: self.min_gram,
            max_gram: self.max_gram,
            pending: VecDeque::new(),
            token: Token::default(),
            position: 0,
        }
    }
}

pub struct WordNgramTokenStream<T> {
    tail: T,
    min_gram: usize,
    max_gram: usize,
    pending: VecDeque<String>,
    token: Token,
    position: usize,
}

impl<T: TokenStream> TokenStream for WordNgramTokenStream<T> {
    fn advance(&mut self) -> bool {
        loop {
            if let Some(gram) = self.pending.pop_front() {
                self.token.text = gram;
                return true;
            }
            if !self.tail.advance() {
                return false;
            }
            let word = self.tail.token();
            self.pending
                .extend(word_ngrams(&word.text, self.min_gram, self.max_gram));
            // Grams of one word share its offsets and get a position each
            self.token.offset_from = word.offset_from;
            self.token.offset_to = word.offset_to;
            self.token.position = self.position;
            self.token.position_length = 1;
            self.position += 1;
        }
    }

    fn token(&self) -> &Token {
        &self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.token
    }
}
