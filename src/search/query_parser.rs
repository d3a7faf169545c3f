use std::collections::HashSet;
use std::fmt;

/// Represents a parsed query term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTerm {
    /// Quoted text whose words must appear together (e.g., "fiscal policy")
    Phrase(String),
    /// A single whitespace-delimited word
    Word(String),
}

impl QueryTerm {
    /// The raw text of the term
    pub fn text(&self) -> &str {
        match self {
            QueryTerm::Phrase(text) | QueryTerm::Word(text) => text,
        }
    }
}

impl fmt::Display for QueryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTerm::Phrase(phrase) => write!(f, "\"{}\"", phrase),
            QueryTerm::Word(word) => write!(f, "{}", word),
        }
    }
}

/// Splits free text into query terms
pub struct QueryParser;

impl QueryParser {
    /// Parse a query string into query terms.
    ///
    /// Double quotes group words into a phrase; a backslash escapes the next
    /// character. An unclosed quote runs to the end of the input.
    ///
    /// # Examples
    /// ```
    /// use pub_search::search::query_parser::{QueryParser, QueryTerm};
    ///
    /// let terms = QueryParser::parse("\"fiscal policy\" inflation");
    /// assert_eq!(terms[0], QueryTerm::Phrase("fiscal policy".to_string()));
    /// assert_eq!(terms[1], QueryTerm::Word("inflation".to_string()));
    /// ```
    pub fn parse(query: &str) -> Vec<QueryTerm> {
        let mut terms = Vec::new();
        let mut current = String::new();
        let mut in_phrase = false;
        let mut escape_next = false;

        for ch in query.chars() {
            if escape_next {
                current.push(ch);
                escape_next = false;
                continue;
            }

            match ch {
                '\\' => escape_next = true,
                '"' => {
                    if in_phrase {
                        push_phrase(&mut terms, &current);
                    } else {
                        push_words(&mut terms, &current);
                    }
                    current.clear();
                    in_phrase = !in_phrase;
                }
                c if c.is_whitespace() && !in_phrase => {
                    push_words(&mut terms, &current);
                    current.clear();
                }
                _ => current.push(ch),
            }
        }

        if in_phrase {
            push_phrase(&mut terms, &current);
        } else {
            push_words(&mut terms, &current);
        }

        terms
    }

    /// Parse and keep only the first occurrence of each term, ignoring case
    pub fn parse_distinct(query: &str) -> Vec<QueryTerm> {
        let mut seen = HashSet::new();
        Self::parse(query)
            .into_iter()
            .filter(|term| {
                let key = match term {
                    QueryTerm::Phrase(p) => format!("\"{}", p.to_lowercase()),
                    QueryTerm::Word(w) => w.to_lowercase(),
                };
                seen.insert(key)
            })
            .collect()
    }

    /// Check if the query contains any phrase terms
    pub fn has_phrases(terms: &[QueryTerm]) -> bool {
        terms
            .iter()
            .any(|term| matches!(term, QueryTerm::Phrase(_)))
    }
}

fn push_phrase(terms: &mut Vec<QueryTerm>, text: &str) {
    let phrase = text.trim();
    if !phrase.is_empty() {
        terms.push(QueryTerm::Phrase(phrase.to_string()));
    }
}

fn push_words(terms: &mut Vec<QueryTerm>, text: &str) {
    terms.extend(
        text.split_whitespace()
            .map(|word| QueryTerm::Word(word.to_string())),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_words() {
        let terms = QueryParser::parse("fiscal policy inflation");

        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0], QueryTerm::Word("fiscal".to_string()));
        assert_eq!(terms[1], QueryTerm::Word("policy".to_string()));
        assert_eq!(terms[2], QueryTerm::Word("inflation".to_string()));
    }

    #[test]
    fn test_parse_mixed_phrase_and_words() {
        let terms = QueryParser::parse("\"A. Smith\" volatility \"journal article\"");

        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0], QueryTerm::Phrase("A. Smith".to_string()));
        assert_eq!(terms[1], QueryTerm::Word("volatility".to_string()));
        assert_eq!(terms[2], QueryTerm::Phrase("journal article".to_string()));
        assert!(QueryParser::has_phrases(&terms));
    }

    #[test]
    fn test_parse_with_extra_whitespace() {
        let terms = QueryParser::parse("  \"machine  learning\"\tvision   ");

        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0], QueryTerm::Phrase("machine  learning".to_string()));
        assert_eq!(terms[1], QueryTerm::Word("vision".to_string()));
    }

    #[test]
    fn test_parse_unclosed_phrase() {
        let terms = QueryParser::parse("\"market volatility");
        assert_eq!(terms, vec![QueryTerm::Phrase("market volatility".to_string())]);
    }

    #[test]
    fn test_parse_empty_inputs() {
        assert!(QueryParser::parse("").is_empty());
        assert!(QueryParser::parse("   \t ").is_empty());
        assert_eq!(
            QueryParser::parse("\"\" word \"  \""),
            vec![QueryTerm::Word("word".to_string())]
        );
    }

    #[test]
    fn test_parse_escaped_quote() {
        let terms = QueryParser::parse(r#"word \"escaped quote\" phrase"#);

        assert_eq!(terms.len(), 4);
        assert_eq!(terms[1], QueryTerm::Word("\"escaped".to_string()));
        assert_eq!(terms[2], QueryTerm::Word("quote\"".to_string()));
    }

    #[test]
    fn test_parse_distinct() {
        let terms = QueryParser::parse_distinct("Policy policy \"policy\" POLICY inflation");
        assert_eq!(
            terms,
            vec![
                QueryTerm::Word("Policy".to_string()),
                QueryTerm::Phrase("policy".to_string()),
                QueryTerm::Word("inflation".to_string()),
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(QueryTerm::Phrase("a b".to_string()).to_string(), "\"a b\"");
        assert_eq!(QueryTerm::Word("a".to_string()).text(), "a");
    }
}
