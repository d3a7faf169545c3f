use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// An author entry as emitted by the crawler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub profile_url: String,
}

impl Author {
    pub fn new(name: impl Into<String>, profile_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile_url: profile_url.into(),
        }
    }
}

/// One line of the crawler feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub publication_type: Option<String>,
    #[serde(default)]
    pub crawled_at: Option<String>,
}

/// Records read from a feed plus the number of lines that were dropped
#[derive(Debug, Default)]
pub struct FeedBatch {
    pub records: Vec<PublicationRecord>,
    pub skipped: usize,
}

/// Treat an explicit null like a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `2023`, `"2023"` or null; anything else becomes `None`
fn lenient_year<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Read a JSONL feed file.
///
/// Only an unreadable file is an error; undecodable lines are skipped.
pub fn read_feed<P: AsRef<Path>>(path: P) -> Result<FeedBatch> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open feed {}", path.display()))?;
    let batch = parse_feed(BufReader::new(file))
        .with_context(|| format!("Failed to read feed {}", path.display()))?;

    info!(
        "Read {} records from {} ({} lines skipped)",
        batch.records.len(),
        path.display(),
        batch.skipped
    );
    Ok(batch)
}

/// Parse JSONL records from any buffered reader
pub fn parse_feed<R: BufRead>(reader: R) -> Result<FeedBatch> {
    let mut batch = FeedBatch::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<PublicationRecord>(line) {
            Ok(record) if record.id.trim().is_empty() => {
                warn!("Skipping feed line {}: empty id", line_no + 1);
                batch.skipped += 1;
            }
            Ok(record) => batch.records.push(record),
            Err(e) => {
                warn!("Skipping malformed feed line {}: {}", line_no + 1, e);
                batch.skipped += 1;
            }
        }
    }

    Ok(batch)
}

/// Write a one-record demo feed if `path` does not exist yet.
///
/// Returns true when the file was created.
pub fn seed_demo_if_missing<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let demo = PublicationRecord {
        id: "demo-publication-1".to_string(),
        title: "Fiscal Policy and Market Volatility".to_string(),
        year: Some(2023),
        url: "https://example.org/publications/fiscal-policy-and-market-volatility".to_string(),
        authors: vec![Author::new(
            "Demo Author",
            "https://example.org/persons/demo-author",
        )],
        publication_type: Some("Journal Article".to_string()),
        crawled_at: Some(chrono::Utc::now().to_rfc3339()),
    };

    let line = serde_json::to_string(&demo)?;
    fs::write(path, format!("{line}\n"))
        .with_context(|| format!("Failed to write demo feed {}", path.display()))?;
    debug!("Seeded demo feed at {}", path.display());
    Ok(true)
}
