//! Corpus loading and document preparation.
//!
//! The corpus is a JSON array of movie records. Records are validated once,
//! at ingestion, and are immutable afterwards.

use crate::types::{IndexableDocument, RecordId, SourceRecord};
use marquee_core::{AppError, AppResult};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Immutable, id-addressable collection of source records.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<SourceRecord>,
    by_id: HashMap<RecordId, usize>,
}

impl Corpus {
    /// Load a corpus from a JSON file containing an array of records.
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Corpus(format!("Failed to read corpus {}: {}", path.display(), e))
        })?;

        let corpus = Self::from_json_str(&contents)?;

        info!(
            "Loaded {} records from {}",
            corpus.len(),
            path.display()
        );

        Ok(corpus)
    }

    /// Parse a corpus from JSON text.
    pub fn from_json_str(contents: &str) -> AppResult<Self> {
        let value: Value = serde_json::from_str(contents)
            .map_err(|e| AppError::Corpus(format!("Corpus is not valid JSON: {}", e)))?;

        match value {
            Value::Array(items) => Ok(Self::from_values(items)),
            _ => Err(AppError::Corpus(
                "Corpus must be a JSON array of records".to_string(),
            )),
        }
    }

    /// Validate raw JSON elements, skipping the ones without a usable id.
    pub fn from_values(values: Vec<Value>) -> Self {
        let mut skipped = 0usize;
        let records = values
            .into_iter()
            .enumerate()
            .filter_map(|(position, value)| match SourceRecord::from_json(value) {
                Ok(record) => Some(record),
                Err(reason) => {
                    debug!(position, reason = %reason, "Skipping corpus element");
                    skipped += 1;
                    None
                }
            })
            .collect::<Vec<_>>();

        if skipped > 0 {
            warn!("Skipped {} corpus elements without a usable id", skipped);
        }

        Self::from_records(records)
    }

    /// Build a corpus from already-validated records.
    ///
    /// Ids must be unique: the first occurrence wins.
    pub fn from_records(records: Vec<SourceRecord>) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());

        for record in records {
            if by_id.contains_key(&record.id) {
                warn!(id = %record.id, "Duplicate record id; keeping the first occurrence");
                continue;
            }
            by_id.insert(record.id.clone(), unique.len());
            unique.push(record);
        }

        Self {
            records: unique,
            by_id,
        }
    }

    /// Look up a record by id.
    pub fn get(&self, id: &RecordId) -> Option<&SourceRecord> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How the embedded text of a record is composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextTemplate {
    /// The overview alone
    #[default]
    Overview,
    /// `Title: {title}. Genre IDs: {genres}. Overview: {overview}`
    Composite,
}

impl TextTemplate {
    /// Render the text to embed, or `None` when the record has no overview.
    pub fn render(&self, record: &SourceRecord) -> Option<String> {
        let overview = record.overview.as_deref().map(str::trim)?;
        if overview.is_empty() {
            return None;
        }

        match self {
            TextTemplate::Overview => Some(overview.to_string()),
            TextTemplate::Composite => {
                let title = record.title.as_deref().map(str::trim).unwrap_or_default();
                let genres = record
                    .genre_ids
                    .iter()
                    .map(|g| g.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(format!(
                    "Title: {}. Genre IDs: {}. Overview: {}",
                    title, genres, overview
                ))
            }
        }
    }
}

impl FromStr for TextTemplate {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overview" => Ok(TextTemplate::Overview),
            "composite" => Ok(TextTemplate::Composite),
            other => Err(AppError::Config(format!(
                "Unknown text template '{}'. Expected 'overview' or 'composite'",
                other
            ))),
        }
    }
}

impl fmt::Display for TextTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextTemplate::Overview => f.write_str("overview"),
            TextTemplate::Composite => f.write_str("composite"),
        }
    }
}

/// Turn every record with a usable overview into an indexable document.
///
/// Records lacking one are skipped silently. Output order follows corpus
/// order.
pub fn prepare_documents(corpus: &Corpus, template: TextTemplate) -> Vec<IndexableDocument> {
    let documents: Vec<IndexableDocument> = corpus
        .records()
        .iter()
        .filter_map(|record| {
            template.render(record).map(|text| IndexableDocument {
                text,
                source_id: record.id.clone(),
            })
        })
        .collect();

    debug!(
        "Prepared {} documents from {} records ({} template)",
        documents.len(),
        corpus.len(),
        template
    );

    documents
}

/// Category statistics used to size the clustered index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorpusStats {
    /// Distinct genre tags across all records
    pub distinct_tags: usize,
    /// Distinct release years across all records
    pub distinct_time_buckets: usize,
}

impl CorpusStats {
    /// Collect over every record, including ones that yield no document.
    pub fn collect(corpus: &Corpus) -> Self {
        let mut tags = HashSet::new();
        let mut years = HashSet::new();

        for record in corpus.records() {
            tags.extend(record.genre_ids.iter().copied());
            if let Some(year) = record.release_year() {
                years.insert(year);
            }
        }

        Self {
            distinct_tags: tags.len(),
            distinct_time_buckets: years.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_corpus() -> Corpus {
        Corpus::from_records(vec![
            SourceRecord::new(1)
                .with_title("Alien")
                .with_overview("  A crew meets a deadly creature.  ")
                .with_genres(vec![27, 878])
                .with_release_date("1979-05-25"),
            SourceRecord::new(2)
                .with_title("No Overview")
                .with_genres(vec![18])
                .with_release_date("2001-01-01"),
            SourceRecord::new(3)
                .with_title("Blank")
                .with_overview("   ")
                .with_release_date("unknown"),
        ])
    }

    #[test]
    fn test_from_json_str_rejects_non_array() {
        let result = Corpus::from_json_str(r#"{"id": 1}"#);
        assert!(matches!(result, Err(AppError::Corpus(_))));

        let result = Corpus::from_json_str("not json");
        assert!(matches!(result, Err(AppError::Corpus(_))));
    }

    #[test]
    fn test_from_values_skips_missing_ids_and_duplicates() {
        let corpus = Corpus::from_values(vec![
            json!({"id": 1, "overview": "first"}),
            json!({"overview": "no id"}),
            json!({"id": 1, "overview": "duplicate"}),
            json!({"id": "x", "overview": "string id"}),
        ]);

        assert_eq!(corpus.len(), 2);
        assert_eq!(
            corpus.get(&RecordId::Int(1)).unwrap().overview.as_deref(),
            Some("first")
        );
        assert!(corpus.get(&RecordId::from("x")).is_some());
        assert!(corpus.get(&RecordId::Int(2)).is_none());
    }

    #[test]
    fn test_prepare_documents_overview() {
        let corpus = sample_corpus();
        let documents = prepare_documents(&corpus, TextTemplate::Overview);

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].text, "A crew meets a deadly creature.");
        assert_eq!(documents[0].source_id, RecordId::Int(1));
    }

    #[test]
    fn test_prepare_documents_composite() {
        let corpus = sample_corpus();
        let documents = prepare_documents(&corpus, TextTemplate::Composite);

        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[0].text,
            "Title: Alien. Genre IDs: 27, 878. Overview: A crew meets a deadly creature."
        );
    }

    #[test]
    fn test_corpus_stats_count_every_record() {
        let stats = CorpusStats::collect(&sample_corpus());
        assert_eq!(stats.distinct_tags, 3);
        assert_eq!(stats.distinct_time_buckets, 2);
    }

    #[test]
    fn test_text_template_parse() {
        assert_eq!(
            "Composite".parse::<TextTemplate>().unwrap(),
            TextTemplate::Composite
        );
        assert!("title".parse::<TextTemplate>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("movies.json");
        std::fs::write(&path, r#"[{"id": 10, "overview": "Space."}]"#).unwrap();

        let corpus = Corpus::load(&path).unwrap();
        assert_eq!(corpus.len(), 1);

        let missing = Corpus::load(&temp.path().join("missing.json"));
        assert!(matches!(missing, Err(AppError::Corpus(_))));
    }
}
