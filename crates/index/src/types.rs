//! Core data types shared across the indexing pipeline and the query engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Stable identifier of a source record: an integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Parse an identifier from a JSON value.
    ///
    /// Accepts integers and non-empty strings; anything else is rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) if !s.trim().is_empty() => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Str(id.to_string())
    }
}

/// A record from the corpus (one movie).
///
/// The fields the pipeline relies on are explicit; everything else the
/// catalog provided is kept in `extra` and echoed back in query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub id: RecordId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,

    pub genre_ids: Vec<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceRecord {
    /// Minimal record, mostly useful for building corpora in code.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            title: None,
            overview: None,
            genre_ids: Vec::new(),
            release_date: None,
            extra: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_overview(mut self, overview: impl Into<String>) -> Self {
        self.overview = Some(overview.into());
        self
    }

    pub fn with_genres(mut self, genre_ids: Vec<i64>) -> Self {
        self.genre_ids = genre_ids;
        self
    }

    pub fn with_release_date(mut self, date: impl Into<String>) -> Self {
        self.release_date = Some(date.into());
        self
    }

    /// Validate a raw JSON element into a record.
    ///
    /// Text fields of the wrong JSON type are treated as absent.
    pub fn from_json(value: Value) -> Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("record is not a JSON object".to_string());
        };

        let id = map
            .remove("id")
            .as_ref()
            .and_then(RecordId::from_json)
            .ok_or_else(|| "record has no usable 'id'".to_string())?;

        let title = take_string(&mut map, "title");
        let overview = take_string(&mut map, "overview");
        let release_date = take_string(&mut map, "release_date");

        let genre_ids = match map.remove("genre_ids") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            id,
            title,
            overview,
            genre_ids,
            release_date,
            extra: map,
        })
    }

    /// Release year bucket: the first four characters of `release_date`
    /// when they are all ASCII digits.
    pub fn release_year(&self) -> Option<&str> {
        let date = self.release_date.as_deref()?;
        let year = date.get(..4)?;
        year.bytes().all(|b| b.is_ascii_digit()).then_some(year)
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Text that gets embedded, tied back to its source record.
///
/// The position of a document in the snapshot's document list is the row
/// of its vector in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexableDocument {
    pub text: String,
    pub source_id: RecordId,
}

/// A single search hit joined back to live record data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    #[serde(flatten)]
    pub record: SourceRecord,

    /// The indexed text that matched
    #[serde(rename = "searched_overview")]
    pub matched_text: String,

    /// Cosine similarity in [-1, 1], higher is better
    #[serde(rename = "similarity_score")]
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_json() {
        let record = SourceRecord::from_json(json!({
            "id": 603,
            "title": "The Matrix",
            "overview": "A hacker learns the truth about reality.",
            "genre_ids": [28, 878],
            "release_date": "1999-03-30",
            "popularity": 83.1
        }))
        .unwrap();

        assert_eq!(record.id, RecordId::Int(603));
        assert_eq!(record.title.as_deref(), Some("The Matrix"));
        assert_eq!(record.genre_ids, vec![28, 878]);
        assert_eq!(record.release_year(), Some("1999"));
        assert_eq!(record.extra.get("popularity"), Some(&json!(83.1)));
    }

    #[test]
    fn test_record_string_id_and_bad_overview() {
        let record = SourceRecord::from_json(json!({
            "id": "tt0133093",
            "overview": 42
        }))
        .unwrap();

        assert_eq!(record.id, RecordId::Str("tt0133093".to_string()));
        assert!(record.overview.is_none());
        assert!(record.genre_ids.is_empty());
    }

    #[test]
    fn test_record_rejects_missing_id() {
        assert!(SourceRecord::from_json(json!({"overview": "x"})).is_err());
        assert!(SourceRecord::from_json(json!({"id": 1.5})).is_err());
        assert!(SourceRecord::from_json(json!({"id": "  "})).is_err());
        assert!(SourceRecord::from_json(json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_release_year() {
        let record = SourceRecord::new(1).with_release_date("2012");
        assert_eq!(record.release_year(), Some("2012"));

        let record = SourceRecord::new(1).with_release_date("TBA");
        assert_eq!(record.release_year(), None);

        let record = SourceRecord::new(1).with_release_date("");
        assert_eq!(record.release_year(), None);
    }

    #[test]
    fn test_query_result_serialization() {
        let result = QueryResult {
            record: SourceRecord::new(7).with_title("Heat"),
            matched_text: "A heist goes wrong.".to_string(),
            score: 0.5,
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["title"], json!("Heat"));
        assert_eq!(value["searched_overview"], json!("A heist goes wrong."));
        assert_eq!(value["similarity_score"], json!(0.5));
    }

    #[test]
    fn test_record_id_display() {
        assert_eq!(RecordId::Int(12).to_string(), "12");
        assert_eq!(RecordId::from("abc").to_string(), "abc");
    }
}
