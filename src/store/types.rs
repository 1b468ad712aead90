//! Record types for the chunk store and ranking passes.
//!
//! [`Entry`] mirrors the `entries` table, [`Chunk`] the `chunks` table,
//! [`StoredEmbedding`] one row of the per-user vector scan, and [`RankedDoc`]
//! the in-memory result of a ranking pass.

use serde::{Deserialize, Deserializer, Serialize};

/// A journal entry to be written by the entry store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntry {
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    pub body: String,
    /// ISO 8601 timestamp, e.g. `2025-09-24T12:00:00Z`.
    pub created_at: String,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
}

/// A journal record, matching the `entries` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
}

/// A contiguous slice of an entry's normalized body; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Monotonically assigned primary key, shared with the FTS rowid.
    pub id: i64,
    pub entry_id: i64,
    pub user_id: String,
    /// Position of this chunk within its entry, starting at 0.
    pub position: i64,
    pub text: String,
    /// Inherited from the owning entry.
    pub created_at: String,
    /// Serialized tag list of the owning entry.
    pub tags: Option<String>,
}

/// One row of the per-user vector scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub chunk_id: i64,
    pub vector: Vec<f32>,
    pub date: String,
    pub text: String,
}

/// A scored result within a single ranking pass.
///
/// Scores are only comparable with other docs from the same pass: cosine
/// similarity, RRF sums, and recency-adjusted values live on different scales.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDoc {
    pub id: i64,
    pub text: String,
    pub date: String,
    pub score: f64,
}

impl RankedDoc {
    /// A lexical hit carried through without a meaningful score.
    pub fn from_chunk(chunk: Chunk, score: f64) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text,
            date: chunk.created_at,
            score,
        }
    }
}

/// Serialize a tag set the way the `tags` columns store it.
pub fn serialize_tags(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        None
    } else {
        serde_json::to_string(tags).ok()
    }
}

/// Parse a stored tag column. Accepts JSON arrays and the comma-separated form
/// older rows used.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    if let Ok(tags) = serde_json::from_str::<Vec<String>>(raw) {
        return tags;
    }
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Accept tags as a JSON list or as one string in any form [`parse_tags`] reads.
pub fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<Tags>::deserialize(deserializer)? {
        Some(Tags::List(tags)) => tags,
        Some(Tags::Text(raw)) => parse_tags(Some(&raw)),
        None => Vec::new(),
    })
}
