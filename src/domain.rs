use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::GutenError;

/// Ordering applied to the collected records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Download count, most popular first (server-side).
    #[default]
    Popular,
    /// Gutenberg id, lowest first (server-side).
    Ascending,
    /// Gutenberg id, highest first (server-side).
    Descending,
    /// Case-insensitive title over a popularity pool (client-side).
    Title,
    /// Case-insensitive first author over a popularity pool (client-side).
    Author,
    /// Uniform sample drawn from a popularity pool.
    Random,
}

impl SortMode {
    /// The `sort` query value sent to the API for this mode.
    pub fn api_sort(self) -> &'static str {
        match self {
            SortMode::Ascending => "ascending",
            SortMode::Descending => "descending",
            SortMode::Popular | SortMode::Title | SortMode::Author | SortMode::Random => "popular",
        }
    }

    /// How many records must be accumulated before `n` can be served.
    pub fn pool_target(self, n: usize) -> usize {
        match self {
            SortMode::Popular | SortMode::Ascending | SortMode::Descending => n,
            SortMode::Title | SortMode::Author => n.saturating_mul(3).max(100),
            SortMode::Random => n.saturating_mul(10).clamp(100, 1000),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortMode::Popular => write!(f, "popular"),
            SortMode::Ascending => write!(f, "ascending"),
            SortMode::Descending => write!(f, "descending"),
            SortMode::Title => write!(f, "title"),
            SortMode::Author => write!(f, "author"),
            SortMode::Random => write!(f, "random"),
        }
    }
}

/// One Gutendex book entry.
///
/// The record keeps the JSON object exactly as received so the sidecar can be
/// a verbatim copy; only `id` is validated on deserialization and the other
/// fields are read on demand.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct BookRecord {
    id: u64,
    raw: Map<String, Value>,
}

impl BookRecord {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Empty when the title is missing or not a string.
    pub fn title(&self) -> &str {
        self.raw
            .get("title")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
    }

    pub fn first_author(&self) -> Option<&str> {
        self.raw
            .get("authors")
            .and_then(|value| value.as_array())
            .and_then(|authors| authors.first())
            .and_then(|author| author.get("name"))
            .and_then(|name| name.as_str())
    }

    /// Content type to URL pairs, in the order the API listed them.
    pub fn formats(&self) -> Vec<(&str, &str)> {
        self.raw
            .get("formats")
            .and_then(|value| value.as_object())
            .map(|formats| {
                formats
                    .iter()
                    .filter_map(|(mime, url)| url.as_str().map(|url| (mime.as_str(), url)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl TryFrom<Map<String, Value>> for BookRecord {
    type Error = GutenError;

    fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = raw
            .get("id")
            .and_then(|value| value.as_u64())
            .ok_or_else(|| GutenError::InvalidRecord("missing integer `id`".to_string()))?;
        Ok(Self { id, raw })
    }
}

impl Serialize for BookRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}
