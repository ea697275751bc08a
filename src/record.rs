//! Records, collections and work units.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity;

/// Enrichment field holding the resolved target of a redirect link.
pub const DECODED_URL_FIELD: &str = "decoded_url";

/// Enrichment field holding extracted full text.
pub const CONTENT_FIELD: &str = "content";

/// A record as returned by a source, before identity assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Canonical locator (usually a URL); records without one are rejected.
    pub locator: Option<String>,
    /// Source-specific attributes.
    pub payload: Value,
}

impl RawRecord {
    pub fn new(locator: impl Into<String>, payload: Value) -> Self {
        Self {
            locator: Some(locator.into()),
            payload,
        }
    }

    /// Assign an identity, or `None` if the locator is missing or unusable.
    pub fn identify(self) -> Option<NewRecord> {
        let locator = self.locator?;
        let identity = identity::identity(&locator)?;
        let mut payload = match self.payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        payload
            .entry("url".to_string())
            .or_insert_with(|| Value::String(locator.clone()));
        Some(NewRecord {
            identity,
            payload: Value::Object(payload),
        })
    }
}

/// A record ready for the store: identity plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub identity: String,
    pub payload: Value,
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identity: String,
    pub payload: Value,
    /// Fields added by enrichment passes; empty until one succeeds.
    #[serde(default)]
    pub enrichment: Map<String, Value>,
    pub ingested_at: DateTime<Utc>,
}

impl Record {
    /// The locator recorded at ingestion time.
    pub fn url(&self) -> Option<&str> {
        self.payload.get("url").and_then(Value::as_str)
    }

    pub fn enrichment_str(&self, field: &str) -> Option<&str> {
        self.enrichment
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn has_enrichment(&self, field: &str) -> bool {
        self.enrichment_str(field).is_some()
    }
}

/// Set enrichment fields on the record with this identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub identity: String,
    pub fields: Map<String, Value>,
}

impl FieldUpdate {
    pub fn single(identity: impl Into<String>, field: &str, value: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(field.to_string(), value.into());
        Self {
            identity: identity.into(),
            fields,
        }
    }
}

/// Deterministic collection name `{source}_{key}`.
///
/// Downstream tools discover data through this convention, so it must not
/// change between releases.
pub fn collection_name(source: &str, key: &str) -> String {
    let key = key.trim().trim_start_matches('@');
    let key: String = key
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '.' || c == '$' {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("{}_{}", source, key)
}

/// A half-open date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// What a single page fetch covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A cursor-driven listing, optionally bounded by a date window.
    Cursor {
        window: Option<DateWindow>,
        cursor: Option<String>,
    },
    /// One independent date chunk.
    Chunk(DateWindow),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Cursor { cursor: None, .. } => write!(f, "first page"),
            Scope::Cursor {
                cursor: Some(c), ..
            } => write!(f, "cursor {}", c),
            Scope::Chunk(w) => write!(f, "{}", w),
        }
    }
}

/// One page of results from a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    /// Opaque continuation token; `None` ends a cursor listing.
    pub next: Option<String>,
}

impl Page {
    pub fn last(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            next: None,
        }
    }

    pub fn with_next(records: Vec<RawRecord>, next: impl Into<String>) -> Self {
        Self {
            records,
            next: Some(next.into()),
        }
    }
}
