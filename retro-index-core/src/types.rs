//! Data model types for the media index.
//!
//! Catalog rows mirror the persistent tables one-to-one. A `dbid` of 0
//! means "not yet assigned"; the store assigns ids on insert unless the
//! caller supplies them (bulk reloads).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::slug::slug_metadata;
use crate::system::MediaType;

// ── Catalog rows ────────────────────────────────────────────────────────────

/// An indexed system (platform).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct System {
    pub dbid: i64,
    pub system_id: String,
    pub name: String,
}

/// A normalized title within one system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaTitle {
    pub dbid: i64,
    pub system_dbid: i64,
    pub slug: String,
    pub secondary_slug: Option<String>,
    pub name: String,
    pub slug_length: i64,
    pub slug_word_count: i64,
}

impl MediaTitle {
    /// Build a title row with all slug columns derived from `name`.
    pub fn from_name(system_dbid: i64, media_type: MediaType, name: &str) -> Self {
        let meta = slug_metadata(media_type, name);
        Self {
            dbid: 0,
            system_dbid,
            slug: meta.slug,
            secondary_slug: meta.secondary_slug,
            name: name.to_string(),
            slug_length: meta.slug_length,
            slug_word_count: meta.slug_word_count,
        }
    }
}

/// A concrete file belonging to a title. `system_dbid` duplicates the
/// title's system and must always agree with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Media {
    pub dbid: i64,
    pub media_title_dbid: i64,
    pub system_dbid: i64,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagType {
    pub dbid: i64,
    pub tag_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub dbid: i64,
    pub type_dbid: i64,
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaTag {
    pub dbid: i64,
    pub media_dbid: i64,
    pub tag_dbid: i64,
}

// ── Tag filters ─────────────────────────────────────────────────────────────

/// How a tag filter combines with the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagOperator {
    /// Media must carry the tag.
    #[default]
    And,
    /// Media must not carry the tag.
    Not,
    /// Media must carry at least one of the OR tags.
    Or,
}

/// A `type:value` tag constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagFilter {
    #[serde(rename = "type")]
    pub tag_type: String,
    pub value: String,
    pub operator: TagOperator,
}

impl TagFilter {
    pub fn new(tag_type: impl Into<String>, value: impl Into<String>, operator: TagOperator) -> Self {
        Self {
            tag_type: tag_type.into(),
            value: value.into(),
            operator,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid tag filter: '{0}' (expected [-|~]type:value)")]
pub struct TagFilterParseError(pub String);

impl std::str::FromStr for TagFilter {
    type Err = TagFilterParseError;

    /// Parse `type:value`, with a leading `-` for NOT and `~` for OR.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (operator, rest) = match trimmed.chars().next() {
            Some('-') => (TagOperator::Not, &trimmed[1..]),
            Some('~') => (TagOperator::Or, &trimmed[1..]),
            _ => (TagOperator::And, trimmed),
        };
        let (tag_type, value) = rest
            .split_once(':')
            .ok_or_else(|| TagFilterParseError(s.to_string()))?;
        let (tag_type, value) = (tag_type.trim(), value.trim());
        if tag_type.is_empty() || value.is_empty() {
            return Err(TagFilterParseError(s.to_string()));
        }
        Ok(Self::new(tag_type.to_lowercase(), value.to_lowercase(), operator))
    }
}

// ── Queries ─────────────────────────────────────────────────────────────────

/// Filter used for random selection and its cached statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaQuery {
    pub systems: Vec<String>,
    #[serde(default)]
    pub path_glob: String,
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub tags: Vec<TagFilter>,
}

/// Parameters for a cursor-paginated search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub systems: Vec<String>,
    pub query: String,
    pub tags: Vec<TagFilter>,
    /// First letter of the title name: `A`-`Z`, `0-9` or `#` for symbols.
    pub letter: Option<String>,
    /// Return only media with an id greater than this.
    pub cursor: Option<i64>,
    pub limit: usize,
}

// ── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    #[serde(rename = "type")]
    pub tag_type: String,
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub system_id: String,
    pub name: String,
    pub path: String,
}

/// A search hit carrying its media id (the pagination cursor) and tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResultWithCursor {
    pub system_id: String,
    pub name: String,
    pub path: String,
    pub media_id: i64,
    pub tags: Vec<TagInfo>,
    pub year: Option<String>,
}
