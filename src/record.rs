use serde::{Deserialize, Serialize};

/// A document as served by the remote collection and stored in the cache.
///
/// Field names follow the remote wire format (`parentId`, `createdAt`,
/// `updatedAt`). Timestamps are carried as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl DocumentRecord {
    /// Build a record with empty hierarchy and timestamp fields.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            parent_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}

/// A search result after post-filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultItem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub score: f32,
    pub title_match: bool,
    pub content_match: bool,
    pub matched_terms: Vec<String>,
}

/// Snapshot of the engine state shown to users ("N documents indexed").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub initialized: bool,
    pub document_count: u64,
}
