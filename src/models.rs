//! Collection and fragment records.
//!
//! Identities are UUIDv7, so ascending id order is creation order. The engine
//! only ever sees owned snapshots of these records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a collection ("environment")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub Uuid);

/// Identity of a code fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub Uuid);

impl CollectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl FragmentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for FragmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Named set of code fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(title: Option<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CollectionId::new(),
            title,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One stored unit of source code owned by exactly one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeFragment {
    pub id: FragmentId,
    pub collection_id: CollectionId,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CodeFragment {
    pub fn new(collection_id: CollectionId, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: FragmentId::new(),
            collection_id,
            source: source.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update of a collection.
///
/// `None` leaves a field as it is and `Some(None)` clears it. In JSON an
/// absent key is `None` and an explicit `null` is `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionUpdate {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

/// Marks a key that appears in the input, even as `null`
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// One page of a listing, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page(pub usize);

impl Page {
    pub const FIRST: Page = Page(1);

    /// Number of records to skip for a page of `per_page` records
    pub fn offset(self, per_page: usize) -> usize {
        self.0.saturating_sub(1).saturating_mul(per_page)
    }
}
