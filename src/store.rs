//! Storage of collections and their code fragments.
//!
//! The store is a plain record keeper: validation and timestamps belong to
//! [`crate::service::CollectionService`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{PyDslError, Result};
use crate::models::{CodeFragment, Collection, CollectionId, FragmentId};

/// Persistence seam for collections and fragments.
///
/// Listings are ordered by ascending id. `offset`/`limit` paging is applied
/// after ordering.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    async fn create_collection(&self, collection: Collection) -> Result<Collection>;

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>>;

    async fn list_collections(&self, offset: usize, limit: usize) -> Result<Vec<Collection>>;

    /// Replace a stored collection; `CollectionNotFound` if it does not exist
    async fn update_collection(&self, collection: Collection) -> Result<Collection>;

    /// Remove a collection together with all of its fragments
    async fn delete_collection(&self, id: CollectionId) -> Result<()>;

    /// Add a fragment; its collection must exist
    async fn create_fragment(&self, fragment: CodeFragment) -> Result<CodeFragment>;

    async fn get_fragment(&self, id: FragmentId) -> Result<Option<CodeFragment>>;

    async fn list_fragments(
        &self,
        collection_id: CollectionId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CodeFragment>>;

    async fn update_fragment(&self, fragment: CodeFragment) -> Result<CodeFragment>;

    async fn delete_fragment(&self, id: FragmentId) -> Result<()>;

    /// Every fragment of a collection, unpaged. Empty for an unknown
    /// collection.
    async fn load_fragments(&self, collection_id: CollectionId) -> Result<Vec<CodeFragment>>;
}

#[derive(Debug, Default)]
struct Tables {
    collections: BTreeMap<CollectionId, Collection>,
    fragments: BTreeMap<FragmentId, CodeFragment>,
}

impl Tables {
    fn fragments_of(&self, collection_id: CollectionId) -> impl Iterator<Item = &CodeFragment> {
        self.fragments
            .values()
            .filter(move |fragment| fragment.collection_id == collection_id)
    }
}

/// Store kept entirely in memory; contents vanish with the process
#[derive(Debug, Default)]
pub struct InMemoryFragmentStore {
    tables: RwLock<Tables>,
}

impl InMemoryFragmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FragmentStore for InMemoryFragmentStore {
    async fn create_collection(&self, collection: Collection) -> Result<Collection> {
        let mut tables = self.tables.write();
        if tables.collections.contains_key(&collection.id) {
            return Err(PyDslError::validation(format!(
                "collection {} already exists",
                collection.id
            )));
        }
        tables.collections.insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        Ok(self.tables.read().collections.get(&id).cloned())
    }

    async fn list_collections(&self, offset: usize, limit: usize) -> Result<Vec<Collection>> {
        let tables = self.tables.read();
        Ok(tables
            .collections
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_collection(&self, collection: Collection) -> Result<Collection> {
        let mut tables = self.tables.write();
        let Some(stored) = tables.collections.get_mut(&collection.id) else {
            return Err(PyDslError::CollectionNotFound(collection.id));
        };
        *stored = collection.clone();
        Ok(collection)
    }

    async fn delete_collection(&self, id: CollectionId) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.collections.remove(&id).is_none() {
            return Err(PyDslError::CollectionNotFound(id));
        }
        tables
            .fragments
            .retain(|_, fragment| fragment.collection_id != id);
        Ok(())
    }

    async fn create_fragment(&self, fragment: CodeFragment) -> Result<CodeFragment> {
        let mut tables = self.tables.write();
        if !tables.collections.contains_key(&fragment.collection_id) {
            return Err(PyDslError::CollectionNotFound(fragment.collection_id));
        }
        if tables.fragments.contains_key(&fragment.id) {
            return Err(PyDslError::validation(format!(
                "fragment {} already exists",
                fragment.id
            )));
        }
        tables.fragments.insert(fragment.id, fragment.clone());
        Ok(fragment)
    }

    async fn get_fragment(&self, id: FragmentId) -> Result<Option<CodeFragment>> {
        Ok(self.tables.read().fragments.get(&id).cloned())
    }

    async fn list_fragments(
        &self,
        collection_id: CollectionId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CodeFragment>> {
        let tables = self.tables.read();
        Ok(tables
            .fragments_of(collection_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_fragment(&self, fragment: CodeFragment) -> Result<CodeFragment> {
        let mut tables = self.tables.write();
        let Some(stored) = tables.fragments.get_mut(&fragment.id) else {
            return Err(PyDslError::FragmentNotFound(fragment.id));
        };
        if stored.collection_id != fragment.collection_id {
            return Err(PyDslError::validation(
                "a fragment cannot move to another collection",
            ));
        }
        *stored = fragment.clone();
        Ok(fragment)
    }

    async fn delete_fragment(&self, id: FragmentId) -> Result<()> {
        if self.tables.write().fragments.remove(&id).is_none() {
            return Err(PyDslError::FragmentNotFound(id));
        }
        Ok(())
    }

    async fn load_fragments(&self, collection_id: CollectionId) -> Result<Vec<CodeFragment>> {
        let tables = self.tables.read();
        Ok(tables.fragments_of(collection_id).cloned().collect())
    }
}
