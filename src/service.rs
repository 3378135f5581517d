//! Collection management and execution on top of a [`FragmentStore`].

use std::sync::Arc;

use chrono::Utc;

use crate::engine::ExecutionEngine;
use crate::error::{PyDslError, Result};
use crate::models::{
    CodeFragment, Collection, CollectionDraft, CollectionId, CollectionUpdate, FragmentId, Page,
};
use crate::store::FragmentStore;
use crate::types::{InvocationRequest, InvocationResult};

pub const COLLECTIONS_PER_PAGE: usize = 20;
pub const FRAGMENTS_PER_PAGE: usize = 20;

pub const MAX_TITLE_CHARS: usize = 32;
pub const MAX_DESCRIPTION_CHARS: usize = 128;

#[derive(Clone)]
pub struct CollectionService {
    store: Arc<dyn FragmentStore>,
    engine: ExecutionEngine,
}

impl CollectionService {
    pub fn new(store: Arc<dyn FragmentStore>, engine: ExecutionEngine) -> Self {
        Self { store, engine }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub async fn create_collection(&self, draft: CollectionDraft) -> Result<Collection> {
        validate_title(draft.title.as_deref())?;
        validate_description(draft.description.as_deref())?;

        let collection = self
            .store
            .create_collection(Collection::new(draft.title, draft.description))
            .await?;
        tracing::info!(collection = %collection.id, "Created collection");
        Ok(collection)
    }

    pub async fn get_collection(&self, id: CollectionId) -> Result<Collection> {
        self.store
            .get_collection(id)
            .await?
            .ok_or(PyDslError::CollectionNotFound(id))
    }

    pub async fn list_collections(&self, page: Page) -> Result<Vec<Collection>> {
        validate_page(page)?;
        self.store
            .list_collections(page.offset(COLLECTIONS_PER_PAGE), COLLECTIONS_PER_PAGE)
            .await
    }

    /// Apply the fields set in `update`; the rest keep their values
    pub async fn update_collection(
        &self,
        id: CollectionId,
        update: CollectionUpdate,
    ) -> Result<Collection> {
        validate_title(update.title.as_ref().and_then(|t| t.as_deref()))?;
        validate_description(update.description.as_ref().and_then(|d| d.as_deref()))?;

        let mut collection = self.get_collection(id).await?;
        if let Some(title) = update.title {
            collection.title = title;
        }
        if let Some(description) = update.description {
            collection.description = description;
        }
        collection.updated_at = Utc::now();

        self.store.update_collection(collection).await
    }

    pub async fn delete_collection(&self, id: CollectionId) -> Result<()> {
        self.store.delete_collection(id).await?;
        tracing::info!(collection = %id, "Deleted collection");
        Ok(())
    }

    pub async fn add_fragment(
        &self,
        collection_id: CollectionId,
        source: impl Into<String>,
    ) -> Result<CodeFragment> {
        let source = source.into();
        validate_source(&source)?;
        self.get_collection(collection_id).await?;

        self.store
            .create_fragment(CodeFragment::new(collection_id, source))
            .await
    }

    /// Fetch a fragment, which must belong to `collection_id`
    pub async fn get_fragment(
        &self,
        collection_id: CollectionId,
        id: FragmentId,
    ) -> Result<CodeFragment> {
        match self.store.get_fragment(id).await? {
            Some(fragment) if fragment.collection_id == collection_id => Ok(fragment),
            _ => Err(PyDslError::FragmentNotFound(id)),
        }
    }

    pub async fn list_fragments(
        &self,
        collection_id: CollectionId,
        page: Page,
    ) -> Result<Vec<CodeFragment>> {
        validate_page(page)?;
        self.get_collection(collection_id).await?;
        self.store
            .list_fragments(
                collection_id,
                page.offset(FRAGMENTS_PER_PAGE),
                FRAGMENTS_PER_PAGE,
            )
            .await
    }

    pub async fn update_fragment(
        &self,
        collection_id: CollectionId,
        id: FragmentId,
        source: impl Into<String>,
    ) -> Result<CodeFragment> {
        let source = source.into();
        validate_source(&source)?;

        let mut fragment = self.get_fragment(collection_id, id).await?;
        fragment.source = source;
        fragment.updated_at = Utc::now();
        self.store.update_fragment(fragment).await
    }

    pub async fn delete_fragment(&self, collection_id: CollectionId, id: FragmentId) -> Result<()> {
        self.get_fragment(collection_id, id).await?;
        self.store.delete_fragment(id).await
    }

    /// Run `request` against a snapshot of the collection's fragments
    pub async fn execute(
        &self,
        collection_id: CollectionId,
        request: &InvocationRequest,
    ) -> Result<InvocationResult> {
        self.get_collection(collection_id).await?;
        let fragments = self.store.load_fragments(collection_id).await?;
        self.engine.execute(&fragments, request).await
    }
}

fn validate_title(title: Option<&str>) -> Result<()> {
    match title {
        Some(title) if title.chars().count() > MAX_TITLE_CHARS => Err(PyDslError::validation(
            format!("title must be at most {} characters", MAX_TITLE_CHARS),
        )),
        _ => Ok(()),
    }
}

fn validate_description(description: Option<&str>) -> Result<()> {
    match description {
        Some(text) if text.chars().count() > MAX_DESCRIPTION_CHARS => {
            Err(PyDslError::validation(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_CHARS
            )))
        }
        _ => Ok(()),
    }
}

fn validate_source(source: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(PyDslError::validation("fragment source cannot be empty"));
    }
    Ok(())
}

fn validate_page(page: Page) -> Result<()> {
    if page.0 == 0 {
        return Err(PyDslError::validation("page numbers start at 1"));
    }
    Ok(())
}
