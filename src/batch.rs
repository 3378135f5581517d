//! Batch manifests: a set of fragments plus the invocations to run on them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::{CollectionDraft, CollectionId};
use crate::service::CollectionService;
use crate::types::{InvocationRequest, InvocationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Fragment sources, in the order they are concatenated
    pub fragments: Vec<String>,
    #[serde(default)]
    pub invocations: Vec<InvocationRequest>,
}

impl BatchManifest {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest from {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse manifest JSON")
    }
}

/// One line of batch output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchLine {
    Result(InvocationResult),
    Rejected { error: String },
}

impl BatchLine {
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Result(result) if result.is_value())
    }
}

/// Store the manifest's fragments as a new collection
pub async fn load_collection(
    service: &CollectionService,
    manifest: &BatchManifest,
) -> Result<CollectionId> {
    let collection = service
        .create_collection(CollectionDraft {
            title: manifest.title.clone(),
            description: manifest.description.clone(),
        })
        .await
        .context("Failed to create collection")?;

    for (index, source) in manifest.fragments.iter().enumerate() {
        service
            .add_fragment(collection.id, source.clone())
            .await
            .with_context(|| format!("Failed to add fragment #{}", index + 1))?;
    }

    Ok(collection.id)
}

/// Run every invocation of `manifest` concurrently.
///
/// Lines come back in manifest order regardless of completion order.
pub async fn run_batch(
    service: &CollectionService,
    manifest: &BatchManifest,
) -> Result<Vec<BatchLine>> {
    let collection_id = load_collection(service, manifest).await?;
    tracing::info!(
        collection = %collection_id,
        fragments = manifest.fragments.len(),
        invocations = manifest.invocations.len(),
        "Running batch"
    );

    let handles: Vec<_> = manifest
        .invocations
        .iter()
        .cloned()
        .map(|request| {
            let service = service.clone();
            tokio::spawn(async move { service.execute(collection_id, &request).await })
        })
        .collect();

    let mut lines = Vec::with_capacity(handles.len());
    for handle in handles {
        let line = match handle.await.context("Invocation task failed")? {
            Ok(result) => BatchLine::Result(result),
            Err(e) if e.is_client_error() => BatchLine::Rejected {
                error: e.to_string(),
            },
            Err(e) => return Err(e.into()),
        };
        lines.push(line);
    }

    Ok(lines)
}
