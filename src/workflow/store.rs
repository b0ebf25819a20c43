//! Checkpoint persistence.
//!
//! Orchestrators never talk to storage directly; they are handed a
//! `CheckpointStore` at construction. The store only has to provide atomic
//! single-key overwrite; the orchestrator owning a workflow id serializes
//! its own writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::{WorkflowCheckpoint, WorkflowId};

/// Key → checkpoint storage keyed by workflow id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint, replacing any previous one for the workflow.
    async fn save(&self, workflow_id: &WorkflowId, checkpoint: &WorkflowCheckpoint) -> Result<()>;

    /// Load the latest checkpoint for a workflow, if any.
    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowCheckpoint>>;

    /// Remove a workflow's checkpoint. Removing a missing one is not an error.
    async fn delete(&self, workflow_id: &WorkflowId) -> Result<()>;

    /// Ids of every workflow with a stored checkpoint.
    async fn list(&self) -> Result<Vec<WorkflowId>>;
}

/// A checkpoint may only be stored under its own workflow id.
fn check_key(workflow_id: &WorkflowId, checkpoint: &WorkflowCheckpoint) -> Result<()> {
    if &checkpoint.workflow_id != workflow_id {
        return Err(Error::Checkpoint(format!(
            "checkpoint for {} saved under {}",
            checkpoint.workflow_id, workflow_id
        )));
    }
    Ok(())
}

/// Process-local store, mostly for tests and short-lived runs.
///
/// Cloning yields another handle onto the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    inner: Arc<RwLock<HashMap<WorkflowId, WorkflowCheckpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, workflow_id: &WorkflowId, checkpoint: &WorkflowCheckpoint) -> Result<()> {
        check_key(workflow_id, checkpoint)?;
        self.inner
            .write()
            .await
            .insert(*workflow_id, checkpoint.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowCheckpoint>> {
        Ok(self.inner.read().await.get(workflow_id).cloned())
    }

    async fn delete(&self, workflow_id: &WorkflowId) -> Result<()> {
        self.inner.write().await.remove(workflow_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowId>> {
        let mut ids: Vec<WorkflowId> = self.inner.read().await.keys().copied().collect();
        ids.sort_by_key(|id| id.0);
        Ok(ids)
    }
}

/// One pretty-printed JSON file per workflow under a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the configured checkpoint directory.
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Ok(Self::new(config.checkpoint_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, workflow_id: &WorkflowId) -> PathBuf {
        self.dir.join(format!("{}.json", workflow_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, workflow_id: &WorkflowId, checkpoint: &WorkflowCheckpoint) -> Result<()> {
        check_key(workflow_id, checkpoint)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(workflow_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(checkpoint)?;

        // Write-then-rename keeps a reader from ever seeing a torn file.
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::trace!(workflow = %workflow_id.short(), path = %path.display(), "checkpoint written");
        Ok(())
    }

    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowCheckpoint>> {
        let path = self.path_for(workflow_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, workflow_id: &WorkflowId) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(workflow_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<WorkflowId>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<WorkflowId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_by_key(|id| id.0);
        Ok(ids)
    }
}
