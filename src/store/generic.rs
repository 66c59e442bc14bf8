//! Generic task store with all domain logic delegating to a [`StorageBackend`].
//!
//! [`GenericTaskStore`] implements the task operations (create, read,
//! terminal transitions, canonical JSON serialization) on top of any
//! [`StorageBackend`]. Backends remain dumb key-value stores.
//!
//! # Write Semantics
//!
//! Every write is an unconditional `put`: last write wins per key.
//! Transitions are validated against the task the caller holds, not a
//! fresh read, so two invocations racing on one cache key each finish
//! their own task and the later write becomes the cached value.

use std::error::Error as StdError;

use serde_json::Value;

use crate::error::TaskError;
use crate::store::backend::{make_key, StorageBackend, StorageError};
use crate::types::task::Task;

/// Generic task store that delegates all storage to a [`StorageBackend`].
///
/// # Type Parameters
///
/// * `B` - A [`StorageBackend`] implementation (in-memory, `DynamoDB`).
#[derive(Debug)]
pub struct GenericTaskStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> GenericTaskStore<B> {
    /// Creates a store backed by `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn serialize_task(task: &Task) -> Result<Vec<u8>, TaskError> {
        serde_json::to_vec(task).map_err(|source| TaskError::Serialization {
            task_id: task.id.clone(),
            source,
        })
    }

    fn deserialize_task(task_id: &str, data: &[u8]) -> Result<Task, TaskError> {
        serde_json::from_slice(data).map_err(|source| TaskError::Serialization {
            task_id: task_id.to_string(),
            source,
        })
    }

    async fn write(&self, task: &Task) -> Result<(), TaskError> {
        let key = make_key(&task.service, &task.id);
        let bytes = Self::serialize_task(task)?;
        self.backend.put(&key, &bytes).await?;
        Ok(())
    }

    /// Reads the task stored for `(service, task_id)`.
    ///
    /// Returns `Ok(None)` when no record exists, or when the stored record
    /// belongs to a different `(service, id)` pair.
    pub async fn get(&self, service: &str, task_id: &str) -> Result<Option<Task>, TaskError> {
        let key = make_key(service, task_id);
        let task = match self.backend.get(&key).await {
            Ok(data) => Self::deserialize_task(task_id, &data)?,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if task.service != service || task.id != task_id {
            tracing::warn!(
                service = service,
                task_id = task_id,
                stored_service = %task.service,
                stored_task_id = %task.id,
                "ignoring task stored under a mismatched key"
            );
            return Ok(None);
        }
        Ok(Some(task))
    }

    /// Writes a new `Pending` task, superseding any record with the same key.
    pub async fn create(
        &self,
        service: &str,
        cache_key: Option<&str>,
        request_id: &str,
        wss: Option<String>,
        geometry_uri: Option<String>,
    ) -> Result<Task, TaskError> {
        let task = Task::new(service, cache_key, request_id, wss, geometry_uri);
        self.write(&task).await?;
        tracing::debug!(
            service = service,
            task_id = %task.id,
            request_id = request_id,
            "created pending task"
        );
        Ok(task)
    }

    /// Transitions `task` to `Completed` with `result` and persists it.
    pub async fn complete(&self, mut task: Task, result: Value) -> Result<Task, TaskError> {
        task.mark_completed(result)?;
        self.write(&task).await?;
        tracing::info!(
            service = %task.service,
            task_id = %task.id,
            duration_ms = task.duration,
            "task completed"
        );
        Ok(task)
    }

    /// Transitions `task` to `Failed` with `message` and persists it.
    ///
    /// `cause` is logged for diagnostics but not stored on the record.
    pub async fn fail(
        &self,
        mut task: Task,
        message: String,
        cause: Option<&(dyn StdError + Send + Sync + 'static)>,
    ) -> Result<Task, TaskError> {
        task.mark_failed(message)?;
        self.write(&task).await?;
        match cause {
            Some(cause) => tracing::error!(
                service = %task.service,
                task_id = %task.id,
                error = task.error.as_deref().unwrap_or_default(),
                cause = %cause,
                "task failed"
            ),
            None => tracing::error!(
                service = %task.service,
                task_id = %task.id,
                error = task.error.as_deref().unwrap_or_default(),
                "task failed"
            ),
        }
        Ok(task)
    }

    /// Returns a reference to the underlying storage backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}
