//! Task store trait, generic implementation, and storage backends.
//!
//! # Architecture
//!
//! The task storage system has three layers:
//!
//! 1. **[`TaskStore`]** -- A type-erasure interface for use with
//!    `Arc<dyn TaskStore>` in the
//!    [`GeoprocessingHandler`](crate::handler::GeoprocessingHandler).
//!
//! 2. **[`GenericTaskStore<B>`](generic::GenericTaskStore)** -- All domain
//!    logic (state machine, timestamps, canonical serialization). Has a
//!    blanket `TaskStore` impl.
//!
//! 3. **[`StorageBackend`]** -- Dumb KV trait that backends implement
//!    (in-memory, DynamoDB). No domain logic.
//!
//! # Backends
//!
//! - [`InMemoryBackend`](crate::store::memory::InMemoryBackend) -- Thread-safe
//!   in-memory backend using `DashMap`.
//! - [`DynamoDbBackend`](crate::store::dynamodb::DynamoDbBackend) -- DynamoDB
//!   backend for Lambda deployments. Available behind the `dynamodb` feature.
//!
//! # Failure Policy
//!
//! Store operations are single attempts. Backend failures surface as
//! [`TaskError::Store`] and are never retried here, since a retried write
//! after an ambiguous timeout could repeat side effects.

pub mod backend;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod generic;
pub mod memory;

use std::error::Error as StdError;

use async_trait::async_trait;
use serde_json::Value;

pub use backend::{StorageBackend, StorageError};
pub use generic::GenericTaskStore;
pub use memory::{InMemoryBackend, InMemoryTaskStore};

use crate::error::TaskError;
use crate::types::task::Task;

/// Type-erasure interface for task storage.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the handler shares one store
/// across every invocation its process serves.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Reads the task for `(service, task_id)`. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    /// - [`TaskError::Serialization`] if the stored record is corrupt.
    async fn get(&self, service: &str, task_id: &str) -> Result<Option<Task>, TaskError>;

    /// Writes a new `Pending` task.
    ///
    /// The id is `cache_key` when given, otherwise a generated UUID. An
    /// existing record with the same key is overwritten.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    async fn create(
        &self,
        service: &str,
        cache_key: Option<&str>,
        request_id: &str,
        wss: Option<String>,
        geometry_uri: Option<String>,
    ) -> Result<Task, TaskError>;

    /// Transitions `task` to `Completed`, storing `result`.
    ///
    /// # Errors
    ///
    /// - [`TaskError::InvalidTransition`] if `task` is already terminal.
    /// - [`TaskError::Store`] on backend failures.
    async fn complete(&self, task: Task, result: Value) -> Result<Task, TaskError>;

    /// Transitions `task` to `Failed` with `message`.
    ///
    /// # Errors
    ///
    /// - [`TaskError::InvalidTransition`] if `task` is already terminal.
    /// - [`TaskError::Store`] on backend failures.
    async fn fail(
        &self,
        task: Task,
        message: String,
        cause: Option<&(dyn StdError + Send + Sync + 'static)>,
    ) -> Result<Task, TaskError>;
}

// ---- Blanket impl for GenericTaskStore<B> ----

#[async_trait]
impl<B: StorageBackend + 'static> TaskStore for GenericTaskStore<B> {
    async fn get(&self, service: &str, task_id: &str) -> Result<Option<Task>, TaskError> {
        self.get(service, task_id).await
    }

    async fn create(
        &self,
        service: &str,
        cache_key: Option<&str>,
        request_id: &str,
        wss: Option<String>,
        geometry_uri: Option<String>,
    ) -> Result<Task, TaskError> {
        self.create(service, cache_key, request_id, wss, geometry_uri)
            .await
    }

    async fn complete(&self, task: Task, result: Value) -> Result<Task, TaskError> {
        self.complete(task, result).await
    }

    async fn fail(
        &self,
        task: Task,
        message: String,
        cause: Option<&(dyn StdError + Send + Sync + 'static)>,
    ) -> Result<Task, TaskError> {
        self.fail(task, message, cause).await
    }
}
