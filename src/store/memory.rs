//! In-memory storage backend and task store.
//!
//! [`InMemoryBackend`] is a thread-safe [`StorageBackend`] over a
//! `DashMap<String, Vec<u8>>`. [`InMemoryTaskStore`] wraps
//! [`GenericTaskStore<InMemoryBackend>`](GenericTaskStore) with a
//! zero-argument constructor for tests and local runs.
//!
//! # Examples
//!
//! ```
//! use geoprocessing::store::memory::InMemoryTaskStore;
//! use geoprocessing::store::TaskStore;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = InMemoryTaskStore::new();
//! let task = store.create("svc", Some("k1"), "req-1", None, None).await.unwrap();
//! assert_eq!(store.get("svc", "k1").await.unwrap(), Some(task));
//! # });
//! ```

use std::error::Error as StdError;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::TaskError;
use crate::store::backend::{StorageBackend, StorageError};
use crate::store::generic::GenericTaskStore;
use crate::types::task::Task;

use super::TaskStore;

// ---- InMemoryBackend: dumb KV store using DashMap ----

/// Thread-safe in-memory storage backend using [`DashMap`].
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: DashMap<String, Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Returns the number of records stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the backend contains no records.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.data
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

// ---- InMemoryTaskStore: thin wrapper around GenericTaskStore ----

/// In-memory task store.
#[derive(Debug)]
pub struct InMemoryTaskStore {
    inner: GenericTaskStore<InMemoryBackend>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: GenericTaskStore::new(InMemoryBackend::new()),
        }
    }

    /// Number of stored task records.
    pub fn len(&self) -> usize {
        self.inner.backend().len()
    }

    /// Returns `true` if no task has been written.
    pub fn is_empty(&self) -> bool {
        self.inner.backend().is_empty()
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, service: &str, task_id: &str) -> Result<Option<Task>, TaskError> {
        self.inner.get(service, task_id).await
    }

    async fn create(
        &self,
        service: &str,
        cache_key: Option<&str>,
        request_id: &str,
        wss: Option<String>,
        geometry_uri: Option<String>,
    ) -> Result<Task, TaskError> {
        self.inner
            .create(service, cache_key, request_id, wss, geometry_uri)
            .await
    }

    async fn complete(&self, task: Task, result: Value) -> Result<Task, TaskError> {
        self.inner.complete(task, result).await
    }

    async fn fail(
        &self,
        task: Task,
        message: String,
        cause: Option<&(dyn StdError + Send + Sync + 'static)>,
    ) -> Result<Task, TaskError> {
        self.inner.fail(task, message, cause).await
    }
}
