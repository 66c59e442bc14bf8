//! Low-level key-value storage backend trait and supporting types.
//!
//! The [`StorageBackend`] trait defines the contract that storage engines
//! implement: [`get`](StorageBackend::get) and [`put`](StorageBackend::put).
//! Tasks are never deleted.
//!
//! Domain logic (state machine validation, timestamps, serialization) does
//! **not** belong here. Backends are dumb KV stores; domain logic lives in
//! `GenericTaskStore`.
//!
//! # Key Structure
//!
//! Keys are composite strings in the format `{service}:{task_id}`. The
//! service part is escaped (`%` as `%25`, `:` as `%3A`) so it never holds a
//! colon; task ids (cache keys) may, so keys are split on the first colon
//! only. `("area:zonal", "k")` and `("area", "zonal:k")` therefore map to
//! different keys.
//!
//! # Write Semantics
//!
//! `put` is unconditional: the last write for a key wins. Concurrent cache
//! misses for the same key may both compute and both write.

use std::fmt;

use async_trait::async_trait;

/// Errors that can occur during raw storage operations.
///
/// # Examples
///
/// ```
/// use geoprocessing::store::backend::StorageError;
///
/// let err = StorageError::NotFound { key: "area:k1".to_string() };
/// assert!(err.to_string().contains("area:k1"));
/// ```
#[derive(Debug)]
pub enum StorageError {
    /// The requested key was not found in storage.
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// A key did not have the `{service}:{task_id}` shape.
    InvalidKey {
        /// The offending key.
        key: String,
    },

    /// An I/O or backend-specific error occurred (network failure,
    /// throttling, timeout).
    Backend {
        /// Human-readable description of the error.
        message: String,
        /// The underlying error, if available. Accessible via
        /// [`std::error::Error::source()`].
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "key not found: {key}"),
            Self::InvalidKey { key } => write!(f, "invalid key format: {key}"),
            Self::Backend { message, .. } => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

/// Key-value storage backend for task persistence.
///
/// Implementations must be `Send + Sync`; one backend is shared by every
/// invocation a process handles.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves the serialized record stored under `key`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record exists for the given key.
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Stores a record unconditionally (create or overwrite).
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

/// Constructs a storage key from service and task identifiers.
///
/// # Examples
///
/// ```
/// use geoprocessing::store::backend::make_key;
///
/// assert_eq!(make_key("area", "k1"), "area:k1");
/// assert_eq!(make_key("area:zonal", "k"), "area%3Azonal:k");
/// assert_ne!(make_key("area:zonal", "k"), make_key("area", "zonal:k"));
/// ```
pub fn make_key(service: &str, task_id: &str) -> String {
    format!("{}:{task_id}", escape_service(service))
}

/// Parses a storage key into `(service, task_id)`, splitting on the first
/// colon and unescaping the service.
///
/// # Examples
///
/// ```
/// use geoprocessing::store::backend::parse_key;
///
/// assert_eq!(parse_key("area:k1"), Some(("area".to_string(), "k1")));
/// assert_eq!(parse_key("area:a:b"), Some(("area".to_string(), "a:b")));
/// assert_eq!(parse_key("area%3Azonal:k"), Some(("area:zonal".to_string(), "k")));
/// assert_eq!(parse_key("no-colon"), None);
/// ```
pub fn parse_key(key: &str) -> Option<(String, &str)> {
    let (service, task_id) = key.split_once(':')?;
    Some((unescape_service(service), task_id))
}

fn escape_service(service: &str) -> String {
    service.replace('%', "%25").replace(':', "%3A")
}

fn unescape_service(escaped: &str) -> String {
    escaped.replace("%3A", ":").replace("%25", "%")
}
