//! Error types for task storage and request handling.
//!
//! Two layers of errors exist. [`TaskError`] covers the task store and the
//! state machine. [`HandlerError`] is what
//! [`GeoprocessingHandler::handle`](crate::handler::GeoprocessingHandler::handle)
//! returns, and it only carries failures that cannot be recorded on a task:
//! a payload that could not be parsed, or a store that is unavailable.
//! Every other failure becomes a `Failed` task and a normal response.

use thiserror::Error;

use crate::store::backend::StorageError;
use crate::types::task::TaskStatus;

/// Errors raised by task store operations.
///
/// # Examples
///
/// ```
/// use geoprocessing::{TaskError, TaskStatus};
///
/// let err = TaskError::InvalidTransition {
///     task_id: "k1".to_string(),
///     from: TaskStatus::Completed,
///     to: TaskStatus::Failed,
/// };
/// assert!(err.to_string().contains("k1"));
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Error)]
pub enum TaskError {
    /// The in-hand task cannot move to the requested status.
    #[error("invalid transition from {from} to {to} for task {task_id}")]
    InvalidTransition {
        /// The task being transitioned.
        task_id: String,
        /// Its current status.
        from: TaskStatus,
        /// The rejected target status.
        to: TaskStatus,
    },

    /// A stored record could not be encoded or decoded.
    #[error("task {task_id} could not be serialized: {source}")]
    Serialization {
        /// The affected task.
        task_id: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The storage backend rejected or failed the operation.
    #[error(transparent)]
    Store(#[from] StorageError),
}

impl TaskError {
    /// Returns `true` when retrying the same call could succeed.
    ///
    /// The dispatcher never retries; this only informs callers of the
    /// handler (e.g. whether to surface a 503 rather than a 500).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(StorageError::Backend { .. }))
    }
}

/// Failures that propagate out of the handler as transport-level errors.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The trigger payload matches none of the recognized shapes.
    #[error("could not interpret incoming request: {reason}")]
    MalformedRequest {
        /// Which check failed.
        reason: String,
    },

    /// A task store operation failed: the backend errored, a record did not
    /// decode, or a terminal write was rejected for the task in hand.
    #[error("task store operation failed: {0}")]
    Store(#[from] TaskError),
}

impl HandlerError {
    /// Returns `true` when retrying the invocation could succeed, i.e. the
    /// store backend failed rather than the request or the record.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest {
            reason: reason.into(),
        }
    }
}

/// Domain failures recorded on a `Failed` task rather than propagated.
///
/// Used to tag log events so the cause of a failed task can be filtered
/// without parsing its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Referenced geometry could not be fetched, or inline geometry could
    /// not be extracted.
    GeometryResolution,
    /// The user computation returned an error.
    Computation,
    /// The computation panicked.
    UncaughtFault,
    /// The async worker could not be launched.
    Dispatch,
}

impl FailureKind {
    /// Stable label for log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeometryResolution => "geometry_resolution",
            Self::Computation => "computation",
            Self::UncaughtFault => "uncaught_fault",
            Self::Dispatch => "dispatch",
        }
    }
}
