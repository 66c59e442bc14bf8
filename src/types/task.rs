//! The persisted task record and its lifecycle state machine.
//!
//! # Serialization
//!
//! [`Task`] uses `#[serde(rename_all = "camelCase")]`; this JSON is both
//! what the store persists and what clients receive as the response body.
//! Optional fields are omitted when `None`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TaskError;

/// Task lifecycle status.
///
/// # State Machine
///
/// ```text
/// Pending -> Completed, Failed
/// Completed -> (terminal, no transitions)
/// Failed -> (terminal, no transitions)
/// ```
///
/// # Examples
///
/// ```
/// use geoprocessing::TaskStatus;
///
/// assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Completed));
/// assert!(!TaskStatus::Completed.can_transition_to(&TaskStatus::Failed));
/// assert!(!TaskStatus::Pending.can_transition_to(&TaskStatus::Pending));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, computation not finished.
    Pending,
    /// Computation succeeded (terminal).
    Completed,
    /// Computation, resolution, or dispatch failed (terminal).
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if moving from this status to `next` is allowed.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed)
        )
    }

    /// Validates a transition, returning [`TaskError::InvalidTransition`]
    /// when it is not allowed.
    pub fn validate_transition(&self, task_id: &str, next: &Self) -> Result<(), TaskError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: *self,
                to: *next,
            })
        }
    }
}

/// One computation's lifecycle record, keyed by `(service, id)`.
///
/// # Examples
///
/// ```
/// use geoprocessing::{Task, TaskStatus};
///
/// let task = Task::new("area", Some("k1"), "req-1", None, None);
/// assert_eq!(task.id, "k1");
/// assert_eq!(task.location, "/area/tasks/k1");
/// assert_eq!(task.status, TaskStatus::Pending);
///
/// let json = serde_json::to_value(&task).unwrap();
/// assert_eq!(json["status"], "pending");
/// assert_eq!(json["requestId"], "req-1");
/// assert!(json.get("data").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// The cache key, or a generated UUID when the request had none.
    pub id: String,

    /// Name of the geoprocessing service that owns this task.
    pub service: String,

    /// Path clients use to poll this task.
    pub location: String,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Platform invocation id of the request that created the task.
    pub request_id: String,

    /// Notification channel address for completion delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wss: Option<String>,

    /// Referenced geometry, when the request carried a URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_uri: Option<String>,

    /// RFC 3339 creation time.
    pub started_at: String,

    /// RFC 3339 time of the last write.
    pub updated_at: String,

    /// Milliseconds from creation to the terminal write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    /// Computation result. Present only when `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Failure description. Present only when `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Creates a `Pending` task.
    ///
    /// `cache_key` becomes the task id; `None` (or an empty key) gets a
    /// fresh UUIDv4, which no later request can look up.
    pub fn new(
        service: &str,
        cache_key: Option<&str>,
        request_id: &str,
        wss: Option<String>,
        geometry_uri: Option<String>,
    ) -> Self {
        let id = cache_key
            .filter(|key| !key.is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let now = timestamp(Utc::now());

        Self {
            location: format!("/{service}/tasks/{id}"),
            id,
            service: service.to_string(),
            status: TaskStatus::Pending,
            request_id: request_id.to_string(),
            wss,
            geometry_uri,
            started_at: now.clone(),
            updated_at: now,
            duration: None,
            data: None,
            error: None,
        }
    }

    /// Moves the task to `Completed` with `result`.
    pub(crate) fn mark_completed(&mut self, result: Value) -> Result<(), TaskError> {
        self.status
            .validate_transition(&self.id, &TaskStatus::Completed)?;
        self.stamp_terminal();
        self.status = TaskStatus::Completed;
        self.data = Some(result);
        self.error = None;
        Ok(())
    }

    /// Moves the task to `Failed` with `message`.
    pub(crate) fn mark_failed(&mut self, message: String) -> Result<(), TaskError> {
        self.status.validate_transition(&self.id, &TaskStatus::Failed)?;
        self.stamp_terminal();
        self.status = TaskStatus::Failed;
        self.data = None;
        self.error = Some(message);
        Ok(())
    }

    fn stamp_terminal(&mut self) {
        let now = Utc::now();
        self.updated_at = timestamp(now);
        // Unparseable start times (hand-edited records) just lose the duration.
        self.duration = DateTime::parse_from_rfc3339(&self.started_at)
            .ok()
            .and_then(|started| {
                u64::try_from((now - started.with_timezone(&Utc)).num_milliseconds()).ok()
            });
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
