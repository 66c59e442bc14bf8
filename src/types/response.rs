//! Gateway-facing response type.

use std::collections::BTreeMap;

use http::header::{ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::constants::{CACHE_HEADER, CACHE_HIT_VALUE};
use crate::error::TaskError;
use crate::types::task::{Task, TaskStatus};

/// Structured handler response, serialized in the API Gateway proxy
/// result shape (`statusCode`, `headers`, `body`).
///
/// # Examples
///
/// ```
/// use geoprocessing::{HandlerResponse, Task};
///
/// let task = Task::new("svc", Some("k1"), "req-1", None, None);
/// let response = HandlerResponse::from_task(&task).unwrap();
/// assert_eq!(response.status_code, 200);
/// assert_eq!(response.headers["content-type"], "application/json");
///
/// let json = serde_json::to_value(&response).unwrap();
/// assert_eq!(json["statusCode"], 200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    /// HTTP status code.
    pub status_code: u16,

    /// Response headers (lowercase names).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// JSON-encoded task, or empty for suppressed duplicates.
    pub body: String,
}

impl HandlerResponse {
    /// Response for a task: `500` when it failed, `200` otherwise.
    pub fn from_task(task: &Task) -> Result<Self, TaskError> {
        let status = if task.status == TaskStatus::Failed {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        let body = serde_json::to_string(task).map_err(|source| TaskError::Serialization {
            task_id: task.id.clone(),
            source,
        })?;

        Ok(Self {
            status_code: status.as_u16(),
            headers: common_headers(),
            body,
        })
    }

    /// Response for a task served from the cache.
    pub fn cache_hit(task: &Task) -> Result<Self, TaskError> {
        let mut response = Self::from_task(task)?;
        response
            .headers
            .insert(CACHE_HEADER.to_string(), CACHE_HIT_VALUE.to_string());
        Ok(response)
    }

    /// Empty `200` for a replayed invocation.
    pub fn duplicate() -> Self {
        Self {
            status_code: StatusCode::OK.as_u16(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Returns `true` if the cache header is present.
    pub fn is_cache_hit(&self) -> bool {
        self.headers.get(CACHE_HEADER).map(String::as_str) == Some(CACHE_HIT_VALUE)
    }

    /// Decodes the body back into a task. `None` for empty bodies.
    pub fn task(&self) -> Option<Task> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

fn common_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (CONTENT_TYPE.as_str().to_string(), "application/json".to_string()),
        (ACCESS_CONTROL_ALLOW_ORIGIN.as_str().to_string(), "*".to_string()),
        (
            ACCESS_CONTROL_ALLOW_CREDENTIALS.as_str().to_string(),
            "true".to_string(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_task_maps_to_500() {
        let mut task = Task::new("svc", Some("k"), "r", None, None);
        task.mark_failed("nope".to_string()).unwrap();
        let response = HandlerResponse::from_task(&task).unwrap();
        assert_eq!(response.status_code, 500);
        assert_eq!(response.task().unwrap().error.as_deref(), Some("nope"));
    }

    #[test]
    fn cache_hit_adds_header() {
        let mut task = Task::new("svc", Some("k"), "r", None, None);
        task.mark_completed(json!({"ok": true})).unwrap();
        let response = HandlerResponse::cache_hit(&task).unwrap();
        assert!(response.is_cache_hit());
        assert_eq!(response.headers["access-control-allow-origin"], "*");
        assert_eq!(response.headers["access-control-allow-credentials"], "true");
    }

    #[test]
    fn duplicate_is_empty() {
        let response = HandlerResponse::duplicate();
        assert_eq!(response.status_code, 200);
        assert!(response.body.is_empty());
        assert!(response.task().is_none());
        assert!(!response.is_cache_hit());
    }
}
