//! One-way hand-off to the async worker function.
//!
//! In async mode the dispatcher writes a `Pending` task, then asks an
//! [`AsyncInvoker`] to launch the worker with the original trigger payload.
//! The pending task travels inside that payload under
//! [`HANDOFF_TASK_FIELD`] so the worker can finish that exact record
//! instead of creating its own; [`take_handoff_task`] strips it back out.
//!
//! [`LambdaInvoker`] (feature `lambda-invoke`) performs an `Event` invoke:
//! the call returns once Lambda has queued the event, not when the worker
//! finishes. Lambda drops client context on `Event` invokes, so the copy
//! placed there only reaches the worker on synchronous test invokes.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use thiserror::Error;

use crate::constants::{HANDOFF_TASK_CONTEXT_KEY, HANDOFF_TASK_FIELD};
use crate::types::task::Task;

/// Lambda's limit on the base64-encoded client context, in bytes.
pub const MAX_CLIENT_CONTEXT_BYTES: usize = 3583;

/// Errors raised while launching the async worker.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The task could not be encoded as client context.
    #[error("could not encode hand-off task: {0}")]
    Encode(#[from] serde_json::Error),

    /// The encoded client context exceeds [`MAX_CLIENT_CONTEXT_BYTES`].
    #[error("client context is {size} bytes, limit is {MAX_CLIENT_CONTEXT_BYTES}")]
    ContextTooLarge {
        /// Encoded size.
        size: usize,
    },

    /// The platform refused or failed the invocation.
    #[error("{message}")]
    Rejected {
        /// Description from the platform client.
        message: String,
        /// The client error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// What the worker receives: the trigger payload and the pending task.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncHandoff {
    /// The original trigger with the notification channel injected and the
    /// task embedded under [`HANDOFF_TASK_FIELD`].
    pub payload: Value,
    /// The pending task the worker must complete.
    pub task: Task,
}

impl AsyncHandoff {
    /// Bundles a payload with its pending task, embedding the task in the
    /// payload.
    ///
    /// # Errors
    ///
    /// [`InvokeError::Encode`] if the task cannot be serialized or the
    /// payload is not a JSON object.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoprocessing::invoker::{take_handoff_task, AsyncHandoff};
    /// use geoprocessing::Task;
    /// use serde_json::json;
    ///
    /// let task = Task::new("area", None, "req-1", None, None);
    /// let handoff = AsyncHandoff::new(json!({ "geometry": {} }), task.clone()).unwrap();
    ///
    /// let mut payload = handoff.payload;
    /// assert_eq!(take_handoff_task(&mut payload), Some(task));
    /// assert_eq!(payload, json!({ "geometry": {} }));
    /// ```
    pub fn new(mut payload: Value, task: Task) -> Result<Self, InvokeError> {
        let embedded = serde_json::to_value(&task)?;
        let obj = payload.as_object_mut().ok_or_else(|| {
            InvokeError::Encode(<serde_json::Error as serde::ser::Error>::custom(
                "hand-off payload is not a JSON object",
            ))
        })?;
        obj.insert(HANDOFF_TASK_FIELD.to_string(), embedded);
        Ok(Self { payload, task })
    }
}

/// Launches the async worker without waiting for it.
#[async_trait]
pub trait AsyncInvoker: Send + Sync {
    /// Queues one invocation of `function_name`.
    ///
    /// `Ok(())` means the platform accepted the event.
    async fn invoke(&self, function_name: &str, handoff: &AsyncHandoff) -> Result<(), InvokeError>;
}

/// Builds the client context JSON carrying `task`.
///
/// The Lambda runtime parses client context into a fixed shape, so every
/// member is present even when empty; the task itself sits under
/// `custom.task` as a JSON string.
pub fn client_context_json(task: &Task) -> Result<Value, InvokeError> {
    let task_json = serde_json::to_string(task)?;
    Ok(json!({
        "client": {
            "installationId": "",
            "appTitle": "",
            "appVersionName": "",
            "appVersionCode": "",
            "appPackageName": "",
        },
        "custom": { HANDOFF_TASK_CONTEXT_KEY: task_json },
        "environment": {},
    }))
}

/// Base64 client context for an `Invoke` call.
///
/// # Errors
///
/// [`InvokeError::ContextTooLarge`] if the encoded context exceeds Lambda's
/// limit.
pub fn encode_client_context(task: &Task) -> Result<String, InvokeError> {
    let context = serde_json::to_vec(&client_context_json(task)?)?;
    let encoded = STANDARD.encode(context);
    if encoded.len() > MAX_CLIENT_CONTEXT_BYTES {
        return Err(InvokeError::ContextTooLarge {
            size: encoded.len(),
        });
    }
    Ok(encoded)
}

/// Reads the hand-off task back out of a parsed client context's `custom`
/// map. Returns `None` when absent or unparseable, in which case the worker
/// creates its own task.
pub fn handoff_task(custom: &HashMap<String, String>) -> Option<Task> {
    let raw = custom.get(HANDOFF_TASK_CONTEXT_KEY)?;
    match serde_json::from_str(raw) {
        Ok(task) => Some(task),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unparseable hand-off task");
            None
        },
    }
}

/// Removes the embedded hand-off task from a worker payload.
///
/// The field is always stripped. Returns `None` when it is absent or does
/// not decode as a task.
pub fn take_handoff_task(payload: &mut Value) -> Option<Task> {
    let raw = payload.as_object_mut()?.remove(HANDOFF_TASK_FIELD)?;
    match serde_json::from_value(raw) {
        Ok(task) => Some(task),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unparseable hand-off task in payload");
            None
        },
    }
}

#[cfg(feature = "lambda-invoke")]
pub use lambda::LambdaInvoker;

#[cfg(feature = "lambda-invoke")]
mod lambda {
    use async_trait::async_trait;
    use aws_sdk_lambda::primitives::Blob;
    use aws_sdk_lambda::types::InvocationType;
    use aws_sdk_lambda::Client;

    use super::{encode_client_context, AsyncHandoff, AsyncInvoker, InvokeError};

    /// [`AsyncInvoker`] backed by the AWS Lambda `Invoke` API.
    #[derive(Debug, Clone)]
    pub struct LambdaInvoker {
        client: Client,
    }

    impl LambdaInvoker {
        /// Wraps a pre-built Lambda client.
        pub fn new(client: Client) -> Self {
            Self { client }
        }

        /// Builds a client from the standard AWS SDK config chain.
        pub async fn from_env() -> Self {
            let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Self::new(Client::new(&config))
        }
    }

    #[async_trait]
    impl AsyncInvoker for LambdaInvoker {
        async fn invoke(
            &self,
            function_name: &str,
            handoff: &AsyncHandoff,
        ) -> Result<(), InvokeError> {
            let payload = serde_json::to_vec(&handoff.payload)?;

            let mut request = self
                .client
                .invoke()
                .function_name(function_name)
                .invocation_type(InvocationType::Event)
                .payload(Blob::new(payload));
            match encode_client_context(&handoff.task) {
                Ok(context) => request = request.client_context(context),
                Err(e) => tracing::debug!(
                    task_id = %handoff.task.id,
                    error = %e,
                    "invoking without client context copy"
                ),
            }

            let output = request
                .send()
                .await
                .map_err(|e| InvokeError::Rejected {
                    message: e.to_string(),
                    source: Some(Box::new(e)),
                })?;

            tracing::debug!(
                function_name = function_name,
                task_id = %handoff.task.id,
                status_code = output.status_code(),
                "async worker invoked"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pending() -> Task {
        Task::new("area", Some("k1"), "req-1", Some("wss://chan".into()), None)
    }

    #[test]
    fn client_context_carries_task_json() {
        let task = pending();
        let ctx = client_context_json(&task).unwrap();
        let raw = ctx["custom"]["task"].as_str().unwrap();
        let decoded: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(decoded, task);
        assert_eq!(ctx["client"]["appTitle"], json!(""));
        assert_eq!(ctx["environment"], json!({}));
    }

    #[test]
    fn encoded_context_is_base64_json() {
        let task = pending();
        let encoded = encode_client_context(&task).unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        let ctx: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(ctx["custom"]["task"].is_string());
    }

    #[test]
    fn oversized_context_is_rejected() {
        let mut task = pending();
        task.wss = Some("x".repeat(MAX_CLIENT_CONTEXT_BYTES));
        assert!(matches!(
            encode_client_context(&task),
            Err(InvokeError::ContextTooLarge { .. })
        ));
    }

    #[test]
    fn handoff_task_round_trips_through_custom_map() {
        let task = pending();
        let ctx = client_context_json(&task).unwrap();
        let custom: HashMap<String, String> =
            serde_json::from_value(ctx["custom"].clone()).unwrap();
        assert_eq!(handoff_task(&custom), Some(task));
    }

    #[test]
    fn handoff_embeds_task_in_payload() {
        let task = pending();
        let handoff = AsyncHandoff::new(json!({ "geometry": {}, "wss": "wss://chan" }), task.clone())
            .unwrap();
        assert_eq!(handoff.payload[HANDOFF_TASK_FIELD]["id"], json!("k1"));
        assert_eq!(handoff.payload["wss"], json!("wss://chan"));
        assert_eq!(handoff.task, task);
    }

    #[test]
    fn handoff_rejects_non_object_payload() {
        assert!(matches!(
            AsyncHandoff::new(json!("not an object"), pending()),
            Err(InvokeError::Encode(_))
        ));
    }

    #[test]
    fn take_handoff_task_strips_field() {
        let task = pending();
        let mut payload = AsyncHandoff::new(json!({ "body": "{}" }), task.clone())
            .unwrap()
            .payload;
        assert_eq!(take_handoff_task(&mut payload), Some(task));
        assert_eq!(payload, json!({ "body": "{}" }));
        assert_eq!(take_handoff_task(&mut payload), None);
    }

    #[test]
    fn take_handoff_task_drops_garbage() {
        let mut payload = json!({ "geometry": {}, HANDOFF_TASK_FIELD: { "id": 7 } });
        assert_eq!(take_handoff_task(&mut payload), None);
        assert!(payload.get(HANDOFF_TASK_FIELD).is_none());
    }

    #[test]
    fn handoff_task_missing_or_garbage_is_none() {
        assert_eq!(handoff_task(&HashMap::new()), None);
        let custom = HashMap::from([("task".to_string(), "{oops".to_string())]);
        assert_eq!(handoff_task(&custom), None);
    }
}
