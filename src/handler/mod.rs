//! The request dispatcher.
//!
//! [`GeoprocessingHandler::handle`] runs one trigger through:
//!
//! ```text
//! normalize -> duplicate check -> cache check -> create task
//!           -> sync: resolve + compute (fault boundary) -> complete | fail
//!           -> async: invoke worker -> pending | fail
//! ```
//!
//! Every domain failure ends as a `Failed` task and an `Ok` response. Only
//! malformed payloads and store failures return `Err`.
//!
//! # Async Hand-off
//!
//! In async mode the handler writes a `Pending` task and launches the worker
//! function with the trigger, the task embedded in it. The worker extracts
//! the task with [`take_handoff_task`](crate::invoker::take_handoff_task)
//! and runs the same handler with it in [`Invocation::handoff`]; it skips
//! the cache check and task creation and computes synchronously against the
//! received task.

mod computation;
pub mod fault;
mod guard;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

pub use computation::{Computation, FnComputation};
pub use fault::FaultHook;
pub use guard::InvocationGuard;

use crate::config::HandlerConfig;
use crate::error::{FailureKind, HandlerError};
use crate::geometry::{DefaultGeometryResolver, GeometryError, GeometryResolver};
use crate::invoker::{AsyncHandoff, AsyncInvoker};
use crate::request::{normalize, CanonicalRequest};
use crate::store::TaskStore;
use crate::types::options::{ExecutionMode, HandlerOptions};
use crate::types::response::HandlerResponse;
use crate::types::task::{Task, TaskStatus};

const NO_ASYNC_HANDLER: &str = "No async handler function name defined";

/// Platform context for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    /// Platform request id, used for replay suppression.
    pub request_id: String,
    /// Pending task received from the dispatching invocation.
    pub handoff: Option<Task>,
}

impl Invocation {
    /// An invocation with `request_id` and no hand-off.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            handoff: None,
        }
    }

    /// Attaches a hand-off task.
    pub fn with_handoff(mut self, task: Task) -> Self {
        self.handoff = Some(task);
        self
    }
}

enum ExecutionFailure {
    Geometry(GeometryError),
    Computation(anyhow::Error),
}

/// Wraps a computation with caching, replay suppression, and async
/// hand-off.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use geoprocessing::handler::{FnComputation, GeoprocessingHandler, Invocation};
/// use geoprocessing::geometry::FeatureSet;
/// use geoprocessing::store::InMemoryTaskStore;
/// use geoprocessing::{HandlerOptions, TaskStatus};
/// use serde_json::json;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let handler = GeoprocessingHandler::new(
///     HandlerOptions::new("feature-count"),
///     Arc::new(InMemoryTaskStore::new()),
///     FnComputation::new(|features: FeatureSet| async move { anyhow::Ok(features.len()) }),
/// );
///
/// let trigger = json!({ "geometry": { "type": "Point", "coordinates": [0, 0] } });
/// let response = handler.handle(&trigger, &Invocation::new("req-1")).await.unwrap();
/// let task = response.task().unwrap();
/// assert_eq!(task.status, TaskStatus::Completed);
/// assert_eq!(task.data, Some(json!(1)));
/// # });
/// ```
pub struct GeoprocessingHandler {
    options: HandlerOptions,
    config: HandlerConfig,
    store: Arc<dyn TaskStore>,
    computation: Arc<dyn Computation>,
    resolver: Arc<dyn GeometryResolver>,
    invoker: Option<Arc<dyn AsyncInvoker>>,
    guard: Arc<InvocationGuard>,
    fault_hook: FaultHook,
}

impl std::fmt::Debug for GeoprocessingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoprocessingHandler")
            .field("options", &self.options)
            .field("config", &self.config)
            .field("has_invoker", &self.invoker.is_some())
            .finish_non_exhaustive()
    }
}

impl GeoprocessingHandler {
    /// Creates a handler with default configuration, the default geometry
    /// resolver, no async invoker, a fresh guard, and a no-op fault hook.
    pub fn new(
        options: HandlerOptions,
        store: Arc<dyn TaskStore>,
        computation: impl Computation + 'static,
    ) -> Self {
        Self {
            options,
            config: HandlerConfig::default(),
            store,
            computation: Arc::new(computation),
            resolver: Arc::new(DefaultGeometryResolver::new()),
            invoker: None,
            guard: Arc::new(InvocationGuard::new()),
            fault_hook: fault::noop(),
        }
    }

    /// Sets the deployment configuration.
    pub fn with_config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the geometry resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn GeometryResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets the invoker used in async mode.
    pub fn with_invoker(mut self, invoker: Arc<dyn AsyncInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Shares a replay guard, e.g. between handlers in one process.
    pub fn with_guard(mut self, guard: Arc<InvocationGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Sets the hook run after an uncaught fault is recorded.
    pub fn with_fault_hook(mut self, hook: FaultHook) -> Self {
        self.fault_hook = hook;
        self
    }

    /// Declared service options.
    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    /// Active configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Handles one trigger.
    ///
    /// # Errors
    ///
    /// - [`HandlerError::MalformedRequest`] if the payload cannot be
    ///   interpreted. No task is created.
    /// - [`HandlerError::Store`] if the task store fails.
    pub async fn handle(
        &self,
        trigger: &Value,
        invocation: &Invocation,
    ) -> Result<HandlerResponse, HandlerError> {
        let request = normalize(trigger)?;
        let service = self.options.title.as_str();

        if !self.guard.admit(&invocation.request_id) {
            tracing::info!(
                service = service,
                request_id = %invocation.request_id,
                "suppressing replayed invocation"
            );
            return Ok(HandlerResponse::duplicate());
        }

        if invocation.handoff.is_none() && !self.config.run_as_sync {
            if let Some(cached) = self.cached(service, &request).await? {
                return Ok(HandlerResponse::cache_hit(&cached)?);
            }
        }

        let channel = request.wss.clone().or_else(|| self.config.channel_address());

        let (task, mode) = match &invocation.handoff {
            Some(task) => {
                tracing::info!(
                    service = service,
                    task_id = %task.id,
                    request_id = %invocation.request_id,
                    "resuming handed-off task"
                );
                (task.clone(), ExecutionMode::Sync)
            },
            None => {
                let task = self
                    .store
                    .create(
                        service,
                        request.cache_key.as_deref(),
                        &invocation.request_id,
                        channel.clone(),
                        request.geometry_uri().map(str::to_string),
                    )
                    .await?;
                (task, self.config.effective_mode(&self.options))
            },
        };

        let task = match mode {
            ExecutionMode::Sync => self.execute(&request, task).await?,
            ExecutionMode::Async => {
                self.dispatch(trigger, &request, task, channel.as_deref())
                    .await?
            },
        };

        Ok(HandlerResponse::from_task(&task)?)
    }

    /// Reads a servable cached task. Failed tasks are never served.
    async fn cached(
        &self,
        service: &str,
        request: &CanonicalRequest,
    ) -> Result<Option<Task>, HandlerError> {
        let Some(cache_key) = request.cache_key.as_deref() else {
            return Ok(None);
        };

        match self.store.get(service, cache_key).await? {
            Some(task) if task.status != TaskStatus::Failed => {
                tracing::info!(
                    service = service,
                    cache_key = cache_key,
                    status = %task.status,
                    "cache hit"
                );
                Ok(Some(task))
            },
            Some(_) => {
                tracing::debug!(service = service, cache_key = cache_key, "recomputing failed task");
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn resolve_and_compute(
        &self,
        request: &CanonicalRequest,
    ) -> Result<Value, ExecutionFailure> {
        let features = self
            .resolver
            .resolve(&request.geometry)
            .await
            .map_err(ExecutionFailure::Geometry)?;
        self.computation
            .run(features)
            .await
            .map_err(ExecutionFailure::Computation)
    }

    /// Runs resolution and computation inside the fault boundary and writes
    /// the terminal state.
    async fn execute(&self, request: &CanonicalRequest, task: Task) -> Result<Task, HandlerError> {
        let outcome = AssertUnwindSafe(self.resolve_and_compute(request))
            .catch_unwind()
            .await;

        let task = match outcome {
            Ok(Ok(result)) => self.store.complete(task, result).await?,
            Ok(Err(ExecutionFailure::Geometry(err))) => {
                let message = match request.geometry_uri() {
                    Some(uri) => format!("Failed to retrieve geometry from {uri}"),
                    None => "Failed to extract geometry from request".to_string(),
                };
                tracing::warn!(
                    task_id = %task.id,
                    failure = FailureKind::GeometryResolution.as_str(),
                    error = %err,
                    "geometry resolution failed"
                );
                self.store.fail(task, message, Some(&err)).await?
            },
            Ok(Err(ExecutionFailure::Computation(err))) => {
                tracing::warn!(
                    task_id = %task.id,
                    failure = FailureKind::Computation.as_str(),
                    error = %err,
                    "computation failed"
                );
                let message = format!("Geoprocessing exception.\n{err:?}");
                let cause: &(dyn std::error::Error + Send + Sync + 'static) = err.as_ref();
                self.store.fail(task, message, Some(cause)).await?
            },
            Err(panic) => {
                let message = fault::panic_message(panic.as_ref());
                tracing::error!(
                    task_id = %task.id,
                    failure = FailureKind::UncaughtFault.as_str(),
                    panic_msg = %message,
                    "computation panicked"
                );
                let written = self.store.fail(task.clone(), message, None).await;
                (self.fault_hook)(written.as_ref().unwrap_or(&task));
                written?
            },
        };
        Ok(task)
    }

    /// Launches the async worker for a pending task.
    async fn dispatch(
        &self,
        trigger: &Value,
        request: &CanonicalRequest,
        task: Task,
        channel: Option<&str>,
    ) -> Result<Task, HandlerError> {
        let Some(function_name) = self.config.async_handler_function_name.as_deref() else {
            tracing::error!(
                task_id = %task.id,
                failure = FailureKind::Dispatch.as_str(),
                "async mode without a worker function"
            );
            return Ok(self.store.fail(task, NO_ASYNC_HANDLER.to_string(), None).await?);
        };

        let Some(invoker) = self.invoker.as_ref() else {
            let message =
                format!("Could not launch async handler function {function_name}: no invoker configured");
            return Ok(self.store.fail(task, message, None).await?);
        };

        let launched = match AsyncHandoff::new(request.forward_payload(trigger, channel), task.clone()) {
            Ok(handoff) => invoker.invoke(function_name, &handoff).await,
            Err(err) => Err(err),
        };
        match launched {
            Ok(()) => {
                tracing::info!(
                    task_id = %task.id,
                    function_name = function_name,
                    "handed off to async worker"
                );
                Ok(task)
            },
            Err(err) => {
                tracing::error!(
                    task_id = %task.id,
                    failure = FailureKind::Dispatch.as_str(),
                    error = %err,
                    "async worker launch failed"
                );
                let message = format!("Could not launch async handler function {function_name}: {err}");
                Ok(self.store.fail(task, message, Some(&err)).await?)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FeatureSet;
    use crate::store::InMemoryTaskStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn point_trigger() -> Value {
        json!({ "geometry": { "type": "Point", "coordinates": [0, 0] } })
    }

    fn counting_handler(calls: Arc<AtomicUsize>) -> GeoprocessingHandler {
        GeoprocessingHandler::new(
            HandlerOptions::new("svc"),
            Arc::new(InMemoryTaskStore::new()),
            FnComputation::new(move |_features: FeatureSet| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(json!("done"))
                }
            }),
        )
    }

    #[tokio::test]
    async fn malformed_trigger_is_error_and_not_recorded() {
        let handler = counting_handler(Arc::new(AtomicUsize::new(0)));
        let err = handler
            .handle(&json!({ "nothing": true }), &Invocation::new("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::MalformedRequest { .. }));
        assert_eq!(handler.guard.last_seen(), None);
    }

    #[tokio::test]
    async fn duplicate_returns_empty_ok() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&calls));
        handler.handle(&point_trigger(), &Invocation::new("r1")).await.unwrap();
        let second = handler.handle(&point_trigger(), &Invocation::new("r1")).await.unwrap();
        assert_eq!(second, HandlerResponse::duplicate());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_falls_back_to_configured_address() {
        let handler = counting_handler(Arc::new(AtomicUsize::new(0)))
            .with_config(HandlerConfig::default().with_wss("abc", "us-west-1", "prod"));
        let task = handler
            .handle(&point_trigger(), &Invocation::new("r1"))
            .await
            .unwrap()
            .task()
            .unwrap();
        assert_eq!(
            task.wss.as_deref(),
            Some("wss://abc.execute-api.us-west-1.amazonaws.com/prod")
        );
    }

    #[tokio::test]
    async fn request_channel_overrides_configured_address() {
        let handler = counting_handler(Arc::new(AtomicUsize::new(0)))
            .with_config(HandlerConfig::default().with_wss("abc", "us-west-1", "prod"));
        let mut trigger = point_trigger();
        trigger["wss"] = json!("wss://mine");
        let task = handler
            .handle(&trigger, &Invocation::new("r1"))
            .await
            .unwrap()
            .task()
            .unwrap();
        assert_eq!(task.wss.as_deref(), Some("wss://mine"));
    }

    #[tokio::test]
    async fn async_without_invoker_fails_task() {
        let handler = counting_handler(Arc::new(AtomicUsize::new(0))).with_config(
            HandlerConfig::default()
                .with_execution_mode(ExecutionMode::Async)
                .with_async_handler_function_name("worker"),
        );
        let response = handler.handle(&point_trigger(), &Invocation::new("r1")).await.unwrap();
        assert_eq!(response.status_code, 500);
        let task = response.task().unwrap();
        assert!(task.error.unwrap().contains("worker"));
    }
}
