//! AWS Lambda entry point for a geoprocessing function.
//!
//! The same binary serves both roles of an async deployment. The gateway
//! function dispatches; the worker function (deployed with
//! `RUN_AS_SYNC=true`) receives the pending task embedded in its event
//! payload and computes.

mod summary;

use std::collections::HashMap;
use std::sync::Arc;

use geoprocessing::handler::{fault, FnComputation, GeoprocessingHandler, Invocation};
use geoprocessing::invoker::{handoff_task, take_handoff_task, LambdaInvoker};
use geoprocessing::store::dynamodb::DynamoDbBackend;
use geoprocessing::store::GenericTaskStore;
use geoprocessing::{FeatureSet, HandlerConfig, HandlerOptions, HandlerResponse};
use lambda_http::lambda_runtime::{self, service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "sketch-summary";

/// Builds the invocation for an event, stripping the embedded hand-off task
/// from `payload`. The client context copy is only consulted when the
/// payload carries none.
fn invocation_from_event(
    payload: &mut Value,
    request_id: String,
    client_custom: Option<&HashMap<String, String>>,
) -> Invocation {
    let handoff = take_handoff_task(payload).or_else(|| client_custom.and_then(handoff_task));
    Invocation {
        request_id,
        handoff,
    }
}

async fn handle(
    handler: &GeoprocessingHandler,
    event: LambdaEvent<Value>,
) -> Result<HandlerResponse, Error> {
    let (mut payload, context) = event.into_parts();
    let custom = context.client_context.as_ref().map(|ctx| &ctx.custom);
    let invocation = invocation_from_event(&mut payload, context.request_id.clone(), custom);

    match handler.handle(&payload, &invocation).await {
        Ok(response) => Ok(response),
        Err(err) => {
            tracing::error!(
                request_id = %invocation.request_id,
                retryable = err.is_retryable(),
                error = %err,
                "invocation failed"
            );
            Err(err.into())
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .without_time()
        .init();

    let config = HandlerConfig::load()?;
    tracing::info!(
        service = SERVICE_NAME,
        tasks_table = %config.tasks_table,
        run_as_sync = config.run_as_sync,
        "starting geoprocessing function"
    );

    let backend = DynamoDbBackend::from_env_with_table(&config.tasks_table).await;
    let store = GenericTaskStore::new(backend);
    let invoker = LambdaInvoker::from_env().await;

    let options = HandlerOptions::new(SERVICE_NAME)
        .with_description("Feature count, geometry types, and bounding box of a sketch");
    let computation = FnComputation::new(|features: FeatureSet| async move {
        anyhow::Ok(summary::summarize(&features))
    });

    let handler = Arc::new(
        GeoprocessingHandler::new(options, Arc::new(store), computation)
            .with_config(config)
            .with_invoker(Arc::new(invoker))
            .with_fault_hook(fault::exit_process()),
    );

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = Arc::clone(&handler);
        async move { handle(&handler, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoprocessing::invoker::{client_context_json, AsyncHandoff};
    use geoprocessing::Task;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pending() -> Task {
        Task::new(SERVICE_NAME, None, "gateway-req", None, None)
    }

    fn context_custom(task: &Task) -> HashMap<String, String> {
        let ctx = client_context_json(task).unwrap();
        serde_json::from_value(ctx["custom"].clone()).unwrap()
    }

    #[test]
    fn handoff_comes_from_payload_without_client_context() {
        let task = pending();
        let mut payload = AsyncHandoff::new(json!({ "geometry": {} }), task.clone())
            .unwrap()
            .payload;

        let invocation = invocation_from_event(&mut payload, "worker-req".to_string(), None);

        assert_eq!(invocation.request_id, "worker-req");
        assert_eq!(invocation.handoff, Some(task));
        assert_eq!(payload, json!({ "geometry": {} }));
    }

    #[test]
    fn payload_copy_wins_over_client_context() {
        let task = pending();
        let mut stale = task.clone();
        stale.request_id = "stale".to_string();
        let mut payload = AsyncHandoff::new(json!({ "geometry": {} }), task.clone())
            .unwrap()
            .payload;

        let custom = context_custom(&stale);
        let invocation = invocation_from_event(&mut payload, "r".to_string(), Some(&custom));
        assert_eq!(invocation.handoff, Some(task));
    }

    #[test]
    fn client_context_is_used_when_payload_has_no_task() {
        let task = pending();
        let custom = context_custom(&task);
        let mut payload = json!({ "geometry": {} });

        let invocation = invocation_from_event(&mut payload, "r".to_string(), Some(&custom));
        assert_eq!(invocation.handoff, Some(task));
    }

    #[test]
    fn gateway_event_has_no_handoff() {
        let mut payload = json!({ "queryStringParameters": { "geometryUri": "https://x.test/a.json" } });
        let invocation = invocation_from_event(&mut payload, "gateway-req".to_string(), None);
        assert_eq!(invocation, Invocation::new("gateway-req"));
    }
}
