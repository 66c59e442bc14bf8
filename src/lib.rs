//! Cacheable, idempotent task execution for serverless geoprocessing.
//!
//! A geoprocessing function takes a sketch (GeoJSON), runs a possibly slow
//! computation on it, and returns a result. This crate wraps such a function
//! so that:
//!
//! - results are cached per service and cache key, and repeat requests are
//!   answered from the task store without recomputing;
//! - platform retries of the same invocation do not run the computation
//!   twice;
//! - long computations can run in a separately invoked worker while the
//!   caller gets a pending task to poll;
//! - every path, including a panicking computation, ends in a `Completed`
//!   or `Failed` task record.
//!
//! # Module Organization
//!
//! - [`handler`] - The dispatcher ([`GeoprocessingHandler`]), replay guard,
//!   and fault boundary
//! - [`request`] - Trigger payload normalization
//! - [`geometry`] - GeoJSON feature sets and geometry resolution
//! - [`invoker`] - Async worker hand-off
//! - [`store`] - Task persistence (in-memory, DynamoDB)
//! - [`config`] - Deployment configuration from TOML and environment
//! - [`types`] - Task record, response, and service options
//! - [`error`] - Error types
//! - [`constants`] - Header names, environment variable names, defaults
//!
//! # Feature Flags
//!
//! - `http-client` - fetch referenced geometry with `reqwest`
//! - `dynamodb` - DynamoDB task store backend
//! - `lambda-invoke` - launch async workers through the Lambda `Invoke` API
//! - `full` - all of the above

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod handler;
pub mod invoker;
pub mod request;
pub mod store;
pub mod types;

// Re-exports for ergonomic access
pub use config::{ConfigError, HandlerConfig};
pub use error::{FailureKind, HandlerError, TaskError};
pub use geometry::{FeatureSet, GeometryError, GeometryResolver};
pub use handler::{Computation, FnComputation, GeoprocessingHandler, Invocation, InvocationGuard};
pub use invoker::{AsyncHandoff, AsyncInvoker, InvokeError};
pub use request::{CanonicalRequest, GeometrySource, TriggerShape};
pub use store::{InMemoryTaskStore, StorageBackend, StorageError, TaskStore};
pub use types::*;
