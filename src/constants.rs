//! Header names, environment variable names, and defaults.

/// Response header set on cache hits.
///
/// Clients use it to tell a served-from-cache task apart from a fresh run.
pub const CACHE_HEADER: &str = "x-gp-cache";

/// Value of [`CACHE_HEADER`] on a cache hit.
pub const CACHE_HIT_VALUE: &str = "Cache hit";

/// Forces synchronous execution and disables cache reads. Set on the
/// async worker function so it runs the computation itself.
pub const ENV_RUN_AS_SYNC: &str = "RUN_AS_SYNC";

/// Execution mode override (`sync` or `async`).
pub const ENV_EXECUTION_MODE: &str = "GP_EXECUTION_MODE";

/// Task table name.
pub const ENV_TASKS_TABLE: &str = "TASKS_TABLE";

/// Name of the function invoked for async execution.
pub const ENV_ASYNC_HANDLER_FUNCTION_NAME: &str = "ASYNC_HANDLER_FUNCTION_NAME";

/// Socket API id used to build the default notification channel address.
pub const ENV_WSS_REF: &str = "WSS_REF";

/// Socket API region.
pub const ENV_WSS_REGION: &str = "WSS_REGION";

/// Socket API stage.
pub const ENV_WSS_STAGE: &str = "WSS_STAGE";

/// Default configuration file, read from the working directory if present.
pub const DEFAULT_CONFIG_FILE: &str = ".geoprocessing.toml";

/// Default task table name.
pub const DEFAULT_TASKS_TABLE: &str = "geoprocessing_tasks";

/// Client context key carrying the hand-off task on async invocations.
pub const HANDOFF_TASK_CONTEXT_KEY: &str = "task";

/// Top-level payload field carrying the hand-off task on async invocations.
///
/// Lambda only delivers client context on synchronous invokes, so the
/// pending task rides in the `Event` payload itself and the client context
/// holds a secondary copy.
pub const HANDOFF_TASK_FIELD: &str = "gpHandoffTask";
