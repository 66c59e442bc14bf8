//! Uncaught fault handling.
//!
//! A panic inside geometry resolution or the computation is caught at the
//! dispatcher boundary. The task is written `Failed` with the panic message,
//! then the handler's [`FaultHook`] runs with the failed task. Library use
//! defaults to [`noop`]; the Lambda wrapper installs [`exit_process`] so a
//! poisoned runtime is recycled.

use std::any::Any;
use std::sync::Arc;

use crate::types::task::Task;

/// Message recorded when a panic payload is neither `&str` nor `String`.
pub const UNCAUGHT_EXCEPTION: &str = "Uncaught exception";

/// Callback run after an uncaught fault has been recorded.
pub type FaultHook = Arc<dyn Fn(&Task) + Send + Sync>;

/// A hook that does nothing.
pub fn noop() -> FaultHook {
    Arc::new(|_: &Task| {})
}

/// A hook that exits the process with status 1.
pub fn exit_process() -> FaultHook {
    Arc::new(|task: &Task| {
        tracing::error!(
            service = %task.service,
            task_id = %task.id,
            "exiting after uncaught fault"
        );
        std::process::exit(1);
    })
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        UNCAUGHT_EXCEPTION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_str_payload() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(payload.as_ref()), "index out of bounds");
    }

    #[test]
    fn string_payload() {
        let payload: Box<dyn Any + Send> = Box::new(format!("bad ring {}", 3));
        assert_eq!(panic_message(payload.as_ref()), "bad ring 3");
    }

    #[test]
    fn opaque_payload() {
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), UNCAUGHT_EXCEPTION);
    }

    #[test]
    fn noop_hook_runs() {
        let task = Task::new("svc", None, "r", None, None);
        noop()(&task);
    }
}
