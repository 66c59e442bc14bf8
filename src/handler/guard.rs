//! Replay suppression for at-least-once delivery.
//!
//! The platform may redeliver an invocation after a failure, reusing its
//! request id. [`InvocationGuard`] remembers the last id this process
//! handled; a handler shares one guard across every call it serves.
//! The state lives only as long as the process, so a cold start or another
//! instance will not recognize a replay.

use parking_lot::Mutex;

/// Remembers the most recent invocation id.
#[derive(Debug, Default)]
pub struct InvocationGuard {
    last_request_id: Mutex<Option<String>>,
}

impl InvocationGuard {
    /// Creates a guard that has seen nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `request_id` equals the last id admitted, `true`
    /// otherwise, recording it as the last id. Empty ids are always
    /// admitted and never recorded.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoprocessing::handler::InvocationGuard;
    ///
    /// let guard = InvocationGuard::new();
    /// assert!(guard.admit("req-1"));
    /// assert!(!guard.admit("req-1"));
    /// assert!(guard.admit("req-2"));
    /// assert!(guard.admit("req-1"));
    /// ```
    pub fn admit(&self, request_id: &str) -> bool {
        if request_id.is_empty() {
            return true;
        }
        let mut last = self.last_request_id.lock();
        if last.as_deref() == Some(request_id) {
            return false;
        }
        *last = Some(request_id.to_string());
        true
    }

    /// The last admitted id.
    pub fn last_seen(&self) -> Option<String> {
        self.last_request_id.lock().clone()
    }
}
