use std::sync::{Arc, Mutex};

use taskdispatch::encode::{HookFuture, WorkdirCleanupHook};
use taskdispatch::errors::DispatchError;

/// A cleanup hook that:
/// - records every identifier it was asked to clean
/// - optionally fails, to exercise the error path.
#[derive(Debug, Clone, Default)]
pub struct RecordingCleanupHook {
    cleaned: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingCleanupHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Identifiers seen so far, in call order.
    pub fn cleaned(&self) -> Vec<String> {
        self.cleaned.lock().unwrap().clone()
    }
}

impl WorkdirCleanupHook for RecordingCleanupHook {
    fn clean<'a>(&'a self, identifier: &'a str) -> HookFuture<'a> {
        self.cleaned.lock().unwrap().push(identifier.to_string());
        let result = if self.fail {
            Err(DispatchError::WorkdirCleanupError(format!(
                "refusing to clean {identifier}"
            )))
        } else {
            Ok(())
        };
        Box::pin(async move { result })
    }
}
