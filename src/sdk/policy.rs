/**
 * ============================================================================
 * FAULT BOUNDARY MODULE
 * ============================================================================
 *
 * PURPOSE: Keep tracking failures out of the host application
 *
 * POLICIES:
 * - Strict (debug): log the failure and return it to the caller
 * - Lenient (production): log a warning and swallow it
 *
 * Panics raised inside the boundary are caught and treated like errors.
 *
 * ============================================================================
 */

use crate::sdk::types::TrackerError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Strict,
    Lenient,
}

impl ErrorPolicy {
    pub fn from_debug(debug: bool) -> Self {
        if debug {
            ErrorPolicy::Strict
        } else {
            ErrorPolicy::Lenient
        }
    }

    pub fn is_strict(&self) -> bool {
        *self == ErrorPolicy::Strict
    }

    /**
     * Run `f` inside the boundary
     * `context` names the operation in log output
     */
    pub fn run<F>(&self, context: &str, f: F) -> Result<(), TrackerError>
    where
        F: FnOnce() -> Result<(), TrackerError>,
    {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => Err(TrackerError::Panicked(panic_message(payload.as_ref()))),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(e) => self.handle(context, e),
        }
    }

    /**
     * Apply the policy to an error raised outside `run`
     */
    pub fn handle(&self, context: &str, error: TrackerError) -> Result<(), TrackerError> {
        match self {
            ErrorPolicy::Strict => {
                log::error!("[Tracker SDK Error] {}: {}", context, error);
                Err(error)
            }
            ErrorPolicy::Lenient => {
                log::warn!("[Tracker SDK] Suppressed error in {}: {}", context, error);
                Ok(())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
