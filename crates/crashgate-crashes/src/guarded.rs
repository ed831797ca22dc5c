//! Isolation of application listener code

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::capture::panic_message;
use crate::error::{CrashesError, Result};

/// Runs listener code, turning a panic into [`CrashesError::ListenerPanicked`].
pub(crate) fn call_listener<R>(callback: &'static str, f: impl FnOnce() -> R) -> Result<R> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| CrashesError::ListenerPanicked {
        callback,
        message: panic_message(payload.as_ref()),
    })
}
