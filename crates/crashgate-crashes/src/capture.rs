//! Capture hook
//!
//! Installs a panic hook that turns the in-flight panic into a persisted
//! report on the failing thread, then chains to the hook that was installed
//! before it so default behavior (stderr output, abort under
//! `panic = "abort"`) is preserved.
//!
//! Every panic reaching the hook is recorded as a fatal crash by default,
//! including panics a thread boundary or `catch_unwind` later contains.
//! [`CaptureScope::MainThread`] narrows capture to panics that end the
//! process.
//!
//! The hook touches nothing but the filesystem: it never talks to the
//! worker and takes no lock shared with the rest of the pipeline.

use std::any::Any;
use std::cell::Cell;
use std::error::Error;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crashgate_core::codec::{self, CaptureContext};
use crashgate_core::domain::{Failure, ReportId, StackFrame, ThreadInfo};
use crashgate_storage::ErrorStorage;

use crate::backtrace;
use crate::error::Result;

thread_local! {
    /// Set on threads whose panics must not become reports (the worker)
    static CAPTURE_SUPPRESSED: Cell<bool> = const { Cell::new(false) };
    /// Set while this thread is inside the hook
    static IN_CAPTURE: Cell<bool> = const { Cell::new(false) };
}

/// Stops panics on the current thread from being captured.
pub fn suppress_capture_on_current_thread() {
    CAPTURE_SUPPRESSED.with(|flag| flag.set(true));
}

fn capture_suppressed() -> bool {
    CAPTURE_SUPPRESSED.with(Cell::get)
}

/// Marks the thread as capturing; `None` when it already is.
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter() -> Option<Self> {
        IN_CAPTURE.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ReentrancyGuard)
            }
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_CAPTURE.with(|flag| flag.set(false));
    }
}

/// Which panics the capture hook turns into reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureScope {
    /// Panics on any thread, whether or not they are later caught
    #[default]
    AllThreads,
    /// Panics on the `main` thread only, unless every panic aborts
    MainThread,
}

impl CaptureScope {
    /// Whether a panic on a thread with this name is captured
    pub fn captures(self, thread_name: Option<&str>) -> bool {
        match self {
            CaptureScope::AllThreads => true,
            CaptureScope::MainThread => cfg!(panic = "abort") || thread_name == Some("main"),
        }
    }
}

/// Persists fatal failures of the current process
#[derive(Debug)]
pub struct CaptureHook {
    storage: Arc<ErrorStorage>,
    context: CaptureContext,
    scope: CaptureScope,
}

impl CaptureHook {
    pub fn new(storage: Arc<ErrorStorage>, context: CaptureContext) -> Self {
        Self {
            storage,
            context,
            scope: CaptureScope::default(),
        }
    }

    pub fn with_scope(mut self, scope: CaptureScope) -> Self {
        self.scope = scope;
        self
    }

    /// Encodes and persists a failure raised on `thread`.
    ///
    /// The managed log is written atomically; the raw failure is best-effort.
    pub fn save_failure(&self, failure: &Failure, thread: &ThreadInfo) -> Result<ReportId> {
        let log = codec::encode(failure, thread, &self.context);
        self.storage.save_report(&log, failure)?;
        Ok(log.id)
    }

    /// Captures a panic on the calling thread.
    fn capture_panic(&self, payload: &(dyn Any + Send), location: Option<&Location<'_>>) {
        let frames = backtrace::capture_frames();
        let current = std::thread::current();
        let thread = ThreadInfo {
            id: format!("{:?}", current.id()),
            name: current.name().unwrap_or("<unnamed>").to_string(),
            frames: frames.clone(),
        };

        let mut stack = Vec::with_capacity(frames.len() + 1);
        if let Some(location) = location {
            stack.push(
                StackFrame::default()
                    .at(location.file(), location.line(), location.column())
                    .in_app(true),
            );
        }
        stack.extend(frames);
        let failure = failure_from_panic(payload).with_frames(stack);

        // A tracing subscriber may already be gone this late
        if let Err(e) = self.save_failure(&failure, &thread) {
            eprintln!("crashgate: failed to save crash report: {e}");
        }
    }

    /// Installs this hook as the process panic hook, chaining the current one.
    pub fn install(self: Arc<Self>) -> HookRegistration {
        let active = Arc::new(AtomicBool::new(true));
        let previous = Arc::new(std::panic::take_hook());

        let hook_active = Arc::clone(&active);
        let chained = Arc::clone(&previous);
        std::panic::set_hook(Box::new(move |panic_info| {
            let in_scope = self.scope.captures(std::thread::current().name());
            if hook_active.load(Ordering::SeqCst) && in_scope && !capture_suppressed() {
                if let Some(_guard) = ReentrancyGuard::enter() {
                    self.capture_panic(panic_info.payload(), panic_info.location());
                }
            }
            chained(panic_info);
        }));

        HookRegistration {
            active,
            restore: Some(Box::new(move || {
                drop(std::panic::take_hook());
                std::panic::set_hook(Box::new(move |panic_info| previous(panic_info)));
            })),
        }
    }
}

/// An installed capture hook; uninstalling restores the previous hook.
pub struct HookRegistration {
    active: Arc<AtomicBool>,
    restore: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl HookRegistration {
    /// Whether the hook still captures panics
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stops capturing and reinstalls the hook that was replaced.
    ///
    /// A hook installed on top of this one after the fact is replaced too.
    pub fn uninstall(mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Panic payloads
// ---------------------------------------------------------------------------

/// Converts a panic payload into a failure.
///
/// String payloads become a `panic` failure. A boxed error payload
/// (`std::panic::panic_any(Box<dyn Error + Send + Sync>)`) keeps its type
/// and `source()` chain under a `panic` failure.
pub fn failure_from_panic(payload: &(dyn Any + Send)) -> Failure {
    if let Some(error) = payload.downcast_ref::<Box<dyn Error + Send + Sync>>() {
        let inner: &(dyn Error + 'static) = error.as_ref();
        return Failure::panic(error.to_string()).caused_by(Failure::from_error(inner));
    }
    Failure::panic(panic_message(payload))
}

/// Text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<Box<dyn Error + Send + Sync>>() {
        e.to_string()
    } else {
        "Unknown panic".to_string()
    }
}
