//! Captured failure model
//!
//! A [`Failure`] is the in-memory form of whatever brought a thread down:
//! a panic, an error value with its `source()` chain, or the marker used for
//! crashes captured out of process as a minidump. It is what the codec turns
//! into a [`ManagedErrorLog`](super::error_log::ManagedErrorLog) and what the
//! raw `{id}.throwable` file stores for later reconstruction.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind used for failures produced by a Rust panic
pub const PANIC_KIND: &str = "panic";

/// Kind used for reports synthesized from a native minidump
pub const NATIVE_EXCEPTION_KIND: &str = "NativeException";

/// One frame of a captured stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Demangled function name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Module path (function name without its last segment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Source file, when debug info is available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Whether the frame belongs to application code rather than std/runtime
    #[serde(default)]
    pub in_app: bool,
}

impl StackFrame {
    /// Creates a frame for the given function name
    pub fn function(name: impl Into<String>) -> Self {
        let name = name.into();
        let module = name.rfind("::").map(|idx| name[..idx].to_string());
        Self {
            function: Some(name),
            module,
            ..Self::default()
        }
    }

    /// Sets the source location
    pub fn at(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Marks the frame as application code
    pub fn in_app(mut self, in_app: bool) -> Self {
        self.in_app = in_app;
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function.as_deref().unwrap_or("<unknown>"))?;
        if let Some(file) = &self.file {
            write!(f, " at {}", file)?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
        }
        Ok(())
    }
}

/// A captured failure and its chain of causes
///
/// The cause chain nests (`cause` holds the next failure), mirroring
/// `std::error::Error::source()`. Stored verbatim in the raw form, so a very
/// deep chain may be impossible to read back; the managed log is capped
/// independently by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Type of the failure (`panic`, an error type name, `NativeException`)
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<StackFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Failure>>,
}

impl Failure {
    /// Creates a failure with no frames and no cause
    pub fn new(kind: impl Into<String>, message: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            message,
            frames: Vec::new(),
            cause: None,
        }
    }

    /// Creates a panic failure with the given message
    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(PANIC_KIND, Some(message.into()))
    }

    /// Creates the marker failure for a crash captured as a native minidump
    pub fn native() -> Self {
        Self::new(
            NATIVE_EXCEPTION_KIND,
            Some("Native crash captured as a minidump".to_string()),
        )
    }

    /// Builds a failure chain from an error and its `source()` chain
    ///
    /// The error's `Debug` output up to the first `(`, `{` or space is used
    /// as the kind, which yields the variant or struct name for derived
    /// implementations.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let mut chain: Vec<Failure> = Vec::new();
        let mut current: Option<&(dyn Error + 'static)> = Some(error);
        while let Some(err) = current {
            chain.push(Self::new(error_kind(err), Some(err.to_string())));
            current = err.source();
        }

        // Fold from the innermost cause outwards
        let mut folded: Option<Failure> = None;
        while let Some(mut failure) = chain.pop() {
            failure.cause = folded.map(Box::new);
            folded = Some(failure);
        }
        folded.unwrap_or_else(|| Self::new("error", None))
    }

    /// Replaces the frames of this (outermost) failure
    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Appends `cause` at the end of this failure's chain
    pub fn caused_by(mut self, cause: Failure) -> Self {
        {
            let mut slot = &mut self.cause;
            while let Some(next) = slot {
                slot = &mut next.cause;
            }
            *slot = Some(Box::new(cause));
        }
        self
    }

    /// Returns true for the minidump marker failure
    pub fn is_native(&self) -> bool {
        self.kind == NATIVE_EXCEPTION_KIND
    }

    /// Iterates over this failure and all of its causes, outermost first
    pub fn chain(&self) -> Chain<'_> {
        Chain {
            next: Some(self),
        }
    }

    /// Number of failures in the chain, including this one
    pub fn chain_len(&self) -> usize {
        self.chain().count()
    }
}

impl Drop for Failure {
    // Unlink the chain iteratively so dropping a very deep chain cannot
    // overflow the stack.
    fn drop(&mut self) {
        let mut next = self.cause.take();
        while let Some(mut failure) = next {
            next = failure.cause.take();
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Iterator over a failure chain
pub struct Chain<'a> {
    next: Option<&'a Failure>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Failure;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.cause.as_deref();
        Some(current)
    }
}

fn error_kind(error: &dyn Error) -> String {
    let debug = format!("{:?}", error);
    let end = debug
        .find(|c: char| c == '(' || c == '{' || c.is_whitespace())
        .unwrap_or(debug.len());
    let kind = debug[..end].trim();
    if kind.is_empty() || kind.starts_with('"') {
        "error".to_string()
    } else {
        kind.to_string()
    }
}
