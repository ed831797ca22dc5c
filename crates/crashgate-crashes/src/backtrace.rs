//! Backtrace capture and parsing for Rust panics.

use std::backtrace::Backtrace;

use crashgate_core::domain::StackFrame;
use rustc_demangle::demangle;

/// Capture the current thread's stack as frames.
///
/// Frames of the capture machinery and the panic runtime are dropped, so the
/// first frame is the code that panicked.
pub fn capture_frames() -> Vec<StackFrame> {
    let backtrace = Backtrace::force_capture();
    trim_panic_frames(parse_backtrace_string(&format!("{:#}", backtrace)))
}

/// Parse `Backtrace` display output into frames.
///
/// The format is a numbered symbol line (`  3: my_app::run`) optionally
/// followed by a location line (`at ./src/main.rs:10:5`).
pub fn parse_backtrace_string(bt_string: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in bt_string.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                apply_location(frame, location);
            }
            continue;
        }

        if let Some(frame) = parse_frame_line(line) {
            frames.push(frame);
        }
    }

    frames
}

/// Parse a single symbol line into a frame.
fn parse_frame_line(line: &str) -> Option<StackFrame> {
    let function_part = match line.split_once(':') {
        Some((prefix, rest)) if prefix.trim().parse::<u32>().is_ok() => rest.trim(),
        _ => line,
    };

    if function_part.is_empty() {
        return None;
    }

    // `{:#}` drops the trailing hash of legacy-mangled symbols
    let demangled = format!("{:#}", demangle(function_part));
    let in_app = is_in_app_frame(&demangled);
    Some(StackFrame::function(demangled).in_app(in_app))
}

/// Apply `file:line:col` to a frame. File paths may themselves hold colons.
fn apply_location(frame: &mut StackFrame, location: &str) {
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next().and_then(|c| c.parse::<u32>().ok());
    let line = parts.next().and_then(|l| l.parse::<u32>().ok());
    match (parts.next(), line, column) {
        (Some(file), Some(line), Some(column)) => {
            frame.file = Some(file.to_string());
            frame.line = Some(line);
            frame.column = Some(column);
        }
        _ => frame.file = Some(location.to_string()),
    }
}

/// Drop everything up to and including the last panic runtime frame.
pub fn trim_panic_frames(frames: Vec<StackFrame>) -> Vec<StackFrame> {
    let last_runtime = frames.iter().rposition(|frame| {
        frame.function.as_deref().is_some_and(|f| {
            f.contains("::panicking::") || f == "rust_begin_unwind" || f.starts_with("__rust_")
        })
    });
    match last_runtime {
        Some(idx) => frames.into_iter().skip(idx + 1).collect(),
        None => frames,
    }
}

/// Determine if a frame is from user application code vs standard library.
fn is_in_app_frame(function: &str) -> bool {
    const SYSTEM_PREFIXES: &[&str] = &[
        "std::",
        "core::",
        "alloc::",
        "<std::",
        "<core::",
        "<alloc::",
        "tokio::",
        "<tokio::",
        "tracing::",
        "<tracing::",
        "crashgate_crashes::",
        "panic_unwind::",
        "rust_begin_unwind",
        "rust_panic",
        "__rust_",
        "_rust_",
        "__libc_",
        "_start",
    ];

    const SYSTEM_CONTAINS: &[&str] = &[
        "::panic::",
        "::panicking::",
        "::rt::",
        "::sys_common::",
        "::backtrace::",
    ];

    !SYSTEM_PREFIXES.iter().any(|prefix| function.starts_with(prefix))
        && !SYSTEM_CONTAINS.iter().any(|needle| function.contains(needle))
}
