//! Integration tests for crashgate-crashes
//!
//! Drives whole pipelines against temporary storage roots, with a recording
//! delivery channel standing in for the real transport. Crashes of "earlier
//! processes" are simulated by writing reports to the root before a pipeline
//! is built on it.

mod common;

mod test_delivery;
mod test_last_session;
mod test_listener_reentry;
