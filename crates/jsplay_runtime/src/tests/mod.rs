//! Tests for the jsplay sandbox extension
//!
//! These spin up a bare `JsRuntime` with the extension and drive the job
//! harness directly, without the executor's thread or watchdog.
