//! # jsplay runtime
//!
//! A `deno_core` extension that turns a bare V8 realm into the playground
//! sandbox.
//!
//! ## Overview
//!
//! The extension's bootstrap (`runtime.js`) runs before any user code and:
//! - captures the host ops in closures, then deletes `Deno`, the ambient
//!   `console`, timers and `fetch` from the global object
//! - installs a one-shot harness (see [`harness`]) that compiles the user's
//!   source with the `AsyncFunction` constructor, so top-level `return` and
//!   `await` are legal and the only reachable host bindings are its parameters
//!
//! The parameters are a fabricated `console` (always), and optionally timers
//! and an allow-listed `fetch`.
//!
//! ## Console capturing
//!
//! Every `console.log/info/warn/error` call becomes an [`OutputRecord`] in the
//! [`OutputRecorder`] held in the runtime's `OpState`. Arguments are described
//! in JavaScript and rendered in Rust ([`render`]), so formatting never
//! throws. Records are sent on a channel the moment they are accepted.
//!
//! ```rust,no_run
//! use deno_core::{JsRuntime, RuntimeOptions};
//! use jsplay_runtime::{AllowedHosts, JobTicket, OutputRecorder, jsplay_runtime};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
//! let recorder = OutputRecorder::new(JobTicket::standalone(), 1_000, tx);
//!
//! let mut runtime = JsRuntime::new(RuntimeOptions {
//!     extensions: vec![jsplay_runtime::init(recorder, AllowedHosts::default())],
//!     ..Default::default()
//! });
//! runtime.execute_script("<check>", "typeof globalThis.Deno")?;
//! # Ok(())
//! # }
//! ```

mod error;
mod fetch;
pub mod harness;
mod js_error_impl;
mod ops;
pub mod recorder;
pub mod render;

#[cfg(test)]
mod tests;

pub use error::RuntimeOpError;
pub use fetch::AllowedHosts;
pub use harness::{HarnessOptions, HarnessOutcome, JsFailure, ScopeEntry};
pub use recorder::{JobId, JobTicket, OutputKind, OutputRecord, OutputRecorder, RecordOrigin};
pub use render::{ArgDescriptor, RenderedContent};

// Sandbox extension: console recorder, timers and fetch.
// Initialize with the job's OutputRecorder and the fetch allow-list.
deno_core::extension!(
    jsplay_runtime,
    ops = [
        ops::op_jsplay_record,
        ops::op_jsplay_report_error,
        ops::op_jsplay_sleep,
        ops::op_jsplay_fetch,
    ],
    esm_entry_point = "ext:jsplay_runtime/runtime.js",
    esm = [ dir "src", "runtime.js" ],
    options = {
        recorder: OutputRecorder,
        allowed_hosts: AllowedHosts,
    },
    state = |state, options| {
        state.put(options.recorder);
        state.put(options.allowed_hosts);
    },
);
