//! Execution sandbox for playground jobs.
//!
//! [`SandboxExecutor`] owns a dedicated OS thread (V8 isolates cannot move
//! between threads) running a current-thread tokio runtime. Every job gets a
//! fresh `JsRuntime`, so nothing a snippet does survives into the next one.
//!
//! A job ends in exactly one [`JobOutcome`]. User-code failures are outcomes,
//! not errors: `Err` is reserved for the executor itself failing.
//!
//! ## Timeouts
//!
//! A watchdog thread waits for the configured timeout and then closes the
//! job's ticket and calls `terminate_execution` on the isolate, which also
//! interrupts synchronous loops such as `while (true) {}`. The job then reports
//! [`JobOutcome::TimedOut`] and a single timeout record is emitted.
//!
//! ```rust,no_run
//! use jsplay_executor::{JobRequest, SandboxConfig, SandboxExecutor};
//! use jsplay_runtime::JobTicket;
//!
//! # async fn example() -> jsplay_executor::Result<()> {
//! let executor = SandboxExecutor::new(SandboxConfig::default());
//! let handle = executor.execute(JobRequest::new("console.log(1 + 1)", JobTicket::standalone()))?;
//! let (records, report) = handle.collect().await?;
//! assert_eq!(records[0].content.to_text(), "2");
//! assert!(report.outcome.is_success());
//! # Ok(())
//! # }
//! ```

mod control;
mod executor;
mod job;

use std::time::Duration;

use jsplay_runtime::{ArgDescriptor, JobId, ScopeEntry};
use serde::Serialize;
use thiserror::Error;

pub use control::{JobControl, StopReason};
pub use executor::{JobHandle, JobRequest, SandboxExecutor};

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Wording of the synthetic record emitted when a job runs out of time
pub fn timeout_message(timeout: Duration) -> String {
    format!(
        "Execution stopped: code took too long ({}ms timeout)",
        timeout.as_millis()
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub timeout: Duration,
    pub max_records: usize,
    /// Echo a top-level `return` value as a `← value` log record
    pub report_return_value: bool,
    pub timers: bool,
    pub fetch: bool,
    pub allowed_hosts: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            max_records: 1_000,
            report_return_value: true,
            timers: true,
            fetch: false,
            allowed_hosts: vec![],
        }
    }
}

impl From<&jsplay_config::Config> for SandboxConfig {
    fn from(config: &jsplay_config::Config) -> Self {
        let execution = &config.execution;
        Self {
            timeout: Duration::from_millis(execution.timeout_ms),
            max_records: execution.max_records,
            report_return_value: execution.report_return_value,
            timers: execution.capabilities.timers,
            fetch: execution.capabilities.fetch,
            allowed_hosts: execution.capabilities.allowed_hosts.clone(),
        }
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        /// Top-level `return` value, if any
        #[serde(skip)]
        returned: Option<ArgDescriptor>,
        /// Values of the requested scope names; `None` if the body returned
        /// before they could be read
        #[serde(skip)]
        scope: Option<Vec<ScopeEntry>>,
    },
    SyntaxError {
        message: String,
    },
    RuntimeError {
        name: String,
        message: String,
        stack: Option<String>,
    },
    TimedOut,
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Description of the failure, as shown to the user
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Completed { .. } => None,
            Self::SyntaxError { message } => Some(format!("SyntaxError: {message}")),
            Self::RuntimeError { name, message, .. } => Some(format!("{name}: {message}")),
            Self::TimedOut => Some("Execution timed out".into()),
            Self::Cancelled => Some("Execution cancelled".into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub outcome: JobOutcome,
    /// Records published, including diagnostics and notices
    pub records_emitted: u64,
    pub truncated: bool,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Sandbox executor is not running")]
    Unavailable,

    #[error("Sandbox executor dropped the job before reporting")]
    Dropped,

    #[error("Failed to start JavaScript runtime: {0}")]
    Bootstrap(String),

    #[error("Unexpected harness result: {0}")]
    Harness(String),
}

#[cfg(test)]
mod tests;
