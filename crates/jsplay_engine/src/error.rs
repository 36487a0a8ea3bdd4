use jsplay_executor::SandboxError;
use thiserror::Error;

/// Failures of the engine itself. Errors in user code are reported in
/// [`ExecutionResult`](crate::ExecutionResult), never here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("Auto-run needs a tokio runtime")]
    NoRuntime,
}
