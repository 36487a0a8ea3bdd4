//! Error types surfaced to sandboxed JavaScript by the jsplay ops

/// Error type for the capability ops
#[derive(Debug, thiserror::Error)]
pub enum RuntimeOpError {
    /// The console shim passed a method name the recorder does not know
    #[error("Unsupported console method: {0}")]
    ConsoleMethod(String),
    /// Network access outside the allow-list
    #[error("Network access to host '{0}' is not allowed")]
    HostNotAllowed(String),
    /// Request construction, transport or body errors
    #[error("Fetch failed: {0}")]
    Fetch(String),
}

crate::impl_js_error_class!(RuntimeOpError);
