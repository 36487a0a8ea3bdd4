//! Deno ops backing the sandbox capabilities
//!
//! These are the only host entry points reachable from user code, and only
//! through the closures the bootstrap script captures before it removes
//! `Deno` from the global object.

use deno_core::OpState;
use deno_core::op2;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::error::RuntimeOpError;
use crate::fetch::{AllowedHosts, FetchOptions, FetchResponse};
use crate::harness::JsFailure;
use crate::recorder::{OutputKind, OutputRecorder, RecordOrigin};
use crate::render::{ArgDescriptor, line_hint_from_stack, render_args};

/// Upper bound for a single timer delay, matching browsers' 32-bit limit
const MAX_TIMER_DELAY_MS: u64 = 2_147_483_647;

/// Capture one console call
#[op2]
#[allow(clippy::needless_pass_by_value)]
pub(crate) fn op_jsplay_record(
    state: &mut OpState,
    #[string] kind: String,
    #[serde] args: Vec<ArgDescriptor>,
    #[string] stack: String,
) -> Result<bool, RuntimeOpError> {
    let kind = kind
        .parse::<OutputKind>()
        .map_err(|_| RuntimeOpError::ConsoleMethod(kind.clone()))?;
    let recorder = state.borrow_mut::<OutputRecorder>();
    Ok(recorder.record(
        kind,
        render_args(&args),
        line_hint_from_stack(&stack),
        RecordOrigin::Console,
    ))
}

/// Report an exception thrown outside the awaited body (timer callbacks)
#[op2]
pub(crate) fn op_jsplay_report_error(state: &mut OpState, #[serde] failure: JsFailure) -> bool {
    let line_hint = failure.stack.as_deref().and_then(line_hint_from_stack);
    let recorder = state.borrow_mut::<OutputRecorder>();
    recorder.record(
        OutputKind::Error,
        failure.to_content(),
        line_hint,
        RecordOrigin::Runtime,
    )
}

/// Timer primitive behind `setTimeout` / `setInterval`
#[op2(async)]
pub(crate) async fn op_jsplay_sleep(#[number] millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis.min(MAX_TIMER_DELAY_MS))).await;
}

/// Fetch with host-based permissions
#[op2(async)]
#[serde]
pub(crate) async fn op_jsplay_fetch(
    state: Rc<RefCell<OpState>>,
    #[string] url: String,
    #[serde] options: Option<FetchOptions>,
) -> Result<FetchResponse, RuntimeOpError> {
    let allowed_hosts = {
        let borrowed = state.borrow();
        borrowed.borrow::<AllowedHosts>().clone()
    };
    crate::fetch::fetch_with_permissions(url, options, &allowed_hosts).await
}
