use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use deno_core::{JsRuntime, PollEventLoopOptions, RuntimeOptions, v8};
use ::jsplay_runtime::harness::{harness_script, scope_epilogue};
use ::jsplay_runtime::render::{line_hint_from_stack, render_return};
use ::jsplay_runtime::{
    AllowedHosts, HarnessOptions, HarnessOutcome, JobTicket, OutputKind, OutputRecord,
    OutputRecorder, RecordOrigin, RenderedContent, jsplay_runtime,
};
use log::{debug, trace, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::control::{JobControl, StopReason};
use crate::executor::JobRequest;
use crate::{JobOutcome, JobReport, Result, SandboxConfig, SandboxError, timeout_message};

const JOB_SCRIPT_NAME: &str = "<jsplay:job>";

/// What deno_core reports when the body awaits something nothing will settle
const PENDING_PROMISE_MARKER: &str = "still pending";

fn create_runtime(recorder: OutputRecorder, allowed_hosts: AllowedHosts) -> Result<JsRuntime> {
    JsRuntime::try_new(RuntimeOptions {
        extensions: vec![jsplay_runtime::init(recorder, allowed_hosts)],
        ..Default::default()
    })
    .map_err(|e| SandboxError::Bootstrap(e.to_string()))
}

fn with_recorder<R>(runtime: &mut JsRuntime, f: impl FnOnce(&mut OutputRecorder) -> R) -> R {
    let state = runtime.op_state();
    let mut state = state.borrow_mut();
    f(state.borrow_mut::<OutputRecorder>())
}

fn read_outcome(runtime: &mut JsRuntime, value: &v8::Global<v8::Value>) -> Result<HarnessOutcome> {
    deno_core::scope!(scope, runtime);
    let local = v8::Local::new(scope, value);
    deno_core::serde_v8::from_v8::<HarnessOutcome>(scope, local)
        .map_err(|e| SandboxError::Harness(e.to_string()))
}

/// Terminates the isolate once `timeout` elapses unless told to stand down
fn spawn_watchdog(
    control: Arc<JobControl>,
    timeout: Duration,
) -> (std::sync::mpsc::Sender<()>, std::thread::JoinHandle<()>) {
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();
    let watchdog = std::thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
            control.expire();
        }
    });
    (cancel_tx, watchdog)
}

/// Runs one job to its outcome on the current (executor) thread
pub(crate) async fn run_job(
    config: &SandboxConfig,
    request: JobRequest,
    control: &Arc<JobControl>,
    sink: UnboundedSender<OutputRecord>,
) -> Result<JobReport> {
    let started = Instant::now();
    let job_id = request.ticket.id();

    if control.stop_reason().is_some() || !request.ticket.is_live() {
        debug!("job {job_id} was cancelled before it started");
        return Ok(JobReport {
            job_id,
            outcome: JobOutcome::Cancelled,
            records_emitted: 0,
            truncated: false,
            elapsed: started.elapsed(),
        });
    }

    let recorder = OutputRecorder::new(request.ticket.clone(), config.max_records, sink);
    let allowed_hosts = AllowedHosts::new(Some(config.allowed_hosts.clone()));
    let mut runtime = create_runtime(recorder, allowed_hosts)?;

    let options = HarnessOptions {
        timers: config.timers,
        fetch: config.fetch,
        compile_only: false,
        epilogue: scope_epilogue(request.scope_names.iter().map(String::as_str)),
    };
    let script =
        harness_script(&request.source, &options).map_err(|e| SandboxError::Harness(e.to_string()))?;

    if !control.attach(runtime.v8_isolate().thread_safe_handle()) {
        debug!("job {job_id} was cancelled while its runtime started");
    }
    let (cancel_watchdog, watchdog) = spawn_watchdog(Arc::clone(control), config.timeout);

    debug!("job {job_id} running");
    let settled = if control.stop_reason().is_some() {
        None
    } else {
        match runtime.execute_script(JOB_SCRIPT_NAME, script) {
            Ok(promise) => {
                let resolve = runtime.resolve(promise);
                let waiting = runtime.with_event_loop_promise(resolve, PollEventLoopOptions::default());
                tokio::select! {
                    result = tokio::time::timeout(config.timeout, waiting) => match result {
                        Ok(settled) => Some(settled.map_err(|e| e.to_string())),
                        Err(_) => {
                            control.expire();
                            None
                        }
                    },
                    () = control.stopped() => None,
                }
            }
            Err(e) => Some(Err(e.to_string())),
        }
    };

    // the watchdog must be gone before the isolate is dropped
    control.detach();
    let _ = cancel_watchdog.send(());
    let _ = watchdog.join();

    let outcome = match (control.stop_reason(), settled) {
        (Some(StopReason::TimedOut), _) => {
            warn!("job {job_id} timed out after {}ms", config.timeout.as_millis());
            with_recorder(&mut runtime, |recorder| {
                recorder.record_timeout(RenderedContent::Text(timeout_message(config.timeout)))
            });
            JobOutcome::TimedOut
        }
        (Some(StopReason::Cancelled), _) | (None, None) => JobOutcome::Cancelled,
        (None, Some(Ok(value))) => {
            let harness_outcome = read_outcome(&mut runtime, &value)?;
            settle(config, &mut runtime, harness_outcome)
        }
        (None, Some(Err(message))) => {
            let message = if message.contains(PENDING_PROMISE_MARKER) {
                "Promise never settled and no timers or requests are pending".to_string()
            } else {
                message
            };
            with_recorder(&mut runtime, |recorder| {
                recorder.record_diagnostic(
                    OutputKind::Error,
                    RenderedContent::Text(format!("Error: {message}")),
                    None,
                    RecordOrigin::Runtime,
                )
            });
            JobOutcome::RuntimeError {
                name: "Error".into(),
                message,
                stack: None,
            }
        }
    };

    let (records_emitted, truncated) =
        with_recorder(&mut runtime, |recorder| (recorder.emitted(), recorder.is_truncated()));
    let elapsed = started.elapsed();
    debug!(
        "job {job_id} finished in {}ms: {outcome:?}, {records_emitted} records",
        elapsed.as_millis()
    );

    Ok(JobReport {
        job_id,
        outcome,
        records_emitted,
        truncated,
        elapsed,
    })
}

/// Turns the harness result into an outcome, emitting its diagnostic record
fn settle(config: &SandboxConfig, runtime: &mut JsRuntime, outcome: HarnessOutcome) -> JobOutcome {
    match outcome {
        HarnessOutcome::Completed { returned, scope } => {
            if config.report_return_value
                && let Some(value) = returned.as_ref().filter(|v| !v.is_undefined())
            {
                with_recorder(runtime, |recorder| {
                    recorder.record_diagnostic(
                        OutputKind::Log,
                        render_return(value),
                        None,
                        RecordOrigin::ReturnValue,
                    )
                });
            }
            JobOutcome::Completed { returned, scope }
        }
        HarnessOutcome::Compiled => JobOutcome::Completed {
            returned: None,
            scope: None,
        },
        HarnessOutcome::Syntax { error } => {
            trace!("syntax error: {}", error.message);
            with_recorder(runtime, |recorder| {
                recorder.record_diagnostic(
                    OutputKind::Error,
                    error.to_content(),
                    None,
                    RecordOrigin::Syntax,
                )
            });
            JobOutcome::SyntaxError {
                message: error.message,
            }
        }
        HarnessOutcome::Thrown { error } => {
            let line_hint = error.stack.as_deref().and_then(line_hint_from_stack);
            with_recorder(runtime, |recorder| {
                recorder.record_diagnostic(
                    OutputKind::Error,
                    error.to_content(),
                    line_hint,
                    RecordOrigin::Runtime,
                )
            });
            JobOutcome::RuntimeError {
                name: error.name,
                message: error.message,
                stack: error.stack,
            }
        }
    }
}

/// Compiles `source` in a throwaway runtime without running it
pub(crate) async fn check_syntax(source: &str) -> Result<Option<String>> {
    let (sink, _discarded) = tokio::sync::mpsc::unbounded_channel();
    let recorder = OutputRecorder::new(JobTicket::standalone(), 0, sink);
    let mut runtime = create_runtime(recorder, AllowedHosts::default())?;

    let options = HarnessOptions {
        compile_only: true,
        ..Default::default()
    };
    let script =
        harness_script(source, &options).map_err(|e| SandboxError::Harness(e.to_string()))?;
    let promise = runtime
        .execute_script(JOB_SCRIPT_NAME, script)
        .map_err(|e| SandboxError::Harness(e.to_string()))?;
    let resolve = runtime.resolve(promise);
    let value = runtime
        .with_event_loop_promise(resolve, PollEventLoopOptions::default())
        .await
        .map_err(|e| SandboxError::Harness(e.to_string()))?;

    match read_outcome(&mut runtime, &value)? {
        HarnessOutcome::Syntax { error } => Ok(Some(error.message)),
        _ => Ok(None),
    }
}
