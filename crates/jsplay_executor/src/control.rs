use std::sync::{Mutex, MutexGuard, PoisonError};

use deno_core::v8;
use jsplay_runtime::JobTicket;
use log::debug;
use tokio::sync::Notify;

/// Why a job stopped before settling on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TimedOut,
}

#[derive(Default)]
struct StopState {
    reason: Option<StopReason>,
    isolate: Option<v8::IsolateHandle>,
}

/// Shared handle used to stop a job from outside the executor thread.
///
/// Stopping closes the job's ticket first, so the recorder rejects anything
/// the job emits afterwards, then terminates the isolate if one is attached.
pub struct JobControl {
    ticket: JobTicket,
    state: Mutex<StopState>,
    stopped: Notify,
}

impl std::fmt::Debug for JobControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobControl")
            .field("job_id", &self.ticket.id())
            .field("stop_reason", &self.stop_reason())
            .finish_non_exhaustive()
    }
}

impl JobControl {
    pub fn new(ticket: JobTicket) -> Self {
        Self {
            ticket,
            state: Mutex::new(StopState::default()),
            stopped: Notify::new(),
        }
    }

    pub fn ticket(&self) -> &JobTicket {
        &self.ticket
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.lock().reason
    }

    /// Cooperative cancellation; a job that has not started yet never runs
    pub fn cancel(&self) {
        self.stop(StopReason::Cancelled);
    }

    /// Marks the job timed out; also used by a caller whose own deadline
    /// passed before the executor reported
    pub fn expire(&self) {
        self.stop(StopReason::TimedOut);
    }

    fn stop(&self, reason: StopReason) {
        let mut state = self.lock();
        if state.reason.is_some() {
            return;
        }
        debug!("stopping job {}: {reason:?}", self.ticket.id());
        state.reason = Some(reason);
        self.ticket.close();
        if let Some(isolate) = &state.isolate {
            isolate.terminate_execution();
        }
        self.stopped.notify_one();
    }

    /// Attaches the running isolate; returns `false` if the job was stopped
    /// before it started
    pub(crate) fn attach(&self, isolate: v8::IsolateHandle) -> bool {
        let mut state = self.lock();
        if state.reason.is_some() {
            return false;
        }
        state.isolate = Some(isolate);
        true
    }

    pub(crate) fn detach(&self) {
        self.lock().isolate = None;
    }

    /// Resolves once the job has been stopped
    pub(crate) async fn stopped(&self) {
        self.stopped.notified().await;
    }

    fn lock(&self) -> MutexGuard<'_, StopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
