//! The playground session: one runner instance owning the reconciler, the
//! persistent scope and the cache gate, wired to a [`SandboxExecutor`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jsplay_executor::{
    JobControl, JobHandle, JobOutcome, JobRequest, SandboxConfig, SandboxError, SandboxExecutor,
    timeout_message,
};
use jsplay_runtime::{JobId, JobTicket, OutputKind, OutputRecord, RecordOrigin, RenderedContent};
use log::{debug, trace, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::autorun::AutoRunScheduler;
use crate::cache::{CacheGate, CacheOptions, CacheStats, Decision};
use crate::classify::classify;
use crate::preprocess::{HeuristicSplitter, SourceStatement, StatementSplitter};
use crate::reconcile::{LineReconciler, OutputSlot, PersistentScope, SlotKey};
use crate::{EngineError, Trigger};

pub const NO_OUTPUT_NOTICE: &str = "Code executed successfully (no output)";

/// Extra time the runner waits past the sandbox timeout before it stops
/// waiting on its own
const DEFAULT_DEADLINE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct PlaygroundOptions {
    pub sandbox: SandboxConfig,
    pub cache: CacheOptions,
    pub auto_run: bool,
    pub debounce: Duration,
    pub deadline_grace: Duration,
}

impl Default for PlaygroundOptions {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            cache: CacheOptions::default(),
            auto_run: false,
            debounce: Duration::from_millis(1_000),
            deadline_grace: DEFAULT_DEADLINE_GRACE,
        }
    }
}

impl From<&jsplay_config::Config> for PlaygroundOptions {
    fn from(config: &jsplay_config::Config) -> Self {
        Self {
            sandbox: SandboxConfig::from(config),
            cache: CacheOptions::from(&config.cache),
            auto_run: config.auto_run.enabled,
            debounce: Duration::from_millis(config.auto_run.debounce_ms),
            deadline_grace: DEFAULT_DEADLINE_GRACE,
        }
    }
}

/// One line of the console model handed to the display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleLine {
    pub slot_key: SlotKey,
    pub line: u32,
    pub kind: OutputKind,
    pub content: RenderedContent,
    pub timestamp: String,
}

impl From<&OutputSlot> for ConsoleLine {
    fn from(slot: &OutputSlot) -> Self {
        Self {
            slot_key: slot.key,
            line: slot.line,
            kind: slot.kind,
            content: slot.content.clone(),
            timestamp: slot.timestamp.clone(),
        }
    }
}

/// The display collaborator. The engine never renders anything itself.
pub trait ConsoleSink: Send + Sync {
    /// Replaces the displayed console with `lines`, ordered by line
    fn render(&self, lines: &[ConsoleLine]);

    /// Transient message that is not attached to any statement
    fn notice(&self, kind: OutputKind, message: &str);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ConsoleSink for NullSink {
    fn render(&self, _lines: &[ConsoleLine]) {}
    fn notice(&self, _kind: OutputKind, _message: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    Running { job_id: JobId, trigger: Trigger },
}

/// How the last job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    TimedOut,
    Cancelled,
    Errored,
}

impl From<&JobOutcome> for JobStatus {
    fn from(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed { .. } => Self::Completed,
            JobOutcome::TimedOut => Self::TimedOut,
            JobOutcome::Cancelled => Self::Cancelled,
            JobOutcome::SyntaxError { .. } | JobOutcome::RuntimeError { .. } => Self::Errored,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// `None` when nothing was executed
    pub job_id: Option<JobId>,
    pub success: bool,
    pub status: Option<JobStatus>,
    pub output_slots: Vec<OutputSlot>,
    pub error: Option<String>,
    /// Cache gate verdict for this run
    pub decision: Option<Decision>,
    /// Every record the job produced, in emission order
    #[serde(skip)]
    pub records: Vec<OutputRecord>,
}

impl ExecutionResult {
    fn not_executed(output_slots: Vec<OutputSlot>, decision: Option<Decision>) -> Self {
        Self {
            job_id: None,
            success: true,
            status: None,
            output_slots,
            error: None,
            decision,
            records: vec![],
        }
    }

    pub fn executed(&self) -> bool {
        self.job_id.is_some()
    }
}

struct Session {
    reconciler: LineReconciler,
    scope: PersistentScope,
    gate: CacheGate,
    state: RunnerState,
    last_status: Option<JobStatus>,
    last_decision: Option<Decision>,
    current: Option<Arc<JobControl>>,
}

struct Inner {
    executor: SandboxExecutor,
    splitter: Arc<dyn StatementSplitter>,
    sink: Arc<dyn ConsoleSink>,
    latest: Arc<AtomicU64>,
    deadline_grace: Duration,
    autorun: AutoRunScheduler,
    session: Mutex<Session>,
}

/// Handle to a playground session. Clones share the session.
#[derive(Clone)]
pub struct Playground {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Playground {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playground")
            .field("executor", &self.inner.executor)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Playground {
    pub fn new(options: PlaygroundOptions, sink: Arc<dyn ConsoleSink>) -> Self {
        Self::with_splitter(options, sink, Arc::new(HeuristicSplitter))
    }

    pub fn with_splitter(
        options: PlaygroundOptions,
        sink: Arc<dyn ConsoleSink>,
        splitter: Arc<dyn StatementSplitter>,
    ) -> Self {
        let session = Session {
            reconciler: LineReconciler::new(),
            scope: PersistentScope::new(),
            gate: CacheGate::new(options.cache),
            state: RunnerState::Idle,
            last_status: None,
            last_decision: None,
            current: None,
        };

        Self {
            inner: Arc::new(Inner {
                executor: SandboxExecutor::new(options.sandbox),
                splitter,
                sink,
                latest: Arc::new(AtomicU64::new(0)),
                deadline_grace: options.deadline_grace,
                autorun: AutoRunScheduler::new(options.auto_run, options.debounce),
                session: Mutex::new(session),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn sink(&self) -> &dyn ConsoleSink {
        self.inner.sink.as_ref()
    }

    pub(crate) fn executor(&self) -> &SandboxExecutor {
        &self.inner.executor
    }

    /// Runs `source` and reconciles its output.
    ///
    /// Failures of the user's code are reported in the result. An `Err` means
    /// the sandbox itself is unusable.
    ///
    /// # Errors
    ///
    /// Fails if the executor thread is gone or dropped the job
    pub async fn run(&self, source: &str, trigger: Trigger) -> Result<ExecutionResult, EngineError> {
        if source.trim().is_empty() {
            debug!("empty source, clearing output and scope");
            {
                let mut session = self.lock();
                self.supersede(&mut session);
                session.reconciler.clear();
                session.scope.clear();
            }
            self.sink().render(&[]);
            return Ok(ExecutionResult::not_executed(vec![], None));
        }

        let statements = self.inner.splitter.split(source);
        let categories = classify(source);
        if !categories.is_empty() {
            debug!(
                "non-deterministic constructs: {}",
                categories.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
            );
        }

        let (handle, decision, notice) = {
            let mut session = self.lock();
            let decision = session.gate.decide(source, trigger, Instant::now());
            session.last_decision = Some(decision.clone());
            let notice = (trigger == Trigger::Auto && session.gate.smart_mode()).then(|| decision.notice());

            if !decision.should_execute {
                debug!("skipping execution: {}", decision.reason);
                self.supersede(&mut session);
                let snapshot = decision
                    .fingerprint
                    .as_deref()
                    .and_then(|key| session.gate.get(key))
                    .map(|entry| entry.output_snapshot.clone());
                if let Some(snapshot) = snapshot {
                    session.reconciler.reconcile(&statements, &snapshot);
                }
                let slots = session.reconciler.slots();
                drop(session);
                if let Some(notice) = &notice {
                    self.sink().notice(OutputKind::Info, notice);
                }
                self.render(&slots);
                return Ok(ExecutionResult::not_executed(slots, Some(decision)));
            }

            self.supersede(&mut session);

            let ticket = JobTicket::issue(&self.inner.latest);
            let request = JobRequest::new(source, ticket)
                .with_scope_names(PersistentScope::declared_names(&statements));
            let handle = match self.inner.executor.execute(request) {
                Ok(handle) => handle,
                Err(e) => {
                    session.state = RunnerState::Idle;
                    return Err(e.into());
                }
            };
            session.current = Some(Arc::clone(&handle.control));
            session.state = RunnerState::Running {
                job_id: handle.id,
                trigger,
            };
            debug!("runner: idle -> running job {} ({trigger})", handle.id);
            (handle, decision, notice)
        };

        if let Some(notice) = &notice {
            self.sink().notice(OutputKind::Info, notice);
        }

        self.await_job(handle, source, &statements, trigger, Some(decision))
            .await
    }

    async fn await_job(
        &self,
        mut handle: JobHandle,
        source: &str,
        statements: &[SourceStatement],
        trigger: Trigger,
        decision: Option<Decision>,
    ) -> Result<ExecutionResult, EngineError> {
        let job_id = handle.id;
        let control = Arc::clone(&handle.control);
        let timeout = self.inner.executor.config().timeout;
        let deadline = tokio::time::sleep(timeout + self.inner.deadline_grace);
        tokio::pin!(deadline);

        let mut records: Vec<OutputRecord> = vec![];
        let reported = loop {
            tokio::select! {
                Some(record) = handle.records.recv() => {
                    trace!("job {job_id} record {}", record.sequence);
                    records.push(record);
                    if control.ticket().is_live() {
                        let preview = self.lock().reconciler.preview(statements, &records);
                        self.render(&preview);
                    }
                }
                report = &mut handle.report => break Some(report),
                () = &mut deadline => break None,
            }
        };
        while let Ok(record) = handle.records.try_recv() {
            records.push(record);
        }

        let outcome = match reported {
            Some(Ok(Ok(report))) => report.outcome,
            Some(Ok(Err(e))) => return Err(self.abandon(job_id, e)),
            Some(Err(_)) => return Err(self.abandon(job_id, SandboxError::Dropped)),
            None => {
                warn!("job {job_id} missed its deadline, no longer waiting for it");
                control.expire();
                if !records.iter().any(|r| r.origin == RecordOrigin::Timeout) {
                    let sequence = records.last().map_or(0, |r| r.sequence + 1);
                    records.push(OutputRecord::new(
                        OutputKind::Error,
                        RenderedContent::Text(timeout_message(timeout)),
                        sequence,
                        None,
                        RecordOrigin::Timeout,
                    ));
                }
                JobOutcome::TimedOut
            }
        };

        let status = JobStatus::from(&outcome);
        let mut result = ExecutionResult {
            job_id: Some(job_id),
            success: outcome.is_success(),
            status: Some(status),
            output_slots: vec![],
            error: outcome.error_message(),
            decision,
            records: vec![],
        };

        // check, then commit: a superseded job leaves no trace
        let mut session = self.lock();
        if control.ticket().is_superseded() {
            debug!("job {job_id} was superseded, discarding its {} records", records.len());
            result.success = false;
            result.status = Some(JobStatus::Cancelled);
            result.error = JobOutcome::Cancelled.error_message();
            return Ok(result);
        }

        session.current = None;
        session.state = RunnerState::Idle;
        session.last_status = Some(status);
        debug!("runner: job {job_id} -> {status:?} -> idle");

        if status == JobStatus::Cancelled {
            result.output_slots = session.reconciler.slots();
            let slots = result.output_slots.clone();
            drop(session);
            self.render(&slots);
            return Ok(result);
        }

        session.reconciler.reconcile(statements, &records);
        session.scope.retain_declared(statements);
        if let JobOutcome::Completed { scope: Some(entries), .. } = &outcome {
            session.scope.commit(entries, statements);
        }
        session
            .gate
            .record(source, records.clone(), trigger, Instant::now());

        result.output_slots = session.reconciler.slots();
        drop(session);

        self.render(&result.output_slots);
        if trigger == Trigger::Manual && records.is_empty() && status == JobStatus::Completed {
            self.sink().notice(OutputKind::Info, NO_OUTPUT_NOTICE);
        }

        result.records = records;
        Ok(result)
    }

    /// Stops the in-flight job and invalidates its ticket, so nothing it
    /// reports later is committed or shown
    fn supersede(&self, session: &mut Session) {
        if let Some(previous) = session.current.take() {
            debug!("superseding job {}", previous.ticket().id());
            previous.cancel();
            self.inner.latest.fetch_add(1, Ordering::SeqCst);
            session.state = RunnerState::Idle;
        }
    }

    /// Returns the runner to idle after the executor failed
    fn abandon(&self, job_id: JobId, error: SandboxError) -> EngineError {
        warn!("job {job_id} failed in the executor: {error}");
        let mut session = self.lock();
        if session
            .current
            .as_ref()
            .is_some_and(|c| c.ticket().id() == job_id)
        {
            session.current = None;
            session.state = RunnerState::Idle;
            session.last_status = Some(JobStatus::Errored);
        }
        error.into()
    }

    fn render(&self, slots: &[OutputSlot]) {
        let lines = slots.iter().map(ConsoleLine::from).collect::<Vec<_>>();
        self.sink().render(&lines);
    }

    /// Clears the displayed output; the scope is kept
    pub fn clear_output(&self) {
        self.lock().reconciler.clear();
        self.sink().render(&[]);
    }

    pub fn reset_scope(&self) {
        self.lock().scope.clear();
    }

    /// Cancels the in-flight job, if any
    pub fn cancel(&self) {
        if let Some(control) = self.lock().current.take() {
            debug!("cancelling job {}", control.ticket().id());
            control.cancel();
        }
    }

    pub fn enable_auto_run(&self, enabled: bool) {
        self.inner.autorun.set_enabled(enabled);
    }

    pub fn auto_run_enabled(&self) -> bool {
        self.inner.autorun.is_enabled()
    }

    /// Editor change notification: schedules a debounced auto-run
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime while auto-run is enabled
    pub fn notify_change(&self, source: &str) -> Result<(), EngineError> {
        self.inner.autorun.schedule(self.clone(), source.to_string())
    }

    /// Runs `source` as an auto-triggered job unless it should be left alone.
    ///
    /// Returns `None` when the run was skipped before consulting the gate.
    ///
    /// # Errors
    ///
    /// Fails if the executor is unusable
    pub async fn auto_run(&self, source: &str) -> Result<Option<ExecutionResult>, EngineError> {
        if source.trim().is_empty() {
            trace!("auto-run skipped: blank source");
            return Ok(None);
        }
        if let RunnerState::Running {
            trigger: Trigger::Manual,
            ..
        } = self.state()
        {
            debug!("auto-run skipped: a manual run is in progress");
            return Ok(None);
        }
        if let Some(message) = self.executor().check_syntax(source).await? {
            debug!("auto-run skipped: {message}");
            return Ok(None);
        }
        self.run(source, Trigger::Auto).await.map(Some)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock().gate.stats(Instant::now())
    }

    pub fn clear_cache(&self) {
        self.lock().gate.clear();
    }

    pub fn set_smart_mode(&self, enabled: bool) {
        self.lock().gate.set_smart_mode(enabled);
    }

    pub fn state(&self) -> RunnerState {
        self.lock().state
    }

    pub fn last_status(&self) -> Option<JobStatus> {
        self.lock().last_status
    }

    pub fn last_decision(&self) -> Option<Decision> {
        self.lock().last_decision.clone()
    }

    pub fn slots(&self) -> Vec<OutputSlot> {
        self.lock().reconciler.slots()
    }

    pub fn scope_snapshot(&self) -> Vec<(String, serde_json::Value)> {
        self.lock().scope.snapshot()
    }
}
