//! The fabricated console's sink: turns console calls into [`OutputRecord`]s
//! and publishes them as soon as they are produced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::trace;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::render::RenderedContent;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Log,
    Info,
    Warn,
    Error,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(Self::Log),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown console method \"{other}\"")),
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// A `console.*` call in user code
    Console,
    /// Echo of a top-level `return` value
    ReturnValue,
    /// An exception thrown by user code
    Runtime,
    /// The source could not be compiled
    Syntax,
    /// Synthetic notice for a job that ran out of time
    Timeout,
    /// Notice that the per-job record cap was hit
    Truncation,
}

impl RecordOrigin {
    /// Diagnostics are attributed by line rather than by console call order
    pub fn is_diagnostic(self) -> bool {
        !matches!(self, Self::Console | Self::Truncation)
    }
}

/// A single captured console line. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub kind: OutputKind,
    pub content: RenderedContent,
    /// Emission order within the job; the only reliable ordering
    pub sequence: u64,
    /// 1-based source line the call was made from, when it could be recovered
    pub line_hint: Option<u32>,
    /// Local wall-clock time, `HH:MM:SS`
    pub timestamp: String,
    pub origin: RecordOrigin,
}

impl OutputRecord {
    pub fn new(
        kind: OutputKind,
        content: RenderedContent,
        sequence: u64,
        line_hint: Option<u32>,
        origin: RecordOrigin,
    ) -> Self {
        Self {
            kind,
            content,
            sequence,
            line_hint,
            timestamp: timestamp_now(),
            origin,
        }
    }
}

pub fn timestamp_now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Decides whether a job may still produce observable effects.
///
/// A ticket is live while its id is the most recently issued one and it has
/// not been closed by cancellation or timeout.
#[derive(Debug, Clone)]
pub struct JobTicket {
    id: JobId,
    latest: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl JobTicket {
    pub fn new(id: JobId, latest: Arc<AtomicU64>) -> Self {
        Self {
            id,
            latest,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Issues the next ticket from `latest`, superseding every earlier one
    pub fn issue(latest: &Arc<AtomicU64>) -> Self {
        let id = latest.fetch_add(1, Ordering::SeqCst) + 1;
        Self::new(id, Arc::clone(latest))
    }

    /// Ticket that is never superseded by another job
    pub fn standalone() -> Self {
        Self::issue(&Arc::new(AtomicU64::new(0)))
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.latest.load(Ordering::SeqCst) == self.id
    }

    /// A newer job has been issued from the same counter
    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::SeqCst) != self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub const TRUNCATION_NOTICE_PREFIX: &str = "[MAX LOGS REACHED]";

/// Collects the records of one job.
///
/// Lives in the `OpState` of the job's runtime. Every accepted record is sent
/// immediately on `sink`, so a consumer sees output while async code is still
/// running.
#[derive(Debug)]
pub struct OutputRecorder {
    ticket: JobTicket,
    max_records: usize,
    accepted: usize,
    next_sequence: u64,
    truncated: bool,
    sink: UnboundedSender<OutputRecord>,
}

impl OutputRecorder {
    pub fn new(ticket: JobTicket, max_records: usize, sink: UnboundedSender<OutputRecord>) -> Self {
        Self {
            ticket,
            max_records,
            accepted: 0,
            next_sequence: 0,
            truncated: false,
            sink,
        }
    }

    pub fn ticket(&self) -> &JobTicket {
        &self.ticket
    }

    /// Records emitted so far, including a truncation notice
    pub fn emitted(&self) -> u64 {
        self.next_sequence
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Captures a record that counts toward the per-job cap.
    ///
    /// Returns `false` when the record was dropped (stale job or cap reached).
    pub fn record(
        &mut self,
        kind: OutputKind,
        content: RenderedContent,
        line_hint: Option<u32>,
        origin: RecordOrigin,
    ) -> bool {
        if !self.ticket.is_live() {
            trace!("job {} is no longer live, dropping {kind} record", self.ticket.id);
            return false;
        }

        if self.accepted >= self.max_records {
            if !self.truncated {
                self.truncated = true;
                let notice = format!(
                    "{TRUNCATION_NOTICE_PREFIX} Output truncated after {} messages",
                    self.max_records
                );
                self.publish(
                    OutputKind::Warn,
                    RenderedContent::Text(notice),
                    None,
                    RecordOrigin::Truncation,
                );
            }
            return false;
        }

        self.accepted += 1;
        self.publish(kind, content, line_hint, origin);
        true
    }

    /// Captures a terminal diagnostic (syntax error, uncaught exception,
    /// return value). These are never subject to the cap.
    pub fn record_diagnostic(
        &mut self,
        kind: OutputKind,
        content: RenderedContent,
        line_hint: Option<u32>,
        origin: RecordOrigin,
    ) -> bool {
        if !self.ticket.is_live() {
            trace!("job {} is no longer live, dropping {origin:?} diagnostic", self.ticket.id);
            return false;
        }
        self.publish(kind, content, line_hint, origin);
        true
    }

    /// Captures the synthetic notice of a job that ran out of time.
    ///
    /// The ticket is closed by the time this runs, so only supersession is
    /// checked.
    pub fn record_timeout(&mut self, content: RenderedContent) -> bool {
        if self.ticket.is_superseded() {
            trace!("job {} was superseded, dropping timeout notice", self.ticket.id);
            return false;
        }
        self.publish(OutputKind::Error, content, None, RecordOrigin::Timeout);
        true
    }

    fn publish(
        &mut self,
        kind: OutputKind,
        content: RenderedContent,
        line_hint: Option<u32>,
        origin: RecordOrigin,
    ) {
        let record = OutputRecord::new(kind, content, self.next_sequence, line_hint, origin);
        self.next_sequence += 1;
        trace!(
            "job {} record #{} ({kind}) from line {:?}",
            self.ticket.id, record.sequence, record.line_hint
        );
        // the receiver goes away when the runner stopped observing this job
        let _ = self.sink.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn text(s: &str) -> RenderedContent {
        RenderedContent::Text(s.to_string())
    }

    #[test]
    fn test_ticket_superseded_by_newer_issue() {
        let latest = Arc::new(AtomicU64::new(0));
        let first = JobTicket::issue(&latest);
        assert!(first.is_live());

        let second = JobTicket::issue(&latest);
        assert!(!first.is_live(), "older ticket must go stale");
        assert!(second.is_live());
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_closed_ticket_is_not_live() {
        let ticket = JobTicket::standalone();
        ticket.close();
        assert!(!ticket.is_live());
        assert!(ticket.is_closed());
    }

    #[test]
    fn test_records_are_sequenced_and_published() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut recorder = OutputRecorder::new(JobTicket::standalone(), 10, tx);

        assert!(recorder.record(OutputKind::Log, text("a"), Some(1), RecordOrigin::Console));
        assert!(recorder.record(OutputKind::Warn, text("b"), None, RecordOrigin::Console));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.line_hint, Some(1));
        assert_eq!(second.sequence, 1);
        assert_eq!(second.kind, OutputKind::Warn);
        assert_eq!(first.timestamp.len(), 8, "timestamp should be HH:MM:SS");
    }

    #[test]
    fn test_cap_appends_single_truncation_notice() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut recorder = OutputRecorder::new(JobTicket::standalone(), 3, tx);

        for i in 0..10 {
            recorder.record(OutputKind::Log, text(&i.to_string()), None, RecordOrigin::Console);
        }

        let mut received = vec![];
        while let Ok(r) = rx.try_recv() {
            received.push(r);
        }
        assert_eq!(received.len(), 4, "3 records plus one notice");
        let notice = received.last().unwrap();
        assert_eq!(notice.origin, RecordOrigin::Truncation);
        assert_eq!(notice.kind, OutputKind::Warn);
        assert!(notice.content.to_text().starts_with(TRUNCATION_NOTICE_PREFIX));
        assert!(recorder.is_truncated());

        // diagnostics still get through once truncated
        assert!(recorder.record_diagnostic(
            OutputKind::Error,
            text("Error: boom"),
            None,
            RecordOrigin::Runtime
        ));
    }

    #[test]
    fn test_stale_job_records_are_dropped() {
        let latest = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut recorder = OutputRecorder::new(JobTicket::issue(&latest), 10, tx);

        let _newer = JobTicket::issue(&latest);
        assert!(!recorder.record(OutputKind::Log, text("late"), None, RecordOrigin::Console));
        assert!(!recorder.record_diagnostic(
            OutputKind::Error,
            text("late"),
            None,
            RecordOrigin::Runtime
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(recorder.emitted(), 0);
    }

    #[test]
    fn test_timeout_notice_survives_closed_ticket() {
        let latest = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticket = JobTicket::issue(&latest);
        let mut recorder = OutputRecorder::new(ticket.clone(), 10, tx);

        ticket.close();
        assert!(!recorder.record(OutputKind::Log, text("x"), None, RecordOrigin::Console));
        assert!(recorder.record_timeout(text("Execution stopped")));
        assert_eq!(rx.try_recv().unwrap().origin, RecordOrigin::Timeout);

        let _newer = JobTicket::issue(&latest);
        assert!(!recorder.record_timeout(text("Execution stopped")));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("warn".parse::<OutputKind>(), Ok(OutputKind::Warn));
        assert!("table".parse::<OutputKind>().is_err());
    }
}
