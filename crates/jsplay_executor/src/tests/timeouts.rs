use std::time::{Duration, Instant};

use jsplay_runtime::{OutputKind, RecordOrigin};

use super::{executor_with_timeout, run, serial};
use crate::JobOutcome;

#[serial]
#[tokio::test]
async fn test_synchronous_infinite_loop_times_out() {
    let executor = executor_with_timeout(Duration::from_millis(300));

    let start = Instant::now();
    let (records, report) = run(&executor, "console.log('start');\nwhile (true) {}").await;
    let elapsed = start.elapsed();

    assert_eq!(report.outcome, JobOutcome::TimedOut);
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].content.to_text(), "start");
    let notice = &records[1];
    assert_eq!(notice.origin, RecordOrigin::Timeout);
    assert_eq!(notice.kind, OutputKind::Error);
    assert_eq!(
        notice.content.to_text(),
        "Execution stopped: code took too long (300ms timeout)"
    );
}

#[serial]
#[tokio::test]
async fn test_pending_async_work_times_out() {
    let executor = executor_with_timeout(Duration::from_millis(200));
    let code = "setInterval(() => console.log('tick'), 50);\nawait new Promise(() => {});";

    let (records, report) = run(&executor, code).await;

    assert_eq!(report.outcome, JobOutcome::TimedOut);
    let notices = records
        .iter()
        .filter(|r| r.origin == RecordOrigin::Timeout)
        .count();
    assert_eq!(notices, 1, "exactly one timeout notice");
    assert_eq!(records.last().map(|r| r.origin), Some(RecordOrigin::Timeout));
}

#[serial]
#[tokio::test]
async fn test_never_settling_promise_without_work_is_an_error() {
    let executor = executor_with_timeout(Duration::from_secs(2));
    let (_, report) = run(&executor, "await new Promise(() => {});").await;

    assert!(
        matches!(report.outcome, JobOutcome::RuntimeError { ref message, .. } if message.contains("never settled")),
        "got {:?}",
        report.outcome
    );
}

#[serial]
#[tokio::test]
async fn test_executor_recovers_after_timeout() {
    let executor = executor_with_timeout(Duration::from_millis(200));
    let (_, first) = run(&executor, "for (;;) {}").await;
    assert_eq!(first.outcome, JobOutcome::TimedOut);

    let (records, second) = run(&executor, "console.log('next');").await;
    assert!(second.outcome.is_success());
    assert_eq!(records[0].content.to_text(), "next");
}
