use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use jsplay_runtime::JobTicket;

use super::{executor, executor_with_timeout, serial, texts};
use crate::{JobOutcome, JobRequest};

#[serial]
#[tokio::test]
async fn test_cancel_stops_running_job() {
    let executor = executor_with_timeout(Duration::from_secs(10));
    let handle = executor
        .execute(JobRequest::new(
            "console.log('started');\nwhile (true) {}",
            JobTicket::standalone(),
        ))
        .expect("executor should accept the job");

    let control = Arc::clone(&handle.control);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        control.cancel();
    });

    let (_, report) = handle.collect().await.expect("job should report");
    assert_eq!(report.outcome, JobOutcome::Cancelled);
}

#[serial]
#[tokio::test]
async fn test_cancelled_before_start_never_runs() {
    let executor = executor();
    // keeps the executor thread busy so the next job is still queued
    let busy = executor
        .execute(JobRequest::new(
            "await new Promise((r) => setTimeout(r, 200));",
            JobTicket::standalone(),
        ))
        .expect("executor should accept the job");
    let queued = executor
        .execute(JobRequest::new("console.log('ran');", JobTicket::standalone()))
        .expect("executor should accept the job");
    queued.control.cancel();

    let (_, busy_report) = busy.collect().await.expect("busy job should report");
    assert!(busy_report.outcome.is_success());

    let (records, report) = queued.collect().await.expect("job should report");
    assert_eq!(report.outcome, JobOutcome::Cancelled);
    assert!(records.is_empty());
}

#[serial]
#[tokio::test]
async fn test_superseded_job_output_is_dropped() {
    let executor = executor();
    let latest = Arc::new(AtomicU64::new(0));

    let first_ticket = JobTicket::issue(&latest);
    let first = executor
        .execute(JobRequest::new(
            "console.log('first early');\nawait new Promise((r) => setTimeout(r, 100));\nconsole.log('first late');",
            first_ticket,
        ))
        .expect("executor should accept the job");

    // issuing the next ticket makes the first job stale even though it keeps running
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = executor
        .execute(JobRequest::new("console.log('second');", JobTicket::issue(&latest)))
        .expect("executor should accept the job");

    let (first_records, _) = first.collect().await.expect("first job should report");
    let (second_records, second_report) = second.collect().await.expect("second job should report");

    assert!(
        !texts(&first_records).contains(&"first late".to_string()),
        "stale output must be dropped, got {first_records:?}"
    );
    assert!(second_report.outcome.is_success());
    assert_eq!(texts(&second_records), ["second"]);
}
