use std::time::Duration;

use jsplay_runtime::{JobTicket, OutputRecord};
use serial_test::serial;

use crate::{JobReport, JobRequest, SandboxConfig, SandboxExecutor};

mod cancellation;
mod timeouts;

fn executor() -> SandboxExecutor {
    SandboxExecutor::new(SandboxConfig::default())
}

fn executor_with_timeout(timeout: Duration) -> SandboxExecutor {
    SandboxExecutor::new(SandboxConfig {
        timeout,
        ..Default::default()
    })
}

async fn run(executor: &SandboxExecutor, code: &str) -> (Vec<OutputRecord>, JobReport) {
    executor
        .execute(JobRequest::new(code, JobTicket::standalone()))
        .expect("executor should accept the job")
        .collect()
        .await
        .expect("job should report")
}

fn texts(records: &[OutputRecord]) -> Vec<String> {
    records.iter().map(|r| r.content.to_text()).collect()
}

#[serial]
#[tokio::test]
async fn test_check_syntax() {
    let executor = executor();

    let ok = executor
        .check_syntax("const x = 1;\nconsole.log(x);")
        .await
        .expect("check should run");
    assert_eq!(ok, None);

    let broken = executor
        .check_syntax("const x = ;")
        .await
        .expect("check should run");
    assert!(broken.is_some(), "expected a syntax error");
}

#[serial]
#[tokio::test]
async fn test_check_syntax_does_not_execute() {
    let executor = executor();
    let result = executor
        .check_syntax("while (true) {}")
        .await
        .expect("check should return without running the loop");
    assert_eq!(result, None);
}
