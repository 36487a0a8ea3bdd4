use std::time::Duration;

use jsplay_runtime::{OutputKind, RecordOrigin, RenderedContent};
use serde_json::json;

use super::{playground, playground_with_timeout, serial, texts};
use crate::{JobStatus, NO_OUTPUT_NOTICE, RunnerState, Trigger};

#[serial]
#[tokio::test]
async fn test_log_and_structured_value() {
    let (playground, _) = playground();
    let result = playground
        .run("console.log(\"a\"); console.log({x:1})", Trigger::Manual)
        .await
        .expect("run should finish");

    assert!(result.success);
    assert_eq!(result.records.len(), 2);
    assert!(result.records.iter().all(|r| r.kind == OutputKind::Log));
    assert_eq!(result.records[1].content, RenderedContent::Structured(json!({"x": 1})));
    // both calls sit on one line, so they share its slot
    assert_eq!(result.output_slots.len(), 1);
}

#[serial]
#[tokio::test]
async fn test_loop_output_folds_into_its_line() {
    let (playground, sink) = playground();
    let result = playground
        .run("for (let i=0;i<5;i++) console.log(i)", Trigger::Manual)
        .await
        .expect("run should finish");

    assert_eq!(texts(&result.output_slots), vec!["0\n1\n2\n3\n4"]);
    assert_eq!(sink.last_render().len(), 1);
}

#[serial]
#[tokio::test]
async fn test_unchanged_statement_keeps_its_slot() {
    let (playground, _) = playground();
    let first = playground
        .run("console.log('a');\nconsole.log('b');", Trigger::Manual)
        .await
        .expect("run should finish");
    let second = playground
        .run("// note\nconsole.log('a');\nconsole.log('b');", Trigger::Manual)
        .await
        .expect("run should finish");

    assert_eq!(second.output_slots.len(), 2);
    assert_eq!(first.output_slots[0].key, second.output_slots[0].key);
    assert_eq!(first.output_slots[1].key, second.output_slots[1].key);
    assert_eq!(second.output_slots[0].line, 2);
    assert_eq!(second.output_slots[0].revision, 0);
}

#[serial]
#[tokio::test]
async fn test_deleted_statement_loses_slot_and_scope() {
    let (playground, _) = playground();
    playground
        .run(
            "const gone = 1;\nconst kept = 2;\nconsole.log(gone);\nconsole.log(kept);",
            Trigger::Manual,
        )
        .await
        .expect("run should finish");
    let names = |p: &crate::Playground| p.scope_snapshot().into_iter().map(|(n, _)| n).collect::<Vec<_>>();
    assert_eq!(names(&playground), vec!["gone", "kept"]);

    let result = playground
        .run("const kept = 2;\nconsole.log(kept);", Trigger::Manual)
        .await
        .expect("run should finish");
    assert_eq!(texts(&result.output_slots), vec!["2"]);
    assert_eq!(names(&playground), vec!["kept"]);
}

#[serial]
#[tokio::test]
async fn test_newer_job_supersedes_older() {
    let (playground, _) = playground();
    let older = {
        let playground = playground.clone();
        tokio::spawn(async move {
            playground
                .run(
                    "await new Promise((r) => setTimeout(r, 300));\nconsole.log('old');",
                    Trigger::Manual,
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let newer = playground
        .run("console.log('new');", Trigger::Manual)
        .await
        .expect("run should finish");
    let older = older.await.expect("task should join").expect("run should finish");

    assert_eq!(older.status, Some(JobStatus::Cancelled));
    assert!(!older.success);
    assert_eq!(texts(&newer.output_slots), vec!["new"]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(texts(&playground.slots()), vec!["new"]);
    assert_eq!(playground.state(), RunnerState::Idle);
}

#[serial]
#[tokio::test]
async fn test_infinite_loop_times_out() {
    let (playground, _) = playground_with_timeout(Duration::from_millis(300));
    let started = std::time::Instant::now();
    let result = playground
        .run("console.log('before');\nwhile (true) {}", Trigger::Manual)
        .await
        .expect("run should finish");

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(result.status, Some(JobStatus::TimedOut));
    assert!(!result.success);
    let timeout = result
        .records
        .iter()
        .filter(|r| r.origin == RecordOrigin::Timeout)
        .collect::<Vec<_>>();
    assert_eq!(timeout.len(), 1);

    let last = result.output_slots.last().expect("timeout slot");
    assert_eq!(last.kind, OutputKind::Error);
    assert_eq!(last.line, 2);
    assert!(last.content.to_text().contains("300ms timeout"));
    assert_eq!(playground.state(), RunnerState::Idle);
    assert_eq!(playground.last_status(), Some(JobStatus::TimedOut));

    let next = playground
        .run("console.log('recovered')", Trigger::Manual)
        .await
        .expect("run should finish");
    assert_eq!(texts(&next.output_slots), vec!["recovered"]);
}

#[serial]
#[tokio::test]
async fn test_runtime_error_is_embedded_in_result() {
    let (playground, _) = playground();
    let result = playground
        .run(
            "console.log('ok');\nconst value = null;\nvalue.missing();",
            Trigger::Manual,
        )
        .await
        .expect("run should finish");

    assert!(!result.success);
    assert_eq!(result.status, Some(JobStatus::Errored));
    assert!(result.error.as_deref().is_some_and(|e| e.starts_with("TypeError")));
    assert_eq!(result.output_slots.len(), 2);
    assert_eq!(result.output_slots[0].content.to_text(), "ok");
    assert_eq!(result.output_slots[1].line, 3);
    assert_eq!(result.output_slots[1].kind, OutputKind::Error);
}

#[serial]
#[tokio::test]
async fn test_syntax_error_attaches_to_first_code_line() {
    let (playground, _) = playground();
    let result = playground
        .run("// broken\n\nconst = 1;\nconsole.log(2);", Trigger::Manual)
        .await
        .expect("run should finish");

    assert_eq!(result.status, Some(JobStatus::Errored));
    assert_eq!(result.output_slots.len(), 1);
    assert_eq!(result.output_slots[0].line, 3);
    assert!(result.output_slots[0].content.to_text().starts_with("SyntaxError"));
}

#[serial]
#[tokio::test]
async fn test_manual_run_without_output_notifies() {
    let (playground, sink) = playground();
    let result = playground
        .run("const quiet = 1;", Trigger::Manual)
        .await
        .expect("run should finish");

    assert!(result.success);
    assert!(result.output_slots.is_empty());
    assert_eq!(sink.notices(), vec![NO_OUTPUT_NOTICE.to_string()]);
}

#[serial]
#[tokio::test]
async fn test_return_value_is_echoed() {
    let (playground, _) = playground();
    let result = playground
        .run("const n = 21;\nreturn n * 2;", Trigger::Manual)
        .await
        .expect("run should finish");
    assert_eq!(texts(&result.output_slots), vec!["← 42"]);
}

#[serial]
#[tokio::test]
async fn test_empty_source_clears_output_and_scope() {
    let (playground, sink) = playground();
    playground
        .run("const a = 1;\nconsole.log(a);", Trigger::Manual)
        .await
        .expect("run should finish");
    assert!(!playground.slots().is_empty());

    let result = playground.run("  \n", Trigger::Manual).await.expect("run should finish");
    assert!(!result.executed());
    assert!(result.output_slots.is_empty());
    assert!(playground.slots().is_empty());
    assert!(playground.scope_snapshot().is_empty());
    assert!(sink.last_render().is_empty());
}

#[serial]
#[tokio::test]
async fn test_clear_output_and_reset_scope() {
    let (playground, _) = playground();
    playground
        .run("let total = 5;\nconsole.log(total);", Trigger::Manual)
        .await
        .expect("run should finish");

    playground.clear_output();
    assert!(playground.slots().is_empty());
    assert_eq!(playground.scope_snapshot().len(), 1);

    playground.reset_scope();
    assert!(playground.scope_snapshot().is_empty());
}

#[serial]
#[tokio::test]
async fn test_explicit_cancel() {
    let (playground, _) = playground_with_timeout(Duration::from_secs(10));
    let running = {
        let playground = playground.clone();
        tokio::spawn(async move { playground.run("while (true) {}", Trigger::Manual).await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(matches!(playground.state(), RunnerState::Running { .. }));

    playground.cancel();
    let result = running.await.expect("task should join").expect("run should finish");
    assert_eq!(result.status, Some(JobStatus::Cancelled));
    assert_eq!(playground.state(), RunnerState::Idle);
}

#[serial]
#[tokio::test]
async fn test_rerun_keeps_output_of_statements_still_waiting() {
    let (playground, sink) = playground();
    let source = "console.log('a');\nawait new Promise((r) => setTimeout(r, 300));\nconsole.log('b');";
    let first = playground.run(source, Trigger::Manual).await.expect("run should finish");
    assert_eq!(texts(&first.output_slots), vec!["a", "b"]);

    let start = sink.render_count();
    let second = playground.run(source, Trigger::Manual).await.expect("run should finish");
    assert_eq!(texts(&second.output_slots), vec!["a", "b"]);

    let renders = sink.render_texts_since(start);
    assert!(!renders.is_empty());
    for render in renders {
        assert_eq!(render, vec!["a", "b"]);
    }
}
