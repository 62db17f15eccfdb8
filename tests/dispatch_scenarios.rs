#![cfg(unix)]

mod common;
use crate::common::builders::{JobRequestBuilder, worker_env};
use crate::common::{WorkerDirs, init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskdispatch::dispatch::Dispatcher;
use taskdispatch::encode::args_file_path;
use taskdispatch::errors::{DispatchError, JobOutcome};
use taskdispatch::exec::cancel_token;
use taskdispatch::types::{DeliveryMode, JobId, TaskDefinition};

type TestResult = Result<(), Box<dyn Error>>;

fn dispatcher(dirs: &WorkerDirs) -> Dispatcher {
    Dispatcher::new(dirs.logs(), dirs.tmp()).with_env_source(Arc::new(worker_env()))
}

#[tokio::test]
async fn job_uuid_reaches_the_command_line() -> TestResult {
    init_tracing();
    let dirs = WorkerDirs::new();

    with_timeout(dispatcher(&dirs).dispatch(JobRequestBuilder::new("job-a", "echo $JOB_UUID").build()))
        .await?;

    let stdout = dirs.stdout_of("job-a");
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some(r#"cmd: ["echo", "job-a"]"#));
    assert_eq!(lines.next(), Some("job-a"));
    assert_eq!(dirs.stderr_of("job-a"), "");
    Ok(())
}

#[tokio::test]
async fn child_environment_is_the_allowlist_plus_job_uuid() -> TestResult {
    init_tracing();
    let dirs = WorkerDirs::new();
    let env = worker_env().with("API_TOKEN", "secret").with("UNLISTED", "leak");

    Dispatcher::new(dirs.logs(), dirs.tmp())
        .with_env_source(Arc::new(env))
        .dispatch(JobRequestBuilder::new("job-env", "env").env_var("API_TOKEN").build())
        .await?;

    let stdout = dirs.stdout_of("job-env");
    let vars: Vec<&str> = stdout.lines().skip(1).collect();
    assert!(vars.contains(&"API_TOKEN=secret"));
    assert!(vars.contains(&"JOB_UUID=job-env"));
    assert!(vars.iter().any(|v| v.starts_with("PATH=")));
    assert!(!stdout.contains("UNLISTED"));
    Ok(())
}

#[tokio::test]
async fn missing_permitted_variable_creates_nothing() {
    init_tracing();
    let dirs = WorkerDirs::new();

    let err = dispatcher(&dirs)
        .dispatch(
            JobRequestBuilder::new("job-b", "echo hi")
                .env_var("FOO")
                .args(json!({"x": 1}))
                .json_file_option("--args-file")
                .build(),
        )
        .await
        .unwrap_err();

    match err {
        DispatchError::MissingEnvironmentVariable(name) => assert_eq!(name, "FOO"),
        other => panic!("expected MissingEnvironmentVariable, got {other:?}"),
    }
    assert!(!dirs.logs().exists());
    assert!(dirs.temp_files().is_empty());
}

#[tokio::test]
async fn args_file_exists_during_run_and_not_after() -> TestResult {
    init_tracing();
    let dirs = WorkerDirs::new();
    let expected_path = args_file_path(&dirs.tmp(), &JobId::new("job-c")?);

    dispatcher(&dirs)
        .dispatch(
            JobRequestBuilder::new("job-c", "sh -c 'cat \"$2\"' sh")
                .args(json!({"x": 1}))
                .json_file_option("--args-file")
                .build(),
        )
        .await?;

    let stdout = dirs.stdout_of("job-c");
    let mut lines = stdout.lines();
    let cmd_line = lines.next().unwrap_or_default();
    assert!(cmd_line.ends_with(&format!(
        "\"--args-file\", \"{}\"]",
        expected_path.display()
    )));
    assert_eq!(lines.next(), Some(r#"{"x":1}"#));

    assert!(!expected_path.exists());
    assert!(dirs.temp_files().is_empty());
    Ok(())
}

#[tokio::test]
async fn args_file_is_removed_when_the_launch_fails() {
    init_tracing();
    let dirs = WorkerDirs::new();

    let err = dispatcher(&dirs)
        .dispatch(
            JobRequestBuilder::new("job-l", "no-such-binary-for-taskdispatch")
                .args(json!({"x": 1}))
                .json_file_option("--args-file")
                .build(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.outcome(), JobOutcome::LaunchFailure);
    assert!(dirs.temp_files().is_empty());
}

#[tokio::test]
async fn non_zero_exit_is_reported_and_logged() {
    init_tracing();
    let dirs = WorkerDirs::new();

    let err = dispatcher(&dirs)
        .dispatch(JobRequestBuilder::new("job-x", "sh -c 'echo boom >&2; exit 7'").build())
        .await
        .unwrap_err();

    assert_eq!(err.outcome(), JobOutcome::NonZeroExit(7));
    assert_eq!(dirs.stderr_of("job-x"), "boom\n");
}

#[tokio::test]
async fn cancelling_a_job_kills_it_and_cleans_up() -> TestResult {
    init_tracing();
    let dirs = WorkerDirs::new();
    let d = dispatcher(&dirs);
    let (cancel_tx, cancel_rx) = cancel_token();

    let task = TaskDefinition::new("sh -c 'exec sleep 30' sh").with_delivery(DeliveryMode::JsonFile {
        option: "--args-file".to_string(),
    });
    let job_id = JobId::new("job-cancel")?;
    let args = common::builders::payload(json!({"x": 1}));

    let handle = tokio::spawn(async move { d.run_job(&job_id, &task, &args, Some(cancel_rx)).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(dirs.temp_files().len(), 1);
    let _ = cancel_tx.send(());

    let result = with_timeout(handle).await?;
    assert!(matches!(result, Err(DispatchError::Cancelled)));
    assert!(dirs.temp_files().is_empty());
    Ok(())
}

#[tokio::test]
async fn dropping_the_dispatch_future_cleans_up() -> TestResult {
    init_tracing();
    let dirs = WorkerDirs::new();
    let d = dispatcher(&dirs);

    let request = JobRequestBuilder::new("job-drop", "sh -c 'exec sleep 30' sh")
        .args(json!({"x": 1}))
        .json_file_option("--args-file")
        .build();
    let handle = tokio::spawn(async move { d.dispatch(request).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(dirs.temp_files().len(), 1);

    handle.abort();
    let joined = with_timeout(handle).await;
    assert!(joined.is_err_and(|e| e.is_cancelled()));
    assert!(dirs.temp_files().is_empty());
    Ok(())
}

#[tokio::test]
async fn concurrent_jobs_keep_separate_files() -> TestResult {
    init_tracing();
    let dirs = WorkerDirs::new();
    let d = dispatcher(&dirs);

    let job = |id: &str| {
        JobRequestBuilder::new(id, "sh -c 'sleep 0.2; cat \"$2\"' sh")
            .args(json!({ "id": id }))
            .json_file_option("--args-file")
            .build()
    };

    let (first, second) = with_timeout(async {
        tokio::join!(d.dispatch(job("job-1")), d.dispatch(job("job-2")))
    })
    .await;
    first?;
    second?;

    assert!(dirs.stdout_of("job-1").ends_with("{\"id\":\"job-1\"}\n"));
    assert!(dirs.stdout_of("job-2").ends_with("{\"id\":\"job-2\"}\n"));
    assert!(dirs.temp_files().is_empty());
    Ok(())
}
