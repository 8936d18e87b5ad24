use job_dispatch::error::DispatchError;
use job_dispatch::scheduler::{Job, JobOutcome, Processor};
use job_dispatch::worker::ShellProcessor;
use uuid::Uuid;

#[tokio::test]
async fn test_execute_simple_command() {
    let processor = ShellProcessor::new();
    let job_id = Uuid::new_v4();

    let result = processor.execute(job_id, "echo hello").await;

    assert_eq!(result.job_id, job_id);
    assert_eq!(result.outcome, JobOutcome::Complete);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output, Some("hello\n".to_string()));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_execute_empty_output() {
    let processor = ShellProcessor::new();

    let result = processor.execute(Uuid::new_v4(), "true").await;

    assert_eq!(result.outcome, JobOutcome::Complete);
    assert!(result.output.is_none());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_execute_command_failure() {
    let processor = ShellProcessor::new();

    let result = processor.execute(Uuid::new_v4(), "exit 3").await;

    assert_eq!(result.outcome, JobOutcome::Failed);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.error.as_deref(), Some("Exit code: Some(3)"));
}

#[tokio::test]
async fn test_execute_command_with_stderr() {
    let processor = ShellProcessor::new();

    let result = processor
        .execute(Uuid::new_v4(), "echo 'error message' >&2 && exit 1")
        .await;

    assert_eq!(result.outcome, JobOutcome::Failed);
    assert!(result.error.unwrap().contains("error message"));
}

#[tokio::test]
async fn test_execute_missing_shell() {
    let processor = ShellProcessor::with_shell("/nonexistent/shell-12345");

    let result = processor.execute(Uuid::new_v4(), "echo hi").await;

    assert_eq!(result.outcome, JobOutcome::Failed);
    assert!(result.exit_code.is_none());
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_run_succeeds_for_zero_exit() {
    let processor = ShellProcessor::new();
    let job = Job::new("echo 'hello world' | wc -w");

    processor.run(&job).await.unwrap();
}

#[tokio::test]
async fn test_run_maps_failure_to_execution_error() {
    let processor = ShellProcessor::new();
    let job = Job::new("echo 'disk full' >&2; exit 1");

    let err = processor.run(&job).await.unwrap_err();
    match err {
        DispatchError::Execution(message) => assert_eq!(message, "disk full"),
        other => panic!("expected Execution error, got {other:?}"),
    }
}
