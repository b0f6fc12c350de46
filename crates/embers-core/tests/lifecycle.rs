//! Lifecycle scenarios driven through real subprocesses. `/bin/sh` stands
//! in for the server binary so the suite runs without one installed.

use std::time::{Duration, Instant};

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};

use embers_core::{Instance, InstanceError, InstanceState};

const READY_LINE: &str = "serving now";

fn sh_instance(script: &str, startup_timeout: Duration) -> Instance {
    let args = vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()];
    Instance::new(args, 0, Regex::new(READY_LINE).unwrap()).with_startup_timeout(startup_timeout)
}

fn ready_instance() -> Instance {
    sh_instance(
        "echo booting; echo serving now; sleep 30",
        Duration::from_secs(3),
    )
}

#[tokio::test]
async fn becomes_active_when_the_ready_pattern_appears() {
    let instance = ready_instance();
    assert_eq!(instance.state(), InstanceState::Inactive);
    assert!(!instance.is_active());

    instance.start().await.unwrap();
    assert!(instance.is_active());
    assert_eq!(instance.state(), InstanceState::Active);

    instance.stop().await.unwrap();
    assert!(!instance.is_active());
    assert_eq!(instance.state(), InstanceState::Inactive);
}

#[tokio::test]
async fn supports_repeated_start_stop_cycles() {
    let instance = ready_instance();

    for _ in 0..3 {
        instance.start().await.unwrap();
        assert_eq!(instance.state(), InstanceState::Active);

        instance.stop().await.unwrap();
        assert_eq!(instance.state(), InstanceState::Inactive);
    }
}

#[tokio::test]
async fn rejects_a_second_start_while_running() {
    let instance = ready_instance();
    instance.start().await.unwrap();

    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, InstanceError::AlreadyRunning));
    // The running process is untouched by the rejected call.
    assert!(instance.is_active());

    instance.stop().await.unwrap();
}

#[tokio::test]
async fn stop_without_a_running_process_is_a_no_op() {
    let instance = ready_instance();
    instance.stop().await.unwrap();
    assert_eq!(instance.state(), InstanceState::Inactive);
}

#[tokio::test]
async fn fails_when_output_ends_without_the_ready_pattern() {
    let instance = sh_instance("echo one; echo two", Duration::from_secs(3));

    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, InstanceError::StartupFailed));
    assert_eq!(instance.state(), InstanceState::Failed);

    // Every emitted line stays retrievable, in emission order.
    assert_eq!(instance.captured_lines(), vec!["one", "two"]);
    let mut reader = BufReader::new(instance.output());
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "one\n");
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "two\n");
    line.clear();
    assert_eq!(reader.read_line(&mut line).await.unwrap(), 0);
}

#[tokio::test]
async fn captures_stderr_alongside_stdout() {
    let instance = sh_instance("echo visible 1>&2", Duration::from_secs(3));

    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, InstanceError::StartupFailed));
    assert_eq!(instance.captured_lines(), vec!["visible"]);
}

#[tokio::test]
async fn enforces_the_startup_deadline() {
    let instance = sh_instance("echo waiting; sleep 30", Duration::from_millis(400));

    let begin = Instant::now();
    let err = instance.start().await.unwrap_err();
    let elapsed = begin.elapsed();

    assert!(matches!(err, InstanceError::StartupFailed));
    assert_eq!(instance.state(), InstanceState::Failed);
    // Deadline plus a bounded margin, nowhere near the 30 s the fake
    // process would otherwise live.
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[tokio::test]
async fn can_start_again_after_a_failure() {
    let instance = sh_instance("echo no such pattern", Duration::from_secs(3));

    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, InstanceError::StartupFailed));

    // A failed instance is start-eligible; the second attempt runs the
    // process again rather than reporting it as already running.
    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, InstanceError::StartupFailed));
    assert_eq!(instance.state(), InstanceState::Failed);
}

#[tokio::test]
async fn output_can_be_tailed_while_running() {
    let instance = ready_instance();
    instance.start().await.unwrap();

    let mut reader = BufReader::new(instance.output());
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "booting\n");
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "serving now\n");

    instance.stop().await.unwrap();
}

#[tokio::test]
async fn spawn_failure_leaves_the_instance_start_eligible() {
    let args = vec!["/no/such/binary".to_string()];
    let instance = Instance::new(args, 0, Regex::new(READY_LINE).unwrap());

    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, InstanceError::Spawn(_)));
    assert_eq!(instance.state(), InstanceState::Failed);

    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, InstanceError::Spawn(_)));
}
