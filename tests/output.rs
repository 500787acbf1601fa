//! Run-to-completion driver tests.
#![cfg(unix)]

use std::time::{Duration, Instant};
use subproc::{Command, ExitCode, OutputOptions};

fn sh(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[tokio::test]
async fn collects_both_streams_and_exit_code() {
    let out = sh("echo out; echo err >&2; exit 3")
        .output(OutputOptions::default())
        .await
        .unwrap();
    assert_eq!(out.stdout, "out");
    assert_eq!(out.stderr, "err");
    assert_eq!(out.exit_code, Some(ExitCode(3)));
    assert!(!out.stdout_truncated);
    assert!(!out.stderr_truncated);
}

#[tokio::test]
async fn carriage_returns_are_stripped() {
    let out = sh("printf 'Hello\\r\\nWorld\\n'")
        .output(OutputOptions::default())
        .await
        .unwrap();
    assert_eq!(out.stdout, "Hello\nWorld");
}

#[tokio::test]
async fn input_is_fed_and_stdin_closed() {
    let options = OutputOptions {
        input: Some(b"alpha\nbeta".to_vec()),
        ..OutputOptions::default()
    };
    let out = Command::new("cat").output(options).await.unwrap();
    assert_eq!(out.stdout, "alpha\nbeta");
    assert_eq!(out.exit_code, Some(ExitCode::OK));
}

#[tokio::test]
async fn input_to_uninterested_child_is_tolerated() {
    let options = OutputOptions {
        input: Some(vec![b'x'; 256 * 1024]),
        ..OutputOptions::default()
    };
    let out = sh("exit 0").output(options).await.unwrap();
    assert_eq!(out.exit_code, Some(ExitCode::OK));
}

#[tokio::test]
async fn stdout_is_truncated_at_the_ceiling() {
    let options = OutputOptions {
        max_stdout_size: 20,
        ..OutputOptions::default()
    };
    let out = sh("printf '          \\n       \\n123\\nmore\\n'")
        .output(options)
        .await
        .unwrap();
    assert!(out.stdout_truncated);
    assert_eq!(out.stdout.len(), 20);
    assert_eq!(out.stdout, "          \n       \n1");
    assert!(!out.stderr_truncated);
}

#[tokio::test]
async fn timeout_destroys_the_child() {
    let start = Instant::now();
    let options = OutputOptions {
        timeout: Some(Duration::from_millis(200)),
        ..OutputOptions::default()
    };
    let out = sh("sleep 10 >/dev/null 2>&1").output(options).await.unwrap();
    assert_eq!(out.exit_code, None);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn timeout_still_reports_collected_output() {
    let options = OutputOptions {
        timeout: Some(Duration::from_millis(300)),
        ..OutputOptions::default()
    };
    let out = sh("echo early; sleep 10 >/dev/null 2>&1")
        .output(options)
        .await
        .unwrap();
    assert_eq!(out.exit_code, None);
    assert_eq!(out.stdout, "early");
}

#[tokio::test]
async fn sigterm_ignoring_child_is_killed_after_grace() {
    let options = OutputOptions {
        timeout: Some(Duration::from_millis(200)),
        kill_grace: Duration::from_millis(200),
        ..OutputOptions::default()
    };
    let out = sh("trap '' TERM; sleep 10 >/dev/null 2>&1")
        .output(options)
        .await
        .unwrap();
    assert_eq!(out.exit_code, None);
}

#[tokio::test]
async fn large_output_is_not_lost_before_exit() {
    // every byte written before exit is observable by the drain
    let out = sh("seq 1 2000").output(OutputOptions::default()).await.unwrap();
    assert_eq!(out.exit_code, Some(ExitCode::OK));
    let lines: Vec<&str> = out.stdout.lines().collect();
    assert_eq!(lines.len(), 2000);
    assert_eq!(lines[0], "1");
    assert_eq!(lines[1999], "2000");
}
