use std::process::{Command, Output};

fn node(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_node"))
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn collect_with_worker_processes() {
    let output = node(&[
        "collect",
        "--workers",
        "2",
        "--frames-per-batch",
        "8",
        "--total-frames",
        "32",
        "--env",
        "counter",
        "--port",
        "0",
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(
        stdout(&output).contains("collected 32 frames in 4 batches"),
        "{}",
        stdout(&output)
    );
}

#[test]
fn collect_with_sync_workers_and_stale_weights() {
    let output = node(&[
        "collect",
        "--workers",
        "2",
        "--frames-per-batch",
        "8",
        "--total-frames",
        "24",
        "--collector",
        "sync",
        "--envs-per-worker",
        "2",
        "--update-interval",
        "2",
        "--port",
        "0",
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(
        stdout(&output).contains("collected 24 frames in 3 batches"),
        "{}",
        stdout(&output)
    );
}

#[test]
fn indivisible_budget_fails_before_launching() {
    let output = node(&[
        "collect",
        "--workers",
        "3",
        "--frames-per-batch",
        "30",
        "--total-frames",
        "100",
        "--port",
        "0",
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid config"), "{}", stderr(&output));
}

#[test]
fn worker_rejects_a_malformed_spec() {
    let output = node(&["worker", "--spec", "{}"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid worker spec"), "{}", stderr(&output));
}
