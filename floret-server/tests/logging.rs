use std::process::Command;

use floret_server::logging;

const CHILD_ENV: &str = "FLORET_LOGGING_CHILD";
const MARKER: &str = "image generation failed marker-7f3a";

/// Re-runs this test in a child process so its stdout and stderr can be told apart.
#[test]
fn errors_are_written_to_stderr() {
    if std::env::var_os(CHILD_ENV).is_some() {
        logging::init_tracing();
        tracing::error!(kind = "network", "{}", MARKER);
        return;
    }

    let output = Command::new(std::env::current_exe().unwrap())
        .args(["errors_are_written_to_stderr", "--exact", "--nocapture"])
        .env(CHILD_ENV, "1")
        .env("RUST_LOG", "info")
        .env("ANSI_OUTPUT", "false")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(MARKER), "stderr was: {stderr}");
    assert!(stderr.contains("kind=\"network\""), "stderr was: {stderr}");
    assert!(!stdout.contains(MARKER), "stdout was: {stdout}");
}
