use assert_cmd::Command;
use predicates::prelude::*;

fn faultline() -> Command {
    let mut cmd = Command::cargo_bin("faultline").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("FAULTLINE_SWEEP_INTERVAL_MS")
        .env_remove("FAULTLINE_SWEEP_ON_SHUTDOWN")
        .env_remove("FAULTLINE_SHUTDOWN_GRACE_MS");
    cmd
}

#[test]
fn default_run_prints_fire_and_forget_first() {
    faultline()
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Fire and forget!\n"))
        .stdout(predicate::str::contains("Unhandled exception was caught!").not());
}

#[test]
fn unobserved_fault_is_reported_at_shutdown() {
    faultline()
        .env("FAULTLINE_SHUTDOWN_GRACE_MS", "2000")
        .args(["--sweep-interval-ms", "0"])
        .write_stdin("\n")
        .assert()
        .success()
        .stdout("Fire and forget!\nUnhandled task scheduler exception was caught!\n");
}

#[test]
fn observed_fault_is_not_reported() {
    faultline()
        .args(["--observe", "--message", "seen it"])
        .write_stdin("\n")
        .assert()
        .success()
        .stdout("Fire and forget!\nTask fault observed: seen it\n");
}

#[test]
fn no_final_sweep_means_no_report() {
    faultline()
        .env("FAULTLINE_SWEEP_ON_SHUTDOWN", "false")
        .args(["--sweep-interval-ms", "0"])
        .write_stdin("\n")
        .assert()
        .success()
        .stdout("Fire and forget!\n");
}

#[test]
fn invalid_environment_is_an_error() {
    faultline()
        .env("FAULTLINE_SWEEP_INTERVAL_MS", "often")
        .write_stdin("\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FAULTLINE_SWEEP_INTERVAL_MS"));
}
