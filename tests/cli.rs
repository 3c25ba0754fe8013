//! Black-box CLI behavior (spec §6.5): `--version`, config-load/validation
//! failures, and `--rehash` against no running instance, each checked
//! against the documented exit codes rather than crate internals.

use std::process::Command;

const EXIT_CLEAN: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_STARTUP_FAILURE: i32 = 2;

fn pylinkd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pylinkd"))
}

#[test]
fn version_flag_exits_clean() {
    let output = pylinkd().arg("--version").output().expect("run pylinkd --version");
    assert_eq!(output.status.code(), Some(EXIT_CLEAN));
    assert!(String::from_utf8_lossy(&output.stdout).contains("pylinkd"));
}

#[test]
fn missing_config_file_exits_with_config_error() {
    let output = pylinkd()
        .arg("--config")
        .arg("/nonexistent/pylink-test-config.toml")
        .output()
        .expect("run pylinkd with missing config");
    assert_eq!(output.status.code(), Some(EXIT_CONFIG_ERROR));
}

#[test]
fn config_failing_validation_exits_with_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("pylink.toml");
    // server.name is empty, which validation.rs rejects.
    std::fs::write(&config_path, "[server]\nname = \"\"\n").expect("write config");

    let output = pylinkd().arg("--config").arg(&config_path).output().expect("run pylinkd");
    assert_eq!(output.status.code(), Some(EXIT_CONFIG_ERROR));
    assert!(String::from_utf8_lossy(&output.stderr).to_lowercase().contains("server.name"));
}

#[test]
fn rehash_with_no_running_instance_reports_startup_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("pylink.toml");
    let pid_file = dir.path().join("pylinkd.pid");
    std::fs::write(
        &config_path,
        format!("[server]\nname = \"test.pylink\"\npid_file = {:?}\n", pid_file.to_string_lossy()),
    )
    .expect("write config");

    let output = pylinkd().arg("--config").arg(&config_path).arg("--rehash").output().expect("run pylinkd --rehash");
    assert_eq!(output.status.code(), Some(EXIT_STARTUP_FAILURE));
}
