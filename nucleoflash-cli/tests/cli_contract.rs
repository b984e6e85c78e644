//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("nucleoflash");
    cmd.env_remove("NUCLEOFLASH_PORT")
        .env_remove("NUCLEOFLASH_BAUD")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("nucleoflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nucleoflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn unknown_subcommand_is_usage_error() {
    cli_cmd()
        .arg("flash-everything")
        .assert()
        .code(2);
}

#[test]
fn list_ports_json_returns_valid_json() {
    let output = cli_cmd()
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert_eq!(value["ok"], true);
    assert!(value["data"]["ports"].is_array());
}

#[test]
fn info_prints_crc_and_handshake() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.bin");
    fs::write(&path, [0x78, 0x56, 0x34, 0x12]).unwrap();

    cli_cmd()
        .current_dir(dir.path())
        .arg("info")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("0xDF8A8A2B"))
        .stdout(predicate::str::contains("2B 8A 8A DF"));
}

#[test]
fn info_json_reports_chunks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.bin");
    fs::write(&path, vec![0u8; 40]).unwrap();

    let output = cli_cmd()
        .current_dir(dir.path())
        .args(["info", "--json"])
        .arg(&path)
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["data"]["length"], 40);
    assert_eq!(value["data"]["chunks"], 3);
}

#[test]
fn info_uses_chunk_size_from_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.bin");
    fs::write(&path, vec![0u8; 40]).unwrap();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "[upload]\nchunk_size = 8\n").unwrap();

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["info", "--json"])
        .arg(&path)
        .output()
        .unwrap();

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["data"]["chunk_size"], 8);
    assert_eq!(value["data"]["chunks"], 5);
}

#[test]
fn info_missing_file_fails() {
    let dir = tempdir().unwrap();
    cli_cmd()
        .current_dir(dir.path())
        .args(["info", "does-not-exist.bin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does-not-exist.bin"));
}

#[test]
fn invalid_config_warns_and_continues() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.bin");
    fs::write(&path, [1, 2, 3, 4]).unwrap();
    fs::write(dir.path().join("nucleoflash.toml"), "[connection\nserial = ").unwrap();

    cli_cmd()
        .current_dir(dir.path())
        .arg("info")
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("TOML"));
}

#[test]
fn upload_radio_firmware_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("radio.bin");
    fs::write(&path, [0u8; 16]).unwrap();

    cli_cmd()
        .current_dir(dir.path())
        .args(["upload", "--type", "radio"])
        .arg(&path)
        .assert()
        .code(5)
        .stderr(predicate::str::contains("unsupported"));
}

#[test]
fn upload_missing_file_is_rejected() {
    let dir = tempdir().unwrap();
    cli_cmd()
        .current_dir(dir.path())
        .args(["upload", "missing.bin"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("invalid firmware file"));
}

#[test]
fn upload_to_missing_port_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.bin");
    fs::write(&path, [0u8; 16]).unwrap();

    cli_cmd()
        .current_dir(dir.path())
        .args(["--port", "/dev/nucleoflash-does-not-exist", "upload"])
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to open serial port"));
}

#[test]
fn completions_bash_writes_script() {
    cli_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nucleoflash"));
}

#[test]
fn zero_baud_is_usage_error() {
    cli_cmd()
        .args(["--baud", "0", "list-ports"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--baud"));
}

#[test]
fn zero_chunk_size_in_config_is_config_error() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "[upload]\nchunk_size = 0\n").unwrap();

    cli_cmd()
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("list-ports")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("chunk_size"));
}
