//! CLI smoke tests: verify basic binary behavior.

use std::process::Command;

fn cli_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_murmur"))
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
    assert!(stdout.contains("--platform"));
}

#[test]
fn test_version_flag() {
    let output = cli_bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("murmur"), "Expected binary name in --version output");
}

#[test]
fn test_unknown_platform_is_rejected() {
    let output = cli_bin()
        .args(["--platform", "irc"])
        .output()
        .expect("failed to run");
    assert!(!output.status.success());
}

#[test]
fn test_console_exits_on_quit() {
    use std::io::Write;
    use std::process::Stdio;

    let dir = tempfile::tempdir().unwrap();
    let mut child = cli_bin()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .env("MURMUR_TEMP_DIR", dir.path())
        .env("MURMUR_PLAYER", "definitely-not-a-player-binary")
        .env_remove("GEMINI_API_KEY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to run");

    child
        .stdin
        .take()
        .unwrap()
        .write_all("!ถาม สวัสดี\n/quit\n".as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    // No voice session yet, so the scripted answer is refused
    assert!(stdout.contains("กรุณาสั่ง `!เข้ามา` ก่อน"), "stdout: {}", stdout);
}

#[cfg(not(feature = "discord"))]
#[test]
fn test_discord_platform_needs_feature() {
    let output = cli_bin()
        .args(["--platform", "discord"])
        .env("DISCORD_BOT_TOKEN", "not-a-real-token")
        .output()
        .expect("failed to run");
    assert!(!output.status.success());
}
