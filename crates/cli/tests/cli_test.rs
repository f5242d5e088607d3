//! CLI integration tests.

#![allow(deprecated)] // Command::cargo_bin deprecated for custom build-dir; still works for default

use assert_cmd::Command;
use pretty_assertions::assert_eq;
use std::fs;
use std::io::Write;
use std::path::Path;

fn xunpack() -> Command {
    let mut cmd = Command::cargo_bin("xunpack").unwrap();
    // Keep the user's config and log filter out of the way.
    cmd.env_remove("RUST_LOG")
        .args(["--config", "/nonexistent/xunpack.toml", "--no-progress"]);
    cmd
}

fn write_zip(path: &Path, names: &[&str]) {
    let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for name in names {
        writer.start_file(*name, options).unwrap();
        writer.write_all(name.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn help_prints_and_exits_success() {
    Command::cargo_bin("xunpack")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn missing_input_prints_usage() {
    let out = xunpack().assert().failure().code(1);
    let stderr = std::str::from_utf8(&out.get_output().stderr).unwrap();
    assert!(stderr.starts_with("Error: No input file specified"));
    assert!(stderr.contains("Usage:"));
}

#[test]
fn nonexistent_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.zip");
    let out = xunpack().arg(&missing).assert().failure().code(1);
    let stderr = std::str::from_utf8(&out.get_output().stderr).unwrap();
    assert_eq!(
        stderr.trim_end(),
        format!("Error: File not found: {}", missing.display())
    );
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn list_prints_table() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("docs.zip");
    write_zip(&input, &["a.txt", "b.txt"]);

    let out = xunpack().arg("-l").arg(&input).assert().success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    assert!(stdout.contains("File type: ZIP"));
    assert!(stdout.contains("Archive contents:"));
    assert!(stdout.contains("Total: 2 file(s)"));
    assert!(stdout.ends_with("Operation completed successfully\n"));
    assert!(!dir.path().join("docs").exists());
}

#[test]
fn default_action_extracts_beside_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bundle.zip");
    write_zip(&input, &["inner.txt"]);

    xunpack().arg(&input).assert().success();
    assert_eq!(
        fs::read_to_string(dir.path().join("bundle/inner.txt")).unwrap(),
        "inner.txt"
    );
}

#[test]
fn extract_to_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let input = dir.path().join("bundle.zip");
    write_zip(&input, &["inner.txt"]);

    let out = xunpack()
        .args(["-x", "-o"])
        .arg(target.path())
        .arg(&input)
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    assert!(stdout.contains(&format!("Extracting to: {}", target.path().display())));
    assert!(stdout.contains("Extracted 1 file(s) successfully"));
    assert!(target.path().join("bundle/inner.txt").exists());
}

#[test]
fn test_action_passes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("three.zip");
    write_zip(&input, &["a", "b", "c"]);

    let out = xunpack().arg("-t").arg(&input).assert().success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    assert!(stdout.contains("Test PASSED: Successfully extracted 3 file(s)"));
}

#[test]
fn not_an_archive_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("image.png");
    fs::write(&input, b"\x89PNG\r\n\x1a\n rest").unwrap();

    let out = xunpack().arg(&input).assert().failure().code(1);
    let stderr = std::str::from_utf8(&out.get_output().stderr).unwrap();
    assert!(stderr.contains("Error: Not an archive format: PNG"));
}

#[test]
fn json_report_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("docs.zip");
    write_zip(&input, &["a.txt"]);

    let out = xunpack()
        .args(["--json", "-l"])
        .arg(&input)
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    let report: serde_json::Value =
        serde_json::from_str(stdout).expect("--json should output valid JSON");
    assert_eq!(report["format"], "ZIP");
    assert_eq!(report["records"][0]["name"], "a.txt");
    assert_eq!(report["outcome"]["action"], "listed");
}
