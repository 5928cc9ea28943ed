//! End-to-end runs: real shell builds, built-in encoders and the reference
//! archive plugin process.
#![cfg(unix)]

use relforge::config::{decode_str, DEFAULT_CONFIG_FILE};
use relforge::summary::Status;
use relforge::{ExitCode, Orchestrator, RunError, RunOptions, RunSummary, Stage};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONFIG: &str = r#"
project = "tool"

[build_settings]
command = ["sh", "-c", 'printf "bin $RELFORGE_OS/$RELFORGE_ARCH" > "$RELFORGE_OUTPUT"']

[archive_settings.type]
format = "tar"
extension = ".tar"

[[builds]]
path = "unix"
[[builds.os]]
name = "linux"
archs = ["amd64", "arm64"]
[[builds.os]]
name = "darwin"
archs = ["arm64"]

[[archives]]
paths = ["builds/**"]
[archives.archive_settings]
binary_dir = "bin"
extra_files = [{ source_path = "README.md", target_path = "README.md" }]

[[archives]]
paths = ["builds/**/linux/**"]
[archives.archive_settings]
name_template = "{{ .Project }}_{{ .Tag }}_{{ .Os }}-{{ .Arch }}_plugin"
[archives.archive_settings.type]
format = "plugin"
extension = ".tar"
[archives.archive_settings.plugin]
id = "reference"
command = "@PLUGIN@"
[archives.archive_settings.plugin.env]
RELFORGE_LOG = "warn"

[[releases]]
paths = ["archives/**"]
dir = "main"
"#;

fn project(failing_build: bool) -> (TempDir, relforge::Config) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("README.md"), "# tool\n").unwrap();

    let mut source = CONFIG.replace("@PLUGIN@", env!("CARGO_BIN_EXE_relforge-archive-plugin"));
    if failing_build {
        source = source.replace(
            r#"'printf "bin $RELFORGE_OS/$RELFORGE_ARCH" > "$RELFORGE_OUTPUT"'"#,
            r#"'[ "$RELFORGE_OS" = darwin ] && exit 3; printf bin > "$RELFORGE_OUTPUT"'"#,
        );
    }
    let config = decode_str(&source, &dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
    (dir, config)
}

fn options(dir: &TempDir) -> RunOptions {
    let mut options = RunOptions::new(dir.path(), "v1.0.0");
    options.workers = 2;
    options
}

fn base(dir: &TempDir) -> PathBuf {
    dir.path().join("dist/tool/v1.0.0")
}

fn sha256(path: &Path) -> String {
    hex::encode(Sha256::digest(fs::read(path).unwrap()))
}

#[test]
fn test_full_release() {
    let (dir, config) = project(false);
    let summary = Orchestrator::new(options(&dir)).run(&config).unwrap();

    assert!(summary.is_success());
    assert!(summary.stages.iter().all(|s| s.status == Status::Success));

    let base = base(&dir);
    assert_eq!(
        fs::read_to_string(base.join("builds/unix/darwin/arm64/tool")).unwrap(),
        "bin darwin/arm64"
    );

    let archives = base.join("archives/unix/linux/amd64");
    assert!(archives.join("tool_v1.0.0_linux-amd64.tar").is_file());
    assert!(archives.join("tool_v1.0.0_linux-amd64_plugin.tar").is_file());
    assert!(!base
        .join("archives/unix/darwin/arm64/tool_v1.0.0_darwin-arm64_plugin.tar")
        .exists());

    let releases = base.join("releases/main");
    let checksums = fs::read_to_string(releases.join("tool_v1.0.0_checksums.txt")).unwrap();
    assert_eq!(checksums.lines().count(), 5);
    for line in checksums.lines() {
        let (digest, name) = line.split_once("  ").unwrap();
        assert_eq!(digest, sha256(&releases.join(name)), "{name}");
    }

    let on_disk = RunSummary::from_file(&base.join("run_summary.json")).unwrap();
    assert_eq!(on_disk.run_id, summary.run_id);
}

#[test]
fn test_archives_are_reproducible() {
    let (dir, config) = project(false);
    Orchestrator::new(options(&dir)).run(&config).unwrap();
    let archive = base(&dir).join("archives/unix/linux/arm64/tool_v1.0.0_linux-arm64.tar");
    let first = fs::read(&archive).unwrap();

    let mut again = options(&dir);
    again.stages = vec![Stage::Archive];
    Orchestrator::new(again).run(&config).unwrap();
    assert_eq!(fs::read(&archive).unwrap(), first);
}

#[test]
fn test_failed_build_stops_the_run() {
    let (dir, config) = project(true);
    let err = Orchestrator::new(options(&dir)).run(&config).unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::BuildFailed.as_i32());
    let RunError::StageFailed { stage, summary } = err else {
        panic!("expected stage failure");
    };
    assert_eq!(stage, Stage::Build);
    assert_eq!(summary.stages_skipped, vec![Stage::Archive, Stage::Release]);

    let build = &summary.stages[0];
    assert_eq!(build.units_failed, 1);
    assert_eq!(build.units_succeeded, 2);
    assert!(!base(&dir).join("archives").exists());
}

#[test]
fn test_trial_run_touches_nothing() {
    let (dir, config) = project(false);
    let mut options = options(&dir);
    options.trial = true;

    let summary = Orchestrator::new(options).run(&config).unwrap();
    assert!(summary.trial);
    assert!(!dir.path().join("dist").exists());
}
