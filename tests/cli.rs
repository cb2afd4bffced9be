#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

const NOBODY: u32 = 65534;

struct Fixture {
    dir: TempDir,
    tools: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let tools = dir.path().join("tools");
        fs::create_dir(&tools).unwrap();
        Fixture { dir, tools }
    }

    fn log(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Installs a fake tool that logs its arguments and then runs `body` with `$target` set
    fn tool(&self, name: &str, body: &str) {
        let path = self.tools.join(name);
        let script = format!(
            "#!/bin/sh\nPATH=/usr/bin:/bin\nfor target; do :; done\necho \"{} $*\" >> '{}'\n{}\n",
            name,
            self.log().display(),
            body
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn elf(&self, len: usize) -> PathBuf {
        let path = self.dir.path().join("app");
        let mut bytes = vec![0u8; len];
        bytes[..4].copy_from_slice(&ELF_MAGIC);
        fs::write(&path, bytes).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("optimz");
        cmd.env("PATH", &self.tools).env_remove("RUST_LOG");
        cmd
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log())
            .unwrap_or_default()
            .lines()
            .map(|l| l.split_whitespace().next().unwrap_or_default().to_owned())
            .collect()
    }
}

fn bak(target: &Path) -> PathBuf {
    let mut s = target.as_os_str().to_owned();
    s.push(".bak");
    PathBuf::from(s)
}

fn size(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

#[test]
fn strip_shrinks_and_keeps_backup() {
    let fx = Fixture::new();
    fx.tool("strip", "truncate -s 8000 \"$target\"");
    let app = fx.elf(10_000);

    fx.cmd()
        .arg(&app)
        .assert()
        .success()
        .stderr(predicate::str::contains("Size: 8000 bytes"))
        .stderr(predicate::str::contains("[exec]"));

    assert_eq!(size(&bak(&app)), 10_000);
    assert_eq!(size(&app), 8_000);
    assert_eq!(fx.calls(), vec!["strip", "strip"]);
}

#[test]
fn no_tools_leaves_target_alone() {
    let fx = Fixture::new();
    let app = fx.elf(10_000);
    let before = fs::read(&app).unwrap();

    fx.cmd()
        .arg(&app)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No optimization tools found"));

    assert_eq!(fs::read(&app).unwrap(), before);
    assert!(!bak(&app).exists());
}

#[test]
fn unset_path_means_no_tools() {
    let fx = Fixture::new();
    fx.tool("strip", "truncate -s 10 \"$target\"");
    let app = fx.elf(100);

    fx.cmd().env_remove("PATH").arg(&app).assert().code(1);

    assert!(!bak(&app).exists());
}

#[test]
fn rejects_non_elf() {
    let fx = Fixture::new();
    fx.tool("strip", "");
    let script = fx.dir.path().join("run.sh");
    fs::write(&script, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    fx.cmd()
        .arg(&script)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not an ELF binary"));

    assert!(!bak(&script).exists());
    assert!(fx.calls().is_empty());
}

#[test]
fn rejects_non_executable() {
    let fx = Fixture::new();
    fx.tool("strip", "");
    let app = fx.elf(100);
    fs::set_permissions(&app, fs::Permissions::from_mode(0o644)).unwrap();

    fx.cmd()
        .arg(&app)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not an executable file"));

    assert!(!bak(&app).exists());
}

#[test]
fn rejects_missing_target() {
    let fx = Fixture::new();

    fx.cmd()
        .arg(fx.dir.path().join("nope"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Target not found"));
}

#[test]
fn usage_errors_exit_with_one() {
    let fx = Fixture::new();
    fx.tool("strip", "");
    let app = fx.elf(100);

    fx.cmd().assert().code(1);

    fx.cmd()
        .arg(&app)
        .arg("2")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Second argument must be -<times>"));

    fx.cmd()
        .arg(&app)
        .arg("-two")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid optimization count"));

    assert!(!bak(&app).exists());
}

#[test]
fn zero_count_means_one_pass() {
    let fx = Fixture::new();
    // always finds something to take off
    fx.tool("strip", "truncate -s -1 \"$target\"");
    let app = fx.elf(100);

    fx.cmd()
        .arg(&app)
        .arg("-0")
        .assert()
        .success()
        .stderr(predicate::str::contains("Pass 1/1"))
        .stderr(predicate::str::contains("Pass 2/").not());

    assert_eq!(size(&app), 98);
}

#[test]
fn stops_early_without_progress() {
    let fx = Fixture::new();
    fx.tool("strip", "");
    let app = fx.elf(100);

    fx.cmd()
        .arg(&app)
        .arg("-5")
        .assert()
        .success()
        .stderr(predicate::str::contains("Pass 1/5"))
        .stderr(predicate::str::contains("stopping early"))
        .stderr(predicate::str::contains("Pass 2/5").not());

    assert_eq!(fx.calls().len(), 2);
}

#[test]
fn runs_requested_passes_while_shrinking() {
    let fx = Fixture::new();
    fx.tool("strip", "truncate -s -1 \"$target\"");
    let app = fx.elf(100);

    fx.cmd().arg(&app).arg("-3").arg("-q").assert().success();

    assert_eq!(size(&app), 94);
    assert_eq!(size(&bak(&app)), 100);
}

#[test]
fn packer_runs_last() {
    let fx = Fixture::new();
    for tool in ["upx", "sstrip", "patchelf", "objcopy", "llvm-strip"] {
        fx.tool(tool, "");
    }
    let app = fx.elf(100);

    fx.cmd().arg(&app).assert().success();

    assert_eq!(
        fx.calls(),
        vec![
            "llvm-strip",
            "llvm-strip",
            "objcopy",
            "objcopy",
            "objcopy",
            "patchelf",
            "sstrip",
            "upx"
        ]
    );
}

#[test]
fn single_capability_is_enough() {
    let fx = Fixture::new();
    fx.tool("patchelf", "");
    let app = fx.elf(100);

    fx.cmd().arg(&app).assert().success();

    assert_eq!(fx.calls(), vec!["patchelf"]);
}

#[test]
fn backup_is_taken_once() {
    let fx = Fixture::new();
    fx.tool("strip", "truncate -s -10 \"$target\"");
    let app = fx.elf(1000);

    fx.cmd().arg(&app).assert().success();
    fx.cmd().arg(&app).assert().success();

    assert_eq!(size(&app), 960);
    assert_eq!(size(&bak(&app)), 1000);
}

#[test]
fn backup_failure_stops_before_any_tool() {
    let fx = Fixture::new();
    fx.tool("strip", "truncate -s 10 \"$target\"");
    let app = fx.elf(100);
    // dangling: the copy can't create the file it points at
    std::os::unix::fs::symlink(fx.dir.path().join("gone/app.bak"), bak(&app)).unwrap();

    fx.cmd()
        .arg(&app)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to create backup"));

    assert!(fx.calls().is_empty());
    assert_eq!(size(&app), 100);
}

#[test]
fn unusable_preferred_tool_falls_back() {
    let fx = Fixture::new();
    fx.tool("llvm-strip", "truncate -s 10 \"$target\"");
    fx.tool("strip", "truncate -s 50 \"$target\"");
    let app = fx.elf(100);
    let llvm = fx.tools.join("llvm-strip");

    let mut cmd = if rustix::process::geteuid().is_root() {
        // root may execute anything with an x bit, so check as somebody else
        fs::set_permissions(fx.dir.path(), fs::Permissions::from_mode(0o777)).unwrap();
        fs::set_permissions(&app, fs::Permissions::from_mode(0o777)).unwrap();
        fs::set_permissions(&llvm, fs::Permissions::from_mode(0o700)).unwrap();
        // the build directory may not be reachable by that user
        let bin = fx.dir.path().join("optimz");
        fs::copy(assert_cmd::cargo::cargo_bin!("optimz"), &bin).unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

        let mut std_cmd = std::process::Command::new(&bin);
        std_cmd.uid(NOBODY).gid(NOBODY);
        let mut cmd = Command::from_std(std_cmd);
        cmd.env("PATH", &fx.tools).env_remove("RUST_LOG");
        cmd
    } else {
        // group and others may run it, the owner may not
        fs::set_permissions(&llvm, fs::Permissions::from_mode(0o055)).unwrap();
        fx.cmd()
    };

    cmd.arg(&app).assert().success();

    assert_eq!(fx.calls(), vec!["strip", "strip"]);
    assert_eq!(size(&app), 50);
}

#[test]
fn config_file_can_disable_tools() {
    let fx = Fixture::new();
    fx.tool("strip", "truncate -s 10 \"$target\"");
    let app = fx.elf(100);
    fs::write(
        fx.dir.path().join("optimz.toml"),
        "[tools.strip]\ndisabled = true\n",
    )
    .unwrap();

    fx.cmd().arg(&app).assert().code(1);

    assert_eq!(size(&app), 100);
    assert!(!bak(&app).exists());
}

#[test]
fn config_file_sets_pass_count_and_arguments() {
    let fx = Fixture::new();
    fx.tool("upx", "truncate -s -1 \"$target\"");
    let app = fx.elf(100);
    fs::write(
        fx.dir.path().join("optimz.toml"),
        "passes = 2\nupx-args = [\"-9\"]\n",
    )
    .unwrap();

    fx.cmd()
        .arg(&app)
        .assert()
        .success()
        .stderr(predicate::str::contains("Pass 2/2"));

    let log = fs::read_to_string(fx.log()).unwrap();
    assert!(log.lines().all(|l| l.starts_with("upx -9 ")), "{}", log);
    assert_eq!(size(&app), 98);
}
