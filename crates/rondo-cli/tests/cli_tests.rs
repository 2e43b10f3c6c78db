//! End-to-end tests driving the `rondo` binary against fixture
//! repositories and a temp rootfs.

use assert_cmd::Command;
use predicates::prelude::*;
use rondo_test_utils::{RepositoryFixture, file, package};
use std::path::PathBuf;
use tempfile::TempDir;

struct CliEnv {
    _repo_dir: TempDir,
    state_dir: TempDir,
    config_path: PathBuf,
}

impl CliEnv {
    fn new(fixture: RepositoryFixture) -> Self {
        let repo_dir = fixture.write();
        let state_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(state_dir.path().join("rootfs")).unwrap();

        let config = serde_json::json!({
            "system": {
                "db_path": state_dir.path().join("db"),
                "rootfs": state_dir.path().join("rootfs"),
            },
            "config_protect": ["/etc"],
            "repositories": [
                { "name": "main", "url": format!("dir://{}", repo_dir.path().display()) }
            ]
        });
        let config_path = state_dir.path().join("rondo.json");
        std::fs::write(&config_path, serde_json::to_vec_pretty(&config).unwrap()).unwrap();

        Self {
            _repo_dir: repo_dir,
            state_dir,
            config_path,
        }
    }

    fn rondo(&self) -> Command {
        let mut cmd = Command::cargo_bin("rondo").unwrap();
        cmd.arg("--config").arg(&self.config_path);
        cmd
    }

    fn rootfs_file(&self, rel: &str) -> PathBuf {
        self.state_dir.path().join("rootfs").join(rel)
    }
}

fn busybox_fixture() -> RepositoryFixture {
    RepositoryFixture::new("main")
        .add(
            package("system/busybox-1.36.0").build(),
            &[file("bin/busybox", b"busybox binary")],
        )
        .add(
            package("shells/bash-5.2").build(),
            &[file("usr/bin/bash", b"bash binary")],
        )
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("rondo")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("replace"))
        .stdout(predicate::str::contains("reclaim"));
}

#[test]
fn install_search_uninstall_roundtrip() {
    let env = CliEnv::new(busybox_fixture());

    env.rondo()
        .args(["install", "-y", "system/busybox"])
        .assert()
        .success();
    assert!(env.rootfs_file("bin/busybox").exists());

    env.rondo()
        .args(["search", "--installed", "busybox"])
        .assert()
        .success()
        .stdout(predicate::str::contains("system/busybox"));

    env.rondo()
        .args(["uninstall", "-y", "system/busybox"])
        .assert()
        .success();
    assert!(!env.rootfs_file("bin/busybox").exists());

    env.rondo()
        .args(["search", "--installed", "busybox"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no packages found"));
}

#[test]
fn replace_swaps_package_sets() {
    let env = CliEnv::new(busybox_fixture());

    env.rondo()
        .args(["install", "-y", "system/busybox"])
        .assert()
        .success();

    env.rondo()
        .args(["replace", "-y", "system/busybox", "--for", "shells/bash"])
        .assert()
        .success();

    assert!(!env.rootfs_file("bin/busybox").exists());
    assert!(env.rootfs_file("usr/bin/bash").exists());
}

#[test]
fn unsatisfiable_constraints_exit_2() {
    let fixture = RepositoryFixture::new("main")
        .add(
            package("apps/pkgA-1.0").requires("libs/libX>=2").build(),
            &[file("usr/bin/pkgA", b"pkgA")],
        )
        .add(
            package("libs/libX-1").build(),
            &[file("usr/lib/libX.so", b"libX")],
        );
    let env = CliEnv::new(fixture);

    env.rondo()
        .args(["install", "-y", "apps/pkgA"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn unknown_package_exits_1() {
    let env = CliEnv::new(busybox_fixture());

    env.rondo()
        .args(["install", "-y", "apps/ghost"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn invalid_package_string_exits_1() {
    let env = CliEnv::new(busybox_fixture());

    env.rondo()
        .args(["install", "-y", "shells/bash=>5"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid package string"));
}

#[test]
fn download_only_leaves_system_untouched() {
    let env = CliEnv::new(busybox_fixture());

    env.rondo()
        .args(["install", "-y", "--download-only", "system/busybox"])
        .assert()
        .success();
    assert!(!env.rootfs_file("bin/busybox").exists());
    assert!(env.rootfs_file(".rondo-cache").exists());
}

#[test]
fn reclaim_adopts_existing_files() {
    let env = CliEnv::new(busybox_fixture());

    // Put busybox's file in place without telling the database.
    std::fs::create_dir_all(env.rootfs_file("bin")).unwrap();
    std::fs::write(env.rootfs_file("bin/busybox"), b"busybox binary").unwrap();

    env.rondo()
        .args(["reclaim"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 package(s) reclaimed"));

    env.rondo()
        .args(["search", "--installed", "busybox"])
        .assert()
        .success()
        .stdout(predicate::str::contains("system/busybox"));
}

#[test]
fn upgrade_reports_up_to_date() {
    let env = CliEnv::new(busybox_fixture());
    env.rondo()
        .args(["upgrade", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}
