//! End-to-end transactions against a temp rootfs and a local repository.

use rondo_core::{Config, Context, Fingerprint, Selector};
use rondo_database::{FilesystemDatabase, PackageDatabase};
use rondo_installer::{Installer, InstallerError, InstallerOptions, System};
use rondo_repository::LocalRepository;
use rondo_test_utils::{RepositoryFixture, file, package};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct TestEnv {
    // Keeps fixture directories alive for the test's duration.
    _repo_dir: TempDir,
    _state_dir: TempDir,
    system: System,
    installer: Installer,
    ctx: Context,
}

impl TestEnv {
    fn new(fixture: RepositoryFixture, options: InstallerOptions, protect: Vec<PathBuf>) -> Self {
        let repo_dir = fixture.write();
        let state_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(state_dir.path().join("rootfs")).unwrap();

        let database = FilesystemDatabase::open(state_dir.path().join("db")).unwrap();
        let system = System::new(Arc::new(database), state_dir.path().join("rootfs"));

        let repository = LocalRepository::open(repo_dir.path(), 0, None).unwrap();
        let installer = Installer::new(options, vec![Arc::new(repository)]);

        let config = Config {
            config_protect: protect,
            ..Config::default()
        };

        Self {
            _repo_dir: repo_dir,
            _state_dir: state_dir,
            system,
            installer,
            ctx: Context::new(config),
        }
    }

    fn rootfs_file(&self, rel: &str) -> PathBuf {
        self.system.target.join(rel)
    }

    fn installed(&self, fingerprint: &str) -> bool {
        self.system
            .database
            .contains(&Fingerprint::new(fingerprint))
    }
}

fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap()
}

fn busybox_world() -> RepositoryFixture {
    RepositoryFixture::new("main")
        .add(
            package("system/busybox-1.36.0").build(),
            &[file("bin/busybox", b"busybox binary")],
        )
        .add(
            package("shells/bash-5.2").build(),
            &[file("usr/bin/bash", b"bash binary")],
        )
        .add(
            package("system/coreutils-9.4")
                .requires("libs/acl")
                .build(),
            &[file("usr/bin/ls", b"ls binary")],
        )
        .add(
            package("libs/acl-2.3").build(),
            &[file("usr/lib/libacl.so", b"acl library")],
        )
}

#[tokio::test]
async fn install_places_files_and_records_manifest() {
    let env = TestEnv::new(busybox_world(), InstallerOptions::default(), vec![]);

    let summary = env
        .installer
        .install(&env.ctx, &[sel("system/busybox")], &env.system)
        .await
        .unwrap();

    assert_eq!(summary.installed, vec![Fingerprint::new("system/busybox-1.36.0")]);
    assert!(env.installed("system/busybox-1.36.0"));
    assert_eq!(
        std::fs::read(env.rootfs_file("bin/busybox")).unwrap(),
        b"busybox binary"
    );
    let manifest = env
        .system
        .database
        .files_of(&Fingerprint::new("system/busybox-1.36.0"))
        .unwrap();
    assert_eq!(manifest.paths().collect::<Vec<_>>(), vec!["bin/busybox"]);
}

#[tokio::test]
async fn completed_transaction_is_idempotent() {
    let env = TestEnv::new(busybox_world(), InstallerOptions::default(), vec![]);

    env.installer
        .install(&env.ctx, &[sel("system/busybox")], &env.system)
        .await
        .unwrap();
    let again = env
        .installer
        .install(&env.ctx, &[sel("system/busybox")], &env.system)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn swap_replaces_busybox_with_bash_and_coreutils() {
    let env = TestEnv::new(busybox_world(), InstallerOptions::default(), vec![]);

    env.installer
        .install(&env.ctx, &[sel("system/busybox")], &env.system)
        .await
        .unwrap();

    let summary = env
        .installer
        .swap(
            &env.ctx,
            &[sel("system/busybox")],
            &[sel("shells/bash"), sel("system/coreutils")],
            &env.system,
        )
        .await
        .unwrap();

    assert_eq!(summary.removed, vec![Fingerprint::new("system/busybox-1.36.0")]);
    assert!(!env.installed("system/busybox-1.36.0"));
    assert!(!env.rootfs_file("bin/busybox").exists());

    // Replacements and their requirements landed.
    assert!(env.installed("shells/bash-5.2"));
    assert!(env.installed("system/coreutils-9.4"));
    assert!(env.installed("libs/acl-2.3"));
    assert!(env.rootfs_file("usr/bin/bash").exists());
    assert!(env.rootfs_file("usr/bin/ls").exists());
}

#[tokio::test]
async fn failed_swap_restores_database_state() {
    // A third package already owns bash's path, so the swap's install step
    // must fail and the whole transaction unwind.
    let fixture = busybox_world().add(
        package("apps/squatter-1.0").build(),
        &[file("usr/bin/bash", b"squatter binary")],
    );
    let env = TestEnv::new(fixture, InstallerOptions::default(), vec![]);

    env.installer
        .install(
            &env.ctx,
            &[sel("system/busybox"), sel("apps/squatter")],
            &env.system,
        )
        .await
        .unwrap();

    let err = env
        .installer
        .swap(
            &env.ctx,
            &[sel("system/busybox")],
            &[sel("shells/bash")],
            &env.system,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, InstallerError::FileConflict { .. }));

    // Bash never landed; busybox's record is back, flagged broken.
    assert!(!env.installed("shells/bash-5.2"));
    assert!(env.installed("system/busybox-1.36.0"));
    assert_eq!(
        env.system.database.broken(),
        vec![Fingerprint::new("system/busybox-1.36.0")]
    );
    // The squatter was never touched.
    assert_eq!(
        std::fs::read(env.rootfs_file("usr/bin/bash")).unwrap(),
        b"squatter binary"
    );
}

#[tokio::test]
async fn config_protect_diverts_upgraded_files() {
    let fixture = RepositoryFixture::new("main")
        .add(
            package("apps/app-1.0").build(),
            &[
                file("etc/app.conf", b"config v1"),
                file("usr/bin/app", b"app v1"),
            ],
        )
        .add(
            package("apps/app-2.0").build(),
            &[
                file("etc/app.conf", b"config v2"),
                file("usr/bin/app", b"app v2"),
            ],
        );
    let env = TestEnv::new(
        fixture,
        InstallerOptions::default(),
        vec![PathBuf::from("/etc")],
    );

    env.installer
        .install(&env.ctx, &[sel("apps/app=1.0")], &env.system)
        .await
        .unwrap();
    assert_eq!(
        std::fs::read(env.rootfs_file("etc/app.conf")).unwrap(),
        b"config v1"
    );

    env.installer.upgrade(&env.ctx, &env.system).await.unwrap();

    // The original file is untouched; the incoming version landed beside
    // it; the database lists v2 as installed.
    assert_eq!(
        std::fs::read(env.rootfs_file("etc/app.conf")).unwrap(),
        b"config v1"
    );
    assert_eq!(
        std::fs::read(env.rootfs_file("etc/app.conf.new")).unwrap(),
        b"config v2"
    );
    assert_eq!(std::fs::read(env.rootfs_file("usr/bin/app")).unwrap(), b"app v2");
    assert!(!env.installed("apps/app-1.0"));
    assert!(env.installed("apps/app-2.0"));

    let manifest = env
        .system
        .database
        .files_of(&Fingerprint::new("apps/app-2.0"))
        .unwrap();
    assert!(manifest.paths().any(|p| p == "etc/app.conf.new"));
}

#[tokio::test]
async fn file_conflicts_abort_unless_forced() {
    let fixture = RepositoryFixture::new("main")
        .add(
            package("apps/first-1.0").build(),
            &[file("usr/share/data", b"first")],
        )
        .add(
            package("apps/second-1.0").build(),
            &[file("usr/share/data", b"second")],
        );

    let env = TestEnv::new(fixture, InstallerOptions::default(), vec![]);
    env.installer
        .install(&env.ctx, &[sel("apps/first")], &env.system)
        .await
        .unwrap();

    let err = env
        .installer
        .install(&env.ctx, &[sel("apps/second")], &env.system)
        .await
        .unwrap_err();
    let InstallerError::FileConflict { path, owner, newowner } = err else {
        panic!("expected a file conflict");
    };
    assert_eq!(path, "usr/share/data");
    assert_eq!(owner, Fingerprint::new("apps/first-1.0"));
    assert_eq!(newowner, Fingerprint::new("apps/second-1.0"));

    // Forced, the conflict is overridden.
    let forced = Installer::new(
        InstallerOptions {
            force: true,
            ..Default::default()
        },
        env.installer_repositories(),
    );
    forced
        .install(&env.ctx, &[sel("apps/second")], &env.system)
        .await
        .unwrap();
    assert!(env.installed("apps/second-1.0"));
}

impl TestEnv {
    fn installer_repositories(&self) -> Vec<Arc<dyn rondo_repository::Repository>> {
        // Re-open the fixture repository for a second installer instance.
        let repo = LocalRepository::open(self._repo_dir.path(), 0, None).unwrap();
        vec![Arc::new(repo)]
    }
}

#[tokio::test]
async fn download_only_populates_cache_without_mutation() {
    let env = TestEnv::new(
        busybox_world(),
        InstallerOptions {
            download_only: true,
            ..Default::default()
        },
        vec![],
    );

    let summary = env
        .installer
        .install(&env.ctx, &[sel("system/busybox")], &env.system)
        .await
        .unwrap();

    assert!(summary.download_only);
    assert!(!env.installed("system/busybox-1.36.0"));
    assert!(!env.rootfs_file("bin/busybox").exists());

    let cached: Vec<_> = std::fs::read_dir(env.system.cache_dir())
        .unwrap()
        .collect();
    assert!(!cached.is_empty());
}

#[tokio::test]
async fn cancellation_aborts_before_commit() {
    let env = TestEnv::new(busybox_world(), InstallerOptions::default(), vec![]);
    env.ctx.cancel();

    let err = env
        .installer
        .install(&env.ctx, &[sel("system/busybox")], &env.system)
        .await
        .unwrap_err();
    assert!(matches!(err, InstallerError::Interrupted));
    assert!(!env.installed("system/busybox-1.36.0"));
}
