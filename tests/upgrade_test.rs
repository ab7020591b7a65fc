// tests/upgrade_test.rs

//! Uninstaller upgrade protocol
//!
//! Runs fake uninstaller binaries, so everything lives in a single test to
//! keep child processes from racing freshly written executables.

use setupdb::uninstaller::{LAUNCHER_MARKER, UninstallerVersion};
use setupdb::{Environment, Registry};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn fake_uninstaller(dir: &Path, name: &str, output: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\necho '{}'\n", output)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn mode(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

#[test]
fn test_upgrade_protocol() {
    let home = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let bins = tempfile::tempdir().unwrap();
    let registry = Registry::new(Environment::new(home.path(), "Linux", "x86_64"));

    registry.create("game", root.path(), None, "").unwrap().close().unwrap();
    let product = registry.open("game").unwrap();
    let cached = home.path().join(".loki/installed/bin/Linux/x86_64/uninstall");
    let launcher = root.path().join("uninstall");

    // No cached binary: always installed
    let v120 = fake_uninstaller(bins.path(), "v120", "1.2.0");
    let report = registry.upgrade_uninstaller(&product, &v120).unwrap();
    assert!(report.upgraded);
    assert_eq!(report.previous, None);
    assert_eq!(report.binary, cached);
    assert_eq!(fs::read(&cached).unwrap(), fs::read(&v120).unwrap());
    assert_eq!(mode(&cached), 0o755);
    assert_eq!(report.launcher, launcher);
    assert_eq!(mode(&launcher), 0o755);
    let script = fs::read_to_string(&launcher).unwrap();
    assert!(script.lines().nth(1).unwrap().starts_with(LAUNCHER_MARKER));
    assert!(script.contains(&root.path().join(".manifest/game.xml").display().to_string()));

    // Newer candidate replaces it
    let v121 = fake_uninstaller(bins.path(), "v121", "uninstall 1.2.1");
    let report = registry.upgrade_uninstaller(&product, &v121).unwrap();
    assert!(report.upgraded);
    assert_eq!(report.previous, Some(UninstallerVersion::new(1, 2, 0)));
    assert_eq!(report.candidate, Some(UninstallerVersion::new(1, 2, 1)));
    assert_eq!(fs::read(&cached).unwrap(), fs::read(&v121).unwrap());

    // Same version: binary kept, launcher still rewritten
    fs::remove_file(&launcher).unwrap();
    let same = fake_uninstaller(bins.path(), "same", "1.2.1");
    let report = registry.upgrade_uninstaller(&product, &same).unwrap();
    assert!(!report.upgraded);
    assert_eq!(fs::read(&cached).unwrap(), fs::read(&v121).unwrap());
    assert!(launcher.exists());

    // Older candidate is ignored
    let older = fake_uninstaller(bins.path(), "older", "1.1.9");
    assert!(!registry.upgrade_uninstaller(&product, &older).unwrap().upgraded);

    // Candidate without a version never replaces a working binary
    let silent = fake_uninstaller(bins.path(), "silent", "no version here");
    let report = registry.upgrade_uninstaller(&product, &silent).unwrap();
    assert!(!report.upgraded);
    assert_eq!(report.candidate, None);
    assert_eq!(fs::read(&cached).unwrap(), fs::read(&v121).unwrap());

    // A broken cached binary is replaced by anything
    fs::write(&cached, "#!/bin/sh\necho garbage\n").unwrap();
    let report = registry.upgrade_uninstaller(&product, &older).unwrap();
    assert!(report.upgraded);
    assert_eq!(report.previous, None);
    assert_eq!(fs::read(&cached).unwrap(), fs::read(&older).unwrap());

    // Temporary probe copies are cleaned up
    let leftovers = fs::read_dir(std::env::temp_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("setupdb-probe."))
        .count();
    assert_eq!(leftovers, 0);

    product.close().unwrap();
}
