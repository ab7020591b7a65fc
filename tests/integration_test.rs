// tests/integration_test.rs

//! Integration tests for SetupDB
//!
//! These tests drive the public API end to end: create a product, populate
//! it, close it and check what a fresh open sees.

use setupdb::digest::Md5Digest;
use setupdb::registry::FileKind;
use setupdb::{Environment, Error, FileOwner, FileType, Registry, ScriptKind};
use std::fs;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::Path;
use tempfile::TempDir;

struct Fixture {
    _home: TempDir,
    root: TempDir,
    registry: Registry,
}

fn fixture() -> Fixture {
    let home = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let registry = Registry::new(Environment::new(home.path(), "Linux", "x86_64"));
    Fixture {
        _home: home,
        root,
        registry,
    }
}

fn write_file(root: &Path, rel: &str, content: &[u8], mode: u32) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
}

#[test]
fn test_product_roundtrip() {
    let fx = fixture();
    let product = fx
        .registry
        .create("game", fx.root.path(), Some("The Game"), "http://updates.example.com/game")
        .unwrap();
    product.close().unwrap();

    let product = fx.registry.open("game").unwrap();
    let info = product.info();
    assert_eq!(info.name, "game");
    assert_eq!(info.description, "The Game");
    assert_eq!(info.root, fx.root.path());
    assert_eq!(info.update_url, "http://updates.example.com/game");
    assert_eq!(info.registry_path, fx.root.path().join(".manifest/game.xml"));
    assert!(product.components().is_empty());

    // Reopen by absolute path as well
    let by_path = fx
        .registry
        .open(fx.root.path().join(".manifest/game.xml").to_str().unwrap())
        .unwrap();
    assert_eq!(by_path.info(), product.info());
}

#[test]
fn test_game_scenario() {
    let fx = fixture();
    write_file(fx.root.path(), "bin/game", b"\x7fELF fake binary", 0o755);

    let mut product = fx
        .registry
        .create("game", fx.root.path(), None, "http://example.com")
        .unwrap();
    let comp = product.create_component("Base", "1.0");
    let opt = product.create_option(comp, "Binaries").unwrap();
    product.register_file(opt, "bin/game", None).unwrap();
    product.close().unwrap();

    let product = fx.registry.open("game").unwrap();
    let comp = product.find_component("Base").unwrap();
    assert_eq!(product.default_component(), Some(comp));
    let opt = product.find_option(comp, "Binaries").unwrap();

    let mut visits = Vec::new();
    let count = product.enumerate_files(opt, |visit| {
        visits.push((visit.path, visit.file_type, visit.entry.mode, visit.entry.patched));
    });

    assert_eq!(count, 1);
    assert_eq!(
        visits,
        vec![(fx.root.path().join("bin/game"), FileType::Regular, 0o755, false)]
    );
}

#[test]
fn test_patched_survives_reopen() {
    let fx = fixture();
    write_file(fx.root.path(), "data.pak", b"original", 0o644);

    let mut product = fx.registry.create("game", fx.root.path(), None, "").unwrap();
    let comp = product.create_component("Base", "1.0");
    let opt = product.create_option(comp, "Data").unwrap();
    product.register_file(opt, "data.pak", None).unwrap();
    product.close().unwrap();

    write_file(fx.root.path(), "data.pak", b"modified by a patch", 0o644);

    let mut product = fx.registry.open("game").unwrap();
    let comp = product.find_component("Base").unwrap();
    let opt = product.find_option(comp, "Data").unwrap();
    let id = product.register_file(opt, "data.pak", None).unwrap();
    assert_eq!(product.files(opt).len(), 1);
    assert!(product.file(id).unwrap().patched);
    product.close().unwrap();

    let product = fx.registry.open("game").unwrap();
    let id = product.find_by_path("data.pak").unwrap();
    let entry = product.file(id).unwrap();
    assert!(entry.patched);
    assert_eq!(*entry.md5().unwrap(), Md5Digest::of_bytes(b"modified by a patch"));
}

#[test]
fn test_unchanged_recheck_keeps_product_clean() {
    let fx = fixture();
    write_file(fx.root.path(), "data.pak", b"original", 0o644);

    let mut product = fx.registry.create("game", fx.root.path(), None, "").unwrap();
    let comp = product.create_component("Base", "1.0");
    let opt = product.create_option(comp, "Data").unwrap();
    product.register_file(opt, "data.pak", None).unwrap();
    product.close().unwrap();

    let mut product = fx.registry.open("game").unwrap();
    let comp = product.find_component("Base").unwrap();
    let opt = product.find_option(comp, "Data").unwrap();
    let id = product.register_file(opt, "data.pak", None).unwrap();
    product.update_digest("data.pak").unwrap();

    assert!(!product.file(id).unwrap().patched);
    assert!(!product.is_dirty());
    // Ownership is only known for entries registered in this session
    assert_eq!(product.file(id).unwrap().ownership, None);
    product.close().unwrap();
}

#[test]
fn test_leading_space_path_survives_reopen() {
    let fx = fixture();
    write_file(fx.root.path(), " notes.txt", b"notes", 0o644);

    let mut product = fx.registry.create("game", fx.root.path(), None, "").unwrap();
    let comp = product.create_component("Base", "1.0");
    let opt = product.create_option(comp, "Docs").unwrap();
    product.register_file(opt, " notes.txt", None).unwrap();
    product.close().unwrap();

    let product = fx.registry.open("game").unwrap();
    let id = product.find_by_path(" notes.txt").unwrap();
    assert_eq!(product.file(id).unwrap().path, " notes.txt");
    assert!(product.find_by_path("notes.txt").is_none());
}

#[test]
fn test_symlink_target_refresh() {
    let fx = fixture();
    write_file(fx.root.path(), "v1", b"1", 0o644);
    write_file(fx.root.path(), "v2", b"2", 0o644);
    symlink("v1", fx.root.path().join("current")).unwrap();

    let mut product = fx.registry.create("game", fx.root.path(), None, "").unwrap();
    let comp = product.create_component("Base", "1.0");
    let opt = product.create_option(comp, "Links").unwrap();
    let id = product.register_file(opt, "current", None).unwrap();
    assert_eq!(
        product.file(id).unwrap().kind,
        FileKind::Symlink {
            target: Some("v1".to_string())
        }
    );

    fs::remove_file(fx.root.path().join("current")).unwrap();
    symlink("v2", fx.root.path().join("current")).unwrap();
    product.register_file(opt, "current", None).unwrap();

    let entry = product.file(id).unwrap();
    assert_eq!(
        entry.kind,
        FileKind::Symlink {
            target: Some("v2".to_string())
        }
    );
    assert!(!entry.patched);
    product.close().unwrap();

    let product = fx.registry.open("game").unwrap();
    let id = product.find_by_path("current").unwrap();
    assert_eq!(product.file(id).unwrap().file_type(), FileType::Symlink);
}

#[test]
fn test_unregister_then_find() {
    let fx = fixture();
    write_file(fx.root.path(), "readme.txt", b"read me", 0o644);

    let mut product = fx.registry.create("game", fx.root.path(), None, "").unwrap();
    let comp = product.create_component("Base", "1.0");
    let opt = product.create_option(comp, "Docs").unwrap();
    product.register_file(opt, "readme.txt", None).unwrap();
    assert!(product.find_by_path("readme.txt").is_some());

    product.unregister_path(opt, "readme.txt").unwrap();
    assert!(product.find_by_path("readme.txt").is_none());
    product.close().unwrap();

    let product = fx.registry.open("game").unwrap();
    assert!(product.find_by_path("readme.txt").is_none());
}

#[test]
fn test_default_component_is_first() {
    let fx = fixture();
    let mut product = fx.registry.create("game", fx.root.path(), None, "").unwrap();
    let base = product.create_component("Base", "1.0");
    product.create_component("Expansion", "1.1");
    assert_eq!(product.default_component(), Some(base));
    product.close().unwrap();

    let product = fx.registry.open("game").unwrap();
    let base = product.find_component("Base").unwrap();
    let expansion = product.find_component("Expansion").unwrap();
    assert_eq!(product.default_component(), Some(base));
    assert!(!product.component(expansion).unwrap().is_default);
    // Newest first, preserved across reopen
    assert_eq!(product.components(), &[expansion, base]);
}

#[test]
fn test_close_without_changes_does_not_write() {
    let fx = fixture();
    fx.registry.create("game", fx.root.path(), None, "").unwrap().close().unwrap();

    let doc = fx.root.path().join(".manifest/game.xml");
    let before = fs::metadata(&doc).unwrap().modified().unwrap();

    let product = fx.registry.open("game").unwrap();
    assert!(!product.is_dirty());
    product.close().unwrap();

    assert_eq!(fs::metadata(&doc).unwrap().modified().unwrap(), before);
}

#[test]
fn test_rpm_and_scripts_roundtrip() {
    let fx = fixture();
    let mut product = fx.registry.create("game", fx.root.path(), None, "").unwrap();
    let comp = product.create_component("Base", "1.0");
    let opt = product.create_option(comp, "Libraries").unwrap();
    product.register_rpm(opt, "libfoo", "2.1", 3, true).unwrap();
    product
        .register_script(FileOwner::Component(comp), ScriptKind::PostUninstall, "cleanup", "true")
        .unwrap();
    product.close().unwrap();

    let product = fx.registry.open("game").unwrap();
    let comp = product.find_component("Base").unwrap();
    let opt = product.find_option(comp, "Libraries").unwrap();
    let rpm = product.file(product.files(opt)[0]).unwrap();
    assert_eq!(
        rpm.kind,
        FileKind::Rpm {
            version: "2.1".to_string(),
            revision: 3,
            autoremove: true
        }
    );
    let script = product.file(product.component(comp).unwrap().scripts()[0]).unwrap();
    assert_eq!(script.path, "cleanup");
    assert_eq!(script.script_kind(), Some(ScriptKind::PostUninstall));
}

#[test]
fn test_product_listing_and_remove() {
    let fx = fixture();
    let other_root = tempfile::tempdir().unwrap();
    let product_root = other_root.path().join("install");
    fx.registry.create("beta", fx.root.path(), None, "").unwrap().close().unwrap();
    fx.registry.create("alpha", &product_root, None, "").unwrap().close().unwrap();

    assert_eq!(fx.registry.product_names().unwrap(), vec!["alpha", "beta"]);

    let report = fx.registry.open("alpha").unwrap().remove();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(!product_root.exists());
    assert_eq!(fx.registry.product_names().unwrap(), vec!["beta"]);
    assert!(matches!(fx.registry.open("alpha"), Err(Error::ProductNotFound(_))));
}

#[test]
fn test_remove_keeps_nonempty_root() {
    let fx = fixture();
    write_file(fx.root.path(), "leftover", b"x", 0o644);
    fx.registry.create("game", fx.root.path(), None, "").unwrap().close().unwrap();

    let report = fx.registry.open("game").unwrap().remove();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, fx.root.path());
    assert!(fx.root.path().join("leftover").exists());
    assert!(!fx.root.path().join(".manifest").exists());
}
