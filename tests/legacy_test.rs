// tests/legacy_test.rs

//! Conversion of old-style uninstall scripts

use setupdb::legacy::{self, ConvertOptions, DEFAULT_COMPONENT, DEFAULT_OPTION};
use setupdb::{Environment, FileType, Registry};
use std::fs;
use std::os::unix::fs::PermissionsExt;

#[test]
fn test_convert_legacy_script() {
    let home = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let bins = tempfile::tempdir().unwrap();
    let registry = Registry::new(Environment::new(home.path(), "Linux", "x86_64"));

    let r = root.path().display().to_string();
    fs::create_dir(root.path().join("base")).unwrap();
    fs::write(root.path().join("game"), b"binary").unwrap();
    fs::write(root.path().join("base/pak0.pak"), b"data").unwrap();
    let script = root.path().join("uninstall");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\n# Uninstall script for Old Game\nrm -f \"{r}/game\"\nrm -f \"{r}/base/pak0.pak\"\nrm -f \"{r}/gone.txt\"\nrm -f \"{r}/uninstall\"\nrmdir \"{r}/base\"\nrmdir \"{r}\"\n"
        ),
    )
    .unwrap();
    assert!(legacy::is_legacy_script(&script).unwrap());

    let uninstaller = bins.path().join("uninstall");
    fs::write(&uninstaller, "#!/bin/sh\necho 1.0.0\n").unwrap();
    fs::set_permissions(&uninstaller, fs::Permissions::from_mode(0o755)).unwrap();

    let report = legacy::convert_legacy_script(
        &registry,
        &script,
        &ConvertOptions {
            product: "oldgame",
            version: "1.0",
            uninstaller: &uninstaller,
            update_url: None,
        },
    )
    .unwrap();

    assert_eq!(report.registered, 3);
    assert_eq!(report.skipped, vec!["gone.txt".to_string()]);

    // The legacy script was replaced by a launcher
    assert!(!legacy::is_legacy_script(&script).unwrap());
    assert!(home.path().join(".loki/installed/bin/Linux/x86_64/uninstall").exists());

    let product = registry.open("oldgame").unwrap();
    assert_eq!(product.info().description, "Old Game");
    assert_eq!(
        product.info().update_url,
        "ftp://ftp.lokigames.com/pub/patches/oldgame/patchlist.txt"
    );
    let comp = product.find_component(DEFAULT_COMPONENT).unwrap();
    assert_eq!(product.component(comp).unwrap().version, "1.0");
    let opt = product.find_option(comp, DEFAULT_OPTION).unwrap();

    let mut types = Vec::new();
    product.enumerate_files(opt, |visit| types.push((visit.entry.path.clone(), visit.file_type)));
    assert_eq!(
        types,
        vec![
            ("game".to_string(), FileType::Regular),
            ("base/pak0.pak".to_string(), FileType::Regular),
            ("base".to_string(), FileType::Directory),
        ]
    );
}
