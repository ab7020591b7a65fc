// src/legacy.rs

//! Conversion of pre-registry uninstall scripts
//!
//! Older installers left a plain shell script in the install root that
//! removed every installed file with `rm -f` and every directory with
//! `rmdir`. Those scripts are parsed back into a registry: one default
//! component and option holding every path that still exists.

use crate::error::{Error, Result};
use crate::registry::{Product, Registry};
use crate::uninstaller::LAUNCHER_MARKER;
use nix::unistd::{AccessFlags, access};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Update URL used when none is given; `%s` is replaced by the product name
pub const DEFAULT_UPDATE_URL: &str = "ftp://ftp.lokigames.com/pub/patches/%s/patchlist.txt";

/// Name of the component created for converted products
pub const DEFAULT_COMPONENT: &str = "Default Component";

/// Name of the option created for converted products
pub const DEFAULT_OPTION: &str = "Default Option";

const DESCRIPTION_PREFIX: &str = "# Uninstall script for ";

/// What a legacy script removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyEntryKind {
    File,
    Directory,
}

/// One path removed by a legacy script, relative to the install root
/// unless it lies outside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyEntry {
    pub path: String,
    pub kind: LegacyEntryKind,
}

/// Parsed content of a legacy uninstall script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyScript {
    pub description: Option<String>,
    pub entries: Vec<LegacyEntry>,
}

/// Whether `path` is an old-style script rather than a generated launcher
pub fn is_legacy_script(path: &Path) -> Result<bool> {
    let file = fs::File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    let second = BufReader::new(file).lines().nth(1).transpose()?;
    Ok(!second.is_some_and(|line| line.starts_with(LAUNCHER_MARKER)))
}

/// Parse a legacy script's removal commands
///
/// Paths under `root` are made root-relative. The script's own file and the
/// root directory itself are skipped.
pub fn parse_legacy_script(content: &str, root: &Path) -> LegacyScript {
    let mut script = LegacyScript::default();
    let root_str = root.to_string_lossy();
    let root_str = root_str.trim_end_matches('/');

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if index == 1 {
            script.description = line
                .strip_prefix(DESCRIPTION_PREFIX)
                .map(|desc| desc.trim().to_string())
                .filter(|desc| !desc.is_empty());
            continue;
        }

        let (kind, arg) = if let Some(rest) = line.strip_prefix("rmdir ") {
            (LegacyEntryKind::Directory, rest)
        } else if let Some(rest) = line.strip_prefix("rm ") {
            (LegacyEntryKind::File, rest.trim_start().trim_start_matches("-f").trim_start())
        } else {
            continue;
        };

        let raw = unquote(arg.trim());
        if raw.is_empty() || raw.trim_end_matches('/') == root_str {
            continue;
        }

        let path = match raw.strip_prefix(root_str).and_then(|rest| rest.strip_prefix('/')) {
            Some(relative) if !relative.is_empty() => relative.to_string(),
            _ => raw.to_string(),
        };

        if kind == LegacyEntryKind::File && path == crate::uninstaller::LAUNCHER_NAME {
            continue;
        }
        script.entries.push(LegacyEntry { path, kind });
    }

    script
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}

/// Parameters of a conversion
#[derive(Debug, Clone)]
pub struct ConvertOptions<'a> {
    pub product: &'a str,
    pub version: &'a str,
    /// Uninstaller binary offered as the shared uninstaller
    pub uninstaller: &'a Path,
    /// Defaults to [`DEFAULT_UPDATE_URL`] for the product
    pub update_url: Option<&'a str>,
}

/// Outcome of a conversion
#[derive(Debug, Clone, Default)]
pub struct ConversionReport {
    pub registry_path: PathBuf,
    pub registered: usize,
    /// Paths named by the script that no longer exist or cannot be tracked
    pub skipped: Vec<String>,
}

/// Convert the legacy script at `script` into a registry
///
/// The script's directory is the install root. The product is created,
/// populated, given a launcher (replacing the legacy script) and saved.
pub fn convert_legacy_script(
    registry: &Registry,
    script: &Path,
    options: &ConvertOptions<'_>,
) -> Result<ConversionReport> {
    let script = if script.is_absolute() {
        script.to_path_buf()
    } else {
        std::env::current_dir()?.join(script)
    };
    let root = script
        .parent()
        .ok_or_else(|| Error::IoError(format!("{} has no parent directory", script.display())))?
        .to_path_buf();

    access(&root, AccessFlags::W_OK).map_err(|e| {
        Error::IoError(format!("No write access to installation directory {}: {}", root.display(), e))
    })?;

    let content = fs::read_to_string(&script)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", script.display(), e)))?;
    let parsed = parse_legacy_script(&content, &root);
    debug!("Legacy script lists {} entries", parsed.entries.len());

    let update_url = options
        .update_url
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_UPDATE_URL.replace("%s", options.product));
    let description = parsed.description.as_deref().unwrap_or(options.product);

    let mut product = registry.create(options.product, &root, Some(description), &update_url)?;
    let mut report = populate(&mut product, &parsed, options.version)?;
    report.registry_path = product.registry_path().to_path_buf();

    if let Err(e) = registry.upgrade_uninstaller(&product, options.uninstaller) {
        warn!("Failed to install uninstaller: {}", e);
    }
    product.close()?;

    info!(
        "Converted {}: {} entries registered, {} skipped",
        options.product,
        report.registered,
        report.skipped.len()
    );
    Ok(report)
}

fn populate(product: &mut Product, script: &LegacyScript, version: &str) -> Result<ConversionReport> {
    let component = product.create_component(DEFAULT_COMPONENT, version);
    let option = product.create_option(component, DEFAULT_OPTION)?;

    let mut report = ConversionReport::default();
    for entry in &script.entries {
        match product.register_file(option, &entry.path, None) {
            Ok(_) => report.registered += 1,
            Err(Error::NotFound(_) | Error::UnsupportedFileType(_)) => {
                debug!("Skipping {}", entry.path);
                report.skipped.push(entry.path.clone());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}
