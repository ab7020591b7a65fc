// src/uninstaller.rs

//! Shared uninstaller binary and per-product launcher
//!
//! One uninstaller binary per OS/architecture is cached under
//! `~/.loki/installed/bin/<os>/<arch>/uninstall`. Installers offer their own
//! copy on every run; it replaces the cached one only when it reports a
//! newer `--version`. Each product also gets a small `uninstall` shell
//! script in its install root that finds a usable uninstaller and hands it
//! the product's registry document.

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::registry::{Product, schema};
use serde::Serialize;
use std::fmt;
use std::fs::{self, DirBuilder, Permissions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

/// Marker on the second line of every generated launcher
pub const LAUNCHER_MARKER: &str = "#### UNINSTALL SCRIPT";

/// Uninstaller found on `PATH` takes precedence over the cached binary
pub const GLOBAL_UNINSTALLER: &str = "loki_uninstall";

/// Name of the launcher script in each install root
pub const LAUNCHER_NAME: &str = "uninstall";

/// `MAJOR.MINOR.RELEASE` as printed by `uninstall --version`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UninstallerVersion {
    pub major: u32,
    pub minor: u32,
    pub release: u32,
}

impl UninstallerVersion {
    pub const fn new(major: u32, minor: u32, release: u32) -> Self {
        Self { major, minor, release }
    }
}

impl fmt::Display for UninstallerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.release)
    }
}

impl FromStr for UninstallerVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_version(s.as_bytes())
    }
}

/// Extract the first `MAJOR.MINOR.RELEASE` token from program output
pub fn parse_version(output: &[u8]) -> Result<UninstallerVersion> {
    let text = String::from_utf8_lossy(output);
    text.split_whitespace()
        .find_map(parse_triplet)
        .ok_or_else(|| Error::VersionParse(format!("No version number in {:?}", text.trim())))
}

fn parse_triplet(token: &str) -> Option<UninstallerVersion> {
    let mut parts = token.splitn(3, '.');
    let major = leading_number(parts.next()?)?;
    let minor = leading_number(parts.next()?)?;
    let release = leading_number(parts.next()?)?;
    Some(UninstallerVersion::new(major, minor, release))
}

fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Whether a candidate should replace the cached uninstaller
///
/// A missing or unusable cached binary is always replaced. A candidate whose
/// version cannot be determined never replaces a working one.
pub fn should_upgrade(current: Option<UninstallerVersion>, candidate: Option<UninstallerVersion>) -> bool {
    match (current, candidate) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(current), Some(candidate)) => candidate > current,
    }
}

/// Run `binary --version` and parse its output
pub fn probe_version(binary: &Path) -> Result<UninstallerVersion> {
    let output = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| Error::IoError(format!("Failed to run {}: {}", binary.display(), e)))?;

    let version = parse_version(&output.stdout)?;
    debug!("{} reports version {}", binary.display(), version);
    Ok(version)
}

/// Probe a candidate through a private executable copy
///
/// The candidate may sit on read-only or `noexec` media, so it is copied to
/// a temporary file first. The copy is deleted whatever the outcome.
pub fn probe_candidate(candidate: &Path) -> Result<UninstallerVersion> {
    match executable_copy(candidate) {
        Ok(temp) => {
            let result = probe_version(&temp);
            if let Err(e) = temp.close() {
                warn!("Failed to delete temporary copy of {}: {}", candidate.display(), e);
            }
            result
        }
        Err(e) => {
            warn!("Probing {} in place: {}", candidate.display(), e);
            probe_version(candidate)
        }
    }
}

fn executable_copy(src: &Path) -> Result<TempPath> {
    let data = fs::read(src).map_err(|e| Error::IoError(format!("Failed to read {}: {}", src.display(), e)))?;
    let mut temp = tempfile::Builder::new()
        .prefix("setupdb-probe.")
        .tempfile()
        .map_err(|e| Error::IoError(format!("Failed to create temporary file: {}", e)))?;
    temp.write_all(&data)?;
    temp.as_file().set_permissions(Permissions::from_mode(0o755))?;
    // Close the handle so the copy can be executed
    Ok(temp.into_temp_path())
}

/// Atomically replace `dest` with an executable file holding `data`
fn write_executable(dest: &Path, data: &[u8]) -> Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| Error::IoError(format!("{} has no parent directory", dest.display())))?;
    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|e| Error::IoError(format!("Failed to create temporary file in {}: {}", dir.display(), e)))?;
    temp.write_all(data)?;
    temp.as_file().set_permissions(Permissions::from_mode(0o755))?;
    temp.persist(dest)
        .map_err(|e| Error::IoError(format!("Failed to install {}: {}", dest.display(), e.error)))?;
    Ok(())
}

/// Body of the per-product launcher script
pub fn launcher_script(registry_path: &Path) -> String {
    format!(
        r#"#!/bin/sh
{marker} - Generated by SetupDB {version} #####

detect_arch()
{{
    case "$(uname -m)" in
        i?86) echo "x86" ;;
        *) uname -m ;;
    esac
}}

if command -v {global} >/dev/null 2>&1; then
    UNINSTALL={global}
else
    UNINSTALL="$HOME/.loki/installed/bin/$(uname -s)/$(detect_arch)/uninstall"
    if [ ! -x "$UNINSTALL" ]; then
        echo "Could not find a usable uninstall program. Aborting."
        exit 1
    fi
fi
exec "$UNINSTALL" "{registry}"
"#,
        marker = LAUNCHER_MARKER,
        version = schema::schema_version_string(),
        global = GLOBAL_UNINSTALLER,
        registry = shell_quote(&registry_path.to_string_lossy()),
    )
}

/// Escape a string for use inside double quotes
fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Outcome of [`upgrade`]
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub binary: PathBuf,
    pub launcher: PathBuf,
    /// Version of the cached binary before the upgrade, if it could be probed
    pub previous: Option<UninstallerVersion>,
    /// Version of the candidate, when it had to be compared
    pub candidate: Option<UninstallerVersion>,
    pub upgraded: bool,
}

/// Install `candidate` as the cached uninstaller if warranted, then write
/// the product's launcher script
///
/// The launcher is written even when installing the binary fails; that
/// failure is returned afterwards.
pub fn upgrade(env: &Environment, product: &Product, candidate: &Path) -> Result<UpgradeReport> {
    let binary = env.uninstaller_path();
    let bin_dir = env.uninstaller_dir();
    let cache = DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(&bin_dir)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {}", bin_dir.display(), e)));

    // Without a cache directory only the launcher can be written
    let previous = if cache.is_ok() && binary.exists() {
        probe_version(&binary)
            .inspect_err(|e| warn!("Cached uninstaller {} is unusable: {}", binary.display(), e))
            .ok()
    } else {
        None
    };

    let candidate_version = match previous {
        Some(_) => probe_candidate(candidate)
            .inspect_err(|e| warn!("Cannot determine version of {}: {}", candidate.display(), e))
            .ok(),
        None => None,
    };

    let upgraded = cache.is_ok() && should_upgrade(previous, candidate_version);
    let installed = if let Err(e) = cache {
        warn!("Skipping uninstaller install: {}", e);
        Err(e)
    } else if upgraded {
        fs::read(candidate)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", candidate.display(), e)))
            .and_then(|data| write_executable(&binary, &data))
    } else {
        debug!("Keeping cached uninstaller {}", binary.display());
        Ok(())
    };

    let launcher = product.root().join(LAUNCHER_NAME);
    write_executable(&launcher, launcher_script(product.registry_path()).as_bytes())?;
    debug!("Wrote launcher {}", launcher.display());

    installed?;
    if upgraded {
        info!("Installed uninstaller {} from {}", binary.display(), candidate.display());
    }

    Ok(UpgradeReport {
        binary,
        launcher,
        previous,
        candidate: candidate_version,
        upgraded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version(b"1.2.3\n").unwrap(), UninstallerVersion::new(1, 2, 3));
        assert_eq!(
            parse_version(b"uninstall version 2.10.0-beta\n").unwrap(),
            UninstallerVersion::new(2, 10, 0)
        );
        assert!(matches!(parse_version(b"no numbers here"), Err(Error::VersionParse(_))));
        assert!(parse_version(b"1.2").is_err());
        assert!(parse_version(b"").is_err());
    }

    #[test]
    fn test_version_ordering() {
        let v = |s: &str| s.parse::<UninstallerVersion>().unwrap();
        assert!(v("1.2.0") > v("1.1.9"));
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("2.0.0") > v("1.99.99"));
        assert_eq!(v("1.0.0").to_string(), "1.0.0");
    }

    #[test]
    fn test_should_upgrade() {
        let old = Some(UninstallerVersion::new(1, 0, 0));
        let new = Some(UninstallerVersion::new(1, 1, 0));
        assert!(should_upgrade(None, new));
        assert!(should_upgrade(None, None));
        assert!(should_upgrade(old, new));
        assert!(!should_upgrade(new, old));
        assert!(!should_upgrade(old, old));
        assert!(!should_upgrade(old, None));
    }

    #[test]
    fn test_launcher_script() {
        let script = launcher_script(Path::new("/opt/game/.manifest/game.xml"));
        let second = script.lines().nth(1).unwrap();
        assert!(second.starts_with(LAUNCHER_MARKER));
        assert!(script.contains("i?86) echo \"x86\""));
        assert!(script.contains("command -v loki_uninstall"));
        assert!(script.contains("Could not find a usable uninstall program. Aborting."));
        assert!(script.ends_with("\"$UNINSTALL\" \"/opt/game/.manifest/game.xml\"\n"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/opt/my game"), "/opt/my game");
        assert_eq!(shell_quote("/opt/$x\"y"), "/opt/\\$x\\\"y");
    }

    #[test]
    fn test_write_executable_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("uninstall");
        write_executable(&dest, b"one").unwrap();
        write_executable(&dest, b"two").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"two");
        assert_eq!(fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn test_launcher_written_when_cache_dir_fails() {
        let home = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let env = Environment::new(home.path(), "Linux", "x86_64");
        let registry = crate::Registry::new(env.clone());

        let mut product = registry.create("game", root.path(), None, "").unwrap();
        product.flush().unwrap();
        // A regular file where the cache directory tree should go
        fs::write(env.installed_dir().join("bin"), b"x").unwrap();
        let candidate = root.path().join("candidate");

        let result = upgrade(&env, &product, &candidate);
        assert!(matches!(result, Err(Error::IoError(_))));

        let launcher = root.path().join(LAUNCHER_NAME);
        let script = fs::read_to_string(&launcher).unwrap();
        assert!(script.lines().nth(1).unwrap().starts_with(LAUNCHER_MARKER));
        assert!(!env.uninstaller_path().exists());
        product.close().unwrap();
    }
}
