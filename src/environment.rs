// src/environment.rs

//! Host environment probes
//!
//! The registry needs three facts about the host: the user's home directory
//! (where the per-user registry lives), the OS name and the CPU architecture
//! (which select the cached uninstaller binary). They are gathered once into
//! an [`Environment`] value that is passed explicitly to the registry.

use crate::error::{Error, Result};
use nix::sys::utsname::uname;
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable overriding the detected OS name
pub const OS_OVERRIDE_VAR: &str = "SETUP_OS";

/// Environment variable overriding the detected architecture
pub const ARCH_OVERRIDE_VAR: &str = "SETUP_ARCH";

/// Host facts used to locate registry files and uninstaller binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Home directory of the current user
    pub home: PathBuf,
    /// OS name as reported by `uname -s` (e.g. "Linux")
    pub os: String,
    /// Architecture name (e.g. "x86", "x86_64", "aarch64")
    pub arch: String,
}

impl Environment {
    /// Build an environment from explicit values
    pub fn new(home: impl Into<PathBuf>, os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Detect the environment of the running process
    ///
    /// `SETUP_OS` and `SETUP_ARCH` take precedence over `uname`.
    pub fn detect() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::IoError("Unable to determine the home directory".to_string()))?;
        Ok(Self::with_home(home))
    }

    /// Detect OS and architecture, using the given home directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let env = Self {
            home: home.into(),
            os: detect_os(),
            arch: detect_arch(),
        };
        debug!("Detected environment: os={} arch={} home={}", env.os, env.arch, env.home.display());
        env
    }

    /// Per-user directory holding links to every product's registry document
    pub fn installed_dir(&self) -> PathBuf {
        self.home.join(".loki").join("installed")
    }

    /// Directory of the cached uninstaller binary for this OS and architecture
    pub fn uninstaller_dir(&self) -> PathBuf {
        self.installed_dir().join("bin").join(&self.os).join(&self.arch)
    }

    /// Path of the cached uninstaller binary
    pub fn uninstaller_path(&self) -> PathBuf {
        self.uninstaller_dir().join("uninstall")
    }

    /// Discoverability link for a product's registry document
    pub fn product_link(&self, name: &str) -> PathBuf {
        self.installed_dir().join(format!("{}.xml", name))
    }
}

/// OS name, honouring the `SETUP_OS` override
pub fn detect_os() -> String {
    if let Some(os) = non_empty_var(OS_OVERRIDE_VAR) {
        return os;
    }
    match uname() {
        Ok(info) => info.sysname().to_string_lossy().into_owned(),
        Err(_) => env::consts::OS.to_string(),
    }
}

/// Architecture name, honouring the `SETUP_ARCH` override
pub fn detect_arch() -> String {
    if let Some(arch) = non_empty_var(ARCH_OVERRIDE_VAR) {
        return arch;
    }
    let machine = match uname() {
        Ok(info) => info.machine().to_string_lossy().into_owned(),
        Err(_) => env::consts::ARCH.to_string(),
    };
    normalize_arch(&machine)
}

/// Map a raw machine name to the name used for binary directories
///
/// Must agree with the `DetectARCH` function of the generated launcher,
/// which folds every `i?86` into `x86`.
pub fn normalize_arch(machine: &str) -> String {
    let bytes = machine.as_bytes();
    if bytes.len() == 4 && bytes[0] == b'i' && &bytes[2..] == b"86" {
        "x86".to_string()
    } else {
        machine.to_string()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
