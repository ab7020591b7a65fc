// src/packages/rpm.rs

//! RPM header reader
//!
//! Bundled RPM packages are recorded in the registry by name, version and
//! revision. Those values are taken from the package header so installers
//! do not have to repeat them.

use crate::error::{Error, Result};
use rpm::Package;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Identity of an RPM package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmHeader {
    pub name: String,
    pub version: String,
    /// Release tag as found in the header (e.g. "3.el9")
    pub release: String,
}

impl RpmHeader {
    /// Read the header of an RPM file
    pub fn read(path: &Path) -> Result<Self> {
        debug!("Reading RPM header: {}", path.display());

        let file = File::open(path)
            .map_err(|e| Error::Package(format!("Failed to open RPM file {}: {}", path.display(), e)))?;
        let mut buf_reader = BufReader::new(file);

        let pkg = Package::parse(&mut buf_reader)
            .map_err(|e| Error::Package(format!("Failed to parse RPM {}: {}", path.display(), e)))?;

        let name = pkg
            .metadata
            .get_name()
            .map_err(|e| Error::Package(format!("Failed to get package name: {}", e)))?
            .to_string();
        let version = pkg
            .metadata
            .get_version()
            .map_err(|e| Error::Package(format!("Failed to get package version: {}", e)))?
            .to_string();
        let release = pkg.metadata.get_release().unwrap_or_default().to_string();

        debug!("Parsed RPM: {} {}-{}", name, version, release);
        Ok(Self { name, version, release })
    }

    /// Numeric revision: the leading digits of the release tag, or 0
    pub fn revision(&self) -> u32 {
        let end = self
            .release
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.release.len());
        self.release[..end].parse().unwrap_or(0)
    }
}
