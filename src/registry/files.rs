// src/registry/files.rs

//! File registration and integrity tracking

use super::models::{ComponentId, DeviceKind, FileEntry, FileId, FileKind, FileOwner, FileType, OptionId};
use super::product::Product;
use crate::digest::Md5Digest;
use crate::error::{Error, Result};
use crate::packages::rpm::RpmHeader;
use nix::sys::stat::{major, minor};
use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One entry yielded by [`Product::enumerate_files`]
#[derive(Debug, Clone)]
pub struct FileVisit<'a> {
    pub id: FileId,
    /// Expanded location; the stored name for RPM references and scripts
    pub path: PathBuf,
    pub file_type: FileType,
    pub component: ComponentId,
    pub option: OptionId,
    pub entry: &'a FileEntry,
}

impl Product {
    /// Record a filesystem entry under an option, or refresh it if the path
    /// is already registered there
    ///
    /// `md5` is a precomputed hex digest for regular files; when absent the
    /// file is hashed. On refresh, a digest that differs from the stored
    /// one marks the entry as patched.
    pub fn register_file(&mut self, option: OptionId, path: &str, md5: Option<&str>) -> Result<FileId> {
        self.require_option(option)?;

        if let Some(existing) = self.find_in_option(option, path) {
            return self.refresh_file(existing, md5);
        }

        let full = self.expand_path(path);
        let meta = lstat(&full)?;
        let file_type = meta.file_type();

        let kind = if file_type.is_file() {
            FileKind::Regular {
                md5: Some(digest_for(&full, md5)?),
            }
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_symlink() {
            FileKind::Symlink {
                target: read_target(&full),
            }
        } else if file_type.is_fifo() {
            FileKind::Fifo
        } else if file_type.is_block_device() || file_type.is_char_device() {
            let rdev = meta.rdev() as nix::libc::dev_t;
            FileKind::Device {
                kind: if file_type.is_block_device() {
                    DeviceKind::Block
                } else {
                    DeviceKind::Char
                },
                major: major(rdev) as u64,
                minor: minor(rdev) as u64,
            }
        } else {
            return Err(Error::UnsupportedFileType(full.display().to_string()));
        };

        let mut entry = FileEntry::new(path.to_string(), kind, FileOwner::Option(option));
        entry.mode = meta.mode() & 0o7777;
        entry.ownership = Some((meta.uid(), meta.gid()));
        debug!("Registering {} {} (mode {:04o})", entry.file_type(), path, entry.mode);
        Ok(self.tree_mut().add_file(entry, false))
    }

    fn refresh_file(&mut self, id: FileId, md5: Option<&str>) -> Result<FileId> {
        let file = self.require_file(id)?;
        let full = self.expand_path(&file.path);
        let kind = file.kind.clone();

        match kind {
            FileKind::Regular { md5: stored } => {
                let current = digest_for(&full, md5)?;
                let changed = stored.is_some_and(|s| s != current);
                if stored == Some(current) {
                    debug!("{} unchanged", full.display());
                    return Ok(id);
                }
                if changed {
                    info!("{} changed since registration, marking as patched", full.display());
                }
                if let Some(entry) = self.tree_mut().file_mut(id) {
                    entry.kind = FileKind::Regular { md5: Some(current) };
                    if changed {
                        entry.patched = true;
                    }
                }
            }
            FileKind::Symlink { target } => {
                let current = read_target(&full).or_else(|| target.clone());
                if current != target {
                    if let Some(entry) = self.tree_mut().file_mut(id) {
                        entry.kind = FileKind::Symlink { target: current };
                    }
                }
            }
            _ => debug!("{} already registered", full.display()),
        }

        Ok(id)
    }

    /// Recompute the digest of a registered regular file
    ///
    /// Marks the entry patched when the content no longer matches.
    pub fn update_digest(&mut self, path: &str) -> Result<FileId> {
        let id = self
            .find_by_path(path)
            .ok_or_else(|| Error::NotFound(format!("{} is not registered in {}", path, self.name())))?;
        if !matches!(self.require_file(id)?.kind, FileKind::Regular { .. }) {
            return Err(Error::UnsupportedFileType(format!("{} is not a regular file", path)));
        }
        self.refresh_file(id, None)
    }

    /// Forget the entry registered under `path` in an option
    pub fn unregister_path(&mut self, option: OptionId, path: &str) -> Result<()> {
        self.require_option(option)?;
        let id = self
            .find_in_option(option, path)
            .ok_or_else(|| Error::NotFound(format!("{} is not registered", path)))?;
        self.unregister_file(id)
    }

    /// Forget a single entry
    pub fn unregister_file(&mut self, id: FileId) -> Result<()> {
        self.require_file(id)?;
        if let Some(entry) = self.tree_mut().remove_file(id) {
            debug!("Unregistered {}", entry.path);
        }
        Ok(())
    }

    /// Override the recorded permission bits of an entry
    pub fn set_mode(&mut self, id: FileId, mode: u32) -> Result<()> {
        self.require_file(id)?;
        if let Some(entry) = self.tree_mut().file_mut(id) {
            entry.mode = mode & 0o7777;
        }
        Ok(())
    }

    /// Set or clear the patched flag of an entry
    pub fn set_patched(&mut self, id: FileId, patched: bool) -> Result<()> {
        self.require_file(id)?;
        if let Some(entry) = self.tree_mut().file_mut(id) {
            entry.patched = patched;
        }
        Ok(())
    }

    /// Locate a filesystem entry anywhere in the product
    ///
    /// `path` may be the stored (root-relative) form or the absolute form.
    /// RPM references and scripts are never matched.
    pub fn find_by_path(&self, path: &str) -> Option<FileId> {
        let wanted = Path::new(path);
        self.components()
            .iter()
            .flat_map(|comp| self.options(*comp))
            .flat_map(|opt| self.files(*opt))
            .copied()
            .find(|id| {
                self.file(*id).is_some_and(|f| {
                    !f.kind.is_named_entry() && (f.path == path || self.expand_path(&f.path) == wanted)
                })
            })
    }

    /// Visit every entry of an option in order, returning how many were visited
    pub fn enumerate_files<F>(&self, option: OptionId, mut visit: F) -> usize
    where
        F: FnMut(FileVisit<'_>),
    {
        let Some(component) = self.option_component(option) else {
            return 0;
        };

        let mut count = 0;
        for id in self.files(option) {
            if let Some(entry) = self.file(*id) {
                let path = if entry.kind.is_named_entry() {
                    PathBuf::from(&entry.path)
                } else {
                    self.expand_path(&entry.path)
                };
                visit(FileVisit {
                    id: *id,
                    path,
                    file_type: entry.file_type(),
                    component,
                    option,
                    entry,
                });
                count += 1;
            }
        }
        count
    }

    /// Record a bundled RPM package under an option
    ///
    /// Re-registering a package name already present in the option updates
    /// its version information.
    pub fn register_rpm(
        &mut self,
        option: OptionId,
        name: &str,
        version: &str,
        revision: u32,
        autoremove: bool,
    ) -> Result<FileId> {
        self.require_option(option)?;
        let kind = FileKind::Rpm {
            version: version.to_string(),
            revision,
            autoremove,
        };

        let existing = self.files(option).iter().copied().find(|id| {
            self.file(*id)
                .is_some_and(|f| f.file_type() == FileType::Rpm && f.path == name)
        });
        if let Some(id) = existing {
            if let Some(entry) = self.tree_mut().file_mut(id) {
                entry.kind = kind;
            }
            debug!("Updated RPM {} to {}-{}", name, version, revision);
            return Ok(id);
        }

        debug!("Registering RPM {} {}-{}", name, version, revision);
        let entry = FileEntry::new(name.to_string(), kind, FileOwner::Option(option));
        Ok(self.tree_mut().add_file(entry, true))
    }

    /// Record a bundled RPM package, reading name and version from its header
    pub fn register_rpm_file(&mut self, option: OptionId, rpm: &Path, autoremove: bool) -> Result<FileId> {
        let header = RpmHeader::read(rpm)?;
        self.register_rpm(option, &header.name, &header.version, header.revision(), autoremove)
    }

    /// Forget the first reference to an RPM package
    pub fn unregister_rpm(&mut self, name: &str) -> Result<()> {
        let id = self
            .components()
            .iter()
            .flat_map(|comp| self.options(*comp))
            .flat_map(|opt| self.files(*opt))
            .copied()
            .find(|id| {
                self.file(*id)
                    .is_some_and(|f| f.file_type() == FileType::Rpm && f.path == name)
            })
            .ok_or_else(|| Error::NotFound(format!("RPM {} is not registered", name)))?;

        self.tree_mut().remove_file(id);
        debug!("Unregistered RPM {}", name);
        Ok(())
    }

    fn find_in_option(&self, option: OptionId, path: &str) -> Option<FileId> {
        self.files(option).iter().copied().find(|id| {
            self.file(*id)
                .is_some_and(|f| !f.kind.is_named_entry() && f.path == path)
        })
    }
}

fn lstat(path: &Path) -> Result<fs::Metadata> {
    fs::symlink_metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::NotFound(format!("{} does not exist", path.display())),
        _ => Error::IoError(format!("Failed to stat {}: {}", path.display(), e)),
    })
}

fn digest_for(path: &Path, hint: Option<&str>) -> Result<Md5Digest> {
    match hint {
        Some(hex) => Md5Digest::from_hex(hex),
        None => Md5Digest::of_file(path),
    }
}

fn read_target(path: &Path) -> Option<String> {
    match fs::read_link(path) {
        Ok(target) => Some(target.to_string_lossy().into_owned()),
        Err(e) => {
            warn!("Failed to read link {}: {}", path.display(), e);
            None
        }
    }
}
