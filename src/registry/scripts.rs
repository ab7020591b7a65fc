// src/registry/scripts.rs

//! Lifecycle scripts
//!
//! Scripts are stored as `<root>/.manifest/scripts/<name>.sh` and referenced
//! from the registry by name, either at component level or inside an option.

use super::models::{ComponentId, FileEntry, FileId, FileKind, FileOwner, ScriptKind};
use super::product::Product;
use crate::error::{Error, Result};
use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Interpreter line written at the top of every stored script
pub const SCRIPT_HEADER: &str = "#! /bin/sh\n";

impl Product {
    /// `<root>/.manifest/scripts`
    pub fn scripts_dir(&self) -> PathBuf {
        self.manifest_dir().join("scripts")
    }

    /// Location of the stored script called `name`
    pub fn script_path(&self, name: &str) -> PathBuf {
        self.scripts_dir().join(format!("{}.sh", name))
    }

    /// Store a script body and reference it from `owner`
    ///
    /// The body is written byte for byte after [`SCRIPT_HEADER`].
    ///
    /// Registering a name that already exists under the same owner rewrites
    /// the script and updates its phase.
    pub fn register_script(
        &mut self,
        owner: FileOwner,
        kind: ScriptKind,
        name: &str,
        content: impl AsRef<[u8]>,
    ) -> Result<FileId> {
        match owner {
            FileOwner::Component(comp) => {
                self.require_component(comp)?;
            }
            FileOwner::Option(opt) => {
                self.require_option(opt)?;
            }
        }
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(Error::ScriptError(format!("Invalid script name: {:?}", name)));
        }

        let path = self.script_path(name);
        write_script(&path, content.as_ref())?;

        if let Some(existing) = self.find_script_in(owner, name) {
            if let Some(entry) = self.tree_mut().file_mut(existing) {
                entry.kind = FileKind::Script { kind };
            }
            debug!("Rewrote {} script {}", kind, name);
            return Ok(existing);
        }

        debug!("Registered {} script {} at {}", kind, name, path.display());
        let entry = FileEntry::new(name.to_string(), FileKind::Script { kind }, owner);
        Ok(self.tree_mut().add_file(entry, true))
    }

    /// [`Product::register_script`] with the body read from a file
    pub fn register_script_from_file(
        &mut self,
        owner: FileOwner,
        kind: ScriptKind,
        name: &str,
        source: &Path,
    ) -> Result<FileId> {
        let content = fs::read(source)
            .map_err(|e| Error::IoError(format!("Failed to read script {}: {}", source.display(), e)))?;
        self.register_script(owner, kind, name, &content)
    }

    /// Remove a script from a component and its stored file
    ///
    /// Component-level scripts are searched first, then each option.
    pub fn unregister_script(&mut self, component: ComponentId, name: &str) -> Result<()> {
        let options = self.require_component(component)?.options().to_vec();
        let id = std::iter::once(FileOwner::Component(component))
            .chain(options.into_iter().map(FileOwner::Option))
            .find_map(|owner| self.find_script_in(owner, name))
            .ok_or_else(|| Error::NotFound(format!("script {} is not registered", name)))?;

        let path = self.script_path(name);
        self.tree_mut().remove_file(id);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed script {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove script {}: {}", path.display(), e),
        }
        Ok(())
    }

    /// Run every script of the given phase belonging to a component
    ///
    /// Component-level scripts run first, then scripts inside its options,
    /// each in enumeration order. Returns the number of scripts that exited
    /// successfully; failures are logged and do not stop later scripts.
    pub fn run_scripts(&self, component: ComponentId, kind: ScriptKind) -> Result<usize> {
        self.require_component(component)?;

        let names: Vec<String> = self
            .component_scripts(component)
            .into_iter()
            .filter_map(|id| self.file(id))
            .filter(|f| f.script_kind() == Some(kind))
            .map(|f| f.path.clone())
            .collect();

        let mut succeeded = 0;
        for name in &names {
            if self.run_script(name) {
                succeeded += 1;
            }
        }

        info!("Ran {}/{} {} scripts", succeeded, names.len(), kind);
        Ok(succeeded)
    }

    fn run_script(&self, name: &str) -> bool {
        let path = self.script_path(name);
        let mut command = Command::new("/bin/sh");
        command.arg(&path).stdin(Stdio::null());
        if self.root().is_dir() {
            command.current_dir(self.root());
        }

        debug!("Running script {}", path.display());
        match command.status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!("Script {} failed: {}", name, status);
                false
            }
            Err(e) => {
                warn!("Failed to run script {}: {}", name, e);
                false
            }
        }
    }

    /// Component-level scripts followed by option-level scripts
    pub fn component_scripts(&self, component: ComponentId) -> Vec<FileId> {
        let Some(comp) = self.component(component) else {
            return Vec::new();
        };

        let mut ids = comp.scripts().to_vec();
        for opt in comp.options() {
            ids.extend(
                self.files(*opt)
                    .iter()
                    .copied()
                    .filter(|id| self.file(*id).is_some_and(|f| f.script_kind().is_some())),
            );
        }
        ids
    }

    /// Every script of the product
    pub(crate) fn all_scripts(&self) -> impl Iterator<Item = FileId> + '_ {
        self.components()
            .iter()
            .flat_map(|comp| self.component_scripts(*comp))
    }

    fn find_script_in(&self, owner: FileOwner, name: &str) -> Option<FileId> {
        let list = match owner {
            FileOwner::Component(comp) => self.component(comp)?.scripts(),
            FileOwner::Option(opt) => self.files(opt),
        };
        list.iter().copied().find(|id| {
            self.file(*id)
                .is_some_and(|f| f.script_kind().is_some() && f.path == name)
        })
    }
}

fn write_script(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| Error::ScriptError(format!("Failed to create {}: {}", dir.display(), e)))?;
    }

    let mut body = Vec::with_capacity(SCRIPT_HEADER.len() + content.len() + 1);
    body.extend_from_slice(SCRIPT_HEADER.as_bytes());
    body.extend_from_slice(content);
    if !content.ends_with(b"\n") {
        body.push(b'\n');
    }

    fs::write(path, body).map_err(|e| Error::ScriptError(format!("Failed to write {}: {}", path.display(), e)))?;
    fs::set_permissions(path, Permissions::from_mode(0o755))
        .map_err(|e| Error::ScriptError(format!("Failed to set mode on {}: {}", path.display(), e)))?;
    Ok(())
}
