// src/registry/product.rs

//! Open product handle
//!
//! A [`Product`] owns the whole entity tree of one installed product. Every
//! mutation goes through [`Product::tree_mut`], which marks the product
//! dirty; [`Product::close`] writes the document back only when something
//! changed.

use super::models::{
    Component, ComponentId, FileEntry, FileId, FileOwner, InstallOption, OptionId, Tree,
};
use super::schema;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Product-level attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub name: String,
    /// Human-readable description; empty when none was given
    pub description: String,
    /// Absolute install root
    pub root: PathBuf,
    pub update_url: String,
    /// Location of the registry document (`<root>/.manifest/<name>.xml`)
    pub registry_path: PathBuf,
}

/// One path that could not be removed by [`Product::remove`]
#[derive(Debug)]
pub struct RemovalFailure {
    pub path: PathBuf,
    pub error: io::Error,
}

/// Outcome of removing a product's on-disk footprint
#[derive(Debug, Default)]
pub struct RemovalReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<RemovalFailure>,
}

impl RemovalReport {
    /// True when every removal step succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, path: PathBuf, result: io::Result<()>) {
        match result {
            Ok(()) => self.removed.push(path),
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                self.failures.push(RemovalFailure { path, error: e });
            }
        }
    }
}

/// An open product
#[derive(Debug)]
pub struct Product {
    info: ProductInfo,
    link_path: PathBuf,
    tree: Tree,
    dirty: bool,
}

impl Product {
    pub(crate) fn from_parts(info: ProductInfo, link_path: PathBuf, tree: Tree, dirty: bool) -> Self {
        Self {
            info,
            link_path,
            tree,
            dirty,
        }
    }

    pub fn info(&self) -> &ProductInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn root(&self) -> &Path {
        &self.info.root
    }

    pub fn registry_path(&self) -> &Path {
        &self.info.registry_path
    }

    /// Discoverability link under the per-user installed directory
    pub fn link_path(&self) -> &Path {
        &self.link_path
    }

    /// True when the in-memory tree differs from the document on disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The only mutable path into the tree
    pub(crate) fn tree_mut(&mut self) -> &mut Tree {
        self.dirty = true;
        &mut self.tree
    }

    /// Write the document if anything changed since the last write
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            debug!("Product {} unchanged, nothing to write", self.info.name);
            return Ok(());
        }

        let doc = schema::to_document(&self.info, &self.tree);
        doc.write_file(&self.info.registry_path)?;
        self.dirty = false;
        info!("Saved registry for {} to {}", self.info.name, self.info.registry_path.display());
        Ok(())
    }

    /// Flush and release the product
    ///
    /// Memory is released even when the write fails; the error is returned.
    pub fn close(mut self) -> Result<()> {
        let result = self.flush();
        self.dirty = false;
        result
    }

    #[cfg(test)]
    pub(crate) fn discard(mut self) {
        self.dirty = false;
    }

    /// Delete every on-disk trace of the product
    ///
    /// Removes registered script files, the registry document, the scripts
    /// and manifest directories, the install root (only if empty) and the
    /// discoverability link. Each step is attempted regardless of earlier
    /// failures. Unsaved changes are discarded.
    pub fn remove(mut self) -> RemovalReport {
        let mut report = RemovalReport::default();

        let script_files: Vec<PathBuf> = self
            .all_scripts()
            .filter_map(|id| self.tree.file(id))
            .map(|f| self.script_path(&f.path))
            .collect();
        for path in script_files {
            match fs::remove_file(&path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                result => report.record(path, result),
            }
        }

        let scripts_dir = self.scripts_dir();
        let manifest_dir = self.manifest_dir();
        report.record(self.info.registry_path.clone(), fs::remove_file(&self.info.registry_path));
        report.record(scripts_dir.clone(), fs::remove_dir(&scripts_dir));
        report.record(manifest_dir.clone(), fs::remove_dir(&manifest_dir));
        report.record(self.info.root.clone(), fs::remove_dir(&self.info.root));
        report.record(self.link_path.clone(), fs::remove_file(&self.link_path));

        info!(
            "Removed product {} ({} paths removed, {} failures)",
            self.info.name,
            report.removed.len(),
            report.failures.len()
        );
        self.dirty = false;
        report
    }

    /// `<root>/.manifest`
    pub fn manifest_dir(&self) -> PathBuf {
        self.info.root.join(".manifest")
    }

    /// Resolve a stored path against the install root
    ///
    /// Absolute paths are returned unchanged.
    pub fn expand_path(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.info.root.join(path)
        }
    }

    // Components

    /// Components in enumeration order
    pub fn components(&self) -> &[ComponentId] {
        &self.tree.order
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.tree.component(id)
    }

    pub fn find_component(&self, name: &str) -> Option<ComponentId> {
        self.tree
            .order
            .iter()
            .copied()
            .find(|id| self.tree.component(*id).is_some_and(|c| c.name == name))
    }

    pub fn default_component(&self) -> Option<ComponentId> {
        self.tree.default
    }

    /// Create a component at the head of the component list
    ///
    /// The first component of a product becomes its default.
    pub fn create_component(&mut self, name: &str, version: &str) -> ComponentId {
        let first = self.tree.order.is_empty() && self.tree.default.is_none();
        let tree = self.tree_mut();
        let id = tree.add_component(Component::new(name.to_string(), version.to_string()), true);
        if first {
            tree.default = Some(id);
            if let Some(comp) = tree.component_mut(id) {
                comp.is_default = true;
            }
        }
        debug!("Created component {} {} (default: {})", name, version, first);
        id
    }

    /// Make `id` the only default component
    pub fn set_default_component(&mut self, id: ComponentId) -> Result<()> {
        self.require_component(id)?;
        let tree = self.tree_mut();
        if let Some(old) = tree.default.take() {
            if let Some(comp) = tree.component_mut(old) {
                comp.is_default = false;
            }
        }
        if let Some(comp) = tree.component_mut(id) {
            comp.is_default = true;
        }
        tree.default = Some(id);
        Ok(())
    }

    pub fn set_component_version(&mut self, id: ComponentId, version: &str) -> Result<()> {
        self.require_component(id)?;
        if let Some(comp) = self.tree_mut().component_mut(id) {
            comp.version = version.to_string();
        }
        Ok(())
    }

    /// Set or clear a component's update URL override
    pub fn set_component_url(&mut self, id: ComponentId, url: Option<&str>) -> Result<()> {
        self.require_component(id)?;
        if let Some(comp) = self.tree_mut().component_mut(id) {
            comp.update_url = url.map(str::to_string);
        }
        Ok(())
    }

    /// Effective update URL: the component override, else the product URL
    pub fn component_url(&self, id: ComponentId) -> Option<&str> {
        let comp = self.tree.component(id)?;
        Some(comp.update_url.as_deref().unwrap_or(self.info.update_url.as_str()))
    }

    /// Drop a component with all its options, files and scripts
    pub fn remove_component(&mut self, id: ComponentId) -> Result<()> {
        self.require_component(id)?;
        let script_files: Vec<PathBuf> = self
            .component_scripts(id)
            .into_iter()
            .filter_map(|f| self.tree.file(f))
            .map(|f| self.script_path(&f.path))
            .collect();

        if let Some(comp) = self.tree_mut().remove_component(id) {
            debug!("Removed component {}", comp.name);
        }
        for path in script_files {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Could not remove script {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    // Options

    /// Options of a component in enumeration order
    pub fn options(&self, component: ComponentId) -> &[OptionId] {
        self.tree
            .component(component)
            .map(Component::options)
            .unwrap_or(&[])
    }

    pub fn option(&self, id: OptionId) -> Option<&InstallOption> {
        self.tree.option(id)
    }

    pub fn find_option(&self, component: ComponentId, name: &str) -> Option<OptionId> {
        self.options(component)
            .iter()
            .copied()
            .find(|id| self.tree.option(*id).is_some_and(|o| o.name == name))
    }

    /// Create an option at the head of the component's option list
    ///
    /// Option names are unique within a component: asking for an existing
    /// name returns the existing option.
    pub fn create_option(&mut self, component: ComponentId, name: &str) -> Result<OptionId> {
        self.require_component(component)?;
        if let Some(existing) = self.find_option(component, name) {
            debug!("Option {} already exists", name);
            return Ok(existing);
        }
        Ok(self
            .tree_mut()
            .add_option(InstallOption::new(name.to_string(), component), true))
    }

    /// Drop an option and every entry it owns
    pub fn remove_option(&mut self, id: OptionId) -> Result<()> {
        self.require_option(id)?;
        let script_files: Vec<PathBuf> = self
            .files(id)
            .iter()
            .filter_map(|f| self.tree.file(*f))
            .filter(|f| f.script_kind().is_some())
            .map(|f| self.script_path(&f.path))
            .collect();

        if let Some(opt) = self.tree_mut().remove_option(id) {
            debug!("Removed option {}", opt.name);
        }
        for path in script_files {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Could not remove script {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// Component owning an option
    pub fn option_component(&self, id: OptionId) -> Option<ComponentId> {
        self.tree.option(id).map(|o| o.component)
    }

    // Files

    /// Entries of an option in enumeration order
    pub fn files(&self, option: OptionId) -> &[FileId] {
        self.tree.option(option).map(InstallOption::files).unwrap_or(&[])
    }

    pub fn file(&self, id: FileId) -> Option<&FileEntry> {
        self.tree.file(id)
    }

    /// Option owning an entry; `None` for component-level scripts
    pub fn file_option(&self, id: FileId) -> Option<OptionId> {
        match self.tree.file(id)?.owner {
            FileOwner::Option(opt) => Some(opt),
            FileOwner::Component(_) => None,
        }
    }

    /// Component an entry ultimately belongs to
    pub fn file_component(&self, id: FileId) -> Option<ComponentId> {
        match self.tree.file(id)?.owner {
            FileOwner::Option(opt) => self.option_component(opt),
            FileOwner::Component(comp) => Some(comp),
        }
    }

    /// Absolute location of a filesystem entry; `None` for RPMs and scripts
    pub fn file_path(&self, id: FileId) -> Option<PathBuf> {
        let file = self.tree.file(id)?;
        if file.kind.is_named_entry() {
            None
        } else {
            Some(self.expand_path(&file.path))
        }
    }

    pub(crate) fn require_component(&self, id: ComponentId) -> Result<&Component> {
        self.tree
            .component(id)
            .ok_or_else(|| Error::NotFound(format!("component #{} in {}", id.index(), self.info.name)))
    }

    pub(crate) fn require_option(&self, id: OptionId) -> Result<&InstallOption> {
        self.tree
            .option(id)
            .ok_or_else(|| Error::NotFound(format!("option #{} in {}", id.index(), self.info.name)))
    }

    pub(crate) fn require_file(&self, id: FileId) -> Result<&FileEntry> {
        self.tree
            .file(id)
            .ok_or_else(|| Error::NotFound(format!("file #{} in {}", id.index(), self.info.name)))
    }
}

impl Drop for Product {
    fn drop(&mut self) {
        if self.dirty {
            warn!(
                "Product {} dropped with unsaved changes; call close() to save them",
                self.info.name
            );
        }
    }
}
