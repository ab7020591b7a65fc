// src/registry/mod.rs

//! Per-user registry of installed products
//!
//! Every product keeps its registry document at
//! `<root>/.manifest/<name>.xml`; `~/.loki/installed/<name>.xml` is a
//! symbolic link to it so products can be found by name.

mod files;
pub mod models;
mod product;
pub mod schema;
mod scripts;

pub use files::FileVisit;
pub use models::{
    Component, ComponentId, DeviceKind, FileEntry, FileId, FileKind, FileOwner, FileType, InstallOption,
    OptionId, ScriptKind, DEFAULT_MODE,
};
pub use product::{Product, ProductInfo, RemovalFailure, RemovalReport};
pub use scripts::SCRIPT_HEADER;

use crate::document::Document;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::uninstaller::{self, UpgradeReport};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::{DirBuilderExt, symlink};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Entry point for opening, creating and listing products
#[derive(Debug, Clone)]
pub struct Registry {
    env: Environment,
}

impl Registry {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Registry for the current user and host
    pub fn detect() -> Result<Self> {
        Ok(Self::new(Environment::detect()?))
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Names of every product with a discoverability link, sorted
    pub fn product_names(&self) -> Result<Vec<String>> {
        let dir = self.env.installed_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::IoError(format!("Failed to read {}: {}", dir.display(), e)));
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "xml") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Open a product by name, or by the absolute path of its document
    pub fn open(&self, name_or_path: &str) -> Result<Product> {
        let path = if Path::new(name_or_path).is_absolute() {
            PathBuf::from(name_or_path)
        } else {
            self.env.product_link(name_or_path)
        };

        if !path.exists() {
            return Err(Error::ProductNotFound(name_or_path.to_string()));
        }

        let doc = Document::parse_file(&path)?;
        let (info, tree) = schema::load(&doc)?;
        let link = self.env.product_link(&info.name);
        debug!("Opened product {} from {}", info.name, path.display());
        Ok(Product::from_parts(info, link, tree, false))
    }

    /// Create the on-disk scaffolding for a new, empty product
    ///
    /// The product is returned dirty so that closing it writes the first
    /// version of its document.
    pub fn create(
        &self,
        name: &str,
        root: &Path,
        description: Option<&str>,
        update_url: &str,
    ) -> Result<Product> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::IoError(format!("Invalid product name: {:?}", name)));
        }
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };

        let installed = self.env.installed_dir();
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&installed)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {}", installed.display(), e)))?;

        let info = ProductInfo {
            name: name.to_string(),
            description: description.unwrap_or_default().to_string(),
            registry_path: schema::registry_path_for(&root, name),
            update_url: update_url.to_string(),
            root,
        };

        let scripts_dir = info.root.join(".manifest").join("scripts");
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&scripts_dir)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {}", scripts_dir.display(), e)))?;

        let link = self.env.product_link(name);
        if fs::symlink_metadata(&link).is_ok() {
            warn!("Replacing existing registry link {}", link.display());
            fs::remove_file(&link)
                .map_err(|e| Error::IoError(format!("Failed to remove {}: {}", link.display(), e)))?;
        }
        symlink(&info.registry_path, &link).map_err(|e| {
            Error::IoError(format!(
                "Failed to link {} to {}: {}",
                link.display(),
                info.registry_path.display(),
                e
            ))
        })?;

        info!("Created product {} at {}", name, info.root.display());
        Ok(Product::from_parts(info, link, Default::default(), true))
    }

    /// Install `candidate` as the shared uninstaller if it is newer, and
    /// write the product's launcher script
    pub fn upgrade_uninstaller(&self, product: &Product, candidate: &Path) -> Result<UpgradeReport> {
        uninstaller::upgrade(&self.env, product, candidate)
    }
}
