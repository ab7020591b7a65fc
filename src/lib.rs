// src/lib.rs

//! SetupDB: registry of installed products
//!
//! Records what an installer placed on a system so an uninstaller or updater
//! can later enumerate it, detect locally modified files and run cleanup
//! scripts.
//!
//! # Architecture
//!
//! - Hierarchy: product → component → option → file
//! - One XML document per product under `<root>/.manifest`, linked from
//!   `~/.loki/installed` for lookup by name
//! - Eager load on open, in-memory mutation, single write on close
//! - MD5 digests per regular file; a changed digest marks the file patched
//! - A shared uninstaller binary that is only ever replaced by a newer one

pub mod digest;
pub mod document;
pub mod environment;
mod error;
pub mod legacy;
pub mod packages;
pub mod registry;
pub mod uninstaller;

pub use environment::Environment;
pub use error::{Error, Result};
pub use registry::{
    ComponentId, FileId, FileOwner, FileType, OptionId, Product, ProductInfo, Registry, ScriptKind,
};
