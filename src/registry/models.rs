// src/registry/models.rs

//! In-memory entities of a product registry
//!
//! A product owns a tree of components, options and files. The tree is held
//! in an arena: entities live in slot vectors and refer to each other through
//! typed indices, so removing an entity never leaves a dangling reference.
//! A removed slot stays empty for the lifetime of the product, which keeps
//! every identifier handed out to callers stable.

use crate::digest::Md5Digest;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Raw arena index
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a component within its product
    ComponentId
);
entity_id!(
    /// Identifier of an option within its product
    OptionId
);
entity_id!(
    /// Identifier of a file entry within its product
    FileId
);

/// Lifecycle script phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptKind {
    PreUninstall,
    PostUninstall,
}

impl ScriptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::PreUninstall => "pre-uninstall",
            ScriptKind::PostUninstall => "post-uninstall",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pre-uninstall" | "pre" => Ok(ScriptKind::PreUninstall),
            "post-uninstall" | "post" => Ok(ScriptKind::PostUninstall),
            _ => Err(format!("Invalid script type: {}", s)),
        }
    }
}

/// Block or character device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Block,
    Char,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Block => "block",
            DeviceKind::Char => "char",
        }
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "block" => Ok(DeviceKind::Block),
            "char" => Ok(DeviceKind::Char),
            _ => Err(format!("Invalid device type: {}", s)),
        }
    }
}

/// Coarse type of a registered entry, as reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Fifo,
    Device,
    Rpm,
    Script,
    /// Unknown element in a loaded document
    Undetermined,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Regular => "regular",
            FileType::Directory => "directory",
            FileType::Symlink => "symlink",
            FileType::Fifo => "fifo",
            FileType::Device => "device",
            FileType::Rpm => "rpm",
            FileType::Script => "script",
            FileType::Undetermined => "none",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific payload of a file entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Regular {
        md5: Option<Md5Digest>,
    },
    Directory,
    Symlink {
        target: Option<String>,
    },
    Fifo,
    Device {
        kind: DeviceKind,
        major: u64,
        minor: u64,
    },
    Rpm {
        version: String,
        revision: u32,
        autoremove: bool,
    },
    Script {
        kind: ScriptKind,
    },
    /// Element the engine does not understand; the tag is kept so it can be
    /// written back unchanged
    Unknown {
        tag: String,
    },
}

impl FileKind {
    pub fn file_type(&self) -> FileType {
        match self {
            FileKind::Regular { .. } => FileType::Regular,
            FileKind::Directory => FileType::Directory,
            FileKind::Symlink { .. } => FileType::Symlink,
            FileKind::Fifo => FileType::Fifo,
            FileKind::Device { .. } => FileType::Device,
            FileKind::Rpm { .. } => FileType::Rpm,
            FileKind::Script { .. } => FileType::Script,
            FileKind::Unknown { .. } => FileType::Undetermined,
        }
    }

    /// RPM references and scripts store a name, not a filesystem path
    pub fn is_named_entry(&self) -> bool {
        matches!(self, FileKind::Rpm { .. } | FileKind::Script { .. })
    }
}

/// Owner of a file entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOwner {
    Option(OptionId),
    /// Component-level lifecycle script
    Component(ComponentId),
}

/// Default mode recorded for entries without an explicit one
pub const DEFAULT_MODE: u32 = 0o644;

/// A file, directory, link, device, RPM reference or script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Stored path: relative to the install root unless absolute; the bare
    /// name for RPM references and scripts
    pub path: String,
    pub kind: FileKind,
    pub mode: u32,
    /// `(uid, gid)` seen at registration; not part of the document, so
    /// entries loaded from disk carry `None`
    pub ownership: Option<(u32, u32)>,
    pub patched: bool,
    pub owner: FileOwner,
}

impl FileEntry {
    pub fn new(path: String, kind: FileKind, owner: FileOwner) -> Self {
        Self {
            path,
            kind,
            mode: DEFAULT_MODE,
            ownership: None,
            patched: false,
            owner,
        }
    }

    pub fn file_type(&self) -> FileType {
        self.kind.file_type()
    }

    /// Stored digest of a regular file
    pub fn md5(&self) -> Option<&Md5Digest> {
        match &self.kind {
            FileKind::Regular { md5 } => md5.as_ref(),
            _ => None,
        }
    }

    /// Phase of a lifecycle script
    pub fn script_kind(&self) -> Option<ScriptKind> {
        match self.kind {
            FileKind::Script { kind } => Some(kind),
            _ => None,
        }
    }
}

/// A named, versioned subdivision of a product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub version: String,
    /// Update URL override; the product URL applies when unset
    pub update_url: Option<String>,
    pub is_default: bool,
    pub(crate) options: Vec<OptionId>,
    pub(crate) scripts: Vec<FileId>,
}

impl Component {
    pub fn new(name: String, version: String) -> Self {
        Self {
            name,
            version,
            update_url: None,
            is_default: false,
            options: Vec::new(),
            scripts: Vec::new(),
        }
    }

    /// Options as currently linked
    pub fn options(&self) -> &[OptionId] {
        &self.options
    }

    /// Component-level scripts as currently linked
    pub fn scripts(&self) -> &[FileId] {
        &self.scripts
    }
}

/// A named group of files within a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOption {
    pub name: String,
    pub component: ComponentId,
    pub(crate) files: Vec<FileId>,
}

impl InstallOption {
    pub fn new(name: String, component: ComponentId) -> Self {
        Self {
            name,
            component,
            files: Vec::new(),
        }
    }

    /// Files as currently linked
    pub fn files(&self) -> &[FileId] {
        &self.files
    }
}

/// Slot storage with stable indices
#[derive(Debug, Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> usize {
        self.slots.push(Some(value));
        self.slots.len() - 1
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(|slot| slot.as_mut())
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(|slot| slot.take())
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// The whole entity tree of one product
#[derive(Debug, Clone, Default)]
pub(crate) struct Tree {
    pub(crate) components: Arena<Component>,
    pub(crate) options: Arena<InstallOption>,
    pub(crate) files: Arena<FileEntry>,
    /// Components as currently linked
    pub(crate) order: Vec<ComponentId>,
    pub(crate) default: Option<ComponentId>,
}

impl Tree {
    pub(crate) fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0)
    }

    pub(crate) fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id.0)
    }

    pub(crate) fn option(&self, id: OptionId) -> Option<&InstallOption> {
        self.options.get(id.0)
    }

    pub(crate) fn option_mut(&mut self, id: OptionId) -> Option<&mut InstallOption> {
        self.options.get_mut(id.0)
    }

    pub(crate) fn file(&self, id: FileId) -> Option<&FileEntry> {
        self.files.get(id.0)
    }

    pub(crate) fn file_mut(&mut self, id: FileId) -> Option<&mut FileEntry> {
        self.files.get_mut(id.0)
    }

    /// Append a component; `prepend` links it at the head of the list
    pub(crate) fn add_component(&mut self, component: Component, prepend: bool) -> ComponentId {
        let id = ComponentId(self.components.insert(component));
        if prepend {
            self.order.insert(0, id);
        } else {
            self.order.push(id);
        }
        id
    }

    pub(crate) fn add_option(&mut self, option: InstallOption, prepend: bool) -> OptionId {
        let component = option.component;
        let id = OptionId(self.options.insert(option));
        if let Some(comp) = self.components.get_mut(component.0) {
            if prepend {
                comp.options.insert(0, id);
            } else {
                comp.options.push(id);
            }
        }
        id
    }

    pub(crate) fn add_file(&mut self, file: FileEntry, prepend: bool) -> FileId {
        let owner = file.owner;
        let id = FileId(self.files.insert(file));
        let list = match owner {
            FileOwner::Option(opt) => self.options.get_mut(opt.0).map(|o| &mut o.files),
            FileOwner::Component(comp) => self.components.get_mut(comp.0).map(|c| &mut c.scripts),
        };
        if let Some(list) = list {
            if prepend {
                list.insert(0, id);
            } else {
                list.push(id);
            }
        }
        id
    }

    /// Detach a file from its owner and drop it
    pub(crate) fn remove_file(&mut self, id: FileId) -> Option<FileEntry> {
        let file = self.files.remove(id.0)?;
        let list = match file.owner {
            FileOwner::Option(opt) => self.options.get_mut(opt.0).map(|o| &mut o.files),
            FileOwner::Component(comp) => self.components.get_mut(comp.0).map(|c| &mut c.scripts),
        };
        if let Some(list) = list {
            list.retain(|f| *f != id);
        }
        Some(file)
    }

    /// Detach an option from its component and drop it with all its files
    pub(crate) fn remove_option(&mut self, id: OptionId) -> Option<InstallOption> {
        let option = self.options.remove(id.0)?;
        for file in &option.files {
            self.files.remove(file.0);
        }
        if let Some(comp) = self.components.get_mut(option.component.0) {
            comp.options.retain(|o| *o != id);
        }
        Some(option)
    }

    /// Unlink a component and drop everything it owns
    pub(crate) fn remove_component(&mut self, id: ComponentId) -> Option<Component> {
        let component = self.components.remove(id.0)?;
        for opt in &component.options {
            if let Some(option) = self.options.remove(opt.0) {
                for file in &option.files {
                    self.files.remove(file.0);
                }
            }
        }
        for script in &component.scripts {
            self.files.remove(script.0);
        }
        self.order.retain(|c| *c != id);
        if self.default == Some(id) {
            self.default = None;
        }
        Some(component)
    }
}
