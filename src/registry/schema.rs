// src/registry/schema.rs

//! Mapping between the registry document and the in-memory tree
//!
//! The document is only read when a product is opened and only written when
//! a dirty product is flushed; in between, the tree in
//! [`super::models`] is the single source of truth.

use super::models::{
    Component, DEFAULT_MODE, DeviceKind, FileEntry, FileKind, FileOwner, InstallOption, ScriptKind,
    Tree,
};
use super::product::ProductInfo;
use crate::digest::Md5Digest;
use crate::document::{Document, Element};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Current document schema version (major, minor)
pub const SCHEMA_VERSION: (u32, u32) = (1, 0);

/// Schema version as written to the `xmlversion` attribute
pub fn schema_version_string() -> String {
    format!("{}.{}", SCHEMA_VERSION.0, SCHEMA_VERSION.1)
}

/// Parse an `xmlversion` attribute ("MAJOR.MINOR")
pub fn parse_schema_version(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.trim().split_once('.').unwrap_or((s.trim(), "0"));
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Location of a product's registry document under its install root
pub fn registry_path_for(root: &std::path::Path, name: &str) -> PathBuf {
    root.join(".manifest").join(format!("{}.xml", name))
}

/// Build product info and the full entity tree from a parsed document
pub(crate) fn load(doc: &Document) -> Result<(ProductInfo, Tree)> {
    let root_el = &doc.root;
    if root_el.name != "product" {
        return Err(Error::MalformedDocument(format!(
            "Expected <product> root element, found <{}>",
            root_el.name
        )));
    }

    let name = required_attr(root_el, "name")?.to_string();
    let root = PathBuf::from(required_attr(root_el, "root")?);
    let info = ProductInfo {
        registry_path: registry_path_for(&root, &name),
        description: root_el.attr("desc").unwrap_or_default().to_string(),
        update_url: root_el.attr("update_url").unwrap_or_default().to_string(),
        name,
        root,
    };

    match root_el.attr("xmlversion").and_then(parse_schema_version) {
        Some(version) if version > SCHEMA_VERSION => {
            warn!(
                "Registry document for {} was written by a newer schema ({}.{} > {}); problems may occur",
                info.name,
                version.0,
                version.1,
                schema_version_string()
            );
        }
        Some(_) => {}
        None => debug!("Registry document for {} has no usable xmlversion", info.name),
    }

    let mut tree = Tree::default();
    for comp_el in root_el.children().iter().filter(|el| el.name == "component") {
        load_component(&mut tree, comp_el)?;
    }

    debug!(
        "Loaded product {}: {} components, {} options, {} files",
        info.name,
        tree.components.len(),
        tree.options.len(),
        tree.files.len()
    );

    Ok((info, tree))
}

fn load_component(tree: &mut Tree, el: &Element) -> Result<()> {
    let mut component = Component::new(
        required_attr(el, "name")?.to_string(),
        el.attr("version").unwrap_or_default().to_string(),
    );
    component.update_url = el.attr("update_url").map(str::to_string);

    let wants_default = el.attr("default").is_some();
    let id = tree.add_component(component, false);

    if wants_default {
        if let Some(existing) = tree.default {
            let first = tree.component(existing).map(|c| c.name.clone()).unwrap_or_default();
            warn!("Multiple default components; keeping {}", first);
        } else {
            tree.default = Some(id);
            if let Some(comp) = tree.component_mut(id) {
                comp.is_default = true;
            }
        }
    }

    for child in el.children() {
        match child.name.as_str() {
            "option" => {
                let name = required_attr(child, "name")?.to_string();
                let opt = tree.add_option(InstallOption::new(name, id), false);
                for file_el in child.children() {
                    let entry = load_file(file_el, FileOwner::Option(opt));
                    tree.add_file(entry, false);
                }
            }
            "script" => {
                let entry = load_file(child, FileOwner::Component(id));
                tree.add_file(entry, false);
            }
            other => debug!("Ignoring unknown <{}> element in component", other),
        }
    }

    Ok(())
}

fn load_file(el: &Element, owner: FileOwner) -> FileEntry {
    let kind = match el.name.as_str() {
        "file" => {
            let md5 = el.attr("md5").and_then(|hex| match Md5Digest::from_hex(hex) {
                Ok(digest) => Some(digest),
                Err(e) => {
                    warn!("Ignoring bad digest for {}: {}", el.text(), e);
                    None
                }
            });
            FileKind::Regular { md5 }
        }
        "directory" => FileKind::Directory,
        "symlink" => FileKind::Symlink {
            target: el.attr("dest").map(str::to_string),
        },
        "fifo" => FileKind::Fifo,
        "device" => FileKind::Device {
            kind: el
                .attr("type")
                .and_then(|t| t.parse().ok())
                .unwrap_or(DeviceKind::Char),
            major: el.attr("major").and_then(|n| n.parse().ok()).unwrap_or(0),
            minor: el.attr("minor").and_then(|n| n.parse().ok()).unwrap_or(0),
        },
        "rpm" => FileKind::Rpm {
            version: el.attr("version").unwrap_or_default().to_string(),
            revision: el.attr("revision").and_then(|n| n.parse().ok()).unwrap_or(0),
            autoremove: is_yes(el.attr("autoremove")),
        },
        "script" => {
            let kind = match el.attr("type").map(str::parse::<ScriptKind>) {
                Some(Ok(kind)) => kind,
                _ => {
                    warn!("Script {} has no valid type; assuming pre-uninstall", el.text());
                    ScriptKind::PreUninstall
                }
            };
            FileKind::Script { kind }
        }
        other => FileKind::Unknown {
            tag: other.to_string(),
        },
    };

    let mut entry = FileEntry::new(el.text().to_string(), kind, owner);
    entry.patched = is_yes(el.attr("patched"));
    entry.mode = el
        .attr("mode")
        .and_then(|m| u32::from_str_radix(m.trim(), 8).ok())
        .unwrap_or(DEFAULT_MODE);
    entry
}

/// Serialize product info and tree into a fresh document
pub(crate) fn to_document(info: &ProductInfo, tree: &Tree) -> Document {
    let mut root = Element::new("product").attr_with("name", info.name.as_str());
    if !info.description.is_empty() {
        root.set_attr("desc", info.description.as_str());
    }
    root.set_attr("root", info.root.to_string_lossy());
    root.set_attr("update_url", info.update_url.as_str());
    root.set_attr("xmlversion", schema_version_string());

    for comp_id in &tree.order {
        let Some(component) = tree.component(*comp_id) else {
            continue;
        };

        let mut comp_el = Element::new("component")
            .attr_with("name", component.name.as_str())
            .attr_with("version", component.version.as_str());
        if let Some(url) = &component.update_url {
            comp_el.set_attr("update_url", url.as_str());
        }
        if component.is_default {
            comp_el.set_attr("default", "yes");
        }

        for script in component.scripts() {
            if let Some(file) = tree.file(*script) {
                comp_el.push_child(file_element(file));
            }
        }

        for opt_id in component.options() {
            let Some(option) = tree.option(*opt_id) else {
                continue;
            };
            let mut opt_el = Element::new("option").attr_with("name", option.name.as_str());
            for file_id in option.files() {
                if let Some(file) = tree.file(*file_id) {
                    opt_el.push_child(file_element(file));
                }
            }
            comp_el.push_child(opt_el);
        }

        root.push_child(comp_el);
    }

    Document::new(root)
}

fn file_element(file: &FileEntry) -> Element {
    let mode = format!("{:04o}", file.mode);
    let mut el = match &file.kind {
        FileKind::Regular { md5 } => {
            let mut el = Element::with_text("file", file.path.as_str());
            if let Some(md5) = md5 {
                el.set_attr("md5", md5.to_hex());
            }
            el.set_attr("mode", mode);
            el.set_attr("patched", yes_no(file.patched));
            return el;
        }
        FileKind::Directory => Element::with_text("directory", file.path.as_str()).attr_with("mode", mode),
        FileKind::Symlink { target } => {
            let mut el = Element::with_text("symlink", file.path.as_str());
            if let Some(target) = target {
                el.set_attr("dest", target.as_str());
            }
            el.attr_with("mode", mode)
        }
        FileKind::Fifo => Element::with_text("fifo", file.path.as_str()).attr_with("mode", mode),
        FileKind::Device { kind, major, minor } => Element::with_text("device", file.path.as_str())
            .attr_with("type", kind.as_str())
            .attr_with("major", major.to_string())
            .attr_with("minor", minor.to_string())
            .attr_with("mode", mode),
        FileKind::Rpm {
            version,
            revision,
            autoremove,
        } => {
            return Element::with_text("rpm", file.path.as_str())
                .attr_with("version", version.as_str())
                .attr_with("revision", revision.to_string())
                .attr_with("autoremove", yes_no(*autoremove));
        }
        FileKind::Script { kind } => {
            return Element::with_text("script", file.path.as_str()).attr_with("type", kind.as_str());
        }
        FileKind::Unknown { tag } => Element::with_text(tag.as_str(), file.path.as_str()).attr_with("mode", mode),
    };

    if file.patched {
        el.set_attr("patched", "yes");
    }
    el
}

fn required_attr<'a>(el: &'a Element, key: &str) -> Result<&'a str> {
    el.attr(key).ok_or_else(|| {
        Error::MalformedDocument(format!("<{}> is missing the {} attribute", el.name, key))
    })
}

fn is_yes(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.starts_with('y'))
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::models::{FileType, OptionId};

    const DOC: &str = r#"<?xml version="1.0"?>
<product name="game" desc="The Game" root="/opt/game" update_url="http://example.com/game" xmlversion="1.0">
  <component name="Default" version="1.0" default="yes">
    <script type="post-uninstall">cleanup</script>
    <option name="Binaries">
      <file md5="5eb63bbbe01eeed093cb22bb8f5acdc3" mode="0755" patched="no">bin/run</file>
      <directory>bin</directory>
      <symlink dest="run">bin/game</symlink>
      <device type="block" major="8" minor="1">dev/disk</device>
      <rpm version="2.1" revision="3" autoremove="yes">libfoo</rpm>
      <socket>var/sock</socket>
    </option>
  </component>
  <component name="Expansion" version="1.1" update_url="http://example.com/exp" default="yes"/>
</product>
"#;

    fn first_option(tree: &Tree) -> OptionId {
        tree.component(tree.order[0]).unwrap().options()[0]
    }

    #[test]
    fn test_load_product_info() {
        let doc = Document::parse_str(DOC).unwrap();
        let (info, _) = load(&doc).unwrap();
        assert_eq!(info.name, "game");
        assert_eq!(info.description, "The Game");
        assert_eq!(info.root, PathBuf::from("/opt/game"));
        assert_eq!(info.update_url, "http://example.com/game");
        assert_eq!(info.registry_path, PathBuf::from("/opt/game/.manifest/game.xml"));
    }

    #[test]
    fn test_load_keeps_single_default() {
        let doc = Document::parse_str(DOC).unwrap();
        let (_, tree) = load(&doc).unwrap();
        assert_eq!(tree.order.len(), 2);
        let first = tree.component(tree.order[0]).unwrap();
        let second = tree.component(tree.order[1]).unwrap();
        assert!(first.is_default);
        assert!(!second.is_default);
        assert_eq!(second.update_url.as_deref(), Some("http://example.com/exp"));
        assert_eq!(tree.default, Some(tree.order[0]));
    }

    #[test]
    fn test_load_file_types() {
        let doc = Document::parse_str(DOC).unwrap();
        let (_, tree) = load(&doc).unwrap();
        let opt = tree.option(first_option(&tree)).unwrap();

        let types: Vec<FileType> = opt
            .files()
            .iter()
            .map(|id| tree.file(*id).unwrap().file_type())
            .collect();
        assert_eq!(
            types,
            vec![
                FileType::Regular,
                FileType::Directory,
                FileType::Symlink,
                FileType::Device,
                FileType::Rpm,
                FileType::Undetermined
            ]
        );

        let regular = tree.file(opt.files()[0]).unwrap();
        assert_eq!(regular.mode, 0o755);
        assert_eq!(regular.md5().unwrap().to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(tree.file(opt.files()[1]).unwrap().mode, DEFAULT_MODE);

        let comp = tree.component(tree.order[0]).unwrap();
        let script = tree.file(comp.scripts()[0]).unwrap();
        assert_eq!(script.script_kind(), Some(ScriptKind::PostUninstall));
        assert_eq!(script.path, "cleanup");
    }

    #[test]
    fn test_serialize_then_load_is_stable() {
        let doc = Document::parse_str(DOC).unwrap();
        let (info, tree) = load(&doc).unwrap();

        let written = to_document(&info, &tree);
        let (info2, tree2) = load(&Document::parse_str(&written.to_xml().unwrap()).unwrap()).unwrap();

        assert_eq!(info, info2);
        assert_eq!(tree.order.len(), tree2.order.len());
        let opt1 = tree.option(first_option(&tree)).unwrap();
        let opt2 = tree2.option(first_option(&tree2)).unwrap();
        for (a, b) in opt1.files().iter().zip(opt2.files()) {
            let (fa, fb) = (tree.file(*a).unwrap(), tree2.file(*b).unwrap());
            assert_eq!(fa.path, fb.path);
            assert_eq!(fa.kind, fb.kind);
            assert_eq!(fa.mode, fb.mode);
        }
    }

    #[test]
    fn test_load_rejects_wrong_root() {
        let doc = Document::parse_str("<inventory name=\"x\" root=\"/\"/>").unwrap();
        assert!(matches!(load(&doc), Err(Error::MalformedDocument(_))));

        let doc = Document::parse_str("<product root=\"/\"/>").unwrap();
        assert!(matches!(load(&doc), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn test_newer_schema_still_loads() {
        let doc = Document::parse_str(r#"<product name="x" root="/opt/x" xmlversion="99.0"/>"#).unwrap();
        let (info, tree) = load(&doc).unwrap();
        assert_eq!(info.name, "x");
        assert!(tree.order.is_empty());
    }

    #[test]
    fn test_parse_schema_version() {
        assert_eq!(parse_schema_version("1.2"), Some((1, 2)));
        assert_eq!(parse_schema_version("3"), Some((3, 0)));
        assert_eq!(parse_schema_version("x.y"), None);
    }
}
