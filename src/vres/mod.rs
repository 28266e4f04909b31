//! Virtual resource mapper.
//!
//! Applications address resources by virtual, project-relative names
//! (`Config/App.xml`, `Logs/run.log`). The mapper resolves those names against
//! the project root, honours explicit overrides from the `<vresmap>`
//! configuration scope, and loads charmed resources through the
//! [`CharmContext`](crate::secure::CharmContext).

use crate::error::Result;
use crate::secure::CharmContext;
use crate::strings::{StringPool, unescape_xml};
use crate::xml::Cursor;
use parking_lot::RwLock;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct VrMap {
    root: PathBuf,
    strings: StringPool,
    overrides: Arc<RwLock<Vec<(u32, u32)>>>,
    first_arg_used: bool,
}

impl VrMap {
    /// Build the mapper from the invocation arguments. A first positional
    /// argument that is not a switch names the project root; otherwise the
    /// current directory is used.
    pub fn new(strings: StringPool, args: &[String]) -> Self {
        let positional = args.get(1).filter(|arg| !arg.starts_with('-'));
        let first_arg_used = positional.is_some();
        let root = positional
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        tracing::debug!(root = %root.display(), "resource mapper rooted");
        Self {
            root,
            strings,
            overrides: Arc::new(RwLock::new(Vec::new())),
            first_arg_used,
        }
    }

    /// Mapper rooted at an explicit directory.
    pub fn rooted(strings: StringPool, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            strings,
            overrides: Arc::new(RwLock::new(Vec::new())),
            first_arg_used: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the first command-line parameter was consumed as the project
    /// root.
    pub fn is_first_arg_used(&self) -> bool {
        self.first_arg_used
    }

    /// Resolve a virtual path to a real filesystem location.
    pub fn map_file(&self, virtual_path: &str) -> PathBuf {
        for (vref, rref) in self.overrides.read().iter() {
            if self.strings.get(*vref).as_deref() == Some(virtual_path) {
                if let Some(real) = self.strings.get(*rref) {
                    return PathBuf::from(real);
                }
            }
        }
        let mut real = self.root.clone();
        for part in virtual_path.split('/').filter(|part| !part.is_empty()) {
            real.push(part);
        }
        real
    }

    /// Load a resource, decoding it when charmed. `Ok(None)` means no resource
    /// exists at the virtual path — an expected, recoverable condition.
    pub fn load_charmed(
        &self,
        virtual_path: &str,
        charm: &CharmContext,
    ) -> Result<Option<Vec<u8>>> {
        let real = self.map_file(virtual_path);
        match std::fs::read(&real) {
            Ok(raw) => charm.decode(raw).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Extend the map with `<map virtual="..." real="..."/>` entries from a
    /// `<vresmap>` configuration scope.
    pub fn extend(&self, scope: &Cursor<'_>) {
        let mut added = 0usize;
        for entry in scope.children() {
            if entry.name() != Some("map") {
                continue;
            }
            let (Some(virtual_path), Some(real_path)) = (entry.attr("virtual"), entry.attr("real"))
            else {
                continue;
            };
            let vref = self.strings.intern(&unescape_xml(virtual_path));
            let rref = self.strings.intern(&unescape_xml(real_path));
            self.overrides.write().push((vref, rref));
            added += 1;
        }
        if added > 0 {
            tracing::debug!(entries = added, "resource map extended from configuration");
        }
    }

    /// Drop every override.
    pub fn dismiss(&self) {
        self.overrides.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Document;

    fn mapper(root: &Path) -> VrMap {
        VrMap::rooted(StringPool::new(), root)
    }

    #[test]
    fn joins_virtual_paths_under_the_root() {
        let map = mapper(Path::new("/project"));
        assert_eq!(
            map.map_file("Config/App.xml"),
            PathBuf::from("/project/Config/App.xml")
        );
    }

    #[test]
    fn first_positional_argument_becomes_the_root() {
        let args = vec!["app".to_string(), "/data/proj".to_string()];
        let map = VrMap::new(StringPool::new(), &args);
        assert!(map.is_first_arg_used());
        assert_eq!(map.root(), Path::new("/data/proj"));

        let switches = vec!["app".to_string(), "-V".to_string()];
        let map = VrMap::new(StringPool::new(), &switches);
        assert!(!map.is_first_arg_used());
    }

    #[test]
    fn overrides_win_over_root_relative_mapping() {
        let map = mapper(Path::new("/project"));
        let doc =
            Document::parse(r#"<vresmap><map virtual="Config/App.xml" real="/etc/app.xml"/></vresmap>"#)
                .unwrap();
        map.extend(&doc.scope("vresmap"));
        assert_eq!(map.map_file("Config/App.xml"), PathBuf::from("/etc/app.xml"));
        assert_eq!(
            map.map_file("Config/Other.xml"),
            PathBuf::from("/project/Config/Other.xml")
        );
        map.dismiss();
        assert_eq!(
            map.map_file("Config/App.xml"),
            PathBuf::from("/project/Config/App.xml")
        );
    }

    #[test]
    fn missing_resource_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let map = mapper(dir.path());
        let loaded = map
            .load_charmed("Config/Absent.xml", &CharmContext::cleartext())
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn present_resource_loads_and_decodes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Config")).unwrap();
        std::fs::write(dir.path().join("Config/App.xml"), b"<config/>").unwrap();
        let map = mapper(dir.path());
        let loaded = map
            .load_charmed("Config/App.xml", &CharmContext::cleartext())
            .unwrap();
        assert_eq!(loaded.unwrap(), b"<config/>".to_vec());
    }
}
