use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DfsError, DfsResult};

/// Immutable hierarchical name used by every filesystem interface.
///
/// The string form is a forward-slash-delimited sequence of components and
/// always begins with `/`; the root directory is the single string `/`.
/// Empty components are collapsed during parsing. The colon is reserved as an
/// application delimiter and the slash is the separator, so neither may
/// appear inside a component.
///
/// Paths serialize as their canonical string, so `parse(to_string(p)) == p`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DfsPath {
    components: Vec<String>,
}

impl DfsPath {
    /// The root directory path.
    pub fn root() -> Self {
        DfsPath {
            components: Vec::new(),
        }
    }

    /// Parses a path string. Empty components are dropped.
    pub fn parse(path: &str) -> DfsResult<Self> {
        if path.is_empty() {
            return Err(DfsError::InvalidPath("path string is empty".to_string()));
        }
        if !path.starts_with('/') {
            return Err(DfsError::InvalidPath(format!(
                "path does not begin with a slash: {}",
                path
            )));
        }
        if path.contains(':') {
            return Err(DfsError::InvalidPath(format!(
                "path contains a colon: {}",
                path
            )));
        }
        let components = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect();
        Ok(DfsPath { components })
    }

    /// Creates a new path by appending one component to this path.
    pub fn child(&self, component: &str) -> DfsResult<Self> {
        if component.is_empty() {
            return Err(DfsError::InvalidPath("component is empty".to_string()));
        }
        if component.contains('/') || component.contains(':') {
            return Err(DfsError::InvalidPath(format!(
                "component contains a reserved character: {}",
                component
            )));
        }
        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(DfsPath { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// The path to the parent of this path.
    pub fn parent(&self) -> DfsResult<Self> {
        if self.is_root() {
            return Err(DfsError::IllegalArg("root has no parent".to_string()));
        }
        let mut components = self.components.clone();
        components.pop();
        Ok(DfsPath { components })
    }

    /// The last component of the path.
    pub fn last(&self) -> DfsResult<&str> {
        self.components
            .last()
            .map(|c| c.as_str())
            .ok_or_else(|| DfsError::IllegalArg("root has no last component".to_string()))
    }

    /// Iterates over the components, root first.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// True iff `other`'s component sequence is a prefix of this path's,
    /// including the path itself.
    pub fn is_subpath(&self, other: &DfsPath) -> bool {
        self.components.len() >= other.components.len()
            && self.components[..other.components.len()] == other.components[..]
    }

    /// Every prefix of the path from the root down to the path itself.
    pub fn prefixes(&self) -> Vec<DfsPath> {
        let mut out = Vec::with_capacity(self.components.len() + 1);
        for end in 0..=self.components.len() {
            out.push(DfsPath {
                components: self.components[..end].to_vec(),
            });
        }
        out
    }

    /// Resolves the path against a local filesystem root.
    pub fn to_local(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for component in &self.components {
            out.push(component);
        }
        out
    }

    /// Lists the paths of all files in a directory tree on the local
    /// filesystem, relative to `root`. Directories themselves are not
    /// reported, only the files they contain.
    pub fn list(root: &Path) -> DfsResult<Vec<DfsPath>> {
        if !root.exists() {
            return Err(DfsError::NotFound(format!(
                "directory does not exist: {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(DfsError::NotADirectory(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        let mut out = Vec::new();
        Self::walk(root, &DfsPath::root(), &mut out)?;
        Ok(out)
    }

    fn walk(dir: &Path, prefix: &DfsPath, out: &mut Vec<DfsPath>) -> DfsResult<()> {
        let mut entries = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let child = prefix.child(&name)?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                Self::walk(&entry.path(), &child, out)?;
            } else if file_type.is_file() {
                out.push(child);
            }
        }
        Ok(())
    }
}

impl fmt::Display for DfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for DfsPath {
    type Err = DfsError;

    fn from_str(s: &str) -> DfsResult<Self> {
        DfsPath::parse(s)
    }
}

impl TryFrom<String> for DfsPath {
    type Error = DfsError;

    fn try_from(s: String) -> DfsResult<Self> {
        DfsPath::parse(&s)
    }
}

impl From<DfsPath> for String {
    fn from(path: DfsPath) -> String {
        path.to_string()
    }
}

// A path that is a prefix of another orders before it; otherwise the order
// is lexical on the component sequence. This gives a total order suitable
// for sorting file listings.
impl Ord for DfsPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl PartialOrd for DfsPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collapses_empty_components() {
        let path = DfsPath::parse("/a//b/").unwrap();
        assert_eq!(path.to_string(), "/a/b");
        assert_eq!(path.parent().unwrap().to_string(), "/a");
        assert_eq!(path.last().unwrap(), "b");
    }

    #[test]
    fn parse_rejects_malformed_strings() {
        assert!(matches!(DfsPath::parse(""), Err(DfsError::InvalidPath(_))));
        assert!(matches!(
            DfsPath::parse("a/b"),
            Err(DfsError::InvalidPath(_))
        ));
        assert!(matches!(
            DfsPath::parse("/a:b"),
            Err(DfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn child_rejects_reserved_characters() {
        let root = DfsPath::root();
        assert!(root.child("ok").is_ok());
        assert!(matches!(root.child(""), Err(DfsError::InvalidPath(_))));
        assert!(matches!(root.child("a/b"), Err(DfsError::InvalidPath(_))));
        assert!(matches!(root.child("a:b"), Err(DfsError::InvalidPath(_))));
    }

    #[test]
    fn root_has_no_parent_or_last() {
        let root = DfsPath::parse("/").unwrap();
        assert!(root.is_root());
        assert!(matches!(root.parent(), Err(DfsError::IllegalArg(_))));
        assert!(matches!(root.last(), Err(DfsError::IllegalArg(_))));
    }

    #[test]
    fn round_trips_through_string_form() {
        for s in ["/", "/a", "/a/b/c", "/x//y///z"] {
            let path = DfsPath::parse(s).unwrap();
            assert_eq!(DfsPath::parse(&path.to_string()).unwrap(), path);
        }
    }

    #[test]
    fn subpath_is_prefix_including_self() {
        let path = DfsPath::parse("/a/b").unwrap();
        assert!(path.is_subpath(&DfsPath::parse("/").unwrap()));
        assert!(path.is_subpath(&DfsPath::parse("/a").unwrap()));
        assert!(path.is_subpath(&DfsPath::parse("/a/b").unwrap()));
        assert!(!path.is_subpath(&DfsPath::parse("/a/b/c").unwrap()));
        assert!(!path.is_subpath(&DfsPath::parse("/b").unwrap()));
    }

    #[test]
    fn order_is_prefix_then_lexical() {
        let mut paths = vec![
            DfsPath::parse("/b").unwrap(),
            DfsPath::parse("/a/b/c").unwrap(),
            DfsPath::parse("/a").unwrap(),
            DfsPath::parse("/").unwrap(),
            DfsPath::parse("/a/b").unwrap(),
        ];
        paths.sort();
        let rendered: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["/", "/a", "/a/b", "/a/b/c", "/b"]);
    }

    #[test]
    fn prefixes_run_root_to_leaf() {
        let path = DfsPath::parse("/a/b").unwrap();
        let rendered: Vec<String> = path.prefixes().iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["/", "/a", "/a/b"]);
    }

    #[test]
    fn list_walks_a_directory_tree() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("d/sub")).unwrap();
        std::fs::write(tmp.path().join("top"), b"x").unwrap();
        std::fs::write(tmp.path().join("d/sub/deep"), b"y").unwrap();

        let mut found = DfsPath::list(tmp.path()).unwrap();
        found.sort();
        let rendered: Vec<String> = found.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["/d/sub/deep", "/top"]);
    }

    #[test]
    fn list_rejects_missing_or_file_roots() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            DfsPath::list(&missing),
            Err(DfsError::NotFound(_))
        ));

        let file = tmp.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            DfsPath::list(&file),
            Err(DfsError::NotADirectory(_))
        ));
    }
}
