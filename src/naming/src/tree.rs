use dfs_lib::DfsPath;
use dfs_proto::{CommandStub, StorageStub};

use crate::locks::LockQueue;

/// The pair of stubs identifying one registered storage server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub storage: StorageStub,
    pub command: CommandStub,
}

/// A node of the directory tree: an interior directory with an ordered list
/// of children, or a file leaf bound to its primary storage server plus the
/// replica bookkeeping the replication controller maintains. Every node
/// carries its own lock-request queue.
#[derive(Debug)]
pub enum Node {
    Dir(DirNode),
    File(FileNode),
}

#[derive(Debug)]
pub struct DirNode {
    pub name: String,
    pub queue: LockQueue,
    pub children: Vec<Node>,
}

#[derive(Debug)]
pub struct FileNode {
    pub name: String,
    pub queue: LockQueue,
    pub primary: StorageTarget,
    pub replicas: Vec<StorageTarget>,
    pub read_count: u64,
    pub replica_count: usize,
}

impl DirNode {
    pub fn new(name: &str) -> Self {
        DirNode {
            name: name.to_string(),
            queue: LockQueue::new(),
            children: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name() == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name() == name)
    }

    /// Inserts a child; the caller has already checked the name is unused.
    pub fn insert(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn remove_child(&mut self, name: &str) -> Option<Node> {
        let idx = self.children.iter().position(|c| c.name() == name)?;
        Some(self.children.remove(idx))
    }
}

impl Node {
    /// The tree root: a directory named `/`.
    pub fn root() -> Node {
        Node::Dir(DirNode::new("/"))
    }

    pub fn dir(name: &str) -> Node {
        Node::Dir(DirNode::new(name))
    }

    pub fn file(name: &str, target: StorageTarget) -> Node {
        Node::File(FileNode {
            name: name.to_string(),
            queue: LockQueue::new(),
            primary: target,
            replicas: Vec::new(),
            read_count: 0,
            replica_count: 0,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Dir(d) => &d.name,
            Node::File(f) => &f.name,
        }
    }

    pub fn queue(&self) -> &LockQueue {
        match self {
            Node::Dir(d) => &d.queue,
            Node::File(f) => &f.queue,
        }
    }

    pub fn queue_mut(&mut self) -> &mut LockQueue {
        match self {
            Node::Dir(d) => &mut d.queue,
            Node::File(f) => &mut f.queue,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    /// Resolves a path against this node as the tree root. A path that runs
    /// through a file as an intermediate component does not resolve.
    pub fn resolve(&self, path: &DfsPath) -> Option<&Node> {
        let mut cur = self;
        for component in path.components() {
            match cur {
                Node::Dir(d) => cur = d.child(component)?,
                Node::File(_) => return None,
            }
        }
        Some(cur)
    }

    pub fn resolve_mut(&mut self, path: &DfsPath) -> Option<&mut Node> {
        let mut cur = self;
        for component in path.components() {
            match cur {
                Node::Dir(d) => cur = d.child_mut(component)?,
                Node::File(_) => return None,
            }
        }
        Some(cur)
    }

    /// Collects the distinct storage servers holding any file in this
    /// subtree, primaries and replicas alike. Deduplicated by stub equality
    /// so delete fan-out commands each server once.
    pub fn collect_targets(&self, out: &mut Vec<StorageTarget>) {
        match self {
            Node::File(f) => {
                push_unique(out, &f.primary);
                for replica in &f.replicas {
                    push_unique(out, replica);
                }
            }
            Node::Dir(d) => {
                for child in &d.children {
                    child.collect_targets(out);
                }
            }
        }
    }
}

fn push_unique(out: &mut Vec<StorageTarget>, target: &StorageTarget) {
    if !out.iter().any(|t| t.command == target.command) {
        out.push(target.clone());
    }
}

/// Merges a newly registered server's file list into the tree.
///
/// Missing intermediate directories are created; each final component is
/// installed as a file leaf bound to `target`. A path whose leaf position is
/// already taken, or that runs into an existing file as an intermediate
/// component, is left untouched and reported back as a duplicate for the
/// caller to prune.
pub fn merge_paths(root: &mut Node, files: &[DfsPath], target: &StorageTarget) -> Vec<DfsPath> {
    let mut duplicates = Vec::new();

    'next_path: for path in files {
        if path.is_root() {
            continue;
        }
        let mut cur = match root {
            Node::Dir(d) => d,
            Node::File(_) => return duplicates,
        };
        let components: Vec<&str> = path.components().collect();
        for (i, component) in components.iter().enumerate() {
            let last = i + 1 == components.len();
            if last {
                if cur.child(component).is_some() {
                    duplicates.push(path.clone());
                } else {
                    cur.insert(Node::file(component, target.clone()));
                }
            } else {
                if cur.child(component).is_none() {
                    cur.insert(Node::dir(component));
                }
                match cur.child_mut(component) {
                    Some(Node::Dir(d)) => cur = d,
                    _ => {
                        duplicates.push(path.clone());
                        continue 'next_path;
                    }
                }
            }
        }
    }
    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn target(port: u16) -> StorageTarget {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        StorageTarget {
            storage: StorageStub::connect(addr).unwrap(),
            command: CommandStub::connect(addr).unwrap(),
        }
    }

    fn path(s: &str) -> DfsPath {
        DfsPath::parse(s).unwrap()
    }

    #[test]
    fn merge_builds_directories_and_leaves() {
        let mut root = Node::root();
        let dups = merge_paths(&mut root, &[path("/a/b"), path("/c")], &target(7001));
        assert!(dups.is_empty());

        assert!(root.resolve(&path("/a")).unwrap().is_dir());
        assert!(!root.resolve(&path("/a/b")).unwrap().is_dir());
        assert!(!root.resolve(&path("/c")).unwrap().is_dir());
    }

    #[test]
    fn merge_reports_existing_leaves_as_duplicates() {
        let mut root = Node::root();
        let first = target(7001);
        let second = target(7002);
        merge_paths(&mut root, &[path("/a/b"), path("/c")], &first);
        let dups = merge_paths(&mut root, &[path("/a/b"), path("/d")], &second);
        assert_eq!(dups, vec![path("/a/b")]);

        // The original binding survives; the new path binds to the new server.
        match root.resolve(&path("/a/b")).unwrap() {
            Node::File(f) => assert_eq!(f.primary, first),
            Node::Dir(_) => panic!("expected a file"),
        }
        match root.resolve(&path("/d")).unwrap() {
            Node::File(f) => assert_eq!(f.primary, second),
            Node::Dir(_) => panic!("expected a file"),
        }
    }

    #[test]
    fn merge_abandons_paths_through_a_file() {
        let mut root = Node::root();
        let server = target(7001);
        merge_paths(&mut root, &[path("/a")], &server);
        let dups = merge_paths(&mut root, &[path("/a/b/c")], &server);
        assert_eq!(dups, vec![path("/a/b/c")]);
        assert!(root.resolve(&path("/a/b")).is_none());
    }

    #[test]
    fn resolve_does_not_cross_file_nodes() {
        let mut root = Node::root();
        merge_paths(&mut root, &[path("/f")], &target(7001));
        assert!(root.resolve(&path("/f")).is_some());
        assert!(root.resolve(&path("/f/x")).is_none());
    }

    #[test]
    fn collect_targets_deduplicates_servers() {
        let mut root = Node::root();
        let a = target(7001);
        let b = target(7002);
        merge_paths(&mut root, &[path("/d/x"), path("/d/y")], &a);
        merge_paths(&mut root, &[path("/d/z")], &b);

        let mut out = Vec::new();
        root.resolve(&path("/d")).unwrap().collect_targets(&mut out);
        assert_eq!(out.len(), 2);
    }
}
