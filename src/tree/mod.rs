//! Hierarchical view over the flat archive entry list.
//!
//! Nodes live in an arena and refer to their children by [`NodeId`]. After
//! construction the arena is renumbered in sorted pre-order, so two trees
//! built from the same entry set compare equal whatever the entry order.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::unpack::ArchiveEntry;

/// Entries nested deeper than this are not added to the tree.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTreeNode {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    /// File size, or the total size of all files below a directory.
    pub size: u64,
    /// 1 for a file, number of files below a directory.
    pub file_count: usize,
    pub children: Vec<NodeId>,
}

impl FileTreeNode {
    fn directory(name: &str, path: String) -> Self {
        Self {
            name: name.to_string(),
            path,
            is_directory: true,
            size: 0,
            file_count: 0,
            children: Vec::new(),
        }
    }

    fn file(name: &str, path: String, size: u64) -> Self {
        Self {
            name: name.to_string(),
            path,
            is_directory: false,
            size,
            file_count: 1,
            children: Vec::new(),
        }
    }
}

/// An entry that could not be placed in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTree {
    nodes: Vec<FileTreeNode>,
    /// File paths that appeared more than once; the last entry won.
    collisions: Vec<String>,
    skipped: Vec<SkippedEntry>,
}

impl Default for FileTree {
    fn default() -> Self {
        Self {
            nodes: vec![FileTreeNode::directory("", String::new())],
            collisions: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl FileTree {
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a ArchiveEntry>,
    {
        let mut builder = TreeBuilder::new();
        for entry in entries {
            if entry.is_directory {
                builder.insert_directory(&entry.path);
            } else {
                builder.insert_file(&entry.path, entry.uncompressed_size);
            }
        }
        builder.finish()
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &FileTreeNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&FileTreeNode> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &FileTreeNode> + '_ {
        self.nodes[id.0].children.iter().map(|&c| &self.nodes[c.0])
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.nodes[0].file_count
    }

    pub fn total_size(&self) -> u64 {
        self.nodes[0].size
    }

    pub fn collisions(&self) -> &[String] {
        &self.collisions
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Nodes in sorted pre-order, root first.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &FileTreeNode)> + '_ {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// File nodes in display order.
    pub fn files(&self) -> impl Iterator<Item = &FileTreeNode> + '_ {
        self.nodes.iter().filter(|n| !n.is_directory)
    }

    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut current = NodeId(0);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = *self.nodes[current.0]
                .children
                .iter()
                .find(|&&c| self.nodes[c.0].name == segment)?;
        }
        Some(current)
    }

    /// Copy of the tree holding only the files accepted by `keep` and the
    /// directories leading to them. The root is always kept.
    ///
    /// Collisions are carried over for the files that remain. Skipped
    /// entries never became nodes, so the pruned tree reports none; they
    /// stay on the tree built from the archive.
    pub(crate) fn prune<F>(&self, mut keep: F) -> FileTree
    where
        F: FnMut(&FileTreeNode) -> bool,
    {
        // Children always have larger ids than their parent.
        let mut kept = vec![false; self.nodes.len()];
        for id in (0..self.nodes.len()).rev() {
            let node = &self.nodes[id];
            kept[id] = if node.is_directory {
                node.children.iter().any(|c| kept[c.0])
            } else {
                keep(node)
            };
        }
        kept[0] = true;

        let mut nodes: Vec<FileTreeNode> = Vec::with_capacity(kept.iter().filter(|k| **k).count());
        let mut stack = vec![(NodeId(0), None::<usize>)];
        while let Some((id, parent)) = stack.pop() {
            let source = &self.nodes[id.0];
            let new_id = nodes.len();
            nodes.push(FileTreeNode {
                children: Vec::new(),
                ..source.clone()
            });
            if let Some(parent) = parent {
                nodes[parent].children.push(NodeId(new_id));
            }
            for &child in source.children.iter().rev() {
                if kept[child.0] {
                    stack.push((child, Some(new_id)));
                }
            }
        }

        let kept_files: HashSet<&str> = nodes
            .iter()
            .filter(|n| !n.is_directory)
            .map(|n| n.path.as_str())
            .collect();
        let collisions = self
            .collisions
            .iter()
            .filter(|path| kept_files.contains(path.as_str()))
            .cloned()
            .collect();

        let mut tree = FileTree {
            nodes,
            collisions,
            skipped: Vec::new(),
        };
        tree.aggregate();
        tree
    }

    fn aggregate(&mut self) {
        for id in (0..self.nodes.len()).rev() {
            if !self.nodes[id].is_directory {
                continue;
            }
            let (size, count) = self.nodes[id]
                .children
                .iter()
                .map(|c| &self.nodes[c.0])
                .fold((0u64, 0usize), |(size, count), child| {
                    (size.saturating_add(child.size), count + child.file_count)
                });
            self.nodes[id].size = size;
            self.nodes[id].file_count = count;
        }
    }

    /// Owned nested representation, for JSON output.
    pub fn nested(&self) -> NestedNode {
        self.nested_from(self.root())
    }

    pub fn nested_from(&self, id: NodeId) -> NestedNode {
        let node = &self.nodes[id.0];
        NestedNode {
            name: node.name.clone(),
            path: node.path.clone(),
            is_directory: node.is_directory,
            size: node.size,
            file_count: node.file_count,
            children: node.children.iter().map(|&c| self.nested_from(c)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedNode {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    pub file_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedNode>,
}

struct TreeBuilder {
    nodes: Vec<FileTreeNode>,
    by_path: HashMap<String, usize>,
    collisions: Vec<String>,
    skipped: Vec<SkippedEntry>,
}

impl TreeBuilder {
    fn new() -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(String::new(), 0);
        Self {
            nodes: vec![FileTreeNode::directory("", String::new())],
            by_path,
            collisions: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn segments(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    fn skip(&mut self, path: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(path, reason = %reason, "Skipping archive entry");
        self.skipped.push(SkippedEntry {
            path: path.to_string(),
            reason,
        });
    }

    /// Walk or create the directories of `segments`, returning the last one.
    fn ensure_directories(&mut self, original: &str, segments: &[&str]) -> Option<usize> {
        let mut parent = 0;
        let mut path = String::new();
        for segment in segments {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(segment);

            parent = match self.by_path.get(&path) {
                Some(&id) if self.nodes[id].is_directory => id,
                Some(_) => {
                    self.skip(original, format!("{path} is a file, not a directory"));
                    return None;
                }
                None => {
                    let id = self.nodes.len();
                    self.nodes.push(FileTreeNode::directory(segment, path.clone()));
                    self.nodes[parent].children.push(NodeId(id));
                    self.by_path.insert(path.clone(), id);
                    id
                }
            };
        }
        Some(parent)
    }

    fn insert_directory(&mut self, path: &str) {
        let segments = Self::segments(path);
        if segments.len() > MAX_DEPTH {
            self.skip(path, format!("nested deeper than {MAX_DEPTH} levels"));
            return;
        }
        self.ensure_directories(path, &segments);
    }

    fn insert_file(&mut self, path: &str, size: u64) {
        let segments = Self::segments(path);
        let Some((name, dirs)) = segments.split_last() else {
            self.skip(path, "empty path");
            return;
        };
        if segments.len() > MAX_DEPTH {
            self.skip(path, format!("nested deeper than {MAX_DEPTH} levels"));
            return;
        }

        let full_path = segments.join("/");
        match self.by_path.get(&full_path) {
            // A file entry naming an existing directory adds nothing.
            Some(&id) if self.nodes[id].is_directory => {}
            Some(&id) => {
                tracing::warn!(path = %full_path, "Duplicate file path, keeping the last entry");
                self.nodes[id].size = size;
                self.collisions.push(full_path);
            }
            None => {
                let Some(parent) = self.ensure_directories(path, dirs) else {
                    return;
                };
                let id = self.nodes.len();
                self.nodes.push(FileTreeNode::file(name, full_path.clone(), size));
                self.nodes[parent].children.push(NodeId(id));
                self.by_path.insert(full_path, id);
            }
        }
    }

    fn finish(mut self) -> FileTree {
        for node in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[node].children);
            children.sort_by(|a, b| {
                let (a, b) = (&self.nodes[a.0], &self.nodes[b.0]);
                b.is_directory
                    .cmp(&a.is_directory)
                    .then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
            });
            self.nodes[node].children = children;
        }

        let unordered = FileTree {
            nodes: self.nodes,
            collisions: Vec::new(),
            skipped: Vec::new(),
        };
        // Renumber in sorted pre-order and compute directory totals.
        let mut tree = unordered.renumber();
        tree.collisions = self.collisions;
        tree.skipped = self.skipped;
        tree.aggregate();
        tree
    }
}

impl FileTree {
    fn renumber(&self) -> FileTree {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0usize, None::<usize>)];
        while let Some((id, parent)) = stack.pop() {
            let new_id = nodes.len();
            nodes.push(FileTreeNode {
                children: Vec::new(),
                ..self.nodes[id].clone()
            });
            if let Some(parent) = parent {
                nodes[parent].children.push(NodeId(new_id));
            }
            for child in self.nodes[id].children.iter().rev() {
                stack.push((child.0, Some(new_id)));
            }
        }
        FileTree {
            nodes,
            collisions: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tree: &FileTree, id: NodeId) -> Vec<String> {
        tree.children(id).map(|n| n.name.clone()).collect()
    }

    #[test]
    fn test_synthesizes_directories() {
        let entries = vec![ArchiveEntry::file("js/lib/util.js", 10)];
        let tree = FileTree::build(&entries);
        assert_eq!(tree.len(), 4);
        let lib = tree.find("js/lib").unwrap();
        assert!(tree.node(lib).is_directory);
        assert_eq!(tree.node(tree.find("js/lib/util.js").unwrap()).size, 10);
    }

    #[test]
    fn test_children_order() {
        let entries = vec![
            ArchiveEntry::file("b.js", 1),
            ArchiveEntry::file("a.js", 1),
            ArchiveEntry::file("Z.js", 1),
            ArchiveEntry::file("zeta/x.js", 1),
            ArchiveEntry::directory("alpha"),
        ];
        let tree = FileTree::build(&entries);
        assert_eq!(names(&tree, tree.root()), vec!["alpha", "zeta", "Z.js", "a.js", "b.js"]);
    }

    #[test]
    fn test_empty_segments_collapse() {
        let entries = vec![ArchiveEntry {
            path: "a//b.js".to_string(),
            ..ArchiveEntry::file("x", 3)
        }];
        let tree = FileTree::build(&entries);
        assert!(tree.find("a/b.js").is_some());
        assert_eq!(tree.node(tree.find("a/b.js").unwrap()).path, "a/b.js");
    }

    #[test]
    fn test_duplicate_file_last_wins() {
        let entries = vec![ArchiveEntry::file("a.js", 1), ArchiveEntry::file("a.js", 7)];
        let tree = FileTree::build(&entries);
        assert_eq!(tree.file_count(), 1);
        assert_eq!(tree.node(tree.find("a.js").unwrap()).size, 7);
        assert_eq!(tree.collisions(), &["a.js".to_string()]);
    }

    #[test]
    fn test_file_over_directory_is_noop() {
        let entries = vec![ArchiveEntry::directory("lib"), ArchiveEntry::file("lib", 5)];
        let tree = FileTree::build(&entries);
        assert!(tree.node(tree.find("lib").unwrap()).is_directory);
        assert_eq!(tree.file_count(), 0);
    }

    #[test]
    fn test_file_blocking_directory_is_skipped() {
        let entries = vec![ArchiveEntry::file("lib", 5), ArchiveEntry::file("lib/a.js", 1)];
        let tree = FileTree::build(&entries);
        assert_eq!(tree.file_count(), 1);
        assert_eq!(tree.skipped().len(), 1);
        assert_eq!(tree.skipped()[0].path, "lib/a.js");
    }

    #[test]
    fn test_directory_totals() {
        let entries = vec![
            ArchiveEntry::file("js/a.js", 10),
            ArchiveEntry::file("js/lib/b.js", 5),
            ArchiveEntry::file("manifest.json", 2),
        ];
        let tree = FileTree::build(&entries);
        let js = tree.node(tree.find("js").unwrap());
        assert_eq!(js.size, 15);
        assert_eq!(js.file_count, 2);
        assert_eq!(tree.total_size(), 17);
        assert_eq!(tree.file_count(), 3);
    }

    #[test]
    fn test_too_deep_is_skipped() {
        let deep = vec!["d"; MAX_DEPTH + 1].join("/");
        let entries = vec![ArchiveEntry::file(deep.as_str(), 1)];
        let tree = FileTree::build(&entries);
        assert!(tree.is_empty());
        assert_eq!(tree.skipped().len(), 1);
    }

    #[test]
    fn test_nested_view() {
        let entries = vec![ArchiveEntry::file("js/a.js", 10)];
        let nested = FileTree::build(&entries).nested();
        assert_eq!(nested.children.len(), 1);
        assert_eq!(nested.children[0].children[0].path, "js/a.js");
    }
}
