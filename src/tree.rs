//! In-memory project tree: the per-room hierarchy of folders and files.
//!
//! The tree is the server's authoritative copy of a room's project. Nodes
//! serialize to the exact JSON shape the browser clients exchange:
//!
//! ```json
//! {
//!   "src": { "type": "folder", "children": { "main.cpp": { "type": "file", "code": "...", "language": "cpp" } } },
//!   "README.md": { "type": "file", "code": "# Project", "language": "markdown" }
//! }
//! ```
//!
//! Paths are `/`-joined name sequences resolved structurally; empty segments
//! are skipped so leading, trailing and doubled slashes are all tolerated.
//! Trees are small (editor projects), so resolution walks the structure
//! instead of maintaining a flat index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default content of `src/main.cpp` in a freshly seeded room.
///
/// Existing clients expect this exact program, byte for byte.
pub const DEFAULT_MAIN_CPP: &str = "#include <iostream>\nusing namespace std;\n\nint main() {\n    cout << \"Hello, World!\";\n    return 0;\n}";

/// A file or folder in the project tree.
///
/// Sibling names are unique by construction (children live in a map keyed
/// by name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    File {
        #[serde(default)]
        code: String,
        #[serde(default)]
        language: String,
    },
    Folder {
        #[serde(default)]
        children: HashMap<String, Node>,
    },
}

impl Node {
    /// Create a file node.
    pub fn file(code: impl Into<String>, language: impl Into<String>) -> Self {
        Node::File {
            code: code.into(),
            language: language.into(),
        }
    }

    /// Create an empty folder node.
    pub fn folder() -> Self {
        Node::Folder {
            children: HashMap::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Node::File { .. })
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Node::Folder { .. })
    }
}

/// Tree mutation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// A path did not resolve to an existing node.
    NotFound,
    /// An insertion collided with an existing sibling name.
    AlreadyExists,
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "path does not resolve to a node"),
            Self::AlreadyExists => write!(f, "a sibling with that name already exists"),
        }
    }
}

impl std::error::Error for TreeError {}

/// Split a path into its non-empty segments.
fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// The root folder of a room's project.
///
/// The root itself is implicit: it serializes transparently as the
/// name → node map of its children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectTree {
    root: HashMap<String, Node>,
}

impl ProjectTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the default project seeded into a freshly created room:
    /// `src/main.cpp` (the fixed greeting program) plus a root `README.md`.
    pub fn seed() -> Self {
        let mut src = HashMap::new();
        src.insert("main.cpp".to_string(), Node::file(DEFAULT_MAIN_CPP, "cpp"));

        let mut root = HashMap::new();
        root.insert("src".to_string(), Node::Folder { children: src });
        root.insert("README.md".to_string(), Node::file("# Project", "markdown"));

        Self { root }
    }

    /// Resolve a path to a node.
    ///
    /// Returns `None` when any segment is absent, when a file is indexed
    /// into, or when the path contains no segments at all (the implicit
    /// root is not itself a node).
    pub fn resolve(&self, path: &str) -> Option<&Node> {
        let mut segments = path_segments(path);
        let mut current = self.root.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Node::Folder { children } => children.get(segment)?,
                Node::File { .. } => return None,
            };
        }
        Some(current)
    }

    /// Mutable variant of [`resolve`](Self::resolve).
    pub fn resolve_mut(&mut self, path: &str) -> Option<&mut Node> {
        let mut segments = path_segments(path);
        let mut current = self.root.get_mut(segments.next()?)?;
        for segment in segments {
            current = match current {
                Node::Folder { children } => children.get_mut(segment)?,
                Node::File { .. } => return None,
            };
        }
        Some(current)
    }

    /// Insert `node` as a child named `name` under `parent_path`.
    ///
    /// Fails with [`TreeError::AlreadyExists`] when the name collides with
    /// an existing sibling under the resolved parent.
    pub fn insert(&mut self, parent_path: &str, name: &str, node: Node) -> Result<(), TreeError> {
        let parent = self.insertion_parent(parent_path);
        if parent.contains_key(name) {
            return Err(TreeError::AlreadyExists);
        }
        parent.insert(name.to_string(), node);
        Ok(())
    }

    /// Resolve the children map an insertion targets.
    ///
    /// When `parent_path` does not resolve to a folder the target falls
    /// back to the tree root. That fallback is a preserved behavior of the
    /// existing clients, and this function is the only place it lives —
    /// change it here, not at call sites.
    fn insertion_parent(&mut self, parent_path: &str) -> &mut HashMap<String, Node> {
        let segments: Vec<&str> = path_segments(parent_path).collect();

        // Validate the walk immutably first; the mutable descent below then
        // cannot hit a non-folder.
        let fully_resolves = {
            let mut current = &self.root;
            let mut ok = true;
            for segment in &segments {
                match current.get(*segment) {
                    Some(Node::Folder { children }) => current = children,
                    _ => {
                        ok = false;
                        break;
                    }
                }
            }
            ok
        };

        let depth = if fully_resolves { segments.len() } else { 0 };
        let mut current = &mut self.root;
        for segment in segments.into_iter().take(depth) {
            // `depth` is nonzero only when the walk above saw a folder at
            // every segment, so this lookup cannot miss.
            current = match current.get_mut(segment) {
                Some(Node::Folder { children }) => children,
                _ => unreachable!("segment was a folder in the immutable walk"),
            };
        }
        current
    }

    /// Remove the node at `path`, detaching it from its parent.
    ///
    /// Returns the removed node, or [`TreeError::NotFound`] when the path
    /// does not resolve.
    pub fn remove(&mut self, path: &str) -> Result<Node, TreeError> {
        let mut segments: Vec<&str> = path_segments(path).collect();
        let name = segments.pop().ok_or(TreeError::NotFound)?;

        let mut parent = &mut self.root;
        for segment in segments {
            parent = match parent.get_mut(segment) {
                Some(Node::Folder { children }) => children,
                _ => return Err(TreeError::NotFound),
            };
        }
        parent.remove(name).ok_or(TreeError::NotFound)
    }

    /// Whole-tree replacement: the incoming tree wholly supersedes the
    /// stored one. No diffing, no merging.
    pub fn replace(&mut self, new_tree: ProjectTree) {
        self.root = new_tree.root;
    }

    /// Depth-first search for the first file in the tree, visiting sibling
    /// names in sorted order so the result is deterministic.
    pub fn first_file_path(&self) -> Option<String> {
        fn walk(children: &HashMap<String, Node>, prefix: &str) -> Option<String> {
            let mut names: Vec<&String> = children.keys().collect();
            names.sort();
            for name in names {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                match &children[name] {
                    Node::File { .. } => return Some(path),
                    Node::Folder { children } => {
                        if let Some(found) = walk(children, &path) {
                            return Some(found);
                        }
                    }
                }
            }
            None
        }
        walk(&self.root, "")
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}
