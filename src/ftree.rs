// Virtual folder tree rebuilt from the flat record list. Folders only exist
// because some record's name has them as a prefix; nothing here is persisted.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::errors::{Result, ShelfError};
use crate::records::FileRecord;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TreeNode {
    Folder(FolderNode),
    File(FileNode),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FolderNode {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) children: HashMap<String, TreeNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FileNode {
    /// The record with `name` cut down to its last path segment.
    pub(crate) file: FileRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum EntryType {
    Folder,
    File,
}

/// One row of the flattened, display-ordered tree.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ListingEntry {
    #[serde(rename = "type")]
    pub(crate) entry_type: EntryType,
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) depth: usize,
    pub(crate) icon: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) file: Option<FileRecord>,
}

impl TreeNode {
    pub(crate) fn get_name(&self) -> &str {
        match self {
            TreeNode::Folder(f) => &f.name,
            TreeNode::File(f) => &f.file.name,
        }
    }

    fn is_folder(&self) -> bool {
        matches!(self, TreeNode::Folder(_))
    }
}

/// Folders before files, then plain byte-wise name order.
fn display_order(a: &TreeNode, b: &TreeNode) -> Ordering {
    match (a.is_folder(), b.is_folder()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.get_name().cmp(b.get_name()),
    }
}

fn sorted(children: &HashMap<String, TreeNode>) -> Vec<&TreeNode> {
    let mut nodes: Vec<&TreeNode> = children.values().collect();
    nodes.sort_by(|a, b| display_order(a, b));
    nodes
}

/// The prefix every record inside the folder at `path` starts with. Empty
/// segments are part of the path, so `a/` (the unnamed folder inside `a`)
/// gives `a//`.
pub(crate) fn folder_prefix(path: &str) -> String {
    format!("{}/", path)
}

impl FolderNode {
    fn new(name: &str, path: String) -> FolderNode {
        FolderNode {
            name: name.to_string(),
            path,
            children: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct FileTree {
    root: HashMap<String, TreeNode>,
}

impl FileTree {
    pub(crate) fn build(records: &[FileRecord]) -> FileTree {
        let mut root: HashMap<String, TreeNode> = HashMap::new();
        for record in records {
            let segments: Vec<&str> = record.name.split('/').collect();
            let (file_name, folders) = match segments.split_last() {
                Some(split) => split,
                None => continue,
            };
            let mut current = &mut root;
            for (depth, segment) in folders.iter().enumerate() {
                let needs_folder = !matches!(current.get(*segment), Some(TreeNode::Folder(_)));
                if needs_folder {
                    // A file sitting where a folder is needed gets replaced.
                    let path = segments[..=depth].join("/");
                    current.insert(
                        segment.to_string(),
                        TreeNode::Folder(FolderNode::new(segment, path)),
                    );
                }
                current = match current.get_mut(*segment) {
                    Some(TreeNode::Folder(folder)) => &mut folder.children,
                    _ => unreachable!("folder inserted above"),
                };
            }
            let mut file = record.clone();
            file.name = file_name.to_string();
            current.insert(file_name.to_string(), TreeNode::File(FileNode { file }));
        }
        FileTree { root }
    }

    pub(crate) fn get(&self, path: &str) -> Result<&TreeNode> {
        let parts: Vec<&str> = path.split('/').collect();
        Self::_get(&self.root, &parts)
    }

    fn _get<'a>(level: &'a HashMap<String, TreeNode>, parts: &[&str]) -> Result<&'a TreeNode> {
        let (first, rest) = match parts.split_first() {
            Some(split) => split,
            None => return Err(ShelfError::not_found("Empty path".to_string())),
        };
        let child = level
            .get(*first)
            .ok_or_else(|| ShelfError::not_found(format!("Nothing named {} in tree", first)))?;
        if rest.is_empty() {
            return Ok(child);
        }
        match child {
            TreeNode::Folder(f) => Self::_get(&f.children, rest),
            TreeNode::File(_) => Err(ShelfError::not_found(format!("{} is a file", first))),
        }
    }

    pub(crate) fn listing(&self) -> Vec<ListingEntry> {
        let mut rows = Vec::new();
        Self::list_level(&self.root, None, 0, &mut rows);
        rows
    }

    /// Rows below the folder at `path`, with depth counted from that folder.
    pub(crate) fn listing_at(&self, path: &str) -> Result<Vec<ListingEntry>> {
        match self.get(path)? {
            TreeNode::Folder(f) => {
                let mut rows = Vec::new();
                Self::list_level(&f.children, Some(&f.path), 0, &mut rows);
                Ok(rows)
            }
            TreeNode::File(_) => Err(ShelfError::invalid(format!("{} is not a folder", path))),
        }
    }

    fn list_level(
        level: &HashMap<String, TreeNode>,
        parent_path: Option<&str>,
        depth: usize,
        rows: &mut Vec<ListingEntry>,
    ) {
        for node in sorted(level) {
            match node {
                TreeNode::Folder(f) => {
                    rows.push(ListingEntry {
                        entry_type: EntryType::Folder,
                        name: f.name.clone(),
                        path: f.path.clone(),
                        depth,
                        icon: "folder",
                        file: None,
                    });
                    Self::list_level(&f.children, Some(&f.path), depth + 1, rows);
                }
                TreeNode::File(f) => {
                    let path = match parent_path {
                        Some(parent) => format!("{}/{}", parent, f.file.name),
                        None => f.file.name.clone(),
                    };
                    rows.push(ListingEntry {
                        entry_type: EntryType::File,
                        name: f.file.name.clone(),
                        path,
                        depth,
                        icon: f.file.kind.icon(),
                        file: Some(f.file.clone()),
                    });
                }
            }
        }
    }
}
