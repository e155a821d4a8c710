// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Assemble flat directory scans into a nested file tree.
// Author: Lukas Bower

//! Directory tree assembly.
//!
//! `scanDir` returns a flat, pre-order list of `(name, parent, stat)` records.
//! [`build_tree`] re-homes every record under the directory whose full path
//! equals its parent path. Nodes own their children; a child refers back to
//! its parent only through the parent path string.

use core::cmp::Reverse;
use core::fmt;
use std::collections::HashMap;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::BoardError;
use crate::literal::Value;
use crate::path;
use crate::stat::StatRecord;

/// Content type reported for directories.
pub const FOLDER_TYPE: &str = "<folder>";

/// Extension to content-type labels; anything else is `"<ext>-file"`.
const CONTENT_TYPES: [(&str, &str); 5] = [
    ("py", "python source"),
    ("mpy", "python bytecode"),
    ("txt", "text file"),
    ("json", "json document"),
    ("html", "html document"),
];

/// One entry of a `scanDir` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Entry name.
    pub name: String,
    /// Parent directory, as reported (with trailing `/`).
    pub parent: String,
    /// Metadata of the entry.
    pub stat: StatRecord,
}

impl ScanRecord {
    /// Absolute path of the entry.
    #[must_use]
    pub fn full_path(&self) -> String {
        path::join(&self.parent, &self.name)
    }

    /// Convert one `(name, parent, stat)` tuple.
    pub fn from_value(value: &Value) -> Result<Self, BoardError> {
        let fields = value
            .as_sequence()
            .filter(|fields| fields.len() == 3)
            .ok_or_else(|| BoardError::malformed(format!("scan entry is not a triple: {value}")))?;
        let name = fields[0]
            .as_str()
            .ok_or_else(|| BoardError::malformed("scan entry name is not a string"))?;
        let parent = fields[1]
            .as_str()
            .ok_or_else(|| BoardError::malformed("scan entry parent is not a string"))?;
        Ok(Self {
            name: name.to_owned(),
            parent: parent.to_owned(),
            stat: StatRecord::from_value(&fields[2])?,
        })
    }
}

/// Convert a complete `scanDir` result.
pub fn records_from_value(value: &Value) -> Result<Vec<ScanRecord>, BoardError> {
    value
        .as_sequence()
        .ok_or_else(|| BoardError::malformed(format!("scan result is not a list: {value}")))?
        .iter()
        .map(ScanRecord::from_value)
        .collect()
}

/// A file or directory in an assembled tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    name: String,
    path: String,
    own_size: u64,
    mtime: i64,
    is_dir: bool,
    content_type: String,
    children: Vec<FileNode>,
}

impl FileNode {
    /// Build a detached node from a scan record.
    #[must_use]
    pub fn from_record(record: &ScanRecord) -> Self {
        let is_dir = record.stat.is_dir();
        let content_type = if is_dir {
            FOLDER_TYPE.to_owned()
        } else {
            content_type(&record.name)
        };
        Self {
            name: record.name.clone(),
            path: record.parent.clone(),
            own_size: record.stat.size,
            mtime: record.stat.mtime,
            is_dir,
            content_type,
            children: Vec::new(),
        }
    }

    /// Entry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent directory path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Absolute path of this node.
    #[must_use]
    pub fn full_name(&self) -> String {
        path::join(&self.path, &self.name)
    }

    /// Modification time.
    #[must_use]
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    /// True for directories.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Content-type label.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Owned children, in scan order.
    #[must_use]
    pub fn children(&self) -> &[FileNode] {
        &self.children
    }

    /// True when the node owns at least one child.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Bytes for a file; recursive sum over children for a directory.
    #[must_use]
    pub fn size(&self) -> u64 {
        if self.is_dir {
            self.children.iter().map(FileNode::size).sum()
        } else {
            self.own_size
        }
    }

    /// True when this node's parent path equals `dir`, ignoring a trailing `/`.
    #[must_use]
    pub fn is_parent(&self, dir: &str) -> bool {
        path::with_trailing_slash(&self.path) == path::with_trailing_slash(dir)
    }

    /// Depth-first iterator over this node and its descendants.
    pub fn walk(&self) -> impl Iterator<Item = &FileNode> {
        let mut stack = vec![self];
        core::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

// Directories report the aggregate of their children, as `size()` does.
impl Serialize for FileNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut node = serializer.serialize_struct("FileNode", 7)?;
        node.serialize_field("name", &self.name)?;
        node.serialize_field("path", &self.path)?;
        node.serialize_field("size", &self.size())?;
        node.serialize_field("mtime", &self.mtime)?;
        node.serialize_field("is_dir", &self.is_dir)?;
        node.serialize_field("content_type", &self.content_type)?;
        node.serialize_field("children", &self.children)?;
        node.end()
    }
}

impl fmt::Display for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.is_dir {
            format!("* {}", self.name)
        } else {
            self.name.clone()
        };
        write!(f, "{label:<20}:{:>6} bytes [{}]", self.size(), self.path)
    }
}

/// Content-type label for a file name.
#[must_use]
pub fn content_type(name: &str) -> String {
    let ext = path::extension(name);
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map_or_else(|| format!("{ext}-file"), |(_, label)| (*label).to_owned())
}

/// Assemble scan records into nodes.
///
/// Without `recursive` every record becomes a top-level node. With it, each
/// node whose parent path equals a directory node's full path is moved under
/// that directory; the remaining nodes form the returned forest. Scan order is
/// preserved at every level.
#[must_use]
pub fn build_tree(records: &[ScanRecord], recursive: bool) -> Vec<FileNode> {
    let nodes: Vec<FileNode> = records.iter().map(FileNode::from_record).collect();
    if !recursive {
        return nodes;
    }

    let mut dir_index: HashMap<String, usize> = HashMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        if node.is_dir {
            dir_index
                .entry(path::with_trailing_slash(&node.full_name()))
                .or_insert(idx);
        }
    }
    let parent_of: Vec<Option<usize>> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| {
            dir_index
                .get(&path::with_trailing_slash(&node.path))
                .copied()
                .filter(|parent| *parent != idx)
        })
        .collect();

    // Children are always deeper than their parent, so attaching from the
    // deepest level upwards moves complete subtrees.
    let depth = |node: &FileNode| node.full_name().split('/').filter(|c| !c.is_empty()).count();
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by_key(|idx| Reverse(depth(&nodes[*idx])));

    let mut slots: Vec<Option<FileNode>> = nodes.into_iter().map(Some).collect();
    let mut pending: Vec<Vec<(usize, FileNode)>> = vec![Vec::new(); slots.len()];
    let mut roots: Vec<(usize, FileNode)> = Vec::new();
    for idx in order {
        let Some(mut node) = slots[idx].take() else {
            continue;
        };
        let mut children = core::mem::take(&mut pending[idx]);
        children.sort_by_key(|(position, _)| *position);
        node.children = children.into_iter().map(|(_, child)| child).collect();
        match parent_of[idx] {
            Some(parent) => pending[parent].push((idx, node)),
            None => roots.push((idx, node)),
        }
    }
    roots.sort_by_key(|(position, _)| *position);
    roots.into_iter().map(|(_, node)| node).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::{S_IFDIR, S_IFREG};

    fn dir(name: &str, parent: &str) -> ScanRecord {
        ScanRecord {
            name: name.to_owned(),
            parent: parent.to_owned(),
            stat: StatRecord {
                mode: S_IFDIR,
                ..StatRecord::default()
            },
        }
    }

    fn file(name: &str, parent: &str, size: u64) -> ScanRecord {
        ScanRecord {
            name: name.to_owned(),
            parent: parent.to_owned(),
            stat: StatRecord {
                mode: S_IFREG,
                size,
                ..StatRecord::default()
            },
        }
    }

    #[test]
    fn nests_files_under_directory() {
        let records = [dir("a", "/"), file("f1", "/a", 10), file("f2", "/a", 32)];
        let tree = build_tree(&records, true);
        assert_eq!(tree.len(), 1);
        let a = &tree[0];
        assert!(a.is_dir());
        assert_eq!(a.content_type(), FOLDER_TYPE);
        let names: Vec<_> = a.children().iter().map(FileNode::name).collect();
        assert_eq!(names, ["f1", "f2"]);
        assert_eq!(a.size(), 42);
    }

    #[test]
    fn nests_multiple_levels_in_scan_order() {
        let records = [
            file("boot.py", "/", 100),
            dir("lib", "/"),
            dir("net", "/lib/"),
            file("wifi.py", "/lib/net/", 7),
            file("util.py", "/lib/", 5),
            file("main.py", "/", 1),
        ];
        let tree = build_tree(&records, true);
        let top: Vec<_> = tree.iter().map(FileNode::name).collect();
        assert_eq!(top, ["boot.py", "lib", "main.py"]);
        let lib = &tree[1];
        assert_eq!(lib.size(), 12);
        assert_eq!(lib.children()[0].name(), "net");
        assert_eq!(lib.children()[0].children()[0].full_name(), "/lib/net/wifi.py");
        let walked: Vec<_> = lib.walk().map(FileNode::name).collect();
        assert_eq!(walked, ["lib", "net", "wifi.py", "util.py"]);
    }

    #[test]
    fn flat_scan_keeps_every_record_top_level() {
        let records = [dir("a", "/"), file("f1", "/a/", 10)];
        let tree = build_tree(&records, false);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].size(), 0);
    }

    #[test]
    fn classifies_content_types() {
        assert_eq!(content_type("main.py"), "python source");
        assert_eq!(content_type("data.bin"), "bin-file");
        assert_eq!(content_type("README"), "-file");
    }

    #[test]
    fn is_parent_ignores_trailing_separator() {
        let node = FileNode::from_record(&file("x.py", "/lib/", 1));
        assert!(node.is_parent("/lib"));
        assert!(node.is_parent("/lib/"));
        assert!(!node.is_parent("/"));
    }

    #[test]
    fn display_matches_listing_format() {
        let node = FileNode::from_record(&file("boot.py", "/", 139));
        assert_eq!(node.to_string(), "boot.py             :   139 bytes [/]");
    }
}
